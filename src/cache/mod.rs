//! Persistent per-file cache
//!
//! Records are keyed by file id and validated by content fingerprint. The
//! store is shared by every build pointed at the same install directory.
//!
//! # Record lifecycle
//!
//! | Event | Effect |
//! |-------|--------|
//! | Fingerprint matches | `type`, `src` and `deps` reused, transforms skipped |
//! | Fingerprint differs | file re-transformed and re-parsed, record replaced |
//! | Cache disabled | every read misses, every write is dropped |
//! | `clean` | records and installed packages removed |

pub mod fingerprint;
pub mod store;

pub use store::{CacheStore, Mapping, MappingEntry, Record};
