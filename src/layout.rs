//! On-disk layout of one project
//!
//! Every file id is derived from these paths: local files are root-relative,
//! remote files live under `<install_to>/<user>-<repo>@<version>/`.

use std::path::{Component, Path, PathBuf};

/// Directory inside the install directory holding cache records
pub const CACHE_DIR: &str = "knit-cache";

/// Resolved directory layout for one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Project root
    pub root: PathBuf,
    /// Install directory name, relative to the root
    pub install_to: String,
    /// Build directory name, relative to the root
    pub build_to: String,
    /// Manifest filename
    pub manifest: String,
}

impl Layout {
    /// Resolve `rel` against the root
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        normalize(&self.root.join(rel))
    }

    /// Resolve `rel` against the install directory
    pub fn install_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        normalize(&self.root.join(&self.install_to).join(rel))
    }

    /// Resolve `rel` against the build directory
    pub fn build_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        normalize(&self.root.join(&self.build_to).join(rel))
    }

    /// Directory holding the cache records
    pub fn cache_dir(&self) -> PathBuf {
        self.install_path(CACHE_DIR)
    }

    /// Stable id for an absolute path: root-relative with `/` separators,
    /// or the absolute path itself when it lies outside the root
    pub fn id_for(&self, path: &Path) -> String {
        let path = normalize(path);
        match path.strip_prefix(normalize(&self.root)) {
            Ok(rel) => slashed(rel),
            Err(_) => slashed(&path),
        }
    }

    /// Absolute path for an id
    pub fn path_for(&self, id: &str) -> PathBuf {
        let id_path = Path::new(id);
        if id_path.is_absolute() {
            id_path.to_path_buf()
        } else {
            self.path(id_path)
        }
    }

    /// Whether `id` lies inside the install directory
    pub fn is_remote_id(&self, id: &str) -> bool {
        in_install_dir(id, &self.install_to)
    }

    /// Package directory segment (`user-repo@version`) of a remote id
    pub fn package_segment<'a>(&self, id: &'a str) -> Option<&'a str> {
        if !self.is_remote_id(id) {
            return None;
        }
        let rest = &id[self.install_to.trim_end_matches('/').len() + 1..];
        rest.split('/').next().filter(|s| !s.is_empty())
    }
}

/// Whether `id` starts with the `install_to` directory segment
pub fn in_install_dir(id: &str, install_to: &str) -> bool {
    let prefix = install_to.trim_end_matches('/');
    !prefix.is_empty()
        && id
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Lexically normalize a path, folding `.` and `..` without touching the disk
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Render a path with forward slashes
pub fn slashed(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
