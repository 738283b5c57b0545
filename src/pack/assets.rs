//! Asset materialization
//!
//! Every asset referenced by the graph is placed at `<build_to>/<id>`, as a
//! symlink to its source by default or as a copy. An existing target is
//! removed before anything is written, so switching from symlink to copy never
//! writes through the old link into the source file.

use crate::error::{KnitError, KnitResult};
use crate::file::File;
use crate::layout::Layout;
use futures_util::future::try_join_all;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Materialize every asset in `assets`, returning the written targets
pub async fn materialize<'a>(
    layout: &Layout,
    assets: impl IntoIterator<Item = &'a File>,
    copy: bool,
) -> KnitResult<Vec<PathBuf>> {
    let jobs = assets.into_iter().filter_map(|asset| {
        if Path::new(&asset.id).is_absolute() {
            warn!("Skipping asset outside the root: {}", asset.id);
            return None;
        }
        let target = layout.build_path(&asset.id);
        Some(place(asset.path.clone(), target, copy))
    });
    try_join_all(jobs).await
}

async fn place(source: PathBuf, target: PathBuf, copy: bool) -> KnitResult<PathBuf> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| KnitError::io(format!("creating {}", parent.display()), e))?;
    }

    match fs::symlink_metadata(&target).await {
        Ok(meta) => {
            if !copy && meta.file_type().is_symlink() {
                if let Ok(existing) = fs::read_link(&target).await {
                    if existing == source {
                        return Ok(target);
                    }
                }
            }
            fs::remove_file(&target)
                .await
                .map_err(|e| KnitError::io(format!("replacing {}", target.display()), e))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(KnitError::io(format!("inspecting {}", target.display()), e)),
    }

    if copy {
        debug!("Copying {} to {}", source.display(), target.display());
        fs::copy(&source, &target)
            .await
            .map_err(|e| KnitError::io(format!("copying {}", source.display()), e))?;
    } else {
        debug!("Linking {} to {}", target.display(), source.display());
        link(&source, &target).await?;
    }
    Ok(target)
}

#[cfg(unix)]
async fn link(source: &Path, target: &Path) -> KnitResult<()> {
    fs::symlink(source, target)
        .await
        .map_err(|e| KnitError::io(format!("linking {}", target.display()), e))
}

#[cfg(windows)]
async fn link(source: &Path, target: &Path) -> KnitResult<()> {
    fs::symlink_file(source, target)
        .await
        .map_err(|e| KnitError::io(format!("linking {}", target.display()), e))
}

#[cfg(not(any(unix, windows)))]
async fn link(source: &Path, target: &Path) -> KnitResult<()> {
    fs::copy(source, target)
        .await
        .map(|_| ())
        .map_err(|e| KnitError::io(format!("copying {}", source.display()), e))
}
