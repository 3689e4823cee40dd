//! Filesystem helpers: exclusion-aware recursive copy and scratch
//! directories with guaranteed cleanup.

use std::path::{Path, PathBuf};

/// Directory names never copied into an install target: VCS internals,
/// dependency caches, and skilldock's own metadata when a skill is sourced
/// from another install tree.
pub const EXCLUDED_DIRS: &[&str] = &[".git", "node_modules", ".skilldock"];

/// Recursively copy `src` into `dst`, skipping [`EXCLUDED_DIRS`].
pub async fn copy_dir_recursive(src: &Path, dst: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dst).await?;
    let mut entries = tokio::fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            let name = entry.file_name();
            if EXCLUDED_DIRS.iter().any(|excluded| name == *excluded) {
                continue;
            }
            Box::pin(copy_dir_recursive(&src_path, &dst_path)).await?;
        } else {
            tokio::fs::copy(&src_path, &dst_path).await?;
        }
    }
    Ok(())
}

/// A scratch directory removed when the guard drops, so extract-then-subcopy
/// installs clean up on every exit path.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create (or recreate, empty) a scratch directory at `path`.
    pub async fn create(path: PathBuf) -> anyhow::Result<Self> {
        let _ = tokio::fs::remove_dir_all(&path).await;
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        // Synchronous removal: drop can run outside an async context.
        let _ = std::fs::remove_dir_all(&self.path);
    }
}
