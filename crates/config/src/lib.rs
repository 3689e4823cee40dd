//! Directory resolution and environment lookups for skilldock.
//!
//! The data dir defaults to the platform project-data directory for
//! "skilldock" (`~/.local/share/skilldock` on Linux). Tests and embedders
//! override it with [`set_data_dir`] so nothing touches the real home.

use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

static DATA_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Override the data directory for the current process.
pub fn set_data_dir(path: impl Into<PathBuf>) {
    if let Ok(mut guard) = DATA_DIR_OVERRIDE.write() {
        *guard = Some(path.into());
    }
}

/// Clear a [`set_data_dir`] override, restoring platform resolution.
pub fn clear_data_dir() {
    if let Ok(mut guard) = DATA_DIR_OVERRIDE.write() {
        *guard = None;
    }
}

/// The skilldock data directory.
pub fn data_dir() -> PathBuf {
    if let Ok(guard) = DATA_DIR_OVERRIDE.read()
        && let Some(path) = guard.as_ref()
    {
        return path.clone();
    }
    match directories::ProjectDirs::from("", "", "skilldock") {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => {
            tracing::warn!("no home directory found, using relative data dir");
            PathBuf::from(".skilldock")
        },
    }
}

/// Where installed skills live: `<data_dir>/skills`.
pub fn skills_dir() -> PathBuf {
    data_dir().join("skills")
}

/// Shared download cache: `<data_dir>/cache`.
pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

/// The caller's home directory, if one can be resolved.
pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Expand a leading `~/` in `path` to the caller's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    expand_home_with(path, home_dir)
}

/// Expand a leading `~/` using a custom home lookup.
///
/// This is the implementation used by [`expand_home`]; the separate
/// signature makes it testable without a real home directory.
pub fn expand_home_with(path: &str, home: impl Fn() -> Option<PathBuf>) -> PathBuf {
    if let Some(suffix) = path.strip_prefix("~/")
        && let Some(home) = home()
    {
        return home.join(suffix);
    }
    PathBuf::from(path)
}

/// Best-effort absolute form of `path`, resolved against the current dir.
pub fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_override_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        set_data_dir(tmp.path());
        assert_eq!(data_dir(), tmp.path());
        assert_eq!(skills_dir(), tmp.path().join("skills"));
        assert_eq!(cache_dir(), tmp.path().join("cache"));
        clear_data_dir();
        assert_ne!(data_dir(), tmp.path());
    }

    #[test]
    fn test_expand_home_with_custom_lookup() {
        let expanded = expand_home_with("~/skills/demo", || Some(PathBuf::from("/home/demo")));
        assert_eq!(expanded, PathBuf::from("/home/demo/skills/demo"));
    }

    #[test]
    fn test_expand_home_without_home_keeps_path() {
        let expanded = expand_home_with("~/skills", || None);
        assert_eq!(expanded, PathBuf::from("~/skills"));
    }

    #[test]
    fn test_expand_home_ignores_non_tilde_paths() {
        let expanded = expand_home_with("/opt/skills", || Some(PathBuf::from("/home/demo")));
        assert_eq!(expanded, PathBuf::from("/opt/skills"));
    }

    #[test]
    fn test_absolutize_relative_path() {
        let abs = absolutize(Path::new("some/dir"));
        assert!(abs.is_absolute());
        assert!(abs.ends_with("some/dir"));
    }
}
