//! Lock file persistence.
//!
//! `skills-lock.json` records the spec, resolved version, and integrity of
//! every successfully installed skill. It is a wholesale snapshot — each
//! generation replaces the previous file — and it is advisory: a missing or
//! malformed lock file reads as "no lock", never as an error.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::types::{InstallResult, LOCK_FILE_VERSION, LockFile, LockedSkill};

pub const LOCK_FILE_NAME: &str = "skills-lock.json";

/// Reads and writes the lock file with atomic temp + rename writes.
pub struct LockStore {
    path: PathBuf,
}

impl LockStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The lock file sits one level above the skills directory.
    pub fn for_skills_dir(skills_dir: &Path) -> Self {
        let parent = skills_dir.parent().unwrap_or(skills_dir);
        Self::new(parent.join(LOCK_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a fresh snapshot of the successful entries in `results`.
    /// Previously locked skills absent from the input are dropped.
    pub fn generate(&self, results: &BTreeMap<String, InstallResult>) -> anyhow::Result<()> {
        let mut skills = BTreeMap::new();
        for (name, result) in results {
            if let InstallResult::Success(installed) = result {
                skills.insert(
                    name.clone(),
                    LockedSkill {
                        spec: installed.spec.clone(),
                        resolved_version: installed.resolved_version.clone(),
                        integrity: installed.integrity.clone(),
                    },
                );
            }
        }

        let lock = LockFile {
            version: LOCK_FILE_VERSION.to_string(),
            generated: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            skills,
        };
        self.write(&lock)?;
        tracing::info!(
            path = %self.path.display(),
            count = lock.skills.len(),
            "generated lock file"
        );
        Ok(())
    }

    fn write(&self, lock: &LockFile) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(lock)?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load the lock file. Absent or malformed files read as `None`.
    pub fn read(&self) -> Option<LockFile> {
        let data = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&data) {
            Ok(lock) => Some(lock),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), %e, "ignoring malformed lock file");
                None
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{ErrorCode, InstallError},
        types::{InstallFailure, InstalledSkill},
    };

    fn success(name: &str, spec: &str, version: &str) -> InstallResult {
        InstallResult::Success(InstalledSkill {
            name: name.into(),
            spec: spec.into(),
            resolved_version: version.into(),
            integrity: format!("sha512-{name}"),
            install_path: PathBuf::from("/tmp").join(name),
            manifest: None,
        })
    }

    fn failure(name: &str, spec: &str) -> InstallResult {
        InstallResult::Failure(InstallFailure {
            name: Some(name.into()),
            spec: Some(spec.into()),
            error: InstallError::new(ErrorCode::InstallFailed, "boom"),
        })
    }

    #[test]
    fn test_roundtrip_keeps_only_successes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LockStore::for_skills_dir(&tmp.path().join("skills"));

        let mut results = BTreeMap::new();
        results.insert("alpha".to_string(), success("alpha", "github:o/alpha#v1", "v1"));
        results.insert("beta".to_string(), failure("beta", "github:o/beta"));
        store.generate(&results).unwrap();

        let lock = store.read().unwrap();
        assert_eq!(lock.version, LOCK_FILE_VERSION);
        assert_eq!(lock.skills.len(), 1);
        let alpha = &lock.skills["alpha"];
        assert_eq!(alpha.spec, "github:o/alpha#v1");
        assert_eq!(alpha.resolved_version, "v1");
        assert_eq!(alpha.integrity, "sha512-alpha");
        assert!(!lock.generated.is_empty());
    }

    #[test]
    fn test_lock_file_sits_above_skills_dir() {
        let store = LockStore::for_skills_dir(Path::new("/data/skills"));
        assert_eq!(store.path(), Path::new("/data/skills-lock.json"));
    }

    #[test]
    fn test_generate_is_overwrite_not_merge() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LockStore::for_skills_dir(&tmp.path().join("skills"));

        let mut first = BTreeMap::new();
        first.insert("alpha".to_string(), success("alpha", "github:o/alpha", "v1"));
        first.insert("beta".to_string(), success("beta", "github:o/beta", "v2"));
        store.generate(&first).unwrap();

        let mut second = BTreeMap::new();
        second.insert("beta".to_string(), success("beta", "github:o/beta", "v3"));
        store.generate(&second).unwrap();

        let lock = store.read().unwrap();
        assert_eq!(lock.skills.len(), 1);
        assert!(!lock.skills.contains_key("alpha"));
        assert_eq!(lock.skills["beta"].resolved_version, "v3");
    }

    #[test]
    fn test_read_missing_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LockStore::new(tmp.path().join("skills-lock.json"));
        assert!(store.read().is_none());
    }

    #[test]
    fn test_read_malformed_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("skills-lock.json");
        std::fs::write(&path, "{not valid json").unwrap();
        assert!(LockStore::new(path).read().is_none());
    }

    #[test]
    fn test_output_is_pretty_json() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LockStore::for_skills_dir(&tmp.path().join("skills"));

        let mut results = BTreeMap::new();
        results.insert("alpha".to_string(), success("alpha", "github:o/alpha", "v1"));
        store.generate(&results).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\n  \"version\": \"1.0\""));
        assert!(raw.contains("\"resolvedVersion\": \"v1\""));
    }
}
