//! Skill installation: clean single installs, concurrent batches, lock file
//! generation, and dry-run manifest extraction.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::{Context, bail},
    sha2::{Digest, Sha256},
};

use crate::{
    error::{ErrorCode, InstallError, classify_failure},
    fetcher::{HttpFetcher, PackageFetcher},
    fsutil::{ScratchDir, copy_dir_recursive},
    lockfile::LockStore,
    parse, source,
    types::{
        BatchResult, FetchOptions, InstallFailure, InstallResult, InstalledSkill, LockFile,
        SkillManifest, SourceDescriptor,
    },
};

/// Version recorded for local installs with no package descriptor.
const LOCAL_VERSION: &str = "local";
/// Version recorded when no committish, metadata version, or revision is known.
const LATEST_VERSION: &str = "latest";
/// Staging area for extract-then-subcopy installs, inside the skills dir.
const STAGING_DIR: &str = ".staging";

/// An install step failure: either already classified (missing/malformed
/// manifest) or a raw error still to be run through the classifier.
enum StepError {
    Typed(InstallError),
    Raw(anyhow::Error),
}

impl From<anyhow::Error> for StepError {
    fn from(e: anyhow::Error) -> Self {
        Self::Raw(e)
    }
}

/// Installs skills into `<skills_dir>/<name>` directories.
///
/// Each install exclusively owns its target subdirectory: the directory is
/// deleted and recreated, so repeated installs of the same name are clean.
/// Two concurrent installs of the *same* name are unsafe and must be
/// prevented by the caller; different names never interfere.
pub struct SkillInstaller {
    skills_dir: PathBuf,
    fetcher: Arc<dyn PackageFetcher>,
    cache_dir: Option<PathBuf>,
}

impl SkillInstaller {
    /// Installer over the default data dir and HTTP fetcher.
    pub fn new() -> Self {
        Self::with_fetcher(skilldock_config::skills_dir(), Arc::new(HttpFetcher::new()))
            .with_cache_dir(skilldock_config::cache_dir())
    }

    pub fn with_fetcher(skills_dir: PathBuf, fetcher: Arc<dyn PackageFetcher>) -> Self {
        Self {
            skills_dir,
            fetcher,
            cache_dir: None,
        }
    }

    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: PathBuf) -> Self {
        self.cache_dir = Some(cache_dir);
        self
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    /// Install one skill from `spec` into `<skills_dir>/<name>`.
    ///
    /// Every runtime failure — invalid spec, fetcher error, missing or
    /// malformed manifest — comes back as an [`InstallResult::Failure`];
    /// nothing escapes as a raw error.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty. That is a caller bug, not a runtime
    /// condition, and is never reported as a failure result.
    pub async fn install(&self, name: &str, spec: &str) -> InstallResult {
        assert!(!name.is_empty(), "skill name must not be empty");

        if spec.is_empty() || !source::is_valid_spec(spec) {
            return failure(name, spec, InstallError::new(
                ErrorCode::InvalidSpec,
                format!("invalid skill spec '{spec}'"),
            ));
        }

        let target = self.skills_dir.join(name);
        match self.install_inner(name, spec, &target).await {
            Ok(installed) => {
                tracing::info!(
                    name,
                    %spec,
                    version = %installed.resolved_version,
                    "installed skill"
                );
                InstallResult::Success(installed)
            },
            Err(step) => {
                let _ = tokio::fs::remove_dir_all(&target).await;
                let error = match step {
                    StepError::Typed(error) => error,
                    StepError::Raw(raw) => classify_failure(spec, &raw),
                };
                tracing::warn!(name, %spec, code = %error.code, "install failed: {}", error.message);
                failure(name, spec, error)
            },
        }
    }

    async fn install_inner(
        &self,
        name: &str,
        spec: &str,
        target: &Path,
    ) -> Result<InstalledSkill, StepError> {
        // Clean install: stale content from a previous install never survives.
        let _ = tokio::fs::remove_dir_all(target).await;
        tokio::fs::create_dir_all(&self.skills_dir)
            .await
            .context("failed to create skills directory")?;

        let descriptor = source::classify(spec);
        let options = FetchOptions {
            cache_dir: self.cache_dir.clone(),
        };

        if let Some(subdir) = descriptor.subdir.clone() {
            self.extract_subdir(name, &descriptor, &subdir, target, &options)
                .await?;
        } else if descriptor.is_local() {
            copy_local(Path::new(&descriptor.base_locator), target).await?;
        } else {
            self.fetcher.extract(&descriptor, target, &options).await?;
        }

        let manifest = verify_manifest(target, spec)?;
        let (resolved_version, integrity) = self
            .resolve_version(&descriptor, target, &options)
            .await?;

        Ok(InstalledSkill {
            name: name.to_string(),
            spec: spec.to_string(),
            resolved_version,
            integrity,
            install_path: target.to_path_buf(),
            manifest: Some(manifest),
        })
    }

    /// Extract the whole source into a staging dir, then copy only `subdir`.
    async fn extract_subdir(
        &self,
        name: &str,
        descriptor: &SourceDescriptor,
        subdir: &str,
        target: &Path,
        options: &FetchOptions,
    ) -> Result<(), StepError> {
        let scratch = ScratchDir::create(self.skills_dir.join(STAGING_DIR).join(name)).await?;
        self.fetcher.extract(descriptor, scratch.path(), options).await?;

        let source_root = scratch.path().join(subdir);
        if !source_root.exists() {
            return Err(anyhow::anyhow!("sub-path '{subdir}' not found in source").into());
        }
        if !source_root.is_dir() {
            return Err(anyhow::anyhow!("sub-path '{subdir}' is not a directory").into());
        }
        copy_dir_recursive(&source_root, target).await?;
        Ok(())
    }

    /// Resolve the version and integrity recorded for a finished install.
    async fn resolve_version(
        &self,
        descriptor: &SourceDescriptor,
        target: &Path,
        options: &FetchOptions,
    ) -> Result<(String, String), StepError> {
        if descriptor.is_local() {
            // No remote artifact to hash: the integrity is derived from the
            // install path, and the version from a package descriptor if any.
            let version = parse::read_package_descriptor(target)
                .and_then(|pkg| pkg.version)
                .unwrap_or_else(|| LOCAL_VERSION.to_string());
            return Ok((version, local_integrity(target)));
        }

        let metadata = self.fetcher.fetch_metadata(descriptor, options).await?;
        let version = descriptor
            .committish
            .clone()
            .or(metadata.version)
            .or_else(|| metadata.revision.as_deref().map(short_revision))
            .unwrap_or_else(|| LATEST_VERSION.to_string());
        Ok((version, metadata.integrity.unwrap_or_default()))
    }

    /// Install every entry concurrently. Entries are independent: one
    /// failure never cancels or blocks another's completion.
    pub async fn install_all(&self, specs: &BTreeMap<String, String>) -> BatchResult {
        if specs.is_empty() {
            return BatchResult {
                success: true,
                ..BatchResult::default()
            };
        }

        let installs = specs
            .iter()
            .map(|(name, spec)| async move { (name.clone(), self.install(name, spec).await) });
        let outcomes = futures::future::join_all(installs).await;

        let mut results = BTreeMap::new();
        let mut installed = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in outcomes {
            if result.is_success() {
                installed.push(name.clone());
            } else {
                failed.push(name.clone());
            }
            results.insert(name, result);
        }

        let success = failed.is_empty();
        tracing::info!(
            installed = installed.len(),
            failed = failed.len(),
            "batch install finished"
        );
        BatchResult {
            success,
            installed,
            failed,
            results,
        }
    }

    /// Snapshot the successful entries of `results` into the lock file.
    pub fn generate_lock_file(
        &self,
        results: &BTreeMap<String, InstallResult>,
    ) -> anyhow::Result<()> {
        LockStore::for_skills_dir(&self.skills_dir).generate(results)
    }

    /// Read the lock file; absent or malformed files read as `None`.
    pub fn read_lock_file(&self) -> Option<LockFile> {
        LockStore::for_skills_dir(&self.skills_dir).read()
    }

    /// Extract a spec into a scratch location, parse its manifest, and
    /// discard everything — no persistent install occurs.
    pub async fn manifest_for_spec(&self, spec: &str) -> Result<SkillManifest, InstallError> {
        if spec.is_empty() || !source::is_valid_spec(spec) {
            return Err(InstallError::new(
                ErrorCode::InvalidSpec,
                format!("invalid skill spec '{spec}'"),
            ));
        }
        match self.manifest_inner(spec).await {
            Ok(manifest) => Ok(manifest),
            Err(StepError::Typed(error)) => Err(error),
            Err(StepError::Raw(raw)) => Err(classify_failure(spec, &raw)),
        }
    }

    async fn manifest_inner(&self, spec: &str) -> Result<SkillManifest, StepError> {
        let descriptor = source::classify(spec);
        let options = FetchOptions {
            cache_dir: self.cache_dir.clone(),
        };

        // Disjoint per spec, so concurrent probes never share a scratch dir.
        let digest = format!("{:x}", Sha256::digest(spec.as_bytes()));
        let probe = format!("probe-{}", &digest[..12]);
        let scratch = ScratchDir::create(self.skills_dir.join(STAGING_DIR).join(probe)).await?;

        let root = if descriptor.is_local() {
            let root = PathBuf::from(&descriptor.base_locator);
            tokio::fs::metadata(&root)
                .await
                .with_context(|| format!("local path not found: {}", root.display()))?;
            root
        } else {
            self.fetcher.extract(&descriptor, scratch.path(), &options).await?;
            scratch.path().to_path_buf()
        };

        let root = match &descriptor.subdir {
            Some(subdir) => {
                let nested = root.join(subdir);
                if !nested.is_dir() {
                    return Err(anyhow::anyhow!("sub-path '{subdir}' not found in source").into());
                }
                nested
            },
            None => root,
        };

        let manifest = verify_manifest(&root, spec)?;
        Ok(manifest)
        // scratch drops here; nothing extracted persists
    }

    /// Remove an installed skill directory.
    pub async fn uninstall(&self, name: &str) -> anyhow::Result<()> {
        assert!(!name.is_empty(), "skill name must not be empty");
        let target = self.skills_dir.join(name);
        if !target.is_dir() {
            bail!("skill '{name}' is not installed");
        }
        tokio::fs::remove_dir_all(&target).await?;
        tracing::info!(name, "removed skill");
        Ok(())
    }
}

impl Default for SkillInstaller {
    fn default() -> Self {
        Self::new()
    }
}

/// Check SKILL.md exists at `root` and parse it, with manifest problems
/// reported under their own error codes.
fn verify_manifest(root: &Path, spec: &str) -> Result<SkillManifest, StepError> {
    let manifest_path = root.join(parse::MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(StepError::Typed(InstallError::new(
            ErrorCode::MissingSkillMd,
            format!("no {} found at the root of '{spec}'", parse::MANIFEST_FILE),
        )));
    }

    let content = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    match parse::parse_manifest(&content) {
        Ok(mut manifest) => {
            if let Some(pkg) = parse::read_package_descriptor(root) {
                if manifest.package_name.is_none() {
                    manifest.package_name = pkg.name;
                }
                if manifest.version.is_none() {
                    manifest.version = pkg.version;
                }
            }
            Ok(manifest)
        },
        Err(e) => Err(StepError::Typed(InstallError::new(
            ErrorCode::InvalidSkillFormat,
            format!("invalid {} in '{spec}': {e:#}", parse::MANIFEST_FILE),
        ))),
    }
}

/// Direct copy for local sources; the fetcher is not involved.
async fn copy_local(source: &Path, target: &Path) -> anyhow::Result<()> {
    let metadata = tokio::fs::metadata(source)
        .await
        .with_context(|| format!("local path not found: {}", source.display()))?;
    if !metadata.is_dir() {
        bail!("local source is not a directory: {}", source.display());
    }
    copy_dir_recursive(source, target).await
}

/// Deterministic integrity for local installs, derived from the install
/// path rather than the contents.
fn local_integrity(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    format!("local-sha256-{digest:x}")
}

fn short_revision(revision: &str) -> String {
    revision.chars().take(7).collect()
}

fn failure(name: &str, spec: &str, error: InstallError) -> InstallResult {
    InstallResult::Failure(InstallFailure {
        name: Some(name.to_string()),
        spec: Some(spec.to_string()),
        error,
    })
}
