use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::InstallError;

// ── Source descriptors ───────────────────────────────────────────────────────

/// Where a skill spec points. Decided once during classification; every
/// later dispatch matches on this instead of re-parsing the spec string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// Shorthand host spec: `github:owner/repo`, `gitlab:…`, `bitbucket:…`.
    VersionControlHost,
    /// Git over HTTP(S): `git+https://…` or an `https://….git` URL.
    GitHttp,
    /// Git over SSH: `git+ssh://…` or `git@host:path`.
    GitSsh,
    /// Local directory: `file:…`.
    LocalDirectory,
    /// Downloadable tarball URL.
    ArchiveUrl,
    /// Registry package: `name[@version]` or `@scope/name[@version]`.
    RegistryPackage,
}

/// Structured form of a raw skill spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    /// Locator handed to the fetcher. When `subdir` is set, the sub-path
    /// has been stripped so the fetcher sees a spec for the whole source.
    pub base_locator: String,
    /// Branch, tag, or commit id from the spec fragment.
    pub committish: Option<String>,
    /// Repository-relative directory to install instead of the root.
    pub subdir: Option<String>,
}

impl SourceDescriptor {
    pub fn is_local(&self) -> bool {
        self.kind == SourceKind::LocalDirectory
    }
}

// ── Skill manifest ───────────────────────────────────────────────────────────

/// Metadata parsed from a skill's SKILL.md frontmatter, optionally enriched
/// from a sibling package descriptor. The installer treats this as an opaque
/// validated record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillManifest {
    /// Skill name — lowercase, hyphens allowed, 1-64 chars.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// SPDX license identifier.
    #[serde(default)]
    pub license: Option<String>,
    /// Environment requirements (intended product, system packages, etc.).
    #[serde(default)]
    pub compatibility: Option<String>,
    /// Registry package name, when the skill is published as a package.
    #[serde(default, alias = "package")]
    pub package_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Free-form frontmatter metadata, passed through untouched.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
}

// ── Install results ──────────────────────────────────────────────────────────

/// Outcome of one skill installation. Exactly one shape is populated: a
/// success never carries an error, a failure never carries install data.
#[derive(Debug, Clone)]
pub enum InstallResult {
    Success(InstalledSkill),
    Failure(InstallFailure),
}

impl InstallResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn error(&self) -> Option<&InstallError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(&failure.error),
        }
    }
}

/// A completed installation.
#[derive(Debug, Clone)]
pub struct InstalledSkill {
    pub name: String,
    /// The raw spec the caller supplied, recorded verbatim for the lock file.
    pub spec: String,
    pub resolved_version: String,
    /// Opaque content-identifying string; empty when the fetcher has none.
    pub integrity: String,
    pub install_path: PathBuf,
    pub manifest: Option<SkillManifest>,
}

/// A failed installation, classified into the stable error taxonomy.
#[derive(Debug, Clone)]
pub struct InstallFailure {
    pub name: Option<String>,
    pub spec: Option<String>,
    pub error: InstallError,
}

// ── Batch results ────────────────────────────────────────────────────────────

/// Aggregated outcome of a concurrent batch install, keyed by skill name.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// True iff no entry failed.
    pub success: bool,
    pub installed: Vec<String>,
    pub failed: Vec<String>,
    pub results: BTreeMap<String, InstallResult>,
}

// ── Lock file ────────────────────────────────────────────────────────────────

pub const LOCK_FILE_VERSION: &str = "1.0";

/// Snapshot of every successfully installed skill, for reproducible
/// reinstallation. Overwritten wholesale on each generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFile {
    pub version: String,
    /// RFC 3339 generation timestamp.
    pub generated: String,
    #[serde(default)]
    pub skills: BTreeMap<String, LockedSkill>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedSkill {
    pub spec: String,
    pub resolved_version: String,
    pub integrity: String,
}

// ── Fetcher interface types ──────────────────────────────────────────────────

/// Options forwarded to the fetcher alongside a descriptor.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Shared download cache. Concurrent installs may hit it simultaneously;
    /// the fetcher owns its concurrency safety.
    pub cache_dir: Option<PathBuf>,
}

/// Source metadata reported by the fetcher without extracting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchMetadata {
    pub integrity: Option<String>,
    pub version: Option<String>,
    /// Full revision identifier (e.g. a 40-char commit sha).
    pub revision: Option<String>,
}
