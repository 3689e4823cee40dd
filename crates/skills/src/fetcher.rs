//! Package fetching: retrieval and extraction for remote skill sources.
//!
//! The default [`HttpFetcher`] pulls version-control hosts, archive URLs,
//! and registry packages as gzipped tarballs over HTTP, and shells out to
//! the system `git` binary for raw git remotes. Archive entries are
//! sanitized: symlink/hardlink entries are skipped and paths escaping the
//! destination are rejected.

use std::path::{Component, Path, PathBuf};

use {
    anyhow::{Context, bail},
    async_trait::async_trait,
    sha2::{Digest, Sha256},
    tokio::process::Command,
};

use crate::types::{FetchMetadata, FetchOptions, SourceDescriptor, SourceKind};

/// Default registry queried for `name[@version]` specs.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

const USER_AGENT: &str = "skilldock";

/// Retrieval/extraction collaborator consumed by the installer.
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    /// Extract the full contents of `source` into `dest`.
    async fn extract(
        &self,
        source: &SourceDescriptor,
        dest: &Path,
        options: &FetchOptions,
    ) -> anyhow::Result<()>;

    /// Fetch version/integrity/revision metadata without extracting.
    async fn fetch_metadata(
        &self,
        source: &SourceDescriptor,
        options: &FetchOptions,
    ) -> anyhow::Result<FetchMetadata>;
}

/// HTTP-tarball and git-CLI backed fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
    registry_base: String,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_registry(DEFAULT_REGISTRY)
    }

    /// Fetcher against a custom registry base URL.
    pub fn with_registry(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            registry_base: base.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PackageFetcher for HttpFetcher {
    async fn extract(
        &self,
        source: &SourceDescriptor,
        dest: &Path,
        options: &FetchOptions,
    ) -> anyhow::Result<()> {
        match source.kind {
            SourceKind::VersionControlHost => {
                let (host, owner, repo) = host_parts(&source.base_locator)?;
                let url = host_tarball_url(host, owner, repo, source.committish.as_deref())?;
                let bytes = self.download(&url, options.cache_dir.as_deref()).await?;
                // Host tarballs wrap everything in a single root directory.
                unpack_tarball(bytes, dest, 1).await
            },
            SourceKind::ArchiveUrl => {
                let bytes = self
                    .download(&source.base_locator, options.cache_dir.as_deref())
                    .await?;
                let strip = tarball_strip_depth(&bytes);
                unpack_tarball(bytes, dest, strip).await
            },
            SourceKind::GitHttp | SourceKind::GitSsh => clone_git(source, dest).await,
            SourceKind::RegistryPackage => {
                let resolved = self.resolve_registry(&source.base_locator).await?;
                let bytes = self
                    .download(&resolved.tarball, options.cache_dir.as_deref())
                    .await?;
                // Registry tarballs wrap contents in a `package/` directory.
                unpack_tarball(bytes, dest, 1).await
            },
            SourceKind::LocalDirectory => {
                bail!("local directories are copied by the installer, not fetched")
            },
        }
    }

    async fn fetch_metadata(
        &self,
        source: &SourceDescriptor,
        _options: &FetchOptions,
    ) -> anyhow::Result<FetchMetadata> {
        match source.kind {
            SourceKind::VersionControlHost => self.host_metadata(source).await,
            SourceKind::GitHttp | SourceKind::GitSsh => git_metadata(source).await,
            SourceKind::RegistryPackage => {
                let resolved = self.resolve_registry(&source.base_locator).await?;
                Ok(resolved.metadata)
            },
            SourceKind::ArchiveUrl => Ok(FetchMetadata::default()),
            SourceKind::LocalDirectory => {
                bail!("local directories have no fetcher metadata")
            },
        }
    }
}

impl HttpFetcher {
    /// Download `url`, going through the shared cache when one is configured.
    async fn download(&self, url: &str, cache_dir: Option<&Path>) -> anyhow::Result<Vec<u8>> {
        let cache_path = cache_dir.map(|dir| {
            let digest = Sha256::digest(url.as_bytes());
            dir.join(format!("{digest:x}.tar.gz"))
        });

        if let Some(path) = &cache_path
            && let Ok(bytes) = tokio::fs::read(path).await
        {
            tracing::debug!(%url, "using cached download");
            return Ok(bytes);
        }

        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("failed to fetch {}: HTTP {}", url, response.status());
        }
        let bytes = response.bytes().await?.to_vec();

        if let Some(path) = &cache_path {
            // Temp + rename keeps concurrent cache writers from clobbering
            // each other mid-write; a failed cache write is not an error.
            if let Some(parent) = path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            let tmp = path.with_extension("tmp");
            if tokio::fs::write(&tmp, &bytes).await.is_ok() {
                let _ = tokio::fs::rename(&tmp, path).await;
            }
        }
        Ok(bytes)
    }

    /// Latest (or committish-pinned) revision for a host source. Advisory:
    /// HTTP failures read as "no metadata", not as install failures.
    async fn host_metadata(&self, source: &SourceDescriptor) -> anyhow::Result<FetchMetadata> {
        let (host, owner, repo) = host_parts(&source.base_locator)?;
        if host != "github" {
            return Ok(FetchMetadata::default());
        }

        let url = match &source.committish {
            Some(reference) => {
                format!("https://api.github.com/repos/{owner}/{repo}/commits/{reference}")
            },
            None => format!("https://api.github.com/repos/{owner}/{repo}/commits?per_page=1"),
        };
        let Ok(response) = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
        else {
            return Ok(FetchMetadata::default());
        };
        if !response.status().is_success() {
            return Ok(FetchMetadata::default());
        }
        let Ok(value) = response.json::<serde_json::Value>().await else {
            return Ok(FetchMetadata::default());
        };

        let sha = match &value {
            serde_json::Value::Array(commits) => {
                commits.first().and_then(|c| c.get("sha")).and_then(|s| s.as_str())
            },
            other => other.get("sha").and_then(|s| s.as_str()),
        };
        Ok(FetchMetadata {
            revision: sha.filter(|s| s.len() == 40).map(ToOwned::to_owned),
            ..FetchMetadata::default()
        })
    }

    /// Resolve a registry spec to a concrete version and tarball URL.
    async fn resolve_registry(&self, spec: &str) -> anyhow::Result<ResolvedPackage> {
        let (name, pinned) = split_registry_spec(spec);
        let url = format!("{}/{}", self.registry_base, name);
        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("failed to fetch package '{}': HTTP {}", name, response.status());
        }
        let document: serde_json::Value = response.json().await?;

        let version = match pinned {
            Some(version) => version.to_string(),
            None => document
                .get("dist-tags")
                .and_then(|tags| tags.get("latest"))
                .and_then(|v| v.as_str())
                .with_context(|| format!("package '{name}' has no latest dist-tag"))?
                .to_string(),
        };

        let version_doc = document
            .get("versions")
            .and_then(|versions| versions.get(version.as_str()))
            .with_context(|| format!("package version '{name}@{version}' not found"))?;
        let dist = version_doc.get("dist");
        let tarball = dist
            .and_then(|d| d.get("tarball"))
            .and_then(|t| t.as_str())
            .with_context(|| format!("package '{name}@{version}' has no tarball"))?
            .to_string();
        let integrity = dist
            .and_then(|d| d.get("integrity"))
            .and_then(|i| i.as_str())
            .map(ToOwned::to_owned);

        Ok(ResolvedPackage {
            tarball,
            metadata: FetchMetadata {
                integrity,
                version: Some(version),
                revision: None,
            },
        })
    }
}

struct ResolvedPackage {
    tarball: String,
    metadata: FetchMetadata,
}

/// `name[@version]` / `@scope/name[@version]` → (name, pinned version).
fn split_registry_spec(spec: &str) -> (&str, Option<&str>) {
    let at = match spec.strip_prefix('@') {
        // Scoped: skip the leading `@`, the version separator comes later.
        Some(rest) => rest.find('@').map(|i| i + 1),
        None => spec.find('@'),
    };
    match at {
        Some(i) => (&spec[..i], Some(&spec[i + 1..])),
        None => (spec, None),
    }
}

// ── Git remotes ──────────────────────────────────────────────────────────────

// Shells out to the system `git` binary; a shallow clone is all an install
// needs, and the `.git` directory never reaches the install target.

async fn clone_git(source: &SourceDescriptor, dest: &Path) -> anyhow::Result<()> {
    let url = git_url(&source.base_locator);
    let mut cmd = Command::new("git");
    cmd.args(["clone", "--depth", "1"]);
    if let Some(reference) = &source.committish {
        cmd.args(["--branch", reference]);
    }
    cmd.arg(&url).arg(dest);

    let output = cmd.output().await.context("failed to run git clone")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone failed for {url}: {stderr}");
    }
    let _ = tokio::fs::remove_dir_all(dest.join(".git")).await;
    Ok(())
}

async fn git_metadata(source: &SourceDescriptor) -> anyhow::Result<FetchMetadata> {
    let url = git_url(&source.base_locator);
    let reference = source.committish.as_deref().unwrap_or("HEAD");
    let output = Command::new("git")
        .args(["ls-remote", &url, reference])
        .output()
        .await
        .context("failed to run git ls-remote")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git ls-remote failed for {url}: {stderr}");
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let revision = stdout
        .split_whitespace()
        .next()
        .filter(|sha| sha.len() == 40)
        .map(ToOwned::to_owned);
    Ok(FetchMetadata {
        revision,
        ..FetchMetadata::default()
    })
}

/// `git+https://…` / `git+ssh://…` → the URL git itself understands.
fn git_url(base_locator: &str) -> String {
    base_locator
        .strip_prefix("git+")
        .unwrap_or(base_locator)
        .to_string()
}

// ── Host tarballs ────────────────────────────────────────────────────────────

/// `github:owner/repo` → ("github", "owner", "repo").
fn host_parts(base_locator: &str) -> anyhow::Result<(&str, &str, &str)> {
    let (host, rest) = base_locator
        .split_once(':')
        .with_context(|| format!("missing host prefix in '{base_locator}'"))?;
    let (owner, repo) = rest
        .split_once('/')
        .with_context(|| format!("expected owner/repo in '{base_locator}'"))?;
    Ok((host, owner, repo))
}

fn host_tarball_url(
    host: &str,
    owner: &str,
    repo: &str,
    committish: Option<&str>,
) -> anyhow::Result<String> {
    Ok(match host {
        "github" => match committish {
            Some(reference) => {
                format!("https://api.github.com/repos/{owner}/{repo}/tarball/{reference}")
            },
            None => format!("https://api.github.com/repos/{owner}/{repo}/tarball"),
        },
        "gitlab" => {
            let base = format!(
                "https://gitlab.com/api/v4/projects/{owner}%2F{repo}/repository/archive.tar.gz"
            );
            match committish {
                Some(reference) => format!("{base}?sha={reference}"),
                None => base,
            }
        },
        "bitbucket" => format!(
            "https://bitbucket.org/{owner}/{repo}/get/{}.tar.gz",
            committish.unwrap_or("HEAD")
        ),
        other => bail!("unsupported version-control host '{other}'"),
    })
}

// ── Tarball extraction ───────────────────────────────────────────────────────

/// Unpack a gzipped tarball into `dest`, stripping the first
/// `strip_components` path components from every entry.
async fn unpack_tarball(bytes: Vec<u8>, dest: &Path, strip_components: usize) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dest).await?;
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let canonical_dest = std::fs::canonicalize(&dest)?;
        let decoder = flate2::read::GzDecoder::new(&bytes[..]);
        let mut archive = tar::Archive::new(decoder);
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.header().entry_type().is_symlink()
                || entry.header().entry_type().is_hard_link()
            {
                tracing::warn!("skipping symlink/hardlink archive entry");
                continue;
            }

            let path = entry.path()?.into_owned();
            let Some(stripped) = sanitize_entry_path(&path, strip_components)? else {
                continue;
            };

            let target = dest.join(&stripped);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
                let canonical_parent = std::fs::canonicalize(parent)?;
                if !canonical_parent.starts_with(&canonical_dest) {
                    anyhow::bail!("archive entry escaped destination directory");
                }
            }

            if target.exists() {
                let meta = std::fs::symlink_metadata(&target)?;
                if meta.file_type().is_symlink() {
                    anyhow::bail!("archive entry resolves to symlink destination");
                }
            }

            if entry.header().entry_type().is_dir() {
                std::fs::create_dir_all(&target)?;
                continue;
            }

            entry.unpack(&target)?;
        }
        Ok::<(), anyhow::Error>(())
    })
    .await??;
    Ok(())
}

/// Strip leading components and reject unsafe paths. Returns `None` for
/// entries with nothing left after stripping.
fn sanitize_entry_path(path: &Path, strip_components: usize) -> anyhow::Result<Option<PathBuf>> {
    let stripped: PathBuf = path.components().skip(strip_components).collect();
    if stripped.as_os_str().is_empty() {
        return Ok(None);
    }

    for component in stripped.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("archive contains unsafe path component: {}", path.display());
            },
        }
    }
    Ok(Some(stripped))
}

/// How many leading components to strip from an arbitrary archive: one when
/// every entry sits under a single shared root directory, zero otherwise.
fn tarball_strip_depth(bytes: &[u8]) -> usize {
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    let Ok(entries) = archive.entries() else {
        return 0;
    };

    let mut root: Option<std::ffi::OsString> = None;
    for entry in entries.flatten() {
        let Ok(path) = entry.path() else {
            return 0;
        };
        let mut components = path.components();
        let Some(Component::Normal(first)) = components.next() else {
            continue;
        };
        // A top-level file means there is no shared root to strip.
        if components.next().is_none() && !entry.header().entry_type().is_dir() {
            return 0;
        }
        match &root {
            None => root = Some(first.to_os_string()),
            Some(existing) if *existing == *first => {},
            Some(_) => return 0,
        }
    }
    usize::from(root.is_some())
}
