//! Stable error taxonomy for install failures.
//!
//! The fetcher and the filesystem raise heterogeneous, loosely-structured
//! errors; [`classify_failure`] normalizes them into six stable kinds so
//! callers never pattern-match on collaborator-specific strings.

use std::io::ErrorKind;

use serde::{Deserialize, Serialize};

/// The six failure kinds an install can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidSpec,
    InstallFailed,
    NetworkError,
    MissingSkillMd,
    InvalidSkillFormat,
    PermissionError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSpec => "INVALID_SPEC",
            Self::InstallFailed => "INSTALL_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::MissingSkillMd => "MISSING_SKILL_MD",
            Self::InvalidSkillFormat => "INVALID_SKILL_FORMAT",
            Self::PermissionError => "PERMISSION_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified install failure: stable code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct InstallError {
    pub code: ErrorCode,
    pub message: String,
}

impl InstallError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Map a raw fetcher/filesystem error to an [`InstallError`].
///
/// First matching rule wins; the order is part of the contract. `spec` is
/// only consulted to tell local-path absence apart from remote absence.
pub fn classify_failure(spec: &str, raw: &anyhow::Error) -> InstallError {
    let message = format!("{raw:#}");
    let lower = message.to_lowercase();
    let io_kind = raw
        .chain()
        .find_map(|cause| cause.downcast_ref::<std::io::Error>())
        .map(std::io::Error::kind);

    // 1. Sub-path extraction problems reported by the installer itself.
    if lower.contains("sub-path") || lower.contains("not a directory") {
        return InstallError::new(ErrorCode::InstallFailed, message);
    }

    // 2. Network-level failures.
    if is_network_failure(raw, &lower, io_kind) {
        return InstallError::new(ErrorCode::NetworkError, message);
    }

    // 3. HTTP 404.
    if lower.contains("404") {
        return InstallError::new(ErrorCode::InstallFailed, format!("'{spec}' not found (404)"));
    }

    // 4. Repository / package / reference absence.
    if lower.contains("not found")
        || lower.contains("does not exist")
        || lower.contains("could not resolve")
        || lower.contains("couldn't find")
    {
        const REFERENCE_KEYWORDS: &[&str] =
            &["reference", "revision", "branch", "tag", "remote ref", "pathspec"];
        if REFERENCE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return InstallError::new(
                ErrorCode::InstallFailed,
                format!("reference not found (branch, tag, or commit): {message}"),
            );
        }
        if lower.contains("repository") || lower.contains("repo") || lower.contains("package") {
            return InstallError::new(
                ErrorCode::InstallFailed,
                format!("repository or package not found: {message}"),
            );
        }
    }

    // 5. Generic version-control failure markers.
    if lower.contains("fatal:") || lower.contains("git clone") || lower.contains("git ls-remote") {
        return InstallError::new(ErrorCode::InstallFailed, message);
    }

    // 6. Filesystem permission problems.
    if io_kind == Some(ErrorKind::PermissionDenied)
        || lower.contains("permission denied")
        || lower.contains("eacces")
        || lower.contains("operation not permitted")
    {
        return InstallError::new(ErrorCode::PermissionError, message);
    }

    // 7. Missing local path, only when the spec actually is local.
    if spec.starts_with("file:")
        && (io_kind == Some(ErrorKind::NotFound) || lower.contains("no such file"))
    {
        return InstallError::new(ErrorCode::InstallFailed, format!("local path not found: {message}"));
    }

    // 8. Everything else passes through unchanged.
    InstallError::new(ErrorCode::InstallFailed, message)
}

fn is_network_failure(raw: &anyhow::Error, lower: &str, io_kind: Option<ErrorKind>) -> bool {
    if lower.contains("getaddrinfo")
        || lower.contains("network")
        || lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
    {
        return true;
    }
    if matches!(
        io_kind,
        Some(
            ErrorKind::TimedOut
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
        )
    ) {
        return true;
    }
    raw.chain()
        .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
        .any(|e| e.is_timeout() || e.is_connect())
}
