//! Source spec classification.
//!
//! Turns a raw spec string — `github:owner/repo#v1::path:skills/foo`,
//! `git+ssh://…`, `file:../local`, `https://…/skill.tar.gz`,
//! `@scope/name@1.2.0` — into a [`SourceDescriptor`]. Pure string work;
//! classification never touches the network or the filesystem.

use std::path::PathBuf;

use crate::types::{SourceDescriptor, SourceKind};

/// Host prefixes that support the `owner/repo` shorthand.
const VCS_HOST_PREFIXES: &[&str] = &["github:", "gitlab:", "bitbucket:"];

/// Conservative guard: specs carrying this marker are always rejected,
/// regardless of shape. Not a grammar rule.
const UNSUPPORTED_MARKER: &str = "unsupported";

/// Whether `spec` is syntactically installable.
///
/// A spec is valid if it starts with a recognized source prefix, or looks
/// like a scoped (`@scope/name[@version]`) or bare registry package name.
pub fn is_valid_spec(spec: &str) -> bool {
    if spec.is_empty() || spec.contains(' ') || spec.contains(UNSUPPORTED_MARKER) {
        return false;
    }
    has_source_prefix(spec) || is_scoped_package(spec) || is_bare_package(spec)
}

fn has_source_prefix(spec: &str) -> bool {
    VCS_HOST_PREFIXES.iter().any(|prefix| spec.starts_with(prefix))
        || spec.starts_with("git+https://")
        || spec.starts_with("git+ssh://")
        || spec.starts_with("git@")
        || spec.starts_with("file:")
        || spec.starts_with("https://")
        || spec.starts_with("http://")
}

fn is_scoped_package(spec: &str) -> bool {
    let Some(rest) = spec.strip_prefix('@') else {
        return false;
    };
    let Some((scope, name)) = rest.split_once('/') else {
        return false;
    };
    let (name, version) = match name.split_once('@') {
        Some((name, version)) => (name, Some(version)),
        None => (name, None),
    };
    is_package_name(scope) && is_package_name(name) && version.is_none_or(is_package_version)
}

fn is_bare_package(spec: &str) -> bool {
    let (name, version) = match spec.split_once('@') {
        Some((name, version)) => (name, Some(version)),
        None => (spec, None),
    };
    is_package_name(name) && version.is_none_or(is_package_version)
}

fn is_package_name(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_lowercase())
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_package_version(v: &str) -> bool {
    !v.is_empty() && !v.contains('/') && !v.contains('@')
}

/// Classify a valid spec into a structured descriptor.
///
/// Total over the grammar accepted by [`is_valid_spec`]; callers reject
/// invalid specs before classification.
pub fn classify(spec: &str) -> SourceDescriptor {
    classify_with(spec, skilldock_config::home_dir)
}

/// Classification with an injected home lookup for `~/` expansion in
/// `file:` specs, so tests never depend on the real home directory.
pub fn classify_with(
    spec: &str,
    home: impl Fn() -> Option<PathBuf>,
) -> SourceDescriptor {
    for prefix in VCS_HOST_PREFIXES {
        if let Some(rest) = spec.strip_prefix(prefix) {
            return classify_vcs_host(prefix, rest);
        }
    }

    if spec.starts_with("git+ssh://") || spec.starts_with("git@") {
        return classify_git(spec, SourceKind::GitSsh);
    }
    if spec.starts_with("git+https://") {
        return classify_git(spec, SourceKind::GitHttp);
    }

    if let Some(rest) = spec.strip_prefix("file:") {
        return SourceDescriptor {
            kind: SourceKind::LocalDirectory,
            base_locator: normalize_local_path(rest, home),
            committish: None,
            subdir: None,
        };
    }

    if spec.starts_with("https://") || spec.starts_with("http://") {
        let (locator, _) = split_fragment(spec);
        if locator.ends_with(".git") {
            return classify_git(spec, SourceKind::GitHttp);
        }
        return SourceDescriptor {
            kind: SourceKind::ArchiveUrl,
            base_locator: spec.to_string(),
            committish: None,
            subdir: None,
        };
    }

    // Anything else that passed validation is a registry package; the
    // version pin stays in the locator for the fetcher to resolve.
    SourceDescriptor {
        kind: SourceKind::RegistryPackage,
        base_locator: spec.to_string(),
        committish: None,
        subdir: None,
    }
}

fn classify_vcs_host(prefix: &str, rest: &str) -> SourceDescriptor {
    let (locator, fragment) = split_fragment(rest);
    let segments: Vec<&str> = locator.split('/').filter(|s| !s.is_empty()).collect();

    // Shorthand: extra path segments past owner/repo select a sub-path,
    // and the whole fragment (if any) is the committish.
    if segments.len() > 2 {
        return SourceDescriptor {
            kind: SourceKind::VersionControlHost,
            base_locator: format!("{prefix}{}/{}", segments[0], segments[1]),
            committish: fragment.filter(|f| !f.is_empty()).map(str::to_string),
            subdir: Some(segments[2..].join("/")),
        };
    }

    let (committish, subdir) = parse_fragment(fragment);
    SourceDescriptor {
        kind: SourceKind::VersionControlHost,
        base_locator: format!("{prefix}{}", segments.join("/")),
        committish,
        subdir,
    }
}

fn classify_git(spec: &str, kind: SourceKind) -> SourceDescriptor {
    let (locator, fragment) = split_fragment(spec);
    let (committish, subdir) = parse_fragment(fragment);
    SourceDescriptor {
        kind,
        base_locator: locator.to_string(),
        committish,
        subdir,
    }
}

/// Split at the first `#` into (locator, fragment).
fn split_fragment(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once('#') {
        Some((locator, fragment)) => (locator, Some(fragment)),
        None => (spec, None),
    }
}

/// Fragment grammar: `::`-separated tokens. `path:X` selects a sub-path,
/// `semver:X` is recognized but carries no descriptor-level meaning (range
/// resolution belongs to the fetcher), and any other non-empty token is the
/// committish — the last one wins.
fn parse_fragment(fragment: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(fragment) = fragment else {
        return (None, None);
    };
    let mut committish = None;
    let mut subdir = None;
    for token in fragment.split("::") {
        if let Some(path) = token.strip_prefix("path:") {
            if !path.is_empty() {
                subdir = Some(path.to_string());
            }
        } else if token.starts_with("semver:") {
            continue;
        } else if !token.is_empty() {
            committish = Some(token.to_string());
        }
    }
    (committish, subdir)
}

/// `file:` path normalization: strip a URL-style leading `//`, expand a
/// leading `~/`, and resolve to an absolute path.
fn normalize_local_path(rest: &str, home: impl Fn() -> Option<PathBuf>) -> String {
    let trimmed = rest.strip_prefix("//").unwrap_or(rest);
    let expanded = skilldock_config::expand_home_with(trimmed, home);
    skilldock_config::absolutize(&expanded)
        .to_string_lossy()
        .into_owned()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_specs() {
        for spec in [
            "github:owner/repo",
            "github:owner/repo#v1.0.0",
            "gitlab:owner/repo",
            "bitbucket:owner/repo",
            "git+https://example.com/owner/repo.git",
            "git+ssh://git@example.com/owner/repo.git",
            "git@github.com:owner/repo.git",
            "file:../skills/demo",
            "file:/opt/skills/demo",
            "https://example.com/skill.tar.gz",
            "my-skill",
            "my-skill@1.2.0",
            "@scope/my-skill",
            "@scope/my-skill@2.0.0",
        ] {
            assert!(is_valid_spec(spec), "expected valid: {spec}");
        }
    }

    #[test]
    fn test_invalid_specs() {
        for spec in [
            "",
            "has space",
            "unsupported-format:thing",
            "Uppercase-start",
            "-leading-hyphen",
            "@scope-missing-name",
            "@scope/",
            "name@",
            "name@1.0/extra",
        ] {
            assert!(!is_valid_spec(spec), "expected invalid: {spec}");
        }
    }

    #[test]
    fn test_classify_host_with_ref_and_path() {
        let d = classify("github:owner/repo#ref::path:sub");
        assert_eq!(d.kind, SourceKind::VersionControlHost);
        assert_eq!(d.base_locator, "github:owner/repo");
        assert_eq!(d.committish.as_deref(), Some("ref"));
        assert_eq!(d.subdir.as_deref(), Some("sub"));
    }

    #[test]
    fn test_classify_host_plain() {
        let d = classify("github:owner/repo");
        assert_eq!(d.base_locator, "github:owner/repo");
        assert!(d.committish.is_none());
        assert!(d.subdir.is_none());
    }

    #[test]
    fn test_fragment_token_order_is_free() {
        let d = classify("github:owner/repo#path:skills/foo::v2");
        assert_eq!(d.committish.as_deref(), Some("v2"));
        assert_eq!(d.subdir.as_deref(), Some("skills/foo"));
    }

    #[test]
    fn test_last_committish_wins() {
        let d = classify("github:owner/repo#v1::v2");
        assert_eq!(d.committish.as_deref(), Some("v2"));
    }

    #[test]
    fn test_semver_token_discarded() {
        let d = classify("github:owner/repo#semver:^1.0.0");
        assert!(d.committish.is_none());
        assert!(d.subdir.is_none());

        let d = classify("github:owner/repo#semver:^1.0.0::main");
        assert_eq!(d.committish.as_deref(), Some("main"));
    }

    #[test]
    fn test_host_shorthand_extra_segments() {
        let d = classify("github:owner/repo/skills/foo#v1");
        assert_eq!(d.kind, SourceKind::VersionControlHost);
        assert_eq!(d.base_locator, "github:owner/repo");
        assert_eq!(d.subdir.as_deref(), Some("skills/foo"));
        assert_eq!(d.committish.as_deref(), Some("v1"));
    }

    #[test]
    fn test_host_shorthand_without_fragment() {
        let d = classify("gitlab:owner/repo/deep/nested/dir");
        assert_eq!(d.base_locator, "gitlab:owner/repo");
        assert_eq!(d.subdir.as_deref(), Some("deep/nested/dir"));
        assert!(d.committish.is_none());
    }

    #[test]
    fn test_classify_git_ssh() {
        let d = classify("git@github.com:owner/repo.git#main");
        assert_eq!(d.kind, SourceKind::GitSsh);
        assert_eq!(d.base_locator, "git@github.com:owner/repo.git");
        assert_eq!(d.committish.as_deref(), Some("main"));
    }

    #[test]
    fn test_classify_git_https_with_subpath() {
        let d = classify("git+https://example.com/owner/repo.git#main::path:skills/a");
        assert_eq!(d.kind, SourceKind::GitHttp);
        assert_eq!(d.base_locator, "git+https://example.com/owner/repo.git");
        assert_eq!(d.committish.as_deref(), Some("main"));
        assert_eq!(d.subdir.as_deref(), Some("skills/a"));
    }

    #[test]
    fn test_plain_https_git_url() {
        let d = classify("https://example.com/owner/repo.git");
        assert_eq!(d.kind, SourceKind::GitHttp);
    }

    #[test]
    fn test_classify_archive_url() {
        let d = classify("https://example.com/downloads/skill.tar.gz");
        assert_eq!(d.kind, SourceKind::ArchiveUrl);
        assert_eq!(d.base_locator, "https://example.com/downloads/skill.tar.gz");
    }

    #[test]
    fn test_classify_registry_packages() {
        let d = classify("my-skill@1.2.0");
        assert_eq!(d.kind, SourceKind::RegistryPackage);
        assert_eq!(d.base_locator, "my-skill@1.2.0");

        let d = classify("@scope/my-skill");
        assert_eq!(d.kind, SourceKind::RegistryPackage);
    }

    #[test]
    fn test_classify_local_relative() {
        let d = classify_with("file:skills/demo", || Some(PathBuf::from("/home/u")));
        assert_eq!(d.kind, SourceKind::LocalDirectory);
        assert!(PathBuf::from(&d.base_locator).is_absolute());
        assert!(d.base_locator.ends_with("skills/demo"));
        assert!(d.committish.is_none());
        assert!(d.subdir.is_none());
    }

    #[test]
    fn test_classify_local_url_style() {
        let d = classify_with("file:///tmp/skills/demo", || None);
        assert_eq!(d.base_locator, "/tmp/skills/demo");
    }

    #[test]
    fn test_classify_local_tilde_expansion() {
        let d = classify_with("file:~/skills/demo", || Some(PathBuf::from("/home/u")));
        assert_eq!(d.base_locator, "/home/u/skills/demo");
    }
}
