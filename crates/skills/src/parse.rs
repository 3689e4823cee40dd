//! SKILL.md manifest parsing.
//!
//! A skill directory carries a `SKILL.md` with YAML frontmatter delimited by
//! `---` lines, and optionally a `package.json` descriptor when the skill is
//! published as a registry package.

use std::path::Path;

use {
    anyhow::{Context, bail},
    serde::Deserialize,
};

use crate::types::SkillManifest;

/// The manifest file every installed skill must have at its root.
pub const MANIFEST_FILE: &str = "SKILL.md";
/// Optional package descriptor sitting next to the manifest.
pub const PACKAGE_DESCRIPTOR_FILE: &str = "package.json";

/// Validate a skill name: lowercase ASCII, hyphens, 1-64 chars.
pub fn validate_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
}

/// Parse SKILL.md contents into a [`SkillManifest`].
pub fn parse_manifest(content: &str) -> anyhow::Result<SkillManifest> {
    let (frontmatter, _body) = split_frontmatter(content)?;
    let manifest: SkillManifest =
        serde_yaml::from_str(&frontmatter).context("invalid SKILL.md frontmatter")?;

    if !validate_name(&manifest.name) {
        bail!(
            "invalid skill name '{}': must be 1-64 lowercase alphanumeric/hyphen chars",
            manifest.name
        );
    }
    Ok(manifest)
}

/// Split SKILL.md content at `---` delimiters into (frontmatter, body).
fn split_frontmatter(content: &str) -> anyhow::Result<(String, String)> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        bail!("SKILL.md must start with YAML frontmatter delimited by ---");
    }

    // Skip the opening ---
    let after_open = &trimmed[3..];
    let close_pos = after_open
        .find("\n---")
        .context("SKILL.md missing closing --- for frontmatter")?;

    let frontmatter = after_open[..close_pos].trim().to_string();
    let body = after_open[close_pos + 4..].trim().to_string();
    Ok((frontmatter, body))
}

/// Version info from a `package.json` next to the manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Try to read and parse `package.json` from a skill directory.
/// Returns `None` if the file doesn't exist or can't be parsed.
pub fn read_package_descriptor(skill_dir: &Path) -> Option<PackageDescriptor> {
    let path = skill_dir.join(PACKAGE_DESCRIPTOR_FILE);
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
