//! Skill installation engine: spec classification, clean installs from
//! version-control hosts, git remotes, archives, local directories, and
//! registry packages, and the lock file recording what was installed.
//!
//! Skills are directories containing a `SKILL.md` file with YAML frontmatter
//! and markdown instructions, following the Agent Skills open standard.

pub mod error;
pub mod fetcher;
pub mod fsutil;
pub mod install;
pub mod lockfile;
pub mod parse;
pub mod source;
pub mod types;
