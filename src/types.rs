//! Shared value types used across the sync pipeline.
//!
//! These are small, `Copy`-friendly enums and pairs that flow between the
//! synchronizer, the ingestor and the extractors, and that are read from
//! `catalog-mirror.toml`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How a record's raw data reaches the catalog.
///
/// - `Reference`: the record stores `endpoint + absolute path`. Nothing moves,
///   but the catalog backend must be able to see the local filesystem.
/// - `Copy`: the bytes are pushed into the record. Directories are archived
///   to a `.tar.gz` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    #[default]
    Reference,
    Copy,
}

impl FromStr for LinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reference" | "link" => Ok(Self::Reference),
            "copy" => Ok(Self::Copy),
            other => Err(format!(
                "unknown link mode '{other}' (expected 'reference' or 'copy')"
            )),
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => f.write_str("reference"),
            Self::Copy => f.write_str("copy"),
        }
    }
}

/// What the synchronizer does when a single item fails hard.
///
/// `Abort` stops the whole traversal at the first failing item. `Skip` logs
/// the failure, records it in the report and moves on; the item is retried on
/// the next run because nothing was registered under its title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Skip,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(format!(
                "unknown failure policy '{other}' (expected 'abort' or 'skip')"
            )),
        }
    }
}

/// Kind of a local filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn of(path: &Path) -> Self {
        if path.is_dir() {
            Self::Directory
        } else {
            Self::File
        }
    }
}

/// A locally generated preview image waiting to be published.
///
/// `label` becomes the Markdown alt text. The file at `path` is deleted once
/// the publisher has uploaded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailPair {
    pub label: String,
    pub path: PathBuf,
}

impl ThumbnailPair {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_mode_parses_case_insensitively() {
        assert_eq!("COPY".parse::<LinkMode>().unwrap(), LinkMode::Copy);
        assert_eq!("reference".parse::<LinkMode>().unwrap(), LinkMode::Reference);
        assert_eq!("link".parse::<LinkMode>().unwrap(), LinkMode::Reference);
    }

    #[test]
    fn link_mode_rejects_unknown() {
        let err = "move".parse::<LinkMode>().unwrap_err();
        assert!(err.contains("move"));
    }

    #[test]
    fn link_mode_display_round_trips() {
        for mode in [LinkMode::Reference, LinkMode::Copy] {
            assert_eq!(mode.to_string().parse::<LinkMode>().unwrap(), mode);
        }
    }

    #[test]
    fn failure_policy_parses() {
        assert_eq!("Skip".parse::<FailurePolicy>().unwrap(), FailurePolicy::Skip);
        assert!("retry".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn defaults_are_reference_and_abort() {
        assert_eq!(LinkMode::default(), LinkMode::Reference);
        assert_eq!(FailurePolicy::default(), FailurePolicy::Abort);
    }
}
