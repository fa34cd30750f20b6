//! Run configuration.
//!
//! Everything the sync needs besides the two positional inputs (local
//! directory and target collection) lives in `catalog-mirror.toml`:
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [sync]
//! max_depth = 1              # Directory levels between the root and dataset dirs
//! link_mode = "reference"    # "reference" or "copy"
//! # scratch = "/scratch/me"  # Staging area for archives and thumbnails
//! on_error = "abort"         # "abort" or "skip"
//!
//! [catalog]
//! store = ".catalog"         # Local catalog store directory
//! endpoint = "local"         # Prefix for referenced raw-data paths
//! page_size = 100            # Items per listing page
//!
//! [thumbnails]
//! max_size = 256             # Longest edge of generated previews, in pixels
//!
//! [extraction]
//! # tika_url = "http://localhost:9998"
//! timeout_secs = 30
//! ignore_keys = ["X-Parsed-By", "X-TIKA:embedded_depth", "Content-Type",
//!                "X-TIKA:parse_time_millis", "resourceName"]
//!
//! # Thumbnails are only published when this table is present.
//! # [publish]
//! # provider = "directory"   # or "http"
//! # directory = "/var/www/thumbs"
//! # public_url = "https://data.example.org/thumbs"
//! ```
//!
//! Loading works in layers: the stock defaults are serialized to a TOML table,
//! the user's file is merged over it key by key, and the result is
//! deserialized and validated. A sparse file that only sets
//! `[sync] link_mode = "copy"` therefore keeps every other default.
//!
//! Unknown keys are rejected to catch typos early.

use crate::normalize::IgnoreKeys;
use crate::types::{FailurePolicy, LinkMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "catalog-mirror.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Unknown publish provider: {0}")]
    UnknownProvider(String),
}

/// Full run configuration loaded from `catalog-mirror.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    pub sync: SyncConfig,
    pub catalog: CatalogConfig,
    pub thumbnails: ThumbnailsConfig,
    pub extraction: ExtractionConfig,
    /// Thumbnail host. `None` disables thumbnail publishing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishConfig>,
}

impl MirrorConfig {
    /// Validate values that serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thumbnails.max_size == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.max_size must be non-zero".into(),
            ));
        }
        if self.catalog.page_size == 0 {
            return Err(ConfigError::Validation(
                "catalog.page_size must be non-zero".into(),
            ));
        }
        if self.extraction.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "extraction.timeout_secs must be non-zero".into(),
            ));
        }
        if let Some(publish) = &self.publish {
            publish.validate()?;
        }
        Ok(())
    }
}

/// Traversal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Number of intermediate directory levels between the synced root and
    /// the dataset directories. `0` ingests the root's entries directly.
    pub max_depth: u32,
    pub link_mode: LinkMode,
    /// Writable staging area. Excluded from mirroring when it lies inside the
    /// synced tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch: Option<PathBuf>,
    pub on_error: FailurePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_depth: 1,
            link_mode: LinkMode::default(),
            scratch: None,
            on_error: FailurePolicy::default(),
        }
    }
}

/// Local catalog store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Directory holding the catalog state file and copied payloads.
    pub store: PathBuf,
    /// Data endpoint prefix prepended to absolute paths in reference mode.
    pub endpoint: String,
    /// Items returned per listing page.
    pub page_size: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            store: PathBuf::from(".catalog"),
            endpoint: "local".to_string(),
            page_size: 100,
        }
    }
}

/// Preview generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    /// Longest edge of a generated thumbnail. Smaller images are not upscaled.
    pub max_size: u32,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self { max_size: 256 }
    }
}

/// Content-analysis settings for the generic extractor.
///
/// Passed explicitly to the analyzer client when it is built, so two runs
/// in the same process can point at different servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Base URL of an Apache Tika server, consulted for images and for every
    /// other file. Without it, images keep their natively read fields and
    /// other files get no extracted metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tika_url: Option<String>,
    pub timeout_secs: u64,
    /// Analyzer keys that describe the analysis itself, not the data.
    pub ignore_keys: IgnoreKeys,
}

pub const DEFAULT_IGNORE_KEYS: &[&str] = &[
    "X-Parsed-By",
    "X-TIKA:embedded_depth",
    "Content-Type",
    "X-TIKA:parse_time_millis",
    "resourceName",
];

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            tika_url: None,
            timeout_secs: 30,
            ignore_keys: IgnoreKeys::from(
                DEFAULT_IGNORE_KEYS
                    .iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>(),
            ),
        }
    }
}

/// Public thumbnail host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishConfig {
    /// `"directory"` or `"http"`.
    pub provider: String,
    /// Target directory for the `directory` provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Upload base URL for the `http` provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Base URL under which uploaded files are publicly visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

impl PublishConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider.to_ascii_lowercase().as_str() {
            "directory" => {
                if self.directory.is_none() {
                    return Err(ConfigError::Validation(
                        "publish.directory is required for the directory provider".into(),
                    ));
                }
                if self.public_url.is_none() {
                    return Err(ConfigError::Validation(
                        "publish.public_url is required for the directory provider".into(),
                    ));
                }
                Ok(())
            }
            "http" => {
                if self.url.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::Validation(
                        "publish.url is required for the http provider".into(),
                    ));
                }
                Ok(())
            }
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

// =============================================================================
// Loading and merging
// =============================================================================

/// Stock defaults as a TOML table, the base layer for user overrides.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(MirrorConfig::default())?)
}

/// Merge `overlay` onto `base`. Tables merge per key; anything else in the
/// overlay replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut merged), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                let next = match merged.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                merged.insert(key, next);
            }
            toml::Value::Table(merged)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` when it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}

/// Merge an optional overlay onto a base, deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<MirrorConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: MirrorConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config at `path`, falling back to stock defaults when absent.
pub fn load_config(path: &Path) -> Result<MirrorConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, load_raw_config(path)?)
}

/// Fully commented stock config, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# catalog-mirror configuration
# ============================
# All settings are optional. Values shown below are the defaults.
# Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Traversal
# ---------------------------------------------------------------------------
[sync]
# Directory levels between the synced root and the dataset directories.
# 0 ingests the root's own entries as records.
max_depth = 1

# "reference": records point at the data where it lies (endpoint + path).
# "copy": data is pushed into the catalog; directories are sent as .tar.gz.
link_mode = "reference"

# Writable staging area for archives and thumbnails. When unset or not
# writable, temporary files are written next to the source data.
# scratch = "/scratch/catalog-mirror"

# What to do when one item fails: "abort" the run or "skip" it and continue.
on_error = "abort"

# ---------------------------------------------------------------------------
# Local catalog store
# ---------------------------------------------------------------------------
[catalog]
store = ".catalog"
endpoint = "local"
page_size = 100

# ---------------------------------------------------------------------------
# Thumbnails
# ---------------------------------------------------------------------------
[thumbnails]
# Longest edge of a preview, in pixels.
max_size = 256

# ---------------------------------------------------------------------------
# Metadata extraction
# ---------------------------------------------------------------------------
[extraction]
# Apache Tika server used for files no specific extractor understands.
# tika_url = "http://localhost:9998"
timeout_secs = 30
# A single key or a list of keys to drop from analyzer output.
ignore_keys = [
    "X-Parsed-By",
    "X-TIKA:embedded_depth",
    "Content-Type",
    "X-TIKA:parse_time_millis",
    "resourceName",
]

# ---------------------------------------------------------------------------
# Thumbnail hosting (omit to disable thumbnails)
# ---------------------------------------------------------------------------
# [publish]
# provider = "directory"
# directory = "/var/www/html/thumbs"
# public_url = "https://data.example.org/thumbs"
#
# [publish]
# provider = "http"
# url = "https://uploads.example.org/thumbs"
# public_url = "https://cdn.example.org/thumbs"
"##
}
