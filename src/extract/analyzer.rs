//! Content-analysis backend used by the generic extractor.
//!
//! The stock implementation talks to an Apache Tika server: the file is
//! streamed from disk in a `PUT` to `{tika_url}/meta`, and the JSON object that
//! comes back is the raw metadata. Tika reports every value as a string (or a list of strings),
//! which is why the generic extractor runs the string-typing pass on it.
//!
//! The client is built from an explicit [`ExtractionConfig`], so each run
//! owns its own connection settings.

use super::ExtractError;
use crate::config::ExtractionConfig;
use reqwest::header::ACCEPT;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Anything that turns a file into a loosely typed JSON object.
pub trait ContentAnalyzer: Send + Sync {
    fn analyze(&self, path: &Path) -> Result<Map<String, Value>, ExtractError>;
}

/// Blocking Tika server client.
pub struct TikaClient {
    meta_url: String,
    client: reqwest::blocking::Client,
}

impl TikaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ExtractError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            meta_url: format!("{}/meta", base_url.trim_end_matches('/')),
            client,
        })
    }

    /// `None` when no server is configured.
    pub fn from_config(config: &ExtractionConfig) -> Result<Option<Self>, ExtractError> {
        match config.tika_url.as_deref() {
            Some(url) if !url.is_empty() => {
                Self::new(url, Duration::from_secs(config.timeout_secs)).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn meta_url(&self) -> &str {
        &self.meta_url
    }
}

impl ContentAnalyzer for TikaClient {
    fn analyze(&self, path: &Path) -> Result<Map<String, Value>, ExtractError> {
        let file = fs::File::open(path)?;
        let bytes = file.metadata()?.len();
        debug!(path = %path.display(), bytes, url = %self.meta_url, "analyzing");

        let value: Value = self
            .client
            .put(&self.meta_url)
            .header(ACCEPT, "application/json")
            .body(file)
            .send()?
            .error_for_status()?
            .json()?;

        match value {
            Value::Object(map) => Ok(map),
            other => Err(ExtractError::UnexpectedResponse(other.to_string())),
        }
    }
}
