//! Dataset metadata: the `metadata.json` sidecar and the record metadata blob.
//!
//! Every record carries a JSON metadata blob assembled from two independent
//! sources:
//!
//! | Key | Source | Present when |
//! |---|---|---|
//! | `web_metadata` | the dataset directory's `metadata.json`, verbatim | file records: non-empty; directory records: always |
//! | `extracted_metadata` | the selected extractor, normalized | file records with non-empty extraction |
//!
//! ## Sidecar lookup
//!
//! The sidecar is matched case-insensitively, so `Metadata.JSON` counts. When
//! a directory holds several case variants, entries are compared in byte
//! order of their names and the first one wins. The losing variants are still
//! excluded from ingestion by [`naming::is_metadata_file`].
//!
//! A missing, unreadable or malformed sidecar is never fatal. It yields an
//! empty mapping and a warning, and the records in that directory are created
//! without web metadata.

use crate::naming;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const WEB_METADATA_KEY: &str = "web_metadata";
pub const EXTRACTED_METADATA_KEY: &str = "extracted_metadata";

/// Locate the dataset sidecar in `dir`, ignoring case.
pub fn find_metadata_file(dir: &Path) -> Option<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot list directory for metadata.json");
            return None;
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| naming::is_metadata_file(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    candidates.sort();

    if candidates.len() > 1 {
        warn!(
            dir = %dir.display(),
            count = candidates.len(),
            "several metadata.json variants, using {}",
            candidates[0].display()
        );
    }
    candidates.into_iter().next()
}

/// Load the sidecar of `dir` as a JSON object.
///
/// Absence, read errors, parse errors and non-object documents all degrade
/// to an empty mapping.
pub fn load_web_metadata(dir: &Path) -> Map<String, Value> {
    let Some(path) = find_metadata_file(dir) else {
        warn!(dir = %dir.display(), "no metadata.json found");
        return Map::new();
    };

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read metadata.json");
            return Map::new();
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => {
            debug!(path = %path.display(), keys = map.len(), "loaded web metadata");
            map
        }
        Ok(other) => {
            warn!(
                path = %path.display(),
                "metadata.json is not an object (found {}), ignoring",
                json_kind(&other)
            );
            Map::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "metadata.json is not valid JSON, ignoring");
            Map::new()
        }
    }
}

/// Metadata blob for a directory record: web metadata only, always keyed.
pub fn directory_metadata(web: &Map<String, Value>) -> Value {
    let mut blob = Map::new();
    blob.insert(WEB_METADATA_KEY.into(), Value::Object(web.clone()));
    Value::Object(blob)
}

/// Metadata blob for a file record. Empty sources are left out.
pub fn file_metadata(web: &Map<String, Value>, extracted: &Map<String, Value>) -> Value {
    let mut blob = Map::new();
    if !web.is_empty() {
        blob.insert(WEB_METADATA_KEY.into(), Value::Object(web.clone()));
    }
    if !extracted.is_empty() {
        blob.insert(EXTRACTED_METADATA_KEY.into(), Value::Object(extracted.clone()));
    }
    Value::Object(blob)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
