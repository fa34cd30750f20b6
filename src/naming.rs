//! Naming rules shared by the synchronizer and the ingestor.
//!
//! The catalog has no notion of local paths, so every idempotence decision
//! is made on titles. These functions are the single place that decides what
//! title a local entry maps to.
//!
//! ## Record titles
//!
//! - Directory `run42/` → `"run42"` (the name, untouched)
//! - File `sample.dat.tif` → `"sample.dat"` (only the final extension goes)
//! - File `README` → `"README"` (nothing to strip)
//!
//! Multi-dot names are ambiguous: `a.b.c` could be `a` with a `.b.c`
//! extension. Only the last segment is ever stripped, so `scan.tar.gz` maps to
//! `scan.tar`, and two files that differ only in extension collide on the
//! same title. The second one is then reported as already present.

use crate::types::NodeKind;
use std::path::Path;

/// Name of the per-dataset metadata file, matched case-insensitively.
pub const METADATA_FILENAME: &str = "metadata.json";

/// Derive the catalog title for a local entry.
pub fn record_title(name: &str, kind: NodeKind) -> String {
    match kind {
        NodeKind::Directory => name.to_string(),
        NodeKind::File => strip_final_extension(name).to_string(),
    }
}

/// Derive the catalog title for a path on disk.
pub fn title_for_path(path: &Path) -> String {
    let name = file_name(path);
    record_title(&name, NodeKind::of(path))
}

/// Drop everything from the last dot onward.
///
/// A leading dot is not treated as an extension separator, so `.bashrc`
/// stays `.bashrc` (hidden entries never reach this point anyway).
pub fn strip_final_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(pos) => &name[..pos],
    }
}

/// Final extension of a file name, lowercased. Empty when there is none.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(pos) => name[pos + 1..].to_ascii_lowercase(),
    }
}

/// Numeric part of a catalog ID: `"d/12345"` → `"12345"`.
///
/// Catalog IDs carry a kind prefix that does not belong in file names, so
/// thumbnails are keyed on the part after the last `/`.
pub fn numeric_id(record_id: &str) -> &str {
    record_id.rsplit('/').next().unwrap_or(record_id)
}

/// Hidden entries (dot-files) are never ingested.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Whether `name` is the dataset metadata file, ignoring case.
pub fn is_metadata_file(name: &str) -> bool {
    name.eq_ignore_ascii_case(METADATA_FILENAME)
}

/// Lossy file name of a path; empty for paths like `/` or `..`.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
