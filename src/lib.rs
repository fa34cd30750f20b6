//! # catalog-mirror
//!
//! Mirror an instrument's output directory into a data catalog. Directories
//! above the dataset level become collections; every file or directory at the
//! dataset level becomes one record, with extracted metadata, a link to (or
//! copy of) its raw data, and optionally published preview thumbnails.
//!
//! Runs are idempotent: an item whose title already exists in its target
//! collection is skipped, so re-running after new data arrived only ingests
//! the new entries.
//!
//! # Pipeline
//!
//! ```text
//! Synchronizer ── walks the tree, one listing per directory
//!   └─ Ingestor ── one record per dataset entry
//!        ├─ ExtractorRegistry → extractor → normalize → metadata JSON
//!        ├─ Catalog: create_record, then reference or put_data
//!        └─ thumbnails → publish → Markdown description
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`sync`] | Hierarchy synchronizer: descend/leaf traversal, failure policy, report |
//! | [`ingest`] | Record ingestor: metadata, raw-data attachment, thumbnails |
//! | [`extract`] | Extractor trait, registry, image and generic extractors, IPTC reader |
//! | [`normalize`] | Raw extractor values → JSON-safe metadata |
//! | [`metadata`] | `metadata.json` sidecars and the record metadata blob |
//! | [`publish`] | Thumbnail upload and Markdown rendering |
//! | [`catalog`] | Catalog trait, paged listing, file-backed JSON store |
//! | [`archive`] | Scratch-dir validation, staging directories, `.tar.gz` packaging |
//! | [`config`] | `catalog-mirror.toml` loading, merging, validation |
//! | [`naming`] | Title derivation and entry filtering rules |
//! | [`types`] | Small shared enums and pairs |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Titles Are Identity
//!
//! A record is matched to its local entry by title alone: the file name
//! without its final extension, or the directory name. No content hashes or
//! timestamps are compared, so a changed file is not re-ingested. Renaming
//! it is.
//!
//! ## Extraction Never Blocks Ingestion
//!
//! Extractors and the content analyzer are best-effort. Their failures are
//! logged and the record is created with whatever metadata remains. Failures
//! of catalog calls and thumbnail uploads, by contrast, fail the item.
//!
//! ## Blocking, Single-Threaded
//!
//! Every catalog call blocks until the backend answers. Items are processed
//! one at a time in name order, which keeps listings, logs and reports
//! deterministic.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod extract;
pub mod ingest;
pub mod metadata;
pub mod naming;
pub mod normalize;
pub mod output;
pub mod publish;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
