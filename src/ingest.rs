//! Record ingestion: one local file or directory becomes one catalog record.
//!
//! ## Lifecycle
//!
//! ```text
//! title ─▶ metadata ─▶ create_record ─▶ attach raw data ─▶ thumbnails ─▶ description
//!                                            │
//!                              copy + directory: done here
//! ```
//!
//! 1. **Title**: the directory name, or the file name minus its final
//!    extension (see [`naming`]).
//! 2. **Metadata**: directories carry `{"web_metadata": …}` only. Files go
//!    through extractor selection and normalization, combined with the web
//!    metadata; empty parts are left out.
//! 3. **Create** the record under the target collection with the metadata
//!    blob JSON-encoded.
//! 4. **Attach** raw data:
//!    - `reference`: set the raw-data location to `endpoint + absolute path`.
//!    - `copy`, file: push the file.
//!    - `copy`, directory: archive to `.tar.gz` in a private staging
//!      directory (in scratch, else beside the source), push it and wait for
//!      completion, delete the staging directory.
//! 5. **Thumbnails** (files only): with an uploader configured and an
//!    extractor that renders previews, render them into a fresh staging
//!    directory, publish them under the record's numeric ID and set the
//!    record description to the Markdown.
//!
//! Staging directories are hidden, uniquely named and owned by the call, so
//! generated files such as `12.png` or `raw.tar.gz` never replace a user
//! file of the same name.
//!
//! Directory records end after step 4 in both link modes.
//!
//! ## Failures
//!
//! | Step | Failure | Effect |
//! |---|---|---|
//! | 2 | extractor error, no extractor | warning, no extracted metadata |
//! | 3, 4 | catalog or archive error | [`IngestError`], record may exist without data |
//! | 5 | staging or preview rendering error | warning, record kept without description |
//! | 5 | upload error | [`IngestError::Publish`] |
//!
//! A record left without data by a failed step 4 still occupies its title,
//! so the next sync skips it. Clean such records up in the catalog before
//! re-running.

use crate::archive::{self, ArchiveError, TempArchive};
use crate::catalog::{Catalog, CatalogError, NewRecord, RecordUpdate};
use crate::extract::ExtractorRegistry;
use crate::metadata;
use crate::naming;
use crate::normalize::{self, ExtractedMetadata};
use crate::publish::{self, PublicUploader, PublishError};
use crate::types::{LinkMode, NodeKind};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("Thumbnail publishing failed: {0}")]
    Publish(#[from] PublishError),
    #[error("Metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cannot resolve {}: {source}", path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Path has no name: {}", .0.display())]
    NoName(PathBuf),
    #[error("No such file or directory: {}", .0.display())]
    Missing(PathBuf),
}

/// Ingests single items into a catalog with fixed run settings.
pub struct Ingestor<'a> {
    catalog: &'a dyn Catalog,
    registry: &'a ExtractorRegistry,
    uploader: Option<&'a dyn PublicUploader>,
    link_mode: LinkMode,
    scratch: Option<PathBuf>,
}

impl<'a> Ingestor<'a> {
    /// `scratch` is validated here, once; an unusable scratch directory
    /// falls back to writing temporary files beside the source.
    pub fn new(
        catalog: &'a dyn Catalog,
        registry: &'a ExtractorRegistry,
        uploader: Option<&'a dyn PublicUploader>,
        link_mode: LinkMode,
        scratch: Option<&Path>,
    ) -> Self {
        Self {
            catalog,
            registry,
            uploader,
            link_mode,
            scratch: scratch.and_then(archive::validate_scratch_dir),
        }
    }

    pub fn link_mode(&self) -> LinkMode {
        self.link_mode
    }

    /// The validated scratch directory, if any.
    pub fn scratch(&self) -> Option<&Path> {
        self.scratch.as_deref()
    }

    /// Create the record for `path` under `collection` and return its ID.
    pub fn ingest(
        &self,
        path: &Path,
        web_metadata: &Map<String, Value>,
        collection: &str,
    ) -> Result<String, IngestError> {
        if !path.exists() {
            return Err(IngestError::Missing(path.to_path_buf()));
        }
        let path = std::path::absolute(path).map_err(|source| IngestError::Resolve {
            path: path.to_path_buf(),
            source,
        })?;
        let kind = NodeKind::of(&path);
        let name = naming::file_name(&path);
        if name.is_empty() {
            return Err(IngestError::NoName(path));
        }
        let title = naming::record_title(&name, kind);

        let selected = match kind {
            NodeKind::Directory => None,
            NodeKind::File => self.registry.select(&path),
        };
        let blob = match kind {
            NodeKind::Directory => metadata::directory_metadata(web_metadata),
            NodeKind::File => {
                let extracted = match &selected {
                    Some(extractor) => extract_or_warn(&path, extractor.name(), extractor.metadata()),
                    None => {
                        debug!(path = %path.display(), "no extractor accepts file");
                        ExtractedMetadata::new()
                    }
                };
                metadata::file_metadata(web_metadata, &extracted)
            }
        };
        let metadata_json = serde_json::to_string(&blob)?;

        let id = self.catalog.create_record(&NewRecord {
            title: &title,
            metadata: &metadata_json,
            parent_id: collection,
            external: self.link_mode == LinkMode::Reference,
        })?;
        debug!(id = %id, title = %title, "record created");

        self.attach_data(&id, &path, kind)?;
        if kind == NodeKind::Directory {
            return Ok(id);
        }

        let (Some(uploader), Some(extractor)) = (self.uploader, &selected) else {
            return Ok(id);
        };
        // Removed with any leftovers when this call returns.
        let staging = match archive::staging_dir(&path, self.scratch()) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stage thumbnails");
                return Ok(id);
            }
        };
        let pairs = match extractor.thumbnails(naming::numeric_id(&id), Some(staging.path())) {
            Ok(Some(pairs)) if !pairs.is_empty() => pairs,
            Ok(_) => return Ok(id),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "thumbnail rendering failed");
                return Ok(id);
            }
        };

        let description = publish::publish(&pairs, Some(uploader))?;
        if !description.is_empty() {
            self.catalog
                .update_record(&id, &RecordUpdate::description(description))?;
            debug!(id = %id, thumbnails = pairs.len(), "description set");
        }
        Ok(id)
    }

    fn attach_data(&self, id: &str, path: &Path, kind: NodeKind) -> Result<(), IngestError> {
        match (self.link_mode, kind) {
            (LinkMode::Reference, _) => {
                let location = format!("{}{}", self.catalog.endpoint(), path.display());
                self.catalog
                    .update_record(id, &RecordUpdate::raw_data_reference(location))?;
            }
            (LinkMode::Copy, NodeKind::File) => {
                self.catalog.put_data(id, path, false)?;
            }
            (LinkMode::Copy, NodeKind::Directory) => {
                // Deleted on drop, whether or not the upload succeeded.
                let tarball = TempArchive::create(path, self.scratch())?;
                self.catalog.put_data(id, tarball.path(), true)?;
            }
        }
        Ok(())
    }
}

fn extract_or_warn(
    path: &Path,
    extractor: &str,
    result: Result<normalize::RawMetadata, crate::extract::ExtractError>,
) -> ExtractedMetadata {
    match result {
        Ok(raw) => normalize::normalize(raw),
        Err(e) => {
            warn!(path = %path.display(), extractor, error = %e, "metadata extraction failed");
            ExtractedMetadata::new()
        }
    }
}
