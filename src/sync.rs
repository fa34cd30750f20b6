//! Hierarchy synchronization: mirror a directory tree into catalog
//! collections and ingest every dataset exactly once.
//!
//! ## Shape of the tree
//!
//! `max_depth` is the number of directory levels between the synced root and
//! the dataset directories:
//!
//! ```text
//! instrument/                 sync(instrument, c/root, max_depth = 1)
//! ├── 2024-05-01/             → collection "2024-05-01"   (descend, depth 1)
//! │   ├── sample-a/           → collection "sample-a"     (leaf, depth 0)
//! │   │   ├── metadata.json   web metadata for the records below
//! │   │   ├── frame001.tif    → record "frame001"
//! │   │   └── spectra/        → record "spectra"
//! │   └── sample-b/ …
//! └── notes.txt               ignored: files above the leaf level are skipped
//! ```
//!
//! ## States
//!
//! - **Descend** (`depth > 0`): list the child collections once, then for each
//!   local subdirectory reuse the collection with the same title or create
//!   one, and recurse with `depth - 1`.
//! - **Leaf** (`depth == 0`): list the existing records once, load the
//!   directory's `metadata.json`, and ingest every entry whose derived title
//!   is not listed yet. The sidecar itself and hidden entries are never
//!   ingested.
//!
//! Listings are fetched fresh per directory and never cached across calls,
//! so every run re-derives the remote state. Titles created during the run
//! are added to the listing, so two entries mapping to the same title yield
//! one record.
//!
//! ## Exclusions
//!
//! The scratch directory, the catalog store and hidden directories are never
//! mirrored, wherever they sit in the tree.
//!
//! ## Failures
//!
//! Per-item failures (ingestion, creating a child collection, syncing a
//! subtree) follow the [`FailurePolicy`]: `abort` returns the first one as
//! the error of the whole run, `skip` logs it, records it in the
//! [`SyncReport`] and continues. Failures at the synced root itself always
//! abort.
//!
//! There is no guard against concurrent writers: a collection or record
//! created by someone else between the listing and the create call is
//! duplicated.

use crate::catalog::{self, Catalog, CatalogError, ListMode};
use crate::config::SyncConfig;
use crate::extract::ExtractorRegistry;
use crate::ingest::{IngestError, Ingestor};
use crate::metadata;
use crate::naming;
use crate::publish::PublicUploader;
use crate::types::{FailurePolicy, LinkMode};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Cannot read directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("Failed to ingest {}: {source}", path.display())]
    Item {
        path: PathBuf,
        #[source]
        source: IngestError,
    },
    #[error("Failed to create collection for {}: {source}", path.display())]
    Collection {
        path: PathBuf,
        #[source]
        source: CatalogError,
    },
}

/// Progress notifications, sent as they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    CollectionCreated {
        title: String,
        id: String,
        depth: u32,
    },
    CollectionFound {
        title: String,
        id: String,
        depth: u32,
    },
    LeafStarted {
        path: PathBuf,
        collection: String,
        existing: usize,
    },
    RecordCreated {
        title: String,
        id: String,
    },
    RecordSkipped {
        title: String,
    },
    ItemFailed {
        path: PathBuf,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub path: PathBuf,
    pub error: String,
}

/// What a sync run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub collections_created: usize,
    pub collections_found: usize,
    pub records_created: usize,
    pub records_skipped: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run settings that do not change during a sync.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub link_mode: LinkMode,
    pub scratch: Option<PathBuf>,
    pub on_error: FailurePolicy,
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            link_mode: config.link_mode,
            scratch: config.scratch.clone(),
            on_error: config.on_error,
        }
    }
}

pub struct Synchronizer<'a> {
    catalog: &'a dyn Catalog,
    ingestor: Ingestor<'a>,
    on_error: FailurePolicy,
    excluded: Vec<PathBuf>,
    events: Option<Sender<SyncEvent>>,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        registry: &'a ExtractorRegistry,
        uploader: Option<&'a dyn PublicUploader>,
        options: &SyncOptions,
    ) -> Self {
        let ingestor = Ingestor::new(
            catalog,
            registry,
            uploader,
            options.link_mode,
            options.scratch.as_deref(),
        );
        let mut sync = Self {
            catalog,
            ingestor,
            on_error: options.on_error,
            excluded: Vec::new(),
            events: None,
        };
        if let Some(scratch) = &options.scratch {
            sync.exclude(scratch);
        }
        sync
    }

    /// Never mirror `path`. Ignored when it does not exist.
    pub fn exclude(&mut self, path: &Path) {
        if let Ok(canonical) = path.canonicalize() {
            self.excluded.push(canonical);
        }
    }

    /// Send [`SyncEvent`]s to `tx` during the run.
    pub fn with_events(mut self, tx: Sender<SyncEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Ingest a single item into `collection`, web metadata taken from the
    /// sidecar of its parent directory.
    pub fn ingest_one(&self, path: &Path, collection: &str) -> Result<String, IngestError> {
        let parent = std::path::absolute(path)
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let web = metadata::load_web_metadata(&parent);
        let id = self.ingestor.ingest(path, &web, collection)?;
        self.emit(SyncEvent::RecordCreated {
            title: naming::title_for_path(path),
            id: id.clone(),
        });
        Ok(id)
    }

    /// Mirror `local_dir` into `collection`, `max_depth` levels above the
    /// dataset directories.
    pub fn sync(
        &self,
        local_dir: &Path,
        collection: &str,
        max_depth: u32,
    ) -> Result<SyncReport, SyncError> {
        if !local_dir.is_dir() {
            return Err(SyncError::NotADirectory(local_dir.to_path_buf()));
        }
        info!(
            dir = %local_dir.display(),
            collection,
            max_depth,
            link_mode = %self.ingestor.link_mode(),
            "sync started"
        );
        let mut report = SyncReport::default();
        self.sync_dir(local_dir, collection, max_depth, &mut report)?;
        info!(
            created = report.records_created,
            skipped = report.records_skipped,
            failed = report.failures.len(),
            "sync finished"
        );
        Ok(report)
    }

    fn sync_dir(
        &self,
        dir: &Path,
        collection: &str,
        depth: u32,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        if depth == 0 {
            self.leaf(dir, collection, report)
        } else {
            self.descend(dir, collection, depth, report)
        }
    }

    fn descend(
        &self,
        dir: &Path,
        collection: &str,
        depth: u32,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let mut children = catalog::list_all_items(self.catalog, collection, ListMode::Collections)?;
        debug!(dir = %dir.display(), collection, existing = children.len(), "descending");

        for path in sorted_entries(dir)? {
            let name = naming::file_name(&path);
            if !path.is_dir() || naming::is_hidden(&name) || self.is_excluded(&path) {
                debug!(path = %path.display(), "not mirrored");
                continue;
            }

            let child_id = match children.get(&name) {
                Some(id) => {
                    report.collections_found += 1;
                    self.emit(SyncEvent::CollectionFound {
                        title: name.clone(),
                        id: id.clone(),
                        depth,
                    });
                    id.clone()
                }
                None => match self.catalog.create_collection(&name, collection) {
                    Ok(id) => {
                        report.collections_created += 1;
                        self.emit(SyncEvent::CollectionCreated {
                            title: name.clone(),
                            id: id.clone(),
                            depth,
                        });
                        children.insert(name.clone(), id.clone());
                        id
                    }
                    Err(source) => {
                        let err = SyncError::Collection { path, source };
                        self.handle_failure(err, report)?;
                        continue;
                    }
                },
            };

            if let Err(err) = self.sync_dir(&path, &child_id, depth - 1, report) {
                self.handle_failure(err, report)?;
            }
        }
        Ok(())
    }

    fn leaf(&self, dir: &Path, collection: &str, report: &mut SyncReport) -> Result<(), SyncError> {
        let mut existing = catalog::list_all_items(self.catalog, collection, ListMode::Records)?;
        self.emit(SyncEvent::LeafStarted {
            path: dir.to_path_buf(),
            collection: collection.to_string(),
            existing: existing.len(),
        });
        let web = metadata::load_web_metadata(dir);

        for path in sorted_entries(dir)? {
            let name = naming::file_name(&path);
            if naming::is_metadata_file(&name) || naming::is_hidden(&name) {
                debug!(path = %path.display(), "not a dataset entry");
                continue;
            }
            if self.is_excluded(&path) {
                continue;
            }

            let title = naming::title_for_path(&path);
            if existing.contains_key(&title) {
                info!(title = %title, collection, "already present in collection");
                report.records_skipped += 1;
                self.emit(SyncEvent::RecordSkipped { title });
                continue;
            }

            match self.ingestor.ingest(&path, &web, collection) {
                Ok(id) => {
                    report.records_created += 1;
                    self.emit(SyncEvent::RecordCreated {
                        title: title.clone(),
                        id: id.clone(),
                    });
                    existing.insert(title, id);
                }
                Err(source) => self.handle_failure(SyncError::Item { path, source }, report)?,
            }
        }
        Ok(())
    }

    /// Apply the failure policy: `Err` to abort, `Ok` to carry on.
    fn handle_failure(&self, err: SyncError, report: &mut SyncReport) -> Result<(), SyncError> {
        let path = match &err {
            SyncError::Item { path, .. }
            | SyncError::Collection { path, .. }
            | SyncError::ReadDir { path, .. }
            | SyncError::NotADirectory(path) => path.clone(),
            SyncError::Catalog(_) => PathBuf::new(),
        };
        match self.on_error {
            FailurePolicy::Abort => Err(err),
            FailurePolicy::Skip => {
                warn!(path = %path.display(), error = %err, "skipping failed item");
                self.emit(SyncEvent::ItemFailed {
                    path: path.clone(),
                    error: err.to_string(),
                });
                report.failures.push(SyncFailure {
                    path,
                    error: err.to_string(),
                });
                Ok(())
            }
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        !self.excluded.is_empty()
            && path
                .canonicalize()
                .is_ok_and(|canonical| self.excluded.contains(&canonical))
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            // The receiver only prints; a closed channel just means nobody listens.
            let _ = tx.send(event);
        }
    }
}

/// Directory entries sorted by name.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let read = |source| SyncError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir)
        .map_err(read)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read)?;
    entries.sort();
    Ok(entries)
}
