//! File-backed catalog.
//!
//! The whole catalog lives in one directory:
//!
//! ```text
//! .catalog/
//! ├── catalog.json          # collections, records, metadata, descriptions
//! └── data/
//!     └── 17/scan.tar.gz    # raw data pushed with put_data, by record number
//! ```
//!
//! `catalog.json` is rewritten after every mutation (write to a temporary
//! file, then rename), so a run that dies halfway leaves every record created
//! so far on disk and the next run picks up from there.
//!
//! Unlike a cache, an unreadable state file is an error rather than a fresh
//! start: starting empty would duplicate every record on the next sync.

use super::state::{self, CatalogState, StoredData};
use super::{Catalog, CatalogError, ListingPage, NewRecord, RecordUpdate, RecordEntry};
use crate::config::CatalogConfig;
use crate::naming;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

const STATE_FILENAME: &str = "catalog.json";
const DATA_DIRNAME: &str = "data";

pub struct JsonCatalog {
    dir: PathBuf,
    endpoint: String,
    page_size: usize,
    state: Mutex<CatalogState>,
}

impl JsonCatalog {
    /// Open the store at `dir`, creating an empty one if needed.
    pub fn open(
        dir: impl Into<PathBuf>,
        endpoint: impl Into<String>,
        page_size: usize,
    ) -> Result<Self, CatalogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let path = dir.join(STATE_FILENAME);

        let state = if path.exists() {
            let loaded: CatalogState = serde_json::from_str(&fs::read_to_string(&path)?)?;
            if loaded.version != state::STATE_VERSION {
                return Err(CatalogError::VersionMismatch {
                    path,
                    found: loaded.version,
                    expected: state::STATE_VERSION,
                });
            }
            debug!(
                path = %path.display(),
                collections = loaded.collections.len(),
                records = loaded.records.len(),
                "catalog loaded"
            );
            loaded
        } else {
            info!(path = %path.display(), "creating new catalog store");
            let fresh = CatalogState::new();
            write_state(&path, &fresh)?;
            fresh
        };

        Ok(Self {
            dir,
            endpoint: endpoint.into(),
            page_size: page_size.max(1),
            state: Mutex::new(state),
        })
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        Self::open(&config.store, config.endpoint.clone(), config.page_size)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A copy of a record, for inspection.
    pub fn record(&self, id: &str) -> Option<RecordEntry> {
        self.lock().records.get(id).cloned()
    }

    /// A copy of the full state.
    pub fn snapshot(&self) -> CatalogState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to a copy, persist it, then make it current. On any
    /// error the in-memory state matches the file on disk.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut CatalogState) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let mut state = self.lock();
        let mut next = state.clone();
        let out = change(&mut next)?;
        write_state(&self.dir.join(STATE_FILENAME), &next)?;
        *state = next;
        Ok(out)
    }
}

fn write_state(path: &Path, state: &CatalogState) -> Result<(), CatalogError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl Catalog for JsonCatalog {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn create_record(&self, record: &NewRecord<'_>) -> Result<String, CatalogError> {
        let id = self.mutate(|s| s.create_record(record))?;
        info!(id = %id, title = record.title, parent = record.parent_id, "record created");
        Ok(id)
    }

    fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), CatalogError> {
        self.mutate(|s| s.update_record(id, update))
    }

    fn put_data(&self, id: &str, path: &Path, _wait: bool) -> Result<(), CatalogError> {
        // Copies complete before returning, so `wait` is always honoured.
        self.lock().record_mut(id)?;

        let name = naming::file_name(path);
        let target_dir = self.dir.join(DATA_DIRNAME).join(naming::numeric_id(id));
        fs::create_dir_all(&target_dir)?;
        fs::copy(path, target_dir.join(&name))?;
        let (sha256, size) = state::hash_file(path)?;
        debug!(id, file = %name, size, "raw data stored");

        self.mutate(|s| s.attach_data(id, StoredData { name, size, sha256 }))
    }

    fn create_collection(&self, title: &str, parent_id: &str) -> Result<String, CatalogError> {
        let id = self.mutate(|s| s.create_collection(title, parent_id))?;
        info!(id = %id, title, parent = parent_id, "collection created");
        Ok(id)
    }

    fn list_collection_items(
        &self,
        collection_id: &str,
        offset: usize,
    ) -> Result<ListingPage, CatalogError> {
        self.lock().list(collection_id, offset, self.page_size)
    }
}
