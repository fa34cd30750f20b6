//! In-memory catalog that records every operation.
//!
//! Uses `Mutex` (not `RefCell`) so it satisfies the same bounds as the real
//! stores. Failures can be injected per title to exercise error paths.

use super::state::{self, CatalogState, StoredData};
use super::{Catalog, CatalogError, ListingPage, NewRecord, RecordEntry, RecordUpdate};
use crate::naming;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogOp {
    CreateRecord {
        title: String,
        parent: String,
        external: bool,
    },
    UpdateRecord {
        id: String,
        update: RecordUpdate,
    },
    PutData {
        id: String,
        path: PathBuf,
        wait: bool,
        /// Whether the payload existed when the call was made.
        existed: bool,
    },
    CreateCollection {
        title: String,
        parent: String,
    },
    List {
        collection: String,
        offset: usize,
    },
}

pub struct MemoryCatalog {
    endpoint: String,
    page_size: usize,
    state: Mutex<CatalogState>,
    operations: Mutex<Vec<CatalogOp>>,
    fail_create: Mutex<HashSet<String>>,
    fail_put_data: Mutex<bool>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            endpoint: "mem".to_string(),
            page_size,
            state: Mutex::new(CatalogState::new()),
            operations: Mutex::new(Vec::new()),
            fail_create: Mutex::new(HashSet::new()),
            fail_put_data: Mutex::new(false),
        }
    }

    /// Make `create_record` fail for records titled `title`.
    pub fn fail_create_for(&self, title: &str) {
        self.fail_create.lock().unwrap().insert(title.to_string());
    }

    /// Make every `put_data` call fail.
    pub fn fail_put_data(&self) {
        *self.fail_put_data.lock().unwrap() = true;
    }

    pub fn get_operations(&self) -> Vec<CatalogOp> {
        self.operations.lock().unwrap().clone()
    }

    pub fn clear_operations(&self) {
        self.operations.lock().unwrap().clear();
    }

    pub fn record(&self, id: &str) -> Option<RecordEntry> {
        self.state.lock().unwrap().records.get(id).cloned()
    }

    /// Every record as `(title, entry)`, in ID order.
    pub fn records(&self) -> Vec<(String, RecordEntry)> {
        self.state
            .lock()
            .unwrap()
            .records
            .values()
            .map(|r| (r.title.clone(), r.clone()))
            .collect()
    }

    /// Titles of all collections except the root.
    pub fn collection_titles(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .collections
            .iter()
            .filter(|(id, _)| id.as_str() != super::ROOT_COLLECTION)
            .map(|(_, c)| c.title.clone())
            .collect()
    }

    fn log(&self, op: CatalogOp) {
        self.operations.lock().unwrap().push(op);
    }
}

impl Catalog for MemoryCatalog {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn create_record(&self, record: &NewRecord<'_>) -> Result<String, CatalogError> {
        self.log(CatalogOp::CreateRecord {
            title: record.title.to_string(),
            parent: record.parent_id.to_string(),
            external: record.external,
        });
        if self.fail_create.lock().unwrap().contains(record.title) {
            return Err(CatalogError::Backend(format!(
                "injected failure for {}",
                record.title
            )));
        }
        self.state.lock().unwrap().create_record(record)
    }

    fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), CatalogError> {
        self.log(CatalogOp::UpdateRecord {
            id: id.to_string(),
            update: update.clone(),
        });
        self.state.lock().unwrap().update_record(id, update)
    }

    fn put_data(&self, id: &str, path: &Path, wait: bool) -> Result<(), CatalogError> {
        self.log(CatalogOp::PutData {
            id: id.to_string(),
            path: path.to_path_buf(),
            wait,
            existed: path.exists(),
        });
        if *self.fail_put_data.lock().unwrap() {
            return Err(CatalogError::Backend("injected put_data failure".into()));
        }
        let (sha256, size) = state::hash_file(path)?;
        self.state.lock().unwrap().attach_data(
            id,
            StoredData {
                name: naming::file_name(path),
                size,
                sha256,
            },
        )
    }

    fn create_collection(&self, title: &str, parent_id: &str) -> Result<String, CatalogError> {
        self.log(CatalogOp::CreateCollection {
            title: title.to_string(),
            parent: parent_id.to_string(),
        });
        self.state
            .lock()
            .unwrap()
            .create_collection(title, parent_id)
    }

    fn list_collection_items(
        &self,
        collection_id: &str,
        offset: usize,
    ) -> Result<ListingPage, CatalogError> {
        self.log(CatalogOp::List {
            collection: collection_id.to_string(),
            offset,
        });
        self.state
            .lock()
            .unwrap()
            .list(collection_id, offset, self.page_size)
    }
}
