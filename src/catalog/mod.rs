//! Catalog backend surface.
//!
//! The sync only needs a handful of operations from a data catalog, captured
//! by the [`Catalog`] trait:
//!
//! | Operation | Used by |
//! |---|---|
//! | [`create_collection`](Catalog::create_collection) | synchronizer, one per new local directory |
//! | [`list_collection_items`](Catalog::list_collection_items) | synchronizer, via [`list_all_items`] |
//! | [`create_record`](Catalog::create_record) | ingestor |
//! | [`update_record`](Catalog::update_record) | ingestor: raw-data reference, then description |
//! | [`put_data`](Catalog::put_data) | ingestor, copy mode |
//! | [`endpoint`](Catalog::endpoint) | ingestor, reference mode |
//!
//! ## IDs
//!
//! Collection IDs start with `c/`, record IDs with `d/`. The kind filter of
//! [`list_all_items`] relies on that prefix, and thumbnails are named after
//! the part behind the last `/`.
//!
//! ## Paging
//!
//! Listings are paged. The first call (offset 0) fixes the page size: its
//! `count` is taken as the size of every page, and `ceil(total / count)`
//! calls are made in total at offsets `count * i`. Results are merged into a
//! title → ID map where later pages overwrite earlier ones, so duplicate
//! titles resolve to the last ID listed.
//!
//! ## Implementations
//!
//! - [`JsonCatalog`]: file-backed store used by the CLI.
//! - `MemoryCatalog` (tests only): in-process catalog with an operation log.

#[cfg(test)]
pub mod memory;
pub mod state;
pub mod store;

pub use state::{CatalogState, CollectionEntry, RecordEntry, StoredData};
pub use store::JsonCatalog;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// ID of the top-level collection every store starts with.
pub const ROOT_COLLECTION: &str = "c/root";
pub const COLLECTION_PREFIX: &str = "c/";
pub const RECORD_PREFIX: &str = "d/";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No such collection: {0}")]
    UnknownCollection(String),
    #[error("No such record: {0}")]
    UnknownRecord(String),
    #[error("Catalog store {} has format version {found}, expected {expected}", path.display())]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("Catalog backend error: {0}")]
    Backend(String),
}

/// Arguments of [`Catalog::create_record`].
#[derive(Debug, Clone, Copy)]
pub struct NewRecord<'a> {
    pub title: &'a str,
    /// JSON-encoded metadata blob.
    pub metadata: &'a str,
    pub parent_id: &'a str,
    /// The raw data lives outside the catalog (reference mode).
    pub external: bool,
}

/// A partial record update; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub raw_data_reference: Option<String>,
    pub description: Option<String>,
}

impl RecordUpdate {
    pub fn raw_data_reference(location: impl Into<String>) -> Self {
        Self {
            raw_data_reference: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn description(text: impl Into<String>) -> Self {
        Self {
            description: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedItem {
    pub id: String,
    pub title: String,
}

impl ListedItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// One page of a collection listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub items: Vec<ListedItem>,
    pub offset: usize,
    /// Items on this page.
    pub count: usize,
    /// Items in the whole collection.
    pub total: usize,
}

/// The catalog operations the sync depends on. All calls block until the
/// backend has answered.
pub trait Catalog {
    /// Prefix for raw-data locations of referenced records.
    fn endpoint(&self) -> &str;

    fn create_record(&self, record: &NewRecord<'_>) -> Result<String, CatalogError>;

    fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), CatalogError>;

    /// Attach the file at `path` as the record's raw data. With `wait`, the
    /// call returns only after the transfer finished.
    fn put_data(&self, id: &str, path: &Path, wait: bool) -> Result<(), CatalogError>;

    fn create_collection(&self, title: &str, parent_id: &str) -> Result<String, CatalogError>;

    fn list_collection_items(
        &self,
        collection_id: &str,
        offset: usize,
    ) -> Result<ListingPage, CatalogError>;
}

/// Which kind of child to keep when listing a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Records,
    Collections,
    All,
}

impl ListMode {
    pub fn accepts(self, id: &str) -> bool {
        match self {
            Self::Records => id.starts_with(RECORD_PREFIX),
            Self::Collections => id.starts_with(COLLECTION_PREFIX),
            Self::All => true,
        }
    }
}

/// Fetch every page of a collection listing into a title → ID map.
pub fn list_all_items(
    catalog: &dyn Catalog,
    collection_id: &str,
    mode: ListMode,
) -> Result<BTreeMap<String, String>, CatalogError> {
    let mut merged = BTreeMap::new();
    let mut merge = |page: ListingPage| {
        for item in page.items.into_iter().filter(|i| mode.accepts(&i.id)) {
            merged.insert(item.title, item.id);
        }
    };

    let first = catalog.list_collection_items(collection_id, 0)?;
    let page_size = first.count;
    let total = first.total;
    merge(first);

    if page_size > 0 {
        let pages = total.div_ceil(page_size);
        for page in 1..pages {
            merge(catalog.list_collection_items(collection_id, page_size * page)?);
        }
        debug!(collection = collection_id, pages, total, "listing fetched");
    }
    Ok(merged)
}
