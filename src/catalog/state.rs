//! In-memory model of a catalog, shared by the stores.
//!
//! Collections keep their children as an ordered ID list, so listings come
//! out in creation order: child collections first, then records.

use super::{
    COLLECTION_PREFIX, CatalogError, ListedItem, ListingPage, NewRecord, RECORD_PREFIX,
    ROOT_COLLECTION, RecordUpdate,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

/// Version of the serialized state. Bump when the layout changes.
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub title: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub title: String,
    pub parent: String,
    pub metadata: Value,
    pub external: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StoredData>,
}

/// Raw data pushed into the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredData {
    /// File name as uploaded.
    pub name: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogState {
    pub version: u32,
    next_id: u64,
    pub collections: BTreeMap<String, CollectionEntry>,
    pub records: BTreeMap<String, RecordEntry>,
}

impl Default for CatalogState {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogState {
    /// A catalog holding only the root collection.
    pub fn new() -> Self {
        let mut collections = BTreeMap::new();
        collections.insert(
            ROOT_COLLECTION.to_string(),
            CollectionEntry {
                title: "root".to_string(),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            version: STATE_VERSION,
            next_id: 1,
            collections,
            records: BTreeMap::new(),
        }
    }

    fn allocate(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}{}", self.next_id);
        self.next_id += 1;
        id
    }

    fn collection_mut(&mut self, id: &str) -> Result<&mut CollectionEntry, CatalogError> {
        self.collections
            .get_mut(id)
            .ok_or_else(|| CatalogError::UnknownCollection(id.to_string()))
    }

    pub fn record_mut(&mut self, id: &str) -> Result<&mut RecordEntry, CatalogError> {
        self.records
            .get_mut(id)
            .ok_or_else(|| CatalogError::UnknownRecord(id.to_string()))
    }

    pub fn create_collection(&mut self, title: &str, parent_id: &str) -> Result<String, CatalogError> {
        self.collection_mut(parent_id)?;
        let id = self.allocate(COLLECTION_PREFIX);
        self.collections.insert(
            id.clone(),
            CollectionEntry {
                title: title.to_string(),
                parent: Some(parent_id.to_string()),
                children: Vec::new(),
            },
        );
        self.collection_mut(parent_id)?.children.push(id.clone());
        Ok(id)
    }

    pub fn create_record(&mut self, record: &NewRecord<'_>) -> Result<String, CatalogError> {
        self.collection_mut(record.parent_id)?;
        let metadata: Value = serde_json::from_str(record.metadata)?;
        let id = self.allocate(RECORD_PREFIX);
        self.records.insert(
            id.clone(),
            RecordEntry {
                title: record.title.to_string(),
                parent: record.parent_id.to_string(),
                metadata,
                external: record.external,
                raw_data_reference: None,
                description: None,
                data: None,
            },
        );
        self.collection_mut(record.parent_id)?.children.push(id.clone());
        Ok(id)
    }

    pub fn update_record(&mut self, id: &str, update: &RecordUpdate) -> Result<(), CatalogError> {
        let record = self.record_mut(id)?;
        if let Some(location) = &update.raw_data_reference {
            record.raw_data_reference = Some(location.clone());
        }
        if let Some(text) = &update.description {
            record.description = Some(text.clone());
        }
        Ok(())
    }

    pub fn attach_data(&mut self, id: &str, data: StoredData) -> Result<(), CatalogError> {
        self.record_mut(id)?.data = Some(data);
        Ok(())
    }

    fn title_of(&self, id: &str) -> Option<&str> {
        self.collections
            .get(id)
            .map(|c| c.title.as_str())
            .or_else(|| self.records.get(id).map(|r| r.title.as_str()))
    }

    /// One page of a collection: sub-collections first, then records.
    pub fn list(
        &self,
        collection_id: &str,
        offset: usize,
        page_size: usize,
    ) -> Result<ListingPage, CatalogError> {
        let collection = self
            .collections
            .get(collection_id)
            .ok_or_else(|| CatalogError::UnknownCollection(collection_id.to_string()))?;

        let (subcollections, records): (Vec<&String>, Vec<&String>) = collection
            .children
            .iter()
            .partition(|id| id.starts_with(COLLECTION_PREFIX));

        let ordered: Vec<ListedItem> = subcollections
            .into_iter()
            .chain(records)
            .filter_map(|id| self.title_of(id).map(|t| ListedItem::new(id.as_str(), t)))
            .collect();

        let total = ordered.len();
        let items: Vec<ListedItem> = ordered.into_iter().skip(offset).take(page_size).collect();
        Ok(ListingPage {
            count: items.len(),
            items,
            offset,
            total,
        })
    }
}

/// SHA-256 and size of a file, streamed.
pub fn hash_file(path: &Path) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let size = io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok((format!("{:x}", hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record<'a>(title: &'a str, parent: &'a str) -> NewRecord<'a> {
        NewRecord {
            title,
            metadata: "{}",
            parent_id: parent,
            external: true,
        }
    }

    #[test]
    fn new_state_has_only_root() {
        let state = CatalogState::new();
        assert_eq!(state.collections.len(), 1);
        assert!(state.collections.contains_key(ROOT_COLLECTION));
        assert!(state.records.is_empty());
    }

    #[test]
    fn ids_carry_kind_prefix() {
        let mut state = CatalogState::new();
        let c = state.create_collection("run", ROOT_COLLECTION).unwrap();
        let d = state.create_record(&record("scan", &c)).unwrap();
        assert_eq!(c, "c/1");
        assert_eq!(d, "d/2");
    }

    #[test]
    fn listing_puts_collections_first_in_creation_order() {
        let mut state = CatalogState::new();
        state.create_record(&record("r1", ROOT_COLLECTION)).unwrap();
        state.create_collection("c1", ROOT_COLLECTION).unwrap();
        state.create_record(&record("r2", ROOT_COLLECTION)).unwrap();
        state.create_collection("c2", ROOT_COLLECTION).unwrap();

        let page = state.list(ROOT_COLLECTION, 0, 10).unwrap();
        let titles: Vec<&str> = page.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["c1", "c2", "r1", "r2"]);
        assert_eq!(page.total, 4);
    }

    #[test]
    fn listing_pages_by_offset() {
        let mut state = CatalogState::new();
        for t in ["a", "b", "c", "d", "e"] {
            state.create_record(&record(t, ROOT_COLLECTION)).unwrap();
        }
        let page = state.list(ROOT_COLLECTION, 4, 2).unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.total, 5);
        assert_eq!(page.items[0].title, "e");
    }

    #[test]
    fn unknown_parent_is_error() {
        let mut state = CatalogState::new();
        assert!(matches!(
            state.create_collection("x", "c/99"),
            Err(CatalogError::UnknownCollection(_))
        ));
        assert!(matches!(
            state.create_record(&record("x", "c/99")),
            Err(CatalogError::UnknownCollection(_))
        ));
    }

    #[test]
    fn invalid_metadata_json_is_error() {
        let mut state = CatalogState::new();
        let bad = NewRecord {
            metadata: "{oops",
            ..record("x", ROOT_COLLECTION)
        };
        assert!(matches!(state.create_record(&bad), Err(CatalogError::Json(_))));
    }

    #[test]
    fn update_touches_only_given_fields() {
        let mut state = CatalogState::new();
        let id = state.create_record(&record("x", ROOT_COLLECTION)).unwrap();
        state
            .update_record(&id, &RecordUpdate::raw_data_reference("local/data/x"))
            .unwrap();
        state
            .update_record(&id, &RecordUpdate::description("![Image](u)\n\n"))
            .unwrap();

        let entry = &state.records[&id];
        assert_eq!(entry.raw_data_reference.as_deref(), Some("local/data/x"));
        assert_eq!(entry.description.as_deref(), Some("![Image](u)\n\n"));
    }

    #[test]
    fn hash_file_reports_digest_and_size() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f");
        std::fs::write(&path, b"abc").unwrap();

        let (digest, size) = hash_file(&path).unwrap();
        assert_eq!(size, 3);
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
