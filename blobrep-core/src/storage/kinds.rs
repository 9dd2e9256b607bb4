use super::{BlobStorage, BlobStore, StoredObjectTracker};
use crate::{BlobError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Facades for every configured storage kind. All kinds share one blob store
/// and one tracker; the kind is the bucket name.
pub struct StorageKinds {
    kinds: BTreeMap<String, BlobStorage>,
    blob_store: Arc<BlobStore>,
    tracker: Arc<StoredObjectTracker>,
}

impl StorageKinds {
    pub fn new(
        kinds: &[String],
        blob_store: Arc<BlobStore>,
        tracker: Arc<StoredObjectTracker>,
    ) -> Result<Self> {
        let mut facades = BTreeMap::new();
        for kind in kinds.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
            facades.insert(
                kind.to_string(),
                BlobStorage::new(kind, blob_store.clone(), tracker.clone()),
            );
        }

        if facades.is_empty() {
            return Err(BlobError::Config(
                "at least one storage kind must be configured".to_string(),
            ));
        }

        Ok(Self {
            kinds: facades,
            blob_store,
            tracker,
        })
    }

    pub fn get(&self, kind: &str) -> Result<&BlobStorage> {
        self.kinds
            .get(kind)
            .ok_or_else(|| BlobError::Config(format!("unknown storage kind '{}'", kind)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn blob_store(&self) -> &Arc<BlobStore> {
        &self.blob_store
    }

    pub fn tracker(&self) -> &Arc<StoredObjectTracker> {
        &self.tracker
    }
}
