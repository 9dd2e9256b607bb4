use crate::config::StorageConfig;
use crate::storage::StorageKinds;
use crate::Result;
use std::sync::Arc;

#[derive(Clone)]
pub struct RemoveObjectOperation {
    kinds: Arc<StorageKinds>,
    config: StorageConfig,
}

impl RemoveObjectOperation {
    pub fn new(kinds: Arc<StorageKinds>, config: StorageConfig) -> Self {
        Self { kinds, config }
    }

    /// Deletes the blob and tombstones its tracking row. Removing an object
    /// that is not there is not an error; `warn_if_missing` only controls the
    /// operator warning.
    pub fn remove_from_storage(&self, kind: &str, name: &str, warn_if_missing: bool) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let result = self
            .kinds
            .get(kind)
            .and_then(|storage| storage.delete(name, warn_if_missing));
        self.config
            .degrade("remove", &format!("{}/{}", kind, name), result, ())
    }
}
