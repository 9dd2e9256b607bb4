use crate::config::StorageConfig;
use crate::storage::StorageKinds;
use crate::{BlobError, Result};
use bytes::Bytes;
use std::sync::Arc;

/// Read side of the facade: every read goes through the integrity check.
#[derive(Clone)]
pub struct RetrieveObjectOperation {
    kinds: Arc<StorageKinds>,
    config: StorageConfig,
}

impl RetrieveObjectOperation {
    pub fn new(kinds: Arc<StorageKinds>, config: StorageConfig) -> Self {
        Self { kinds, config }
    }

    pub fn retrieve_bytes(&self, kind: &str, name: &str) -> Result<Bytes> {
        if !self.config.enabled {
            return Ok(Bytes::new());
        }

        let result = self
            .kinds
            .get(kind)
            .and_then(|storage| storage.open_verified(name))
            .map(|file| file.content);
        self.config
            .degrade("retrieve", &format!("{}/{}", kind, name), result, Bytes::new())
    }

    pub fn retrieve_str(&self, kind: &str, name: &str) -> Result<String> {
        if !self.config.enabled {
            return Ok(String::new());
        }

        let result = self
            .kinds
            .get(kind)
            .and_then(|storage| storage.open_verified(name))
            .and_then(|file| {
                String::from_utf8(file.content.to_vec()).map_err(|e| {
                    BlobError::Internal(format!("{}/{} is not valid UTF-8: {}", kind, name, e))
                })
            });
        self.config
            .degrade("retrieve", &format!("{}/{}", kind, name), result, String::new())
    }

    pub fn exists_in_storage(&self, kind: &str, name: &str) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }

        let result = self
            .kinds
            .get(kind)
            .and_then(|storage| storage.exists(name));
        self.config
            .degrade("exists", &format!("{}/{}", kind, name), result, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerMode;
    use crate::operations::test_kinds;
    use crate::storage::BlobFile;

    fn config(mode: ServerMode) -> StorageConfig {
        StorageConfig { enabled: true, mode }
    }

    #[test]
    fn test_round_trip_bytes_and_str() {
        let temp_dir = tempfile::tempdir().unwrap();
        let kinds = test_kinds(&temp_dir);
        let storage = kinds.get("draft").unwrap();
        storage.save("bin", BlobFile::new(vec![0u8, 159, 146, 150])).unwrap();
        storage.save("text", BlobFile::new("héllo")).unwrap();

        let op = RetrieveObjectOperation::new(kinds, config(ServerMode::Development));
        assert_eq!(op.retrieve_bytes("draft", "bin").unwrap(), Bytes::from(vec![0u8, 159, 146, 150]));
        assert_eq!(op.retrieve_str("draft", "text").unwrap(), "héllo");
        assert!(op.exists_in_storage("draft", "text").unwrap());
        assert!(!op.exists_in_storage("draft", "other").unwrap());
    }

    #[test]
    fn test_missing_object_degrades_outside_development() {
        let temp_dir = tempfile::tempdir().unwrap();
        let kinds = test_kinds(&temp_dir);

        let production = RetrieveObjectOperation::new(kinds.clone(), config(ServerMode::Production));
        assert_eq!(production.retrieve_bytes("draft", "missing").unwrap(), Bytes::new());
        assert_eq!(production.retrieve_str("draft", "missing").unwrap(), "");

        let development = RetrieveObjectOperation::new(kinds, config(ServerMode::Development));
        let err = development.retrieve_bytes("draft", "missing").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_invalid_utf8_degrades() {
        let temp_dir = tempfile::tempdir().unwrap();
        let kinds = test_kinds(&temp_dir);
        kinds
            .get("draft")
            .unwrap()
            .save("bin", BlobFile::new(vec![0xffu8, 0xfe]))
            .unwrap();

        let test_mode = RetrieveObjectOperation::new(kinds.clone(), config(ServerMode::Test));
        assert_eq!(test_mode.retrieve_str("draft", "bin").unwrap(), "");

        let development = RetrieveObjectOperation::new(kinds, config(ServerMode::Development));
        assert!(matches!(
            development.retrieve_str("draft", "bin"),
            Err(BlobError::Internal(_))
        ));
    }

    #[test]
    fn test_integrity_mismatch_is_never_degraded() {
        let temp_dir = tempfile::tempdir().unwrap();
        let kinds = test_kinds(&temp_dir);
        kinds.get("draft").unwrap().save("a.txt", BlobFile::new("abc")).unwrap();

        let conn = kinds.blob_store().database().connect().unwrap();
        conn.execute(
            "UPDATE stored_objects SET len = 99 WHERE store = 'draft' AND name = 'a.txt'",
            [],
        )
        .unwrap();

        let production = RetrieveObjectOperation::new(kinds, config(ServerMode::Production));
        assert!(matches!(
            production.retrieve_bytes("draft", "a.txt"),
            Err(BlobError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn test_disabled_returns_safe_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let kinds = test_kinds(&temp_dir);
        kinds.get("draft").unwrap().save("a.txt", BlobFile::new("abc")).unwrap();

        let op = RetrieveObjectOperation::new(
            kinds,
            StorageConfig {
                enabled: false,
                mode: ServerMode::Development,
            },
        );
        assert!(op.retrieve_bytes("draft", "a.txt").unwrap().is_empty());
        assert!(!op.exists_in_storage("draft", "a.txt").unwrap());
    }
}
