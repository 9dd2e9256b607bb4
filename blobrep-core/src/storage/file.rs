use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Custom metadata key carrying the content digest on replicas.
pub const METADATA_SHA384: &str = "sha384";
/// Custom metadata key carrying the effective modification time on replicas.
pub const METADATA_MTIME: &str = "mtime";

/// Content plus the metadata that travels with it into a store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlobFile {
    pub content: Bytes,
    pub content_type: String,
    pub custom_metadata: BTreeMap<String, String>,
    pub mtime: Option<DateTime<Utc>>,
    pub doc_name: Option<String>,
    pub doc_rev: Option<String>,
}

impl BlobFile {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_mtime(mut self, mtime: DateTime<Utc>) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_doc(mut self, doc_name: Option<String>, doc_rev: Option<String>) -> Self {
        self.doc_name = doc_name;
        self.doc_rev = doc_rev;
        self
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Handle returned by the storage facade's `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub content: Bytes,
    pub mtime: DateTime<Utc>,
    pub content_type: String,
}
