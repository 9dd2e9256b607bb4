use crate::config::StorageConfig;
use crate::storage::{BlobFile, StorageKinds};
use crate::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::Read;
use std::sync::Arc;

pub use crate::storage::CONFLICT_OBJECT_EXISTS;

#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub allow_overwrite: bool,
    pub doc_name: Option<String>,
    pub doc_rev: Option<String>,
    pub content_type: String,
    pub mtime: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct StoreObjectOperationRequest {
    pub kind: String,
    pub name: String,
    pub content: Bytes,
    pub options: StoreOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreObjectOperationOutcome {
    Stored { name: String },
    /// Storage disabled, or a failure degraded by the server mode.
    Skipped,
}

#[derive(Clone)]
pub struct StoreObjectOperation {
    kinds: Arc<StorageKinds>,
    config: StorageConfig,
}

impl StoreObjectOperation {
    pub fn new(kinds: Arc<StorageKinds>, config: StorageConfig) -> Self {
        Self { kinds, config }
    }

    pub fn run(&self, request: StoreObjectOperationRequest) -> Result<StoreObjectOperationOutcome> {
        if !self.config.enabled {
            tracing::debug!("blob storage disabled, not storing {}/{}", request.kind, request.name);
            return Ok(StoreObjectOperationOutcome::Skipped);
        }

        let key = format!("{}/{}", request.kind, request.name);
        let result = self
            .store(request)
            .map(|name| StoreObjectOperationOutcome::Stored { name });
        self.config
            .degrade("store", &key, result, StoreObjectOperationOutcome::Skipped)
    }

    pub fn store_file<R: Read>(
        &self,
        kind: &str,
        name: &str,
        file: &mut R,
        options: StoreOptions,
    ) -> Result<StoreObjectOperationOutcome> {
        let mut content = Vec::new();
        if let Err(error) = file.read_to_end(&mut content) {
            let key = format!("{}/{}", kind, name);
            return self.config.degrade(
                "store",
                &key,
                Err(error.into()),
                StoreObjectOperationOutcome::Skipped,
            );
        }
        self.store_bytes(kind, name, content, options)
    }

    pub fn store_bytes(
        &self,
        kind: &str,
        name: &str,
        content: impl Into<Bytes>,
        options: StoreOptions,
    ) -> Result<StoreObjectOperationOutcome> {
        self.run(StoreObjectOperationRequest {
            kind: kind.to_string(),
            name: name.to_string(),
            content: content.into(),
            options,
        })
    }

    pub fn store_str(
        &self,
        kind: &str,
        name: &str,
        content: &str,
        options: StoreOptions,
    ) -> Result<StoreObjectOperationOutcome> {
        self.store_bytes(kind, name, content.to_string().into_bytes(), options)
    }

    fn store(&self, request: StoreObjectOperationRequest) -> Result<String> {
        let StoreObjectOperationRequest {
            kind,
            name,
            content,
            options,
        } = request;

        let storage = self.kinds.get(&kind)?;

        let mut file = BlobFile::new(content)
            .with_content_type(options.content_type)
            .with_doc(options.doc_name, options.doc_rev);
        file.mtime = options.mtime;

        if options.allow_overwrite {
            storage.save(&name, file)
        } else {
            storage.create(&name, file)
        }
    }
}
