use super::blob_store::{Blob, BlobStore, WriteMode};
use super::file::{BlobFile, StoredFile};
use super::stored_object::{StoredObjectTracker, record_in, soft_delete_in};
use crate::Result;
use std::sync::Arc;

/// Filesystem-like view of one bucket.
///
/// `save` never renames: the returned name is always the requested one and an
/// existing object is overwritten in place.
#[derive(Clone)]
pub struct BlobStorage {
    bucket: String,
    blob_store: Arc<BlobStore>,
    tracker: Arc<StoredObjectTracker>,
}

impl BlobStorage {
    pub fn new(
        bucket: impl Into<String>,
        blob_store: Arc<BlobStore>,
        tracker: Arc<StoredObjectTracker>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            blob_store,
            tracker,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn open(&self, name: &str) -> Result<StoredFile> {
        let blob = self.blob_store.get(&self.bucket, name)?;
        Ok(to_stored_file(blob))
    }

    /// `open` plus the tracked length/digest check.
    pub fn open_verified(&self, name: &str) -> Result<StoredFile> {
        let blob = self.blob_store.get(&self.bucket, name)?;
        self.tracker.verify(&self.bucket, name, &blob.content)?;
        Ok(to_stored_file(blob))
    }

    pub fn save(&self, name: &str, file: BlobFile) -> Result<String> {
        self.write(name, file, WriteMode::Overwrite)
    }

    /// `save` that refuses to replace an existing object with a `Conflict`.
    /// The existence check and the write share one transaction.
    pub fn create(&self, name: &str, file: BlobFile) -> Result<String> {
        self.write(name, file, WriteMode::CreateOnly)
    }

    fn write(&self, name: &str, file: BlobFile, mode: WriteMode) -> Result<String> {
        let content_type = Some(file.content_type.as_str()).filter(|ct| !ct.is_empty());
        let blob = self.blob_store.write(
            &self.bucket,
            name,
            &file.content,
            file.mtime,
            content_type,
            mode,
            |conn, blob| {
                record_in(
                    conn,
                    &self.bucket,
                    name,
                    &blob.checksum,
                    blob.content.len() as u64,
                    file.doc_name.as_deref(),
                    file.doc_rev.as_deref(),
                )
            },
        )?;

        tracing::info!(
            "saved object bucket={} name={} size={}",
            self.bucket,
            name,
            blob.content.len()
        );
        Ok(name.to_string())
    }

    pub fn delete(&self, name: &str, warn_if_missing: bool) -> Result<()> {
        let removed = self.blob_store.delete_with(&self.bucket, name, |conn| {
            soft_delete_in(conn, &self.bucket, name, warn_if_missing).map(|_| ())
        })?;

        if removed {
            tracing::info!("deleted object bucket={} name={}", self.bucket, name);
        }
        Ok(())
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        self.blob_store.exists(&self.bucket, name)
    }

    pub fn size(&self, name: &str) -> Result<u64> {
        self.blob_store.size(&self.bucket, name)
    }
}

fn to_stored_file(blob: Blob) -> StoredFile {
    let mtime = blob.effective_mtime();
    StoredFile {
        name: blob.name,
        content: blob.content,
        mtime,
        content_type: blob.content_type,
    }
}
