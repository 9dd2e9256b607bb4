use crate::replication::ReplicationTarget;
use crate::storage::{BlobFile, METADATA_MTIME, METADATA_SHA384};
use crate::{BlobError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Object read back from the external store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalObject {
    pub content: Bytes,
    pub content_type: Option<String>,
    pub custom_metadata: BTreeMap<String, String>,
}

/// Accumulated wall-clock time per operation kind.
#[derive(Debug, Default)]
pub struct OperationTimings {
    save: OperationTiming,
    open: OperationTiming,
    delete: OperationTiming,
}

#[derive(Debug, Default)]
struct OperationTiming {
    calls: AtomicU64,
    failures: AtomicU64,
    total_micros: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub total_micros: u64,
}

impl OperationTiming {
    fn snapshot(&self) -> TimingSnapshot {
        TimingSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            total_micros: self.total_micros.load(Ordering::Relaxed),
        }
    }
}

impl OperationTimings {
    pub fn save(&self) -> TimingSnapshot {
        self.save.snapshot()
    }

    pub fn open(&self) -> TimingSnapshot {
        self.open.snapshot()
    }

    pub fn delete(&self) -> TimingSnapshot {
        self.delete.snapshot()
    }
}

/// One bucket of the external object store.
pub struct ExternalBucket {
    name: String,
    client: Arc<dyn ObjectStore>,
    timings: OperationTimings,
}

impl ExternalBucket {
    pub fn new(name: impl Into<String>, client: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.into(),
            client,
            timings: OperationTimings::default(),
        }
    }

    /// External bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timings(&self) -> &OperationTimings {
        &self.timings
    }

    /// Uploads `file`. The custom metadata must carry the digest and mtime;
    /// Content-Type is only sent when one was given.
    pub async fn save(&self, name: &str, file: &BlobFile) -> Result<()> {
        for required in [METADATA_SHA384, METADATA_MTIME] {
            if !file.custom_metadata.contains_key(required) {
                return Err(BlobError::InvalidRequest(format!(
                    "refusing to save {} without '{}' metadata",
                    name, required
                )));
            }
        }

        let location = object_path(name)?;

        let mut attributes = Attributes::new();
        if !file.content_type.is_empty() {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(file.content_type.clone()),
            );
        }
        for (key, value) in &file.custom_metadata {
            attributes.insert(
                Attribute::Metadata(Cow::Owned(key.clone())),
                AttributeValue::from(value.clone()),
            );
        }

        let options = PutOptions {
            attributes,
            ..Default::default()
        };
        let payload = PutPayload::from(file.content.clone());

        self.timed(&self.timings.save, "save", name, async {
            self.client.put_opts(&location, payload, options).await
        })
        .await?;
        Ok(())
    }

    pub async fn open(&self, name: &str) -> Result<ExternalObject> {
        let location = object_path(name)?;

        let (content, attributes) = self
            .timed(&self.timings.open, "open", name, async {
                let result = self.client.get(&location).await?;
                let attributes = result.attributes.clone();
                let content = result.bytes().await?;
                Ok::<_, object_store::Error>((content, attributes))
            })
            .await?;

        let mut content_type = None;
        let mut custom_metadata = BTreeMap::new();
        for (attribute, value) in attributes.iter() {
            match attribute {
                Attribute::ContentType => content_type = Some(value.to_string()),
                Attribute::Metadata(key) => {
                    custom_metadata.insert(key.to_string(), value.to_string());
                }
                _ => {}
            }
        }

        Ok(ExternalObject {
            content,
            content_type,
            custom_metadata,
        })
    }

    /// Deletes the object; an already absent object is not an error.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let location = object_path(name)?;

        let result = self
            .timed(&self.timings.delete, "delete", name, async {
                self.client.delete(&location).await
            })
            .await;

        match result {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn timed<T, F>(
        &self,
        timing: &OperationTiming,
        operation: &str,
        name: &str,
        call: F,
    ) -> std::result::Result<T, object_store::Error>
    where
        F: Future<Output = std::result::Result<T, object_store::Error>>,
    {
        let started = Instant::now();
        let result = call.await;
        let elapsed = started.elapsed();

        timing.calls.fetch_add(1, Ordering::Relaxed);
        timing
            .total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        match &result {
            Ok(_) => tracing::debug!(
                "external store {} bucket={} name={} elapsed_ms={:.3}",
                operation,
                self.name,
                name,
                elapsed.as_secs_f64() * 1000.0
            ),
            Err(error) => {
                timing.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "external store {} failed bucket={} name={} elapsed_ms={:.3} error={}",
                    operation,
                    self.name,
                    name,
                    elapsed.as_secs_f64() * 1000.0,
                    error
                );
            }
        }

        result
    }
}

fn object_path(name: &str) -> Result<Path> {
    Path::parse(name)
        .map_err(|e| BlobError::InvalidRequest(format!("invalid object name '{}': {}", name, e)))
}

/// External buckets keyed by local bucket name.
pub struct ExternalStore {
    buckets: HashMap<String, ExternalBucket>,
}

impl ExternalStore {
    pub fn new(buckets: HashMap<String, ExternalBucket>) -> Self {
        Self { buckets }
    }

    pub fn bucket(&self, bucket: &str) -> Result<&ExternalBucket> {
        self.buckets.get(bucket).ok_or_else(|| {
            BlobError::Config(format!("no external bucket configured for '{}'", bucket))
        })
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&str, &ExternalBucket)> {
        self.buckets.iter().map(|(local, external)| (local.as_str(), external))
    }
}

#[async_trait]
impl ReplicationTarget for ExternalStore {
    async fn upload(&self, bucket: &str, name: &str, file: BlobFile) -> Result<()> {
        self.bucket(bucket)?.save(name, &file).await
    }

    async fn remove(&self, bucket: &str, name: &str) -> Result<()> {
        self.bucket(bucket)?.delete(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::compute_sha384;
    use object_store::memory::InMemory;
    use tokio_test::{assert_err, assert_ok};

    fn bucket() -> ExternalBucket {
        ExternalBucket::new("blobrep-draft", Arc::new(InMemory::new()))
    }

    fn file(content: &'static [u8]) -> BlobFile {
        BlobFile::new(Bytes::from_static(content))
            .with_metadata(METADATA_SHA384, compute_sha384(content))
            .with_metadata(METADATA_MTIME, "2025-03-17T01:02:03Z")
    }

    #[tokio::test]
    async fn test_save_attaches_metadata_and_content_type() {
        let bucket = bucket();
        let upload = file(b"These are my bytes.").with_content_type("application/x-my-content-type");
        assert_ok!(bucket.save("myfile.txt", &upload).await);

        let object = bucket.open("myfile.txt").await.unwrap();
        assert_eq!(object.content, Bytes::from_static(b"These are my bytes."));
        assert_eq!(object.content_type.as_deref(), Some("application/x-my-content-type"));
        assert_eq!(object.custom_metadata, upload.custom_metadata);
    }

    #[tokio::test]
    async fn test_empty_content_type_is_not_sent() {
        let bucket = bucket();
        assert_ok!(bucket.save("plain", &file(b"plain")).await);

        let object = bucket.open("plain").await.unwrap();
        assert_eq!(object.content_type, None);
        assert_eq!(object.custom_metadata.len(), 2);
    }

    #[tokio::test]
    async fn test_save_rejects_missing_metadata() {
        let bucket = bucket();
        let bare = BlobFile::new(Bytes::from_static(b"x")).with_metadata(METADATA_MTIME, "now");

        let err = bucket.save("bare", &bare).await.unwrap_err();
        assert!(matches!(err, BlobError::InvalidRequest(_)));
        assert_eq!(bucket.timings().save().calls, 0);
        assert!(matches!(bucket.open("bare").await, Err(BlobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let bucket = bucket();
        assert_ok!(bucket.save("gone", &file(b"x")).await);
        assert_ok!(bucket.delete("gone").await);
        assert_ok!(bucket.delete("gone").await);
        assert_err!(bucket.open("gone").await);
    }

    #[tokio::test]
    async fn test_timing_recorded_when_call_fails() {
        let bucket = bucket();
        let err = bucket.open("missing").await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound(_)));

        let timing = bucket.timings().open();
        assert_eq!(timing.calls, 1);
        assert_eq!(timing.failures, 1);

        assert_ok!(bucket.save("present", &file(b"y")).await);
        assert_ok!(bucket.open("present").await);
        assert_eq!(bucket.timings().open().calls, 2);
        assert_eq!(bucket.timings().open().failures, 1);
    }

    #[tokio::test]
    async fn test_store_routes_by_local_bucket() {
        let mut buckets = HashMap::new();
        buckets.insert("draft".to_string(), bucket());
        let store = ExternalStore::new(buckets);

        assert_ok!(store.upload("draft", "a.txt", file(b"a")).await);
        assert_ok!(store.bucket("draft").unwrap().open("a.txt").await);
        assert_ok!(store.remove("draft", "a.txt").await);

        assert!(matches!(
            store.upload("photo", "a.jpg", file(b"a")).await,
            Err(BlobError::Config(_))
        ));
    }
}
