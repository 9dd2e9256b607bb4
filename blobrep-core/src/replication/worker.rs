use super::{PartitionReceiver, ReplicationMessage};
use crate::config::ReplicationConfig;
use crate::storage::{BlobFile, BlobStore, METADATA_MTIME, METADATA_SHA384};
use crate::Result;
use async_trait::async_trait;
use chrono::SecondsFormat;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Destination of replicated objects.
#[async_trait]
pub trait ReplicationTarget: Send + Sync {
    async fn upload(&self, bucket: &str, name: &str, file: BlobFile) -> Result<()>;

    /// Removing an absent object must succeed.
    async fn remove(&self, bucket: &str, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationOutcome {
    Uploaded { size: u64 },
    Removed,
}

pub struct ReplicationWorker {
    blob_store: Arc<BlobStore>,
    target: Arc<dyn ReplicationTarget>,
    config: ReplicationConfig,
}

/// Running partition loops.
pub struct ReplicationHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl ReplicationWorker {
    pub fn new(
        blob_store: Arc<BlobStore>,
        target: Arc<dyn ReplicationTarget>,
        config: ReplicationConfig,
    ) -> Self {
        Self {
            blob_store,
            target,
            config,
        }
    }

    /// Mirrors the current state of one key. The row is read at processing
    /// time, so a late or retried message still converges on the latest write.
    pub async fn replicate(&self, message: &ReplicationMessage) -> Result<ReplicationOutcome> {
        let ReplicationMessage { bucket, name } = message;

        match self.blob_store.read_current(bucket, name)? {
            None => {
                self.target.remove(bucket, name).await?;
                Ok(ReplicationOutcome::Removed)
            }
            Some(blob) => {
                let size = blob.content.len() as u64;
                let mtime = blob
                    .effective_mtime()
                    .to_rfc3339_opts(SecondsFormat::Secs, true);

                let mut file = BlobFile::new(blob.content)
                    .with_content_type(blob.content_type)
                    .with_metadata(METADATA_SHA384, blob.checksum)
                    .with_metadata(METADATA_MTIME, mtime);
                file.mtime = blob.mtime;

                self.target.upload(bucket, name, file).await?;
                Ok(ReplicationOutcome::Uploaded { size })
            }
        }
    }

    /// Transient failures are retried until the target recovers; giving up
    /// would leave the replica stale until the key is written again.
    async fn replicate_with_retry(&self, message: &ReplicationMessage) {
        let mut attempt = 1;

        loop {
            match self.replicate(message).await {
                Ok(outcome) => {
                    tracing::debug!(
                        "replicated key={} outcome={:?} attempt={}",
                        message.key(),
                        outcome,
                        attempt
                    );
                    return;
                }
                Err(error) if error.is_retryable() => {
                    let backoff = self.config.backoff_for(attempt);
                    tracing::warn!(
                        "replication attempt failed, retrying. key={} attempt={} backoff_ms={} error={}",
                        message.key(),
                        attempt,
                        backoff.as_millis(),
                        error
                    );
                    tokio::time::sleep(backoff).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => {
                    tracing::error!(
                        "replication failed, giving up. key={} attempts={} error={}",
                        message.key(),
                        attempt,
                        error
                    );
                    return;
                }
            }
        }
    }

    /// Starts one consumer loop per partition. Each loop handles its messages
    /// strictly one at a time; retries happen in place before the next
    /// message is taken.
    pub fn spawn(self, receivers: Vec<PartitionReceiver>) -> ReplicationHandle {
        let worker = Arc::new(self);

        let tasks = receivers
            .into_iter()
            .map(|mut receiver| {
                let worker = worker.clone();
                tokio::spawn(async move {
                    tracing::info!("replication partition {} started", receiver.partition());
                    while let Some(message) = receiver.recv().await {
                        worker.replicate_with_retry(&message).await;
                        receiver.complete();
                    }
                    tracing::info!("replication partition {} stopped", receiver.partition());
                })
            })
            .collect();

        ReplicationHandle { tasks }
    }
}

impl ReplicationHandle {
    pub fn partitions(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every partition loop to exit (after the queue is closed).
    pub async fn join(self) {
        for result in join_all(self.tasks).await {
            if let Err(error) = result {
                tracing::error!("replication partition task failed: {}", error);
            }
        }
    }
}
