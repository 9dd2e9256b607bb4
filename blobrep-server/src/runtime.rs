use crate::config::Config;
use blobrep_core::{
    BlobError, BlobStore, ChangeNotifier, Database, ExternalStore, ExternalStoreBuilder,
    NullNotifier, ReplicationHandle, ReplicationMessage, ReplicationQueue, ReplicationWorker,
    Result, StorageConfig, StorageKinds, StoredObjectTracker,
};
use std::sync::Arc;

struct Replication {
    queue: Arc<ReplicationQueue>,
    handle: ReplicationHandle,
}

/// Wired-up storage stack for one process: database, facades, and (when
/// enabled) the replication queue with its partition loops.
pub struct Runtime {
    pub kinds: Arc<StorageKinds>,
    pub storage_config: StorageConfig,
    pub external: Option<Arc<ExternalStore>>,
    replication: Option<Replication>,
}

impl Runtime {
    /// Must be called inside a tokio runtime; partition loops are spawned.
    pub fn start(config: &Config) -> Result<Self> {
        let database = Database::open(&config.storage.database_path)?;
        tracing::info!("Opened blob database at {:?}", database.path());

        let external = match config.external.as_ref() {
            Some(external_cfg) => {
                let mut builder = ExternalStoreBuilder::new()
                    .backend(external_cfg.backend.as_str())
                    .bucket_prefix(config.replication.bucket_prefix.clone())
                    .buckets(config.storage.kinds.clone());

                if let Some(s3) = external_cfg.s3.as_ref() {
                    builder = builder.s3_region(s3.region.clone()).s3_allow_http(s3.allow_http);
                    if let Some(endpoint) = s3.endpoint.as_ref() {
                        builder = builder.s3_endpoint(endpoint.clone());
                    }
                    if let Some(credentials) = s3.credentials.as_ref() {
                        builder = builder.s3_credentials(
                            credentials.access_key_id.clone(),
                            credentials.secret_access_key.clone(),
                        );
                    }
                }

                Some(Arc::new(builder.build()?))
            }
            None => None,
        };

        let mut pending_replication = None;
        let notifier: Arc<dyn ChangeNotifier> = if config.replication.enabled {
            let target = external.clone().ok_or_else(|| {
                BlobError::Config(
                    "external configuration is required when replication is enabled".to_string(),
                )
            })?;

            let (queue, receivers) = ReplicationQueue::new(config.replication.partitions);
            let notifier: Arc<dyn ChangeNotifier> = queue.clone();
            pending_replication = Some((queue, receivers, target));
            notifier
        } else {
            tracing::info!("Replication disabled");
            Arc::new(NullNotifier)
        };

        let blob_store = Arc::new(BlobStore::new(database.clone(), notifier));
        let tracker = Arc::new(StoredObjectTracker::new(database));
        let kinds = Arc::new(StorageKinds::new(
            &config.storage.kinds,
            blob_store.clone(),
            tracker,
        )?);

        let replication = pending_replication.map(|(queue, receivers, target)| {
            let handle = ReplicationWorker::new(blob_store, target, config.replication.clone())
                .spawn(receivers);
            tracing::info!("Replication started with {} partitions", handle.partitions());
            Replication { queue, handle }
        });

        Ok(Self {
            kinds,
            storage_config: config.storage_config(),
            external,
            replication,
        })
    }

    /// Enqueues a replication message by hand, e.g. to re-drive one key.
    pub fn enqueue(&self, message: ReplicationMessage) -> Result<()> {
        let replication = self
            .replication
            .as_ref()
            .ok_or_else(|| BlobError::Config("replication is disabled".to_string()))?;

        self.kinds.get(&message.bucket)?;
        replication.queue.notify(message);
        Ok(())
    }

    /// Drains pending replication, then stops the partition loops.
    pub async fn shutdown(self) {
        if let Some(Replication { queue, handle }) = self.replication {
            let pending = queue.pending();
            if pending > 0 {
                tracing::info!("Waiting for {} replication messages to drain", pending);
            }
            queue.wait_idle().await;
            queue.close();
            handle.join().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExternalBackend, ExternalConfig, StorageSettings};
    use blobrep_core::{BlobFile, ReplicationConfig, ServerMode};

    fn config(dir: &tempfile::TempDir, replication_enabled: bool) -> Config {
        Config {
            storage: StorageSettings {
                enabled: true,
                mode: ServerMode::Test,
                database_path: dir.path().join("blobs.db"),
                kinds: vec!["draft".to_string()],
            },
            replication: ReplicationConfig {
                enabled: replication_enabled,
                ..Default::default()
            },
            external: Some(ExternalConfig {
                backend: ExternalBackend::Memory,
                s3: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_save_replicates_before_shutdown_returns() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::start(&config(&dir, true)).unwrap();

        runtime
            .kinds
            .get("draft")
            .unwrap()
            .save("a.txt", BlobFile::new("replicated"))
            .unwrap();

        let external = runtime.external.clone().unwrap();
        runtime.shutdown().await;

        let object = external.bucket("draft").unwrap().open("a.txt").await.unwrap();
        assert_eq!(object.content.as_ref(), b"replicated");
    }

    #[tokio::test]
    async fn test_enqueue_requires_replication() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::start(&config(&dir, false)).unwrap();

        let message = ReplicationMessage::new("draft", "a.txt");
        assert!(matches!(runtime.enqueue(message), Err(BlobError::Config(_))));
        runtime.shutdown().await;
    }
}
