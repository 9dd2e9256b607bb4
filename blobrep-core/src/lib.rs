//! Blobrep Core - relational blob storage with ordered replication
//!
//! - SQLite is the source of truth for blob content, keyed by (bucket, name)
//! - SHA-384 checksums computed on every write
//! - A stored-object ledger tracks digest, length and tombstones per object
//! - Every committed mutation is mirrored into an S3-compatible store by
//!   per-key ordered replication workers

pub mod config;
pub mod error;
pub mod external;
pub mod operations;
pub mod replication;
pub mod storage;

pub use config::{ReplicationConfig, ServerMode, StorageConfig};
pub use error::{BlobError, Result};
pub use external::{ExternalBucket, ExternalObject, ExternalStore, ExternalStoreBuilder};
pub use operations::{
    RemoveObjectOperation, RetrieveObjectOperation, StoreObjectOperation,
    StoreObjectOperationOutcome, StoreOptions, VerifyObjectsOperation,
    VerifyObjectsOperationRequest, VerifyObjectsOperationResult,
};
pub use replication::{
    ChangeNotifier, NullNotifier, PartitionReceiver, ReplicationHandle, ReplicationMessage,
    ReplicationQueue, ReplicationTarget, ReplicationWorker,
};
pub use storage::{
    Blob, BlobFile, BlobStorage, BlobStore, Database, StorageKinds, StoredFile, StoredObject,
    StoredObjectTracker, compute_sha384, verify_sha384,
};
