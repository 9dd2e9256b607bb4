//! Storage modules for Blobrep
//!
//! Provides the relational blob store, the stored-object ledger and the
//! filesystem-like facade over both.

pub mod blob_store;
pub mod checksum;
pub mod database;
pub mod facade;
pub mod file;
pub mod kinds;
pub mod stored_object;

pub use blob_store::{Blob, BlobStat, BlobStore, CONFLICT_OBJECT_EXISTS, WriteMode};
pub use checksum::{SHA384_HEX_LEN, compute_sha384, verify_sha384};
pub use database::Database;
pub use facade::BlobStorage;
pub use file::{BlobFile, METADATA_MTIME, METADATA_SHA384, StoredFile};
pub use kinds::StorageKinds;
pub use stored_object::{StoredObject, StoredObjectTracker};
