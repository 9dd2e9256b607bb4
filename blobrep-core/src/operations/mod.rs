pub mod remove_object;
pub mod retrieve_object;
pub mod store_object;
pub mod verify_objects;

pub use remove_object::RemoveObjectOperation;
pub use retrieve_object::RetrieveObjectOperation;
pub use store_object::{
    CONFLICT_OBJECT_EXISTS, StoreObjectOperation, StoreObjectOperationOutcome,
    StoreObjectOperationRequest, StoreOptions,
};
pub use verify_objects::{
    DriftedObject, KindReport, VerifyObjectsOperation, VerifyObjectsOperationRequest,
    VerifyObjectsOperationResult,
};

#[cfg(test)]
pub(crate) fn test_kinds(temp_dir: &tempfile::TempDir) -> std::sync::Arc<crate::StorageKinds> {
    use crate::replication::NullNotifier;
    use crate::storage::{BlobStore, Database, StoredObjectTracker};
    use std::sync::Arc;

    let database = Database::open(temp_dir.path().join("blobs.db")).unwrap();
    let blob_store = Arc::new(BlobStore::new(database.clone(), Arc::new(NullNotifier)));
    let tracker = Arc::new(StoredObjectTracker::new(database));
    let kinds = ["draft", "rfc", "photo"].map(String::from);
    Arc::new(crate::StorageKinds::new(&kinds, blob_store, tracker).unwrap())
}
