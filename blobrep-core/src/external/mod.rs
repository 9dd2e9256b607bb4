//! External S3-compatible object store adapter

pub mod adapter;
pub mod factory;

pub use adapter::{ExternalBucket, ExternalObject, ExternalStore, OperationTimings, TimingSnapshot};
pub use factory::ExternalStoreBuilder;
