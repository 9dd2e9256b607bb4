//! Replication of blob mutations into the external object store
//!
//! The blob store announces every committed mutation through a
//! [`ChangeNotifier`]; the [`ReplicationQueue`] partitions those messages by
//! key and [`ReplicationWorker`] loops consume each partition in order.

pub mod message;
pub mod notifier;
pub mod queue;
pub mod worker;

pub use message::ReplicationMessage;
pub use notifier::{ChangeNotifier, NullNotifier};
pub use queue::{PartitionReceiver, ReplicationQueue};
pub use worker::{ReplicationHandle, ReplicationOutcome, ReplicationTarget, ReplicationWorker};
