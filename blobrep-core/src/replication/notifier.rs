use super::ReplicationMessage;

/// Receives one message per committed blob mutation. Implementations must not
/// block the writer.
pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, message: ReplicationMessage);
}

/// Notifier used when replication is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn notify(&self, message: ReplicationMessage) {
        tracing::trace!("replication disabled, dropping {}", message.key());
    }
}
