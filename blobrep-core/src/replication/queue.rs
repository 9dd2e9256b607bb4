use super::{ChangeNotifier, ReplicationMessage};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Notify, mpsc};

struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn complete(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Ordered, in-process replication channel.
///
/// Messages are routed to a partition by key hash, so every message for one
/// (bucket, name) lands on the same partition and is consumed in submission
/// order. Different keys may be processed in parallel on other partitions.
pub struct ReplicationQueue {
    senders: RwLock<Vec<mpsc::UnboundedSender<ReplicationMessage>>>,
    partitions: usize,
    in_flight: Arc<InFlight>,
}

/// Consumer end of one partition.
pub struct PartitionReceiver {
    partition: usize,
    rx: mpsc::UnboundedReceiver<ReplicationMessage>,
    in_flight: Arc<InFlight>,
}

impl ReplicationQueue {
    pub fn new(partitions: usize) -> (Arc<Self>, Vec<PartitionReceiver>) {
        let partitions = partitions.max(1);
        let in_flight = Arc::new(InFlight {
            count: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let mut senders = Vec::with_capacity(partitions);
        let mut receivers = Vec::with_capacity(partitions);
        for partition in 0..partitions {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            receivers.push(PartitionReceiver {
                partition,
                rx,
                in_flight: in_flight.clone(),
            });
        }

        let queue = Arc::new(Self {
            senders: RwLock::new(senders),
            partitions,
            in_flight,
        });
        (queue, receivers)
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn partition_for(&self, message: &ReplicationMessage) -> usize {
        let mut hasher = DefaultHasher::new();
        message.bucket.hash(&mut hasher);
        message.name.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as usize
    }

    /// Messages enqueued but not yet completed by a worker.
    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Resolves once every enqueued message has been completed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops accepting messages. Partition loops finish what is already
    /// queued and then exit.
    pub fn close(&self) {
        let mut senders = self.senders.write().unwrap_or_else(|e| e.into_inner());
        senders.clear();
        tracing::info!("replication queue closed");
    }
}

impl ChangeNotifier for ReplicationQueue {
    fn notify(&self, message: ReplicationMessage) {
        let senders = self.senders.read().unwrap_or_else(|e| e.into_inner());
        if senders.is_empty() {
            tracing::warn!(
                "replication queue closed, dropping message for {}",
                message.key()
            );
            return;
        }

        let partition = self.partition_for(&message);
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        if let Err(error) = senders[partition].send(message) {
            self.in_flight.complete();
            tracing::error!(
                "replication partition {} is gone, dropping message for {}",
                partition,
                error.0.key()
            );
        }
    }
}

impl PartitionReceiver {
    pub fn partition(&self) -> usize {
        self.partition
    }

    pub async fn recv(&mut self) -> Option<ReplicationMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ReplicationMessage> {
        self.rx.try_recv().ok()
    }

    /// Marks one received message as fully processed.
    pub fn complete(&self) {
        self.in_flight.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_same_key_same_partition_in_order() {
        let (queue, mut receivers) = ReplicationQueue::new(8);
        let message = ReplicationMessage::new("draft", "a.txt");
        let partition = queue.partition_for(&message);

        for _ in 0..3 {
            queue.notify(message.clone());
        }
        queue.notify(ReplicationMessage::new("draft", "b.txt"));

        let received: Vec<_> = std::iter::from_fn(|| receivers[partition].try_recv())
            .filter(|m| m.name == "a.txt")
            .collect();
        assert_eq!(received.len(), 3);
        assert_eq!(queue.pending(), 4);
    }

    #[test]
    fn test_partition_count_is_at_least_one() {
        let (queue, receivers) = ReplicationQueue::new(0);
        assert_eq!(queue.partitions(), 1);
        assert_eq!(receivers.len(), 1);
    }

    #[tokio::test]
    async fn test_wait_idle_after_completion() {
        let (queue, mut receivers) = ReplicationQueue::new(1);
        queue.notify(ReplicationMessage::new("rfc", "rfc1.txt"));
        queue.notify(ReplicationMessage::new("rfc", "rfc2.txt"));

        let mut receiver = receivers.remove(0);
        let consumer = tokio::spawn(async move {
            while let Some(_message) = receiver.recv().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
                receiver.complete();
            }
        });

        tokio::time::timeout(Duration::from_secs(5), queue.wait_idle())
            .await
            .unwrap();
        assert_eq!(queue.pending(), 0);

        queue.close();
        consumer.await.unwrap();
    }

    #[test]
    fn test_notify_after_close_is_dropped() {
        let (queue, mut receivers) = ReplicationQueue::new(2);
        queue.close();
        queue.notify(ReplicationMessage::new("draft", "late.txt"));

        assert_eq!(queue.pending(), 0);
        assert!(receivers.iter_mut().all(|r| r.try_recv().is_none()));
    }
}
