//! Dispatch queue: URIs ready for immediate download
//!
//! One logical FIFO per cluster. Ordering within a cluster is promotion
//! order (ties broken by insertion order, which the activation cache already
//! guarantees). There is no priority beyond cluster partitioning; richer
//! prioritization belongs to a pluggable comparator in front of `enqueue`.
//!
//! The blocking [`DispatchQueue::dequeue`] suspends the caller until an item
//! arrives or [`DispatchQueue::shutdown`] fires; shutdown never consumes an
//! item, so nothing is lost on cancellation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify};

/// Per-cluster FIFO of URIs ready for download.
///
/// Explicitly constructed and lifecycle-scoped, like the activation cache.
pub struct DispatchQueue {
    partitions: Mutex<HashMap<String, VecDeque<String>>>,
    notify: Notify,
    shut_down: AtomicBool,
}

impl DispatchQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            partitions: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Append a URI to its cluster's partition
    pub async fn enqueue(&self, cluster: &str, uri: &str) {
        {
            let mut partitions = self.partitions.lock().await;
            partitions
                .entry(cluster.to_string())
                .or_default()
                .push_back(uri.to_string());
        }
        tracing::trace!(cluster = %cluster, uri = %uri, "enqueued for dispatch");
        self.notify.notify_waiters();
    }

    /// Pop the next URI for a cluster without blocking; `None` when the
    /// partition is empty.
    pub async fn try_dequeue(&self, cluster: &str) -> Option<String> {
        let mut partitions = self.partitions.lock().await;
        partitions.get_mut(cluster).and_then(VecDeque::pop_front)
    }

    /// Pop the next URI for a cluster, suspending until one arrives.
    ///
    /// Returns `None` only after [`DispatchQueue::shutdown`] while the
    /// partition stays empty; a shutdown never discards a queued item.
    pub async fn dequeue(&self, cluster: &str) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(uri) = self.try_dequeue(cluster).await {
                return Some(uri);
            }
            if self.is_shut_down() {
                return None;
            }

            notified.await;
        }
    }

    /// Remove every pending occurrence of a URI across all partitions;
    /// returns how many entries were purged.
    pub async fn purge(&self, uri: &str) -> usize {
        let mut partitions = self.partitions.lock().await;
        let mut purged = 0;
        for queue in partitions.values_mut() {
            let before = queue.len();
            queue.retain(|u| u != uri);
            purged += before - queue.len();
        }
        purged
    }

    /// Pending items in one cluster's partition
    pub async fn len(&self, cluster: &str) -> usize {
        let partitions = self.partitions.lock().await;
        partitions.get(cluster).map_or(0, VecDeque::len)
    }

    /// Pending items across all partitions
    pub async fn total_len(&self) -> usize {
        let partitions = self.partitions.lock().await;
        partitions.values().map(VecDeque::len).sum()
    }

    /// Whether every partition is empty
    pub async fn is_empty(&self) -> bool {
        self.total_len().await == 0
    }

    /// Release every blocked `dequeue` caller. Queued items stay queued.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether shutdown has been signalled
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_within_cluster() {
        let queue = DispatchQueue::new();
        queue.enqueue("alpha", "https://a.example/1").await;
        queue.enqueue("alpha", "https://a.example/2").await;
        queue.enqueue("beta", "https://b.example/1").await;

        assert_eq!(
            queue.try_dequeue("alpha").await.as_deref(),
            Some("https://a.example/1")
        );
        assert_eq!(
            queue.try_dequeue("alpha").await.as_deref(),
            Some("https://a.example/2")
        );
        assert_eq!(queue.try_dequeue("alpha").await, None);
        assert_eq!(
            queue.try_dequeue("beta").await.as_deref(),
            Some("https://b.example/1")
        );
    }

    #[tokio::test]
    async fn test_try_dequeue_empty_returns_immediately() {
        let queue = DispatchQueue::new();
        assert_eq!(queue.try_dequeue("alpha").await, None);
    }

    #[tokio::test]
    async fn test_blocking_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(DispatchQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue("alpha").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue("alpha", "https://a.example/x").await;

        let got = consumer.await.unwrap();
        assert_eq!(got.as_deref(), Some("https://a.example/x"));
    }

    #[tokio::test]
    async fn test_dequeue_stays_pending_while_empty() {
        let queue = DispatchQueue::new();
        let mut pending = tokio_test::task::spawn(queue.dequeue("alpha"));
        assert!(pending.poll().is_pending());

        queue.enqueue("alpha", "https://a.example/x").await;
        match pending.poll() {
            std::task::Poll::Ready(got) => {
                assert_eq!(got.as_deref(), Some("https://a.example/x"));
            }
            std::task::Poll::Pending => panic!("dequeue did not wake on enqueue"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_releases_blocked_consumer() {
        let queue = Arc::new(DispatchQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue("alpha").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.shutdown();

        let got = consumer.await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_shutdown_does_not_lose_queued_items() {
        let queue = DispatchQueue::new();
        queue.enqueue("alpha", "https://a.example/x").await;
        queue.shutdown();

        // A queued item is still handed out after shutdown
        assert_eq!(
            queue.dequeue("alpha").await.as_deref(),
            Some("https://a.example/x")
        );
        assert_eq!(queue.dequeue("alpha").await, None);
    }

    #[tokio::test]
    async fn test_purge_removes_from_all_partitions() {
        let queue = DispatchQueue::new();
        queue.enqueue("alpha", "https://a.example/x").await;
        queue.enqueue("beta", "https://a.example/x").await;
        queue.enqueue("alpha", "https://a.example/y").await;

        assert_eq!(queue.purge("https://a.example/x").await, 2);
        assert_eq!(queue.total_len().await, 1);
        assert_eq!(
            queue.try_dequeue("alpha").await.as_deref(),
            Some("https://a.example/y")
        );
    }

    #[tokio::test]
    async fn test_len_per_cluster() {
        let queue = DispatchQueue::new();
        queue.enqueue("alpha", "https://a.example/x").await;
        queue.enqueue("alpha", "https://a.example/y").await;
        assert_eq!(queue.len("alpha").await, 2);
        assert_eq!(queue.len("beta").await, 0);
        assert!(!queue.is_empty().await);
    }
}
