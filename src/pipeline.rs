//! In-memory event pipelines.
//!
//! [`EventQueue`] is a bounded multi-producer / single-consumer queue
//! connecting the real-time streams to the slower sinks. Producers
//! append single items or atomic batches; the one consumer blocks in
//! [`EventQueue::get`], which is its only suspension point.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Default capacity of the pipelines wired up at startup.
pub const DEFAULT_CAPACITY: usize = 4_096;

/// A bounded FIFO queue. Ordering is FIFO per producer; interleaving
/// across producers is unspecified.
#[derive(Debug)]
pub struct EventQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    /// Signalled when an item is appended.
    items: Notify,
    /// Signalled when the consumer removes an item.
    space: Notify,
}

impl<T> EventQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity,
            items: Notify::new(),
            space: Notify::new(),
        }
    }

    /// Appends one item, waiting while the queue is at capacity.
    pub async fn append(&self, item: T) {
        loop {
            {
                let mut queue = self.inner.lock();
                if queue.len() < self.capacity {
                    queue.push_back(item);
                    drop(queue);
                    self.items.notify_one();
                    return;
                }
            }
            self.space.notified().await;
        }
    }

    /// Appends a batch atomically: the consumer observes the entire
    /// batch contiguously, never interleaved with other producers.
    /// Waits for space like [`append`](Self::append); the batch itself
    /// is admitted whole even when it overshoots the capacity.
    pub async fn append_list(&self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        loop {
            {
                let mut queue = self.inner.lock();
                if queue.len() < self.capacity {
                    queue.extend(items);
                    drop(queue);
                    self.items.notify_one();
                    return;
                }
            }
            self.space.notified().await;
        }
    }

    /// Removes and returns the head of the queue, waiting until one is
    /// available.
    pub async fn get(&self) -> T {
        loop {
            if let Some(item) = self.inner.lock().pop_front() {
                self.space.notify_one();
                return item;
            }
            self.items.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn get_returns_items_in_fifo_order() {
        let queue = EventQueue::new(8);
        queue.append(1).await;
        queue.append(2).await;
        queue.append(3).await;

        assert_eq!(queue.get().await, 1);
        assert_eq!(queue.get().await, 2);
        assert_eq!(queue.get().await, 3);
    }

    #[tokio::test]
    async fn get_blocks_until_an_item_arrives() {
        let queue = Arc::new(EventQueue::new(8));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.append(42).await;
        assert_eq!(consumer.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn append_list_is_contiguous() {
        let queue = Arc::new(EventQueue::new(64));
        let batch: Vec<i32> = (0..10).collect();
        queue.append_list(batch).await;
        queue.append(99).await;

        for expected in 0..10 {
            assert_eq!(queue.get().await, expected);
        }
        assert_eq!(queue.get().await, 99);
    }

    #[tokio::test]
    async fn append_waits_while_full() {
        let queue = Arc::new(EventQueue::new(2));
        queue.append(1).await;
        queue.append(2).await;

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.append(3).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.get().await, 1);
        producer.await.unwrap();
        assert_eq!(queue.get().await, 2);
        assert_eq!(queue.get().await, 3);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let queue: EventQueue<i32> = EventQueue::new(4);
        queue.append_list(Vec::new()).await;
        assert!(queue.is_empty());
    }
}
