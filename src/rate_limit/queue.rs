//! Deferred Request Queue
//!
//! Work parked against an endpoint until the caller decides to run it.
//! Entries are kept in execution order: higher priority first, FIFO among
//! equal priorities.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed zero-argument async action
pub type QueuedAction = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// A deferred unit of work
pub struct QueuedRequest {
    /// Caller-assigned identifier
    pub request_id: String,

    /// Higher runs earlier
    pub priority: i32,

    action: QueuedAction,
}

impl QueuedRequest {
    pub fn new<F, Fut>(request_id: impl Into<String>, priority: i32, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            request_id: request_id.into(),
            priority,
            action: Box::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
                Box::pin(action())
            }),
        }
    }

    /// Consume the entry and run its action
    pub async fn run(self) {
        (self.action)().await
    }
}

impl fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("request_id", &self.request_id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Per-endpoint queue
#[derive(Debug, Default)]
pub struct RequestQueue {
    entries: VecDeque<QueuedRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert behind every entry of equal or higher priority
    pub fn push(&mut self, request: QueuedRequest) {
        let position = self
            .entries
            .iter()
            .position(|queued| queued.priority < request.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, request);
    }

    /// Remove the next entry to execute
    pub fn pop(&mut self) -> Option<QueuedRequest> {
        self.entries.pop_front()
    }

    /// Remove every entry, in execution order
    pub fn drain(&mut self) -> Vec<QueuedRequest> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn noop(id: &str, priority: i32) -> QueuedRequest {
        QueuedRequest::new(id, priority, || async {})
    }

    fn drained_ids(queue: &mut RequestQueue) -> Vec<String> {
        queue.drain().into_iter().map(|r| r.request_id).collect()
    }

    #[test]
    fn test_fifo_for_equal_priority() {
        let mut queue = RequestQueue::new();
        queue.push(noop("a", 0));
        queue.push(noop("b", 0));
        queue.push(noop("c", 0));

        assert_eq!(drained_ids(&mut queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_higher_priority_first() {
        let mut queue = RequestQueue::new();
        queue.push(noop("low", 0));
        queue.push(noop("high", 5));
        queue.push(noop("mid", 2));
        queue.push(noop("high-2", 5));
        queue.push(noop("negative", -1));

        assert_eq!(
            drained_ids(&mut queue),
            vec!["high", "high-2", "mid", "low", "negative"]
        );
    }

    #[test]
    fn test_pop_and_drain() {
        let mut queue = RequestQueue::new();
        assert!(queue.pop().is_none());

        queue.push(noop("a", 0));
        queue.push(noop("b", 1));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().unwrap().request_id, "b");
        let rest = queue.drain();
        assert_eq!(rest.len(), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_run_executes_action() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let request = QueuedRequest::new("sync-1", 0, move || async move {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        request.run().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_omits_action() {
        let rendered = format!("{:?}", noop("quiz-7", 3));
        assert!(rendered.contains("quiz-7"));
        assert!(rendered.contains("priority: 3"));
    }
}
