//! Per-Agent bounded event queue, long-poll hand-off, and pending-request
//! correlation table. Grounded on the "bounded channel + pending oneshot
//! table" shape used for request/response rendezvous elsewhere in this
//! codebase's lineage, generalised to a batching long-poll instead of a
//! single in-process await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use ri_envelope::{Envelope, ResponsePayload};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// A one-shot rendezvous slot for a single pending request. Completing it
/// twice is safe: the second attempt simply fails to send because the
/// receiver (or the slot itself) is already gone.
struct PendingSlot {
    sender: oneshot::Sender<ResponsePayload>,
}

/// Owns the outbound queue and pending-request table for a single Agent.
/// Replaced wholesale on re-registration; the old instance is [`close`]d so
/// any poller blocked on it wakes immediately with an empty batch.
///
/// [`close`]: Connection::close
pub struct Connection {
    tx: mpsc::Sender<Envelope>,
    rx: AsyncMutex<mpsc::Receiver<Envelope>>,
    pending: Mutex<HashMap<String, PendingSlot>>,
    cancel: CancellationToken,
    last_poll_time: AtomicI64,
}

impl Connection {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: AsyncMutex::new(rx),
            pending: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            last_poll_time: AtomicI64::new(0),
        }
    }

    /// Non-blocking insertion. Returns `false` (never blocks, never panics)
    /// when the queue is already at capacity.
    pub fn enqueue(&self, envelope: Envelope) -> bool {
        self.tx.try_send(envelope).is_ok()
    }

    /// Block until at least one envelope arrives, `timeout` elapses, or the
    /// connection is cancelled. Drains everything already available before
    /// returning ("batching"), so a burst of dispatches is delivered in one
    /// poll instead of trickling out one-by-one.
    pub async fn poll(&self, timeout: Duration) -> Vec<Envelope> {
        self.touch_last_poll();

        if self.cancel.is_cancelled() {
            return Vec::new();
        }

        let mut rx = self.rx.lock().await;

        let first = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            got = rx.recv() => got,
            _ = tokio::time::sleep(timeout) => None,
        };

        let Some(first) = first else {
            return Vec::new();
        };

        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }
        batch
    }

    /// Register a rendezvous slot for `id`, returning the receiving half.
    /// Overwrites (and silently drops) any prior slot for the same id —
    /// callers are expected to mint fresh, unique event ids per dispatch.
    pub fn add_pending(&self, id: impl Into<String>) -> oneshot::Receiver<ResponsePayload> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.into(), PendingSlot { sender: tx });
        rx
    }

    /// Deliver a response to the pending slot for `id`. Returns `false`
    /// (idempotent-safe, no blocking) if there was no waiter or the waiter
    /// already gave up — both are normal outcomes, not errors.
    pub fn complete_pending(&self, id: &str, response: ResponsePayload) -> bool {
        let slot = self.pending.lock().remove(id);
        match slot {
            Some(slot) => slot.sender.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop a pending slot without completing it (timeout/cancellation path).
    pub fn remove_pending(&self, id: &str) {
        self.pending.lock().remove(id);
    }

    pub fn has_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Signal cancellation to all current and future pollers.
    pub fn close(&self) {
        debug!("closing connection, cancelling outstanding polls");
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn last_poll_time(&self) -> i64 {
        self.last_poll_time.load(Ordering::Relaxed)
    }

    fn touch_last_poll(&self) {
        let now = chrono::Utc::now().timestamp();
        self.last_poll_time.store(now, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ri_envelope::EventPayload;
    use std::collections::HashMap as StdHashMap;

    fn sample_envelope(id: &str) -> Envelope {
        Envelope::event(
            id,
            &EventPayload {
                session_id: "s".into(),
                platform: "slack".into(),
                event_type: "message".into(),
                data: StdHashMap::new(),
            },
        )
    }

    #[tokio::test]
    async fn poll_with_no_envelopes_waits_for_timeout_and_returns_empty() {
        let conn = Connection::new(DEFAULT_QUEUE_CAPACITY);
        let start = std::time::Instant::now();
        let batch = conn.poll(Duration::from_millis(30)).await;
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn poll_batches_everything_currently_queued() {
        let conn = Connection::new(DEFAULT_QUEUE_CAPACITY);
        assert!(conn.enqueue(sample_envelope("a")));
        assert!(conn.enqueue(sample_envelope("b")));
        assert!(conn.enqueue(sample_envelope("c")));
        let batch = conn.poll(Duration::from_secs(1)).await;
        assert_eq!(batch.len(), 3);
    }

    #[tokio::test]
    async fn enqueue_on_full_queue_fails_without_blocking() {
        let conn = Connection::new(1);
        assert!(conn.enqueue(sample_envelope("a")));
        assert!(!conn.enqueue(sample_envelope("b")));
    }

    #[tokio::test]
    async fn closing_wakes_pollers_with_empty_batch() {
        let conn = std::sync::Arc::new(Connection::new(DEFAULT_QUEUE_CAPACITY));
        let poller = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.poll(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close();
        let batch = tokio::time::timeout(Duration::from_secs(1), poller)
            .await
            .expect("poll task did not finish")
            .expect("poll task panicked");
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn complete_pending_is_idempotent_safe() {
        let conn = Connection::new(DEFAULT_QUEUE_CAPACITY);
        let rx = conn.add_pending("evt-1");
        let response = ResponsePayload {
            platform: "slack".into(),
            response_url: None,
            body: serde_json::json!({"text": "hi"}),
        };
        assert!(conn.complete_pending("evt-1", response.clone()));
        // Second completion: no waiter left under that id, returns false.
        assert!(!conn.complete_pending("evt-1", response));
        let received = rx.await.unwrap();
        assert_eq!(received.body, serde_json::json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn complete_pending_with_unknown_id_returns_false() {
        let conn = Connection::new(DEFAULT_QUEUE_CAPACITY);
        let response = ResponsePayload::default();
        assert!(!conn.complete_pending("nonexistent", response));
    }
}
