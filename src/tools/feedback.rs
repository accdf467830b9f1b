//! Human-feedback rendezvous store (§4.8) — a process-wide `{id -> request}` plus
//! `{id -> waiter}` map. `create_request` rejects duplicate ids; `wait_for_response` blocks on a
//! single-slot channel so it never requires polling; `submit_response` completes the request and
//! wakes the waiter exactly once, failing any later submission against the same id.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::errors::FeedbackError;

struct PendingRequest {
    message_for_user: String,
    created_at: Instant,
    sender: AsyncMutex<Option<oneshot::Sender<String>>>,
    receiver: AsyncMutex<Option<oneshot::Receiver<String>>>,
    claimed: AtomicBool,
}

/// Held as an `Arc` handle by whichever agent surfaces a human-in-the-loop gate, not as an
/// ambient global.
#[derive(Default)]
pub struct FeedbackStore {
    requests: DashMap<String, Arc<PendingRequest>>,
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new feedback request. Fails if `id` is already pending.
    pub fn create_request(&self, id: impl Into<String>, message_for_user: impl Into<String>) -> Result<(), FeedbackError> {
        let id = id.into();
        if self.requests.contains_key(&id) {
            return Err(FeedbackError::DuplicateRequest(id));
        }

        let (tx, rx) = oneshot::channel();
        self.requests.insert(
            id,
            Arc::new(PendingRequest {
                message_for_user: message_for_user.into(),
                created_at: Instant::now(),
                sender: AsyncMutex::new(Some(tx)),
                receiver: AsyncMutex::new(Some(rx)),
                claimed: AtomicBool::new(false),
            }),
        );
        Ok(())
    }

    /// Blocks until `submit_response(id, ..)` is called, or `timeout` elapses (`None` waits
    /// indefinitely, per the resolved `HUMAN_FEEDBACK_TIMEOUT_SECS=0` Open Question).
    pub async fn wait_for_response(&self, id: &str, timeout: Option<Duration>) -> Result<String, FeedbackError> {
        let request = self
            .requests
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| FeedbackError::Unknown(id.to_string()))?;

        let receiver = request
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| FeedbackError::AlreadyCompleted(id.to_string()))?;

        let received = match timeout {
            Some(duration) => match tokio::time::timeout(duration, receiver).await {
                Ok(inner) => inner,
                Err(_elapsed) => return Err(FeedbackError::Timeout(id.to_string())),
            },
            None => receiver.await,
        };

        received.map_err(|_| FeedbackError::Timeout(id.to_string()))
    }

    /// Completes a pending request exactly once. A second call for the same id fails with
    /// `AlreadyCompleted`.
    pub async fn submit_response(&self, id: &str, response: impl Into<String>) -> Result<(), FeedbackError> {
        let request = self
            .requests
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| FeedbackError::Unknown(id.to_string()))?;

        if request.claimed.swap(true, Ordering::SeqCst) {
            return Err(FeedbackError::AlreadyCompleted(id.to_string()));
        }

        let sender = request.sender.lock().await.take();
        match sender {
            Some(tx) => {
                let _ = tx.send(response.into());
                Ok(())
            }
            None => Err(FeedbackError::AlreadyCompleted(id.to_string())),
        }
    }

    pub fn message_for(&self, id: &str) -> Option<String> {
        self.requests.get(id).map(|r| r.message_for_user.clone())
    }

    /// Evicts requests older than `max_age`, dropping their sender so any still-waiting caller
    /// unblocks with a timeout rather than hanging forever.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let expired: Vec<String> = self
            .requests
            .iter()
            .filter(|entry| entry.value().created_at.elapsed() > max_age)
            .map(|entry| entry.key().clone())
            .collect();

        for id in &expired {
            self.requests.remove(id);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
