//! Cancellation Registry
//!
//! One disposable handle per in-flight request, keyed by
//! `(connection id, request id)`. Removal is atomic per key, so natural
//! completion and an explicit `$/cancelRequest` race cleanly: whichever
//! side removes the entry owns writing the response, and a duplicate
//! cancel is a no-op.

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};

use crate::protocol::RequestId;

pub type CancelKey = (u64, RequestId);

/// Dropping or firing the handle stops the request's task at its next
/// suspension point. Cancellation is cooperative: work already past its
/// last checkpoint still finishes.
pub type CancelHandle = oneshot::Sender<()>;

#[derive(Debug, Default)]
pub struct CancelRegistry {
    inflight: Mutex<HashMap<CancelKey, CancelHandle>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle before the request's work begins.
    pub async fn register(&self, key: CancelKey, handle: CancelHandle) {
        let mut inflight = self.inflight.lock().await;
        if inflight.insert(key.clone(), handle).is_some() {
            tracing::warn!(
                "Connection {}: replacing in-flight handle for duplicate request id {}",
                key.0,
                key.1
            );
        }
    }

    /// Remove and dispose the handle for `key`, if present. Returns whether
    /// a computation was actually cancelled; exactly then does the caller
    /// owe the peer a cancel response.
    pub async fn cancel(&self, key: &CancelKey) -> bool {
        match self.inflight.lock().await.remove(key) {
            Some(handle) => {
                let _ = handle.send(());
                true
            }
            None => false,
        }
    }

    /// Remove the handle on natural completion. Returns whether the entry
    /// was still present; exactly then may the caller write the response.
    pub async fn complete(&self, key: &CancelKey) -> bool {
        self.inflight.lock().await.remove(key).is_some()
    }

    /// Dispose every handle belonging to one connection.
    pub async fn drain_connection(&self, connection_id: u64) {
        let mut inflight = self.inflight.lock().await;
        let before = inflight.len();
        inflight.retain(|(conn, _), _| *conn != connection_id);
        let dropped = before - inflight.len();
        if dropped > 0 {
            tracing::debug!(
                "Connection {}: dropped {} in-flight handles",
                connection_id,
                dropped
            );
        }
    }

    pub async fn len(&self) -> usize {
        self.inflight.lock().await.len()
    }
}
