//! Outbound Request Correlation
//!
//! Matches responses arriving on a connection to the outbound requests that
//! caused them, purely by id. Arrival order carries no meaning: callers
//! park on a oneshot channel and wake whenever their id resolves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{oneshot, Mutex};

use crate::protocol::{Response, ResponseError, RequestId};

type PendingRequest = oneshot::Sender<Response>;

#[derive(Debug)]
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a request id and park a waiter for its response.
    pub async fn register(&self) -> (RequestId, oneshot::Receiver<Response>) {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);
        (id, rx)
    }

    /// Deliver a response to its waiting caller. Returns false when no
    /// caller is waiting for that id; such responses are dropped.
    pub async fn resolve(&self, response: Response) -> bool {
        let Some(id) = response.id.clone() else {
            return false;
        };
        let mut pending = self.pending.lock().await;
        // Direct match first, then string->number coercion for peers that
        // echo numeric ids back as strings.
        let sender = pending.remove(&id).or_else(|| {
            if let RequestId::String(s) = &id {
                s.parse::<u64>()
                    .ok()
                    .and_then(|n| pending.remove(&RequestId::Number(n)))
            } else {
                None
            }
        });
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Abandon a pending request, e.g. when the write failed.
    pub async fn forget(&self, id: &RequestId) {
        self.pending.lock().await.remove(id);
    }

    /// Fail every pending request, e.g. on connection teardown.
    pub async fn fail_all(&self, code: i32, message: &str) {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        if count > 0 {
            tracing::debug!("Failing {} pending requests: {}", count, message);
            for (id, sender) in pending.drain() {
                let _ = sender.send(Response::error(id, ResponseError::new(code, message)));
            }
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}
