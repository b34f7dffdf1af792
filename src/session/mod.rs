//! Session Model
//!
//! One server-side session per connection, created lazily and owned by the
//! [`SessionStore`]. Attributes are a plain string-keyed map and are the
//! extension point for collaborators to attach per-connection state.

pub mod store;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;

pub use store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    New = 0,
    Started = 1,
    Expired = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Started,
            2 => Self::Expired,
            _ => Self::New,
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug)]
pub struct Session {
    id: String,
    attributes: RwLock<HashMap<String, Value>>,
    creation_time: Instant,
    last_access: RwLock<Instant>,
    max_idle: RwLock<Option<Duration>>,
    state: AtomicU8,
}

impl Session {
    /// A `max_idle` of `None` disables idle expiry.
    pub fn new(id: impl Into<String>, max_idle: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            attributes: RwLock::new(HashMap::new()),
            creation_time: now,
            last_access: RwLock::new(now),
            max_idle: RwLock::new(max_idle),
            state: AtomicU8::new(SessionState::New.to_u8()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn creation_time(&self) -> Instant {
        self.creation_time
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move a fresh session into active use.
    pub fn start(&self) {
        let _ = self.state.compare_exchange(
            SessionState::New.to_u8(),
            SessionState::Started.to_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub async fn touch(&self) {
        *self.last_access.write().await = Instant::now();
    }

    pub async fn last_access(&self) -> Instant {
        *self.last_access.read().await
    }

    pub async fn max_idle(&self) -> Option<Duration> {
        *self.max_idle.read().await
    }

    /// Set the idle expiry window in seconds; a negative value disables
    /// expiry entirely.
    pub async fn set_max_idle_secs(&self, secs: i64) {
        let max_idle = u64::try_from(secs).ok().map(Duration::from_secs);
        *self.max_idle.write().await = max_idle;
    }

    pub async fn is_expired(&self) -> bool {
        if self.state() == SessionState::Expired {
            return true;
        }
        match *self.max_idle.read().await {
            Some(max_idle) => self.last_access.read().await.elapsed() > max_idle,
            None => false,
        }
    }

    pub async fn attribute(&self, key: &str) -> Option<Value> {
        self.attributes.read().await.get(key).cloned()
    }

    /// Adding an attribute counts as first use and starts the session.
    pub async fn set_attribute(&self, key: impl Into<String>, value: Value) {
        self.start();
        self.attributes.write().await.insert(key.into(), value);
    }

    pub async fn remove_attribute(&self, key: &str) -> Option<Value> {
        self.attributes.write().await.remove(key)
    }

    pub async fn attributes(&self) -> HashMap<String, Value> {
        self.attributes.read().await.clone()
    }

    /// Drop all attributes and mark the session unusable. The store removes
    /// invalidated sessions on its next pass.
    pub async fn invalidate(&self) {
        self.attributes.write().await.clear();
        self.state
            .store(SessionState::Expired.to_u8(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_session_state() {
        let session = Session::new("s1", Some(Duration::from_secs(1800)));
        assert_eq!(session.id(), "s1");
        assert_eq!(session.state(), SessionState::New);
        assert!(!session.is_expired().await);
    }

    #[tokio::test]
    async fn test_start_transition() {
        let session = Session::new("s1", None);
        session.start();
        assert_eq!(session.state(), SessionState::Started);
        // Starting again is a no-op.
        session.start();
        assert_eq!(session.state(), SessionState::Started);
    }

    #[tokio::test]
    async fn test_set_attribute_starts_session() {
        let session = Session::new("s1", None);
        session
            .set_attribute("user", Value::String("amy".into()))
            .await;
        assert_eq!(session.state(), SessionState::Started);
        assert_eq!(
            session.attribute("user").await,
            Some(Value::String("amy".into()))
        );
    }

    #[tokio::test]
    async fn test_idle_expiry() {
        let session = Session::new("s1", Some(Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(session.is_expired().await);

        session.touch().await;
        assert!(!session.is_expired().await);
    }

    #[tokio::test]
    async fn test_negative_max_idle_disables_expiry() {
        let session = Session::new("s1", Some(Duration::from_millis(5)));
        session.set_max_idle_secs(-1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!session.is_expired().await);
    }

    #[tokio::test]
    async fn test_invalidate_clears_attributes() {
        let session = Session::new("s1", None);
        session.set_attribute("k", Value::Bool(true)).await;
        session.invalidate().await;
        assert_eq!(session.state(), SessionState::Expired);
        assert!(session.attribute("k").await.is_none());
        assert!(session.is_expired().await);
    }
}
