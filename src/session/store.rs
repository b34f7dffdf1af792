//! Session Store
//!
//! Creates, retrieves, expires and persists sessions. Expiry is enforced on
//! retrieval plus a bulk sweep that runs at most once per check interval,
//! guarded by a try-lock so it never blocks concurrent access.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::{Mutex, RwLock};

use super::{Session, SessionState};

pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    default_max_idle: Option<Duration>,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
    next_id: AtomicU64,
}

impl SessionStore {
    pub fn new(default_max_idle: Option<Duration>, sweep_interval: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_max_idle,
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a fresh session. It is not persisted until [`save`](Self::save)
    /// runs on a started session, so handlers may use it transiently.
    pub fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(self.generate_id(), self.default_max_idle));
        tracing::debug!("Created session {}", session.id());
        session
    }

    /// Resolve an existing session id, falling back to a fresh session.
    /// Expiry is transparent here: an expired id yields a new session.
    pub async fn get_or_create(&self, existing: Option<&str>) -> Arc<Session> {
        if let Some(id) = existing
            && let Some(session) = self.retrieve(id).await
        {
            return session;
        }
        self.create()
    }

    /// Look up a session by id, checking expiry and touching the
    /// last-access time on a hit. An expired session is removed and
    /// reported absent.
    pub async fn retrieve(&self, id: &str) -> Option<Arc<Session>> {
        self.sweep().await;

        let session = self.sessions.read().await.get(id).cloned()?;
        if session.is_expired().await {
            tracing::debug!("Session {} expired, treating as absent", id);
            self.remove(id).await;
            return None;
        }
        session.touch().await;
        Some(session)
    }

    /// Persist a session. A no-op unless the session has been started and
    /// has not expired.
    pub async fn save(&self, session: &Arc<Session>) {
        if session.state() != SessionState::Started || session.is_expired().await {
            tracing::trace!("Skipping save of session {}", session.id());
            return;
        }
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), Arc::clone(session));
    }

    /// Remove and invalidate a session.
    pub async fn remove(&self, id: &str) {
        let removed = self.sessions.write().await.remove(id);
        if let Some(session) = removed {
            session.invalidate().await;
            tracing::debug!("Removed session {}", id);
        }
    }

    /// Bulk-expire idle sessions, at most once per check interval. The
    /// attempt-lock means a sweep already in progress is simply skipped.
    pub async fn sweep(&self) {
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if last_sweep.elapsed() < self.sweep_interval {
            return;
        }
        *last_sweep = Instant::now();

        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                if session.is_expired().await {
                    expired.push((id.clone(), Arc::clone(session)));
                }
            }
        }
        if expired.is_empty() {
            return;
        }

        {
            let mut sessions = self.sessions.write().await;
            for (id, _) in &expired {
                sessions.remove(id);
            }
        }
        for (id, session) in expired {
            session.invalidate().await;
            tracing::info!("Swept expired session {}", id);
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn generate_id(&self) -> String {
        let mut hasher = DefaultHasher::new();
        std::process::id().hash(&mut hasher);
        self.next_id.fetch_add(1, Ordering::Relaxed).hash(&mut hasher);
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos()
            .hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Some(DEFAULT_MAX_IDLE), DEFAULT_SWEEP_INTERVAL)
    }
}
