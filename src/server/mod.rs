//! Server
//!
//! Wires the transport pieces together: a Unix-socket accept loop with a
//! shutdown broadcast and a periodic session sweep, spawning one
//! [`Connection`] per accepted stream. `serve_stream` drives any duplex
//! byte stream through the same machinery (stdio, tests).

pub mod cancel;
pub mod connection;
pub mod correlator;
pub mod lifecycle;
pub mod router;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::document::DocumentStore;
use crate::error::PorticoError;
use crate::session::SessionStore;

pub use cancel::{CancelHandle, CancelKey, CancelRegistry};
pub use connection::Connection;
pub use correlator::Correlator;
pub use router::{Exchange, Handler, Router};

pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
    sessions: Arc<SessionStore>,
    documents: Arc<DocumentStore>,
    cancels: Arc<CancelRegistry>,
    next_connection_id: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Build a server around an application router. The document lifecycle
    /// routes are installed here, once.
    pub fn new(config: ServerConfig, router: Router) -> Self {
        let documents = Arc::new(DocumentStore::new());
        let router = Arc::new(lifecycle::register(router, Arc::clone(&documents)));
        let sessions = Arc::new(SessionStore::new(
            config.session_max_idle(),
            config.session_sweep_interval,
        ));
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            router,
            sessions,
            documents,
            cancels: Arc::new(CancelRegistry::new()),
            next_connection_id: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    pub fn documents(&self) -> Arc<DocumentStore> {
        Arc::clone(&self.documents)
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        Arc::clone(&self.sessions)
    }

    /// Drive one duplex stream as a connection.
    pub fn serve_stream<S>(&self, stream: S) -> JoinHandle<Result<(), PorticoError>>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let connection = Connection::new(
            self.next_connection_id.fetch_add(1, Ordering::Relaxed),
            Arc::clone(&self.router),
            Arc::clone(&self.sessions),
            Arc::clone(&self.cancels),
            self.config.max_frame_bytes,
        );
        let id = connection.id();
        tracing::debug!("Connection {} opened", id);
        tokio::spawn(async move {
            let result = connection.run(stream).await;
            match &result {
                Ok(()) => tracing::debug!("Connection {} closed", id),
                Err(err) => tracing::warn!("Connection {} closed with error: {}", id, err),
            }
            result
        })
    }

    /// Listen on the configured Unix socket until shutdown.
    pub async fn run(&self) -> Result<(), std::io::Error> {
        let socket = &self.config.socket_path;
        if let Some(dir) = socket.parent() {
            tokio::fs::create_dir_all(dir).await?;
            restrict_mode(dir, 0o700).await?;
        }

        // A stale socket from a previous run blocks bind.
        let _ = tokio::fs::remove_file(socket).await;
        let listener = UnixListener::bind(socket)?;
        restrict_mode(socket, 0o600).await?;

        tracing::info!("Listening on {:?}", socket);
        let pid = &self.config.pid_path;
        tokio::fs::write(pid, std::process::id().to_string()).await?;
        restrict_mode(pid, 0o600).await?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut sweep_interval = tokio::time::interval(self.config.session_sweep_interval);
        sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    if let Ok((stream, _)) = result {
                        self.serve_stream(stream);
                    }
                }
                _ = sweep_interval.tick() => {
                    self.sessions.sweep().await;
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutting down");
                    break;
                }
            }
        }

        let _ = tokio::fs::remove_file(socket).await;
        let _ = tokio::fs::remove_file(pid).await;
        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn restrict_mode(path: &Path, mode: u32) -> Result<(), std::io::Error> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}
