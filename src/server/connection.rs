//! Connection Driver
//!
//! Owns one duplex byte stream: an ordered read loop feeds the frame
//! decoder and classifies each payload, requests fan out as spawned tasks
//! (responses are matched by id, never by order), and every outbound
//! payload funnels through a single writer task so frame bytes are never
//! interleaved.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::PorticoError;
use crate::protocol::{
    encode_frame, error_codes, FrameDecoder, Message, Notification, Request, RequestId, Response,
    ResponseError, CANCEL_METHOD,
};
use crate::server::cancel::{CancelKey, CancelRegistry};
use crate::server::correlator::Correlator;
use crate::server::router::{Exchange, Router};
use crate::session::{Session, SessionStore};

const READ_CHUNK_BYTES: usize = 8 * 1024;
const OUTBOUND_QUEUE_DEPTH: usize = 64;

pub struct Connection {
    id: u64,
    router: Arc<Router>,
    sessions: Arc<SessionStore>,
    cancels: Arc<CancelRegistry>,
    correlator: Correlator,
    session: Mutex<Option<Arc<Session>>>,
    outbound: mpsc::Sender<String>,
    outbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
    max_frame_bytes: usize,
}

impl Connection {
    pub fn new(
        id: u64,
        router: Arc<Router>,
        sessions: Arc<SessionStore>,
        cancels: Arc<CancelRegistry>,
        max_frame_bytes: usize,
    ) -> Arc<Self> {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        Arc::new(Self {
            id,
            router,
            sessions,
            cancels,
            correlator: Correlator::new(),
            session: Mutex::new(None),
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            max_frame_bytes,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Drive the connection until EOF or a fatal framing error.
    pub async fn run<S>(self: Arc<Self>, stream: S) -> Result<(), PorticoError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut outbound_rx = self
            .outbound_rx
            .lock()
            .await
            .take()
            .ok_or(PorticoError::ConnectionClosed)?;

        let (read_half, mut write_half) = tokio::io::split(stream);
        let writer = tokio::spawn(async move {
            while let Some(payload) = outbound_rx.recv().await {
                if write_half.write_all(&encode_frame(&payload)).await.is_err() {
                    break;
                }
                if write_half.flush().await.is_err() {
                    break;
                }
            }
        });

        let result = self.read_loop(read_half).await;

        self.cancels.drain_connection(self.id).await;
        self.correlator
            .fail_all(error_codes::REQUEST_CANCELLED, "Connection closed")
            .await;
        writer.abort();

        result
    }

    async fn read_loop<S>(self: &Arc<Self>, mut reader: ReadHalf<S>) -> Result<(), PorticoError>
    where
        S: AsyncRead + AsyncWrite,
    {
        let mut decoder = FrameDecoder::with_max_frame_bytes(self.max_frame_bytes);
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                tracing::debug!("Connection {}: peer closed the stream", self.id);
                return Ok(());
            }
            decoder.feed(&chunk[..n]);
            loop {
                match decoder.next_frame() {
                    Ok(Some(payload)) => self.handle_payload(payload).await,
                    Ok(None) => break,
                    Err(err) if err.is_fatal() => {
                        tracing::error!("Connection {}: fatal framing error: {}", self.id, err);
                        return Err(err.into());
                    }
                    Err(err) => {
                        tracing::warn!("Connection {}: dropping frame: {}", self.id, err);
                    }
                }
            }
        }
    }

    async fn handle_payload(self: &Arc<Self>, payload: String) {
        tracing::trace!("Connection {} <- {}", self.id, payload);
        match Message::parse(&payload) {
            Ok(Message::Request(request)) => self.dispatch_request(request).await,
            Ok(Message::Notification(notification)) if notification.method == CANCEL_METHOD => {
                self.handle_cancel(notification).await;
            }
            Ok(Message::Notification(notification)) => {
                self.dispatch_notification(notification).await;
            }
            Ok(Message::Response(response)) => {
                if !self.correlator.resolve(response).await {
                    tracing::debug!(
                        "Connection {}: dropping response with no waiting caller",
                        self.id
                    );
                }
            }
            Err(err) => {
                tracing::warn!("Connection {}: dropping malformed message: {}", self.id, err);
            }
        }
    }

    /// Spawn handling of one request. Multiple requests may be in flight
    /// concurrently; the read loop never waits on them.
    async fn dispatch_request(self: &Arc<Self>, request: Request) {
        let session = self.current_session().await;
        let key: CancelKey = (self.id, request.id.clone());
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        self.cancels.register(key.clone(), cancel_tx).await;

        let conn = Arc::clone(self);
        tokio::spawn(async move {
            let Request {
                id, method, params, ..
            } = request;
            let exchange = Exchange {
                connection_id: conn.id,
                method,
                params,
                session: Arc::clone(&session),
            };
            let work = AssertUnwindSafe(conn.router.dispatch(exchange)).catch_unwind();
            tokio::pin!(work);
            let outcome = tokio::select! {
                result = &mut work => Some(result),
                _ = &mut cancel_rx => None,
            };

            let Some(result) = outcome else {
                tracing::debug!("Connection {}: request {} cancelled", conn.id, id);
                return;
            };
            let result = result.unwrap_or_else(|_| {
                tracing::error!("Connection {}: handler for request {} panicked", conn.id, id);
                Err(ResponseError::internal_error("request handler panicked"))
            });
            conn.sessions.save(&session).await;
            // Whoever removes the registry entry owns the response.
            if conn.cancels.complete(&key).await {
                let response = match result {
                    Ok(value) => Response::success(id, value),
                    Err(error) => Response::error(id, error),
                };
                conn.send_response(response).await;
            }
        });
    }

    /// Notifications run inline so lifecycle events keep arrival order.
    async fn dispatch_notification(&self, notification: Notification) {
        let session = self.current_session().await;
        let exchange = Exchange {
            connection_id: self.id,
            method: notification.method.clone(),
            params: notification.params,
            session: Arc::clone(&session),
        };
        match self.router.dispatch(exchange).await {
            Ok(_) => self.sessions.save(&session).await,
            Err(err) if err.code == error_codes::METHOD_NOT_FOUND => {
                tracing::trace!("Unhandled notification: {}", notification.method);
            }
            Err(err) => {
                tracing::warn!(
                    "Connection {}: notification {} failed: {}",
                    self.id,
                    notification.method,
                    err
                );
            }
        }
    }

    async fn handle_cancel(&self, notification: Notification) {
        let id = notification
            .params
            .as_ref()
            .and_then(|p| p.get("id"))
            .and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok());
        let Some(id) = id else {
            tracing::warn!(
                "Connection {}: {} without a usable id",
                self.id,
                CANCEL_METHOD
            );
            return;
        };

        let key = (self.id, id.clone());
        if self.cancels.cancel(&key).await {
            self.send_response(Response::error(id, ResponseError::cancelled()))
                .await;
        } else {
            tracing::debug!(
                "Connection {}: cancel for request {} with no in-flight handle",
                self.id,
                id
            );
        }
    }

    /// The connection's session, created lazily on first dispatch. An
    /// expired session is transparently replaced with a fresh one.
    async fn current_session(&self) -> Arc<Session> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            if !session.is_expired().await {
                session.touch().await;
                return Arc::clone(session);
            }
        }
        let session = self.sessions.get_or_create(None).await;
        *slot = Some(Arc::clone(&session));
        session
    }

    /// Issue a request to the peer and await the correlated response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Response, PorticoError> {
        let (id, rx) = self.correlator.register().await;
        let request = Request::new(id.clone(), method, params);
        let payload = serde_json::to_string(&request)?;
        if let Err(err) = self.send_payload(payload).await {
            self.correlator.forget(&id).await;
            return Err(err);
        }
        rx.await.map_err(|_| PorticoError::ConnectionClosed)
    }

    /// Send a notification to the peer.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), PorticoError> {
        let notification = Notification::new(method, params);
        self.send_payload(serde_json::to_string(&notification)?)
            .await
    }

    async fn send_response(&self, response: Response) {
        match serde_json::to_string(&response) {
            Ok(payload) => {
                if self.send_payload(payload).await.is_err() {
                    tracing::debug!("Connection {}: writer gone, response dropped", self.id);
                }
            }
            Err(err) => {
                tracing::error!("Connection {}: failed to serialize response: {}", self.id, err);
            }
        }
    }

    async fn send_payload(&self, payload: String) -> Result<(), PorticoError> {
        tracing::trace!("Connection {} -> {}", self.id, payload);
        self.outbound
            .send(payload)
            .await
            .map_err(|_| PorticoError::ConnectionClosed)
    }
}
