//! Connection task for the services socket.
//!
//! [`ServicesSocket::open`] spawns one task that owns the WebSocket and the
//! registered [`SocketHandler`]. The task performs the handshake, reads
//! frames until the connection ends, and reports every lifecycle step to the
//! handler. The returned handle observes the [`ReadyState`] and can request a
//! clean close.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use uuid::Uuid;

use super::events::{CloseEvent, MessageEvent, OpenEvent, ReadyState};
use super::handler::SocketHandler;
use super::payload::{decode_binary, decode_text};
use crate::error::{ClientError, PayloadError};
use crate::location::SocketEndpoint;

/// Timeouts applied to a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    /// Upper bound on the handshake.
    pub connect_timeout: Duration,
    /// How long to wait for the peer's close frame after sending ours.
    pub close_timeout: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle to the single services socket connection.
///
/// Dropping the handle does not close the connection; call
/// [`ServicesSocket::close`] for that.
pub struct ServicesSocket<H> {
    connection_id: Uuid,
    url: String,
    state_rx: watch::Receiver<ReadyState>,
    close_tx: mpsc::Sender<()>,
    task: JoinHandle<H>,
}

impl<H: SocketHandler> ServicesSocket<H> {
    /// Starts connecting to `endpoint` and registers `handler`.
    ///
    /// Returns immediately with the socket in [`ReadyState::Connecting`].
    /// Connection failures are reported asynchronously through
    /// [`SocketHandler::on_error`] followed by [`SocketHandler::on_close`].
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn open(endpoint: &SocketEndpoint, options: SocketOptions, handler: H) -> Self {
        let connection_id = Uuid::new_v4();
        let url = endpoint.as_str().to_string();
        let (state_tx, state_rx) = watch::channel(ReadyState::Connecting);
        let (close_tx, close_rx) = mpsc::channel(1);

        tracing::debug!(%connection_id, %url, "opening services socket");

        let task = tokio::spawn(run_connection(Connection {
            connection_id,
            url: url.clone(),
            options,
            handler,
            state_tx,
            close_rx,
        }));

        Self {
            connection_id,
            url,
            state_rx,
            close_tx,
            task,
        }
    }
}

impl<H> ServicesSocket<H> {
    /// Identifier carried by every event of this connection.
    #[must_use]
    pub const fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// URL the socket connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current connection state.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        *self.state_rx.borrow()
    }

    /// Waits until the connection reaches `state` or a later one, and
    /// returns the state actually observed.
    pub async fn wait_for(&self, state: ReadyState) -> ReadyState {
        let mut rx = self.state_rx.clone();
        let observed = rx.wait_for(|current| *current >= state).await.map(|s| *s);
        // The sender is gone once the task ends; report the last state.
        observed.unwrap_or_else(|_| *rx.borrow())
    }

    /// Waits until the connection is closed.
    pub async fn closed(&self) {
        self.wait_for(ReadyState::Closed).await;
    }

    /// Requests a clean close (code 1000). Has no effect once closing has
    /// started.
    pub fn close(&self) {
        if self.ready_state() >= ReadyState::Closing {
            return;
        }
        // A full channel means a close is already pending.
        let _ = self.close_tx.try_send(());
    }

    /// Waits for the connection task to finish and returns the handler.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Task`] if the task panicked, which can only
    /// happen through a panicking handler.
    pub async fn join(self) -> Result<H, ClientError> {
        Ok(self.task.await?)
    }
}

impl<H> fmt::Debug for ServicesSocket<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicesSocket")
            .field("connection_id", &self.connection_id)
            .field("url", &self.url)
            .field("ready_state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

/// Everything the connection task owns.
struct Connection<H> {
    connection_id: Uuid,
    url: String,
    options: SocketOptions,
    handler: H,
    state_tx: watch::Sender<ReadyState>,
    close_rx: mpsc::Receiver<()>,
}

impl<H: SocketHandler> Connection<H> {
    fn advance(&self, next: ReadyState) {
        self.state_tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    fn deliver(&mut self, decoded: Result<Vec<serde_json::Value>, PayloadError>) {
        match decoded {
            Ok(values) => self.handler.on_message(&MessageEvent {
                connection_id: self.connection_id,
                values,
                received_at: Utc::now(),
            }),
            Err(err) => self.handler.on_error(&ClientError::Payload(err)),
        }
    }

    fn finish(mut self, event: CloseEvent) -> H {
        self.advance(ReadyState::Closed);
        self.handler.on_close(&event);
        self.handler
    }

    fn fail(mut self, error: ClientError) -> H {
        self.handler.on_error(&error);
        let event = CloseEvent::abnormal(self.connection_id);
        self.finish(event)
    }
}

/// Runs one connection from handshake to close.
async fn run_connection<H: SocketHandler>(mut conn: Connection<H>) -> H {
    let connect = tokio::time::timeout(
        conn.options.connect_timeout,
        connect_async(conn.url.as_str()),
    );

    let stream = tokio::select! {
        result = connect => match result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(err)) => return conn.fail(ClientError::Connect(err)),
            Err(_) => {
                let timeout = conn.options.connect_timeout;
                return conn.fail(ClientError::ConnectTimeout(timeout));
            }
        },
        Some(()) = conn.close_rx.recv() => {
            tracing::debug!(connection_id = %conn.connection_id, "closed before handshake completed");
            let event = CloseEvent::abnormal(conn.connection_id);
            return conn.finish(event);
        }
    };

    conn.advance(ReadyState::Open);
    conn.handler.on_open(&OpenEvent {
        connection_id: conn.connection_id,
        url: conn.url.clone(),
        opened_at: Utc::now(),
    });

    let (mut ws_tx, mut ws_rx) = stream.split();
    let mut peer_close: Option<(u16, String)> = None;
    let mut close_deadline: Option<tokio::time::Instant> = None;

    loop {
        let deadline = close_deadline;
        tokio::select! {
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => conn.deliver(decode_text(text.as_str())),
                    Some(Ok(Message::Binary(bytes))) => conn.deliver(decode_binary(&bytes)),
                    Some(Ok(Message::Close(frame))) => {
                        conn.advance(ReadyState::Closing);
                        peer_close = Some(match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
                            None => (CloseEvent::NO_STATUS, String::new()),
                        });
                    }
                    // Pings are answered by tungstenite.
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Err(err)) => {
                        if peer_close.is_none() {
                            conn.handler.on_error(&ClientError::Transport(err));
                        }
                        break;
                    }
                    None => break,
                }
            }
            Some(()) = conn.close_rx.recv(), if close_deadline.is_none() && peer_close.is_none() => {
                conn.advance(ReadyState::Closing);
                close_deadline = Some(tokio::time::Instant::now() + conn.options.close_timeout);
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                if let Err(err) = ws_tx.send(Message::Close(Some(frame))).await {
                    conn.handler.on_error(&ClientError::Transport(err));
                    break;
                }
            }
            () = sleep_until(deadline), if deadline.is_some() => {
                tracing::warn!(connection_id = %conn.connection_id, "peer did not answer close frame");
                break;
            }
        }
    }

    let event = match peer_close {
        Some((code, reason)) => CloseEvent {
            connection_id: conn.connection_id,
            code,
            reason,
            was_clean: true,
        },
        None => CloseEvent::abnormal(conn.connection_id),
    };
    conn.finish(event)
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::location::{PageLocation, Scheme};

    #[derive(Debug, Default)]
    struct Counting {
        opened: usize,
        errors: Vec<String>,
        closes: Vec<CloseEvent>,
    }

    impl SocketHandler for Counting {
        fn on_open(&mut self, _event: &OpenEvent) {
            self.opened += 1;
        }

        fn on_message(&mut self, _event: &MessageEvent) {}

        fn on_error(&mut self, error: &ClientError) {
            self.errors.push(error.kind().to_string());
        }

        fn on_close(&mut self, event: &CloseEvent) {
            self.closes.push(event.clone());
        }
    }

    async fn unused_port() -> u16 {
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        addr.port()
    }

    #[tokio::test]
    async fn refused_connection_reports_error_then_close() {
        let location = PageLocation::new(Scheme::Http, "127.0.0.1", Some(unused_port().await));
        let endpoint = SocketEndpoint::services(&location);
        let socket = ServicesSocket::open(&endpoint, SocketOptions::default(), Counting::default());

        assert_eq!(socket.url(), endpoint.as_str());
        assert_eq!(socket.wait_for(ReadyState::Open).await, ReadyState::Closed);

        let Ok(handler) = socket.join().await else {
            panic!("task failed");
        };
        assert_eq!(handler.opened, 0);
        assert_eq!(handler.errors, vec!["connect".to_string()]);
        assert_eq!(handler.closes.len(), 1);
        assert_eq!(handler.closes.first().map(|c| c.code), Some(CloseEvent::ABNORMAL));
        assert_eq!(handler.closes.first().map(|c| c.was_clean), Some(false));
    }

    #[tokio::test]
    async fn connect_timeout_is_reported() {
        // Accept TCP but never answer the HTTP upgrade.
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        let server = tokio::spawn(async move {
            let accepted = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(accepted);
        });

        let location = PageLocation::new(Scheme::Http, "127.0.0.1", Some(addr.port()));
        let options = SocketOptions {
            connect_timeout: Duration::from_millis(100),
            ..SocketOptions::default()
        };
        let socket = ServicesSocket::open(&SocketEndpoint::services(&location), options, Counting::default());

        let Ok(handler) = socket.join().await else {
            panic!("task failed");
        };
        assert_eq!(handler.errors, vec!["connect_timeout".to_string()]);
        assert_eq!(handler.closes.len(), 1);
        server.abort();
    }

    #[tokio::test]
    async fn close_while_connecting_ends_abnormally() {
        // Accept TCP but never answer the HTTP upgrade.
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        let server = tokio::spawn(async move {
            let accepted = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(accepted);
        });

        let location = PageLocation::new(Scheme::Http, "127.0.0.1", Some(addr.port()));
        let socket = ServicesSocket::open(
            &SocketEndpoint::services(&location),
            SocketOptions::default(),
            Counting::default(),
        );
        assert_eq!(socket.ready_state(), ReadyState::Connecting);
        socket.close();

        let joined = tokio::time::timeout(Duration::from_secs(5), socket.join()).await;
        let Ok(Ok(handler)) = joined else {
            panic!("socket did not finish in time");
        };
        assert_eq!(handler.opened, 0);
        assert!(handler.errors.is_empty(), "unexpected errors: {:?}", handler.errors);
        assert_eq!(
            handler.closes.iter().map(|c| (c.code, c.was_clean)).collect::<Vec<_>>(),
            vec![(CloseEvent::ABNORMAL, false)]
        );
        server.abort();
    }

    #[tokio::test]
    async fn close_is_idempotent_after_closed() {
        let location = PageLocation::new(Scheme::Http, "127.0.0.1", Some(unused_port().await));
        let socket = ServicesSocket::open(
            &SocketEndpoint::services(&location),
            SocketOptions::default(),
            Counting::default(),
        );
        socket.closed().await;
        socket.close();
        socket.close();
        assert_eq!(socket.ready_state(), ReadyState::Closed);

        let Ok(handler) = socket.join().await else {
            panic!("task failed");
        };
        assert_eq!(handler.closes.len(), 1);
    }

    #[test]
    fn default_options() {
        let options = SocketOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.close_timeout, Duration::from_secs(5));
    }
}
