//! Single-socket WebSocket transport with generation tags.
//!
//! [`Transport`] owns at most one live socket. Every [`open`](Transport::open)
//! tears down the previous socket and bumps a generation counter; each
//! lifecycle event the background socket task emits carries the generation it
//! belongs to, so the owner can discard anything a superseded socket says.
//!
//! Failure semantics follow browser sockets: a failed handshake or an abrupt
//! drop emits [`Errored`](TransportEventKind::Errored) followed by
//! [`Closed(1006)`](TransportEventKind::Closed). A requested close emits
//! `Closed(1000)`.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio::sync::mpsc;
//! use xysk_api::websocket::{Transport, TransportEventKind};
//!
//! let (events_tx, mut events_rx) = mpsc::unbounded_channel();
//! let mut transport = Transport::new(events_tx);
//! let generation = transport.open(&"ws://192.168.4.1/ws".parse()?)?;
//!
//! while let Some(event) = events_rx.recv().await {
//!     if !transport.is_current(event.generation) {
//!         continue;
//!     }
//!     if let TransportEventKind::Opened = event.kind {
//!         transport.send(r#"{"action":"getStatus"}"#.into())?;
//!     }
//! }
//! ```

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{
    self,
    protocol::{CloseFrame, frame::coding::CloseCode},
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::transport::{TlsMode, websocket_connector};

// ── Close codes ──────────────────────────────────────────────────────

/// Normal closure, sent and reported for requested closes.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close frame arrived without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Connection lost without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ── ReadyState ───────────────────────────────────────────────────────

/// Lifecycle state of the current socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

// ── TransportEvent ───────────────────────────────────────────────────

/// A lifecycle notification from a socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Received(String),
    Closed(u16),
    Errored(String),
}

// ── Transport ────────────────────────────────────────────────────────

struct Socket {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    state: watch::Receiver<ReadyState>,
    cancel: CancellationToken,
}

/// Owner of the one live socket.
///
/// Not `Clone`: exactly one owner (the session actor) drives it.
pub struct Transport {
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    tls: TlsMode,
    generation: u64,
    socket: Option<Socket>,
}

impl Transport {
    /// Create an idle transport that reports events on `events_tx`.
    pub fn new(events_tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            events_tx,
            tls: TlsMode::System,
            generation: 0,
            socket: None,
        }
    }

    /// Certificate handling for `wss` URLs.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    /// Open a socket to `url`, replacing any existing one.
    ///
    /// Returns the new generation. Fails without touching the current
    /// socket when `url` is not a usable `ws`/`wss` URL.
    pub fn open(&mut self, url: &Url) -> Result<u64, Error> {
        let uri = validate_url(url)?;
        let connector = if url.scheme() == "wss" {
            websocket_connector(self.tls).map_err(|e| Error::ConstructionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?
        } else {
            None
        };

        self.close();
        self.generation += 1;
        let generation = self.generation;

        let (state_tx, state_rx) = watch::channel(ReadyState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tracing::debug!(url = %url, generation, "Opening WebSocket");

        tokio::spawn(run_socket(SocketTask {
            uri,
            connector,
            generation,
            events_tx: self.events_tx.clone(),
            state_tx,
            outbound_rx,
            cancel: cancel.clone(),
        }));

        self.socket = Some(Socket {
            generation,
            outbound: outbound_tx,
            state: state_rx,
            cancel,
        });

        Ok(generation)
    }

    /// Queue a text frame. Fails with [`Error::NotOpen`] unless the socket
    /// is open; nothing is buffered for later.
    pub fn send(&self, text: String) -> Result<(), Error> {
        let state = self.ready_state();
        match &self.socket {
            Some(socket) if state == ReadyState::Open => {
                socket.outbound.send(text).map_err(|_| Error::NotOpen {
                    state: ReadyState::Closed.to_string(),
                })
            }
            _ => Err(Error::NotOpen {
                state: state.to_string(),
            }),
        }
    }

    /// Request a normal close of the current socket, if any.
    ///
    /// The socket is detached immediately, so its remaining events are no
    /// longer current.
    pub fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            tracing::debug!(generation = socket.generation, "Closing WebSocket");
            socket.cancel.cancel();
        }
    }

    /// State of the current socket, `Closed` when there is none.
    pub fn ready_state(&self) -> ReadyState {
        self.socket
            .as_ref()
            .map_or(ReadyState::Closed, |s| *s.state.borrow())
    }

    /// Generation of the most recent `open`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether an event tagged `generation` belongs to the attached socket.
    pub fn is_current(&self, generation: u64) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

fn validate_url(url: &Url) -> Result<tungstenite::http::Uri, Error> {
    let fail = |reason: String| Error::ConstructionFailed {
        url: url.to_string(),
        reason,
    };

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(fail(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(fail("missing host".into()));
    }

    url.as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| fail(e.to_string()))
}

// ── Socket task ──────────────────────────────────────────────────────

struct SocketTask {
    uri: tungstenite::http::Uri,
    connector: Option<tokio_tungstenite::Connector>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    state_tx: watch::Sender<ReadyState>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl SocketTask {
    fn emit(&self, kind: TransportEventKind) {
        // Owner gone means nobody cares about this socket any more.
        let _ = self.events_tx.send(TransportEvent {
            generation: self.generation,
            kind,
        });
    }

    fn finish(&self, code: u16) {
        self.state_tx.send_replace(ReadyState::Closed);
        self.emit(TransportEventKind::Closed(code));
    }

    fn fail(&self, error: String) {
        tracing::warn!(generation = self.generation, error = %error, "WebSocket failed");
        self.state_tx.send_replace(ReadyState::Closed);
        self.emit(TransportEventKind::Errored(error));
        self.emit(TransportEventKind::Closed(CLOSE_ABNORMAL));
    }
}

/// Handshake, then pump frames both ways until either side closes.
async fn run_socket(mut task: SocketTask) {
    let connector = task.connector.take();
    let handshake =
        tokio_tungstenite::connect_async_tls_with_config(task.uri.clone(), None, false, connector);
    let connected = tokio::select! {
        biased;
        () = task.cancel.cancelled() => {
            task.finish(CLOSE_NORMAL);
            return;
        }
        result = handshake => result,
    };

    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            task.fail(e.to_string());
            return;
        }
    };

    tracing::info!(generation = task.generation, "WebSocket connected");
    task.state_tx.send_replace(ReadyState::Open);
    task.emit(TransportEventKind::Opened);

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;
            () = task.cancel.cancelled() => {
                task.state_tx.send_replace(ReadyState::Closing);
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                if let Err(e) = write.send(tungstenite::Message::Close(Some(frame))).await {
                    tracing::debug!(error = %e, "Close frame not delivered");
                }
                task.finish(CLOSE_NORMAL);
                return;
            }
            Some(text) = task.outbound_rx.recv() => {
                if let Err(e) = write.send(tungstenite::Message::Text(text.into())).await {
                    task.fail(e.to_string());
                    return;
                }
            }
            frame = read.next() => match frame {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    task.emit(TransportEventKind::Received(text.as_str().to_owned()));
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    let code = frame.map_or(CLOSE_NO_STATUS, |cf| u16::from(cf.code));
                    tracing::info!(generation = task.generation, code, "WebSocket closed by peer");
                    task.finish(code);
                    return;
                }
                Some(Ok(_)) => {
                    // Binary, Ping, Pong: tungstenite answers pings itself
                }
                Some(Err(e)) => {
                    task.fail(e.to_string());
                    return;
                }
                None => {
                    task.fail("stream ended without close frame".into());
                    return;
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn open_rejects_http_scheme() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = Transport::new(tx);

        let err = transport
            .open(&Url::parse("http://192.168.4.1/ws").unwrap())
            .unwrap_err();

        assert!(matches!(err, Error::ConstructionFailed { .. }));
        assert_eq!(transport.generation(), 0);
        assert_eq!(transport.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn insecure_transport_opens_wss_urls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = Transport::new(tx).with_tls(TlsMode::DangerAcceptInvalid);
        let generation = transport
            .open(&Url::parse(&format!("wss://127.0.0.1:{port}/ws")).unwrap())
            .unwrap();

        let event = next_event(&mut rx).await;
        assert_eq!(event.generation, generation);
        assert!(matches!(event.kind, TransportEventKind::Errored(_)));
    }

    #[test]
    fn send_without_socket_is_not_open() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = Transport::new(tx);

        let err = transport.send("{}".into()).unwrap_err();
        assert!(matches!(err, Error::NotOpen { ref state } if state == "Closed"));
    }

    #[tokio::test]
    async fn refused_connection_reports_error_then_abnormal_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = Transport::new(tx);
        let generation = transport
            .open(&Url::parse(&format!("ws://127.0.0.1:{port}/ws")).unwrap())
            .unwrap();

        let first = next_event(&mut rx).await;
        assert_eq!(first.generation, generation);
        assert!(matches!(first.kind, TransportEventKind::Errored(_)));

        let second = next_event(&mut rx).await;
        assert_eq!(second.kind, TransportEventKind::Closed(CLOSE_ABNORMAL));
        assert_eq!(transport.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn reopening_bumps_generation_and_detaches_old_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                tokio::spawn(async move {
                    if let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await {
                        while let Some(Ok(_)) = ws.next().await {}
                    }
                });
            }
        });

        let url = Url::parse(&format!("ws://{addr}/ws")).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = Transport::new(tx);

        let first = transport.open(&url).unwrap();
        let second = transport.open(&url).unwrap();
        assert_eq!(second, first + 1);
        assert!(!transport.is_current(first));
        assert!(transport.is_current(second));

        // The second socket opens; anything from the first is stale.
        loop {
            let event = next_event(&mut rx).await;
            if event.generation == second {
                assert_eq!(event.kind, TransportEventKind::Opened);
                break;
            }
        }
        assert_eq!(transport.ready_state(), ReadyState::Open);
        transport.send(r#"{"action":"ping"}"#.into()).unwrap();
    }

    #[tokio::test]
    async fn inbound_text_frames_are_forwarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(tungstenite::Message::Text(r#"{"action":"pong"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = Transport::new(tx);
        transport
            .open(&Url::parse(&format!("ws://{addr}/ws")).unwrap())
            .unwrap();

        assert_eq!(next_event(&mut rx).await.kind, TransportEventKind::Opened);
        assert_eq!(
            next_event(&mut rx).await.kind,
            TransportEventKind::Received(r#"{"action":"pong"}"#.into())
        );
        assert!(matches!(
            next_event(&mut rx).await.kind,
            TransportEventKind::Closed(CLOSE_NO_STATUS | CLOSE_NORMAL)
        ));
    }
}
