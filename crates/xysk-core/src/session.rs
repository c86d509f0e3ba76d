// ── Session manager ──
//
// Public façade over one device connection. A `Session` handle is cheap to
// clone and talks to a single actor task that owns every piece of mutable
// state: the transport slot, reconnect policy and timer, pending critical
// command, and the fallback client. REST calls run one at a time on a
// worker task and report back to the actor. Inbound frames are republished
// on a broadcast channel; connection status is observable through `watch`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use xysk_api::fallback::{self, FallbackClient};
use xysk_api::protocol::{self, Command, InboundMessage};
use xysk_api::{DeviceAddress, ReadyState, Transport, TransportEvent, TransportEventKind};

use crate::config::{SessionConfig, clamp_refresh};
use crate::error::CoreError;
use crate::queue::{PendingCritical, is_critical};
use crate::reconnect::{ReconnectPolicy, ReconnectTimer};
use crate::status::{ConnectionStatus, Diagnostics};
use crate::store::AddressStore;

const CONTROL_CHANNEL_SIZE: usize = 64;
const EVENT_CHANNEL_SIZE: usize = 256;

// ── Inbound events ───────────────────────────────────────────────

/// Which path delivered an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Socket,
    Http,
}

/// Identifies one REST call issued on behalf of `send_command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A decoded device message, republished to every subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct InboundEvent {
    pub message: InboundMessage,
    pub source: EventSource,
    /// Set on the status read that answers a REST call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestId>,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    fn new(message: InboundMessage, source: EventSource) -> Self {
        Self {
            message,
            source,
            request: None,
            received_at: Utc::now(),
        }
    }

    fn answering(message: InboundMessage, request: RequestId) -> Self {
        Self {
            request: Some(request),
            ..Self::new(message, EventSource::Http)
        }
    }

    pub fn action(&self) -> Option<&str> {
        self.message.action.as_deref()
    }
}

// ── Dispatch outcome ─────────────────────────────────────────────

/// What `send_command` did locally. Says nothing about whether the device
/// applied the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Written to the open socket.
    Sent,
    /// Held as the pending critical command until the socket opens.
    Queued,
    /// Held as pending and also issued over REST. Whichever lands first
    /// answers; a REST success retires the pending copy.
    QueuedWithFallback(RequestId),
    /// Handed to the HTTP fallback client.
    Fallback(RequestId),
    Dropped(DropReason),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    #[error("invalid parameters ({0})")]
    Invalid(String),
    #[error("no device address is known")]
    NoDevice,
    #[error("socket is not open and the action has no HTTP route")]
    NoRoute,
    #[error("cannot open a connection ({0})")]
    Unreachable(String),
    #[error("session has shut down")]
    SessionClosed,
}

// ── Control messages ─────────────────────────────────────────────

enum Control {
    Connect {
        address: DeviceAddress,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Send {
        command: Command,
        reply: oneshot::Sender<Dispatch>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Restore {
        reply: oneshot::Sender<Result<Option<DeviceAddress>, CoreError>>,
    },
    SetRefresh {
        interval: Option<Duration>,
    },
    Diagnostics {
        reply: oneshot::Sender<Diagnostics>,
    },
}

// ── Session ──────────────────────────────────────────────────────

/// Handle to a device session.
///
/// Cheaply cloneable via `Arc<SessionInner>`. The actor task is spawned by
/// [`new`](Self::new), so it must be called inside a Tokio runtime. The
/// actor stops when [`shutdown`](Self::shutdown) is called or every handle
/// is dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    control_tx: mpsc::Sender<Control>,
    status: watch::Receiver<ConnectionStatus>,
    event_tx: broadcast::Sender<Arc<InboundEvent>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session and spawn its actor. Does not connect.
    pub fn new(config: SessionConfig, store: Arc<dyn AddressStore>) -> Self {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_SIZE);
        let (status_tx, status) = watch::channel(ConnectionStatus::Disconnected);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let actor = Actor::new(
            config,
            store,
            control_rx,
            status_tx,
            event_tx.clone(),
            cancel.clone(),
        );
        let task = tokio::spawn(actor.run());

        Self {
            inner: Arc::new(SessionInner {
                control_tx,
                status,
                event_tx,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Open a socket to `address`, replacing any existing connection.
    ///
    /// Returns once the attempt has started; watch [`status`](Self::status)
    /// or call [`wait_connected`](Self::wait_connected) for the outcome.
    pub async fn connect(&self, address: DeviceAddress) -> Result<(), CoreError> {
        self.call(|reply| Control::Connect { address, reply })
            .await?
    }

    /// Reconnect to the last persisted address, if there is one.
    pub async fn restore(&self) -> Result<Option<DeviceAddress>, CoreError> {
        self.call(|reply| Control::Restore { reply }).await?
    }

    /// Close the connection and stop reconnecting. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        if self.call(|reply| Control::Disconnect { reply }).await.is_err() {
            debug!("disconnect on a session that already shut down");
        }
    }

    /// Wait until the socket is open.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut status = self.inner.status.clone();
        let wait = status.wait_for(|s| *s == ConnectionStatus::Connected);
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(CoreError::SessionClosed),
            Err(_) => Err(CoreError::timeout("connect", timeout)),
        }
    }

    /// Wait until the current connection attempt resolves, either way.
    ///
    /// Returns the status it settled on (`Connected`, `Error`, or
    /// `Disconnected`).
    pub async fn wait_settled(&self, timeout: Duration) -> Result<ConnectionStatus, CoreError> {
        let mut status = self.inner.status.clone();
        let wait = status.wait_for(|s| *s != ConnectionStatus::Connecting);
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(settled)) => Ok(*settled),
            Ok(Err(_)) => Err(CoreError::SessionClosed),
            Err(_) => Err(CoreError::timeout("connect", timeout)),
        }
    }

    /// Stop the actor and close the socket.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Route `command` to the socket, the pending slot, or the HTTP fallback.
    pub async fn send_command(&self, command: Command) -> Dispatch {
        self.call(|reply| Control::Send { command, reply })
            .await
            .unwrap_or(Dispatch::Dropped(DropReason::SessionClosed))
    }

    /// Send `command` and wait for the device's answer.
    ///
    /// Socket dispatches wait for the matching response action; HTTP
    /// fallbacks wait for the status read that follows their own REST call.
    pub async fn request(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<Arc<InboundEvent>, CoreError> {
        let action = command.action();
        let mut rx = self.subscribe();

        let (via_socket, via_http) = match self.send_command(command.clone()).await {
            Dispatch::Sent | Dispatch::Queued => (true, None),
            Dispatch::QueuedWithFallback(id) => (true, Some(id)),
            Dispatch::Fallback(id) => (false, Some(id)),
            Dispatch::Dropped(reason) => {
                return Err(CoreError::Dropped {
                    action: action.to_owned(),
                    reason,
                });
            }
        };

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let matched = match event.source {
                            EventSource::Socket => {
                                via_socket
                                    && (event.message.is_response_to(&command)
                                        || event.action() == Some("error"))
                            }
                            EventSource::Http => via_http.is_some() && event.request == via_http,
                        };
                        if matched {
                            return Ok(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "request listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(CoreError::SessionClosed);
                    }
                }
            }
        };

        let event = tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| CoreError::timeout(action, timeout))??;

        if event.message.success() == Some(false) || event.action() == Some("error") {
            return Err(CoreError::Rejected {
                action: action.to_owned(),
                message: event
                    .message
                    .error_message()
                    .unwrap_or("device reported failure")
                    .to_owned(),
            });
        }

        Ok(event)
    }

    /// Enable, retune, or (with `None`) disable periodic status refresh.
    pub async fn set_refresh_interval(&self, interval: Option<Duration>) {
        let sent = self
            .inner
            .control_tx
            .send(Control::SetRefresh { interval })
            .await;
        if sent.is_err() {
            debug!("refresh change on a session that already shut down");
        }
    }

    // ── State observation ────────────────────────────────────────

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Subscribe to connection status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.clone()
    }

    /// Subscribe to inbound device messages.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<InboundEvent>> {
        self.inner.event_tx.subscribe()
    }

    pub async fn diagnostics(&self) -> Result<Diagnostics, CoreError> {
        self.call(|reply| Control::Diagnostics { reply }).await
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Control,
    ) -> Result<T, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .control_tx
            .send(make(tx))
            .await
            .map_err(|_| CoreError::SessionClosed)?;
        rx.await.map_err(|_| CoreError::SessionClosed)
    }
}

// ── Actor ────────────────────────────────────────────────────────

struct Actor {
    config: SessionConfig,
    store: Arc<dyn AddressStore>,
    control_rx: mpsc::Receiver<Control>,
    status_tx: watch::Sender<ConnectionStatus>,
    event_tx: broadcast::Sender<Arc<InboundEvent>>,
    cancel: CancellationToken,

    transport: Transport,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    policy: ReconnectPolicy,
    timer: ReconnectTimer,
    pending: PendingCritical,
    address: Option<DeviceAddress>,
    fallback: Option<Arc<FallbackClient>>,
    fallback_jobs: mpsc::UnboundedSender<FallbackJob>,
    fallback_rx: mpsc::UnboundedReceiver<FallbackDone>,
    next_request: u64,
    manual_close: bool,
    last_message_at: Option<DateTime<Utc>>,
    keepalive: Option<Interval>,
    refresh: Option<Interval>,
}

impl Actor {
    fn new(
        config: SessionConfig,
        store: Arc<dyn AddressStore>,
        control_rx: mpsc::Receiver<Control>,
        status_tx: watch::Sender<ConnectionStatus>,
        event_tx: broadcast::Sender<Arc<InboundEvent>>,
        cancel: CancellationToken,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy::new(config.reconnect.clone());
        let refresh = config.refresh_interval.map(make_interval);
        let pending = PendingCritical::default();

        let (fallback_jobs, jobs_rx) = mpsc::unbounded_channel();
        let (done_tx, fallback_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_fallback_worker(
            jobs_rx,
            done_tx,
            pending.mirror_handle(),
            cancel.clone(),
        ));
        let transport = Transport::new(transport_tx).with_tls(config.http.tls);

        let mut actor = Self {
            config,
            store,
            control_rx,
            status_tx,
            event_tx,
            cancel,
            transport,
            transport_rx,
            policy,
            timer: ReconnectTimer::default(),
            pending,
            address: None,
            fallback: None,
            fallback_jobs,
            fallback_rx,
            next_request: 0,
            manual_close: false,
            last_message_at: None,
            keepalive: None,
            refresh,
        };

        // An explicit REST base works before any device is connected.
        if let Some(base) = actor.config.http_base.clone() {
            actor.fallback = actor.build_fallback(base);
        }
        actor
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                control = self.control_rx.recv() => {
                    let Some(control) = control else { break };
                    self.handle_control(control);
                }
                Some(event) = self.transport_rx.recv() => self.handle_transport(event),
                Some(done) = self.fallback_rx.recv() => self.handle_fallback_done(done),
                () = self.timer.fired() => self.handle_reconnect_timer(),
                () = tick(&mut self.keepalive) => self.handle_keepalive(),
                () = tick(&mut self.refresh) => self.handle_refresh(),
            }
        }

        self.transport.close();
        self.status_tx.send_replace(ConnectionStatus::Disconnected);
        debug!("session actor exiting");
    }

    // ── Control handling ─────────────────────────────────────────

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Connect { address, reply } => {
                let _ = reply.send(self.connect(address));
            }
            Control::Send { command, reply } => {
                let _ = reply.send(self.dispatch(command));
            }
            Control::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(());
            }
            Control::Restore { reply } => {
                let result = match self.store.load_last() {
                    Some(address) => self.connect(address.clone()).map(|()| Some(address)),
                    None => Ok(None),
                };
                let _ = reply.send(result);
            }
            Control::SetRefresh { interval } => {
                debug!(?interval, "refresh interval changed");
                self.refresh = interval.map(make_interval);
            }
            Control::Diagnostics { reply } => {
                let _ = reply.send(self.diagnostics());
            }
        }
    }

    /// Manual connect: cancel any scheduled reconnect and start counting
    /// attempts from zero.
    fn connect(&mut self, address: DeviceAddress) -> Result<(), CoreError> {
        self.timer.cancel();
        self.policy.reset();
        self.open(address)
    }

    fn open(&mut self, address: DeviceAddress) -> Result<(), CoreError> {
        let origin = &self.config.origin;
        let resolved = address.resolve(origin);

        let url = match resolved.ws_url(origin) {
            Ok(url) => url,
            Err(e) => {
                self.set_status(ConnectionStatus::Error);
                return Err(e.into());
            }
        };

        let generation = match self.transport.open(&url) {
            Ok(generation) => generation,
            Err(e) => {
                warn!(error = %e, "cannot open socket");
                self.set_status(ConnectionStatus::Error);
                return Err(e.into());
            }
        };
        // A waiting critical command rides whichever attempt is current.
        self.pending.bind(generation);

        if self.address.as_ref() != Some(&resolved) || self.fallback.is_none() {
            let base = match self.config.http_base.clone() {
                Some(base) => Ok(base),
                None => resolved.http_base(origin),
            };
            self.fallback = match base {
                Ok(base) => self.build_fallback(base),
                Err(e) => {
                    warn!(error = %e, "no HTTP fallback for this address");
                    None
                }
            };
        }

        info!(address = %resolved, generation, "connecting");
        self.address = Some(resolved);
        self.manual_close = false;
        self.keepalive = None;
        self.set_status(ConnectionStatus::Connecting);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.manual_close = true;
        self.timer.cancel();
        self.pending.clear();
        self.keepalive = None;
        self.transport.close();
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// The single routing point for outbound commands.
    fn dispatch(&mut self, command: Command) -> Dispatch {
        let action = command.action();

        if let Err(e) = command.validate() {
            warn!(action, error = %e, "rejecting command");
            return Dispatch::Dropped(DropReason::Invalid(e.to_string()));
        }

        let critical = is_critical(&command);

        if self.is_open() {
            match self.write(&command) {
                Ok(()) => {
                    if critical {
                        // Anything still waiting is older than this.
                        self.pending.clear();
                    }
                    return Dispatch::Sent;
                }
                Err(e) => debug!(action, error = %e, "socket write failed, rerouting"),
            }
        }

        if critical {
            return self.queue_critical(command);
        }

        if fallback::route_for(&command).is_none() {
            warn!(action, "socket closed and no HTTP route, dropping");
            return Dispatch::Dropped(DropReason::NoRoute);
        }
        let Some(client) = self.fallback.clone() else {
            warn!(action, "no device for HTTP fallback");
            return Dispatch::Dropped(DropReason::NoDevice);
        };

        info!(action, "sending over HTTP fallback");
        let id = self.next_request_id();
        self.enqueue_fallback(id, command, client, false);
        Dispatch::Fallback(id)
    }

    /// Park a critical command for the next socket open, start an attempt
    /// if none is in flight, and mirror it over REST when a route exists.
    fn queue_critical(&mut self, command: Command) -> Dispatch {
        let action = command.action();
        let Some(address) = self.address.clone() else {
            warn!(action, "no device to queue for");
            return Dispatch::Dropped(DropReason::NoDevice);
        };

        let client = self
            .fallback
            .clone()
            .filter(|_| fallback::route_for(&command).is_some());
        let mirror = client.as_ref().map(|_| self.next_request_id());

        if let Some(old) = self.pending.store(command.clone(), mirror.map(RequestId::get)) {
            debug!(superseded = old.action(), action, "pending command replaced");
        }

        match self.transport.ready_state() {
            // Open here means the `Opened` event is still on its way; the
            // replay in `on_opened` carries the command.
            ReadyState::Connecting | ReadyState::Open => {
                self.pending.bind(self.transport.generation());
            }
            ReadyState::Closing | ReadyState::Closed => {
                self.timer.cancel();
                if let Err(e) = self.open(address) {
                    warn!(action, error = %e, "connection attempt for queued command failed");
                    self.pending.clear();
                    return match (client, mirror) {
                        (Some(client), Some(id)) => {
                            info!(action, "sending over HTTP fallback");
                            self.enqueue_fallback(id, command, client, false);
                            Dispatch::Fallback(id)
                        }
                        _ => Dispatch::Dropped(DropReason::Unreachable(e.to_string())),
                    };
                }
            }
        }

        match (client, mirror) {
            (Some(client), Some(id)) => {
                debug!(action, request = id.get(), "mirroring queued command over HTTP");
                self.enqueue_fallback(id, command, client, true);
                Dispatch::QueuedWithFallback(id)
            }
            _ => Dispatch::Queued,
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    fn enqueue_fallback(
        &self,
        id: RequestId,
        command: Command,
        client: Arc<FallbackClient>,
        mirror: bool,
    ) {
        let job = FallbackJob {
            id,
            command,
            client,
            mirror,
        };
        if self.fallback_jobs.send(job).is_err() {
            debug!(request = id.get(), "HTTP worker gone, request not issued");
        }
    }

    fn handle_fallback_done(&mut self, done: FallbackDone) {
        match done.result {
            Ok(message) => {
                if let Some(command) = self.pending.settle(done.id.get()) {
                    info!(action = command.action(), "pending command delivered over HTTP");
                }
                publish(&self.event_tx, InboundEvent::answering(message, done.id));
            }
            Err(e) => warn!(action = done.action, error = %e, "HTTP fallback failed"),
        }
    }

    fn write(&self, command: &Command) -> Result<(), xysk_api::Error> {
        let frame = protocol::encode(command)?;
        self.transport.send(frame)?;
        debug!(action = command.action(), "sent");
        Ok(())
    }

    // ── Transport events ─────────────────────────────────────────

    fn handle_transport(&mut self, event: TransportEvent) {
        if !self.transport.is_current(event.generation) {
            debug!(generation = event.generation, "ignoring stale socket event");
            return;
        }

        match event.kind {
            TransportEventKind::Opened => self.on_opened(),
            TransportEventKind::Received(text) => self.on_received(&text),
            TransportEventKind::Errored(reason) => {
                warn!(reason = %reason, "socket error");
                self.set_status(ConnectionStatus::Error);
            }
            TransportEventKind::Closed(code) => self.on_closed(event.generation, code),
        }
    }

    fn on_opened(&mut self) {
        info!(generation = self.transport.generation(), "connected");
        self.set_status(ConnectionStatus::Connected);
        self.policy.reset();
        self.timer.cancel();
        self.keepalive = self.config.keepalive_interval.map(make_interval);

        if let Some(address) = &self.address {
            if let Err(e) = self.store.save_last(address) {
                warn!(error = %e, "could not persist last device");
            }
        }

        if let Some(command) = self.pending.take() {
            info!(action = command.action(), "replaying pending command");
            if let Err(e) = self.write(&command) {
                warn!(action = command.action(), error = %e, "replay failed");
            }
        }
    }

    fn on_received(&mut self, text: &str) {
        self.last_message_at = Some(Utc::now());
        match protocol::decode_frame(text) {
            Ok(message) => publish(
                &self.event_tx,
                InboundEvent::new(message, EventSource::Socket),
            ),
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }

    fn on_closed(&mut self, generation: u64, code: u16) {
        self.keepalive = None;

        if self.manual_close {
            self.set_status(ConnectionStatus::Disconnected);
            return;
        }

        if let Some(command) = self.pending.expire(generation) {
            warn!(
                action = command.action(),
                generation, "connection attempt failed, dropping pending command"
            );
        }

        if *self.status_tx.borrow() != ConnectionStatus::Error {
            self.set_status(ConnectionStatus::Disconnected);
        }

        match self.policy.next_delay() {
            Some(delay) => {
                info!(
                    code,
                    attempt = self.policy.attempt(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "socket closed, reconnect scheduled"
                );
                self.timer.schedule(delay);
            }
            None => {
                warn!(code, "reconnection limit reached, giving up");
                if let Some(command) = self.pending.abandon() {
                    warn!(action = command.action(), "dropping pending command");
                }
                self.set_status(ConnectionStatus::Error);
            }
        }
    }

    fn handle_reconnect_timer(&mut self) {
        let Some(address) = self.address.clone() else {
            return;
        };
        debug!(attempt = self.policy.attempt(), "reconnecting");
        if let Err(e) = self.open(address) {
            warn!(error = %e, "reconnect attempt failed");
        }
    }

    // ── Periodic work ────────────────────────────────────────────

    fn handle_keepalive(&mut self) {
        if let Err(e) = self.write(&Command::Ping) {
            debug!(error = %e, "keep-alive ping not sent");
        }
    }

    fn handle_refresh(&mut self) {
        if self.is_open() {
            if let Err(e) = self.write(&Command::GetStatus) {
                debug!(error = %e, "status refresh not sent");
            }
            return;
        }

        let Some(client) = self.fallback.clone() else {
            return;
        };
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            match client.fetch_data().await {
                Ok(message) => publish(&event_tx, InboundEvent::new(message, EventSource::Http)),
                Err(e) => debug!(error = %e, "HTTP status refresh failed"),
            }
        });
    }

    // ── Helpers ──────────────────────────────────────────────────

    /// Open as far as the actor has observed, not just the socket task.
    fn is_open(&self) -> bool {
        *self.status_tx.borrow() == ConnectionStatus::Connected
            && self.transport.ready_state() == ReadyState::Open
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    fn build_fallback(&self, base: url::Url) -> Option<Arc<FallbackClient>> {
        match FallbackClient::new(base, &self.config.http) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "could not build HTTP fallback client");
                None
            }
        }
    }

    fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            status: *self.status_tx.borrow(),
            address: self.address.clone(),
            generation: self.transport.generation(),
            ready_state: self.transport.ready_state().to_string(),
            reconnect_attempt: self.policy.attempt(),
            reconnect_scheduled: self.timer.is_pending(),
            pending_action: self.pending.peek().map(Command::action),
            last_message_at: self.last_message_at,
        }
    }
}

fn publish(event_tx: &broadcast::Sender<Arc<InboundEvent>>, event: InboundEvent) {
    // No subscribers right now is fine.
    let _ = event_tx.send(Arc::new(event));
}

// ── HTTP worker ──────────────────────────────────────────────────

struct FallbackJob {
    id: RequestId,
    command: Command,
    client: Arc<FallbackClient>,
    /// REST copy of a pending critical command.
    mirror: bool,
}

struct FallbackDone {
    id: RequestId,
    action: &'static str,
    result: Result<InboundMessage, xysk_api::Error>,
}

/// Run REST calls one at a time, in dispatch order.
///
/// Mirrors whose pending command was replaced, replayed, or dropped while
/// they waited are skipped.
async fn run_fallback_worker(
    mut jobs: mpsc::UnboundedReceiver<FallbackJob>,
    done: mpsc::UnboundedSender<FallbackDone>,
    wanted_mirror: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let action = job.command.action();
        if job.mirror && wanted_mirror.load(Ordering::SeqCst) != job.id.get() {
            debug!(action, request = job.id.get(), "skipping stale HTTP mirror");
            continue;
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = job.client.execute(&job.command) => result,
        };
        let report = FallbackDone {
            id: job.id,
            action,
            result,
        };
        if done.send(report).is_err() {
            break;
        }
    }
    debug!("HTTP worker exiting");
}

fn make_interval(period: Duration) -> Interval {
    let period = clamp_refresh(period);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
