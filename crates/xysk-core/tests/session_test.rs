// Integration tests for `Session` against an in-process WebSocket device
// and a wiremock HTTP fallback.

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use xysk_api::protocol::decode_command;
use xysk_core::{
    AddressStore, Command, ConnectionStatus, CoreError, DeviceAddress, Dispatch, DropReason,
    EventSource, MemoryAddressStore, ReconnectConfig, Session, SessionConfig,
};

// ── Mock device ─────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Behavior {
    handshake_delay: Duration,
    drop_first_connection: bool,
    refuse_first_handshake: bool,
    greeting: Vec<String>,
}

struct MockDevice {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    frames: Arc<Mutex<Vec<String>>>,
}

impl MockDevice {
    fn address(&self) -> DeviceAddress {
        DeviceAddress::parse(&self.addr.to_string()).unwrap()
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn actions(&self) -> Vec<String> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| decode_command(f).unwrap().action().to_owned())
            .collect()
    }
}

fn reply_to(frame: &str) -> String {
    let command = decode_command(frame).unwrap();
    let reply = match command {
        Command::GetStatus | Command::GetData => json!({
            "action": "statusResponse",
            "success": true,
            "connected": true,
            "voltage": 12.0,
            "current": 0.5,
            "power": 6.0,
            "outputEnabled": true,
            "operatingMode": "CV"
        }),
        Command::PowerOutput { enable } => json!({
            "action": "powerOutputResponse",
            "success": true,
            "enabled": enable
        }),
        Command::SetKeyLock { .. } => json!({
            "action": "keyLockResponse",
            "success": false,
            "error": "Power supply not connected"
        }),
        other => json!({ "action": format!("{}Response", other.action()), "success": true }),
    };
    reply.to_string()
}

async fn spawn_device(behavior: Behavior) -> MockDevice {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let frames = Arc::new(Mutex::new(Vec::new()));

    let (conn_count, frame_log) = (Arc::clone(&connections), Arc::clone(&frames));
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let n = conn_count.fetch_add(1, Ordering::SeqCst) + 1;
            let behavior = behavior.clone();
            let frame_log = Arc::clone(&frame_log);

            tokio::spawn(async move {
                tokio::time::sleep(behavior.handshake_delay).await;
                if behavior.refuse_first_handshake && n == 1 {
                    // Hang up before the upgrade: the attempt never opens.
                    drop(tcp);
                    return;
                }
                let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                    return;
                };
                if behavior.drop_first_connection && n == 1 {
                    // Abrupt drop: no close frame.
                    drop(ws);
                    return;
                }
                for frame in &behavior.greeting {
                    ws.send(Message::Text(frame.clone().into())).await.unwrap();
                }
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        frame_log.lock().unwrap().push(text.as_str().to_owned());
                        let reply = reply_to(text.as_str());
                        if ws.send(Message::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });

    MockDevice {
        addr,
        connections,
        frames,
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn test_config() -> SessionConfig {
    SessionConfig {
        keepalive_interval: None,
        ..SessionConfig::default()
    }
}

/// Nothing listens here, so REST mirrors fail fast and leave the socket
/// path as the only delivery.
const UNREACHABLE_REST: &str = "http://127.0.0.1:9/";

fn device_config() -> SessionConfig {
    SessionConfig {
        http_base: Some(Url::parse(UNREACHABLE_REST).unwrap()),
        ..test_config()
    }
}

fn rest_config(server: &MockServer) -> SessionConfig {
    SessionConfig {
        http_base: Some(Url::parse(&format!("{}/", server.uri())).unwrap()),
        ..test_config()
    }
}

fn new_session(config: SessionConfig) -> Session {
    Session::new(config, Arc::new(MemoryAddressStore::default()))
}

async fn closed_port_address() -> DeviceAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    DeviceAddress::parse(&addr.to_string()).unwrap()
}

async fn eventually<F: FnMut() -> bool>(mut check: F, what: &str) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn reconnect_scheduled(session: &Session) -> bool {
    session.diagnostics().await.unwrap().reconnect_scheduled
}

async fn pending_action(session: &Session) -> Option<&'static str> {
    session.diagnostics().await.unwrap().pending_action
}

async fn until_no_pending(session: &Session) {
    for _ in 0..300 {
        if pending_action(session).await.is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pending command was never cleared");
}

const WAIT: Duration = Duration::from_secs(3);

// ── Scenario A: status round trip ───────────────────────────────────

#[tokio::test]
async fn test_status_round_trip() {
    let device = spawn_device(Behavior::default()).await;
    let session = new_session(test_config());

    session.connect(device.address()).await.unwrap();
    session.wait_connected(WAIT).await.unwrap();

    let event = session.request(Command::GetStatus, WAIT).await.unwrap();
    assert_eq!(event.source, EventSource::Socket);
    assert_eq!(event.action(), Some("statusResponse"));

    let status = event.message.status().unwrap();
    assert_eq!(status.voltage, Some(12.0));
    assert_eq!(status.output_enabled, Some(true));

    let diag = session.diagnostics().await.unwrap();
    assert_eq!(diag.status, ConnectionStatus::Connected);
    assert!(diag.last_message_at.is_some());
    assert_eq!(device.actions(), ["getStatus"]);
}

// ── Scenario B: critical command replayed once ──────────────────────

#[tokio::test]
async fn test_power_output_queued_and_replayed_once() {
    let device = spawn_device(Behavior {
        handshake_delay: Duration::from_millis(300),
        ..Behavior::default()
    })
    .await;
    let session = new_session(device_config());

    session.connect(device.address()).await.unwrap();
    let dispatch = session
        .send_command(Command::PowerOutput { enable: true })
        .await;
    assert!(matches!(dispatch, Dispatch::QueuedWithFallback(_)));
    assert_eq!(
        session.diagnostics().await.unwrap().pending_action,
        Some("powerOutput")
    );

    session.wait_connected(WAIT).await.unwrap();
    eventually(|| !device.actions().is_empty(), "replayed frame").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(device.actions(), ["powerOutput"]);
    assert_eq!(device.connections(), 1);
    assert!(session.diagnostics().await.unwrap().pending_action.is_none());
}

#[tokio::test]
async fn test_newest_critical_command_wins() {
    let device = spawn_device(Behavior {
        handshake_delay: Duration::from_millis(300),
        ..Behavior::default()
    })
    .await;
    let session = new_session(device_config());

    session.connect(device.address()).await.unwrap();
    session.send_command(Command::PowerOutput { enable: true }).await;
    session.send_command(Command::PowerOutput { enable: false }).await;

    session.wait_connected(WAIT).await.unwrap();
    eventually(|| !device.actions().is_empty(), "replayed frame").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let frames = device.frames.lock().unwrap().clone();
    assert_eq!(frames.len(), 1);
    assert_eq!(
        decode_command(&frames[0]).unwrap(),
        Command::PowerOutput { enable: false }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_direct_send_is_never_followed_by_an_older_replay() {
    for _ in 0..10 {
        let device = spawn_device(Behavior {
            handshake_delay: Duration::from_millis(20),
            ..Behavior::default()
        })
        .await;
        let session = new_session(device_config());
        session.connect(device.address()).await.unwrap();

        // Alternate until one goes straight out on the socket.
        let mut last = None;
        let mut enable = false;
        for _ in 0..1000 {
            enable = !enable;
            let command = Command::PowerOutput { enable };
            let dispatch = session.send_command(command.clone()).await;
            last = Some(command);
            if dispatch == Dispatch::Sent {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(session.status(), ConnectionStatus::Connected);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let frames = device.frames.lock().unwrap().clone();
        let delivered = frames.last().map(|f| decode_command(f).unwrap());
        assert_eq!(delivered, last, "device ended on a stale command: {frames:?}");
        assert!(pending_action(&session).await.is_none());

        session.shutdown().await;
    }
}

// ── Pending command lifetime ────────────────────────────────────────

#[tokio::test]
async fn test_pending_command_is_dropped_when_its_attempt_fails() {
    let device = spawn_device(Behavior {
        handshake_delay: Duration::from_millis(200),
        refuse_first_handshake: true,
        ..Behavior::default()
    })
    .await;
    let session = new_session(SessionConfig {
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            ..ReconnectConfig::default()
        },
        ..device_config()
    });

    session.connect(device.address()).await.unwrap();
    session.send_command(Command::PowerOutput { enable: true }).await;
    assert_eq!(pending_action(&session).await, Some("powerOutput"));

    // First attempt is refused; the reconnect that follows succeeds.
    until_no_pending(&session).await;
    session.wait_connected(WAIT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(device.connections(), 2);
    assert!(
        device.actions().is_empty(),
        "command outlived its reconnect cycle: {:?}",
        device.actions()
    );
}

#[tokio::test]
async fn test_pending_command_does_not_outlive_retry_exhaustion() {
    let session = new_session(SessionConfig {
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(50),
            max_retries: Some(2),
            ..ReconnectConfig::default()
        },
        ..device_config()
    });
    session.connect(closed_port_address().await).await.unwrap();
    session.send_command(Command::PowerOutput { enable: true }).await;

    let mut gave_up = false;
    for _ in 0..300 {
        let diag = session.diagnostics().await.unwrap();
        if diag.status == ConnectionStatus::Error
            && !diag.reconnect_scheduled
            && diag.reconnect_attempt == 2
        {
            gave_up = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(gave_up, "session should stop after two retries");
    assert!(pending_action(&session).await.is_none());

    // Nothing comes back to life afterwards.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let diag = session.diagnostics().await.unwrap();
    assert_eq!(diag.reconnect_attempt, 2);
    assert!(!diag.reconnect_scheduled);
}

// ── Scenario C: single reconnect timer, cancelled by manual connect ─

#[tokio::test]
async fn test_manual_connect_cancels_scheduled_reconnect() {
    let device = spawn_device(Behavior {
        drop_first_connection: true,
        ..Behavior::default()
    })
    .await;
    let session = new_session(test_config());

    session.connect(device.address()).await.unwrap();

    let mut scheduled = false;
    for _ in 0..300 {
        if reconnect_scheduled(&session).await {
            scheduled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(scheduled, "drop should schedule a reconnect");
    assert_eq!(session.status(), ConnectionStatus::Error);

    session.connect(device.address()).await.unwrap();
    assert!(!reconnect_scheduled(&session).await);

    session.wait_connected(WAIT).await.unwrap();
    let diag = session.diagnostics().await.unwrap();
    assert_eq!(diag.reconnect_attempt, 0);
    assert!(!diag.reconnect_scheduled);

    // Past the first backoff delay: the cancelled timer must not fire.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(device.connections(), 2);
    assert_eq!(session.status(), ConnectionStatus::Connected);
}

// ── Scenario D: HTTP fallback for best-effort commands ──────────────

#[tokio::test]
async fn test_set_voltage_falls_back_to_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voltage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "voltage": 12.0,
            "current": 0.0,
            "outputEnabled": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = new_session(SessionConfig {
        http_base: Some(Url::parse(&format!("{}/", server.uri())).unwrap()),
        ..test_config()
    });
    session.connect(closed_port_address().await).await.unwrap();

    let event = session
        .request(Command::SetVoltage { voltage: 12.0 }, WAIT)
        .await
        .unwrap();
    assert_eq!(event.source, EventSource::Http);
    assert_eq!(event.action(), Some("statusResponse"));

    let requests = server.received_requests().await.unwrap();
    let order: Vec<_> = requests
        .iter()
        .map(|r| format!("{} {}", r.method, r.url.path()))
        .collect();
    assert_eq!(order, ["POST /api/voltage", "GET /api/data"]);

    session.shutdown().await;
}

#[tokio::test]
async fn test_power_output_reaches_rest_while_socket_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/power"))
        .and(body_json(json!({ "enable": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "voltage": 5.0,
            "outputEnabled": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = new_session(rest_config(&server));
    session.connect(closed_port_address().await).await.unwrap();

    let event = session
        .request(Command::PowerOutput { enable: true }, WAIT)
        .await
        .unwrap();
    assert_eq!(event.source, EventSource::Http);
    assert!(event.request.is_some());
    assert_eq!(event.message.status().unwrap().output_enabled, Some(true));

    // Delivered over REST: nothing left to replay.
    until_no_pending(&session).await;
    session.shutdown().await;
}

#[tokio::test]
async fn test_status_request_reads_rest_while_socket_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "voltage": 7.5,
            "current": 0.2
        })))
        .mount(&server)
        .await;

    let session = new_session(rest_config(&server));
    session.connect(closed_port_address().await).await.unwrap();

    let event = session.request(Command::GetStatus, WAIT).await.unwrap();
    assert_eq!(event.source, EventSource::Http);
    assert_eq!(event.action(), Some("statusResponse"));
    assert_eq!(event.message.status().unwrap().voltage, Some(7.5));
    session.shutdown().await;
}

#[tokio::test]
async fn test_rest_reply_is_matched_to_its_own_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voltage"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true }))
                .set_delay(Duration::from_millis(900)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "voltage": 9.0 })))
        .mount(&server)
        .await;

    let session = new_session(SessionConfig {
        refresh_interval: Some(Duration::from_millis(500)),
        ..rest_config(&server)
    });
    session.connect(closed_port_address().await).await.unwrap();
    let mut events = session.subscribe();

    let reply = session
        .request(Command::SetVoltage { voltage: 9.0 }, WAIT)
        .await
        .unwrap();
    assert!(reply.request.is_some());

    // An auto-refresh read landed first and was not taken as the reply.
    let mut saw_refresh = false;
    while let Ok(event) = events.try_recv() {
        if event.source == EventSource::Http && event.request.is_none() {
            saw_refresh = true;
        }
    }
    assert!(saw_refresh, "refresh read should have arrived before the reply");
    session.shutdown().await;
}

#[tokio::test]
async fn test_unmapped_best_effort_action_is_dropped_without_request() {
    let server = MockServer::start().await;
    let session = new_session(SessionConfig {
        http_base: Some(Url::parse(&format!("{}/", server.uri())).unwrap()),
        ..test_config()
    });
    session.connect(closed_port_address().await).await.unwrap();

    let dispatch = session.send_command(Command::SetKeyLock { lock: true }).await;
    assert_eq!(dispatch, Dispatch::Dropped(DropReason::NoRoute));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_commands_without_device_are_dropped() {
    let session = new_session(test_config());

    assert_eq!(
        session.send_command(Command::SetVoltage { voltage: 5.0 }).await,
        Dispatch::Dropped(DropReason::NoDevice)
    );
    assert_eq!(
        session.send_command(Command::PowerOutput { enable: true }).await,
        Dispatch::Dropped(DropReason::NoDevice)
    );
    assert_eq!(session.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_out_of_range_command_is_dropped() {
    let session = new_session(test_config());
    let dispatch = session
        .send_command(Command::SetVoltage { voltage: 31.0 })
        .await;
    assert!(matches!(dispatch, Dispatch::Dropped(DropReason::Invalid(_))));
}

// ── Scenario E: malformed frames are tolerated ──────────────────────

#[tokio::test]
async fn test_malformed_frame_is_skipped() {
    let device = spawn_device(Behavior {
        greeting: vec![
            "{not json".into(),
            json!({ "action": "statusResponse", "voltage": 3.3 }).to_string(),
        ],
        ..Behavior::default()
    })
    .await;
    let session = new_session(test_config());
    let mut events = session.subscribe();

    session.connect(device.address()).await.unwrap();

    let event = tokio::time::timeout(WAIT, events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.action(), Some("statusResponse"));
    assert_eq!(event.message.status().unwrap().voltage, Some(3.3));
    assert_eq!(session.status(), ConnectionStatus::Connected);
    assert!(!reconnect_scheduled(&session).await);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let device = spawn_device(Behavior::default()).await;
    let session = new_session(test_config());

    session.connect(device.address()).await.unwrap();
    session.wait_connected(WAIT).await.unwrap();

    session.disconnect().await;
    session.disconnect().await;

    let diag = session.diagnostics().await.unwrap();
    assert_eq!(diag.status, ConnectionStatus::Disconnected);
    assert!(!diag.reconnect_scheduled);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(device.connections(), 1);
    assert_eq!(session.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_disconnect_clears_pending_command() {
    let device = spawn_device(Behavior {
        handshake_delay: Duration::from_millis(400),
        ..Behavior::default()
    })
    .await;
    let session = new_session(device_config());

    session.connect(device.address()).await.unwrap();
    assert!(matches!(
        session.send_command(Command::GetStatus).await,
        Dispatch::QueuedWithFallback(_)
    ));
    session.disconnect().await;
    assert!(session.diagnostics().await.unwrap().pending_action.is_none());

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(device.actions().is_empty());
}

#[tokio::test]
async fn test_superseded_socket_close_is_ignored() {
    let stalled = spawn_device(Behavior {
        handshake_delay: Duration::from_secs(5),
        ..Behavior::default()
    })
    .await;
    let live = spawn_device(Behavior::default()).await;
    let session = new_session(test_config());

    session.connect(stalled.address()).await.unwrap();
    session.connect(live.address()).await.unwrap();
    session.wait_connected(WAIT).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let diag = session.diagnostics().await.unwrap();
    assert_eq!(diag.generation, 2);
    assert_eq!(diag.status, ConnectionStatus::Connected);
    assert!(!diag.reconnect_scheduled);
}

#[tokio::test]
async fn test_connected_address_is_persisted_and_restored() {
    let device = spawn_device(Behavior::default()).await;
    let store = Arc::new(MemoryAddressStore::default());

    let first = Session::new(test_config(), store.clone());
    first.connect(device.address()).await.unwrap();
    first.wait_connected(WAIT).await.unwrap();
    assert_eq!(store.load_last(), Some(device.address()));
    first.shutdown().await;

    let second = Session::new(test_config(), store);
    let restored = second.restore().await.unwrap();
    assert_eq!(restored, Some(device.address()));
    second.wait_connected(WAIT).await.unwrap();
    assert_eq!(device.connections(), 2);
}

#[tokio::test]
async fn test_restore_without_history_is_a_no_op() {
    let session = new_session(test_config());
    assert_eq!(session.restore().await.unwrap(), None);
    assert_eq!(session.status(), ConnectionStatus::Disconnected);
}

// ── Requests ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_surfaces_device_rejection() {
    let device = spawn_device(Behavior::default()).await;
    let session = new_session(test_config());
    session.connect(device.address()).await.unwrap();
    session.wait_connected(WAIT).await.unwrap();

    let err = session
        .request(Command::SetKeyLock { lock: true }, WAIT)
        .await
        .unwrap_err();
    match err {
        CoreError::Rejected { action, message } => {
            assert_eq!(action, "setKeyLock");
            assert_eq!(message, "Power supply not connected");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_auto_refresh_polls_status_while_open() {
    let device = spawn_device(Behavior::default()).await;
    let session = new_session(test_config());
    session.connect(device.address()).await.unwrap();
    session.wait_connected(WAIT).await.unwrap();

    session
        .set_refresh_interval(Some(Duration::from_millis(500)))
        .await;
    eventually(
        || device.actions().iter().filter(|a| *a == "getStatus").count() >= 2,
        "two refresh polls",
    )
    .await;

    session.set_refresh_interval(None).await;
}
