//! End-to-end pipeline tests against an in-process mock control server.
//!
//! The mock speaks the same HTTP/SSE contract as the real control server:
//! a (double-encoded) init document, an SSE delta stream, and the three
//! command endpoints with boolean acknowledgements. Tests drive the mock to
//! exercise snapshot loading, stream reconciliation, poisoning on connection
//! loss and recovery after reconnect, confirm-then-commit command semantics,
//! and session teardown.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use mhv4_console::format::{format_current, format_voltage};
use mhv4_console::state::DeviceState;
use mhv4_console::{ConsoleSession, ModeChangeConfirmation, Settings};
use serde_json::json;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;

struct MockControlServer {
    snapshot: Mutex<serde_json::Value>,
    init_fail: AtomicBool,
    ack: AtomicBool,
    sse: Mutex<Option<broadcast::Sender<String>>>,
    received: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MockControlServer {
    fn new(channels: usize) -> Arc<Self> {
        let records: Vec<serde_json::Value> = (0..channels)
            .map(|i| {
                json!({
                    "bus": (i / 8) as i64,
                    "dev": ((i / 4) % 2) as i64,
                    "ch": (i % 4) as i64,
                    "current": 0,
                    "is_on": false,
                    "is_positive": true,
                })
            })
            .collect();

        Arc::new(Self {
            snapshot: Mutex::new(json!({
                "is_rc": false,
                "is_progress": false,
                "mhv4_data_array": records,
            })),
            init_fail: AtomicBool::new(false),
            ack: AtomicBool::new(true),
            sse: Mutex::new(Some(broadcast::channel(16).0)),
            received: Mutex::new(Vec::new()),
        })
    }

    fn send_delta(&self, voltage: &[i64], current: &[i64], busy: bool) {
        let data = serde_json::to_string(&json!([voltage, current, busy])).unwrap();
        let guard = self.sse.lock().unwrap();
        if let Some(sender) = guard.as_ref() {
            let _ = sender.send(data);
        }
    }

    /// Drop every open SSE connection and refuse new ones.
    fn kill_stream(&self) {
        self.sse.lock().unwrap().take();
    }

    /// Accept SSE subscriptions again.
    fn restore_stream(&self) {
        *self.sse.lock().unwrap() = Some(broadcast::channel(16).0);
    }

    fn received_bodies(&self, route: &str) -> Vec<serde_json::Value> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == route)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

async fn init_handler(State(server): State<Arc<MockControlServer>>) -> impl IntoResponse {
    if server.init_fail.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "down").into_response();
    }
    // the real server double-encodes: a JSON string containing the document
    let doc = server.snapshot.lock().unwrap().to_string();
    Json(doc).into_response()
}

async fn sse_handler(State(server): State<Arc<MockControlServer>>) -> impl IntoResponse {
    let receiver = {
        let guard = server.sse.lock().unwrap();
        match guard.as_ref() {
            Some(sender) => sender.subscribe(),
            None => return (StatusCode::SERVICE_UNAVAILABLE, "no stream").into_response(),
        }
    };

    let stream = BroadcastStream::new(receiver)
        .filter_map(|msg| futures::future::ready(msg.ok()))
        .map(|data| Ok::<_, Infallible>(Event::default().data(data)));
    Sse::new(stream).into_response()
}

fn command_handler(
    route: &'static str,
) -> impl Fn(
    State<Arc<MockControlServer>>,
    Json<serde_json::Value>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Json<bool>> + Send>>
       + Clone {
    move |State(server), Json(body)| {
        Box::pin(async move {
            server
                .received
                .lock()
                .unwrap()
                .push((route.to_string(), body));
            Json(server.ack.load(Ordering::SeqCst))
        })
    }
}

async fn start_mock(server: Arc<MockControlServer>) -> Settings {
    let app = Router::new()
        .route("/mhv4_data", get(init_handler))
        .route("/sse", get(sse_handler))
        .route("/apply", post(command_handler("apply")))
        .route("/onoff", post(command_handler("onoff")))
        .route("/status", post(command_handler("status")))
        .with_state(server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut settings = Settings::with_base_url(format!("http://{addr}"));
    settings.limits.reconnect_delay_ms = 50;
    settings.limits.request_timeout_ms = 2_000;
    settings
}

/// Wait until the store publishes a state matching the predicate.
async fn wait_for<F>(rx: &mut watch::Receiver<DeviceState>, mut pred: F) -> DeviceState
where
    F: FnMut(&DeviceState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let state = rx.borrow();
                if pred(&state) {
                    return state.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("state did not reach the expected condition in time")
}

/// Publish a delta until the store reflects it. Re-sending is safe because
/// deltas are idempotent; this rides out the consumer's (re)subscription
/// window, where a broadcast message would find no subscriber.
async fn publish_until<F>(
    server: &MockControlServer,
    rx: &mut watch::Receiver<DeviceState>,
    voltage: &[i64],
    current: &[i64],
    busy: bool,
    mut pred: F,
) -> DeviceState
where
    F: FnMut(&DeviceState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            server.send_delta(voltage, current, busy);
            tokio::time::sleep(Duration::from_millis(25)).await;
            let state = rx.borrow_and_update().clone();
            if pred(&state) {
                return state;
            }
        }
    })
    .await
    .expect("published delta was never reflected in the state")
}

#[tokio::test]
async fn snapshot_establishes_state_from_double_encoded_document() {
    let server = MockControlServer::new(4);
    let settings = start_mock(server.clone()).await;

    let mut session = ConsoleSession::connect(settings).await.unwrap();
    let state = session.store().current();

    assert!(!state.mode);
    assert!(!state.busy);
    assert_eq!(state.channels.len(), 4);

    session.close().await;
}

#[tokio::test]
async fn stream_deltas_are_reconciled_and_formatted() {
    let server = MockControlServer::new(4);
    let settings = start_mock(server.clone()).await;

    let mut session = ConsoleSession::connect(settings).await.unwrap();
    let mut rx = session.store().subscribe();

    let state = publish_until(
        &server,
        &mut rx,
        &[12, -100_000, 34, 56],
        &[1, 2, -100_000, 4],
        false,
        |s| s.channels[0].voltage_raw == 12,
    )
    .await;

    let voltages: Vec<String> = state
        .channels
        .iter()
        .map(|c| format_voltage(c.voltage_raw))
        .collect();
    assert_eq!(voltages, ["1.2", "read error!", "3.4", "5.6"]);

    let currents: Vec<String> = state
        .channels
        .iter()
        .map(|c| format_current(c.current_raw))
        .collect();
    assert_eq!(currents, ["0.001", "0.002", "read error!", "0.004"]);

    session.close().await;
}

#[tokio::test]
async fn connection_loss_poisons_readings_and_reconnect_recovers() {
    let server = MockControlServer::new(4);
    let settings = start_mock(server.clone()).await;

    let mut session = ConsoleSession::connect(settings).await.unwrap();
    let mut rx = session.store().subscribe();

    publish_until(&server, &mut rx, &[10, 20, 30, 40], &[1, 2, 3, 4], false, |s| {
        s.channels[3].voltage_raw == 40
    })
    .await;

    // sever the stream: every reading must turn into a read failure
    server.kill_stream();
    wait_for(&mut rx, |s| s.all_readings_poisoned()).await;

    // reconnect: readings stay poisoned until the first new message
    server.restore_stream();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(session.store().current().all_readings_poisoned());

    let state = publish_until(
        &server,
        &mut rx,
        &[11, 21, 31, 41],
        &[5, 6, 7, 8],
        false,
        |s| s.channels[0].voltage_raw == 11,
    )
    .await;
    assert_eq!(state.channels[3].current_raw, 8);

    session.close().await;
}

#[tokio::test]
async fn snapshot_failure_leaves_no_session() {
    let server = MockControlServer::new(4);
    server.init_fail.store(true, Ordering::SeqCst);
    let settings = start_mock(server.clone()).await;

    assert!(ConsoleSession::connect(settings).await.is_err());
}

#[tokio::test]
async fn snapshot_with_partial_module_is_rejected() {
    let server = MockControlServer::new(6);
    let settings = start_mock(server.clone()).await;

    let result = ConsoleSession::connect(settings).await;
    assert!(matches!(result, Err(mhv4_console::Error::Protocol(_))));
}

#[tokio::test]
async fn on_off_commits_only_on_affirmative_ack() {
    let server = MockControlServer::new(4);
    let settings = start_mock(server.clone()).await;

    let mut session = ConsoleSession::connect(settings).await.unwrap();
    let commander = session.commander();

    // falsy acknowledgement: error, store untouched
    server.ack.store(false, Ordering::SeqCst);
    let result = commander.apply_on_off(&[true, true, true, true]).await;
    assert!(matches!(result, Err(mhv4_console::Error::Protocol(_))));
    assert!(session.store().current().channels.iter().all(|c| !c.is_on));

    // affirmative acknowledgement: folded into the store
    server.ack.store(true, Ordering::SeqCst);
    commander.apply_on_off(&[true, false, true, false]).await.unwrap();
    let state = session.store().current();
    assert!(state.channels[0].is_on);
    assert!(!state.channels[1].is_on);
    assert!(state.channels[2].is_on);

    assert_eq!(
        server.received_bodies("onoff").last().unwrap(),
        &json!([true, false, true, false])
    );

    session.close().await;
}

#[tokio::test]
async fn mode_flip_requires_confirmation_and_folds_on_ack() {
    let server = MockControlServer::new(4);
    let settings = start_mock(server.clone()).await;

    let mut session = ConsoleSession::connect(settings).await.unwrap();
    let commander = session.commander();

    server.ack.store(false, Ordering::SeqCst);
    let result = commander
        .flip_mode(true, ModeChangeConfirmation::granted())
        .await;
    assert!(result.is_err());
    assert!(!session.store().current().mode);

    server.ack.store(true, Ordering::SeqCst);
    commander
        .flip_mode(true, ModeChangeConfirmation::granted())
        .await
        .unwrap();
    assert!(session.store().current().mode);
    assert_eq!(
        server.received_bodies("status").last().unwrap(),
        &json!(true)
    );

    session.close().await;
}

#[tokio::test]
async fn apply_setpoints_never_touches_readback() {
    let server = MockControlServer::new(4);
    let settings = start_mock(server.clone()).await;

    let mut session = ConsoleSession::connect(settings).await.unwrap();
    let before = session.store().current();

    session
        .commander()
        .apply_setpoints(&[250, 250, 100, 0])
        .await
        .unwrap();

    // the stream, not the command, updates voltage readback
    let after = session.store().current();
    assert_eq!(before.channels, after.channels);
    assert_eq!(
        server.received_bodies("apply").last().unwrap(),
        &json!([250, 250, 100, 0])
    );

    session.close().await;
}

#[tokio::test]
async fn setpoint_count_mismatch_is_rejected_before_any_request() {
    let server = MockControlServer::new(4);
    let settings = start_mock(server.clone()).await;

    let mut session = ConsoleSession::connect(settings).await.unwrap();
    let result = session.commander().apply_setpoints(&[250, 250]).await;
    assert!(matches!(result, Err(mhv4_console::Error::Validation(_))));
    assert!(server.received_bodies("apply").is_empty());

    session.close().await;
}

#[tokio::test]
async fn late_command_result_is_discarded_after_teardown() {
    let server = MockControlServer::new(4);
    let settings = start_mock(server.clone()).await;

    let mut session = ConsoleSession::connect(settings).await.unwrap();
    let store = session.store().clone();
    let commander = session.commander();

    // teardown first, then let a straggler command complete
    session.close().await;
    commander.apply_on_off(&[true, true, true, true]).await.unwrap();

    // acknowledged by the server, but the fold-in was discarded
    assert_eq!(server.received_bodies("onoff").len(), 1);
    assert!(store.current().channels.iter().all(|c| !c.is_on));
}
