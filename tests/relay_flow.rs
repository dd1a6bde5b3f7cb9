//! End-to-end relay tests: a real listener, raw websocket subscribers, and
//! the client connection manager all talking to the same process.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use vertical_garden_service::api::{router, AppState};
use vertical_garden_service::client::{ClientConfig, ConnectionManager, ConnectionStatus};
use vertical_garden_service::client::state::Nutrient;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_server(pool: SqlitePool) -> (AppState, SocketAddr) {
    let state = AppState::new(pool, 64, 1000);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, addr)
}

async fn connect_subscriber(addr: SocketAddr) -> WsStream {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    // Every subscriber is greeted and given the current irrigation state
    // before any broadcast.
    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["type"], "info");
    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["type"], "irrigation_state");
    ws
}

async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("transport error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn post_reading(addr: SocketAddr, body: &Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/sensor-data"))
        .json(body)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success(), "ingest failed: {}", resp.status());
}

// ---------------------------------------------------------------------------
// Raw subscribers
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn ingested_readings_reach_all_subscribers_in_order(pool: SqlitePool) {
    let (_state, addr) = spawn_server(pool).await;

    let mut a = connect_subscriber(addr).await;
    let mut b = connect_subscriber(addr).await;
    // This one leaves before anything is posted and must not block the rest.
    let gone = connect_subscriber(addr).await;
    drop(gone);

    post_reading(addr, &json!({ "type": "moisture", "id": "A", "value": 55.2 })).await;
    post_reading(addr, &json!({ "type": "dht11", "temp": 22.1, "humidity": 65.3 })).await;

    for ws in [&mut a, &mut b] {
        let first = next_json(ws).await;
        assert_eq!(first["type"], "sensor_update");
        assert_eq!(first["payload"]["type"], "moisture");
        assert_eq!(first["payload"]["value"], 55.2);
        assert!(first["payload"]["timestamp"].is_string());

        let second = next_json(ws).await;
        assert_eq!(second["payload"]["type"], "dht11");
        assert_eq!(second["payload"]["humidity"], 65.3);
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn control_toggle_rebroadcasts_state_to_everyone(pool: SqlitePool) {
    let (_state, addr) = spawn_server(pool).await;

    let mut a = connect_subscriber(addr).await;
    let mut b = connect_subscriber(addr).await;

    a.send(Message::Text(
        r#"{"type":"control","action":"toggle_irrigation","payload":{"status":true}}"#.into(),
    ))
    .await
    .unwrap();

    for ws in [&mut a, &mut b] {
        let msg = next_json(ws).await;
        assert_eq!(msg["type"], "irrigation_state");
        assert_eq!(msg["status"], true);
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn malformed_control_errors_the_sender_only(pool: SqlitePool) {
    let (_state, addr) = spawn_server(pool).await;

    let mut offender = connect_subscriber(addr).await;
    let mut bystander = connect_subscriber(addr).await;

    offender
        .send(Message::Text("this is not json".into()))
        .await
        .unwrap();

    let reply = next_json(&mut offender).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["message"], "Invalid message format");

    // The offender's connection stays open and the error was private: the
    // bystander's next message is the toggle below, not the error.
    offender
        .send(Message::Text(
            r#"{"type":"control","action":"toggle_irrigation","payload":{"status":true}}"#.into(),
        ))
        .await
        .unwrap();
    let msg = next_json(&mut bystander).await;
    assert_eq!(msg["type"], "irrigation_state");
}

#[sqlx::test(migrations = "./migrations")]
async fn late_subscriber_gets_the_current_irrigation_state(pool: SqlitePool) {
    let (_state, addr) = spawn_server(pool).await;

    let mut a = connect_subscriber(addr).await;
    a.send(Message::Text(
        r#"{"type":"control","action":"toggle_irrigation","payload":{"status":true}}"#.into(),
    ))
    .await
    .unwrap();
    let msg = next_json(&mut a).await;
    assert_eq!(msg["status"], true);

    // A subscriber connecting after the toggle sees the toggled state in its
    // greeting sequence, not the boot default.
    let (mut late, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let welcome = next_json(&mut late).await;
    assert_eq!(welcome["type"], "info");
    let snapshot = next_json(&mut late).await;
    assert_eq!(snapshot["type"], "irrigation_state");
    assert_eq!(snapshot["status"], true);
}

// ---------------------------------------------------------------------------
// Connection manager
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn manager_tracks_readings_and_advisories(pool: SqlitePool) {
    let (_state, addr) = spawn_server(pool).await;

    let handle = ConnectionManager::spawn(ClientConfig::new(format!("ws://{addr}/ws")));
    let mut status = handle.status_changes();
    timeout(WAIT, status.wait_for(|s| *s == ConnectionStatus::Connected))
        .await
        .expect("manager never connected")
        .unwrap();

    // Nitrogen below the default advisory threshold of 15.
    post_reading(addr, &json!({ "type": "npk", "n": 10, "p": 20, "k": 20 })).await;

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let state = handle.store().snapshot().await;
        if state.sensor_data.npk.nitrogen == 10.0 {
            assert_eq!(state.sensor_data.npk.phosphorus, 20.0);
            assert!(state.last_sync.is_some());
            assert_eq!(state.advice_popup, Some(Nutrient::Nitrogen));
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "reading never reached the client store"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Outbound command round-trip: the server confirms by re-broadcast.
    handle.send_irrigation(true);
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if handle.store().snapshot().await.irrigation {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "irrigation confirmation never arrived"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    handle.shutdown().await;
}

#[sqlx::test(migrations = "./migrations")]
async fn manager_reconnects_after_the_server_comes_back(pool: SqlitePool) {
    // Reserve an address, then release it so the first attempt fails.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = ClientConfig::new(format!("ws://{addr}/ws"));
    config.reconnect_delay = Duration::from_millis(100);
    let handle = ConnectionManager::spawn(config);

    // Let at least one attempt fail before the server exists.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_ne!(handle.status(), ConnectionStatus::Connected);

    let state = AppState::new(pool, 64, 1000);
    let listener = TcpListener::bind(addr).await.unwrap();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut status = handle.status_changes();
    timeout(WAIT, status.wait_for(|s| *s == ConnectionStatus::Connected))
        .await
        .expect("manager never recovered")
        .unwrap();

    handle.shutdown().await;
}
