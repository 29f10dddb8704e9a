//! End-to-end tests using real WebSocket clients.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use transit_server::{start, ServerConfig, ServerHandle};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn config_in(dir: &tempfile::TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        data_file: dir.path().join("pickupRequests.json"),
        public_dir: dir.path().join("public"),
        ..Default::default()
    }
}

async fn boot(dir: &tempfile::TempDir) -> ServerHandle {
    start(config_in(dir)).await.unwrap()
}

fn ws_url(handle: &ServerHandle) -> String {
    format!("ws://127.0.0.1:{}/ws", handle.port)
}

/// Connect and consume the `initialData` + `pickupRequestsUpdated` greeting.
async fn connect(handle: &ServerHandle) -> (WsStream, Value, Value) {
    let (mut ws, _) = connect_async(ws_url(handle)).await.unwrap();
    let initial = read_json(&mut ws).await;
    let pickups = read_json(&mut ws).await;
    (ws, initial, pickups)
}

/// Read the next text message as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Assert that no text message arrives within a short window.
async fn expect_quiet(ws: &mut WsStream) {
    loop {
        match timeout(QUIET, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(text)))) => {
                let text: &str = &text;
                panic!("unexpected message: {text}");
            }
            Ok(Some(Ok(_))) => continue,
            Ok(other) => panic!("stream ended: {other:?}"),
        }
    }
}

async fn emit(ws: &mut WsStream, event: &str, data: Value) {
    let frame = json!({"event": event, "data": data});
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Wait until the pickup file holds `expected`. Saves land after the broadcast.
async fn wait_saved(dir: &tempfile::TempDir, expected: Value) {
    let path = dir.path().join("pickupRequests.json");
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let current = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str::<Value>(&content).ok());
        if current.as_ref() == Some(&expected) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "pickup file never reached {expected}, last saw {current:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn e2e_new_client_gets_full_state_and_others_stay_quiet() {
    let dir = tempfile::tempdir().unwrap();
    let handle = boot(&dir).await;
    let (mut first, _, _) = connect(&handle).await;

    let (_second, initial, pickups) = connect(&handle).await;

    assert_eq!(initial["event"], "initialData");
    assert_eq!(initial["data"]["routes"][0]["name"], "Route A");
    assert_eq!(initial["data"]["schedules"][1]["driver"], "Driver B");
    assert_eq!(initial["data"]["busLocations"][1]["location"], "ECB Chottor");
    assert_eq!(pickups, json!({"event": "pickupRequestsUpdated", "data": []}));
    expect_quiet(&mut first).await;
}

#[tokio::test]
async fn e2e_pickup_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let handle = boot(&dir).await;
    let (mut rider, _, _) = connect(&handle).await;
    let (mut dispatcher, _, _) = connect(&handle).await;

    emit(&mut rider, "pickupRequest", json!({"name": "Alice"})).await;
    for ws in [&mut rider, &mut dispatcher] {
        let msg = read_json(ws).await;
        assert_eq!(msg["event"], "pickupRequestsUpdated");
        assert_eq!(msg["data"], json!([{"id": 1, "name": "Alice"}]));
    }
    wait_saved(&dir, json!([{"id": 1, "name": "Alice"}])).await;

    emit(&mut rider, "pickupRequest", json!({"name": "Bob"})).await;
    let msg = read_json(&mut dispatcher).await;
    assert_eq!(msg["data"][1]["id"], 2);
    let _ = read_json(&mut rider).await;

    emit(&mut dispatcher, "deletePickupRequest", json!(1)).await;
    for ws in [&mut rider, &mut dispatcher] {
        let msg = read_json(ws).await;
        assert_eq!(msg["data"], json!([{"id": 2, "name": "Bob"}]));
    }
    wait_saved(&dir, json!([{"id": 2, "name": "Bob"}])).await;
}

#[tokio::test]
async fn e2e_restart_recovers_pickups_and_counter() {
    let dir = tempfile::tempdir().unwrap();
    {
        let handle = boot(&dir).await;
        let (mut ws, _, _) = connect(&handle).await;
        for name in ["Alice", "Bob"] {
            emit(&mut ws, "pickupRequest", json!({"name": name})).await;
            let _ = read_json(&mut ws).await;
        }
        wait_saved(&dir, json!([{"id": 1, "name": "Alice"}, {"id": 2, "name": "Bob"}])).await;
    }

    let handle = boot(&dir).await;
    let (mut ws, _, pickups) = connect(&handle).await;
    assert_eq!(
        pickups["data"],
        json!([{"id": 1, "name": "Alice"}, {"id": 2, "name": "Bob"}])
    );

    emit(&mut ws, "pickupRequest", json!({"name": "Carol"})).await;
    let msg = read_json(&mut ws).await;
    assert_eq!(msg["data"][2], json!({"id": 3, "name": "Carol"}));
}

#[tokio::test]
async fn e2e_bus_location_update_reaches_everyone() {
    let dir = tempfile::tempdir().unwrap();
    let handle = boot(&dir).await;
    let (mut driver, _, _) = connect(&handle).await;
    let (mut viewer, _, _) = connect(&handle).await;

    emit(
        &mut driver,
        "updateBusLocation",
        json!({"busId": 1, "location": "Kuril", "availableSeats": 10, "status": "Delayed"}),
    )
    .await;

    for ws in [&mut driver, &mut viewer] {
        let msg = read_json(ws).await;
        assert_eq!(msg["event"], "busLocationUpdated");
        assert_eq!(msg["data"]["location"], "Kuril");
    }

    let url = format!("http://127.0.0.1:{}/api/transport", handle.port);
    let state: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(state["busLocations"][0]["location"], "Kuril");
    assert_eq!(state["busLocations"][0]["busNumber"], "Bus 1");
    assert_eq!(state["schedules"][0]["availableSeats"], 10);
    assert_eq!(state["schedules"][0]["status"], "Delayed");
}

#[tokio::test]
async fn e2e_loose_schedule_batch_is_echoed_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let handle = boot(&dir).await;
    let (mut editor, _, _) = connect(&handle).await;
    let (mut viewer, _, _) = connect(&handle).await;
    let schedules = json!([{"id": 1, "availableSeats": "25", "driver": null}]);

    emit(&mut editor, "updateSchedules", schedules.clone()).await;

    let msg = read_json(&mut viewer).await;
    assert_eq!(msg, json!({"event": "schedulesUpdated", "data": schedules}));
    let _ = read_json(&mut editor).await;

    let url = format!("http://127.0.0.1:{}/api/transport", handle.port);
    let state: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(state["schedules"], schedules);
}

#[tokio::test]
async fn e2e_get_pickup_requests_is_private() {
    let dir = tempfile::tempdir().unwrap();
    let handle = boot(&dir).await;
    let (mut asker, _, _) = connect(&handle).await;
    let (mut other, _, _) = connect(&handle).await;

    asker
        .send(Message::text(r#"{"event":"getPickupRequests"}"#.to_string()))
        .await
        .unwrap();

    let msg = read_json(&mut asker).await;
    assert_eq!(msg, json!({"event": "pickupRequestsUpdated", "data": []}));
    expect_quiet(&mut other).await;
}

#[tokio::test]
async fn e2e_bad_frames_do_not_disturb_others() {
    let dir = tempfile::tempdir().unwrap();
    let handle = boot(&dir).await;
    let (mut noisy, _, _) = connect(&handle).await;
    let (mut viewer, _, _) = connect(&handle).await;

    noisy.send(Message::text("{{{".to_string())).await.unwrap();
    emit(&mut noisy, "updateRoutes", json!({"not": "a list"})).await;
    emit(&mut noisy, "updateRoutes", json!([])).await;

    let msg = read_json(&mut viewer).await;
    assert_eq!(msg, json!({"event": "routesUpdated", "data": []}));
}

#[tokio::test]
async fn e2e_disconnect_removes_client() {
    let dir = tempfile::tempdir().unwrap();
    let handle = boot(&dir).await;
    let (mut ws, _, _) = connect(&handle).await;
    assert_eq!(handle.state.clients.count(), 1);

    ws.close(None).await.unwrap();

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while handle.state.clients.count() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "client never removed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
