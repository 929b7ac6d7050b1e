//! Shared helpers for socket-level integration tests.

use std::{path::Path, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use buzzcontrol_back::{
    clock::SystemClock,
    config::AppConfig,
    dao::catalog::{FileCatalog, JsonlResultWriter},
    routes,
    state::{AppState, SharedState},
};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a test waits for one expected frame before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Config tuned for tests: short identification deadline, tiny catalog dir.
pub fn test_config(data_dir: &Path) -> AppConfig {
    AppConfig {
        max_buzzers: 10,
        data_dir: data_dir.to_path_buf(),
        jingle_root: data_dir.join("jingles"),
        results_path: data_dir.join("results.jsonl"),
        identification_timeout: Duration::from_millis(400),
        heartbeat_period: Duration::from_secs(30),
        buzz_window: Duration::from_millis(200),
    }
}

/// Write a small catalog: one game with an MCQ and a rapidity question.
pub fn write_catalog(data_dir: &Path) {
    std::fs::write(
        data_dir.join("questions.json"),
        json!({
            "questions": [
                {
                    "id": 42,
                    "text": "First to buzz",
                    "type": "BUZZER",
                    "points": 10
                },
                {
                    "id": 43,
                    "text": "Capital of France?",
                    "type": "MCQ",
                    "points": 20,
                    "answers": "[\"Paris\",\"Lyon\"]",
                    "correct_answer": "Paris"
                }
            ],
            "games": {"g1": [42, 43]}
        })
        .to_string(),
    )
    .unwrap();
}

/// Boot the full router on an ephemeral port.
pub async fn start_test_server(config: AppConfig) -> (u16, SharedState) {
    let catalog = FileCatalog::load(&config.data_dir).expect("catalog must load");
    let results = JsonlResultWriter::new(config.results_path.clone());
    let state = AppState::new(
        config,
        catalog.clone(),
        catalog,
        results,
        Arc::new(SystemClock),
    );

    let app = routes::router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    (port, state)
}

/// Open a WebSocket connection to the realtime endpoint.
pub async fn connect_ws(port: u16) -> WsClient {
    let (client, _response) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .expect("websocket connect failed");
    client
}

/// Send one enveloped text frame as a buzzer device.
pub async fn send_frame(client: &mut WsClient, kind: &str, payload: Value) {
    send_frame_as(client, kind, "BUZZER", payload).await;
}

/// Send one enveloped text frame as the console.
pub async fn send_console_frame(client: &mut WsClient, kind: &str, payload: Value) {
    send_frame_as(client, kind, "ANGULAR", payload).await;
}

async fn send_frame_as(client: &mut WsClient, kind: &str, sender: &str, payload: Value) {
    let frame = json!({
        "type": kind,
        "timestamp": 0,
        "sender": sender,
        "payload": payload,
    });
    client
        .send(Message::Text(frame.to_string().into()))
        .await
        .expect("websocket send failed");
}

/// Send an enveloped frame without a payload object.
pub async fn send_bare_frame(client: &mut WsClient, kind: &str, sender: &str) {
    let frame = json!({
        "type": kind,
        "timestamp": 0,
        "sender": sender,
    });
    client
        .send(Message::Text(frame.to_string().into()))
        .await
        .expect("websocket send failed");
}

/// Receive text frames until one of the given type arrives.
pub async fn recv_frame_of_type(client: &mut WsClient, kind: &str) -> Value {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for `{kind}`"))
            .unwrap_or_else(|| panic!("connection closed waiting for `{kind}`"))
            .expect("websocket receive failed");
        if let Message::Text(text) = frame {
            let value: Value = serde_json::from_str(&text).expect("server frame must be JSON");
            if value["type"] == kind {
                return value;
            }
        }
    }
}

/// Receive frames until the server closes, returning the close code if any.
pub async fn recv_close_code(client: &mut WsClient) -> Option<u16> {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for close");
        match frame {
            Some(Ok(Message::Close(frame))) => {
                return frame.map(|frame| u16::from(frame.code));
            }
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

/// Register a buzzer and wait for its acknowledgement.
pub async fn register_buzzer(port: u16, buzzer_id: &str) -> (WsClient, Value) {
    let mut client = connect_ws(port).await;
    send_frame(
        &mut client,
        "BUZZER_REGISTER",
        json!({"buzzerID": buzzer_id, "macAddress": "a4:cf:12:9f:00:01"}),
    )
    .await;
    let ack = recv_frame_of_type(&mut client, "CONNECTION_ACK").await;
    (client, ack)
}

/// Connect the console and wait for the handshake.
pub async fn connect_console(port: u16) -> (WsClient, Value) {
    let mut client = connect_ws(port).await;
    send_bare_frame(&mut client, "ANGULAR_CONNECT", "ANGULAR").await;
    let connected = recv_frame_of_type(&mut client, "CONNECTED").await;
    (client, connected)
}
