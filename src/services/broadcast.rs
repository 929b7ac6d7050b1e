//! Fan-out helpers: send-to-console, send-to-one-buzzer, and
//! broadcast-to-all-buzzers.
//!
//! Text frames are enveloped JSON with `sender: "SERVER"` and the current
//! server time. Sends to closed or missing transports are dropped at warn
//! level; binary frames are used for jingle chunks only.

use axum::extract::ws::Message;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    dto::ws::{Envelope, ServerMessage},
    state::AppState,
};

fn encode(state: &AppState, message: ServerMessage) -> Option<String> {
    match serde_json::to_string(&Envelope::server(message, state.now_ms())) {
        Ok(text) => Some(text),
        Err(err) => {
            warn!(error = %err, "failed to serialize server frame");
            None
        }
    }
}

/// Envelope a message and push it onto an arbitrary peer channel.
///
/// Used directly during identification, before the peer is registered.
pub fn send_raw(
    state: &AppState,
    tx: &mpsc::UnboundedSender<Message>,
    message: ServerMessage,
) -> bool {
    let Some(text) = encode(state, message) else {
        return false;
    };
    tx.send(Message::Text(text.into())).is_ok()
}

/// Push a message to the control console, if one is attached.
pub fn send_to_console(state: &AppState, message: ServerMessage) {
    let Some(console) = state.registry().console() else {
        warn!("no console attached, dropping frame");
        return;
    };
    if !send_raw(state, &console.tx, message) {
        warn!("console channel closed, dropping frame");
    }
}

/// Push a message to one buzzer. Returns false when the buzzer is missing
/// or its transport is closed.
pub fn send_to_buzzer(state: &AppState, buzzer_id: &str, message: ServerMessage) -> bool {
    let Some(peer) = state.registry().buzzer(buzzer_id) else {
        warn!(buzzer_id, "buzzer not connected, dropping frame");
        return false;
    };
    let sent = send_raw(state, &peer.tx, message);
    if !sent {
        warn!(buzzer_id, "buzzer channel closed, dropping frame");
    }
    sent
}

/// Push a message to every registered buzzer, returning how many accepted it.
pub fn broadcast_to_buzzers(state: &AppState, message: ServerMessage) -> usize {
    let Some(text) = encode(state, message) else {
        return 0;
    };
    let mut sent = 0;
    for peer in state.registry().buzzers_snapshot() {
        if peer.tx.send(Message::Text(text.clone().into())).is_ok() {
            sent += 1;
        } else {
            warn!(buzzer_id = %peer.id, "buzzer channel closed, dropping broadcast");
        }
    }
    sent
}

/// Push one binary jingle frame to a buzzer.
pub fn send_binary_to_buzzer(state: &AppState, buzzer_id: &str, frame: Bytes) -> bool {
    let Some(peer) = state.registry().buzzer(buzzer_id) else {
        return false;
    };
    peer.tx.send(Message::Binary(frame)).is_ok()
}
