//! Periodic liveness sweep over the console and buzzer peers.
//!
//! Every period each peer is expected to have answered the previous `PING`
//! with a `PONG` (which sets its liveness flag). A peer whose flag is still
//! cleared when the sweep comes around is terminated.

use axum::extract::ws::Message;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::{
    dto::ws::ServerMessage,
    services::broadcast,
    state::{AppState, SharedState},
};

/// Drive the sweep on the configured period until the process exits.
pub async fn run(state: SharedState) {
    let mut interval = tokio::time::interval(state.config().heartbeat_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; peers get a full period before
    // the first liveness check.
    interval.tick().await;
    loop {
        interval.tick().await;
        sweep(&state);
    }
}

/// One pass: terminate silent peers, ping the rest.
pub fn sweep(state: &AppState) {
    let now = state.now_ms();

    if let Some(console) = state.registry().console() {
        if !console.clear_alive() {
            warn!(session_id = %console.session_id, "console missed heartbeat, disconnecting");
            let _ = console.tx.send(Message::Close(None));
            state.registry().clear_console(&console.session_id);
        } else {
            broadcast::send_to_console(state, ServerMessage::Ping { t_send: now });
        }
    }

    for peer in state.registry().buzzers_snapshot() {
        if !peer.clear_alive() {
            warn!(buzzer_id = %peer.id, "buzzer missed heartbeat, terminating");
            let _ = peer.tx.send(Message::Close(None));
            if state.registry().remove_buzzer(&peer) {
                broadcast::send_to_console(
                    state,
                    ServerMessage::BuzzerDisconnected {
                        buzzer_id: peer.id.clone(),
                        total_buzzers: state.registry().buzzer_count(),
                    },
                );
            }
        } else {
            debug!(buzzer_id = %peer.id, "pinging buzzer");
            broadcast::send_to_buzzer(state, &peer.id, ServerMessage::Ping { t_send: now });
        }
    }
}
