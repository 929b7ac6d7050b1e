//! WebSocket connection lifecycle: identification, per-class message
//! routing, and teardown.
//!
//! A transport moves through `AwaitingIdentification` into either the
//! console or the buzzer role. Before identification only time-sync, ping,
//! and the two identification frames are honoured; everything else is
//! logged and dropped.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitStream};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        validation::validate_buzzer_id,
        ws::{ClientMessage, Envelope, ServerConfigInfo, ServerMessage},
    },
    error::ServiceError,
    services::{broadcast, buzz_service, game_service, jingle_service},
    state::{
        SharedState,
        registry::{
            BuzzerPeer, CLOSE_ADMIN_DISCONNECT, CLOSE_DUPLICATE_BUZZER,
            CLOSE_IDENTIFICATION_TIMEOUT, ConsolePeer, RegisterOutcome,
        },
    },
};

/// Resolved identity of a transport after the identification phase.
enum Identified {
    Console(Arc<ConsolePeer>),
    Buzzer(Arc<BuzzerPeer>),
    /// The transport closed, errored, or timed out before identifying.
    None,
}

/// Handle the full lifecycle for one WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    match identify(&state, &mut receiver, &outbound_tx).await {
        Identified::Console(console) => {
            info!(session_id = %console.session_id, "console connected");
            console_loop(&state, &mut receiver, &console).await;
            state.registry().clear_console(&console.session_id);
            info!(session_id = %console.session_id, "console disconnected");
        }
        Identified::Buzzer(peer) => {
            info!(buzzer_id = %peer.id, player_number = peer.player_number, "buzzer connected");
            buzzer_loop(&state, &mut receiver, &peer).await;
            if state.registry().remove_buzzer(&peer) {
                broadcast::send_to_console(
                    &state,
                    ServerMessage::BuzzerDisconnected {
                        buzzer_id: peer.id.clone(),
                        total_buzzers: state.registry().buzzer_count(),
                    },
                );
            }
            info!(buzzer_id = %peer.id, "buzzer disconnected");
        }
        Identified::None => {}
    }

    finalize(writer_task, outbound_tx).await;
}

/// Run the `AwaitingIdentification` state until the peer identifies, the
/// transport dies, or the 30 s deadline passes (close 4001).
async fn identify(
    state: &SharedState,
    receiver: &mut SplitStream<WebSocket>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Identified {
    let deadline = Instant::now() + state.config().identification_timeout;

    loop {
        let frame = match tokio::time::timeout_at(deadline, receiver.next()).await {
            Err(_) => {
                warn!("identification timed out");
                let _ = outbound_tx.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_IDENTIFICATION_TIMEOUT,
                    reason: "Identification timeout".into(),
                })));
                return Identified::None;
            }
            Ok(None) => return Identified::None,
            Ok(Some(Err(err))) => {
                warn!(error = %err, "websocket receive error before identification");
                return Identified::None;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                let envelope = match Envelope::from_json_str(&text) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!(error = %err, "failed to parse frame before identification");
                        continue;
                    }
                };
                match envelope.message {
                    ClientMessage::TimeSyncReq { t1 } => {
                        let now = state.now_ms();
                        broadcast::send_raw(
                            state,
                            outbound_tx,
                            ServerMessage::TimeSyncRes {
                                t1,
                                t2: now,
                                t3: now,
                            },
                        );
                    }
                    ClientMessage::Ping { t_send } => {
                        broadcast::send_raw(
                            state,
                            outbound_tx,
                            ServerMessage::Pong {
                                t_send,
                                t_receive: state.now_ms(),
                            },
                        );
                    }
                    ClientMessage::AngularConnect => {
                        return identify_console(state, outbound_tx);
                    }
                    ClientMessage::BuzzerRegister {
                        buzzer_id,
                        mac_address,
                        name,
                    } => {
                        return identify_buzzer(state, outbound_tx, buzzer_id, mac_address, name);
                    }
                    other => {
                        warn!(message = ?other, "dropping message before identification");
                    }
                }
            }
            Message::Ping(payload) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Message::Close(_) => return Identified::None,
            _ => {}
        }
    }
}

/// Install the transport as the console, displacing any previous one.
fn identify_console(
    state: &SharedState,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Identified {
    let console = ConsolePeer::new(Uuid::new_v4().to_string(), outbound_tx.clone());
    if let Some(previous) = state.registry().set_console(console.clone()) {
        info!(session_id = %previous.session_id, "replacing previous console registration");
        let _ = previous.tx.send(Message::Close(None));
    }

    broadcast::send_raw(
        state,
        outbound_tx,
        ServerMessage::Connected {
            session_id: console.session_id.clone(),
            server_time: state.now_ms(),
            config: ServerConfigInfo {
                max_buzzers: state.config().max_buzzers,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        },
    );
    broadcast::send_raw(state, outbound_tx, game_service::buzzer_list_message(state));

    Identified::Console(console)
}

/// Register the transport as a buzzer, enforcing ID shape and uniqueness.
fn identify_buzzer(
    state: &SharedState,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    buzzer_id: String,
    mac_address: Option<String>,
    name: Option<String>,
) -> Identified {
    if let Err(err) = validate_buzzer_id(&buzzer_id) {
        warn!(buzzer_id, error = %err, "rejecting malformed buzzer ID");
        broadcast::send_raw(
            state,
            outbound_tx,
            ServerMessage::ConnectionRejected {
                reason: "malformed buzzer ID".to_string(),
            },
        );
        let _ = outbound_tx.send(Message::Close(None));
        return Identified::None;
    }

    match state.registry().register_buzzer(
        buzzer_id.clone(),
        mac_address,
        name,
        outbound_tx.clone(),
        state.now_ms(),
    ) {
        RegisterOutcome::Registered(peer) => {
            broadcast::send_raw(
                state,
                outbound_tx,
                ServerMessage::ConnectionAck {
                    buzzer_id: peer.id.clone(),
                    player_number: peer.player_number,
                    server_time: state.now_ms(),
                },
            );
            broadcast::send_to_console(
                state,
                ServerMessage::BuzzerConnected {
                    buzzer: peer.info(),
                    total_buzzers: state.registry().buzzer_count(),
                },
            );
            Identified::Buzzer(peer)
        }
        RegisterOutcome::Duplicate => {
            warn!(buzzer_id, "duplicate buzzer registration rejected");
            broadcast::send_raw(
                state,
                outbound_tx,
                ServerMessage::ConnectionRejected {
                    reason: format!("buzzer ID `{buzzer_id}` already registered"),
                },
            );
            let _ = outbound_tx.send(Message::Close(Some(CloseFrame {
                code: CLOSE_DUPLICATE_BUZZER,
                reason: "Duplicate buzzer ID".into(),
            })));
            Identified::None
        }
        RegisterOutcome::Full => {
            broadcast::send_raw(
                state,
                outbound_tx,
                ServerMessage::ConnectionRejected {
                    reason: "server is at buzzer capacity".to_string(),
                },
            );
            let _ = outbound_tx.send(Message::Close(None));
            Identified::None
        }
    }
}

/// Receive loop for an identified console.
async fn console_loop(
    state: &SharedState,
    receiver: &mut SplitStream<WebSocket>,
    console: &Arc<ConsolePeer>,
) {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match Envelope::from_json_str(&text) {
                Ok(envelope) => dispatch_console(state, console, envelope.message).await,
                Err(err) => warn!(error = %err, "failed to parse console frame"),
            },
            Ok(Message::Ping(payload)) => {
                console.mark_alive();
                let _ = console.tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "console websocket error");
                break;
            }
        }
    }
}

/// Report a failed console operation as an `ERROR` frame.
fn report_service_error(state: &SharedState, err: &ServiceError) {
    warn!(error = %err, "operation failed");
    broadcast::send_to_console(
        state,
        ServerMessage::Error {
            message: err.to_string(),
        },
    );
}

/// Dispatch one parsed console message.
async fn dispatch_console(
    state: &SharedState,
    console: &Arc<ConsolePeer>,
    message: ClientMessage,
) {
    match message {
        ClientMessage::RequestBuzzerList => {
            broadcast::send_to_console(state, game_service::buzzer_list_message(state));
        }
        ClientMessage::PlayerRename {
            buzzer_id,
            new_name,
        } => {
            if let Err(err) = game_service::rename_player(state, &buzzer_id, &new_name).await {
                report_service_error(state, &err);
            }
        }
        ClientMessage::QuestionSend {
            game_id,
            question_id,
        } => {
            if let Err(err) = game_service::send_question(state, &game_id, question_id).await {
                report_service_error(state, &err);
            }
        }
        ClientMessage::GameStart {
            game_id,
            name,
            total_questions,
        } => {
            game_service::start_game(state, game_id, name, total_questions).await;
        }
        ClientMessage::BuzzCorrect {
            game_id,
            question_id,
            buzzer_id,
        } => {
            if let Err(err) =
                buzz_service::validate_correct(state, &game_id, question_id, &buzzer_id).await
            {
                report_service_error(state, &err);
            }
        }
        ClientMessage::BuzzReopen {
            game_id,
            question_id,
            buzzer_id,
        } => {
            if let Err(err) = buzz_service::reopen(state, &game_id, question_id, &buzzer_id).await
            {
                report_service_error(state, &err);
            }
        }
        ClientMessage::BuzzerDisconnect { buzzer_id } => {
            admin_disconnect(state, &buzzer_id);
        }
        ClientMessage::JinglePlay {
            buzzer_id,
            jingle_id,
        } => {
            // Streaming runs on its own task so console routing never waits
            // on file reads.
            tokio::spawn(jingle_service::play(state.clone(), buzzer_id, jingle_id));
        }
        ClientMessage::TimeSyncReq { t1 } => {
            let now = state.now_ms();
            broadcast::send_to_console(
                state,
                ServerMessage::TimeSyncRes {
                    t1,
                    t2: now,
                    t3: now,
                },
            );
        }
        ClientMessage::Ping { t_send } => {
            console.mark_alive();
            broadcast::send_to_console(
                state,
                ServerMessage::Pong {
                    t_send,
                    t_receive: state.now_ms(),
                },
            );
        }
        ClientMessage::Pong { .. } => {
            console.mark_alive();
        }
        other => {
            warn!(message = ?other, "unhandled console message dropped");
        }
    }
}

/// Receive loop for an identified buzzer.
async fn buzzer_loop(
    state: &SharedState,
    receiver: &mut SplitStream<WebSocket>,
    peer: &Arc<BuzzerPeer>,
) {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match Envelope::from_json_str(&text) {
                Ok(envelope) => dispatch_buzzer(state, peer, envelope.message).await,
                Err(err) => {
                    warn!(buzzer_id = %peer.id, error = %err, "failed to parse buzzer frame");
                }
            },
            Ok(Message::Ping(payload)) => {
                peer.mark_alive(state.now_ms());
                let _ = peer.tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(buzzer_id = %peer.id, error = %err, "buzzer websocket error");
                break;
            }
        }
    }
}

/// Dispatch one parsed buzzer message.
async fn dispatch_buzzer(state: &SharedState, peer: &Arc<BuzzerPeer>, message: ClientMessage) {
    match message {
        ClientMessage::AnswerMcq {
            game_id,
            question_id,
            answer,
            timestamps,
        } => {
            if let Err(err) = game_service::record_answer(
                state,
                &peer.id,
                &game_id,
                question_id,
                answer,
                timestamps,
            )
            .await
            {
                report_service_error(state, &err);
            }
        }
        ClientMessage::AnswerBuzzer {
            game_id,
            question_id,
            timestamps,
        } => {
            if let Err(err) =
                buzz_service::record_buzz(state, &peer.id, &game_id, question_id, timestamps).await
            {
                report_service_error(state, &err);
            }
        }
        ClientMessage::StatusUpdate {
            battery,
            wifi_rssi,
            free_heap,
        } => {
            peer.update_status(battery, wifi_rssi, free_heap);
            broadcast::send_to_console(
                state,
                ServerMessage::BuzzerStatusUpdate {
                    buzzer_id: peer.id.clone(),
                    battery,
                    wifi_rssi,
                    free_heap,
                },
            );
        }
        ClientMessage::TimeSyncReq { t1 } => {
            let now = state.now_ms();
            broadcast::send_to_buzzer(
                state,
                &peer.id,
                ServerMessage::TimeSyncRes {
                    t1,
                    t2: now,
                    t3: now,
                },
            );
        }
        ClientMessage::Ping { t_send } => {
            peer.mark_alive(state.now_ms());
            broadcast::send_to_buzzer(
                state,
                &peer.id,
                ServerMessage::Pong {
                    t_send,
                    t_receive: state.now_ms(),
                },
            );
        }
        ClientMessage::Pong { t_send, .. } => {
            let now = state.now_ms();
            peer.mark_alive(now);
            if let Some(t_send) = t_send {
                let round_trip = now.saturating_sub(t_send);
                peer.update_latency((round_trip / 2) as u32);
            }
        }
        ClientMessage::BuzzerRegister { .. } => {
            debug!(buzzer_id = %peer.id, "ignoring duplicate identification message");
        }
        other => {
            warn!(buzzer_id = %peer.id, message = ?other, "unhandled buzzer message dropped");
        }
    }
}

/// Force-disconnect a buzzer at the console's request (close 4003).
fn admin_disconnect(state: &SharedState, buzzer_id: &str) {
    let Some(peer) = state.registry().remove_buzzer_by_id(buzzer_id) else {
        broadcast::send_to_console(
            state,
            ServerMessage::Error {
                message: format!("buzzer `{buzzer_id}` not connected"),
            },
        );
        return;
    };
    info!(buzzer_id, "buzzer disconnected by administrator");
    peer.close(CLOSE_ADMIN_DISCONNECT, "Disconnected by administrator");
    broadcast::send_to_console(
        state,
        ServerMessage::BuzzerDisconnected {
            buzzer_id: buzzer_id.to_string(),
            total_buzzers: state.registry().buzzer_count(),
        },
    );
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
