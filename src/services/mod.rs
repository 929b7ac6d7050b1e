/// Fan-out helpers for enveloped server frames.
pub mod broadcast;
/// Buzz arbitration: the simultaneity window and winner election.
pub mod buzz_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Answer handling, question dispatch, and game bootstrap.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Periodic liveness sweep over connected peers.
pub mod heartbeat;
/// Chunked jingle streaming to individual buzzers.
pub mod jingle_service;
/// WebSocket connection lifecycle and message routing.
pub mod websocket_service;
