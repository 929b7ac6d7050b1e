use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status (always "ok" once the process is serving).
    pub status: String,
    /// Number of buzzer devices currently registered.
    pub connected_buzzers: usize,
    /// Whether a control console is attached.
    pub console_connected: bool,
}

impl HealthResponse {
    /// Build a healthy response carrying the current peer counts.
    pub fn ok(connected_buzzers: usize, console_connected: bool) -> Self {
        Self {
            status: "ok".to_string(),
            connected_buzzers,
            console_connected,
        }
    }
}
