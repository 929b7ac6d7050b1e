use crate::{dto::health::HealthResponse, state::SharedState};

/// Report the serving status together with the current peer counts.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(
        state.registry().buzzer_count(),
        state.registry().console().is_some(),
    )
}
