//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest buzzer identifier accepted at registration.
const BUZZER_ID_MAX_LEN: usize = 64;

/// Validates that a buzzer ID is usable as a registry key: non-empty,
/// at most 64 characters, printable ASCII with no whitespace.
///
/// IDs are otherwise opaque; firmware is free to send MAC-derived strings,
/// serial numbers, or anything else stable.
pub fn validate_buzzer_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        let mut err = ValidationError::new("buzzer_id_empty");
        err.message = Some("Buzzer ID must not be empty".into());
        return Err(err);
    }

    if id.len() > BUZZER_ID_MAX_LEN {
        let mut err = ValidationError::new("buzzer_id_length");
        err.message = Some(
            format!(
                "Buzzer ID must be at most {BUZZER_ID_MAX_LEN} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id.chars().all(|c| c.is_ascii_graphic()) {
        let mut err = ValidationError::new("buzzer_id_format");
        err.message =
            Some("Buzzer ID must contain only printable ASCII without whitespace".into());
        return Err(err);
    }

    Ok(())
}
