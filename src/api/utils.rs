//! Pure, stateless helper functions for HTTP request processing. Kept
//! separate from `services.rs` so they're unit-testable without the axum
//! extractor machinery in the way.

use crate::api::error::ApiError;

/// Validates that body size does not exceed the upload limit configured
/// as `server.api.max_payload_bytes` (spec §6.5 ambient transport limit).
pub fn validate_body_size(data: &[u8], max_size: u64) -> Result<(), ApiError> {
    if data.len() as u64 > max_size {
        return Err(ApiError::InvalidRequest(format!(
            "payload of {} bytes exceeds limit of {} bytes",
            data.len(),
            max_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_body_size_ok() {
        let data = vec![0u8; 1000];
        assert!(validate_body_size(&data, 1000).is_ok());
        assert!(validate_body_size(&data, 2000).is_ok());
        assert!(validate_body_size(&[], 100).is_ok());
    }

    #[test]
    fn validate_body_size_too_large() {
        let data = vec![0u8; 1000];
        let result = validate_body_size(&data, 999);
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }
}
