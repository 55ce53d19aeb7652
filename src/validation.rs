//! Input Validation Module
//!
//! Centralized validation for enrollment and verification inputs.
//! Rejects malformed identities and nonsensical thresholds before any audio work.

use thiserror::Error;

/// Longest identity accepted, in bytes
pub const MAX_IDENTITY_LEN: usize = 256;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Value too long: max {max}, got {actual}")]
    ValueTooLong { max: usize, actual: usize },
}

/// Validate identity key (non-empty, max 256 bytes, no control characters)
pub fn validate_identity(uid: &str) -> Result<&str, ValidationError> {
    if uid.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "Identity cannot be empty".to_string(),
        ));
    }

    if uid.len() > MAX_IDENTITY_LEN {
        return Err(ValidationError::ValueTooLong {
            max: MAX_IDENTITY_LEN,
            actual: uid.len(),
        });
    }

    if uid.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat(
            "Identity contains invalid control characters".to_string(),
        ));
    }

    Ok(uid)
}

/// Validate match threshold (any finite value; scores live in [-1, 1])
pub fn validate_threshold(threshold: f32) -> Result<f32, ValidationError> {
    if !threshold.is_finite() {
        return Err(ValidationError::InvalidRange(format!(
            "Threshold must be a finite number, got {}",
            threshold
        )));
    }
    Ok(threshold)
}
