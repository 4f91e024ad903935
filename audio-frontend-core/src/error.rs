//! Error type for the front-end engine.

use thiserror::Error;

/// Status code for a successful call, matching the numeric codes of the C-style API.
pub const STATUS_OK: i32 = 0;

/// Errors reported by sizing, initialisation and per-hop processing.
///
/// None of these are retried internally. A failed call leaves the engine state exactly as
/// it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeError {
    /// A required buffer was empty or missing.
    #[error("Missing or empty argument: {0}")]
    NullArgument(&'static str),

    /// Configuration is invalid (frame/hop relationship, channel count, tuning range).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The caller's scratch arena is smaller than the planner's requirement.
    #[error("Scratch buffer too small: {required} bytes required, {provided} provided")]
    ScratchTooSmall { required: usize, provided: usize },

    /// The engine is not in the ready state (freed, or never initialised).
    #[error("Engine is not initialised")]
    NotInitialised,

    /// No spectral frame has been analysed since init or reset.
    #[error("No spectral frame available")]
    NoFrame,
}

impl FeError {
    /// Numeric status code of this error.
    pub fn status_code(&self) -> i32 {
        match self {
            FeError::NullArgument(_) => -1,
            FeError::InvalidConfig(_) => -2,
            FeError::ScratchTooSmall { .. } => -3,
            FeError::NotInitialised | FeError::NoFrame => -4,
        }
    }
}

/// Collapse a result into the numeric status code convention.
pub fn status_of<T>(result: &Result<T, FeError>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(e) => e.status_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct() {
        let codes = [
            FeError::NullArgument("input").status_code(),
            FeError::InvalidConfig(String::new()).status_code(),
            FeError::ScratchTooSmall { required: 8, provided: 4 }.status_code(),
            FeError::NotInitialised.status_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert!(*a < 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(FeError::NoFrame.status_code(), FeError::NotInitialised.status_code());
    }

    #[test]
    fn test_status_of() {
        assert_eq!(status_of::<()>(&Ok(())), STATUS_OK);
        assert_eq!(status_of::<()>(&Err(FeError::NotInitialised)), -4);
    }

    #[test]
    fn test_display() {
        let err = FeError::ScratchTooSmall { required: 4096, provided: 1024 };
        assert_eq!(
            err.to_string(),
            "Scratch buffer too small: 4096 bytes required, 1024 provided"
        );
    }
}
