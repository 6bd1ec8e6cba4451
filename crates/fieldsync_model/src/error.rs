//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur when constructing or converting model types.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A payload could not be parsed or encoded as JSON.
    #[error("malformed payload: {message}")]
    MalformedPayload {
        /// Error message.
        message: String,
    },

    /// An identifier had the wrong shape.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Error message.
        message: String,
    },
}

impl ModelError {
    /// Creates a malformed payload error.
    pub fn malformed_payload(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    /// Creates an invalid identifier error.
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ModelError::malformed_payload("not json");
        assert_eq!(err.to_string(), "malformed payload: not json");

        let err = ModelError::invalid_id("expected 16 bytes");
        assert!(err.to_string().contains("16 bytes"));
    }
}
