//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared schema and utilities
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Payload encode error: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("Payload decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}
