//! Shared error type for core domain logic.

/// Errors produced by pure domain-logic functions.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Input failed a domain validation rule.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A JSON payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
