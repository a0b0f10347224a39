//! Error type for CWL processing

use thiserror::Error;

/// Errors produced while reading or rewriting CWL documents and bindings
#[derive(Debug, Error)]
pub enum CwlError {
    /// The document is well-formed but structurally not what we need
    #[error("invalid CWL: {0}")]
    Validation(String),

    /// The document uses a feature this service does not support
    #[error("unsupported CWL feature: {0}")]
    Unsupported(String),

    /// The document could not be parsed at all
    #[error("failed to parse CWL document: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A binding or output could not be (de)serialized as JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CwlError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
