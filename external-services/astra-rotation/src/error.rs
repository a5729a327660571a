//! Error types for the rotation handler

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RotationError {
    /// The rotation event does not match the secret's staging metadata.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rotation not enabled: {0}")]
    RotationNotEnabled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored credential document failed schema validation.
    #[error("Malformed secret: {0}")]
    MalformedSecret(String),

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Failed to delete old token {client_id}: received status {status}")]
    TokenDeletionFailed { client_id: String, status: u16 },

    #[error("Token test failed (status {}): {detail}", status.map_or_else(|| "none".to_string(), |s| s.to_string()))]
    CredentialTestFailed { status: Option<u16>, detail: String },

    #[error("Unexpected response from token authority (status {status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl RotationError {
    /// Whether the external scheduler may retry the whole step later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RotationError::TokenCreation(_)
                | RotationError::TokenDeletionFailed { .. }
                | RotationError::CredentialTestFailed { .. }
                | RotationError::UnexpectedResponse { .. }
                | RotationError::Transport(_)
                | RotationError::ProviderError(_)
        )
    }
}

impl From<reqwest::Error> for RotationError {
    fn from(err: reqwest::Error) -> Self {
        RotationError::Transport(err.to_string())
    }
}

impl From<::config::ConfigError> for RotationError {
    fn from(err: ::config::ConfigError) -> Self {
        RotationError::ConfigurationError(err.to_string())
    }
}
