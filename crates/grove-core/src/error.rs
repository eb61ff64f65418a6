use grove_auth::{CipherError, UnknownProvider};
use grove_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroveError {
    #[error("{0}")]
    Validation(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("invalid webhook token")]
    InvalidWebhookToken,

    #[error(transparent)]
    UnknownProvider(#[from] UnknownProvider),

    #[error("integration not connected")]
    NotConnected,

    #[error("integration is not active")]
    IntegrationInactive,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("integration disconnected, re-authorization required")]
    RefreshExpired,

    #[error("oauth error: {0}")]
    OAuth(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("token cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Database(#[from] StoreError),
}

impl GroveError {
    /// Errors that another attempt cannot fix without user action.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GroveError::NotConnected
                | GroveError::RefreshExpired
                | GroveError::IntegrationInactive
                | GroveError::UnknownProvider(_)
                | GroveError::UnknownUser(_)
                | GroveError::Validation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GroveError>;
