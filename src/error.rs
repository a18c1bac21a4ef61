//! Error types for the bridge
//!
//! Each layer has its own error enum. [`BridgeError`] is the one the
//! subscription service and the HTTP API speak, and it knows which HTTP
//! status code it maps to.

use crate::store::StoreError;
use crate::subscription::HydrationError;
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("subscription not found: {id}")]
    SubscriptionNotFound { id: String },

    #[error("subscription template not found: {id}")]
    SubscriptionTemplateNotFound { id: String },

    #[error("record already exists: {id}")]
    Conflict { id: String },

    #[error("invalid global parameter key: {key}")]
    InvalidGlobalParameterKey { key: String },

    #[error("missing required parameters: {0}")]
    MissingRequiredParameters(String),

    #[error(transparent)]
    Hydration(#[from] HydrationError),

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    /// HTTP status code used when the error crosses the API boundary
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::SubscriptionNotFound { .. }
            | BridgeError::SubscriptionTemplateNotFound { .. } => 404,
            BridgeError::Conflict { .. } => 409,
            BridgeError::InvalidGlobalParameterKey { .. }
            | BridgeError::MissingRequiredParameters(_) => 400,
            BridgeError::Hydration(_)
            | BridgeError::Storage { .. }
            | BridgeError::Config(_)
            | BridgeError::Internal { .. } => 500,
        }
    }

    /// Build a missing-parameters error listing every missing name
    pub fn missing_parameters<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = names
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::MissingRequiredParameters(joined)
    }

    /// Create invalid global parameter key error
    pub fn invalid_key<S: Into<String>>(key: S) -> Self {
        Self::InvalidGlobalParameterKey { key: key.into() }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<StoreError> for BridgeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SubscriptionNotFound(id) => BridgeError::SubscriptionNotFound { id },
            StoreError::SubscriptionTemplateNotFound(id) => {
                BridgeError::SubscriptionTemplateNotFound { id }
            }
            StoreError::Conflict(id) => BridgeError::Conflict { id },
            other => BridgeError::Storage {
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
