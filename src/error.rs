//! # Errors
//!
//! Error taxonomy shared by the dispatcher and every reconciler.

use crate::crypto::CryptoError;
use crate::provider::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Missing or malformed resource properties, detected before any external call
    #[error("{0}")]
    Validation(String),

    /// The lifecycle event itself cannot be handled
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Malformed physical resource ID {0}")]
    MalformedPhysicalId(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Human-readable failure reason: the error and all of its sources
    #[must_use]
    pub fn reason(&self) -> String {
        let mut reason = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            let text = err.to_string();
            if !reason.ends_with(&text) {
                reason.push_str(": ");
                reason.push_str(&text);
            }
            source = err.source();
        }
        reason
    }
}

pub type HandlerResult<T> = Result<T, HandlerError>;
