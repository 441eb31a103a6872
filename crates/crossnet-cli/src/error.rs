//! Error types for the CLI

use std::path::PathBuf;

use crossnet_ensure::FailureReason;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Common(#[from] crossnet_common::Error),

    #[error(transparent)]
    Validate(#[from] crossnet_validate::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker info file not found: {path}")]
    BrokerInfoNotFound { path: PathBuf },

    #[error("failed to deploy {resource}: {reason}")]
    Reconcile {
        resource: String,
        #[source]
        reason: FailureReason,
    },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("command failed: {message}")]
    CommandFailed { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }

    pub fn reconcile(resource: impl Into<String>, reason: FailureReason) -> Self {
        Error::Reconcile {
            resource: resource.into(),
            reason,
        }
    }
}
