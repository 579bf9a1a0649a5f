use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Rejected locally, never sent: empty batch, duplicate names, wrong state or no channel.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// Underlying transport failed or closed. Terminates the session.
    #[error("channel error: {0}")]
    Channel(String),

    /// A local file source could not be read. Aborts the batch.
    #[error("cannot read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The peer sent something the protocol does not allow here.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl TransferError {
    pub fn invalid_batch(reason: impl Into<String>) -> Self {
        Self::InvalidBatch(reason.into())
    }

    pub fn channel(reason: impl ToString) -> Self {
        Self::Channel(reason.to_string())
    }

    pub fn violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation(reason.into())
    }

    /// Whether the error ends the session. Local validation errors leave it usable.
    pub fn ends_session(&self) -> bool {
        !matches!(self, Self::InvalidBatch(_))
    }

    /// Human-readable status line for the UI.
    pub fn status(&self) -> String {
        match self {
            Self::InvalidBatch(reason) => format!("Cannot send: {}", reason),
            Self::Channel(_) => "Disconnected".to_string(),
            Self::Read { name, .. } => format!("Transfer failed: cannot read {}", name),
            Self::ProtocolViolation(reason) => format!("Receive error: {}", reason),
        }
    }
}
