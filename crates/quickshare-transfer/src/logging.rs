/// Structured transfer logging.
///
/// Sessions report protocol milestones through a [`TransferLogger`] so the
/// embedding application decides where they go.

use std::fmt;

use uuid::Uuid;

/// Structured log entry for one session.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub session_id: Uuid,
    pub event: TransferEvent,
}

#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Session attached to a fresh channel
    SessionStarted { role: &'static str },
    /// Sender: proposal sent
    BatchProposed { files: usize, bytes: u64 },
    /// Receiver: proposal arrived
    ProposalReceived { files: usize, bytes: u64 },
    /// Receiver: decision sent
    DecisionSent { accepted: usize, proposed: usize },
    /// Sender: peer declined everything
    BatchDenied,
    /// Either side: file metadata sent or received
    FileStarted { name: String, index: u32, total: u32, size: u64 },
    /// Sender: chunk handed to the channel
    ChunkSent { name: String, offset: u64, len: usize },
    /// Receiver: chunk appended
    ChunkReceived { name: String, received: u64, len: usize },
    /// Either side: file complete
    FileCompleted { name: String, size: u64 },
    /// Either side: last file of the batch done
    BatchComplete { files: u32 },
    /// Session dropped
    Disconnected { reason: String },
    Error { message: String },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionStarted { role } => write!(f, "session_started role={}", role),
            Self::BatchProposed { files, bytes } => {
                write!(f, "batch_proposed files={} bytes={}", files, bytes)
            }
            Self::ProposalReceived { files, bytes } => {
                write!(f, "proposal_received files={} bytes={}", files, bytes)
            }
            Self::DecisionSent { accepted, proposed } => {
                write!(f, "decision_sent accepted={}/{}", accepted, proposed)
            }
            Self::BatchDenied => write!(f, "batch_denied"),
            Self::FileStarted { name, index, total, size } => {
                write!(f, "file_started name={} index={}/{} size={}", name, index, total, size)
            }
            Self::ChunkSent { name, offset, len } => {
                write!(f, "chunk_sent name={} offset={} len={}", name, offset, len)
            }
            Self::ChunkReceived { name, received, len } => {
                write!(f, "chunk_received name={} received={} len={}", name, received, len)
            }
            Self::FileCompleted { name, size } => {
                write!(f, "file_completed name={} size={}", name, size)
            }
            Self::BatchComplete { files } => write!(f, "batch_complete files={}", files),
            Self::Disconnected { reason } => write!(f, "disconnected: {}", reason),
            Self::Error { message } => write!(f, "error: {}", message),
        }
    }
}

/// Trait for transfer logging. Implementations can write to tracing, forward
/// to a UI, or discard.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        // Per-chunk events are debug, everything else is lifecycle.
        match &entry.event {
            TransferEvent::ChunkSent { .. } | TransferEvent::ChunkReceived { .. } => {
                tracing::debug!(
                    component = entry.component,
                    session_id = %entry.session_id,
                    "{}",
                    entry.event,
                );
            }
            TransferEvent::Error { .. } => {
                tracing::warn!(
                    component = entry.component,
                    session_id = %entry.session_id,
                    "{}",
                    entry.event,
                );
            }
            _ => {
                tracing::info!(
                    component = entry.component,
                    session_id = %entry.session_id,
                    "{}",
                    entry.event,
                );
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
