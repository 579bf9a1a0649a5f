/// QuickShare batch transfer: negotiated multi-file streaming between two peers.
///
/// Runs on top of any ordered, reliable message channel:
/// - Sender proposes a batch, receiver accepts a subset per file
/// - Accepted files stream one after another as metadata + fixed-size chunks
/// - Receiver reassembles each file and hands it to the caller
/// - One session per channel; a new channel preempts the old session

pub mod channel;
pub mod error;
pub mod history;
pub mod logging;
pub mod negotiate;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod source;
pub mod state;
pub mod supervisor;

// Re-export key types for convenience.
pub use channel::{Channel, MemoryChannel, memory_pair};
pub use error::TransferError;
pub use history::{History, HistoryRecorder};
pub use logging::{NullLogger, TracingLogger, TransferLogger};
pub use negotiate::{BatchDecision, DecisionDraft, PendingBatch, Resolution};
pub use protocol::{CHUNK_SIZE, ChunkSplitter, Reassembler, chunk_count, progress_percent};
pub use receiver::{BatchReceiver, ReceiverStep};
pub use sender::{BatchSender, SendOutcome};
pub use session::{SessionConfig, SessionEvent, SessionHandle, TransferSession};
pub use source::FileDescriptor;
pub use state::{Flow, IllegalTransition, Role, SessionMachine, SessionState, Transition};
pub use supervisor::SessionSupervisor;
