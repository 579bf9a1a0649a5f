pub mod messages;
pub mod models;

pub use messages::{BatchProposal, Chunk, FileEntry, FileMetadata, PeerMessage, PermissionGrant};
pub use models::{Direction, HistoryRecord};
