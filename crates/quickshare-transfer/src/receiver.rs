/// Receiver side of the transfer engine.
///
/// ```text
/// file-metadata(0) chunk chunk .. chunk(last) file-metadata(1) .. chunk(last, isLastInBatch)
///        │            └── Reassembler ──┘ │
///     Started         Progress ...     FileComplete                  BatchComplete
/// ```
///
/// Files never interleave: metadata for the next file is only legal once the
/// previous file's last chunk has arrived.

use std::collections::BTreeSet;

use bytes::Bytes;
use quickshare_types::{Chunk, FileMetadata};

use crate::error::TransferError;
use crate::protocol::{Reassembler, progress_percent};

/// What the caller should surface after feeding one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverStep {
    Started(FileMetadata),
    Progress(u8),
    FileComplete { name: String, data: Bytes },
    BatchComplete { files: u32 },
}

#[derive(Debug)]
pub struct BatchReceiver {
    granted: usize,
    /// Granted names not yet announced.
    remaining: BTreeSet<String>,
    max_chunk: usize,
    next_index: u32,
    active: Option<FileMetadata>,
    buffer: Reassembler,
    finished: bool,
}

impl BatchReceiver {
    /// Expect exactly the granted files, in the sender's order, each chunk at
    /// most `max_chunk` bytes.
    pub fn new(granted: BTreeSet<String>, max_chunk: usize) -> Self {
        Self {
            granted: granted.len(),
            remaining: granted,
            max_chunk,
            next_index: 0,
            active: None,
            buffer: Reassembler::new(),
            finished: false,
        }
    }

    pub fn active(&self) -> Option<&FileMetadata> {
        self.active.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes buffered for the active file.
    pub fn buffered(&self) -> u64 {
        self.buffer.len()
    }

    /// Drop the partial file, if any.
    pub fn discard(&mut self) {
        self.buffer.clear();
        self.active = None;
    }

    pub fn on_metadata(&mut self, meta: FileMetadata) -> Result<ReceiverStep, TransferError> {
        if let Some(active) = &self.active {
            return Err(TransferError::violation(format!(
                "metadata for {} while {} is incomplete",
                meta.name, active.name
            )));
        }
        if self.finished {
            return Err(TransferError::violation("metadata after the batch completed"));
        }
        if meta.total == 0 || meta.index >= meta.total {
            return Err(TransferError::violation(format!(
                "file index {} out of range for total {}",
                meta.index, meta.total
            )));
        }
        if meta.total as usize != self.granted {
            return Err(TransferError::violation(format!(
                "batch announces {} files but {} were granted",
                meta.total, self.granted
            )));
        }
        if meta.index < self.next_index {
            return Err(TransferError::violation(format!(
                "file index {} already received",
                meta.index
            )));
        }
        if meta.index > self.next_index {
            return Err(TransferError::violation(format!(
                "file index {} skips expected {}",
                meta.index, self.next_index
            )));
        }
        if !self.remaining.remove(&meta.name) {
            return Err(TransferError::violation(format!(
                "{} was not granted or was already received",
                meta.name
            )));
        }

        self.buffer.clear();
        self.active = Some(meta.clone());
        Ok(ReceiverStep::Started(meta))
    }

    pub fn on_chunk(&mut self, chunk: Chunk) -> Result<Vec<ReceiverStep>, TransferError> {
        let Some(meta) = &self.active else {
            return Err(TransferError::violation("chunk with no active file metadata"));
        };
        if chunk.payload.len() > self.max_chunk {
            return Err(TransferError::violation(format!(
                "chunk of {} bytes exceeds the {} byte limit",
                chunk.payload.len(),
                self.max_chunk
            )));
        }
        let received = self.buffer.len() + chunk.payload.len() as u64;
        if received > meta.size {
            return Err(TransferError::violation(format!(
                "{} overran its declared size {}",
                meta.name, meta.size
            )));
        }
        if chunk.is_last_in_batch && !chunk.last {
            return Err(TransferError::violation(
                "isLastInBatch on a chunk that does not end its file",
            ));
        }
        if chunk.last {
            if received != meta.size {
                return Err(TransferError::violation(format!(
                    "{} ended after {} of {} bytes",
                    meta.name, received, meta.size
                )));
            }
            if chunk.is_last_in_batch != meta.is_last_file() {
                return Err(TransferError::violation(format!(
                    "isLastInBatch={} on file {} of {}",
                    chunk.is_last_in_batch,
                    meta.index + 1,
                    meta.total
                )));
            }
        }

        self.buffer.push(&chunk.payload);
        let mut steps = vec![ReceiverStep::Progress(progress_percent(received, meta.size))];

        if chunk.last {
            let total = meta.total;
            let name = meta.name.clone();
            self.active = None;
            self.next_index += 1;
            steps.push(ReceiverStep::FileComplete {
                name,
                data: self.buffer.finish(),
            });
            if chunk.is_last_in_batch {
                self.finished = true;
                steps.push(ReceiverStep::BatchComplete { files: total });
            }
        }
        Ok(steps)
    }
}
