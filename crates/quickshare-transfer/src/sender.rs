/// Sender side of the transfer engine.
///
/// ```text
/// for each accepted file (index 0..total):
///   file-metadata ──> [read chunk] ──> chunk ──> [read chunk] ──> chunk(last) ──> history
/// ```
///
/// One read in flight at a time; the next read is issued only after the
/// previous chunk has been handed to the channel. No acknowledgements: the
/// channel's own backpressure is the only throttle.

use quickshare_types::{Chunk, Direction, FileMetadata, HistoryRecord, PeerMessage};

use crate::channel::Channel;
use crate::error::TransferError;
use crate::logging::TransferEvent;
use crate::protocol::{ChunkSplitter, progress_percent};
use crate::session::{SessionContext, SessionEvent};
use crate::source::FileDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub files_sent: u32,
    pub bytes_sent: u64,
}

/// Streams an accepted batch over one channel.
pub struct BatchSender<'a, C> {
    channel: &'a mut C,
    ctx: &'a SessionContext,
}

impl<'a, C: Channel> BatchSender<'a, C> {
    pub(crate) fn new(channel: &'a mut C, ctx: &'a SessionContext) -> Self {
        Self { channel, ctx }
    }

    /// Stream every file in order. Stops at the first read or channel failure
    /// without moving on to later files.
    pub async fn stream_batch(
        &mut self,
        files: Vec<FileDescriptor>,
    ) -> Result<SendOutcome, TransferError> {
        let total = files.len() as u32;
        let mut bytes_sent = 0;
        for (index, file) in files.into_iter().enumerate() {
            bytes_sent += self.stream_file(file, index as u32, total).await?;
        }
        self.ctx.log(TransferEvent::BatchComplete { files: total });
        Ok(SendOutcome {
            files_sent: total,
            bytes_sent,
        })
    }

    async fn stream_file(
        &mut self,
        file: FileDescriptor,
        index: u32,
        total: u32,
    ) -> Result<u64, TransferError> {
        let FileDescriptor { name, size, source } = file;
        let is_last_file = index + 1 == total;

        self.ctx.emit(SessionEvent::Progress(0));
        self.send(PeerMessage::FileMetadata(FileMetadata {
            name: name.clone(),
            size,
            index,
            total,
        }))
        .await?;
        self.ctx.log(TransferEvent::FileStarted {
            name: name.clone(),
            index,
            total,
            size,
        });

        if size == 0 {
            // Nothing to read, but the receiver still needs a final chunk.
            self.send(PeerMessage::Chunk(Chunk {
                payload: Default::default(),
                last: true,
                is_last_in_batch: is_last_file,
            }))
            .await?;
            self.ctx.emit(SessionEvent::Progress(100));
        } else {
            let mut splitter = ChunkSplitter::new(source, size, self.ctx.chunk_size);
            loop {
                let offset = splitter.offset();
                let read = self.ctx.guard(async {
                    splitter.next_chunk().await.map_err(|source| TransferError::Read {
                        name: name.clone(),
                        source,
                    })
                });
                let Some(payload) = read.await? else {
                    break;
                };
                let len = payload.len();
                let last = splitter.is_finished();
                self.send(PeerMessage::Chunk(Chunk {
                    payload,
                    last,
                    is_last_in_batch: last && is_last_file,
                }))
                .await?;
                self.ctx.log(TransferEvent::ChunkSent {
                    name: name.clone(),
                    offset,
                    len,
                });
                self.ctx
                    .emit(SessionEvent::Progress(progress_percent(splitter.offset(), size)));
            }
        }

        self.ctx.history.record(HistoryRecord::now(name.clone(), Direction::Sent));
        self.ctx.log(TransferEvent::FileCompleted {
            name: name.clone(),
            size,
        });
        self.ctx.emit(SessionEvent::Status(format!("Sent: {}", name)));
        Ok(size)
    }

    async fn send(&mut self, message: PeerMessage) -> Result<(), TransferError> {
        let channel = &mut *self.channel;
        self.ctx.guard(channel.send(message)).await
    }
}
