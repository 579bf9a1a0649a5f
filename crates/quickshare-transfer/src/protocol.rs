/// Chunk codec: splits a byte source into fixed-size slices and reassembles them.
///
/// ```text
/// source  [==========|==========|====]
/// chunks   0          1          2 (short, size mod CHUNK_SIZE)
/// ```
///
/// Slices cover the source contiguously, in offset order, with no gaps or
/// overlaps. The receiver trusts arrival order; the channel guarantees it.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default chunk size: 16 KB of plaintext per chunk message.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Number of slices `split` produces for `size` bytes: ceil(size / chunk_size).
pub fn chunk_count(size: u64, chunk_size: usize) -> u64 {
    size.div_ceil(chunk_size as u64)
}

/// round(done / total * 100), clamped to 100. An empty file is always complete.
pub fn progress_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = done as u128;
    let total = total as u128;
    // Integer round-half-up of done * 100 / total.
    ((done * 200 + total) / (total * 2)).min(100) as u8
}

/// Lazy, finite, non-restartable sequence of slices over one byte source.
///
/// Reads strictly one slice at a time: the next read is only issued by the
/// next call to [`ChunkSplitter::next_chunk`].
pub struct ChunkSplitter<R> {
    reader: R,
    size: u64,
    offset: u64,
    chunk_size: usize,
}

impl<R: AsyncRead + Unpin> ChunkSplitter<R> {
    /// # Panics
    /// Panics if `chunk_size` is zero.
    pub fn new(reader: R, size: u64, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            reader,
            size,
            offset: 0,
            chunk_size,
        }
    }

    /// Bytes produced so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_finished(&self) -> bool {
        self.offset >= self.size
    }

    /// Read the next slice. `Ok(None)` once `size` bytes have been produced.
    ///
    /// A source that ends early fails with `UnexpectedEof`; bytes past `size`
    /// are never read.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.is_finished() {
            return Ok(None);
        }
        let want = (self.size - self.offset).min(self.chunk_size as u64) as usize;
        let mut buf = BytesMut::zeroed(want);
        self.reader.read_exact(&mut buf).await.map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("source ended at byte {} of {}", self.offset, self.size),
                )
            } else {
                e
            }
        })?;
        self.offset += want as u64;
        Ok(Some(buf.freeze()))
    }
}

/// Accumulates received slices for the active file.
#[derive(Debug, Default)]
pub struct Reassembler {
    buf: BytesMut,
    slices: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, slice: &[u8]) {
        self.buf.extend_from_slice(slice);
        self.slices += 1;
    }

    /// Accumulated byte count.
    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn slices(&self) -> usize {
        self.slices
    }

    /// Take the concatenated blob and reset for the next file.
    pub fn finish(&mut self) -> Bytes {
        self.slices = 0;
        self.buf.split().freeze()
    }

    /// Drop any partial file.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.slices = 0;
    }
}
