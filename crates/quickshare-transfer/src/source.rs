use std::fmt;
use std::io::{self, Cursor};
use std::path::Path;

use bytes::Bytes;
use quickshare_types::FileEntry;
use tokio::io::AsyncRead;

/// A file offered by the sender: its name, declared size and an opaque
/// sequential byte source.
///
/// Owned by the sender for one transfer attempt and dropped once the batch
/// completes or is rejected.
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub source: Box<dyn AsyncRead + Send + Unpin>,
}

impl FileDescriptor {
    pub fn new(
        name: impl Into<String>,
        size: u64,
        source: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            source: Box::new(source),
        }
    }

    /// In-memory file.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let size = data.len() as u64;
        Self::new(name, size, Cursor::new(data))
    }

    /// Open a file on disk. The size is taken from its metadata and the name
    /// from its final path component.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?;
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self::new(name, size, file))
    }

    /// Wire entry for the batch proposal.
    pub fn entry(&self) -> FileEntry {
        FileEntry {
            name: self.name.clone(),
            size: self.size,
        }
    }
}

impl fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDescriptor")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
