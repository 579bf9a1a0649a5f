use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Messages exchanged between two peers over the data channel.
///
/// Every message travels as a single JSON text frame tagged by `type`:
///
/// ```text
/// {"type":"batch-request","files":[{"name":"a.txt","size":100}],"totalCount":1}
/// {"type":"permission-granted","acceptedFiles":["a.txt"]}
/// {"type":"permission-denied"}
/// {"type":"file-metadata","name":"a.txt","size":100,"index":0,"total":1}
/// {"type":"chunk","payload":"<base64>","last":true,"isLastInBatch":true}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PeerMessage {
    /// Proposer offers a batch of files
    BatchRequest(BatchProposal),

    /// Decider accepted a subset of the proposed files
    PermissionGranted(PermissionGrant),

    /// Decider rejected the whole batch
    PermissionDenied,

    /// Announces the next accepted file; always precedes its chunks
    FileMetadata(FileMetadata),

    /// A slice of the active file's bytes
    Chunk(Chunk),
}

impl PeerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Wire name of the message type, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BatchRequest(_) => "batch-request",
            Self::PermissionGranted(_) => "permission-granted",
            Self::PermissionDenied => "permission-denied",
            Self::FileMetadata(_) => "file-metadata",
            Self::Chunk(_) => "chunk",
        }
    }
}

/// Name and size of one file offered in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProposal {
    pub files: Vec<FileEntry>,
    pub total_count: u32,
}

impl BatchProposal {
    pub fn new(files: Vec<FileEntry>) -> Self {
        let total_count = files.len() as u32;
        Self { files, total_count }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.name.as_str())
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub accepted_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    /// 0-based position within the accepted sequence.
    pub index: u32,
    pub total: u32,
}

impl FileMetadata {
    pub fn is_last_file(&self) -> bool {
        self.index + 1 == self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    #[serde(with = "base64_payload")]
    pub payload: Bytes,
    /// Final chunk of the current file.
    pub last: bool,
    /// Final chunk of the final file. Implies `last`.
    pub is_last_in_batch: bool,
}

mod base64_payload {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
