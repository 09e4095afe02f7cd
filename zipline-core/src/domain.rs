// zipline_core/src/domain.rs
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Result;

/// Chunks of entry content as they arrive from a fetch.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Metadata for a remote file, known before its content is fetched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    pub name: String,
    /// Declared size; used for scheduling only, never trusted for the archive.
    pub size: u64,
    #[serde(default, with = "time::serde::timestamp::option")]
    pub modified: Option<OffsetDateTime>,
}

/// Metadata for a remote folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default, with = "time::serde::timestamp::option")]
    pub modified: Option<OffsetDateTime>,
}

impl FileDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            modified: None,
        }
    }
}

impl FolderDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            modified: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One-shot producer of an entry's bytes.
pub enum ContentSource {
    /// Fully materialized content.
    Buffered(Bytes),
    /// Content read incrementally while the entry is written.
    Streaming(ByteStream),
}

impl ContentSource {
    pub fn into_stream(self) -> ByteStream {
        match self {
            ContentSource::Buffered(b) => {
                if b.is_empty() {
                    stream::empty().boxed()
                } else {
                    stream::once(async move { Ok(b) }).boxed()
                }
            }
            ContentSource::Streaming(s) => s,
        }
    }
}

impl From<Bytes> for ContentSource {
    fn from(b: Bytes) -> Self {
        ContentSource::Buffered(b)
    }
}

impl From<Vec<u8>> for ContentSource {
    fn from(v: Vec<u8>) -> Self {
        ContentSource::Buffered(Bytes::from(v))
    }
}

impl From<&'static [u8]> for ContentSource {
    fn from(v: &'static [u8]) -> Self {
        ContentSource::Buffered(Bytes::from_static(v))
    }
}

impl std::fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentSource::Buffered(b) => write!(f, "Buffered({} bytes)", b.len()),
            ContentSource::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

/// An item resolved by the scheduler and ready to be written.
#[derive(Debug)]
pub struct ArchiveEntry {
    pub path: String,
    pub kind: EntryKind,
    pub content: Option<ContentSource>,
    pub modified: OffsetDateTime,
}

impl ArchiveEntry {
    pub fn file(
        path: impl Into<String>,
        modified: Option<OffsetDateTime>,
        content: impl Into<ContentSource>,
    ) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            content: Some(content.into()),
            modified: modified.unwrap_or_else(OffsetDateTime::now_utc),
        }
    }

    pub fn directory(path: impl Into<String>, modified: Option<OffsetDateTime>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            content: None,
            modified: modified.unwrap_or_else(OffsetDateTime::now_utc),
        }
    }
}

/// Join a parent archive path and a child name with a single `/`.
pub fn join_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}
