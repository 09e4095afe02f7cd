//! Turns listing batches into archive entries.
//!
//! Files of a batch are sorted by declared size and grouped into chunks that
//! fit the memory budget. The files of a chunk are fetched concurrently and
//! buffered, then handed to the encoder one by one in chunk order. A file too
//! large for the budget on its own is streamed straight into the encoder.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use time::OffsetDateTime;
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{ArchiveEntry, ContentSource, FileDescriptor, FolderDescriptor, join_path};
use crate::error::{Result, ZipError};
use crate::pack::walker::{Batch, BatchItems, TreeWalker};
use crate::pack::writer::ZipEncoder;
use crate::policy::ArchivePolicy;
use crate::remote::ContentFetcher;

/// A group of files fetched together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    /// Larger than the whole budget; piped through without buffering.
    Streamed(FileDescriptor),
    /// Fetched concurrently and fully buffered.
    Buffered(Vec<FileDescriptor>),
}

impl Chunk {
    pub fn files(&self) -> &[FileDescriptor] {
        match self {
            Chunk::Streamed(f) => std::slice::from_ref(f),
            Chunk::Buffered(v) => v,
        }
    }
}

/// Sort `files` by declared size (stable) and split them greedily into chunks.
///
/// A file joins the open chunk while the chunk's declared total stays within
/// `memory_budget` and it holds fewer than `max_chunk_items` files.
pub fn plan_chunks(mut files: Vec<FileDescriptor>, policy: &ArchivePolicy) -> Vec<Chunk> {
    let budget = policy.memory_budget.max(1);
    let max_items = policy.max_chunk_items.max(1);
    files.sort_by_key(|f| f.size);

    let mut chunks = Vec::new();
    let mut current: Vec<FileDescriptor> = Vec::new();
    let mut running = 0u64;
    for f in files {
        let fits = running.saturating_add(f.size) <= budget && current.len() < max_items;
        if !current.is_empty() && !fits {
            chunks.push(close_chunk(std::mem::take(&mut current), budget));
            running = 0;
        }
        running = running.saturating_add(f.size);
        current.push(f);
    }
    if !current.is_empty() {
        chunks.push(close_chunk(current, budget));
    }
    chunks
}

fn close_chunk(mut files: Vec<FileDescriptor>, budget: u64) -> Chunk {
    if files.len() == 1 && files[0].size > budget {
        if let Some(f) = files.pop() {
            return Chunk::Streamed(f);
        }
    }
    Chunk::Buffered(files)
}

/// Aborts every spawned fetch that has not been awaited when dropped.
struct FetchSet(Vec<JoinHandle<Result<Bytes>>>);

impl Drop for FetchSet {
    fn drop(&mut self) {
        for h in &self.0 {
            h.abort();
        }
    }
}

pub struct DownloadScheduler {
    fetcher: Arc<dyn ContentFetcher>,
    policy: ArchivePolicy,
    cancel: CancellationToken,
    default_modified: OffsetDateTime,
}

impl DownloadScheduler {
    pub fn new(fetcher: Arc<dyn ContentFetcher>, policy: &ArchivePolicy) -> Self {
        Self {
            fetcher,
            policy: policy.clone().normalized(),
            cancel: CancellationToken::new(),
            default_modified: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Timestamp for descriptors that carry none.
    pub fn with_default_modified(mut self, at: OffsetDateTime) -> Self {
        self.default_modified = at;
        self
    }

    /// Drain `walker`, writing every discovered entry into `encoder`.
    pub async fn run<W>(&self, walker: &mut TreeWalker, encoder: &mut ZipEncoder<W>) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ZipError::Cancelled),
                b = walker.next_batch() => b?,
            };
            let Some(batch) = next else {
                return Ok(());
            };
            self.process_batch(batch, encoder).await?;
        }
    }

    pub async fn process_batch<W>(&self, batch: Batch, encoder: &mut ZipEncoder<W>) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match batch.items {
            BatchItems::Folders(folders) => self.write_folders(&batch.path, folders, encoder).await,
            BatchItems::Files(files) => {
                for chunk in plan_chunks(files, &self.policy) {
                    self.write_chunk(&batch.path, chunk, encoder).await?;
                }
                Ok(())
            }
        }
    }

    async fn write_folders<W>(
        &self,
        parent: &str,
        folders: Vec<FolderDescriptor>,
        encoder: &mut ZipEncoder<W>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        for folder in folders {
            let path = join_path(parent, &folder.name);
            let modified = folder.modified.unwrap_or(self.default_modified);
            encoder
                .add_entry(ArchiveEntry::directory(path, Some(modified)))
                .await?;
        }
        Ok(())
    }

    async fn write_chunk<W>(&self, parent: &str, chunk: Chunk, encoder: &mut ZipEncoder<W>) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if self.cancel.is_cancelled() {
            return Err(ZipError::Cancelled);
        }
        match chunk {
            Chunk::Streamed(file) => {
                debug!(folder = %parent, file = %file.name, size = file.size, "streaming oversized file");
                let stream = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(ZipError::Cancelled),
                    s = self.fetcher.fetch(&file) => s?,
                };
                let path = join_path(parent, &file.name);
                let modified = file.modified.unwrap_or(self.default_modified);
                encoder
                    .add_entry(ArchiveEntry::file(path, Some(modified), ContentSource::Streaming(stream)))
                    .await
            }
            Chunk::Buffered(files) => {
                let declared: u64 = files.iter().map(|f| f.size).sum();
                debug!(folder = %parent, files = files.len(), declared, "fetching chunk");
                let mut set = FetchSet(
                    files
                        .iter()
                        .map(|f| {
                            let fetcher = Arc::clone(&self.fetcher);
                            let file = f.clone();
                            let cap = f.size.min(self.policy.memory_budget) as usize;
                            tokio::spawn(async move { fetch_buffered(fetcher, file, cap).await })
                        })
                        .collect(),
                );

                for (file, handle) in files.iter().zip(set.0.iter_mut()) {
                    let path = join_path(parent, &file.name);
                    let bytes = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(ZipError::Cancelled),
                        joined = handle => match joined {
                            Ok(res) => res?,
                            Err(e) => return Err(ZipError::fetch(path, e)),
                        },
                    };
                    let modified = file.modified.unwrap_or(self.default_modified);
                    encoder
                        .add_entry(ArchiveEntry::file(path, Some(modified), ContentSource::Buffered(bytes)))
                        .await?;
                }
                Ok(())
            }
        }
    }
}

async fn fetch_buffered(
    fetcher: Arc<dyn ContentFetcher>,
    file: FileDescriptor,
    capacity: usize,
) -> Result<Bytes> {
    let mut stream = fetcher.fetch(&file).await?;
    let mut buf = BytesMut::with_capacity(capacity);
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}
