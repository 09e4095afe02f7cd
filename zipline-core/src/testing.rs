//! In-memory remote used by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, stream};

use crate::domain::{ByteStream, FileDescriptor, FolderDescriptor};
use crate::error::{Result, ZipError};
use crate::remote::{ContentFetcher, Listing, Page, PageRequest, paginate};

pub(crate) const ROOT: &str = "root";

#[derive(Default)]
pub(crate) struct MemRemote {
    folders: HashMap<String, Vec<FolderDescriptor>>,
    files: HashMap<String, Vec<FileDescriptor>>,
    content: HashMap<String, Bytes>,
    /// Declared size differs from the real one for these ids.
    declared: HashMap<String, u64>,
    fail_listing: Option<String>,
    fail_fetch: Option<String>,
    /// Smaller files take longer, so completion order inverts request order.
    invert_latency: bool,
    chunk: usize,

    calls: Mutex<Vec<(String, &'static str, PageRequest)>>,
    lists_in_flight: AtomicUsize,
    pub max_lists_in_flight: AtomicUsize,
    bytes_in_flight: Arc<AtomicU64>,
    pub peak_bytes_in_flight: AtomicU64,
    fetches: Mutex<Vec<String>>,
}

impl MemRemote {
    pub fn new() -> Self {
        Self {
            chunk: 4096,
            ..Default::default()
        }
    }

    pub fn root() -> FolderDescriptor {
        FolderDescriptor::new(ROOT, "")
    }

    pub fn folder(mut self, parent: &str, id: &str, name: &str) -> Self {
        self.folders
            .entry(parent.to_string())
            .or_default()
            .push(FolderDescriptor::new(id, name));
        self
    }

    pub fn file(mut self, parent: &str, id: &str, name: &str, data: &[u8]) -> Self {
        self.files
            .entry(parent.to_string())
            .or_default()
            .push(FileDescriptor::new(id, name, data.len() as u64));
        self.content
            .insert(id.to_string(), Bytes::copy_from_slice(data));
        self
    }

    /// Register a file whose listing reports `declared` bytes.
    pub fn file_declared(mut self, parent: &str, id: &str, name: &str, data: &[u8], declared: u64) -> Self {
        self = self.file(parent, id, name, data);
        if let Some(f) = self
            .files
            .get_mut(parent)
            .and_then(|v| v.iter_mut().find(|f| f.id == id))
        {
            f.size = declared;
        }
        self.declared.insert(id.to_string(), declared);
        self
    }

    pub fn fail_listing(mut self, folder: &str) -> Self {
        self.fail_listing = Some(folder.to_string());
        self
    }

    pub fn fail_fetch(mut self, file: &str) -> Self {
        self.fail_fetch = Some(file.to_string());
        self
    }

    pub fn invert_latency(mut self) -> Self {
        self.invert_latency = true;
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk = n.max(1);
        self
    }

    pub fn listing_calls(&self) -> Vec<(String, &'static str, PageRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetch_order(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    fn record_call(&self, folder: &str, kind: &'static str, req: PageRequest) {
        self.calls
            .lock()
            .unwrap()
            .push((folder.to_string(), kind, req));
        let now = self.lists_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_lists_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn list<T: Clone>(
        &self,
        table: &HashMap<String, Vec<T>>,
        folder: &FolderDescriptor,
        kind: &'static str,
        req: PageRequest,
    ) -> Result<Page<T>> {
        self.record_call(&folder.id, kind, req);
        let res = if self.fail_listing.as_deref() == Some(folder.id.as_str()) {
            Err(ZipError::listing(folder.id.clone(), "503 service unavailable"))
        } else {
            let all = table.get(&folder.id).map(Vec::as_slice).unwrap_or(&[]);
            Ok(paginate(all, req))
        };
        self.lists_in_flight.fetch_sub(1, Ordering::SeqCst);
        res
    }
}

/// Decrements the in-flight byte gauge when the content stream is dropped.
struct InFlight {
    gauge: Arc<AtomicU64>,
    bytes: u64,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.gauge.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

impl Listing for MemRemote {
    fn list_files(
        &self,
        folder: &FolderDescriptor,
        page: PageRequest,
    ) -> BoxFuture<'_, Result<Page<FileDescriptor>>> {
        let res = self.list(&self.files, folder, "files", page);
        async move { res }.boxed()
    }

    fn list_folders(
        &self,
        folder: &FolderDescriptor,
        page: PageRequest,
    ) -> BoxFuture<'_, Result<Page<FolderDescriptor>>> {
        let res = self.list(&self.folders, folder, "folders", page);
        async move { res }.boxed()
    }
}

impl ContentFetcher for MemRemote {
    fn fetch(&self, file: &FileDescriptor) -> BoxFuture<'_, Result<ByteStream>> {
        let file = file.clone();
        async move {
            self.fetches.lock().unwrap().push(file.id.clone());
            if self.invert_latency {
                let ms = 40u64.saturating_sub(file.size.min(40));
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            if self.fail_fetch.as_deref() == Some(file.id.as_str()) {
                return Err(ZipError::fetch(file.name.clone(), "404 not found"));
            }
            let data = self
                .content
                .get(&file.id)
                .cloned()
                .ok_or_else(|| ZipError::fetch(file.name.clone(), "unknown file"))?;

            let declared = self.declared.get(&file.id).copied().unwrap_or(file.size);
            let now = self.bytes_in_flight.fetch_add(declared, Ordering::SeqCst) + declared;
            self.peak_bytes_in_flight.fetch_max(now, Ordering::SeqCst);
            let guard = InFlight {
                gauge: Arc::clone(&self.bytes_in_flight),
                bytes: declared,
            };

            let chunks: Vec<Result<Bytes>> = data
                .chunks(self.chunk)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            let s: ByteStream = stream::iter(chunks)
                .map(move |c| {
                    let _ = &guard;
                    c
                })
                .boxed();
            Ok(s)
        }
        .boxed()
    }
}
