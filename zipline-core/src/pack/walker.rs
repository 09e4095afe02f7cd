//! Breadth-first, paginated traversal of a remote folder tree.
//!
//! Each directory at the front of the pending queue is listed page by page,
//! subfolders first, then files. As soon as a page arrives the request for the
//! following page is spawned, so its latency overlaps with the caller working
//! on the current one. At most one request is ever in flight.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::{FileDescriptor, FolderDescriptor, join_path};
use crate::error::{Result, ZipError};
use crate::policy::ArchivePolicy;
use crate::remote::{Listing, Page, PageRequest};

/// Pagination state for one kind of child within one directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageCursor {
    pub limit: u32,
    pub offset: u64,
    pub exhausted: bool,
}

impl PageCursor {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            offset: 0,
            exhausted: false,
        }
    }

    pub fn request(&self) -> PageRequest {
        PageRequest {
            limit: self.limit,
            offset: self.offset,
        }
    }

    fn advance(&mut self, last_page: bool) {
        if last_page {
            self.exhausted = true;
        } else {
            self.offset += self.limit as u64;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchItems {
    Files(Vec<FileDescriptor>),
    Folders(Vec<FolderDescriptor>),
}

impl BatchItems {
    pub fn len(&self) -> usize {
        match self {
            BatchItems::Files(v) => v.len(),
            BatchItems::Folders(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Descriptors from one listing page, with the archive path of the
/// directory they were listed in (`""` for the root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub path: String,
    pub items: BatchItems,
}

struct PendingDir {
    folder: FolderDescriptor,
    path: String,
    folders: PageCursor,
    files: PageCursor,
}

enum Fetched {
    Files(Page<FileDescriptor>),
    Folders(Page<FolderDescriptor>),
}

pub struct TreeWalker {
    listing: Arc<dyn Listing>,
    queue: VecDeque<PendingDir>,
    in_flight: Option<JoinHandle<Result<Fetched>>>,
    file_page: u32,
    folder_page: u32,
}

impl TreeWalker {
    /// Start a traversal rooted at `root`. The root itself contributes no
    /// entry; its children land at the top of the archive.
    ///
    /// Requests run on spawned tasks, so this must be driven from within a
    /// tokio runtime.
    pub fn new(listing: Arc<dyn Listing>, root: FolderDescriptor, policy: &ArchivePolicy) -> Self {
        let mut walker = Self {
            listing,
            queue: VecDeque::new(),
            in_flight: None,
            file_page: policy.file_page_size,
            folder_page: policy.folder_page_size,
        };
        walker.enqueue(root, String::new());
        walker
    }

    /// Directories discovered but not yet fully expanded.
    pub fn pending_dirs(&self) -> usize {
        self.queue.len()
    }

    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }

    /// Next non-empty batch, or `None` once the whole tree has been listed.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        loop {
            let handle = match self.in_flight.take() {
                Some(h) => h,
                None => match self.issue() {
                    Some(h) => h,
                    None => return Ok(None),
                },
            };
            let fetched = match handle.await {
                Ok(res) => res?,
                Err(e) => {
                    let folder = self.queue.front().map(|d| d.path.clone()).unwrap_or_default();
                    return Err(ZipError::listing(folder, e));
                }
            };

            let Some(front) = self.queue.front_mut() else {
                return Err(ZipError::Format("listing response without a pending folder".into()));
            };
            let path = front.path.clone();
            let items = match fetched {
                Fetched::Folders(page) => {
                    debug!(folder = %path, offset = front.folders.offset, count = page.items.len(), "folder page");
                    front.folders.advance(page.is_last_page);
                    for child in &page.items {
                        let child_path = join_path(&path, &child.name);
                        self.enqueue(child.clone(), child_path);
                    }
                    BatchItems::Folders(page.items)
                }
                Fetched::Files(page) => {
                    debug!(folder = %path, offset = front.files.offset, count = page.items.len(), "file page");
                    front.files.advance(page.is_last_page);
                    BatchItems::Files(page.items)
                }
            };

            self.in_flight = self.issue();
            if !items.is_empty() {
                return Ok(Some(Batch { path, items }));
            }
        }
    }

    fn enqueue(&mut self, folder: FolderDescriptor, path: String) {
        self.queue.push_back(PendingDir {
            folder,
            path,
            folders: PageCursor::new(self.folder_page),
            files: PageCursor::new(self.file_page),
        });
    }

    /// Spawn the request for the next page, dropping directories whose
    /// cursors are both exhausted.
    fn issue(&mut self) -> Option<JoinHandle<Result<Fetched>>> {
        loop {
            let front = self.queue.front()?;
            let listing = Arc::clone(&self.listing);
            let folder = front.folder.clone();
            if !front.folders.exhausted {
                let req = front.folders.request();
                return Some(tokio::spawn(async move {
                    listing.list_folders(&folder, req).await.map(Fetched::Folders)
                }));
            }
            if !front.files.exhausted {
                let req = front.files.request();
                return Some(tokio::spawn(async move {
                    listing.list_files(&folder, req).await.map(Fetched::Files)
                }));
            }
            self.queue.pop_front();
        }
    }
}

impl Drop for TreeWalker {
    fn drop(&mut self) {
        if let Some(h) = self.in_flight.take() {
            h.abort();
        }
    }
}
