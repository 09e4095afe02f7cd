// zipline_core/src/remote_fs.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use time::OffsetDateTime;
use tokio_util::io::ReaderStream;
use walkdir::WalkDir;

use crate::domain::{ByteStream, FileDescriptor, FolderDescriptor};
use crate::error::{Result, ZipError};
use crate::policy::DEFAULT_READ_CHUNK_SIZE;
use crate::remote::{ContentFetcher, Listing, Page, PageRequest, paginate};

/// A local directory served through the remote interfaces.
///
/// Ids are `/`-separated paths relative to the root; the root itself is `""`.
/// Symlinks are skipped.
pub struct FsRemote {
    root: Arc<PathBuf>,
    read_chunk: usize,
}

impl FsRemote {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ZipError::Format(format!("{} is not a directory", root.display())));
        }
        Ok(Self {
            root: Arc::new(root),
            read_chunk: DEFAULT_READ_CHUNK_SIZE,
        })
    }

    pub fn with_read_chunk(mut self, n: usize) -> Self {
        self.read_chunk = n.max(1);
        self
    }

    pub fn root_folder(&self) -> FolderDescriptor {
        FolderDescriptor::new("", "")
    }

    fn list_dir<T, F>(&self, folder: &FolderDescriptor, req: PageRequest, pick: F) -> BoxFuture<'_, Result<Page<T>>>
    where
        T: Clone + Send + 'static,
        F: Fn(&str, &walkdir::DirEntry) -> Option<Result<T>> + Send + 'static,
    {
        let root = Arc::clone(&self.root);
        let id = folder.id.clone();
        async move {
            let dir = resolve(&root, &id);
            let folder_id = id.clone();
            let all = tokio::task::spawn_blocking(move || -> Result<Vec<T>> {
                let mut out = Vec::new();
                for e in WalkDir::new(&dir)
                    .min_depth(1)
                    .max_depth(1)
                    .follow_links(false)
                    .sort_by_file_name()
                {
                    let e = e.map_err(|e| ZipError::listing(folder_id.clone(), e))?;
                    if let Some(item) = pick(&folder_id, &e) {
                        out.push(item?);
                    }
                }
                Ok(out)
            })
            .await
            .map_err(|e| ZipError::listing(id.clone(), e))??;
            Ok(paginate(&all, req))
        }
        .boxed()
    }
}

fn resolve(root: &Path, id: &str) -> PathBuf {
    if id.is_empty() {
        root.to_path_buf()
    } else {
        root.join(id)
    }
}

fn child_id(parent: &str, e: &walkdir::DirEntry) -> (String, String) {
    let name = e.file_name().to_string_lossy().into_owned();
    let id = if parent.is_empty() {
        name.clone()
    } else {
        format!("{parent}/{name}")
    };
    (id, name)
}

fn mtime(parent: &str, e: &walkdir::DirEntry) -> Result<(u64, Option<OffsetDateTime>)> {
    let meta = e.metadata().map_err(|err| ZipError::listing(parent, err))?;
    let modified = meta.modified().ok().map(OffsetDateTime::from);
    Ok((meta.len(), modified))
}

impl Listing for FsRemote {
    fn list_files(
        &self,
        folder: &FolderDescriptor,
        page: PageRequest,
    ) -> BoxFuture<'_, Result<Page<FileDescriptor>>> {
        self.list_dir(folder, page, |parent, e| {
            if !e.file_type().is_file() {
                return None;
            }
            let (id, name) = child_id(parent, e);
            Some(mtime(parent, e).map(|(size, modified)| FileDescriptor {
                id,
                name,
                size,
                modified,
            }))
        })
    }

    fn list_folders(
        &self,
        folder: &FolderDescriptor,
        page: PageRequest,
    ) -> BoxFuture<'_, Result<Page<FolderDescriptor>>> {
        self.list_dir(folder, page, |parent, e| {
            if !e.file_type().is_dir() {
                return None;
            }
            let (id, name) = child_id(parent, e);
            Some(mtime(parent, e).map(|(_, modified)| FolderDescriptor { id, name, modified }))
        })
    }
}

impl ContentFetcher for FsRemote {
    fn fetch(&self, file: &FileDescriptor) -> BoxFuture<'_, Result<ByteStream>> {
        let path = resolve(&self.root, &file.id);
        let id = file.id.clone();
        let chunk = self.read_chunk;
        async move {
            let f = tokio::fs::File::open(&path)
                .await
                .map_err(|e| ZipError::fetch(id.clone(), e))?;
            let s: ByteStream = ReaderStream::with_capacity(f, chunk)
                .map(move |r| r.map_err(|e| ZipError::fetch(id.clone(), e)))
                .boxed();
            Ok(s)
        }
        .boxed()
    }
}
