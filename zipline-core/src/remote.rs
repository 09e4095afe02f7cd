// zipline_core/src/remote.rs
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::domain::{ByteStream, FileDescriptor, FolderDescriptor};
use crate::error::Result;

/// Offset/limit pair sent with one listing request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u64,
}

/// One page of a folder listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(rename = "isLastPage")]
    pub is_last_page: bool,
}

/// Paginated folder listing. Files and subfolders paginate independently.
pub trait Listing: Send + Sync {
    fn list_files(
        &self,
        folder: &FolderDescriptor,
        page: PageRequest,
    ) -> BoxFuture<'_, Result<Page<FileDescriptor>>>;

    fn list_folders(
        &self,
        folder: &FolderDescriptor,
        page: PageRequest,
    ) -> BoxFuture<'_, Result<Page<FolderDescriptor>>>;
}

/// Content download. Dropping the returned future or stream cancels it.
pub trait ContentFetcher: Send + Sync {
    fn fetch(&self, file: &FileDescriptor) -> BoxFuture<'_, Result<ByteStream>>;
}

/// A backend that can both list and fetch.
pub trait Remote: Listing + ContentFetcher {}

impl<T: Listing + ContentFetcher + ?Sized> Remote for T {}

/// One backend shared behind both collaborator interfaces.
#[derive(Clone)]
pub struct RemoteHandle {
    pub listing: Arc<dyn Listing>,
    pub fetcher: Arc<dyn ContentFetcher>,
}

impl RemoteHandle {
    pub fn new<R: Remote + 'static>(remote: R) -> Self {
        Self::from_arc(Arc::new(remote))
    }

    pub fn from_arc<R: Remote + 'static>(remote: Arc<R>) -> Self {
        Self {
            listing: remote.clone(),
            fetcher: remote,
        }
    }
}

/// Slice a fully known listing into the page `req` asks for.
pub fn paginate<T: Clone>(all: &[T], req: PageRequest) -> Page<T> {
    let start = (req.offset as usize).min(all.len());
    let end = start.saturating_add(req.limit as usize).min(all.len());
    Page {
        items: all[start..end].to_vec(),
        is_last_page: end >= all.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_walks_to_the_end() {
        let all: Vec<u32> = (0..5).collect();
        let p = paginate(&all, PageRequest { limit: 2, offset: 0 });
        assert_eq!(p.items, [0, 1]);
        assert!(!p.is_last_page);
        let p = paginate(&all, PageRequest { limit: 2, offset: 4 });
        assert_eq!(p.items, [4]);
        assert!(p.is_last_page);
        let p = paginate(&all, PageRequest { limit: 2, offset: 10 });
        assert!(p.items.is_empty());
        assert!(p.is_last_page);
    }

    #[test]
    fn page_json_shape() {
        let p: Page<FolderDescriptor> =
            serde_json::from_str(r#"{"items":[{"id":"1","name":"a"}],"isLastPage":true}"#)
                .unwrap();
        assert_eq!(p.items[0].name, "a");
        assert!(p.is_last_page);
    }
}
