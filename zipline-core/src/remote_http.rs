// zipline_core/src/remote_http.rs
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::{ByteStream, FileDescriptor, FolderDescriptor};
use crate::error::{Result, ZipError};
use crate::remote::{ContentFetcher, Listing, Page, PageRequest};

const LISTING_TIMEOUT: Duration = Duration::from_secs(30);

/// How requests prove they may read the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    /// Signed-in user.
    Session { token: String },
    /// Anonymous visitor of a shared link, optionally password protected.
    SharedLink {
        token: String,
        password: Option<String>,
    },
}

/// JSON drive API reachable over HTTP.
///
/// `GET {base}/folders/{id}/files?limit=&offset=` and `.../folders?...` answer
/// with a [`Page`]; `GET {base}/files/{id}/content` streams the file body.
#[derive(Clone, Debug)]
pub struct HttpRemote {
    client: Client,
    base: Url,
    access: Access,
}

impl HttpRemote {
    pub fn new(base_url: &str, access: Access) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| ZipError::Format(format!("base url '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ZipError::Format(format!("base url '{base_url}' cannot be a base")));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| ZipError::Format(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base,
            access,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn listing_url(&self, folder_id: &str, kind: &str, page: PageRequest) -> Url {
        let mut url = self.endpoint(&["folders", folder_id, kind]);
        url.query_pairs_mut()
            .append_pair("limit", &page.limit.to_string())
            .append_pair("offset", &page.offset.to_string());
        url
    }

    pub fn content_url(&self, file_id: &str) -> Url {
        self.endpoint(&["files", file_id, "content"])
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.access {
            Access::Session { token } => req.bearer_auth(token),
            Access::SharedLink { token, password } => {
                let req = req.header("X-Share-Token", token);
                match password {
                    Some(p) => req.header("X-Share-Password", p),
                    None => req,
                }
            }
        }
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        folder: &FolderDescriptor,
        kind: &str,
        page: PageRequest,
    ) -> Result<Page<T>> {
        let url = self.listing_url(&folder.id, kind, page);
        debug!(%url, "listing request");
        let req = self.authorize(self.client.get(url)).timeout(LISTING_TIMEOUT);
        let resp = req
            .send()
            .await
            .map_err(|e| ZipError::listing(folder.id.clone(), e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ZipError::listing(
                folder.id.clone(),
                format!("HTTP {}: {}", status.as_u16(), body.trim()),
            ));
        }
        resp.json::<Page<T>>()
            .await
            .map_err(|e| ZipError::listing(folder.id.clone(), e))
    }
}

impl Listing for HttpRemote {
    fn list_files(
        &self,
        folder: &FolderDescriptor,
        page: PageRequest,
    ) -> BoxFuture<'_, Result<Page<FileDescriptor>>> {
        let folder = folder.clone();
        async move { self.get_page(&folder, "files", page).await }.boxed()
    }

    fn list_folders(
        &self,
        folder: &FolderDescriptor,
        page: PageRequest,
    ) -> BoxFuture<'_, Result<Page<FolderDescriptor>>> {
        let folder = folder.clone();
        async move { self.get_page(&folder, "folders", page).await }.boxed()
    }
}

impl ContentFetcher for HttpRemote {
    fn fetch(&self, file: &FileDescriptor) -> BoxFuture<'_, Result<ByteStream>> {
        let url = self.content_url(&file.id);
        let name = file.name.clone();
        async move {
            // No timeout: large bodies take as long as they take.
            let resp = self
                .authorize(self.client.get(url))
                .send()
                .await
                .map_err(|e| ZipError::fetch(name.clone(), e))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(ZipError::fetch(name, format!("HTTP {}", status.as_u16())));
            }
            let s: ByteStream = resp
                .bytes_stream()
                .map_err(move |e| ZipError::fetch(name.clone(), e))
                .boxed();
            Ok(s)
        }
        .boxed()
    }
}
