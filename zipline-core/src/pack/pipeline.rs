//! Traversal, scheduling and encoding wired together.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::FolderDescriptor;
use crate::error::Result;
use crate::pack::scheduler::DownloadScheduler;
use crate::pack::walker::TreeWalker;
use crate::pack::writer::{EncoderOptions, ProgressCallback, ZipEncoder};
use crate::policy::ArchivePolicy;
use crate::remote::{ContentFetcher, Listing, RemoteHandle};
use crate::stats::Stats;

/// Everything a build needs besides the tree and the sink.
#[derive(Clone, Default)]
pub struct BuildOptions {
    pub policy: ArchivePolicy,
    pub encoder: EncoderOptions,
    pub progress: Option<ProgressCallback>,
    pub cancel: CancellationToken,
    /// Used for descriptors without a modification time. Defaults to the
    /// moment the build starts.
    pub default_modified: Option<OffsetDateTime>,
}

/// Stream the tree under `root` into `sink` as a ZIP archive.
///
/// On success the sink has been flushed and shut down and is handed back. On
/// failure the sink is shut down and whatever it received must be discarded.
pub async fn build_archive<W>(
    root: FolderDescriptor,
    listing: Arc<dyn Listing>,
    fetcher: Arc<dyn ContentFetcher>,
    sink: W,
    opts: &BuildOptions,
) -> Result<(W, Stats)>
where
    W: AsyncWrite + Unpin + Send,
{
    let policy = opts.policy.clone().normalized();
    let mut encoder =
        ZipEncoder::with_options(sink, opts.encoder.clone()).with_cancellation(opts.cancel.clone());
    if let Some(cb) = &opts.progress {
        encoder = encoder.with_progress(Arc::clone(cb));
    }
    let scheduler = DownloadScheduler::new(fetcher, &policy)
        .with_cancellation(opts.cancel.clone())
        .with_default_modified(opts.default_modified.unwrap_or_else(OffsetDateTime::now_utc));

    info!(root = %root.id, budget = policy.memory_budget, "building archive");
    let mut walker = TreeWalker::new(listing, root, &policy);
    match scheduler.run(&mut walker, &mut encoder).await {
        Ok(()) => {
            drop(walker);
            encoder.finish().await
        }
        Err(e) => {
            drop(walker);
            if e.is_cancelled() {
                warn!("archive build cancelled");
            } else {
                warn!(error = %e, "archive build failed");
            }
            encoder.abort().await;
            Err(e)
        }
    }
}

/// [`build_archive`] over a single backend.
pub async fn build_from_remote<W>(
    root: FolderDescriptor,
    remote: &RemoteHandle,
    sink: W,
    opts: &BuildOptions,
) -> Result<(W, Stats)>
where
    W: AsyncWrite + Unpin + Send,
{
    build_archive(
        root,
        Arc::clone(&remote.listing),
        Arc::clone(&remote.fetcher),
        sink,
        opts,
    )
    .await
}
