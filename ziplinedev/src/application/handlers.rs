use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use zipline_core::error::{Result, ZipError};
use zipline_core::pack::pipeline::{BuildOptions, build_from_remote};
use zipline_core::policy::ArchivePolicy;
use zipline_core::remote_factory::{Backend, open_remote};
use zipline_core::remote_http::Access;
use zipline_core::{EncoderOptions, FolderDescriptor, RemoteHandle, Stats, extract, list, verify};

use crate::presentation::cli::GlobalArgs;

/// Policy file first, then individual flags on top.
pub fn policy_from_args(global: &GlobalArgs) -> Result<ArchivePolicy> {
    let mut policy = match &global.policy {
        Some(path) => ArchivePolicy::from_json_file(path)?,
        None => ArchivePolicy::default(),
    };
    if let Some(b) = global.memory_budget {
        policy.memory_budget = b;
    }
    if let Some(n) = global.max_chunk_items {
        policy.max_chunk_items = n;
    }
    Ok(policy.normalized())
}

pub fn access_from_args(
    token: Option<String>,
    share_token: Option<String>,
    share_password: Option<String>,
) -> Result<Access> {
    match (token, share_token) {
        (Some(token), None) => Ok(Access::Session { token }),
        (None, Some(token)) => Ok(Access::SharedLink {
            token,
            password: share_password,
        }),
        (Some(_), Some(_)) => Err(ZipError::Format(
            "--token and --share-token are mutually exclusive".into(),
        )),
        (None, None) => Err(ZipError::Format(
            "either --token or --share-token is required".into(),
        )),
    }
}

pub async fn handle_pack(global: &GlobalArgs, out: String, dir: PathBuf) -> Result<()> {
    let policy = policy_from_args(global)?;
    let (remote, root) = open_remote(Backend::Fs {
        root: dir,
        read_chunk: policy.read_chunk_size,
    })?;
    run_build(global, policy, remote, root, &out).await
}

pub async fn handle_fetch(
    global: &GlobalArgs,
    out: String,
    base_url: String,
    root: String,
    token: Option<String>,
    share_token: Option<String>,
    share_password: Option<String>,
) -> Result<()> {
    let policy = policy_from_args(global)?;
    let access = access_from_args(token, share_token, share_password)?;
    let (remote, root) = open_remote(Backend::Http {
        base_url,
        access,
        root_id: root,
    })?;
    run_build(global, policy, remote, root, &out).await
}

pub fn handle_list(archive: PathBuf) -> Result<()> {
    for e in list(&archive)? {
        let kind = if e.is_dir { "dir " } else { "file" };
        println!("{kind}  {}  {} bytes  crc={:08x}  off={}", e.path, e.size, e.crc32, e.offset);
    }
    Ok(())
}

pub fn handle_verify(archive: PathBuf) -> Result<()> {
    let stats = verify(&archive)?;
    println!(
        "ok: {} files, {} dirs, {} content bytes",
        stats.files, stats.dirs, stats.content_bytes
    );
    Ok(())
}

pub fn handle_extract(archive: PathBuf, dest: PathBuf) -> Result<()> {
    let stats = extract(&archive, &dest)?;
    info!(files = stats.files, dirs = stats.dirs, dest = %dest.display(), "extracted");
    Ok(())
}

async fn run_build(
    global: &GlobalArgs,
    policy: ArchivePolicy,
    remote: RemoteHandle,
    root: FolderDescriptor,
    out: &str,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = spawn_ctrl_c(cancel.clone());
    let spinner = spinner(global.quiet);
    let bar = spinner.clone();

    let opts = BuildOptions {
        policy,
        encoder: EncoderOptions {
            comment: global.comment.clone().unwrap_or_default(),
        },
        progress: Some(Arc::new(move |n: u64| bar.set_position(n))),
        cancel,
        default_modified: None,
    };

    let res = write_archive(root, &remote, out, &opts).await;
    ctrl_c.abort();

    match res {
        Ok(stats) => {
            spinner.finish_and_clear();
            info!(
                files = stats.files,
                dirs = stats.dirs,
                content_bytes = stats.content_bytes,
                archive_bytes = stats.archive_bytes,
                "archive written"
            );
            Ok(())
        }
        Err(e) => {
            spinner.abandon();
            Err(e)
        }
    }
}

/// Build into `out`, or stdout for `-`. A file left behind by a failed build
/// is removed.
async fn write_archive(
    root: FolderDescriptor,
    remote: &RemoteHandle,
    out: &str,
    opts: &BuildOptions,
) -> Result<Stats> {
    if out == "-" {
        return build_into(root, remote, tokio::io::stdout(), opts).await;
    }
    let path = Path::new(out);
    let file = tokio::fs::File::create(path).await?;
    let res = build_into(root, remote, file, opts).await;
    if res.is_err() {
        // partial archives are unusable
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(error = %e, path = %path.display(), "could not remove partial archive");
        }
    }
    res
}

async fn build_into<W>(
    root: FolderDescriptor,
    remote: &RemoteHandle,
    sink: W,
    opts: &BuildOptions,
) -> Result<Stats>
where
    W: AsyncWrite + Unpin + Send,
{
    let (_, stats) = build_from_remote(root, remote, sink, opts).await?;
    Ok(stats)
}

fn spawn_ctrl_c(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    })
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::with_template("{spinner} {bytes} written ({bytes_per_sec}) {elapsed}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn flags_override_policy_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"memory_budget": 4096, "max_chunk_items": 3}}"#).unwrap();
        let global = GlobalArgs {
            policy: Some(f.path().to_path_buf()),
            max_chunk_items: Some(9),
            ..Default::default()
        };
        let p = policy_from_args(&global).unwrap();
        assert_eq!(p.memory_budget, 4096);
        assert_eq!(p.max_chunk_items, 9);
        assert_eq!(p.file_page_size, 128);
    }

    #[test]
    fn access_needs_exactly_one_token() {
        assert_eq!(
            access_from_args(Some("s".into()), None, None).unwrap(),
            Access::Session { token: "s".into() }
        );
        assert_eq!(
            access_from_args(None, Some("l".into()), Some("pw".into())).unwrap(),
            Access::SharedLink {
                token: "l".into(),
                password: Some("pw".into())
            }
        );
        assert!(access_from_args(None, None, None).is_err());
        assert!(access_from_args(Some("s".into()), Some("l".into()), None).is_err());
    }

    #[tokio::test]
    async fn pack_then_verify_and_extract() {
        let td = tempfile::tempdir().unwrap();
        let src = td.path().join("src");
        std::fs::create_dir_all(src.join("inner")).unwrap();
        std::fs::write(src.join("a.txt"), b"alpha").unwrap();
        std::fs::write(src.join("inner/b.txt"), b"beta").unwrap();

        let out = td.path().join("out.zip");
        let global = GlobalArgs {
            quiet: true,
            comment: Some("test run".into()),
            ..Default::default()
        };
        handle_pack(&global, out.to_string_lossy().into_owned(), src)
            .await
            .unwrap();

        handle_verify(out.clone()).unwrap();
        let dest = td.path().join("dest");
        handle_extract(out, dest.clone()).unwrap();
        assert_eq!(std::fs::read(dest.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(std::fs::read(dest.join("inner/b.txt")).unwrap(), b"beta");
    }

    #[tokio::test]
    async fn missing_source_creates_no_file() {
        let td = tempfile::tempdir().unwrap();
        let out = td.path().join("out.zip");
        let global = GlobalArgs {
            quiet: true,
            ..Default::default()
        };
        let missing = td.path().join("missing");
        assert!(handle_pack(&global, out.to_string_lossy().into_owned(), missing).await.is_err());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn failed_build_removes_partial_archive() {
        let td = tempfile::tempdir().unwrap();
        let src = td.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.txt"), b"alpha").unwrap();
        let (remote, root) = open_remote(Backend::Fs {
            root: src,
            read_chunk: ArchivePolicy::default().read_chunk_size,
        })
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let opts = BuildOptions {
            cancel,
            ..Default::default()
        };
        let out = td.path().join("out.zip");
        let err = write_archive(root, &remote, &out.to_string_lossy(), &opts)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!out.exists());
    }
}
