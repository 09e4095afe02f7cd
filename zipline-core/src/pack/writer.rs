//! Streaming ZIP encoder.
//!
//! Entries are written strictly in call order to a write-once sink. Sizes and
//! CRCs are unknown when a local header goes out, so every header carries the
//! data-descriptor flag and the real values follow the content. Nothing that
//! was written is ever revisited; the central directory is assembled from the
//! records kept in memory and emitted by [`ZipEncoder::finish`].

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use time::OffsetDateTime;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::CodecId;
use crate::codec::crc::Crc32;
use crate::container::central::{ATTR_DIRECTORY, CentralRecord, fit_u32};
use crate::container::eocd::EndOfCentralDirectory;
use crate::container::local::{DataDescriptor, LocalHeader, STREAMING_FLAGS};
use crate::domain::{ArchiveEntry, ContentSource, EntryKind};
use crate::error::{Result, ZipError};
use crate::stats::Stats;
use crate::util::dostime::DosDateTime;
use crate::util::sanitize::archive_path;

/// Invoked with the cumulative number of bytes written to the sink.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

const MAX_ENTRIES: usize = u16::MAX as usize;

#[derive(Clone, Debug, Default)]
pub struct EncoderOptions {
    /// Archive comment stored in the end of central directory record.
    pub comment: String,
}

/// Where the entry being written currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryPhase {
    Queued,
    Streaming,
    Closed,
}

enum State {
    Open,
    /// A previous call failed; the output is void.
    Poisoned { path: Option<String>, phase: EntryPhase },
}

pub struct ZipEncoder<W> {
    sink: W,
    offset: u64,
    records: Vec<CentralRecord>,
    by_path: HashMap<String, usize>,
    state: State,
    comment: Vec<u8>,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
    stats: Stats,
    current: Option<(String, EntryPhase)>,
}

impl<W: AsyncWrite + Unpin + Send> ZipEncoder<W> {
    pub fn new(sink: W) -> Self {
        Self::with_options(sink, EncoderOptions::default())
    }

    pub fn with_options(sink: W, opts: EncoderOptions) -> Self {
        Self {
            sink,
            offset: 0,
            records: Vec::new(),
            by_path: HashMap::new(),
            state: State::Open,
            comment: opts.comment.into_bytes(),
            progress: None,
            cancel: CancellationToken::new(),
            stats: Stats::default(),
            current: None,
        }
    }

    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Bytes emitted so far; also the offset of the next header.
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Records of closed entries, in enqueue order.
    pub fn records(&self) -> &[CentralRecord] {
        &self.records
    }

    pub fn is_poisoned(&self) -> bool {
        matches!(self.state, State::Poisoned { .. })
    }

    pub async fn add_entry(&mut self, entry: ArchiveEntry) -> Result<()> {
        match (entry.kind, entry.content) {
            (EntryKind::Directory, _) => self.add_directory(&entry.path, entry.modified).await,
            (EntryKind::File, Some(src)) => self.add_file(&entry.path, entry.modified, src).await,
            (EntryKind::File, None) => {
                self.add_file(&entry.path, entry.modified, Vec::new().into())
                    .await
            }
        }
    }

    /// Write a directory marker. The path gains a trailing `/`.
    pub async fn add_directory(&mut self, path: &str, modified: OffsetDateTime) -> Result<()> {
        self.ensure_open()?;
        let res = self.write_directory(path, modified).await;
        self.settle(res)
    }

    /// Write a file entry, reading `source` to exhaustion.
    pub async fn add_file(
        &mut self,
        path: &str,
        modified: OffsetDateTime,
        source: ContentSource,
    ) -> Result<()> {
        self.ensure_open()?;
        let res = self.write_file(path, modified, source).await;
        self.settle(res)
    }

    /// Emit the central directory and end record, then close the sink.
    pub async fn finish(mut self) -> Result<(W, Stats)> {
        self.ensure_open()?;
        let cd_offset = self.offset;
        let mut buf = Vec::new();
        for r in &self.records {
            r.write_to(&mut buf)?;
        }
        let cd_size = buf.len() as u64;
        EndOfCentralDirectory {
            entries: self.records.len() as u64,
            cd_size,
            cd_offset,
            comment: std::mem::take(&mut self.comment),
        }
        .write_to(&mut buf)?;
        self.write_out(&buf).await?;
        self.sink.flush().await.map_err(ZipError::Sink)?;
        self.sink.shutdown().await.map_err(ZipError::Sink)?;

        self.stats.archive_bytes = self.offset;
        info!(
            files = self.stats.files,
            dirs = self.stats.dirs,
            bytes = self.offset,
            "archive finished"
        );
        Ok((self.sink, self.stats))
    }

    /// Close the sink without finalizing. Whatever was written is void.
    pub async fn abort(mut self) {
        warn!(bytes = self.offset, "archive aborted; partial output is void");
        if let Err(e) = self.sink.shutdown().await {
            debug!(error = %e, "sink shutdown after abort failed");
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match &self.state {
            State::Open if self.cancel.is_cancelled() => Err(ZipError::Cancelled),
            State::Open => Ok(()),
            State::Poisoned { path, phase } => Err(ZipError::Format(match path {
                Some(p) => format!("encoder unusable after failure on '{p}' ({phase:?})"),
                None => "encoder unusable after earlier failure".into(),
            })),
        }
    }

    fn settle(&mut self, res: Result<()>) -> Result<()> {
        let current = self.current.take();
        if res.is_err() {
            let (path, phase) = match current {
                Some((p, ph)) => (Some(p), ph),
                None => (None, EntryPhase::Queued),
            };
            self.state = State::Poisoned { path, phase };
        }
        res
    }

    /// Reserve `name` for the next record. Fails before any byte is written.
    fn claim(&mut self, name: &str) -> Result<()> {
        if self.by_path.contains_key(name) {
            return Err(ZipError::DuplicatePath(name.to_string()));
        }
        if self.records.len() >= MAX_ENTRIES {
            return Err(ZipError::Format(format!(
                "archive cannot hold more than {MAX_ENTRIES} entries"
            )));
        }
        fit_u32(self.offset, "local header offset")?;
        self.by_path.insert(name.to_string(), self.records.len());
        self.current = Some((name.to_string(), EntryPhase::Queued));
        Ok(())
    }

    fn set_phase(&mut self, phase: EntryPhase) {
        if let Some((_, p)) = self.current.as_mut() {
            *p = phase;
        }
    }

    async fn write_header(&mut self, name: &str, modified: DosDateTime) -> Result<()> {
        let header = LocalHeader::streaming(name.as_bytes(), CodecId::Store as u16, modified);
        let mut buf = Vec::with_capacity(header.encoded_len() as usize);
        header
            .write_to(&mut buf)
            .map_err(|e| ZipError::Format(format!("{name}: {e}")))?;
        self.emit(&buf).await
    }

    async fn write_directory(&mut self, path: &str, modified: OffsetDateTime) -> Result<()> {
        let name = archive_path(path, true)?;
        self.claim(&name)?;
        let dos = DosDateTime::from_datetime(modified);
        let header_offset = self.offset;

        self.write_header(&name, dos).await?;
        let mut buf = Vec::with_capacity(16);
        DataDescriptor::default().write_to(&mut buf)?;
        self.emit(&buf).await?;

        self.records.push(CentralRecord {
            name: name.clone().into_bytes(),
            comment: Vec::new(),
            flags: STREAMING_FLAGS,
            method: CodecId::Store as u16,
            modified: dos,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            header_offset,
            external_attrs: ATTR_DIRECTORY,
        });
        self.set_phase(EntryPhase::Closed);
        self.stats.dirs += 1;
        debug!(path = %name, offset = header_offset, "directory closed");
        Ok(())
    }

    async fn write_file(
        &mut self,
        path: &str,
        modified: OffsetDateTime,
        source: ContentSource,
    ) -> Result<()> {
        let name = archive_path(path, false)?;
        self.claim(&name)?;
        let dos = DosDateTime::from_datetime(modified);
        let header_offset = self.offset;

        self.write_header(&name, dos).await?;
        self.set_phase(EntryPhase::Streaming);

        let cancel = self.cancel.clone();
        let mut crc = Crc32::new();
        let mut stream = source.into_stream();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ZipError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            crc.update(&chunk);
            fit_u32(crc.len(), "entry size")?;
            self.emit(&chunk).await?;
        }

        let size = crc.len();
        let crc32 = crc.finalize();
        let mut buf = Vec::with_capacity(16);
        DataDescriptor {
            crc32,
            compressed_size: size as u32,
            uncompressed_size: size as u32,
        }
        .write_to(&mut buf)?;
        self.emit(&buf).await?;

        self.records.push(CentralRecord {
            name: name.clone().into_bytes(),
            comment: Vec::new(),
            flags: STREAMING_FLAGS,
            method: CodecId::Store as u16,
            modified: dos,
            crc32,
            compressed_size: size,
            uncompressed_size: size,
            header_offset,
            external_attrs: 0,
        });
        self.set_phase(EntryPhase::Closed);
        self.stats.files += 1;
        self.stats.content_bytes += size;
        debug!(path = %name, size, crc = format_args!("{crc32:08x}"), "file closed");
        Ok(())
    }

    /// Forward entry bytes. The central directory starts where the last entry
    /// ends, so entry data may not run past a 32-bit offset.
    async fn emit(&mut self, buf: &[u8]) -> Result<()> {
        fit_u32(self.offset + buf.len() as u64, "central directory offset")?;
        self.write_out(buf).await
    }

    /// Forward bytes to the sink, honoring its back-pressure and the
    /// cancellation signal.
    async fn write_out(&mut self, buf: &[u8]) -> Result<()> {
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ZipError::Cancelled),
            res = self.sink.write_all(buf) => res.map_err(ZipError::Sink)?,
        }
        self.offset += buf.len() as u64;
        if let Some(cb) = &self.progress {
            cb(self.offset);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::crc::checksum;
    use crate::domain::ByteStream;
    use crate::container::local::{DESCRIPTOR_LEN, HEADER_LEN};
    use bytes::Bytes;
    use futures::stream;
    use std::io::{Cursor, Read};
    use std::sync::Mutex;
    use time::macros::datetime;

    const T: OffsetDateTime = datetime!(2024-05-01 10:20:30 UTC);

    fn chunks(parts: &[&'static [u8]]) -> ContentSource {
        let items: Vec<Result<Bytes>> = parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        ContentSource::Streaming(stream::iter(items).boxed())
    }

    fn open(bytes: Vec<u8>) -> zip::ZipArchive<Cursor<Vec<u8>>> {
        zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip")
    }

    #[tokio::test]
    async fn empty_archive_is_a_bare_end_record() {
        let (out, stats) = ZipEncoder::new(Vec::new()).finish().await.unwrap();
        assert_eq!(out.len(), 22);
        assert_eq!(&out[..4], &[0x50, 0x4b, 0x05, 0x06]);
        assert_eq!(stats.entries(), 0);
        assert_eq!(open(out).len(), 0);
    }

    #[tokio::test]
    async fn scenario_files_and_directory_round_trip() {
        let big: Vec<u8> = (0..10 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
        let big_chunks: Vec<Result<Bytes>> = big
            .chunks(64 * 1024)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        let mut enc = ZipEncoder::new(Vec::new());
        enc.add_file("a.txt", T, Vec::new().into()).await.unwrap();
        enc.add_file(
            "b.bin",
            T,
            ContentSource::Streaming(stream::iter(big_chunks).boxed()),
        )
        .await
        .unwrap();
        enc.add_file("c.txt", T, b"hello, world".as_slice().into())
            .await
            .unwrap();
        enc.add_directory("sub", T).await.unwrap();
        let (out, stats) = enc.finish().await.unwrap();
        assert_eq!(stats.files, 3);
        assert_eq!(stats.dirs, 1);

        let mut z = open(out);
        let names: Vec<String> = (0..z.len())
            .map(|i| z.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, ["a.txt", "b.bin", "c.txt", "sub/"]);

        let a = z.by_index(0).unwrap();
        assert_eq!(a.crc32(), 0);
        assert_eq!(a.size(), 0);
        drop(a);

        let mut b = z.by_index(1).unwrap();
        assert_eq!(b.crc32(), checksum(&big));
        let mut got = Vec::new();
        b.read_to_end(&mut got).unwrap();
        assert_eq!(got, big);
        drop(b);

        let mut c = z.by_index(2).unwrap();
        let mut got = Vec::new();
        c.read_to_end(&mut got).unwrap();
        assert_eq!(got, b"hello, world");
        drop(c);

        assert!(z.by_index(3).unwrap().is_dir());
    }

    #[tokio::test]
    async fn offsets_increase_and_match_layout() {
        let mut enc = ZipEncoder::new(Vec::new());
        enc.add_file("x", T, chunks(&[b"ab", b"", b"cde"])).await.unwrap();
        enc.add_directory("d/", T).await.unwrap();
        enc.add_file("d/y", T, b"z".as_slice().into()).await.unwrap();

        let recs = enc.records().to_vec();
        assert_eq!(recs[0].header_offset, 0);
        assert_eq!(recs[0].uncompressed_size, 5);
        assert_eq!(recs[0].crc32, checksum(b"abcde"));
        assert_eq!(recs[1].header_offset, HEADER_LEN + 1 + 5 + DESCRIPTOR_LEN);
        assert_eq!(recs[2].header_offset, recs[1].header_offset + HEADER_LEN + 2 + DESCRIPTOR_LEN);
        assert!(recs.windows(2).all(|w| w[0].header_offset < w[1].header_offset));
        assert_eq!(enc.bytes_written(), recs[2].header_offset + HEADER_LEN + 3 + 1 + DESCRIPTOR_LEN);
    }

    #[tokio::test]
    async fn duplicate_path_writes_nothing_and_poisons() {
        let mut enc = ZipEncoder::new(Vec::new());
        enc.add_file("a.txt", T, b"1".as_slice().into()).await.unwrap();
        let before = enc.bytes_written();
        let err = enc
            .add_file("/a.txt", T, b"2".as_slice().into())
            .await
            .unwrap_err();
        assert!(matches!(err, ZipError::DuplicatePath(ref p) if p == "a.txt"));
        assert_eq!(enc.bytes_written(), before);
        assert!(enc.is_poisoned());
        assert!(enc.add_directory("b", T).await.is_err());
        assert!(enc.finish().await.is_err());
    }

    #[tokio::test]
    async fn entries_past_32_bit_offsets_fail_before_writing() {
        let mut enc = ZipEncoder::new(Vec::new());
        enc.offset = u64::from(u32::MAX) - 100;
        let start = enc.offset;
        let err = enc
            .add_file("a.txt", T, vec![0u8; 200].into())
            .await
            .unwrap_err();
        assert!(matches!(err, ZipError::Format(ref m) if m.contains("central directory offset")));
        // only the local header made it out
        assert_eq!(enc.bytes_written(), start + HEADER_LEN + 5);
        assert_eq!(enc.sink.len() as u64, HEADER_LEN + 5);
        assert!(enc.is_poisoned());
    }

    #[tokio::test]
    async fn add_entry_covers_both_kinds() {
        let mut enc = ZipEncoder::new(Vec::new());
        enc.add_entry(ArchiveEntry::directory("d", None)).await.unwrap();
        enc.add_entry(ArchiveEntry::file("d/x", Some(T), b"hi".to_vec()))
            .await
            .unwrap();
        enc.add_entry(ArchiveEntry {
            path: "d/empty".into(),
            kind: EntryKind::File,
            content: None,
            modified: T,
        })
        .await
        .unwrap();
        let (out, stats) = enc.finish().await.unwrap();
        assert_eq!((stats.files, stats.dirs), (2, 1));

        let mut z = open(out);
        assert_eq!(z.len(), 3);
        assert!(z.by_index(0).unwrap().is_dir());
        assert_eq!(z.by_index(0).unwrap().name(), "d/");
        let mut x = z.by_index(1).unwrap();
        let mut got = Vec::new();
        x.read_to_end(&mut got).unwrap();
        assert_eq!((x.name(), got.as_slice()), ("d/x", b"hi".as_slice()));
        drop(x);
        assert_eq!(z.by_index(2).unwrap().size(), 0);
    }

    #[tokio::test]
    async fn duplicate_directory_is_rejected() {
        let mut enc = ZipEncoder::new(Vec::new());
        enc.add_directory("sub", T).await.unwrap();
        let err = enc.add_directory("sub/", T).await.unwrap_err();
        assert!(matches!(err, ZipError::DuplicatePath(_)));
    }

    #[tokio::test]
    async fn content_failure_propagates() {
        let items: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"part")),
            Err(ZipError::fetch("f", "connection reset")),
        ];
        let mut enc = ZipEncoder::new(Vec::new());
        let err = enc
            .add_file("f", T, ContentSource::Streaming(stream::iter(items).boxed()))
            .await
            .unwrap_err();
        assert!(matches!(err, ZipError::Fetch { .. }));
        assert!(enc.is_poisoned());
    }

    #[tokio::test]
    async fn cancellation_stops_streaming() {
        let token = CancellationToken::new();
        let t2 = token.clone();
        let items: ByteStream = stream::iter(0..)
            .map(move |i| {
                if i == 3 {
                    t2.cancel();
                }
                Ok(Bytes::from_static(b"chunk"))
            })
            .boxed();
        let mut enc = ZipEncoder::new(Vec::new()).with_cancellation(token);
        let err = enc
            .add_file("endless", T, ContentSource::Streaming(items))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        // header plus the chunks read before the signal was observed
        assert!(enc.bytes_written() <= HEADER_LEN + 7 + 4 * 5);
        assert!(enc.add_directory("more", T).await.is_err());
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_total() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s2 = Arc::clone(&seen);
        let mut enc = ZipEncoder::new(Vec::new())
            .with_progress(Arc::new(move |n: u64| s2.lock().unwrap().push(n)));
        enc.add_file("a", T, chunks(&[b"12", b"345"])).await.unwrap();
        enc.add_directory("b", T).await.unwrap();
        let (out, _) = enc.finish().await.unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), out.len() as u64);
    }

    #[tokio::test]
    async fn archive_comment_is_stored() {
        let opts = EncoderOptions {
            comment: "exported".into(),
        };
        let mut enc = ZipEncoder::with_options(Vec::new(), opts);
        enc.add_file("a", T, b"x".as_slice().into()).await.unwrap();
        let (out, _) = enc.finish().await.unwrap();
        assert!(out.ends_with(b"exported"));
        assert_eq!(open(out).comment(), b"exported");
    }

    #[tokio::test]
    async fn sink_failure_is_reported_as_sink_error() {
        struct Broken;
        impl AsyncWrite for Broken {
            fn poll_write(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
                _: &[u8],
            ) -> std::task::Poll<std::io::Result<usize>> {
                std::task::Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
            }
            fn poll_flush(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }
            fn poll_shutdown(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }
        }

        let mut enc = ZipEncoder::new(Broken);
        let err = enc.add_directory("d", T).await.unwrap_err();
        assert!(matches!(err, ZipError::Sink(_)));
        enc.abort().await;
    }
}
