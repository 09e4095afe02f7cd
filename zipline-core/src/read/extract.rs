use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::codec::CodecId;
use crate::codec::crc::Crc32;
use crate::container::central::CentralRecord;
use crate::error::{Result, ZipError};
use crate::read::central::{data_offset, read_central_directory};
use crate::stats::Stats;
use crate::util::sanitize::safe_join;

const COPY_BUF: usize = 64 * 1024;

/// One row of an archive listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub path: String,
    pub size: u64,
    pub crc32: u32,
    pub is_dir: bool,
    pub offset: u64,
    #[serde(with = "time::serde::timestamp::option")]
    pub modified: Option<OffsetDateTime>,
}

impl From<&CentralRecord> for EntryInfo {
    fn from(r: &CentralRecord) -> Self {
        Self {
            path: r.name_lossy(),
            size: r.uncompressed_size,
            crc32: r.crc32,
            is_dir: r.is_dir(),
            offset: r.header_offset,
            modified: r.modified.to_datetime(),
        }
    }
}

pub fn list(archive: &Path) -> Result<Vec<EntryInfo>> {
    let mut f = BufReader::new(File::open(archive)?);
    let cd = read_central_directory(&mut f)?;
    Ok(cd.records.iter().map(EntryInfo::from).collect())
}

/// Re-read every entry and compare its CRC-32 and size with the central
/// directory. Returns the totals of what was checked.
pub fn verify(archive: &Path) -> Result<Stats> {
    let mut f = BufReader::new(File::open(archive)?);
    let total = f.seek(SeekFrom::End(0))?;
    let cd = read_central_directory(&mut f)?;
    let mut stats = Stats {
        archive_bytes: total,
        ..Default::default()
    };
    for rec in &cd.records {
        copy_entry(&mut f, rec, &mut std::io::sink())?;
        if rec.is_dir() {
            stats.dirs += 1;
        } else {
            stats.files += 1;
            stats.content_bytes += rec.uncompressed_size;
        }
    }
    debug!(entries = stats.entries(), "archive verified");
    Ok(stats)
}

/// Write every entry under `dest`. Entry names that would land outside
/// `dest` are refused.
pub fn extract(archive: &Path, dest: &Path) -> Result<Stats> {
    let mut f = BufReader::new(File::open(archive)?);
    let total = f.seek(SeekFrom::End(0))?;
    let cd = read_central_directory(&mut f)?;
    let mut stats = Stats {
        archive_bytes: total,
        ..Default::default()
    };
    fs::create_dir_all(dest)?;

    for rec in &cd.records {
        let name = rec.name_lossy();
        let out = safe_join(dest, &name)?;
        if rec.is_dir() {
            fs::create_dir_all(&out)?;
            stats.dirs += 1;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut w = File::create(&out)?;
        copy_entry(&mut f, rec, &mut w)?;
        w.flush()?;
        stats.files += 1;
        stats.content_bytes += rec.uncompressed_size;
    }
    Ok(stats)
}

/// Copy the stored content of `rec` into `out`, checking CRC-32 and length.
fn copy_entry<R: Read + Seek>(f: &mut R, rec: &CentralRecord, out: &mut impl Write) -> Result<()> {
    let name = rec.name_lossy();
    if CodecId::from_u16(rec.method).is_none() {
        return Err(ZipError::Format(format!(
            "'{name}': unsupported compression method {}",
            rec.method
        )));
    }
    if rec.compressed_size != rec.uncompressed_size {
        return Err(ZipError::Format(format!(
            "'{name}': stored entry with differing sizes"
        )));
    }

    let start = data_offset(f, rec)?;
    f.seek(SeekFrom::Start(start))?;
    let mut remaining = rec.compressed_size;
    let mut crc = Crc32::new();
    let mut buf = vec![0u8; COPY_BUF];
    while remaining > 0 {
        let want = remaining.min(COPY_BUF as u64) as usize;
        let n = f.read(&mut buf[..want])?;
        if n == 0 {
            return Err(ZipError::Format(format!("'{name}': content truncated")));
        }
        crc.update(&buf[..n]);
        out.write_all(&buf[..n])?;
        remaining -= n as u64;
    }

    let got = crc.finalize();
    if got != rec.crc32 {
        return Err(ZipError::Format(format!(
            "'{name}': crc mismatch (stored {:08x}, computed {got:08x})",
            rec.crc32
        )));
    }
    Ok(())
}
