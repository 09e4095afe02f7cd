use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::container::central::CentralRecord;
use crate::container::eocd::{EndOfCentralDirectory, read_eocd_at_eof};
use crate::container::local::{HEADER_LEN, LocalHeader};
use crate::error::{Result, ZipError};

/// Trailing directory of an archive.
#[derive(Debug, Clone)]
pub struct CentralDirectory {
    pub end: EndOfCentralDirectory,
    pub records: Vec<CentralRecord>,
}

pub fn read_central_directory<F: Read + Seek>(f: &mut F) -> Result<CentralDirectory> {
    let end = read_eocd_at_eof(f)?;
    let archive_len = f.seek(SeekFrom::End(0))?;
    if end.cd_offset.saturating_add(end.cd_size) > archive_len {
        return Err(ZipError::Format(format!(
            "central directory ({} bytes at {}) runs past end of archive ({archive_len})",
            end.cd_size, end.cd_offset
        )));
    }

    f.seek(SeekFrom::Start(end.cd_offset))?;
    let mut r = BufReader::new(f.by_ref().take(end.cd_size));
    let mut records = Vec::with_capacity(end.entries as usize);
    for i in 0..end.entries {
        let rec = CentralRecord::read_from(&mut r)
            .map_err(|e| ZipError::Format(format!("central record {i}: {e}")))?;
        records.push(rec);
    }
    Ok(CentralDirectory { end, records })
}

/// Offset of the first content byte of `rec`, past its local header.
pub fn data_offset<F: Read + Seek>(f: &mut F, rec: &CentralRecord) -> Result<u64> {
    f.seek(SeekFrom::Start(rec.header_offset))?;
    let local = LocalHeader::read_from(&mut *f).map_err(|e| {
        ZipError::Format(format!("local header of '{}': {e}", rec.name_lossy()))
    })?;
    if local.name != rec.name {
        return Err(ZipError::Format(format!(
            "local header name does not match central record '{}'",
            rec.name_lossy()
        )));
    }
    Ok(rec.header_offset + HEADER_LEN + local.name.len() as u64 + local.extra_len as u64)
}
