use std::io::{Read, Seek, SeekFrom, Write};

use super::central::{fit_u16, fit_u32};
use super::local::{le16, le32};
use crate::error::{Result, ZipError};

pub const EOCD_MAGIC: u32 = 0x0605_4b50;
pub const EOCD_LEN: u64 = 22;
const MAX_COMMENT: u64 = u16::MAX as u64;

/// End of central directory record. Multi-volume archives are not produced,
/// so both disk numbers are zero and both entry counts are equal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndOfCentralDirectory {
    pub entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub fn write_to(&self, mut w: impl Write) -> Result<()> {
        let entries = fit_u16(self.entries as usize, "entry count")
            .map_err(|_| ZipError::Format(format!("{} entries exceed 65535", self.entries)))?;
        let cd_size = fit_u32(self.cd_size, "central directory size")?;
        let cd_offset = fit_u32(self.cd_offset, "central directory offset")?;
        let comment_len = fit_u16(self.comment.len(), "archive comment")?;

        let mut buf = Vec::with_capacity(EOCD_LEN as usize + self.comment.len());
        buf.extend_from_slice(&EOCD_MAGIC.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // this disk
        buf.extend_from_slice(&0u16.to_le_bytes()); // disk with central directory
        buf.extend_from_slice(&entries.to_le_bytes());
        buf.extend_from_slice(&entries.to_le_bytes());
        buf.extend_from_slice(&cd_size.to_le_bytes());
        buf.extend_from_slice(&cd_offset.to_le_bytes());
        buf.extend_from_slice(&comment_len.to_le_bytes());
        buf.extend_from_slice(&self.comment);
        w.write_all(&buf)?;
        Ok(())
    }

    fn parse(rec: &[u8]) -> Self {
        let comment_len = le16(&rec[20..22]) as usize;
        let end = (22 + comment_len).min(rec.len());
        Self {
            entries: le16(&rec[10..12]) as u64,
            cd_size: le32(&rec[12..16]) as u64,
            cd_offset: le32(&rec[16..20]) as u64,
            comment: rec[22..end].to_vec(),
        }
    }
}

/// Locate the EOCD by scanning backwards over a possible trailing comment.
pub fn read_eocd_at_eof<F: Read + Seek>(f: &mut F) -> Result<EndOfCentralDirectory> {
    let len = f.seek(SeekFrom::End(0))?;
    if len < EOCD_LEN {
        return Err(ZipError::Format("file too small for end of central directory".into()));
    }
    let window = len.min(EOCD_LEN + MAX_COMMENT);
    f.seek(SeekFrom::Start(len - window))?;
    let mut tail = vec![0u8; window as usize];
    f.read_exact(&mut tail)?;

    let last = tail.len() - EOCD_LEN as usize;
    for i in (0..=last).rev() {
        if le32(&tail[i..i + 4]) == EOCD_MAGIC {
            let comment_len = le16(&tail[i + 20..i + 22]) as usize;
            if i + EOCD_LEN as usize + comment_len == tail.len() {
                return Ok(EndOfCentralDirectory::parse(&tail[i..]));
            }
        }
    }
    Err(ZipError::Format("end of central directory not found".into()))
}
