use std::io::{Read, Write};

use super::local::{VERSION_NEEDED, le16, le32};
use crate::error::{Result, ZipError};
use crate::util::dostime::DosDateTime;

pub const CENTRAL_MAGIC: u32 = 0x0201_4b50;
pub const ENTRY_SIZE: u64 = 46;

/// MS-DOS directory attribute.
pub const ATTR_DIRECTORY: u32 = 0x10;

/// Per-entry summary kept by the encoder until the central directory is
/// written, and recovered by the reader from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralRecord {
    pub name: Vec<u8>,
    pub comment: Vec<u8>,
    pub flags: u16,
    pub method: u16,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub header_offset: u64,
    pub external_attrs: u32,
}

impl CentralRecord {
    pub fn is_dir(&self) -> bool {
        self.name.last() == Some(&b'/') || self.external_attrs & ATTR_DIRECTORY != 0
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    pub fn encoded_len(&self) -> u64 {
        ENTRY_SIZE + self.name.len() as u64 + self.comment.len() as u64
    }

    pub fn write_to(&self, mut w: impl Write) -> Result<()> {
        let name_len = fit_u16(self.name.len(), "entry name")?;
        let comment_len = fit_u16(self.comment.len(), "entry comment")?;
        let csize = fit_u32(self.compressed_size, "entry size")?;
        let uncompressed = fit_u32(self.uncompressed_size, "entry size")?;
        let offset = fit_u32(self.header_offset, "local header offset")?;

        let mut buf = Vec::with_capacity(self.encoded_len() as usize);
        buf.extend_from_slice(&CENTRAL_MAGIC.to_le_bytes());
        buf.extend_from_slice(&VERSION_NEEDED.to_le_bytes()); // made by
        buf.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.method.to_le_bytes());
        buf.extend_from_slice(&self.modified.time.to_le_bytes());
        buf.extend_from_slice(&self.modified.date.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        buf.extend_from_slice(&csize.to_le_bytes());
        buf.extend_from_slice(&uncompressed.to_le_bytes());
        buf.extend_from_slice(&name_len.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // extra
        buf.extend_from_slice(&comment_len.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        buf.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        buf.extend_from_slice(&self.external_attrs.to_le_bytes());
        buf.extend_from_slice(&offset.to_le_bytes());
        buf.extend_from_slice(&self.name);
        buf.extend_from_slice(&self.comment);
        w.write_all(&buf)?;
        Ok(())
    }

    pub fn read_from(mut r: impl Read) -> std::io::Result<Self> {
        let mut e = [0u8; ENTRY_SIZE as usize];
        r.read_exact(&mut e)?;
        if le32(&e[0..4]) != CENTRAL_MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "bad central directory magic",
            ));
        }
        let name_len = le16(&e[28..30]) as usize;
        let extra_len = le16(&e[30..32]) as usize;
        let comment_len = le16(&e[32..34]) as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let mut extra = vec![0u8; extra_len];
        r.read_exact(&mut extra)?;
        let mut comment = vec![0u8; comment_len];
        r.read_exact(&mut comment)?;
        Ok(Self {
            name,
            comment,
            flags: le16(&e[8..10]),
            method: le16(&e[10..12]),
            modified: DosDateTime {
                time: le16(&e[12..14]),
                date: le16(&e[14..16]),
            },
            crc32: le32(&e[16..20]),
            compressed_size: le32(&e[20..24]) as u64,
            uncompressed_size: le32(&e[24..28]) as u64,
            external_attrs: le32(&e[38..42]),
            header_offset: le32(&e[42..46]) as u64,
        })
    }
}

pub(crate) fn fit_u16(v: usize, what: &str) -> Result<u16> {
    u16::try_from(v).map_err(|_| ZipError::Format(format!("{what} exceeds 65535 bytes")))
}

pub(crate) fn fit_u32(v: u64, what: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| ZipError::Format(format!("{what} {v} exceeds the 4 GiB limit")))
}
