use std::io::{Read, Write};

use crate::util::dostime::DosDateTime;

pub const LOCAL_MAGIC: u32 = 0x0403_4b50;
pub const DESCRIPTOR_MAGIC: u32 = 0x0807_4b50;

/// Fixed part of a local file header, before the name.
pub const HEADER_LEN: u64 = 30;
/// Signed data descriptor: magic, crc, compressed and uncompressed size.
pub const DESCRIPTOR_LEN: u64 = 16;

pub const VERSION_NEEDED: u16 = 20;
/// CRC and sizes follow the content in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// Name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;
pub const STREAMING_FLAGS: u16 = FLAG_DATA_DESCRIPTOR | FLAG_UTF8;

/// Local file header as written ahead of each entry. CRC and sizes are
/// always zero here; the data descriptor carries the real values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHeader {
    pub flags: u16,
    pub method: u16,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: Vec<u8>,
    pub extra_len: u16,
}

impl LocalHeader {
    pub fn streaming(name: &[u8], method: u16, modified: DosDateTime) -> Self {
        Self {
            flags: STREAMING_FLAGS,
            method,
            modified,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name: name.to_vec(),
            extra_len: 0,
        }
    }

    /// Bytes this header occupies in the stream, name included.
    pub fn encoded_len(&self) -> u64 {
        HEADER_LEN + self.name.len() as u64 + self.extra_len as u64
    }

    pub fn write_to(&self, mut w: impl Write) -> std::io::Result<()> {
        let name_len = u16::try_from(self.name.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "entry name too long")
        })?;
        w.write_all(&LOCAL_MAGIC.to_le_bytes())?;
        w.write_all(&VERSION_NEEDED.to_le_bytes())?;
        w.write_all(&self.flags.to_le_bytes())?;
        w.write_all(&self.method.to_le_bytes())?;
        w.write_all(&self.modified.time.to_le_bytes())?;
        w.write_all(&self.modified.date.to_le_bytes())?;
        w.write_all(&self.crc32.to_le_bytes())?;
        w.write_all(&self.compressed_size.to_le_bytes())?;
        w.write_all(&self.uncompressed_size.to_le_bytes())?;
        w.write_all(&name_len.to_le_bytes())?;
        w.write_all(&0u16.to_le_bytes())?; // extra field length
        w.write_all(&self.name)?;
        Ok(())
    }

    /// Read a header and its name. Extra field bytes are left unread;
    /// callers skip `extra_len` to reach the content.
    pub fn read_from(mut r: impl Read) -> std::io::Result<Self> {
        let mut buf = [0u8; HEADER_LEN as usize];
        r.read_exact(&mut buf)?;
        if le32(&buf[0..4]) != LOCAL_MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "bad local header magic",
            ));
        }
        let name_len = le16(&buf[26..28]) as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        Ok(Self {
            flags: le16(&buf[6..8]),
            method: le16(&buf[8..10]),
            modified: DosDateTime {
                time: le16(&buf[10..12]),
                date: le16(&buf[12..14]),
            },
            crc32: le32(&buf[14..18]),
            compressed_size: le32(&buf[18..22]),
            uncompressed_size: le32(&buf[22..26]),
            name,
            extra_len: le16(&buf[28..30]),
        })
    }
}

/// Trailing record carrying the CRC and sizes of the entry just written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    pub fn write_to(&self, mut w: impl Write) -> std::io::Result<()> {
        w.write_all(&DESCRIPTOR_MAGIC.to_le_bytes())?;
        w.write_all(&self.crc32.to_le_bytes())?;
        w.write_all(&self.compressed_size.to_le_bytes())?;
        w.write_all(&self.uncompressed_size.to_le_bytes())?;
        Ok(())
    }

    /// Read a descriptor, accepting the optional signature.
    pub fn read_from(mut r: impl Read) -> std::io::Result<Self> {
        let mut first = [0u8; 4];
        r.read_exact(&mut first)?;
        let crc32 = if le32(&first) == DESCRIPTOR_MAGIC {
            let mut c = [0u8; 4];
            r.read_exact(&mut c)?;
            le32(&c)
        } else {
            le32(&first)
        };
        let mut sizes = [0u8; 8];
        r.read_exact(&mut sizes)?;
        Ok(Self {
            crc32,
            compressed_size: le32(&sizes[0..4]),
            uncompressed_size: le32(&sizes[4..8]),
        })
    }
}

#[inline]
pub(crate) fn le16(x: &[u8]) -> u16 {
    u16::from_le_bytes([x[0], x[1]])
}

#[inline]
pub(crate) fn le32(x: &[u8]) -> u32 {
    u32::from_le_bytes([x[0], x[1], x[2], x[3]])
}
