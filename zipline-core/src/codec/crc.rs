//! Running CRC-32 as used by the ZIP container (CRC-32/ISO-HDLC: reflected
//! polynomial 0xEDB88320, all-ones init, complemented result).

use crc::{CRC_32_ISO_HDLC, Crc, Digest};

static ZIP_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Incremental checksum over an entry's content.
pub struct Crc32 {
    digest: Digest<'static, u32>,
    len: u64,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    pub fn new() -> Self {
        Self {
            digest: ZIP_CRC.digest(),
            len: 0,
        }
    }

    pub fn update(&mut self, buf: &[u8]) {
        self.digest.update(buf);
        self.len += buf.len() as u64;
    }

    /// Bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

pub fn checksum(input: &[u8]) -> u32 {
    ZIP_CRC.checksum(input)
}
