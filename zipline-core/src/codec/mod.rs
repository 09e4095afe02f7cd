/// ZIP compression method identifiers understood by this crate.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CodecId {
    Store = 0,
}

impl CodecId {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(CodecId::Store),
            _ => None,
        }
    }
}

pub mod crc;
