use serde::{Deserialize, Serialize};

/// Summary of a finished archive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub files: u64,
    pub dirs: u64,
    /// Sum of entry content sizes.
    pub content_bytes: u64,
    /// Total bytes emitted to the sink, container overhead included.
    pub archive_bytes: u64,
}

impl Stats {
    pub fn entries(&self) -> u64 {
        self.files + self.dirs
    }
}
