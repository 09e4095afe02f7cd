use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZipError};

pub const DEFAULT_MEMORY_BUDGET: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_CHUNK_ITEMS: usize = 6;
pub const DEFAULT_FILE_PAGE_SIZE: u32 = 128;
pub const DEFAULT_FOLDER_PAGE_SIZE: u32 = 16;
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Tunables for traversal and download scheduling.
///
/// None of these values affect the correctness of the produced archive; they
/// only trade memory against request overhead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivePolicy {
    /// Upper bound on declared bytes buffered at once by one download chunk.
    pub memory_budget: u64,
    /// Maximum number of files fetched concurrently in one chunk.
    pub max_chunk_items: usize,
    /// Files requested per listing page.
    pub file_page_size: u32,
    /// Folders requested per listing page.
    pub folder_page_size: u32,
    /// Read size used by local streaming backends.
    pub read_chunk_size: usize,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_MEMORY_BUDGET,
            max_chunk_items: DEFAULT_MAX_CHUNK_ITEMS,
            file_page_size: DEFAULT_FILE_PAGE_SIZE,
            folder_page_size: DEFAULT_FOLDER_PAGE_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl ArchivePolicy {
    /// Load a policy from a JSON document. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        let policy: ArchivePolicy = serde_json::from_slice(&raw)
            .map_err(|e| ZipError::Format(format!("policy {}: {e}", path.display())))?;
        Ok(policy.normalized())
    }

    /// Clamp zero values so pagination and chunking always make progress.
    pub fn normalized(mut self) -> Self {
        self.memory_budget = self.memory_budget.max(1);
        self.max_chunk_items = self.max_chunk_items.max(1);
        self.file_page_size = self.file_page_size.max(1);
        self.folder_page_size = self.folder_page_size.max(1);
        self.read_chunk_size = self.read_chunk_size.max(1);
        self
    }
}
