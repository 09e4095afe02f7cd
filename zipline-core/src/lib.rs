#![forbid(unsafe_code)]

pub mod domain;
pub mod error;
pub mod policy;
pub mod stats;

pub mod util {
    pub mod dostime;
    pub mod sanitize;
}

pub mod codec;

pub mod container {
    pub mod central;
    pub mod eocd;
    pub mod local;
}

pub mod remote;
pub mod remote_factory;
pub mod remote_fs;
pub mod remote_http;

pub mod pack {
    pub mod pipeline;
    pub mod scheduler;
    pub mod walker;
    pub mod writer;
}

pub mod read {
    pub mod central;
    pub mod extract;
}

#[cfg(test)]
mod testing;

// Re-exports: stable API surface
pub use domain::{ArchiveEntry, ContentSource, EntryKind, FileDescriptor, FolderDescriptor};
pub use error::{Result, ZipError};
pub use pack::pipeline::{BuildOptions, build_archive, build_from_remote};
pub use pack::writer::{EncoderOptions, ZipEncoder};
pub use policy::ArchivePolicy;
pub use read::extract::{extract, list, verify};
pub use remote::{ContentFetcher, Listing, RemoteHandle};
pub use stats::Stats;
