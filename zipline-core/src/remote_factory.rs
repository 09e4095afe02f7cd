use std::path::PathBuf;

use crate::domain::FolderDescriptor;
use crate::error::Result;
use crate::remote::RemoteHandle;
use crate::remote_fs::FsRemote;
use crate::remote_http::{Access, HttpRemote};

pub enum Backend {
    Fs {
        root: PathBuf,
        read_chunk: usize,
    },
    Http {
        base_url: String,
        access: Access,
        root_id: String,
    },
}

/// Open a backend and return it with the folder to start from.
pub fn open_remote(backend: Backend) -> Result<(RemoteHandle, FolderDescriptor)> {
    match backend {
        Backend::Fs { root, read_chunk } => {
            let fs = FsRemote::new(root)?.with_read_chunk(read_chunk);
            let start = fs.root_folder();
            Ok((RemoteHandle::new(fs), start))
        }
        Backend::Http {
            base_url,
            access,
            root_id,
        } => {
            let http = HttpRemote::new(&base_url, access)?;
            Ok((RemoteHandle::new(http), FolderDescriptor::new(root_id, "")))
        }
    }
}
