use std::path::{Component, Path, PathBuf};

use crate::error::{Result, ZipError};

/// Normalize an archive path: backslashes become `/`, leading slashes and
/// empty or `.` segments are dropped. Directories keep one trailing `/`.
pub fn archive_path(raw: &str, is_dir: bool) -> Result<String> {
    let mut parts = Vec::new();
    for seg in raw.split(['/', '\\']) {
        match seg {
            "" | "." => {}
            ".." => {
                return Err(ZipError::Format(format!(
                    "archive path must not contain '..': {raw}"
                )));
            }
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        return Err(ZipError::Format(format!("empty archive path: {raw:?}")));
    }
    let mut out = parts.join("/");
    if is_dir {
        out.push('/');
    }
    Ok(out)
}

/// Join an archive entry name under `dest`, refusing anything that would
/// escape it.
pub fn safe_join(dest: &Path, name: &str) -> Result<PathBuf> {
    let mut out = dest.to_path_buf();
    for comp in Path::new(name).components() {
        match comp {
            Component::Normal(c) => out.push(c),
            Component::CurDir => {}
            _ => {
                return Err(ZipError::Format(format!("unsafe entry path: {name}")));
            }
        }
    }
    Ok(out)
}
