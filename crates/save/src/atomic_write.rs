//! Atomic file replacement using the write-rename pattern.
//!
//! Data goes to `{path}.tmp`, is flushed with `sync_all()`, and is then
//! renamed over `path`. A crash mid-write leaves the previous file intact
//! and at worst a stale `.tmp` next to it.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sibling path used while a write is in flight.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Atomically replace the contents of `path` with `data`.
///
/// 1. Write to `{path}.tmp`
/// 2. `sync_all()` to flush to disk
/// 3. `rename` temp to final path (atomic on POSIX; near-atomic on Windows)
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = tmp_path(path);
    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;

    Ok(())
}
