//! Crash artifact cleanup for lane store files.
//!
//! An interrupted [`atomic_write`](crate::atomic_write::atomic_write) leaves
//! `{path}.tmp` behind while `path` still holds the last complete write. The
//! temp file is never trusted; it is removed before the store is opened.

use std::fs;
use std::path::Path;

use bevy::log::{info, warn};

use crate::atomic_write::tmp_path;

/// Result of scanning for crash artifacts next to a store file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrashRecovery {
    /// A `.tmp` file from an interrupted write was found.
    pub detected: bool,
    /// The `.tmp` file was removed.
    pub cleaned: bool,
}

/// Remove a leftover `{path}.tmp`, if any.
pub fn clean_stale_tmp(path: &Path) -> CrashRecovery {
    let tmp = tmp_path(path);
    if !tmp.exists() {
        return CrashRecovery::default();
    }

    match fs::remove_file(&tmp) {
        Ok(()) => {
            info!("Crash recovery: removed stale tmp file {}", tmp.display());
            CrashRecovery {
                detected: true,
                cleaned: true,
            }
        }
        Err(e) => {
            warn!(
                "Crash recovery: failed to remove stale tmp file {}: {}",
                tmp.display(),
                e
            );
            CrashRecovery {
                detected: true,
                cleaned: false,
            }
        }
    }
}
