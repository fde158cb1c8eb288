//! File-backed [`AllocationStore`].
//!
//! The whole table set lives in memory and is rewritten to disk on every
//! applied batch: encode with bitcode, optionally LZ4-compress, prepend the
//! checksummed header, then replace the file atomically. A batch is applied
//! to the in-memory tables in place and reverted if the file write fails.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bevy::log::{info, warn};
use parking_lot::Mutex;

use allocation::store::{Repository, Tables};
use allocation::{AllocationStore, EntryId, StoreError, StoreSnapshot, WaitlistEntry, WriteBatch};

use crate::atomic_write::atomic_write;
use crate::crash_recovery::clean_stale_tmp;
use crate::file_header::{
    decompress_payload, unwrap_header, wrap_with_header, wrap_with_header_compressed,
};

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    compress: bool,
    tables: Mutex<Tables>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store; the file
    /// is only created by the first applied batch.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        clean_stale_tmp(&path);

        let tables = match fs::read(&path) {
            Ok(bytes) => {
                let snapshot = decode_snapshot(&bytes)?;
                info!(
                    "Lane store loaded from {}: {} occupancies, {} waitlist entries, {} displacement records",
                    path.display(),
                    snapshot.occupancies.len(),
                    snapshot.waitlist.len(),
                    snapshot.displacements.len()
                );
                Tables::from_snapshot(snapshot)?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Lane store {} not found, starting empty", path.display());
                Tables::default()
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        Ok(Self {
            path,
            compress: true,
            tables: Mutex::new(tables),
        })
    }

    /// Whether writes LZ4-compress the payload. Either form loads.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.tables.lock().snapshot()
    }
}

impl AllocationStore for FileStore {
    fn load(&self) -> Result<StoreSnapshot, StoreError> {
        Ok(self.snapshot())
    }

    fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let undo = tables.apply(batch)?;

        let bytes = encode_snapshot(&tables.snapshot(), self.compress);
        if let Err(e) = atomic_write(&self.path, &bytes) {
            warn!("Lane store write to {} failed: {}", self.path.display(), e);
            tables.revert(undo);
            return Err(StoreError::Io(e));
        }
        Ok(())
    }

    fn waitlist_entry(&self, id: EntryId) -> Result<Option<WaitlistEntry>, StoreError> {
        Ok(self.tables.lock().waitlist.get(&id).copied())
    }
}

/// Serialize a snapshot into the on-disk format.
pub fn encode_snapshot(snapshot: &StoreSnapshot, compress: bool) -> Vec<u8> {
    let payload = bitcode::encode(snapshot);
    if compress {
        wrap_with_header_compressed(&payload)
    } else {
        wrap_with_header(&payload)
    }
}

/// Parse the on-disk format back into a snapshot.
pub fn decode_snapshot(bytes: &[u8]) -> Result<StoreSnapshot, StoreError> {
    let (header, payload) = unwrap_header(bytes)?;
    let decoded;
    let payload = if header.is_compressed() {
        decoded = decompress_payload(payload)?;
        decoded.as_slice()
    } else {
        payload
    };
    if payload.len() != header.uncompressed_size as usize {
        return Err(StoreError::Corrupt(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            header.uncompressed_size
        )));
    }
    Ok(bitcode::decode(payload)?)
}
