//! In-process store. Useful as the default collaborator and for tests; the
//! availability switch simulates an unreachable backend.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::StoreError;

use crate::ids::EntryId;
use crate::waitlist::WaitlistEntry;

use super::{AllocationStore, Repository, StoreSnapshot, Tables, WriteBatch};

#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    available: AtomicBool,
    commits: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            available: AtomicBool::new(true),
            commits: AtomicUsize::new(0),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously persisted rows.
    pub fn with_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        Ok(Self {
            tables: Mutex::new(Tables::from_snapshot(snapshot)?),
            ..Self::default()
        })
    }

    /// While unavailable, `load` and `apply` fail with
    /// [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of batches applied so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.tables.lock().snapshot()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".into()))
        }
    }
}

impl AllocationStore for MemoryStore {
    fn load(&self) -> Result<StoreSnapshot, StoreError> {
        self.check_available()?;
        Ok(self.snapshot())
    }

    fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        self.check_available()?;
        self.tables.lock().apply(batch)?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn waitlist_entry(&self, id: EntryId) -> Result<Option<WaitlistEntry>, StoreError> {
        self.check_available()?;
        Ok(self.tables.lock().waitlist.get(&id).copied())
    }
}
