//! Generic CRUD contract, defined once and implemented for every entity.
//!
//! A [`Row`] names its key; [`Table`] is the single implementation of
//! [`Repository`] that stores share. Entities carry no behaviour of their
//! own beyond naming their key.

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::displacement::DisplacementRecord;
use crate::error::StoreError;
use crate::ids::{EntryId, LaneId, RecordId};
use crate::waitlist::WaitlistEntry;

use super::OccupancyRow;

/// A persisted entity with a unique key.
pub trait Row: Clone {
    type Key: Ord + Clone + Debug;

    /// Table name used in error messages.
    const TABLE: &'static str;

    fn key(&self) -> Self::Key;
}

/// Create/read/update/delete over one entity type.
pub trait Repository<R: Row> {
    fn insert(&mut self, row: R) -> Result<(), StoreError>;
    fn get(&self, key: &R::Key) -> Option<&R>;
    fn update(&mut self, row: R) -> Result<(), StoreError>;
    fn delete(&mut self, key: &R::Key) -> Result<R, StoreError>;
    /// All rows in key order.
    fn rows(&self) -> Vec<R>;
}

#[derive(Debug, Clone)]
pub struct Table<R: Row> {
    rows: BTreeMap<R::Key, R>,
}

impl<R: Row> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<R: Row> Table<R> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert or overwrite without the existence checks. Used to revert.
    pub(crate) fn put(&mut self, row: R) -> Option<R> {
        self.rows.insert(row.key(), row)
    }

    pub(crate) fn take(&mut self, key: &R::Key) -> Option<R> {
        self.rows.remove(key)
    }
}

impl<R: Row> Repository<R> for Table<R> {
    fn insert(&mut self, row: R) -> Result<(), StoreError> {
        let key = row.key();
        if self.rows.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "{}: row {key:?} already exists",
                R::TABLE
            )));
        }
        self.rows.insert(key, row);
        Ok(())
    }

    fn get(&self, key: &R::Key) -> Option<&R> {
        self.rows.get(key)
    }

    fn update(&mut self, row: R) -> Result<(), StoreError> {
        let key = row.key();
        match self.rows.get_mut(&key) {
            Some(existing) => {
                *existing = row;
                Ok(())
            }
            None => Err(StoreError::Conflict(format!(
                "{}: row {key:?} does not exist",
                R::TABLE
            ))),
        }
    }

    fn delete(&mut self, key: &R::Key) -> Result<R, StoreError> {
        self.rows.remove(key).ok_or_else(|| {
            StoreError::Conflict(format!("{}: row {key:?} does not exist", R::TABLE))
        })
    }

    fn rows(&self) -> Vec<R> {
        self.rows.values().cloned().collect()
    }
}

impl Row for OccupancyRow {
    type Key = (LaneId, u32);
    const TABLE: &'static str = "occupancy";

    fn key(&self) -> Self::Key {
        (self.lane_id, self.position)
    }
}

impl Row for WaitlistEntry {
    type Key = EntryId;
    const TABLE: &'static str = "waitlist";

    fn key(&self) -> Self::Key {
        self.id
    }
}

impl Row for DisplacementRecord {
    type Key = RecordId;
    const TABLE: &'static str = "displacement";

    fn key(&self) -> Self::Key {
        self.id
    }
}
