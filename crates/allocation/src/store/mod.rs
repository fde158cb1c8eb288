//! The persistence contract the engine depends on.
//!
//! The engine turns every mutating call into exactly one [`WriteBatch`] and
//! hands it to [`AllocationStore::apply`]. A store must apply a batch
//! all-or-nothing; the engine only installs its new in-memory state after
//! `apply` succeeds, so a failed write leaves both sides unchanged.

pub mod memory;
pub mod table;

pub use memory::MemoryStore;
pub use table::{Repository, Row, Table};

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::displacement::DisplacementRecord;
use crate::error::StoreError;
use crate::ids::{EntryId, LaneId, RecordId, Timestamp, VehicleId};
use crate::lane::Occupancy;
use crate::waitlist::{WaitlistEntry, WaitlistStatus};

/// One occupied slot, as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct OccupancyRow {
    pub lane_id: LaneId,
    pub vehicle_id: VehicleId,
    pub position: u32,
    pub entered_at: Timestamp,
}

impl OccupancyRow {
    pub fn new(lane_id: LaneId, occupancy: Occupancy) -> Self {
        Self {
            lane_id,
            vehicle_id: occupancy.vehicle_id,
            position: occupancy.position,
            entered_at: occupancy.entered_at,
        }
    }

    pub fn occupancy(&self) -> Occupancy {
        Occupancy {
            vehicle_id: self.vehicle_id,
            position: self.position,
            entered_at: self.entered_at,
        }
    }
}

/// Everything a store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct StoreSnapshot {
    pub occupancies: Vec<OccupancyRow>,
    pub waitlist: Vec<WaitlistEntry>,
    pub displacements: Vec<DisplacementRecord>,
}

/// A single row-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum WriteOp {
    InsertOccupant(OccupancyRow),
    RemoveOccupant { lane: LaneId, position: u32 },
    /// Re-key an occupant after a lower slot was vacated.
    MoveOccupant { lane: LaneId, from: u32, to: u32 },
    InsertWaitlist(WaitlistEntry),
    SetWaitlistStatus { entry: EntryId, status: WaitlistStatus },
    InsertDisplacement(DisplacementRecord),
    CloseDisplacement { record: RecordId, returned_at: Timestamp },
}

/// The ordered ops of one engine operation. Ops must be applied in order:
/// a batch may remove a slot and then fill it again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Persistent store collaborator.
pub trait AllocationStore: Send + Sync {
    /// Read every persisted row.
    fn load(&self) -> Result<StoreSnapshot, StoreError>;

    /// Apply `batch` atomically: every op lands or none does.
    fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError>;

    /// One waitlist row by id, settled or not. The engine only keeps pending
    /// entries in memory and asks the store about the rest.
    fn waitlist_entry(&self, id: EntryId) -> Result<Option<WaitlistEntry>, StoreError> {
        Ok(self.load()?.waitlist.into_iter().find(|entry| entry.id == id))
    }
}

/// The three entity tables, with batch application on top of the generic
/// CRUD contract.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub occupancies: Table<OccupancyRow>,
    pub waitlist: Table<WaitlistEntry>,
    pub displacements: Table<DisplacementRecord>,
}

/// Inverse of one applied op.
#[derive(Debug, Clone, Copy)]
enum Undo {
    DeleteOccupant((LaneId, u32)),
    PutOccupant(OccupancyRow),
    DeleteWaitlist(EntryId),
    PutWaitlist(WaitlistEntry),
    DeleteDisplacement(RecordId),
    PutDisplacement(DisplacementRecord),
}

/// What it takes to revert a batch that [`Tables::apply`] accepted.
#[derive(Debug, Default)]
pub struct UndoLog(Vec<Undo>);

impl Tables {
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        let mut tables = Self::default();
        for row in snapshot.occupancies {
            tables.occupancies.insert(row)?;
        }
        for row in snapshot.waitlist {
            tables.waitlist.insert(row)?;
        }
        for row in snapshot.displacements {
            tables.displacements.insert(row)?;
        }
        Ok(tables)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            occupancies: self.occupancies.rows(),
            waitlist: self.waitlist.rows(),
            displacements: self.displacements.rows(),
        }
    }

    /// Apply ops in order, in place. If any op fails, the ones before it are
    /// reverted and `self` is unchanged. On success the returned log can
    /// revert the whole batch, for stores with a later step that may fail.
    pub fn apply(&mut self, batch: &WriteBatch) -> Result<UndoLog, StoreError> {
        let mut log = UndoLog(Vec::with_capacity(batch.len() + 1));
        for op in &batch.ops {
            if let Err(e) = self.apply_op(op, &mut log.0) {
                self.revert(log);
                return Err(e);
            }
        }
        Ok(log)
    }

    /// Undo an applied batch, newest op first.
    pub fn revert(&mut self, log: UndoLog) {
        for undo in log.0.into_iter().rev() {
            match undo {
                Undo::DeleteOccupant(key) => {
                    self.occupancies.take(&key);
                }
                Undo::PutOccupant(row) => {
                    self.occupancies.put(row);
                }
                Undo::DeleteWaitlist(key) => {
                    self.waitlist.take(&key);
                }
                Undo::PutWaitlist(row) => {
                    self.waitlist.put(row);
                }
                Undo::DeleteDisplacement(key) => {
                    self.displacements.take(&key);
                }
                Undo::PutDisplacement(row) => {
                    self.displacements.put(row);
                }
            }
        }
    }

    fn apply_op(&mut self, op: &WriteOp, log: &mut Vec<Undo>) -> Result<(), StoreError> {
        match *op {
            WriteOp::InsertOccupant(row) => {
                self.occupancies.insert(row)?;
                log.push(Undo::DeleteOccupant(row.key()));
            }
            WriteOp::RemoveOccupant { lane, position } => {
                let row = self.occupancies.delete(&(lane, position))?;
                log.push(Undo::PutOccupant(row));
            }
            WriteOp::MoveOccupant { lane, from, to } => {
                let row = self.occupancies.delete(&(lane, from))?;
                log.push(Undo::PutOccupant(row));
                let moved = OccupancyRow { position: to, ..row };
                self.occupancies.insert(moved)?;
                log.push(Undo::DeleteOccupant(moved.key()));
            }
            WriteOp::InsertWaitlist(entry) => {
                self.waitlist.insert(entry)?;
                log.push(Undo::DeleteWaitlist(entry.id));
            }
            WriteOp::SetWaitlistStatus { entry, status } => {
                let before = *self.waitlist.get(&entry).ok_or_else(|| {
                    StoreError::Conflict(format!("waitlist: row {entry:?} does not exist"))
                })?;
                self.waitlist.update(WaitlistEntry { status, ..before })?;
                log.push(Undo::PutWaitlist(before));
            }
            WriteOp::InsertDisplacement(record) => {
                self.displacements.insert(record)?;
                log.push(Undo::DeleteDisplacement(record.id));
            }
            WriteOp::CloseDisplacement {
                record,
                returned_at,
            } => {
                let before = *self.displacements.get(&record).ok_or_else(|| {
                    StoreError::Conflict(format!("displacement: row {record:?} does not exist"))
                })?;
                self.displacements.update(DisplacementRecord {
                    returned_at: Some(returned_at),
                    ..before
                })?;
                log.push(Undo::PutDisplacement(before));
            }
        }
        Ok(())
    }
}
