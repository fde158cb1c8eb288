//! Staged mutation for one engine operation.
//!
//! A `Txn` owns the guards it was opened with and works on copies of the
//! guarded state. Every mutation also appends the matching row op to a
//! [`WriteBatch`]. `commit` hands the batch to the store and installs the
//! copies only if the store accepted it; dropping a `Txn` discards
//! everything.

use bevy::log::warn;
use parking_lot::MutexGuard;

use crate::displacement::DisplacementRecord;
use crate::error::{AllocationError, Missing};
use crate::ids::{EntryId, LaneId, Timestamp, VehicleId};
use crate::lane::{Lane, LaneGuards, Occupancy};
use crate::store::{AllocationStore, OccupancyRow, WriteBatch, WriteOp};
use crate::waitlist::WaitlistEntry;

use super::book::Book;
use super::{DisplacedVehicle, Placement, Promotion, ReturnedVehicle};

pub(crate) struct Txn<'a> {
    guards: LaneGuards<'a>,
    lanes: Vec<Lane>,
    book_guard: MutexGuard<'a, Book>,
    book: Book,
    batch: WriteBatch,
    now: Timestamp,
}

impl<'a> Txn<'a> {
    pub fn begin(guards: LaneGuards<'a>, book_guard: MutexGuard<'a, Book>, now: Timestamp) -> Self {
        let lanes = guards.iter().cloned().collect();
        let book = book_guard.clone();
        Self {
            guards,
            lanes,
            book_guard,
            book,
            batch: WriteBatch::default(),
            now,
        }
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn lane(&self, id: LaneId) -> Result<&Lane, AllocationError> {
        self.lanes
            .iter()
            .find(|lane| lane.id() == id)
            .ok_or(AllocationError::NotFound(Missing::Lane(id)))
    }

    fn lane_mut(&mut self, id: LaneId) -> Result<&mut Lane, AllocationError> {
        self.lanes
            .iter_mut()
            .find(|lane| lane.id() == id)
            .ok_or(AllocationError::NotFound(Missing::Lane(id)))
    }

    /// Free slots in `lane` after subtracting slots held for displaced
    /// vehicles.
    pub fn open_slots(&self, lane: LaneId) -> Result<u32, AllocationError> {
        let held = self.book.ledger.held_slots(lane);
        Ok(self.lane(lane)?.free_slots().saturating_sub(held))
    }

    /// First locked lane, by ascending id, with an open slot.
    pub fn find_available_lane(&self) -> Option<LaneId> {
        crate::lane::find_available_lane(&self.lanes, |lane| self.book.ledger.held_slots(lane))
    }

    /// Find `vehicle` in `lane`, failing with `NotFound` if it is not there.
    pub fn position_of(&self, lane: LaneId, vehicle: VehicleId) -> Result<u32, AllocationError> {
        self.lane(lane)?
            .find(vehicle)
            .ok_or(AllocationError::NotFound(Missing::Vehicle { lane, vehicle }))
    }

    // -------------------------------------------------------------------------
    // Lane mutations
    // -------------------------------------------------------------------------

    pub fn push(&mut self, lane_id: LaneId, vehicle: VehicleId) -> Result<Placement, AllocationError> {
        let now = self.now;
        let position = self.lane_mut(lane_id)?.push(vehicle, now)?;
        self.book.parked.insert(vehicle, lane_id);
        self.batch.push(WriteOp::InsertOccupant(OccupancyRow {
            lane_id,
            vehicle_id: vehicle,
            position,
            entered_at: now,
        }));
        Ok(Placement {
            lane: lane_id,
            position,
        })
    }

    pub fn pop_top(&mut self, lane_id: LaneId) -> Result<Occupancy, AllocationError> {
        let removed = self.lane_mut(lane_id)?.pop_top()?;
        self.book.parked.remove(&removed.vehicle_id);
        self.batch.push(WriteOp::RemoveOccupant {
            lane: lane_id,
            position: removed.position,
        });
        Ok(removed)
    }

    pub fn remove_at(&mut self, lane_id: LaneId, position: u32) -> Result<Occupancy, AllocationError> {
        let lane = self.lane_mut(lane_id)?;
        let before = lane.len();
        let removed = lane.remove_at(position)?;
        self.book.parked.remove(&removed.vehicle_id);
        self.batch.push(WriteOp::RemoveOccupant {
            lane: lane_id,
            position,
        });
        for from in position + 1..=before {
            self.batch.push(WriteOp::MoveOccupant {
                lane: lane_id,
                from,
                to: from - 1,
            });
        }
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Ledger mutations
    // -------------------------------------------------------------------------

    /// Pull the occupant at `position` out of the lane and open a record for it.
    pub fn displace(&mut self, lane_id: LaneId, position: u32) -> Result<DisplacedVehicle, AllocationError> {
        let removed = self.remove_at(lane_id, position)?;
        let record = self
            .book
            .ledger
            .open(removed.vehicle_id, lane_id, position, self.now)?;
        self.batch.push(WriteOp::InsertDisplacement(record));
        Ok(DisplacedVehicle {
            record: record.id,
            vehicle: record.vehicle_id,
            origin_position: record.origin_position,
        })
    }

    /// Push a displaced vehicle back onto its lane and close its record.
    pub fn return_vehicle(
        &mut self,
        record: &DisplacementRecord,
    ) -> Result<ReturnedVehicle, AllocationError> {
        let placement = self.push(record.lane_id, record.vehicle_id)?;
        // The record came from this ledger copy and was open, so close cannot miss.
        if let Some(closed) = self.book.ledger.close(record.id, self.now) {
            self.batch.push(WriteOp::CloseDisplacement {
                record: closed.id,
                returned_at: self.now,
            });
        }
        Ok(ReturnedVehicle {
            record: record.id,
            vehicle: record.vehicle_id,
            origin_position: record.origin_position,
            position: placement.position,
        })
    }

    // -------------------------------------------------------------------------
    // Waitlist mutations
    // -------------------------------------------------------------------------

    pub fn enqueue(&mut self, vehicle: VehicleId) -> Result<WaitlistEntry, AllocationError> {
        let entry = self.book.waitlist.enqueue(vehicle, self.now)?;
        self.batch.push(WriteOp::InsertWaitlist(entry));
        Ok(entry)
    }

    pub fn cancel(&mut self, entry: EntryId) -> Result<WaitlistEntry, AllocationError> {
        let entry = self.book.waitlist.cancel(entry)?;
        self.batch.push(WriteOp::SetWaitlistStatus {
            entry: entry.id,
            status: entry.status,
        });
        Ok(entry)
    }

    /// Move the oldest pending vehicle into `lane` if it has an open slot.
    /// At most one entry is promoted per call.
    pub fn promote_into(&mut self, lane: LaneId) -> Result<Option<Promotion>, AllocationError> {
        if self.open_slots(lane)? == 0 {
            return Ok(None);
        }
        let Some(entry) = self.book.waitlist.peek_oldest_pending().copied() else {
            return Ok(None);
        };
        let placement = self.push(lane, entry.vehicle_id)?;
        let promoted = self.book.waitlist.mark_promoted(entry.id)?;
        self.batch.push(WriteOp::SetWaitlistStatus {
            entry: promoted.id,
            status: promoted.status,
        });
        Ok(Some(Promotion {
            entry: entry.id,
            vehicle: entry.vehicle_id,
            requested_at: entry.requested_at,
            placement,
        }))
    }

    // -------------------------------------------------------------------------
    // Commit
    // -------------------------------------------------------------------------

    /// Persist the batch, then install the staged state. An empty batch
    /// touches neither the store nor the guarded state.
    pub fn commit(mut self, store: &dyn AllocationStore) -> Result<(), AllocationError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        if let Err(e) = store.apply(&self.batch) {
            warn!(
                "store rejected batch of {} ops, state left unchanged: {}",
                self.batch.len(),
                e
            );
            return Err(AllocationError::StoreUnavailable(e));
        }
        for staged in self.lanes.drain(..) {
            if let Some(slot) = self.guards.get_mut(staged.id()) {
                *slot = staged;
            }
        }
        *self.book_guard = self.book;
        Ok(())
    }
}
