//! The allocation engine.
//!
//! Orchestrates lanes, the waitlist and the displacement ledger. It is the
//! only writer of any of them and the only place where their invariants
//! meet:
//!
//! - a lane never exceeds its capacity and its positions stay `1..=len`;
//! - a vehicle is in at most one of: a lane, the ledger (displaced), the
//!   waitlist (pending);
//! - pending entries are promoted strictly in arrival order;
//! - slots vacated by displaced vehicles stay reserved until they return.
//!
//! ## Locking
//! Each lane has its own mutex; the waitlist, ledger and vehicle directory
//! share one "book" mutex. Lane guards are always taken first, in ascending
//! lane id, then the book. Operations on one lane take that lane's guard;
//! operations that choose among lanes take all of them.
//!
//! ## Persistence
//! Every mutating call stages its changes on copies, commits one
//! [`WriteBatch`](crate::store::WriteBatch) to the store, and only then
//! installs the copies. A store failure leaves memory and store unchanged.

mod admission;
mod book;
mod promotion;
mod retrieval;
mod txn;

#[cfg(test)]
mod tests_promotion;
#[cfg(test)]
mod tests_retrieval;

use std::collections::BTreeMap;
use std::sync::Arc;

use bevy::log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::AllocationConfig;
use crate::displacement::DisplacementRecord;
use crate::error::{AllocationError, Missing, StoreError};
use crate::ids::{EntryId, LaneId, RecordId, Timestamp, VehicleId};
use crate::lane::{Lane, LaneRegistry, Occupancy};
use crate::store::AllocationStore;
use crate::waitlist::WaitlistEntry;

use book::Book;

// =============================================================================
// Operation results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub lane: LaneId,
    pub position: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Admission {
    Parked(Placement),
    /// No lane had room. `queue_position` is 1-based.
    Waiting {
        entry: EntryId,
        queue_position: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Promotion {
    pub entry: EntryId,
    pub vehicle: VehicleId,
    pub requested_at: Timestamp,
    pub placement: Placement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Departure {
    pub vacated: Occupancy,
    pub promoted: Option<Promotion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplacedVehicle {
    pub record: RecordId,
    pub vehicle: VehicleId,
    pub origin_position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Retrieval {
    pub retrieved: Occupancy,
    /// Vehicles this call pulled out, in the order they were pulled out.
    pub displaced: Vec<DisplacedVehicle>,
    /// Every vehicle the lane still owes a return, including ones displaced
    /// by earlier retrievals, in the order they will go back in.
    pub owed: Vec<DisplacementRecord>,
    pub promoted: Option<Promotion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReturnedVehicle {
    pub record: RecordId,
    pub vehicle: VehicleId,
    pub origin_position: u32,
    /// Position the vehicle landed at on return.
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnReport {
    pub lane: LaneId,
    /// In the order they went back in.
    pub returned: Vec<ReturnedVehicle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VehicleStatus {
    Unparked,
    Parked(Placement),
    Displaced {
        lane: LaneId,
        origin_position: u32,
        record: RecordId,
    },
    Waiting {
        entry: EntryId,
        queue_position: usize,
    },
}

/// Read-only picture of one lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneView {
    pub id: LaneId,
    pub capacity: u32,
    /// Accessible end first.
    pub occupants: Vec<Occupancy>,
    /// Slots reserved for vehicles currently displaced from this lane.
    pub held: u32,
    pub open_displacements: Vec<DisplacementRecord>,
}

impl LaneView {
    fn new(lane: &Lane, book: &Book) -> Self {
        Self {
            id: lane.id(),
            capacity: lane.capacity(),
            occupants: lane.occupants().iter().rev().copied().collect(),
            held: book.ledger.held_slots(lane.id()),
            open_displacements: book.ledger.open_for_lane(lane.id()),
        }
    }

    /// Slots an arriving or promoted vehicle could take right now.
    pub fn open_slots(&self) -> u32 {
        self.capacity
            .saturating_sub(self.occupants.len() as u32)
            .saturating_sub(self.held)
    }
}

/// Lanes and waitlist read under one lock, so counts agree with each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotView {
    pub lanes: Vec<LaneView>,
    pub pending: usize,
}

// =============================================================================
// Engine
// =============================================================================

pub struct AllocationEngine {
    config: AllocationConfig,
    lanes: LaneRegistry,
    book: Mutex<Book>,
    store: Arc<dyn AllocationStore>,
    clock: Arc<dyn Clock>,
}

impl AllocationEngine {
    /// Load persisted state from `store` and start serving.
    pub fn open(
        config: AllocationConfig,
        store: Arc<dyn AllocationStore>,
    ) -> Result<Self, AllocationError> {
        Self::open_with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        config: AllocationConfig,
        store: Arc<dyn AllocationStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AllocationError> {
        config.validate().map_err(AllocationError::InvalidConfig)?;
        let snapshot = store.load()?;

        let mut rows_by_lane: BTreeMap<LaneId, Vec<Occupancy>> = BTreeMap::new();
        for row in &snapshot.occupancies {
            if row.lane_id.0 == 0 || row.lane_id.0 > config.lane_count {
                return Err(StoreError::Corrupt(format!(
                    "occupancy of {} refers to unknown lane {}",
                    row.vehicle_id, row.lane_id
                ))
                .into());
            }
            rows_by_lane.entry(row.lane_id).or_default().push(row.occupancy());
        }
        let lanes = config
            .lane_ids()
            .map(|id| {
                let rows = rows_by_lane.remove(&id).unwrap_or_default();
                Lane::restore(id, config.lane_capacity, rows)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let book = Book::restore(snapshot, &lanes)?;
        for lane in &lanes {
            let held = book.ledger.held_slots(lane.id());
            if lane.len() + held > lane.capacity() {
                warn!(
                    "lane {} is over-committed: {} parked + {} displaced > capacity {}",
                    lane.id(),
                    lane.len(),
                    held,
                    lane.capacity()
                );
            }
        }

        info!(
            "allocation engine ready: {} lanes x {} slots, {} parked, {} waiting, {} displaced",
            config.lane_count,
            config.lane_capacity,
            book.parked.len(),
            book.waitlist.count_pending(),
            book.ledger.count_open()
        );

        Ok(Self {
            lanes: LaneRegistry::from_lanes(lanes, config.lane_capacity),
            config,
            book: Mutex::new(book),
            store,
            clock,
        })
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // -------------------------------------------------------------------------
    // Read views
    // -------------------------------------------------------------------------

    /// Every lane, ascending id.
    pub fn lanes(&self) -> Vec<LaneView> {
        let guards = self.lanes.lock_all();
        let book = self.book.lock();
        guards.iter().map(|lane| LaneView::new(lane, &book)).collect()
    }

    pub fn board(&self) -> LotView {
        let guards = self.lanes.lock_all();
        let book = self.book.lock();
        LotView {
            lanes: guards.iter().map(|lane| LaneView::new(lane, &book)).collect(),
            pending: book.waitlist.count_pending(),
        }
    }

    pub fn lane(&self, id: LaneId) -> Result<LaneView, AllocationError> {
        let guards = self.lanes.lock(id)?;
        let book = self.book.lock();
        let lane = guards
            .get(id)
            .ok_or(AllocationError::NotFound(Missing::Lane(id)))?;
        Ok(LaneView::new(lane, &book))
    }

    /// Pending entries in promotion order.
    pub fn pending(&self) -> Vec<WaitlistEntry> {
        self.book.lock().waitlist.pending().copied().collect()
    }

    pub fn count_pending(&self) -> usize {
        self.book.lock().waitlist.count_pending()
    }

    /// Any entry ever issued. Settled entries are read from the store.
    pub fn waitlist_entry(&self, id: EntryId) -> Result<WaitlistEntry, AllocationError> {
        let book = self.book.lock();
        if let Some(entry) = book.waitlist.get(id) {
            return Ok(*entry);
        }
        if !book.waitlist.was_issued(id) {
            return Err(AllocationError::NotFound(Missing::Entry(id)));
        }
        self.stored_entry(id)
    }

    /// Look up a settled entry in the store. Call with the book locked so
    /// the row cannot change underneath.
    fn stored_entry(&self, id: EntryId) -> Result<WaitlistEntry, AllocationError> {
        self.store
            .waitlist_entry(id)?
            .ok_or(AllocationError::NotFound(Missing::Entry(id)))
    }

    /// Open records for `lane`, in the order vehicles will go back in.
    pub fn open_displacements(&self, lane: LaneId) -> Result<Vec<DisplacementRecord>, AllocationError> {
        self.lanes.get(lane)?;
        Ok(self.book.lock().ledger.open_for_lane(lane))
    }

    pub fn locate(&self, vehicle: VehicleId) -> VehicleStatus {
        let guards = self.lanes.lock_all();
        let book = self.book.lock();
        if let Some(&lane) = book.parked.get(&vehicle) {
            if let Some(position) = guards.get(lane).and_then(|l| l.find(vehicle)) {
                return VehicleStatus::Parked(Placement { lane, position });
            }
        }
        if let Some(record) = book.ledger.open_record_for(vehicle) {
            return VehicleStatus::Displaced {
                lane: record.lane_id,
                origin_position: record.origin_position,
                record: record.id,
            };
        }
        if let Some(entry) = book.waitlist.pending_for(vehicle) {
            return VehicleStatus::Waiting {
                entry,
                queue_position: book.waitlist.position_of(entry).unwrap_or_default(),
            };
        }
        VehicleStatus::Unparked
    }
}
