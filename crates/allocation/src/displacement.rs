//! Ledger of vehicles pulled out of a lane so a buried vehicle can leave.
//!
//! A record is open while its vehicle is held outside the lane and closed
//! (`returned_at` set) once the vehicle is pushed back. Only open records are
//! held here; closed ones live on in the store only.

use std::collections::{BTreeMap, HashMap, HashSet};

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::{AllocationError, StoreError};
use crate::ids::{LaneId, RecordId, Timestamp, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct DisplacementRecord {
    pub id: RecordId,
    pub vehicle_id: VehicleId,
    pub lane_id: LaneId,
    /// Position the vehicle held just before it was pulled out.
    pub origin_position: u32,
    pub moved_at: Timestamp,
    pub returned_at: Option<Timestamp>,
}

impl DisplacementRecord {
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DisplacementLedger {
    open: BTreeMap<RecordId, DisplacementRecord>,
    open_by_vehicle: HashMap<VehicleId, RecordId>,
    next_id: u64,
    last_moved_at: Timestamp,
}

impl DisplacementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted rows. Closed rows only advance the id and
    /// timestamp sequences.
    pub fn restore(rows: Vec<DisplacementRecord>) -> Result<Self, StoreError> {
        let mut ledger = Self::new();
        let mut seen = HashSet::with_capacity(rows.len());
        for record in rows {
            if !seen.insert(record.id) {
                return Err(StoreError::Corrupt(format!(
                    "duplicate displacement record {}",
                    record.id
                )));
            }
            ledger.next_id = ledger.next_id.max(record.id.0);
            ledger.last_moved_at = ledger.last_moved_at.max(record.moved_at);
            if !record.is_open() {
                continue;
            }
            if let Some(existing) = ledger.open_by_vehicle.insert(record.vehicle_id, record.id) {
                return Err(StoreError::Corrupt(format!(
                    "vehicle {} has two open displacement records ({existing}, {})",
                    record.vehicle_id, record.id
                )));
            }
            ledger.open.insert(record.id, record);
        }
        Ok(ledger)
    }

    /// Open a record for a vehicle just pulled from `lane` at `origin_position`.
    ///
    /// `moved_at` never goes below the previous record's, so record order and
    /// time order agree even if the clock steps backwards.
    pub fn open(
        &mut self,
        vehicle: VehicleId,
        lane: LaneId,
        origin_position: u32,
        now: Timestamp,
    ) -> Result<DisplacementRecord, AllocationError> {
        if let Some(existing) = self.open_by_vehicle.get(&vehicle) {
            let lane = self.open[existing].lane_id;
            return Err(AllocationError::AlreadyDisplaced { vehicle, lane });
        }
        self.next_id += 1;
        let record = DisplacementRecord {
            id: RecordId(self.next_id),
            vehicle_id: vehicle,
            lane_id: lane,
            origin_position,
            moved_at: now.max(self.last_moved_at),
            returned_at: None,
        };
        self.last_moved_at = record.moved_at;
        self.open_by_vehicle.insert(vehicle, record.id);
        self.open.insert(record.id, record);
        Ok(record)
    }

    /// Close an open record and drop it from the ledger. Returns `None` if
    /// no open record has this id.
    pub fn close(&mut self, id: RecordId, now: Timestamp) -> Option<DisplacementRecord> {
        let mut record = self.open.remove(&id)?;
        record.returned_at = Some(now);
        self.open_by_vehicle.remove(&record.vehicle_id);
        Some(record)
    }

    /// Open records for `lane`, most recently displaced first. This is the
    /// order in which vehicles go back in. Record ids are issued in
    /// displacement order, so they decide it.
    pub fn open_for_lane(&self, lane: LaneId) -> Vec<DisplacementRecord> {
        self.open
            .values()
            .rev()
            .filter(|r| r.lane_id == lane)
            .copied()
            .collect()
    }

    /// Number of slots in `lane` reserved for vehicles still outside it.
    pub fn held_slots(&self, lane: LaneId) -> u32 {
        self.open.values().filter(|r| r.lane_id == lane).count() as u32
    }

    /// The open record for `vehicle`, if it is currently displaced.
    pub fn open_record_for(&self, vehicle: VehicleId) -> Option<&DisplacementRecord> {
        self.open_by_vehicle
            .get(&vehicle)
            .and_then(|id| self.open.get(id))
    }

    pub fn count_open(&self) -> usize {
        self.open.len()
    }

    /// Open records, by id.
    pub fn records(&self) -> impl Iterator<Item = &DisplacementRecord> {
        self.open.values()
    }
}
