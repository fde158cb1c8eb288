//! State shared across lanes: the waitlist, the displacement ledger and the
//! vehicle directory. It lives behind the engine's global ordering lock,
//! which is always taken after any lane guards.

use std::collections::HashMap;

use crate::displacement::DisplacementLedger;
use crate::error::{AllocationError, StoreError};
use crate::ids::{LaneId, VehicleId};
use crate::lane::Lane;
use crate::store::StoreSnapshot;
use crate::waitlist::Waitlist;

#[derive(Debug, Clone, Default)]
pub(crate) struct Book {
    pub waitlist: Waitlist,
    pub ledger: DisplacementLedger,
    /// Which lane each parked vehicle occupies.
    pub parked: HashMap<VehicleId, LaneId>,
}

impl Book {
    /// Rebuild from persisted rows against already-restored lanes.
    pub fn restore(snapshot: StoreSnapshot, lanes: &[Lane]) -> Result<Self, StoreError> {
        let mut parked = HashMap::new();
        for lane in lanes {
            for occupant in lane.occupants() {
                if let Some(other) = parked.insert(occupant.vehicle_id, lane.id()) {
                    return Err(StoreError::Corrupt(format!(
                        "vehicle {} is parked in both {other} and {}",
                        occupant.vehicle_id,
                        lane.id()
                    )));
                }
            }
        }

        let waitlist = Waitlist::restore(snapshot.waitlist)?;
        let ledger = DisplacementLedger::restore(snapshot.displacements)?;

        for entry in waitlist.pending() {
            if let Some(lane) = parked.get(&entry.vehicle_id) {
                return Err(StoreError::Corrupt(format!(
                    "vehicle {} is waiting as {} while parked in {lane}",
                    entry.vehicle_id, entry.id
                )));
            }
        }
        for record in ledger.records() {
            if !lanes.iter().any(|lane| lane.id() == record.lane_id) {
                return Err(StoreError::Corrupt(format!(
                    "displacement {} refers to unknown lane {}",
                    record.id, record.lane_id
                )));
            }
            if parked.contains_key(&record.vehicle_id)
                || waitlist.pending_for(record.vehicle_id).is_some()
            {
                return Err(StoreError::Corrupt(format!(
                    "vehicle {} is displaced by {} but also parked or waiting",
                    record.vehicle_id, record.id
                )));
            }
        }

        Ok(Self {
            waitlist,
            ledger,
            parked,
        })
    }

    /// A vehicle may be admitted only if it is not parked, not held outside
    /// a lane, and not already waiting.
    pub fn check_admissible(&self, vehicle: VehicleId) -> Result<(), AllocationError> {
        if let Some(&lane) = self.parked.get(&vehicle) {
            return Err(AllocationError::AlreadyParked { vehicle, lane });
        }
        if let Some(record) = self.ledger.open_record_for(vehicle) {
            return Err(AllocationError::AlreadyParked {
                vehicle,
                lane: record.lane_id,
            });
        }
        if let Some(entry) = self.waitlist.pending_for(vehicle) {
            return Err(AllocationError::DuplicatePending { vehicle, entry });
        }
        Ok(())
    }
}
