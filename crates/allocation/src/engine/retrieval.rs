use bevy::log::{info, warn};

use crate::error::AllocationError;
use crate::ids::{LaneId, VehicleId};

use super::promotion::log_promotion;
use super::txn::Txn;
use super::{AllocationEngine, Departure, Retrieval, ReturnReport};

impl AllocationEngine {
    /// Remove the vehicle at the accessible end of `lane`.
    ///
    /// Fails with `PositionMismatch` when `vehicle` is parked deeper in the
    /// lane; use [`Self::retrieve`] for that. The freed slot is offered to the
    /// oldest pending waitlist entry.
    pub fn depart_top(&self, lane: LaneId, vehicle: VehicleId) -> Result<Departure, AllocationError> {
        let mut txn = Txn::begin(self.lanes.lock(lane)?, self.book.lock(), self.now());
        let position = txn.position_of(lane, vehicle)?;
        let top = txn.lane(lane)?.len();
        if position != top {
            return Err(AllocationError::PositionMismatch {
                lane,
                vehicle,
                position,
                top,
            });
        }

        let vacated = txn.pop_top(lane)?;
        let promoted = txn.promote_into(lane)?;
        txn.commit(self.store.as_ref())?;

        info!("{vehicle} left lane {lane} from position {position}");
        log_promotion(promoted.as_ref());
        Ok(Departure { vacated, promoted })
    }

    /// Take `vehicle` out of `lane` wherever it is parked.
    ///
    /// Every occupant above it is pulled out first, top inward, and recorded
    /// in the displacement ledger. Their slots stay reserved until
    /// [`Self::return_displaced`] puts them back.
    pub fn retrieve(&self, lane: LaneId, vehicle: VehicleId) -> Result<Retrieval, AllocationError> {
        let mut txn = Txn::begin(self.lanes.lock(lane)?, self.book.lock(), self.now());
        let position = txn.position_of(lane, vehicle)?;

        let mut displaced = Vec::new();
        loop {
            let top = txn.lane(lane)?.len();
            if top <= position {
                break;
            }
            displaced.push(txn.displace(lane, top)?);
        }
        let retrieved = txn.remove_at(lane, position)?;
        let promoted = txn.promote_into(lane)?;
        let owed = txn.book().ledger.open_for_lane(lane);
        txn.commit(self.store.as_ref())?;

        info!(
            "retrieved {vehicle} from lane {lane} position {position}, {} displaced",
            displaced.len()
        );
        log_promotion(promoted.as_ref());
        Ok(Retrieval {
            retrieved,
            displaced,
            owed,
            promoted,
        })
    }

    /// Push every vehicle displaced from `lane` back in, most recently
    /// displaced first. Calling it with nothing outstanding is a no-op.
    ///
    /// If a push fails part way, the vehicles already returned stay
    /// returned and the rest stay in the ledger; the call then reports
    /// [`AllocationError::ReturnIncomplete`].
    pub fn return_displaced(&self, lane: LaneId) -> Result<ReturnReport, AllocationError> {
        let mut txn = Txn::begin(self.lanes.lock(lane)?, self.book.lock(), self.now());
        let records = txn.book().ledger.open_for_lane(lane);

        let mut returned = Vec::with_capacity(records.len());
        let mut failure = None;
        for (i, record) in records.iter().enumerate() {
            match txn.return_vehicle(record) {
                Ok(vehicle) => returned.push(vehicle),
                Err(e) => {
                    failure = Some((i, e));
                    break;
                }
            }
        }
        txn.commit(self.store.as_ref())?;

        if let Some((i, cause)) = failure {
            let remaining: Vec<VehicleId> = records[i..].iter().map(|r| r.vehicle_id).collect();
            warn!(
                "returned {} of {} vehicles to lane {lane}, {} still held: {cause}",
                returned.len(),
                records.len(),
                remaining.len()
            );
            return Err(AllocationError::ReturnIncomplete {
                lane,
                returned: returned.iter().map(|r| r.vehicle).collect(),
                remaining,
                cause: Box::new(cause),
            });
        }

        if !returned.is_empty() {
            info!("returned {} displaced vehicles to lane {lane}", returned.len());
        }
        Ok(ReturnReport { lane, returned })
    }
}
