use bevy::log::info;

use crate::error::AllocationError;
use crate::ids::{LaneId, VehicleId};

use super::txn::Txn;
use super::{Admission, AllocationEngine};

impl AllocationEngine {
    /// Park `vehicle` in the first lane with an open slot, or put it on the
    /// waitlist if every lane is taken.
    ///
    /// Holds every lane guard for the whole call, so concurrent admissions
    /// serialize and never over-fill a lane.
    pub fn admit(&self, vehicle: VehicleId) -> Result<Admission, AllocationError> {
        let mut txn = Txn::begin(self.lanes.lock_all(), self.book.lock(), self.now());
        txn.book().check_admissible(vehicle)?;

        let admission = match txn.find_available_lane() {
            Some(lane) => Admission::Parked(txn.push(lane, vehicle)?),
            None => enqueue(&mut txn, vehicle)?,
        };
        txn.commit(self.store.as_ref())?;
        log_admission(vehicle, &admission);
        Ok(admission)
    }

    /// Park `vehicle` in a lane chosen by the caller. Falls back to the
    /// waitlist when that lane has no open slot.
    pub fn admit_into(&self, lane: LaneId, vehicle: VehicleId) -> Result<Admission, AllocationError> {
        let mut txn = Txn::begin(self.lanes.lock(lane)?, self.book.lock(), self.now());
        txn.book().check_admissible(vehicle)?;

        let admission = if txn.open_slots(lane)? > 0 {
            Admission::Parked(txn.push(lane, vehicle)?)
        } else {
            enqueue(&mut txn, vehicle)?
        };
        txn.commit(self.store.as_ref())?;
        log_admission(vehicle, &admission);
        Ok(admission)
    }
}

fn enqueue(txn: &mut Txn<'_>, vehicle: VehicleId) -> Result<Admission, AllocationError> {
    let entry = txn.enqueue(vehicle)?;
    let queue_position = txn
        .book()
        .waitlist
        .position_of(entry.id)
        .unwrap_or_else(|| txn.book().waitlist.count_pending());
    Ok(Admission::Waiting {
        entry: entry.id,
        queue_position,
    })
}

fn log_admission(vehicle: VehicleId, admission: &Admission) {
    match admission {
        Admission::Parked(placement) => info!(
            "admitted {vehicle} to lane {} at position {}",
            placement.lane, placement.position
        ),
        Admission::Waiting {
            entry,
            queue_position,
        } => info!("no room for {vehicle}, waiting as {entry} (#{queue_position} in line)"),
    }
}
