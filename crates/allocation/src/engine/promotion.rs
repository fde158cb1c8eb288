use bevy::log::info;

use crate::error::AllocationError;
use crate::ids::{EntryId, LaneId};
use crate::lane::LaneGuards;
use crate::waitlist::WaitlistEntry;

use super::txn::Txn;
use super::{AllocationEngine, Promotion};

impl AllocationEngine {
    /// Move the oldest pending vehicle into `lane` if it has an open slot.
    /// Returns `None` when the lane is taken or nobody is waiting.
    pub fn promote(&self, lane: LaneId) -> Result<Option<Promotion>, AllocationError> {
        let mut txn = Txn::begin(self.lanes.lock(lane)?, self.book.lock(), self.now());
        let promoted = txn.promote_into(lane)?;
        txn.commit(self.store.as_ref())?;
        log_promotion(promoted.as_ref());
        Ok(promoted)
    }

    /// Promote the oldest pending vehicle into the first lane with an open
    /// slot.
    pub fn promote_next(&self) -> Result<Option<Promotion>, AllocationError> {
        let mut txn = Txn::begin(self.lanes.lock_all(), self.book.lock(), self.now());
        let Some(lane) = txn.find_available_lane() else {
            return Ok(None);
        };
        let promoted = txn.promote_into(lane)?;
        txn.commit(self.store.as_ref())?;
        log_promotion(promoted.as_ref());
        Ok(promoted)
    }

    /// Withdraw a pending waitlist entry.
    pub fn cancel_waiting(&self, entry: EntryId) -> Result<WaitlistEntry, AllocationError> {
        let mut txn = Txn::begin(LaneGuards::default(), self.book.lock(), self.now());
        let cancelled = match txn.cancel(entry) {
            Ok(cancelled) => cancelled,
            Err(AllocationError::NotFound(_)) if txn.book().waitlist.was_issued(entry) => {
                let settled = self.stored_entry(entry)?;
                return Err(AllocationError::InvalidState {
                    entry,
                    status: settled.status,
                });
            }
            Err(e) => return Err(e),
        };
        txn.commit(self.store.as_ref())?;
        info!("cancelled {entry} for {}", cancelled.vehicle_id);
        Ok(cancelled)
    }
}

pub(super) fn log_promotion(promoted: Option<&Promotion>) {
    if let Some(p) = promoted {
        info!(
            "promoted {} ({}) into lane {} at position {}",
            p.vehicle, p.entry, p.placement.lane, p.placement.position
        );
    }
}
