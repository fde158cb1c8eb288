//! FIFO waitlist for vehicles that arrived while every lane was full.
//!
//! A pending entry either gets promoted into a lane or cancelled, and both
//! transitions are one-way. Only pending entries are held here; settled
//! entries live on in the store only. Pending entries are ordered by
//! `(requested_at, id)`, which is the promotion order.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::{AllocationError, Missing, StoreError};
use crate::ids::{EntryId, Timestamp, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    Pending,
    Promoted,
    Cancelled,
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitlistStatus::Pending => "pending",
            WaitlistStatus::Promoted => "promoted",
            WaitlistStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct WaitlistEntry {
    pub id: EntryId,
    pub vehicle_id: VehicleId,
    pub requested_at: Timestamp,
    pub status: WaitlistStatus,
}

impl WaitlistEntry {
    pub fn is_pending(&self) -> bool {
        self.status == WaitlistStatus::Pending
    }
}

#[derive(Debug, Clone, Default)]
pub struct Waitlist {
    pending: BTreeMap<EntryId, WaitlistEntry>,
    /// Promotion order of pending entries.
    queue: BTreeSet<(Timestamp, EntryId)>,
    pending_by_vehicle: HashMap<VehicleId, EntryId>,
    next_id: u64,
    last_requested_at: Timestamp,
}

impl Waitlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted rows, checking the one-pending-per-vehicle rule.
    /// Settled rows only advance the id and timestamp sequences.
    pub fn restore(rows: Vec<WaitlistEntry>) -> Result<Self, StoreError> {
        let mut waitlist = Self::new();
        let mut seen = HashSet::with_capacity(rows.len());
        for entry in rows {
            if !seen.insert(entry.id) {
                return Err(StoreError::Corrupt(format!(
                    "duplicate waitlist entry {}",
                    entry.id
                )));
            }
            waitlist.next_id = waitlist.next_id.max(entry.id.0);
            waitlist.last_requested_at = waitlist.last_requested_at.max(entry.requested_at);
            if !entry.is_pending() {
                continue;
            }
            if let Some(existing) = waitlist.pending_by_vehicle.insert(entry.vehicle_id, entry.id) {
                return Err(StoreError::Corrupt(format!(
                    "vehicle {} has two pending entries ({existing}, {})",
                    entry.vehicle_id, entry.id
                )));
            }
            waitlist.queue.insert((entry.requested_at, entry.id));
            waitlist.pending.insert(entry.id, entry);
        }
        Ok(waitlist)
    }

    /// Append a pending entry for `vehicle`.
    ///
    /// `requested_at` never goes below the previous entry's, so arrival order
    /// and queue order agree even if the clock steps backwards.
    pub fn enqueue(
        &mut self,
        vehicle: VehicleId,
        now: Timestamp,
    ) -> Result<WaitlistEntry, AllocationError> {
        if let Some(&entry) = self.pending_by_vehicle.get(&vehicle) {
            return Err(AllocationError::DuplicatePending { vehicle, entry });
        }
        self.next_id += 1;
        let entry = WaitlistEntry {
            id: EntryId(self.next_id),
            vehicle_id: vehicle,
            requested_at: now.max(self.last_requested_at),
            status: WaitlistStatus::Pending,
        };
        self.last_requested_at = entry.requested_at;
        self.queue.insert((entry.requested_at, entry.id));
        self.pending_by_vehicle.insert(vehicle, entry.id);
        self.pending.insert(entry.id, entry);
        Ok(entry)
    }

    pub fn peek_oldest_pending(&self) -> Option<&WaitlistEntry> {
        self.queue
            .first()
            .and_then(|(_, id)| self.pending.get(id))
    }

    pub fn mark_promoted(&mut self, id: EntryId) -> Result<WaitlistEntry, AllocationError> {
        self.settle(id, WaitlistStatus::Promoted)
    }

    pub fn cancel(&mut self, id: EntryId) -> Result<WaitlistEntry, AllocationError> {
        self.settle(id, WaitlistStatus::Cancelled)
    }

    /// Move a pending entry to `to` and drop it from the queue. Ids that are
    /// not pending here are `NotFound`; the caller decides whether the store
    /// knows them as settled.
    fn settle(
        &mut self,
        id: EntryId,
        to: WaitlistStatus,
    ) -> Result<WaitlistEntry, AllocationError> {
        let mut entry = self
            .pending
            .remove(&id)
            .ok_or(AllocationError::NotFound(Missing::Entry(id)))?;
        entry.status = to;
        self.queue.remove(&(entry.requested_at, id));
        self.pending_by_vehicle.remove(&entry.vehicle_id);
        Ok(entry)
    }

    pub fn count_pending(&self) -> usize {
        self.queue.len()
    }

    /// The entry, if it is still pending.
    pub fn get(&self, id: EntryId) -> Option<&WaitlistEntry> {
        self.pending.get(&id)
    }

    /// Whether `id` was ever handed out, pending or not.
    pub fn was_issued(&self, id: EntryId) -> bool {
        id.0 >= 1 && id.0 <= self.next_id
    }

    pub fn pending_for(&self, vehicle: VehicleId) -> Option<EntryId> {
        self.pending_by_vehicle.get(&vehicle).copied()
    }

    /// 1-based place in the queue, if the entry is pending.
    pub fn position_of(&self, id: EntryId) -> Option<usize> {
        self.queue
            .iter()
            .position(|&(_, queued)| queued == id)
            .map(|i| i + 1)
    }

    /// Pending entries in promotion order.
    pub fn pending(&self) -> impl Iterator<Item = &WaitlistEntry> {
        self.queue.iter().filter_map(|(_, id)| self.pending.get(id))
    }
}
