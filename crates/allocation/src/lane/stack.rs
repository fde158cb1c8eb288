//! A single lane: a bounded last-in/first-out stack of vehicles.
//!
//! Position 1 is the deepest slot (placed first, least accessible). The
//! highest occupied position is the accessible end; only that occupant can
//! leave directly. Positions are kept contiguous `1..=len` between
//! operations.

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::{AllocationError, StoreError};
use crate::ids::{LaneId, Timestamp, VehicleId};

/// A vehicle's place in a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Occupancy {
    pub vehicle_id: VehicleId,
    pub position: u32,
    pub entered_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lane {
    id: LaneId,
    capacity: u32,
    /// Sorted by position; `occupants[i].position == i + 1`.
    occupants: Vec<Occupancy>,
}

impl Lane {
    pub fn new(id: LaneId, capacity: u32) -> Self {
        Self {
            id,
            capacity,
            occupants: Vec::with_capacity(capacity as usize),
        }
    }

    /// Rebuild a lane from persisted occupancies in any order.
    ///
    /// Rejects rows whose positions are duplicated, gapped, or beyond the
    /// lane's capacity.
    pub fn restore(
        id: LaneId,
        capacity: u32,
        mut rows: Vec<Occupancy>,
    ) -> Result<Self, StoreError> {
        if rows.len() > capacity as usize {
            return Err(StoreError::Corrupt(format!(
                "lane {id} holds {} occupants, capacity is {capacity}",
                rows.len()
            )));
        }
        rows.sort_by_key(|o| o.position);
        for (i, row) in rows.iter().enumerate() {
            let expected = i as u32 + 1;
            if row.position != expected {
                return Err(StoreError::Corrupt(format!(
                    "lane {id} expected position {expected}, found {} for vehicle {}",
                    row.position, row.vehicle_id
                )));
            }
        }
        Ok(Self {
            id,
            capacity,
            occupants: rows,
        })
    }

    pub fn id(&self) -> LaneId {
        self.id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn len(&self) -> u32 {
        self.occupants.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn free_slots(&self) -> u32 {
        self.capacity.saturating_sub(self.len())
    }

    /// Occupants ordered deepest first.
    pub fn occupants(&self) -> &[Occupancy] {
        &self.occupants
    }

    /// The occupant at the accessible end.
    pub fn top(&self) -> Option<&Occupancy> {
        self.occupants.last()
    }

    pub fn find(&self, vehicle: VehicleId) -> Option<u32> {
        self.occupants
            .iter()
            .find(|o| o.vehicle_id == vehicle)
            .map(|o| o.position)
    }

    /// Place a vehicle at the accessible end and return its position.
    pub fn push(&mut self, vehicle: VehicleId, now: Timestamp) -> Result<u32, AllocationError> {
        if self.is_full() {
            return Err(AllocationError::LaneFull {
                lane: self.id,
                capacity: self.capacity,
            });
        }
        let position = self.len() + 1;
        self.occupants.push(Occupancy {
            vehicle_id: vehicle,
            position,
            entered_at: now,
        });
        Ok(position)
    }

    pub fn pop_top(&mut self) -> Result<Occupancy, AllocationError> {
        self.occupants
            .pop()
            .ok_or(AllocationError::LaneEmpty { lane: self.id })
    }

    /// Remove the occupant at `position`.
    ///
    /// Occupants above it drop down one slot each so the lane stays
    /// contiguous. The retrieval protocol always removes the current top, so
    /// in practice nothing shifts.
    pub fn remove_at(&mut self, position: u32) -> Result<Occupancy, AllocationError> {
        if position == 0 || position > self.len() {
            return Err(AllocationError::PositionNotFound {
                lane: self.id,
                position,
            });
        }
        let removed = self.occupants.remove(position as usize - 1);
        for occupant in &mut self.occupants[position as usize - 1..] {
            occupant.position -= 1;
        }
        Ok(removed)
    }

    /// True when positions are exactly `1..=len` and `len <= capacity`.
    pub fn is_consistent(&self) -> bool {
        self.len() <= self.capacity
            && self
                .occupants
                .iter()
                .enumerate()
                .all(|(i, o)| o.position == i as u32 + 1)
    }
}
