//! The fixed, ordered set of lanes and the lane-selection policy.
//!
//! Each lane sits behind its own mutex. Callers that need more than one lane
//! must go through [`LaneRegistry::lock_all`], which acquires guards in
//! ascending lane id so two registry-wide operations can never deadlock.

use parking_lot::{Mutex, MutexGuard};

use crate::config::AllocationConfig;
use crate::error::{AllocationError, Missing};
use crate::ids::LaneId;

use super::stack::Lane;

pub struct LaneRegistry {
    lanes: Vec<Mutex<Lane>>,
    capacity: u32,
}

impl LaneRegistry {
    /// Empty lanes `1..=lane_count`.
    pub fn new(config: &AllocationConfig) -> Self {
        Self {
            lanes: config
                .lane_ids()
                .map(|id| Mutex::new(Lane::new(id, config.lane_capacity)))
                .collect(),
            capacity: config.lane_capacity,
        }
    }

    /// Build from already-restored lanes. `lanes[i]` must have id `i + 1`.
    pub(crate) fn from_lanes(lanes: Vec<Lane>, capacity: u32) -> Self {
        debug_assert!(lanes
            .iter()
            .enumerate()
            .all(|(i, lane)| lane.id() == LaneId(i as u32 + 1)));
        Self {
            lanes: lanes.into_iter().map(Mutex::new).collect(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn contains(&self, id: LaneId) -> bool {
        id.0 >= 1 && (id.0 as usize) <= self.lanes.len()
    }

    pub fn get(&self, id: LaneId) -> Result<&Mutex<Lane>, AllocationError> {
        if !self.contains(id) {
            return Err(AllocationError::NotFound(Missing::Lane(id)));
        }
        Ok(&self.lanes[id.0 as usize - 1])
    }

    /// Lock a single lane.
    pub fn lock(&self, id: LaneId) -> Result<LaneGuards<'_>, AllocationError> {
        let guard = self.get(id)?.lock();
        Ok(LaneGuards {
            guards: vec![guard],
        })
    }

    /// Lock every lane, in ascending id order.
    pub fn lock_all(&self) -> LaneGuards<'_> {
        LaneGuards {
            guards: self.lanes.iter().map(|lane| lane.lock()).collect(),
        }
    }
}

/// A set of locked lanes, ordered by ascending id. The default set holds no
/// lanes.
#[derive(Default)]
pub struct LaneGuards<'a> {
    guards: Vec<MutexGuard<'a, Lane>>,
}

impl LaneGuards<'_> {
    pub fn iter(&self) -> impl Iterator<Item = &Lane> {
        self.guards.iter().map(|guard| &**guard)
    }

    pub fn get(&self, id: LaneId) -> Option<&Lane> {
        self.index_of(id).map(|i| &*self.guards[i])
    }

    pub fn get_mut(&mut self, id: LaneId) -> Option<&mut Lane> {
        self.index_of(id).map(|i| &mut *self.guards[i])
    }

    fn index_of(&self, id: LaneId) -> Option<usize> {
        self.guards.iter().position(|guard| guard.id() == id)
    }

    /// First lane, by ascending id, with an occupant count below capacity.
    pub fn find_available_lane(&self) -> Option<LaneId> {
        find_available_lane(self.iter(), |_| 0)
    }

    /// Like [`Self::find_available_lane`], but `held(lane)` extra slots per
    /// lane are treated as occupied.
    pub fn find_available_lane_with(&self, held: impl Fn(LaneId) -> u32) -> Option<LaneId> {
        find_available_lane(self.iter(), held)
    }
}

/// Lane-selection policy: the first lane in iteration order with a free slot
/// once `held` slots are subtracted.
pub fn find_available_lane<'l>(
    lanes: impl IntoIterator<Item = &'l Lane>,
    held: impl Fn(LaneId) -> u32,
) -> Option<LaneId> {
    lanes
        .into_iter()
        .find(|lane| lane.free_slots() > held(lane.id()))
        .map(Lane::id)
}
