//! Bevy embedding.
//!
//! [`AllocationPlugin`] shares one engine with the app as [`SharedEngine`]
//! and keeps a [`LaneBoard`] summary resource current, so UI or telemetry
//! systems can read lane occupancy without locking the engine themselves.

use std::sync::Arc;

use bevy::prelude::*;

use crate::engine::AllocationEngine;
use crate::ids::{LaneId, VehicleId};

#[derive(Resource, Clone, Deref)]
pub struct SharedEngine(pub Arc<AllocationEngine>);

/// One lane as shown on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneSummary {
    pub lane: LaneId,
    pub capacity: u32,
    pub occupied: u32,
    /// Slots reserved for displaced vehicles.
    pub held: u32,
    /// Vehicle at the accessible end, if any.
    pub top: Option<VehicleId>,
}

impl LaneSummary {
    pub fn open_slots(&self) -> u32 {
        self.capacity
            .saturating_sub(self.occupied)
            .saturating_sub(self.held)
    }
}

/// Occupancy snapshot refreshed every `Update`.
#[derive(Resource, Debug, Clone, Default)]
pub struct LaneBoard {
    pub lanes: Vec<LaneSummary>,
    pub pending: usize,
    pub displaced: u32,
}

impl LaneBoard {
    pub fn open_slots(&self) -> u32 {
        self.lanes.iter().map(LaneSummary::open_slots).sum()
    }
}

/// System: rebuild the board from the engine's read views.
pub fn refresh_lane_board(engine: Res<SharedEngine>, mut board: ResMut<LaneBoard>) {
    let lot = engine.board();
    board.displaced = lot.lanes.iter().map(|view| view.held).sum();
    board.pending = lot.pending;
    board.lanes = lot
        .lanes
        .into_iter()
        .map(|view| LaneSummary {
            lane: view.id,
            capacity: view.capacity,
            occupied: view.occupants.len() as u32,
            held: view.held,
            top: view.occupants.first().map(|o| o.vehicle_id),
        })
        .collect();
}

pub struct AllocationPlugin {
    engine: Arc<AllocationEngine>,
}

impl AllocationPlugin {
    pub fn new(engine: Arc<AllocationEngine>) -> Self {
        Self { engine }
    }
}

impl Plugin for AllocationPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.engine.config().clone())
            .insert_resource(SharedEngine(self.engine.clone()))
            .init_resource::<LaneBoard>()
            .add_systems(Update, refresh_lane_board);
    }
}
