//! Tests for single-lane stack operations.

use super::*;

use crate::error::AllocationError;
use crate::ids::{LaneId, Timestamp, VehicleId};

fn lane_with(vehicles: &[u64]) -> Lane {
    let mut lane = Lane::new(LaneId(1), 3);
    for &v in vehicles {
        lane.push(VehicleId(v), Timestamp(v)).expect("push");
    }
    lane
}

// -------------------------------------------------------------------------
// push / pop_top
// -------------------------------------------------------------------------

#[test]
fn test_push_assigns_consecutive_positions() {
    let mut lane = Lane::new(LaneId(1), 3);
    assert_eq!(lane.push(VehicleId(1), Timestamp(10)).unwrap(), 1);
    assert_eq!(lane.push(VehicleId(2), Timestamp(20)).unwrap(), 2);
    assert_eq!(lane.push(VehicleId(3), Timestamp(30)).unwrap(), 3);
    assert!(lane.is_full());
    assert!(lane.is_consistent());
    assert_eq!(lane.occupants()[1].entered_at, Timestamp(20));
}

#[test]
fn test_push_into_full_lane_fails() {
    let mut lane = lane_with(&[1, 2, 3]);
    let err = lane.push(VehicleId(4), Timestamp(40)).expect_err("full");
    assert!(matches!(
        err,
        AllocationError::LaneFull {
            lane: LaneId(1),
            capacity: 3
        }
    ));
    assert_eq!(lane.len(), 3);
}

#[test]
fn test_pop_top_returns_last_placed() {
    let mut lane = lane_with(&[1, 2]);
    let top = lane.pop_top().expect("pop");
    assert_eq!(top.vehicle_id, VehicleId(2));
    assert_eq!(top.position, 2);
    assert_eq!(lane.len(), 1);
}

#[test]
fn test_pop_top_on_empty_lane_fails() {
    let mut lane = Lane::new(LaneId(4), 3);
    assert!(matches!(
        lane.pop_top(),
        Err(AllocationError::LaneEmpty { lane: LaneId(4) })
    ));
}

// -------------------------------------------------------------------------
// remove_at / find
// -------------------------------------------------------------------------

#[test]
fn test_remove_at_top_leaves_no_shift() {
    let mut lane = lane_with(&[1, 2, 3]);
    let removed = lane.remove_at(3).expect("remove");
    assert_eq!(removed.vehicle_id, VehicleId(3));
    assert_eq!(lane.find(VehicleId(2)), Some(2));
    assert!(lane.is_consistent());
}

#[test]
fn test_remove_at_middle_compacts_positions() {
    let mut lane = lane_with(&[1, 2, 3]);
    let removed = lane.remove_at(2).expect("remove");
    assert_eq!(removed.vehicle_id, VehicleId(2));
    assert_eq!(removed.position, 2);
    assert_eq!(lane.find(VehicleId(3)), Some(2));
    assert!(lane.is_consistent());
}

#[test]
fn test_remove_at_missing_position_fails() {
    let mut lane = lane_with(&[1]);
    for position in [0, 2, 9] {
        assert!(matches!(
            lane.remove_at(position),
            Err(AllocationError::PositionNotFound { .. })
        ));
    }
    assert_eq!(lane.len(), 1);
}

#[test]
fn test_find_absent_vehicle() {
    let lane = lane_with(&[1, 2]);
    assert_eq!(lane.find(VehicleId(1)), Some(1));
    assert_eq!(lane.find(VehicleId(99)), None);
}

#[test]
fn test_free_slots_and_top() {
    let lane = lane_with(&[5]);
    assert_eq!(lane.free_slots(), 2);
    assert_eq!(lane.top().map(|o| o.vehicle_id), Some(VehicleId(5)));
    assert!(Lane::new(LaneId(1), 3).top().is_none());
}

// -------------------------------------------------------------------------
// restore
// -------------------------------------------------------------------------

fn occ(vehicle: u64, position: u32) -> Occupancy {
    Occupancy {
        vehicle_id: VehicleId(vehicle),
        position,
        entered_at: Timestamp(0),
    }
}

#[test]
fn test_restore_sorts_rows() {
    let lane = Lane::restore(LaneId(2), 3, vec![occ(9, 2), occ(8, 1)]).expect("restore");
    assert_eq!(lane.top().map(|o| o.vehicle_id), Some(VehicleId(9)));
    assert!(lane.is_consistent());
}

#[test]
fn test_restore_rejects_gap() {
    let err = Lane::restore(LaneId(1), 3, vec![occ(1, 1), occ(2, 3)]).expect_err("gap");
    assert!(format!("{err}").contains("expected position 2"));
}

#[test]
fn test_restore_rejects_duplicate_position() {
    assert!(Lane::restore(LaneId(1), 3, vec![occ(1, 1), occ(2, 1)]).is_err());
}

#[test]
fn test_restore_rejects_over_capacity() {
    let rows = vec![occ(1, 1), occ(2, 2), occ(3, 3), occ(4, 4)];
    assert!(Lane::restore(LaneId(1), 3, rows).is_err());
}
