//! Tests for departures, retrieval of buried vehicles and the return of
//! displaced vehicles.

use super::test_rig::Rig;
use super::*;
use crate::store::{OccupancyRow, StoreSnapshot};
use crate::waitlist::WaitlistStatus;

// -------------------------------------------------------------------------
// depart_top
// -------------------------------------------------------------------------

#[test]
fn test_depart_top_promotes_waiting_vehicle() {
    let rig = Rig::new(1, 3);
    rig.admit_all(1..=4);
    assert_eq!(rig.engine.count_pending(), 1);

    let departure = rig.engine.depart_top(LaneId(1), VehicleId(3)).unwrap();
    assert_eq!(departure.vacated.vehicle_id, VehicleId(3));
    assert_eq!(departure.vacated.position, 3);

    let promoted = departure.promoted.expect("V4 was waiting");
    assert_eq!(promoted.vehicle, VehicleId(4));
    assert_eq!(
        promoted.placement,
        Placement {
            lane: LaneId(1),
            position: 3,
        }
    );
    assert_eq!(rig.engine.count_pending(), 0);
    assert_eq!(rig.stack(1), vec![1, 2, 4]);
    assert_eq!(
        rig.engine.waitlist_entry(promoted.entry).unwrap().status,
        WaitlistStatus::Promoted
    );
    rig.assert_store_in_sync();
}

#[test]
fn test_depart_top_of_buried_vehicle_is_mismatch() {
    let rig = Rig::new(1, 3);
    rig.admit_all(1..=3);
    let err = rig.engine.depart_top(LaneId(1), VehicleId(1)).unwrap_err();
    assert!(matches!(
        err,
        AllocationError::PositionMismatch {
            position: 1,
            top: 3,
            ..
        }
    ));
    assert_eq!(rig.stack(1), vec![1, 2, 3]);
}

#[test]
fn test_depart_top_of_absent_vehicle_is_not_found() {
    let rig = Rig::new(2, 3);
    rig.admit_all([1]);
    let err = rig.engine.depart_top(LaneId(2), VehicleId(1)).unwrap_err();
    assert!(matches!(
        err,
        AllocationError::NotFound(Missing::Vehicle {
            lane: LaneId(2),
            vehicle: VehicleId(1),
        })
    ));
}

#[test]
fn test_depart_top_without_waitlist_leaves_slot_free() {
    let rig = Rig::new(1, 2);
    rig.admit_all([1, 2]);
    let departure = rig.engine.depart_top(LaneId(1), VehicleId(2)).unwrap();
    assert!(departure.promoted.is_none());
    assert_eq!(rig.engine.lane(LaneId(1)).unwrap().open_slots(), 1);
}

// -------------------------------------------------------------------------
// retrieve
// -------------------------------------------------------------------------

#[test]
fn test_retrieve_bottom_displaces_top_inward() {
    let rig = Rig::new(1, 3);
    rig.admit_all(1..=3);

    let retrieval = rig.engine.retrieve(LaneId(1), VehicleId(1)).unwrap();
    assert_eq!(retrieval.retrieved.vehicle_id, VehicleId(1));
    let displaced: Vec<(VehicleId, u32)> = retrieval
        .displaced
        .iter()
        .map(|d| (d.vehicle, d.origin_position))
        .collect();
    assert_eq!(displaced, vec![(VehicleId(3), 3), (VehicleId(2), 2)]);
    assert!(retrieval.promoted.is_none());
    assert!(rig.stack(1).is_empty());

    let view = rig.engine.lane(LaneId(1)).unwrap();
    assert_eq!(view.held, 2);
    assert_eq!(view.open_slots(), 1);
    rig.assert_store_in_sync();
}

#[test]
fn test_retrieve_top_vehicle_displaces_nothing() {
    let rig = Rig::new(1, 3);
    rig.admit_all(1..=2);
    let retrieval = rig.engine.retrieve(LaneId(1), VehicleId(2)).unwrap();
    assert!(retrieval.displaced.is_empty());
    assert_eq!(rig.stack(1), vec![1]);
}

#[test]
fn test_retrieve_absent_vehicle_changes_nothing() {
    let rig = Rig::new(1, 3);
    rig.admit_all(1..=2);
    let commits = rig.store.commit_count();
    let err = rig.engine.retrieve(LaneId(1), VehicleId(9)).unwrap_err();
    assert!(matches!(err, AllocationError::NotFound(Missing::Vehicle { .. })));
    assert_eq!(rig.store.commit_count(), commits);
    assert_eq!(rig.stack(1), vec![1, 2]);
}

#[test]
fn test_retrieve_promotes_into_unreserved_slot_only() {
    let rig = Rig::new(1, 3);
    rig.admit_all(1..=5);
    assert_eq!(rig.waiting(), vec![4, 5]);

    // V2 and V3 keep two slots; only V1's slot is free for the waitlist.
    let retrieval = rig.engine.retrieve(LaneId(1), VehicleId(1)).unwrap();
    let promoted = retrieval.promoted.expect("one slot opened");
    assert_eq!(promoted.vehicle, VehicleId(4));
    assert_eq!(promoted.placement.position, 1);
    assert_eq!(rig.waiting(), vec![5]);
    assert_eq!(rig.engine.lane(LaneId(1)).unwrap().open_slots(), 0);
}

// -------------------------------------------------------------------------
// return_displaced
// -------------------------------------------------------------------------

#[test]
fn test_round_trip_restores_relative_order() {
    let rig = Rig::new(1, 3);
    rig.admit_all(1..=3);
    rig.engine.retrieve(LaneId(1), VehicleId(1)).unwrap();

    let report = rig.engine.return_displaced(LaneId(1)).unwrap();
    let returned: Vec<(VehicleId, u32)> = report
        .returned
        .iter()
        .map(|r| (r.vehicle, r.position))
        .collect();
    assert_eq!(returned, vec![(VehicleId(2), 1), (VehicleId(3), 2)]);
    assert_eq!(rig.stack(1), vec![2, 3]);
    assert!(rig.engine.open_displacements(LaneId(1)).unwrap().is_empty());
    rig.assert_store_in_sync();
}

#[test]
fn test_round_trip_from_middle_of_deep_lane() {
    let rig = Rig::new(1, 5);
    rig.admit_all(1..=5);
    rig.engine.retrieve(LaneId(1), VehicleId(2)).unwrap();
    rig.engine.return_displaced(LaneId(1)).unwrap();
    assert_eq!(rig.stack(1), vec![1, 3, 4, 5]);
}

#[test]
fn test_return_with_nothing_displaced_is_idempotent() {
    let rig = Rig::new(1, 3);
    rig.admit_all(1..=2);
    let commits = rig.store.commit_count();

    for _ in 0..2 {
        let report = rig.engine.return_displaced(LaneId(1)).unwrap();
        assert!(report.returned.is_empty());
    }
    assert_eq!(rig.store.commit_count(), commits);
    assert_eq!(rig.stack(1), vec![1, 2]);
}

#[test]
fn test_second_return_after_round_trip_is_noop() {
    let rig = Rig::new(1, 3);
    rig.admit_all(1..=3);
    rig.engine.retrieve(LaneId(1), VehicleId(1)).unwrap();
    rig.engine.return_displaced(LaneId(1)).unwrap();
    let report = rig.engine.return_displaced(LaneId(1)).unwrap();
    assert!(report.returned.is_empty());
    assert_eq!(rig.stack(1), vec![2, 3]);
}

#[test]
fn test_return_after_later_displacement_returns_newest_first() {
    let rig = Rig::new(1, 4);
    rig.admit_all(1..=4);
    // First retrieval pulls V4 out; the later one pulls V2.
    rig.engine.retrieve(LaneId(1), VehicleId(3)).unwrap();
    rig.clock.advance(10);
    rig.engine.retrieve(LaneId(1), VehicleId(1)).unwrap();

    let records = rig.engine.open_displacements(LaneId(1)).unwrap();
    let order: Vec<VehicleId> = records.iter().map(|r| r.vehicle_id).collect();
    assert_eq!(order, vec![VehicleId(2), VehicleId(4)]);

    rig.engine.return_displaced(LaneId(1)).unwrap();
    assert_eq!(rig.stack(1), vec![2, 4]);
}

#[test]
fn test_return_order_survives_clock_stepping_back() {
    let rig = Rig::new(1, 4);
    rig.admit_all(1..=4);
    rig.engine.retrieve(LaneId(1), VehicleId(3)).unwrap();
    rig.clock.set(0);
    rig.engine.retrieve(LaneId(1), VehicleId(1)).unwrap();

    let records = rig.engine.open_displacements(LaneId(1)).unwrap();
    assert!(records[0].moved_at >= records[1].moved_at);

    rig.engine.return_displaced(LaneId(1)).unwrap();
    assert_eq!(rig.stack(1), vec![2, 4]);
    rig.assert_store_in_sync();
}

#[test]
fn test_retrieval_lists_everything_the_lane_still_owes() {
    let rig = Rig::new(1, 4);
    rig.admit_all(1..=4);
    let first = rig.engine.retrieve(LaneId(1), VehicleId(3)).unwrap();
    assert_eq!(first.displaced.len(), 1);
    assert_eq!(first.owed.len(), 1);

    let second = rig.engine.retrieve(LaneId(1), VehicleId(1)).unwrap();
    let pulled: Vec<VehicleId> = second.displaced.iter().map(|d| d.vehicle).collect();
    assert_eq!(pulled, vec![VehicleId(2)]);
    let owed: Vec<VehicleId> = second.owed.iter().map(|r| r.vehicle_id).collect();
    assert_eq!(owed, vec![VehicleId(2), VehicleId(4)]);
    assert_eq!(second.owed, rig.engine.open_displacements(LaneId(1)).unwrap());
}

#[test]
fn test_return_unknown_lane_is_not_found() {
    let rig = Rig::new(1, 3);
    let err = rig.engine.return_displaced(LaneId(3)).unwrap_err();
    assert!(matches!(err, AllocationError::NotFound(Missing::Lane(LaneId(3)))));
}

#[test]
fn test_partial_return_keeps_remaining_in_ledger() {
    // Lane 1 holds two vehicles and owes slots to two more, one over capacity.
    let occupant = |vehicle: u64, position: u32| OccupancyRow {
        lane_id: LaneId(1),
        vehicle_id: VehicleId(vehicle),
        position,
        entered_at: Timestamp(0),
    };
    let record = |id: u64, vehicle: u64, moved_at: u64| DisplacementRecord {
        id: RecordId(id),
        vehicle_id: VehicleId(vehicle),
        lane_id: LaneId(1),
        origin_position: 3,
        moved_at: Timestamp(moved_at),
        returned_at: None,
    };
    let snapshot = StoreSnapshot {
        occupancies: vec![occupant(1, 1), occupant(2, 2)],
        waitlist: vec![],
        displacements: vec![record(1, 3, 10), record(2, 4, 20)],
    };
    let rig = Rig::from_snapshot(AllocationConfig::new(1, 3), snapshot).expect("opens");

    let (returned, remaining, cause) = match rig.engine.return_displaced(LaneId(1)) {
        Err(AllocationError::ReturnIncomplete {
            returned,
            remaining,
            cause,
            ..
        }) => (returned, remaining, cause),
        other => panic!("expected ReturnIncomplete, got {other:?}"),
    };
    assert_eq!(returned, vec![VehicleId(4)]);
    assert_eq!(remaining, vec![VehicleId(3)]);
    assert!(matches!(*cause, AllocationError::LaneFull { .. }));

    assert_eq!(rig.stack(1), vec![1, 2, 4]);
    assert!(matches!(
        rig.engine.locate(VehicleId(3)),
        VehicleStatus::Displaced { .. }
    ));
    rig.assert_store_in_sync();
}
