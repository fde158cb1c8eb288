//! Tests for waitlist promotion and cancellation.

use super::test_rig::Rig;
use super::*;
use crate::store::StoreSnapshot;
use crate::waitlist::WaitlistStatus;

fn waiting_entry(id: u64, vehicle: u64, requested_at: u64) -> WaitlistEntry {
    WaitlistEntry {
        id: EntryId(id),
        vehicle_id: VehicleId(vehicle),
        requested_at: Timestamp(requested_at),
        status: WaitlistStatus::Pending,
    }
}

/// Empty lanes with `vehicles` already waiting, as after a restart.
fn rig_with_waitlist(lanes: u32, capacity: u32, vehicles: &[u64]) -> Rig {
    let snapshot = StoreSnapshot {
        waitlist: vehicles
            .iter()
            .enumerate()
            .map(|(i, &v)| waiting_entry(i as u64 + 1, v, 100 + i as u64))
            .collect(),
        ..Default::default()
    };
    Rig::from_snapshot(AllocationConfig::new(lanes, capacity), snapshot).expect("opens")
}

// -------------------------------------------------------------------------
// FIFO
// -------------------------------------------------------------------------

#[test]
fn test_promotion_follows_arrival_order() {
    let rig = Rig::new(1, 1);
    rig.admit_all([1, 20, 30, 40]);
    assert_eq!(rig.waiting(), vec![20, 30, 40]);

    let mut promoted = Vec::new();
    let mut top = VehicleId(1);
    for _ in 0..3 {
        let departure = rig.engine.depart_top(LaneId(1), top).unwrap();
        let p = departure.promoted.expect("someone was waiting");
        promoted.push(p.vehicle.0);
        top = p.vehicle;
    }
    assert_eq!(promoted, vec![20, 30, 40]);
    assert_eq!(rig.engine.count_pending(), 0);
}

#[test]
fn test_clock_stepping_back_keeps_fifo() {
    let rig = Rig::new(1, 1);
    rig.admit_all([1, 2]);
    rig.clock.set(0);
    rig.engine.admit(VehicleId(3)).unwrap();

    let pending = rig.engine.pending();
    assert_eq!(pending[0].vehicle_id, VehicleId(2));
    assert!(pending[1].requested_at >= pending[0].requested_at);

    let departure = rig.engine.depart_top(LaneId(1), VehicleId(1)).unwrap();
    assert_eq!(departure.promoted.map(|p| p.vehicle), Some(VehicleId(2)));
}

#[test]
fn test_cancelled_entry_is_skipped() {
    let rig = Rig::new(1, 1);
    rig.admit_all([1, 2, 3]);
    let entry = rig.engine.pending()[0].id;
    rig.engine.cancel_waiting(entry).unwrap();

    let departure = rig.engine.depart_top(LaneId(1), VehicleId(1)).unwrap();
    assert_eq!(departure.promoted.map(|p| p.vehicle), Some(VehicleId(3)));
    assert_eq!(
        rig.engine.waitlist_entry(entry).unwrap().status,
        WaitlistStatus::Cancelled
    );
}

// -------------------------------------------------------------------------
// promote
// -------------------------------------------------------------------------

#[test]
fn test_promote_fills_one_slot_per_call() {
    let rig = rig_with_waitlist(1, 3, &[5, 6, 7]);
    let first = rig.engine.promote(LaneId(1)).unwrap().expect("slot free");
    assert_eq!(first.vehicle, VehicleId(5));
    assert_eq!(first.placement.position, 1);
    assert_eq!(rig.waiting(), vec![6, 7]);
    assert_eq!(rig.stack(1), vec![5]);
    rig.assert_store_in_sync();
}

#[test]
fn test_promote_full_lane_is_noop() {
    let rig = Rig::new(1, 1);
    rig.admit_all([1, 2]);
    let commits = rig.store.commit_count();
    assert!(rig.engine.promote(LaneId(1)).unwrap().is_none());
    assert_eq!(rig.store.commit_count(), commits);
    assert_eq!(rig.waiting(), vec![2]);
}

#[test]
fn test_promote_empty_waitlist_is_noop() {
    let rig = Rig::new(1, 2);
    assert!(rig.engine.promote(LaneId(1)).unwrap().is_none());
    assert_eq!(rig.store.commit_count(), 0);
}

#[test]
fn test_promote_respects_held_slots() {
    let rig = Rig::new(1, 2);
    rig.admit_all([1, 2, 3]);
    // V1 is retrieved, V2 is held outside, V3 takes V1's slot.
    let retrieval = rig.engine.retrieve(LaneId(1), VehicleId(1)).unwrap();
    assert_eq!(retrieval.promoted.map(|p| p.vehicle), Some(VehicleId(3)));
    rig.engine.admit(VehicleId(4)).unwrap();

    assert!(rig.engine.promote(LaneId(1)).unwrap().is_none());
    assert_eq!(rig.waiting(), vec![4]);
}

#[test]
fn test_promote_unknown_lane() {
    let rig = Rig::new(1, 2);
    let err = rig.engine.promote(LaneId(2)).unwrap_err();
    assert!(matches!(err, AllocationError::NotFound(Missing::Lane(LaneId(2)))));
}

#[test]
fn test_promote_next_picks_first_open_lane() {
    let rig = rig_with_waitlist(3, 1, &[8, 9]);
    let promoted = rig.engine.promote_next().unwrap().expect("lanes are empty");
    assert_eq!(promoted.vehicle, VehicleId(8));
    assert_eq!(promoted.placement.lane, LaneId(1));

    let promoted = rig.engine.promote_next().unwrap().expect("two lanes left");
    assert_eq!(promoted.vehicle, VehicleId(9));
    assert_eq!(promoted.placement.lane, LaneId(2));

    assert!(rig.engine.promote_next().unwrap().is_none());
}

#[test]
fn test_promote_next_with_every_lane_taken() {
    let rig = Rig::new(2, 1);
    rig.admit_all([1, 2, 3]);
    assert!(rig.engine.promote_next().unwrap().is_none());
    assert_eq!(rig.waiting(), vec![3]);
}

// -------------------------------------------------------------------------
// cancel_waiting
// -------------------------------------------------------------------------

#[test]
fn test_cancel_twice_is_invalid_state() {
    let rig = rig_with_waitlist(1, 1, &[4]);
    rig.engine.cancel_waiting(EntryId(1)).unwrap();
    let err = rig.engine.cancel_waiting(EntryId(1)).unwrap_err();
    assert!(matches!(
        err,
        AllocationError::InvalidState {
            status: WaitlistStatus::Cancelled,
            ..
        }
    ));
    rig.assert_store_in_sync();
}

#[test]
fn test_cancel_promoted_entry_is_invalid_state() {
    let rig = rig_with_waitlist(1, 1, &[4]);
    rig.engine.promote(LaneId(1)).unwrap();
    let err = rig.engine.cancel_waiting(EntryId(1)).unwrap_err();
    assert!(matches!(
        err,
        AllocationError::InvalidState {
            status: WaitlistStatus::Promoted,
            ..
        }
    ));
}

#[test]
fn test_cancel_unknown_entry() {
    let rig = Rig::new(1, 1);
    let err = rig.engine.cancel_waiting(EntryId(42)).unwrap_err();
    assert!(matches!(err, AllocationError::NotFound(Missing::Entry(EntryId(42)))));
}

#[test]
fn test_cancel_racing_promote_commits_exactly_one() {
    for _ in 0..50 {
        let rig = rig_with_waitlist(1, 1, &[4]);
        let (cancelled, promoted) = std::thread::scope(|s| {
            let cancel = s.spawn(|| rig.engine.cancel_waiting(EntryId(1)));
            let promote = s.spawn(|| rig.engine.promote(LaneId(1)));
            (
                cancel.join().expect("cancel thread"),
                promote.join().expect("promote thread"),
            )
        });
        let promoted = promoted.expect("promote never errors here");

        match (cancelled, promoted) {
            (Ok(entry), None) => {
                assert_eq!(entry.status, WaitlistStatus::Cancelled);
                assert!(rig.stack(1).is_empty());
            }
            (Err(AllocationError::InvalidState { status, .. }), Some(p)) => {
                assert_eq!(status, WaitlistStatus::Promoted);
                assert_eq!(p.vehicle, VehicleId(4));
                assert_eq!(rig.stack(1), vec![4]);
            }
            other => panic!("both or neither transition committed: {other:?}"),
        }
        assert_eq!(rig.engine.count_pending(), 0);
        rig.assert_store_in_sync();
    }
}
