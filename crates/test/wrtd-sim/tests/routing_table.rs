//! Routing-table capacity and host-visible handle laws.

mod common;

use common::{bench_synced, fd};
use libwrtd::Error;
use wrtd_common::TriggerId;

#[test]
fn table_fills_to_capacity_and_recovers_after_remove() {
    let bench = bench_synced();
    let out = fd(&bench);

    let mut handles = Vec::new();
    for n in 0..128u32 {
        let handle = out
            .trig_assign(0, TriggerId::new(1, 1, n), None)
            .unwrap_or_else(|err| panic!("assign {n}: {err}"));
        handles.push(handle);
    }

    // The 129th is refused with no side effect.
    assert!(matches!(
        out.trig_assign(0, TriggerId::new(2, 0, 0), None),
        Err(Error::TableFull)
    ));
    assert_eq!(bench.borrow().output.table().len(), 128);

    // Removing any one entry makes room again.
    out.trig_remove(&handles[40]).expect("remove");
    out.trig_assign(0, TriggerId::new(2, 0, 0), None).expect("assign after remove");
}

#[test]
fn assign_lookup_remove_round_trip() {
    let bench = bench_synced();
    let out = fd(&bench);
    let id = TriggerId::new(10, 11, 12);

    let handle = out.trig_assign(1, id, None).expect("assign");
    let state = out.trig_get_by_id(1, id).expect("lookup");
    assert_eq!(state.trigger, id);
    assert_eq!(state.handle.trig, handle.trig);
    assert!(!state.is_conditional);
    assert!(!state.enabled, "fresh rules start disabled");

    out.trig_remove(&handle).expect("remove");
    assert!(matches!(out.trig_get_by_id(1, id), Err(Error::TriggerNotFound)));
    // A stale handle is refused too.
    assert!(matches!(out.trig_remove(&handle), Err(Error::TriggerNotFound)));
}

#[test]
fn trig_list_walks_entries_in_identity_order() {
    let bench = bench_synced();
    let out = fd(&bench);

    for trigger in [30u32, 10, 20] {
        out.trig_assign(2, TriggerId::new(1, 1, trigger), None).expect("assign");
    }
    // An entry on another output must not show up in the walk.
    out.trig_assign(3, TriggerId::new(1, 1, 15), None).expect("assign other");

    let listed = out.trig_list(2).expect("list");
    let triggers: Vec<_> = listed.iter().map(|t| t.trigger.trigger).collect();
    assert_eq!(triggers, vec![10, 20, 30]);
}

#[test]
fn one_identity_can_drive_several_outputs() {
    let bench = bench_synced();
    let out = fd(&bench);
    let id = TriggerId::new(5, 5, 5);

    let h0 = out.trig_assign(0, id, None).expect("assign 0");
    let h1 = out.trig_assign(1, id, None).expect("assign 1");
    assert_eq!(h0.trig, h1.trig, "same identity shares one table row");
    assert_eq!(bench.borrow().output.table().len(), 1);

    // Removing one output's rule keeps the row for the other.
    out.trig_remove(&h0).expect("remove 0");
    assert!(out.trig_get_by_id(1, id).is_ok());
    assert!(matches!(out.trig_get_by_id(0, id), Err(Error::TriggerNotFound)));
}
