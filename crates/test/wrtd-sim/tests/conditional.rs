//! Arm-on-A, fire-on-B conditional gating.

mod common;

use common::{bench_synced, fd};
use wrtd_common::{TriggerEntry, TriggerId, TriggerMode};
use wrtd_output::OutputState;
use wrtd_sim::SimTransport;
use wrtd_time::Timestamp;

use libwrtd::{TriggerHandle, WrtdOutput};

fn setup_pair(
    out: &WrtdOutput<SimTransport>,
    channel: u32,
    trig: TriggerId,
    cond: TriggerId,
    mode: TriggerMode,
) -> TriggerHandle {
    out.enable(channel, true).expect("enable");
    let handle = out.trig_assign(channel, trig, Some(cond)).expect("assign pair");
    assert!(handle.cond.is_some(), "conditional assignment must carry a condition");
    out.trig_enable(&handle, true).expect("enable pair");
    out.trig_set_delay_ps(&handle, 0).expect("trig delay");
    out.trig_set_condition_delay_ps(&handle, 0).expect("cond delay");
    out.set_mode(channel, mode).expect("mode");
    out.arm(channel, true).expect("arm");
    handle
}

fn inject(bench: &common::Bench, id: TriggerId, ts: Timestamp, seq: u32) {
    bench.borrow_mut().inject_packet(&[TriggerEntry { ts, id, seq }]);
    bench.borrow_mut().step();
}

#[test]
fn conditional_fires_only_after_its_condition() {
    let bench = bench_synced();
    let out = fd(&bench);
    let cond = TriggerId::new(2, 2, 2);
    let trig = TriggerId::new(2, 2, 3);
    setup_pair(&out, 1, trig, cond, TriggerMode::Auto);

    // The conditional alone does nothing.
    inject(&bench, trig, Timestamp::new(20, 0, 0), 0);
    {
        let b = bench.borrow();
        let ch = &b.output.outputs()[1];
        assert!(ch.queue.is_empty());
        assert_eq!(ch.state, OutputState::Armed);
    }

    // The condition arms the stored conditional.
    inject(&bench, cond, Timestamp::new(21, 0, 0), 1);
    {
        let b = bench.borrow();
        assert_eq!(b.output.outputs()[1].state, OutputState::ConditionHit);
        assert!(b.output.outputs()[1].queue.is_empty());
    }

    // Now the conditional schedules a pulse and re-arms (Auto).
    inject(&bench, trig, Timestamp::new(22, 0, 0), 2);
    let b = bench.borrow();
    let ch = &b.output.outputs()[1];
    assert_eq!(ch.queue.len(), 1);
    assert_eq!(ch.state, OutputState::Armed);
    assert_eq!(ch.last_enqueued.seq, 2);
}

#[test]
fn single_mode_conditional_consumes_the_arm() {
    let bench = bench_synced();
    let out = fd(&bench);
    let cond = TriggerId::new(4, 4, 4);
    let trig = TriggerId::new(4, 4, 5);
    setup_pair(&out, 0, trig, cond, TriggerMode::Single);

    inject(&bench, cond, Timestamp::new(30, 0, 0), 0);
    inject(&bench, trig, Timestamp::new(31, 0, 0), 1);

    let b = bench.borrow();
    let ch = &b.output.outputs()[0];
    assert_eq!(ch.queue.len(), 1);
    assert_eq!(ch.state, OutputState::Idle);
}

#[test]
fn other_triggers_are_ignored_while_waiting_for_the_conditional() {
    let bench = bench_synced();
    let out = fd(&bench);
    let cond = TriggerId::new(5, 5, 5);
    let trig = TriggerId::new(5, 5, 6);
    let other = TriggerId::new(5, 5, 7);
    setup_pair(&out, 1, trig, cond, TriggerMode::Auto);
    let other_handle = out.trig_assign(1, other, None).expect("assign other");
    out.trig_enable(&other_handle, true).expect("enable other");
    out.trig_set_delay_ps(&other_handle, 0).expect("other delay");

    inject(&bench, cond, Timestamp::new(40, 0, 0), 0);
    // A direct trigger must not fire while the output waits for its
    // stored conditional.
    inject(&bench, other, Timestamp::new(41, 0, 0), 1);
    {
        let b = bench.borrow();
        assert!(b.output.outputs()[1].queue.is_empty());
        assert_eq!(b.output.outputs()[1].state, OutputState::ConditionHit);
    }

    inject(&bench, trig, Timestamp::new(42, 0, 0), 2);
    let b = bench.borrow();
    assert_eq!(b.output.outputs()[1].queue.len(), 1);
}

#[test]
fn removing_the_pending_conditional_rearms_the_output() {
    let bench = bench_synced();
    let out = fd(&bench);
    let cond = TriggerId::new(6, 6, 6);
    let trig = TriggerId::new(6, 6, 7);
    let handle = setup_pair(&out, 2, trig, cond, TriggerMode::Auto);

    inject(&bench, cond, Timestamp::new(50, 0, 0), 0);
    {
        let b = bench.borrow();
        assert_eq!(b.output.outputs()[2].state, OutputState::ConditionHit);
    }

    out.trig_remove(&handle).expect("remove pair");
    bench.borrow_mut().step();

    let b = bench.borrow();
    assert_eq!(b.output.outputs()[2].state, OutputState::Armed);
    drop(b);
    assert!(matches!(
        out.trig_get_by_id(2, trig),
        Err(libwrtd::Error::TriggerNotFound)
    ));
}
