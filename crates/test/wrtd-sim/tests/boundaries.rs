//! Validation boundaries and queue-overflow accounting.

mod common;

use common::{arm_direct, bench_synced, fd, tdc};
use libwrtd::Error;
use wrtd_common::{TriggerEntry, TriggerId, TriggerMode};
use wrtd_output::OutputState;
use wrtd_time::Timestamp;

#[test]
fn pulse_width_boundaries() {
    let bench = bench_synced();
    let out = fd(&bench);

    assert!(matches!(out.set_width_ps(0, 249_000), Err(Error::InvalidPulseWidth)));
    out.set_width_ps(0, 250_000).expect("exactly 250 ns is accepted");
    out.set_width_ps(0, 999_999_999_000).expect("just under one second");
    assert!(matches!(
        out.set_width_ps(0, 1_000_000_000_000),
        Err(Error::InvalidPulseWidth)
    ));
}

#[test]
fn delay_boundaries() {
    let bench = bench_synced();
    let out = fd(&bench);
    let handle = out.trig_assign(0, TriggerId::new(1, 1, 1), None).expect("assign");

    out.trig_set_delay_ps(&handle, 0).expect("zero delay is accepted");
    assert!(matches!(
        out.trig_set_delay_ps(&handle, 1_000_000_000_000),
        Err(Error::InvalidDelay)
    ));

    let input = tdc(&bench);
    input.set_delay_ps(0, 0).expect("zero input delay");
    assert!(matches!(
        input.set_delay_ps(0, 1_000_000_000_000),
        Err(Error::InvalidDelay)
    ));
}

#[test]
fn dead_time_boundaries_quantize_to_ticks() {
    let bench = bench_synced();
    let out = fd(&bench);

    // 79.9992 µs quantizes to 9 999 ticks: out of range.
    assert!(matches!(out.set_dead_time_ps(0, 79_999_200), Err(Error::InvalidDeadTime)));
    out.set_dead_time_ps(0, 80_000_000).expect("80 µs");
    out.set_dead_time_ps(0, 80_000_000_000).expect("80 ms");
    assert!(matches!(
        out.set_dead_time_ps(0, 80_000_008_000),
        Err(Error::InvalidDeadTime)
    ));

    let input = tdc(&bench);
    input.set_dead_time_ps(0, 80_000_000).expect("input 80 µs");
    assert!(matches!(input.set_dead_time_ps(0, 1_000), Err(Error::InvalidDeadTime)));
}

#[test]
fn channel_bounds_are_checked_client_side() {
    let bench = bench_synced();
    assert!(matches!(tdc(&bench).enable(5, true), Err(Error::InvalidChannel)));
    assert!(matches!(fd(&bench).enable(4, true), Err(Error::InvalidChannel)));
}

#[test]
fn seventeenth_pulse_overflows_without_state_change() {
    let bench = bench_synced();
    let out = fd(&bench);
    let id = TriggerId::new(8, 8, 8);
    arm_direct(&out, 0, id, 0, TriggerMode::Auto);

    // 17 triggers, one second apart (dead time is no obstacle), injected
    // in wire packets of at most five.
    let entries: Vec<_> = (0..17u32)
        .map(|n| TriggerEntry {
            ts: Timestamp::new(100 + u64::from(n), 0, 0),
            id,
            seq: n,
        })
        .collect();
    for chunk in entries.chunks(5) {
        bench.borrow_mut().inject_packet(chunk);
        bench.borrow_mut().step();
    }

    let b = bench.borrow();
    let ch = &b.output.outputs()[0];
    assert_eq!(ch.queue.len(), 16);
    assert_eq!(ch.stats.miss_overflow, 1);
    assert_eq!(ch.state, OutputState::Armed, "overflow must not disturb the state");
    assert_eq!(ch.last_lost.seq, 0, "overflow does not count as a lost in-flight pulse");
}
