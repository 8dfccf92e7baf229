//! White Rabbit loss: the timing gate on both paths.

mod common;

use std::time::Duration;

use common::{arm_direct, bench_synced, fd, tdc};
use libwrtd::LogReader;
use wrtd_common::{LogLevel, MissReason, TriggerEntry, TriggerId, TriggerMode};
use wrtd_output::OutputState;
use wrtd_sim::{SimTransport, TestBench};
use wrtd_time::Timestamp;

#[test]
fn link_loss_drops_the_pulse_in_flight() {
    let bench = bench_synced();
    let out = fd(&bench);
    let id = TriggerId::new(7, 7, 7);
    arm_direct(&out, 0, id, 0, TriggerMode::Single);
    out.set_log_level(0, LogLevel::MISSED).expect("log level");

    // Pulse 5 ms past the current 4 s of TAI.
    bench.borrow_mut().inject_packet(&[TriggerEntry {
        ts: Timestamp::new(4, 625_000, 0),
        id,
        seq: 0,
    }]);
    bench.borrow_mut().step();
    assert!(bench.borrow().generators.channel(0).armed);

    // Drop the link mid-flight. The monitor notices at the end of the
    // iteration; the next one drops the head.
    bench.borrow_mut().wr.set_link(false);
    bench.borrow_mut().step_n(2);

    let entry = {
        let b = bench.borrow();
        let ch = &b.output.outputs()[0];
        assert_eq!(ch.stats.miss_no_timing, 1);
        assert_eq!(ch.stats.hits, 0);
        assert!(ch.queue.is_empty());
        assert!(ch.idle);
        assert_eq!(ch.state, OutputState::Idle);
        assert!(!b.generators.channel(0).armed, "generator must be disarmed");
        b.output.outputs()[0].last_lost
    };
    assert_eq!(entry.id, id);

    let mut log = LogReader::new(SimTransport::fd_log(&bench));
    let logged = log
        .next_entry(Duration::from_millis(5))
        .expect("log decode")
        .expect("missed entry");
    assert_eq!(logged.kind, LogLevel::MISSED);
    assert_eq!(logged.miss_reason, Some(MissReason::NoTiming));
}

#[test]
fn input_without_timing_counts_and_drops_the_trigger() {
    // Never synced: the link machine sits in Offline.
    let bench = std::rc::Rc::new(std::cell::RefCell::new(TestBench::new()));
    let input = tdc(&bench);
    input.enable(0, true).expect("enable");
    input.assign_trigger(0, TriggerId::new(1, 2, 3)).expect("assign");
    input.arm(0, true).expect("arm");

    bench.borrow_mut().fifo.push_pulse(0, 100, 0);
    bench.borrow_mut().step();

    let b = bench.borrow();
    let ch = &b.input.channels()[0];
    assert_eq!(ch.stats.total_pulses, 1, "pulse is tagged regardless");
    assert_eq!(ch.stats.sent_pulses, 0);
    assert_eq!(ch.stats.miss_no_timing, 1);
    drop(b);
    assert!(bench.borrow_mut().take_tx_packets().is_empty());
    assert!(bench.borrow().loopback.is_empty());
}

#[test]
fn recovery_requires_a_full_resync() {
    let bench = bench_synced();
    bench.borrow_mut().wr.set_link(false);
    bench.borrow_mut().step();
    assert!(!bench.borrow().output.link().is_timing_ok());

    // Link back: both machines walk the ladder again.
    bench.borrow_mut().wr.all_up();
    bench.borrow_mut().step_n(3);
    bench.borrow_mut().clock.advance_secs(4);
    bench.borrow_mut().step_n(2);
    assert!(bench.borrow().input.link().is_timing_ok());
    assert!(bench.borrow().output.link().is_timing_ok());
}
