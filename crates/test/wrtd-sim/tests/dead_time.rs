//! Dead-time enforcement on the output path.

mod common;

use std::time::Duration;

use common::{arm_direct, bench_synced, fd};
use libwrtd::LogReader;
use wrtd_common::{LogLevel, MissReason, TriggerEntry, TriggerId, TriggerMode};
use wrtd_sim::SimTransport;
use wrtd_time::Timestamp;

#[test]
fn second_pulse_inside_dead_time_is_dropped_and_logged() {
    let bench = bench_synced();
    let out = fd(&bench);
    let id = TriggerId::new(3, 3, 3);
    // Default dead time is 80 µs (10 000 ticks); width 1 µs.
    arm_direct(&out, 0, id, 0, TriggerMode::Auto);
    out.set_log_level(0, LogLevel::MISSED).expect("log level");

    bench.borrow_mut().inject_packet(&[
        TriggerEntry { ts: Timestamp::new(10, 0, 0), id, seq: 0 },
        // 79 µs after the first: inside the 80 µs dead time.
        TriggerEntry { ts: Timestamp::new(10, 9_875, 0), id, seq: 1 },
    ]);
    bench.borrow_mut().step();

    {
        let b = bench.borrow();
        let ch = &b.output.outputs()[0];
        assert_eq!(ch.queue.len(), 1);
        assert_eq!(ch.stats.miss_deadtime, 1);
    }

    bench.borrow_mut().generators.fire(0);
    bench.borrow_mut().step();

    {
        let b = bench.borrow();
        assert_eq!(b.output.outputs()[0].stats.hits, 1);
    }

    let mut log = LogReader::new(SimTransport::fd_log(&bench));
    let entry = log
        .next_entry(Duration::from_millis(5))
        .expect("log decode")
        .expect("one missed entry");
    assert_eq!(entry.kind, LogLevel::MISSED);
    assert_eq!(entry.miss_reason, Some(MissReason::DeadTime));
    assert_eq!(entry.channel, 0);
    assert_eq!(entry.seq, 1);
    // No further log traffic at this level.
    assert!(log.next_entry(Duration::from_millis(2)).expect("quiet").is_none());
}

#[test]
fn pulse_outside_dead_time_is_accepted() {
    let bench = bench_synced();
    let out = fd(&bench);
    let id = TriggerId::new(3, 3, 4);
    arm_direct(&out, 2, id, 0, TriggerMode::Auto);

    bench.borrow_mut().inject_packet(&[
        TriggerEntry { ts: Timestamp::new(10, 0, 0), id, seq: 0 },
        // Exactly at the dead-time boundary: accepted.
        TriggerEntry { ts: Timestamp::new(10, 10_000, 0), id, seq: 1 },
    ]);
    bench.borrow_mut().step();

    let b = bench.borrow();
    let ch = &b.output.outputs()[2];
    assert_eq!(ch.queue.len(), 2);
    assert_eq!(ch.stats.miss_deadtime, 0);
}
