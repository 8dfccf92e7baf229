//! Host-initiated software triggers on both personalities.

mod common;

use common::{bench_synced, fd, tdc};
use wrtd_common::{TriggerEntry, TriggerId};
use wrtd_output::OutputState;
use wrtd_proto::TriggerPacket;
use wrtd_time::Timestamp;

#[test]
fn input_software_trigger_emits_at_now_plus_delay() {
    let bench = bench_synced();
    let input = tdc(&bench);

    // 100 µs from now, with a host-chosen identity and sequence.
    let entry = TriggerEntry {
        ts: Timestamp::new(0, 12_500, 0),
        id: TriggerId::new(0xF0, 0xF1, 0xF2),
        seq: 1_234,
    };
    input.software_trigger(&entry).expect("sw trigger");
    // The coalesced packet flushes on the next input iteration.
    bench.borrow_mut().step();

    let packets = bench.borrow_mut().take_tx_packets();
    assert_eq!(packets.len(), 1);
    let packet = TriggerPacket::decode(&packets[0]).expect("decode");
    assert_eq!(packet.count, 1);
    let sent = packet.triggers[0];
    assert_eq!(sent.id, entry.id);
    assert_eq!(sent.seq, 1_234);
    // The bench clock sat at 4 s after WR sync.
    assert_eq!(sent.ts, Timestamp::new(4, 12_500, 0));
}

#[test]
fn input_software_trigger_far_in_the_future_still_sends() {
    let bench = bench_synced();
    let input = tdc(&bench);

    let entry = TriggerEntry {
        ts: Timestamp::new(5_000, 0, 0),
        id: TriggerId::new(1, 1, 1),
        seq: 0,
    };
    input.software_trigger(&entry).expect("sw trigger");
    bench.borrow_mut().step();

    let packets = bench.borrow_mut().take_tx_packets();
    assert_eq!(packets.len(), 1, "an advisory never suppresses the send");
    let packet = TriggerPacket::decode(&packets[0]).expect("decode");
    assert_eq!(packet.triggers[0].ts.seconds, 5_004);
}

#[test]
fn output_test_pulse_runs_through_test_pending() {
    let bench = bench_synced();
    let out = fd(&bench);

    let fired_at = out.software_trigger(0, None).expect("sw trigger");
    // Now (4 s) plus the 80 µs scheduling margin.
    assert_eq!(fired_at, Timestamp::new(4, 10_000, 0));

    {
        let b = bench.borrow();
        let ch = &b.output.outputs()[0];
        assert_eq!(ch.state, OutputState::TestPending);
        assert_eq!(ch.queue.len(), 1);
        assert_eq!(ch.last_enqueued.seq, u32::MAX);
    }

    // Scheduler programs it, hardware fires, channel returns to idle.
    bench.borrow_mut().step();
    bench.borrow_mut().generators.fire(0);
    bench.borrow_mut().step();

    let b = bench.borrow();
    let ch = &b.output.outputs()[0];
    assert_eq!(ch.state, OutputState::Idle);
    assert_eq!(ch.stats.hits, 1);
    assert_eq!(ch.last_executed.id, TriggerId::new(u32::MAX, u32::MAX, u32::MAX));
    assert!(ch.queue.is_empty());
}

#[test]
fn output_test_pulse_at_absolute_time() {
    let bench = bench_synced();
    let out = fd(&bench);

    let at = Timestamp::new(9, 500, 0);
    let fired_at = out.software_trigger(2, Some(at)).expect("sw trigger");
    assert_eq!(fired_at, at);

    bench.borrow_mut().step();
    let b = bench.borrow();
    let window = b.generators.channel(2).window.expect("programmed");
    assert_eq!(window.0, at);
}
