//! Co-located input→output delivery and the on-wire packet format.

mod common;

use std::time::Duration;

use common::{arm_direct, bench_synced, fd, tdc};
use libwrtd::LogReader;
use wrtd_common::limits::TRIGGER_COALESCE_LIMIT;
use wrtd_common::{LogLevel, TriggerId, TriggerMode};
use wrtd_hal::RawSample;
use wrtd_proto::{TriggerPacket, packet_words};
use wrtd_sim::SimTransport;
use wrtd_time::{FRAC_PER_TICK, TICKS_PER_SECOND, Timestamp};

#[test]
fn tagged_pulse_reaches_the_colocated_output_through_loopback() {
    let bench = bench_synced();
    let id = TriggerId::new(12, 13, 14);

    let input = tdc(&bench);
    input.enable(2, true).expect("enable input");
    input.assign_trigger(2, id).expect("assign");
    input.arm(2, true).expect("arm input");

    let out = fd(&bench);
    arm_direct(&out, 0, id, 0, TriggerMode::Auto);

    bench.borrow_mut().fifo.push_pulse(2, 50, 1_000);
    bench.borrow_mut().step();

    let b = bench.borrow();
    let ch = &b.input.channels()[2];
    assert_eq!(ch.stats.total_pulses, 1);
    assert_eq!(ch.stats.sent_pulses, 1);
    assert_eq!(ch.stats.seq, 1);
    assert_eq!(ch.stats.last_sent.id, id);

    // The same entry crossed the loopback into the output queue.
    let outp = &b.output.outputs()[0];
    assert_eq!(outp.queue.len(), 1);
    assert_eq!(outp.last_enqueued.id, id);
    assert_eq!(outp.last_enqueued.seq, 0);
}

#[test]
fn wire_packet_carries_normalized_coalesced_entries() {
    let bench = bench_synced();
    let id = TriggerId::new(1, 1, 99);

    let input = tdc(&bench);
    input.enable(0, true).expect("enable");
    input.assign_trigger(0, id).expect("assign");
    input.arm(0, true).expect("arm");

    {
        let mut b = bench.borrow_mut();
        // A fine-time field at the top of the converter range and a tick
        // count at the edge of the second force every carry at once.
        b.fifo.push_raw(RawSample {
            seconds: 77,
            ticks: (TICKS_PER_SECOND - 1) as u32,
            meta: 0x3_FFFF,
        });
        b.fifo.push_pulse(0, 78, 0);
        b.fifo.push_pulse(0, 79, 0);
        b.step();
    }

    let packets = bench.borrow_mut().take_tx_packets();
    assert_eq!(packets.len(), 1, "three pulses coalesce into one packet");
    assert_eq!(packets[0].len(), packet_words(3));

    let packet = TriggerPacket::decode(&packets[0]).expect("decode");
    assert_eq!(packet.count, 3);
    for trigger in &packet.triggers[..3] {
        assert!(trigger.ts.ticks >= 0 && trigger.ts.ticks < TICKS_PER_SECOND);
        assert!(trigger.ts.frac >= 0 && trigger.ts.frac < FRAC_PER_TICK);
        assert_eq!(trigger.id, id);
    }
    // The conversion rolled the first sample into the next second.
    assert_eq!(packet.triggers[0].ts.seconds, 78);
    // Sequence numbers run per input channel.
    let seqs: Vec<_> = packet.triggers[..3].iter().map(|t| t.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2]);
}

#[test]
fn coalescing_caps_at_five_entries_per_packet() {
    let bench = bench_synced();
    let id = TriggerId::new(2, 2, 2);

    let input = tdc(&bench);
    input.enable(0, true).expect("enable");
    input.assign_trigger(0, id).expect("assign");
    input.arm(0, true).expect("arm");

    {
        let mut b = bench.borrow_mut();
        for n in 0..7 {
            b.fifo.push_pulse(0, 100 + n, 0);
        }
        b.step();
        b.step();
    }

    let packets = bench.borrow_mut().take_tx_packets();
    assert_eq!(packets.len(), 2);
    let first = TriggerPacket::decode(&packets[0]).expect("first");
    let second = TriggerPacket::decode(&packets[1]).expect("second");
    assert_eq!(first.count as usize, TRIGGER_COALESCE_LIMIT);
    assert_eq!(second.count, 2);
}

#[test]
fn promiscuous_logging_sees_unmatched_triggers() {
    let bench = bench_synced();
    let out = fd(&bench);
    out.set_log_level(0, LogLevel::PROMISC).expect("promisc on");

    // No routing entry for this identity: only PROMISC sees it.
    bench.borrow_mut().inject_packet(&[wrtd_common::TriggerEntry {
        ts: Timestamp::new(5, 0, 0),
        id: TriggerId::new(0xAA, 0xBB, 0xCC),
        seq: 3,
    }]);
    bench.borrow_mut().step();

    {
        let b = bench.borrow();
        assert_eq!(b.output.outputs()[0].queue.len(), 0);
    }

    let mut log = LogReader::new(SimTransport::fd_log(&bench));
    let entry = log
        .next_entry(Duration::from_millis(5))
        .expect("decode")
        .expect("promisc entry");
    assert_eq!(entry.kind, LogLevel::PROMISC);
    assert_eq!(entry.channel, -1, "promiscuous entries carry no channel");
    assert_eq!(entry.id, TriggerId::new(0xAA, 0xBB, 0xCC));

    // Switching the level off stops the stream.
    out.set_log_level(0, LogLevel::empty()).expect("promisc off");
    bench.borrow_mut().inject_packet(&[wrtd_common::TriggerEntry {
        ts: Timestamp::new(6, 0, 0),
        id: TriggerId::new(1, 2, 3),
        seq: 4,
    }]);
    bench.borrow_mut().step();
    assert!(log.next_entry(Duration::from_millis(2)).expect("quiet").is_none());
}
