//! Host protocol: sync round-trips, timeouts, structured access.

mod common;

use std::time::Duration;

use common::{bench_synced, fd, tdc};
use libwrtd::{Error, SyncChannel};
use wrtd_proto::ids::{self, action, fd as fd_cmd, rep};
use wrtd_sim::SimTransport;

#[test]
fn ping_round_trips_on_both_personalities() {
    let bench = bench_synced();
    tdc(&bench).ping().expect("tdc ping");
    fd(&bench).ping().expect("fd ping");
}

#[test]
fn version_blocks_identify_the_personalities() {
    let bench = bench_synced();
    let tdc_block = tdc(&bench).check_version().expect("tdc version");
    assert_eq!(tdc_block.fpga_id, ids::FPGA_ID);
    assert_eq!(tdc_block.rt_id, ids::RT_ID_TDC);

    let fd_block = fd(&bench).version().expect("fd version");
    assert_eq!(fd_block.rt_id, ids::RT_ID_FD);
}

#[test]
fn halted_core_times_out_and_late_replies_are_discarded() {
    let bench = bench_synced();
    let input = tdc(&bench);
    input.set_timeout(Duration::from_millis(30));

    bench.borrow_mut().halt_input = true;
    assert!(matches!(input.ping(), Err(Error::Timeout)));

    // The request is still queued; once the core resumes it answers the
    // stale sequence number. The next call must skip that reply and
    // succeed on its own.
    bench.borrow_mut().halt_input = false;
    input.ping().expect("ping after resume");
}

#[test]
fn field_access_applies_masks() {
    let bench = bench_synced();
    let input = tdc(&bench);

    // Variable 4 is the shared dead time, full 32-bit mask.
    input.field_set(&[(4, 20_000)]).expect("field set");
    assert_eq!(input.field_get(&[4]).expect("field get"), vec![20_000]);
    assert_eq!(bench.borrow().fifo.dead_time(), 20_000);

    // Variable 0 is the channel-enable mask, 5 bits wide.
    input.field_set(&[(0, 0xFF)]).expect("masked set");
    assert_eq!(input.field_get(&[0]).expect("masked get"), vec![0x1F]);

    assert!(matches!(input.field_get(&[99]), Err(Error::InvalidMessage)));
}

#[test]
fn struct_access_round_trips_blobs() {
    let bench = bench_synced();
    let input = tdc(&bench);

    let records = input.struct_get(&[1]).expect("struct get");
    assert_eq!(records.len(), 1);
    let (index, mut blob) = records[0].clone();
    assert_eq!(index, 1);

    // Tweak a counter word deep in the blob and write it back.
    let last = blob.len() - 1;
    blob[last] = 0x55AA;
    input.struct_set(&[(1, blob.clone())]).expect("struct set");
    let again = input.struct_get(&[1]).expect("struct get again");
    assert_eq!(again[0].1, blob);

    assert!(matches!(input.struct_get(&[42]), Err(Error::InvalidMessage)));
    // Wrong-size writes are rejected without partial effect.
    assert!(matches!(
        input.struct_set(&[(1, vec![1, 2, 3])]),
        Err(Error::InvalidMessage)
    ));
}

#[test]
fn device_side_validation_nacks_with_the_error_code() {
    let bench = bench_synced();
    // Raw channel, bypassing the client-side validation, to see the
    // firmware's own NACK.
    let mut chan = SyncChannel::new(SimTransport::fd(&bench), ids::APP_ID_FD, 1, 1);
    let (reply_id, body) = chan
        .request(fd_cmd::CHAN_SET_WIDTH, &[0, 10])
        .expect("round trip");
    assert_eq!(reply_id, action::SEND_NACK);
    assert_eq!(body[0], rep::NACK);
    assert_eq!(
        wrtd_common::ErrorKind::from_code(body[1]),
        Some(wrtd_common::ErrorKind::InvalidPulseWidth)
    );
}

#[test]
fn undersized_payload_nacks_invalid_message() {
    let bench = bench_synced();
    let mut chan = SyncChannel::new(SimTransport::fd(&bench), ids::APP_ID_FD, 1, 1);
    // CHAN_ARM wants two words; send one.
    let (reply_id, body) = chan.request(fd_cmd::CHAN_ARM, &[0]).expect("round trip");
    assert_eq!(reply_id, action::SEND_NACK);
    assert_eq!(
        wrtd_common::ErrorKind::from_code(body[1]),
        Some(wrtd_common::ErrorKind::InvalidMessage)
    );
}
