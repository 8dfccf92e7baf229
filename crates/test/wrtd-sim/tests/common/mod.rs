//! Shared wiring for the end-to-end scenarios.
#![allow(dead_code)] // each test binary uses its own subset

use std::cell::RefCell;
use std::rc::Rc;

use libwrtd::{TriggerHandle, WrtdInput, WrtdOutput};
use wrtd_common::{TriggerId, TriggerMode};
use wrtd_sim::{SimTransport, TestBench};

pub type Bench = Rc<RefCell<TestBench>>;

/// A fresh card with both link machines already in `Synced`.
pub fn bench_synced() -> Bench {
    let bench = Rc::new(RefCell::new(TestBench::new()));
    bench.borrow_mut().sync_wr();
    bench
}

/// Host handle to the bench's input personality.
pub fn tdc(bench: &Bench) -> WrtdInput<SimTransport> {
    WrtdInput::new(SimTransport::tdc(bench))
}

/// Host handle to the bench's output personality.
pub fn fd(bench: &Bench) -> WrtdOutput<SimTransport> {
    WrtdOutput::new(SimTransport::fd(bench))
}

/// Assigns, enables and arms a direct trigger on `channel` with the given
/// delay, leaving the output ready to fire.
pub fn arm_direct(
    out: &WrtdOutput<SimTransport>,
    channel: u32,
    id: TriggerId,
    delay_ps: u64,
    mode: TriggerMode,
) -> TriggerHandle {
    out.enable(channel, true).expect("enable");
    let handle = out.trig_assign(channel, id, None).expect("assign");
    out.trig_enable(&handle, true).expect("trig enable");
    out.trig_set_delay_ps(&handle, delay_ps).expect("set delay");
    out.set_mode(channel, mode).expect("set mode");
    out.arm(channel, true).expect("arm");
    handle
}
