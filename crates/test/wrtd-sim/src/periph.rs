//! Models of the clock, link bits, FIFO, pulse generators and loopback.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use wrtd_common::TriggerEntry;
use wrtd_common::limits::{FD_NUM_CHANNELS, LOOP_QUEUE_SIZE};
use wrtd_hal::{LoopbackRx, LoopbackTx, PulseGen, RawSample, TaiClock, TimestampFifo, WrLinkBits};
use wrtd_time::{TICKS_PER_SECOND, Timestamp};

/// Manually advanced TAI clock shared by the nodes and the bench.
#[derive(Clone, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    /// Creates a clock at the epoch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock to an absolute time.
    pub fn set(&self, ts: Timestamp) {
        self.0.set(ts.seconds * TICKS_PER_SECOND as u64 + ts.ticks as u64);
    }

    /// Advances by whole ticks.
    pub fn advance_ticks(&self, ticks: u64) {
        self.0.set(self.0.get() + ticks);
    }

    /// Advances by whole seconds.
    pub fn advance_secs(&self, seconds: u64) {
        self.advance_ticks(seconds * TICKS_PER_SECOND as u64);
    }
}

impl TaiClock for SimClock {
    fn now(&self) -> (u32, u32) {
        let total = self.0.get();
        (
            (total / TICKS_PER_SECOND as u64) as u32,
            (total % TICKS_PER_SECOND as u64) as u32,
        )
    }
}

#[derive(Clone, Copy, Default)]
struct WrBits {
    link: bool,
    ready: bool,
    locked: bool,
    lock_enabled: bool,
}

/// Scriptable White Rabbit status bits.
#[derive(Clone, Default)]
pub struct SimWr(Rc<Cell<WrBits>>);

impl SimWr {
    /// Creates link-down status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises or drops the fabric link.
    pub fn set_link(&self, up: bool) {
        let mut bits = self.0.get();
        bits.link = up;
        self.0.set(bits);
    }

    /// Marks TAI as valid or invalid.
    pub fn set_time_ready(&self, ready: bool) {
        let mut bits = self.0.get();
        bits.ready = ready;
        self.0.set(bits);
    }

    /// Marks the oscillator as locked or unlocked.
    pub fn set_locked(&self, locked: bool) {
        let mut bits = self.0.get();
        bits.locked = locked;
        self.0.set(bits);
    }

    /// Raises link, time-valid and lock at once.
    pub fn all_up(&self) {
        self.0.set(WrBits { link: true, ready: true, locked: true, lock_enabled: true });
    }

    /// True when the node asked for the WR lock.
    #[must_use]
    pub fn lock_enabled(&self) -> bool {
        self.0.get().lock_enabled
    }
}

impl WrLinkBits for SimWr {
    fn link_up(&self) -> bool {
        self.0.get().link
    }

    fn time_ready(&self) -> bool {
        self.0.get().ready
    }

    fn locked(&self) -> bool {
        self.0.get().locked
    }

    fn enable_lock(&mut self, enable: bool) {
        let mut bits = self.0.get();
        bits.lock_enabled = enable;
        self.0.set(bits);
    }
}

#[derive(Default)]
struct FifoInner {
    queue: VecDeque<RawSample>,
    channel_mask: u32,
    dead_time: u32,
}

/// Scriptable timestamp FIFO.
#[derive(Clone, Default)]
pub struct SimTdcFifo(Rc<RefCell<FifoInner>>);

impl SimTdcFifo {
    /// Creates an empty FIFO.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw sample.
    pub fn push_raw(&self, sample: RawSample) {
        self.0.borrow_mut().queue.push_back(sample);
    }

    /// Queues a pulse on `channel` at whole-tick resolution.
    pub fn push_pulse(&self, channel: usize, seconds: u32, ticks: u32) {
        self.push_raw(RawSample { seconds, ticks, meta: (channel as u32 & 0x7) << 19 });
    }

    /// Programmed channel-enable mask.
    #[must_use]
    pub fn channel_mask(&self) -> u32 {
        self.0.borrow().channel_mask
    }

    /// Programmed hardware dead time.
    #[must_use]
    pub fn dead_time(&self) -> u32 {
        self.0.borrow().dead_time
    }
}

impl TimestampFifo for SimTdcFifo {
    fn pop(&mut self) -> Option<RawSample> {
        self.0.borrow_mut().queue.pop_front()
    }

    fn set_channel_mask(&mut self, mask: u32) {
        self.0.borrow_mut().channel_mask = mask;
    }

    fn set_dead_time(&mut self, ticks: u32) {
        self.0.borrow_mut().dead_time = ticks;
    }
}

/// One modeled generator channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenChannel {
    /// Programmed (start, end) window, if any.
    pub window: Option<(Timestamp, Timestamp)>,
    /// Armed and waiting for its window.
    pub armed: bool,
    /// The armed window has fired.
    pub triggered: bool,
    /// Number of `program` calls observed.
    pub programs: u32,
}

/// Recording pulse-generator model.
#[derive(Clone, Default)]
pub struct SimPulseGen(Rc<RefCell<[GenChannel; FD_NUM_CHANNELS]>>);

impl SimPulseGen {
    /// Creates idle generators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one generator channel.
    #[must_use]
    pub fn channel(&self, ch: usize) -> GenChannel {
        self.0.borrow()[ch]
    }

    /// Fires the armed window on `ch`, as the hardware would at its
    /// start time.
    pub fn fire(&self, ch: usize) {
        let mut gens = self.0.borrow_mut();
        if gens[ch].armed {
            gens[ch].triggered = true;
            gens[ch].armed = false;
        }
    }
}

impl PulseGen for SimPulseGen {
    fn program(&mut self, ch: usize, start: &Timestamp, end: &Timestamp) {
        let mut gens = self.0.borrow_mut();
        gens[ch].window = Some((*start, *end));
        gens[ch].armed = true;
        gens[ch].triggered = false;
        gens[ch].programs += 1;
    }

    fn disarm(&mut self, ch: usize) {
        let mut gens = self.0.borrow_mut();
        gens[ch].window = None;
        gens[ch].armed = false;
        gens[ch].triggered = false;
    }

    fn has_triggered(&self, ch: usize) -> bool {
        self.0.borrow()[ch].triggered
    }
}

/// Bounded loopback queue shared by the two personalities.
#[derive(Clone, Default)]
pub struct SimLoopback(Rc<RefCell<VecDeque<TriggerEntry>>>);

impl SimLoopback {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queued entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

impl LoopbackTx for SimLoopback {
    fn push(&mut self, ent: &TriggerEntry) {
        let mut queue = self.0.borrow_mut();
        if queue.len() == LOOP_QUEUE_SIZE {
            return;
        }
        queue.push_back(*ent);
    }
}

impl LoopbackRx for SimLoopback {
    fn pop(&mut self) -> Option<TriggerEntry> {
        self.0.borrow_mut().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_splits_seconds_and_cycles() {
        let clock = SimClock::new();
        clock.set(Timestamp::new(3, 125, 0));
        assert_eq!(clock.now(), (3, 125));
        clock.advance_ticks(TICKS_PER_SECOND as u64);
        assert_eq!(clock.now(), (4, 125));
    }

    #[test]
    fn loopback_drops_seventeenth_push() {
        let mut q = SimLoopback::new();
        for n in 0..=LOOP_QUEUE_SIZE as u32 {
            q.push(&TriggerEntry { seq: n, ..TriggerEntry::default() });
        }
        assert_eq!(q.len(), LOOP_QUEUE_SIZE);
        // FIFO order preserved, the 17th entry was never stored.
        for n in 0..LOOP_QUEUE_SIZE as u32 {
            assert_eq!(q.pop().unwrap().seq, n);
        }
        assert!(q.pop().is_none());
    }

    #[test]
    fn generator_fires_only_when_armed() {
        let pulse_gen = SimPulseGen::new();
        pulse_gen.fire(0);
        assert!(!pulse_gen.has_triggered(0));

        let mut driver = pulse_gen.clone();
        driver.program(0, &Timestamp::zero(), &Timestamp::new(0, 10, 0));
        pulse_gen.fire(0);
        assert!(pulse_gen.has_triggered(0));
    }
}
