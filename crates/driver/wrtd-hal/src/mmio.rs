//! Memory-mapped implementations of the hardware seam traits.
//!
//! Every constructor here is `unsafe`: the caller asserts that the base
//! address maps the documented register block for the lifetime of the
//! value and that no other code writes those registers. Given that, all
//! register accesses are safe methods.

use core::ptr;
use core::slice;

use wrtd_time::Timestamp;

use crate::regs::{fd, lr, mq, tdc};
use crate::{MsgQueue, PulseGen, RawSample, TaiClock, TimestampFifo, WrLinkBits};

#[inline]
fn rd(base: *mut u32, off: usize) -> u32 {
    // SAFETY: `base + off` lies inside the block the constructor vouched for.
    unsafe { ptr::read_volatile(base.byte_add(off)) }
}

#[inline]
fn wr(base: *mut u32, off: usize, value: u32) {
    // SAFETY: as in `rd`.
    unsafe { ptr::write_volatile(base.byte_add(off), value) }
}

/// Message-queue block accessor covering the host and remote families.
pub struct MmioMsgQueue {
    hmq: *mut u32,
    rmq: *mut u32,
    /// Data-window width of each slot, in words.
    width: usize,
}

impl MmioMsgQueue {
    /// Creates an accessor over the two queue windows.
    ///
    /// # Safety
    ///
    /// `hmq` and `rmq` must map the host and remote message-queue blocks
    /// and stay valid for the lifetime of the value; no other code may
    /// drive those blocks. `width` must not exceed the hardware slot
    /// width reported by the global control block.
    #[must_use]
    pub const unsafe fn new(hmq: *mut u32, rmq: *mut u32, width: usize) -> Self {
        Self { hmq, rmq, width }
    }

    fn base(&self, remote: bool) -> *mut u32 {
        if remote { self.rmq } else { self.hmq }
    }

    /// Slot count word from the global control block.
    #[must_use]
    pub fn slot_count(&self, remote: bool) -> u32 {
        rd(self.base(remote), mq::GCR + mq::GCR_SLOT_COUNT)
    }
}

impl MsgQueue for MmioMsgQueue {
    fn claim(&mut self, remote: bool, slot: usize) {
        wr(self.base(remote), mq::slot_out(slot) + mq::SLOT_COMMAND, mq::CMD_CLAIM);
    }

    fn ready(&mut self, remote: bool, slot: usize, n_words: usize) {
        wr(
            self.base(remote),
            mq::slot_out(slot) + mq::SLOT_COMMAND,
            mq::CMD_READY | n_words as u32,
        );
    }

    fn discard(&mut self, remote: bool, slot: usize) {
        wr(self.base(remote), mq::slot_in(slot) + mq::SLOT_COMMAND, mq::CMD_DISCARD);
    }

    fn purge(&mut self, remote: bool, slot: usize) {
        wr(self.base(remote), mq::slot_in(slot) + mq::SLOT_COMMAND, mq::CMD_PURGE);
        wr(self.base(remote), mq::slot_out(slot) + mq::SLOT_COMMAND, mq::CMD_PURGE);
    }

    fn in_poll(&self, remote: bool) -> u32 {
        rd(self.base(remote), mq::GCR + mq::GCR_SLOT_STATUS) & mq::GCR_INCOMING_MASK
    }

    fn out_full(&self, remote: bool, slot: usize) -> bool {
        rd(self.base(remote), mq::slot_out(slot) + mq::SLOT_STATUS) & mq::STATUS_FULL != 0
    }

    fn out_buf(&mut self, remote: bool, slot: usize) -> &mut [u32] {
        let data = self.base(remote).wrapping_byte_add(mq::slot_out(slot) + mq::SLOT_DATA);
        // SAFETY: the data window spans `width` words inside the block the
        // constructor vouched for; `&mut self` prevents overlapping views.
        unsafe { slice::from_raw_parts_mut(data, self.width) }
    }

    fn in_buf(&mut self, remote: bool, slot: usize) -> &[u32] {
        let data = self.base(remote).wrapping_byte_add(mq::slot_in(slot) + mq::SLOT_DATA);
        // SAFETY: as in `out_buf`.
        unsafe { slice::from_raw_parts(data, self.width) }
    }
}

/// Direct-readout timestamp FIFO of the TDC mezzanine.
pub struct MmioTdcFifo {
    base: *mut u32,
}

impl MmioTdcFifo {
    /// Creates an accessor over the TDC direct-readout block.
    ///
    /// # Safety
    ///
    /// `base` must map the direct-readout block for the lifetime of the
    /// value, with no other writer.
    #[must_use]
    pub const unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }
}

impl TimestampFifo for MmioTdcFifo {
    fn pop(&mut self) -> Option<RawSample> {
        if rd(self.base, tdc::DR_FIFO_CSR) & tdc::FIFO_CSR_EMPTY != 0 {
            return None;
        }
        Some(RawSample {
            seconds: rd(self.base, tdc::DR_FIFO_R0),
            ticks: rd(self.base, tdc::DR_FIFO_R1),
            meta: rd(self.base, tdc::DR_FIFO_R2),
        })
    }

    fn set_channel_mask(&mut self, mask: u32) {
        wr(self.base, tdc::DR_CHAN_ENABLE, mask);
    }

    fn set_dead_time(&mut self, ticks: u32) {
        wr(self.base, tdc::DR_DEAD_TIME, ticks);
    }
}

/// White Rabbit status/control of the TDC mezzanine.
pub struct MmioTdcWr {
    base: *mut u32,
}

impl MmioTdcWr {
    /// Creates an accessor over the TDC control/status block.
    ///
    /// # Safety
    ///
    /// `base` must map the TDC control/status block for the lifetime of
    /// the value, with no other writer.
    #[must_use]
    pub const unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }

    fn stat(&self) -> tdc::WrStat {
        tdc::WrStat::from_bits_truncate(rd(self.base, tdc::REG_WR_STAT))
    }
}

impl WrLinkBits for MmioTdcWr {
    fn link_up(&self) -> bool {
        self.stat().contains(tdc::WrStat::LINK)
    }

    fn time_ready(&self) -> bool {
        self.stat().contains(tdc::WrStat::TIME_VALID)
    }

    fn locked(&self) -> bool {
        self.stat().contains(tdc::WrStat::AUX_LOCKED)
    }

    fn enable_lock(&mut self, enable: bool) {
        // Acquisition must be halted around a lock-source change.
        wr(self.base, tdc::REG_CTRL, tdc::CTRL_DIS_ACQ);
        wr(self.base, tdc::REG_WR_CTRL, if enable { tdc::WR_CTRL_ENABLE } else { 0 });
        wr(self.base, tdc::REG_CTRL, tdc::CTRL_EN_ACQ);
    }
}

/// White Rabbit status/control of the fine-delay mezzanine.
pub struct MmioFdWr {
    base: *mut u32,
}

impl MmioFdWr {
    /// Creates an accessor over the fine-delay device block.
    ///
    /// # Safety
    ///
    /// `base` must map the fine-delay device block for the lifetime of
    /// the value, with no other writer.
    #[must_use]
    pub const unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }

    fn tcr(&self) -> fd::Tcr {
        fd::Tcr::from_bits_truncate(rd(self.base, fd::REG_TCR))
    }
}

impl WrLinkBits for MmioFdWr {
    fn link_up(&self) -> bool {
        self.tcr().contains(fd::Tcr::WR_LINK)
    }

    fn time_ready(&self) -> bool {
        // The fine-delay block has no separate time-valid flag.
        true
    }

    fn locked(&self) -> bool {
        self.tcr().contains(fd::Tcr::WR_LOCKED)
    }

    fn enable_lock(&mut self, enable: bool) {
        wr(self.base, fd::REG_TCR, if enable { fd::Tcr::WR_ENABLE.bits() } else { 0 });
    }
}

/// Pulse generators of the fine-delay mezzanine, one block per output.
pub struct MmioPulseGen {
    base: *mut u32,
}

impl MmioPulseGen {
    /// Creates an accessor over the fine-delay channel blocks.
    ///
    /// # Safety
    ///
    /// `base` must map the fine-delay device window (all channel blocks)
    /// for the lifetime of the value, with no other writer.
    #[must_use]
    pub const unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }

    fn ch_wr(&self, ch: usize, off: usize, value: u32) {
        wr(self.base, fd::channel_base(ch) + off, value);
    }

    fn ch_rd(&self, ch: usize, off: usize) -> u32 {
        rd(self.base, fd::channel_base(ch) + off)
    }
}

impl PulseGen for MmioPulseGen {
    fn program(&mut self, ch: usize, start: &Timestamp, end: &Timestamp) {
        self.ch_wr(ch, fd::REG_U_STARTL, start.seconds as u32);
        self.ch_wr(ch, fd::REG_C_START, start.ticks as u32);
        self.ch_wr(ch, fd::REG_F_START, start.frac as u32);
        self.ch_wr(ch, fd::REG_U_ENDL, end.seconds as u32);
        self.ch_wr(ch, fd::REG_C_END, end.ticks as u32);
        self.ch_wr(ch, fd::REG_F_END, end.frac as u32);
        self.ch_wr(ch, fd::REG_RCR, 0);
        // The generator wants the mode first, then a register latch, then
        // the arm+enable in one write.
        self.ch_wr(ch, fd::REG_DCR, fd::Dcr::MODE.bits());
        self.ch_wr(ch, fd::REG_DCR, (fd::Dcr::MODE | fd::Dcr::UPDATE).bits());
        self.ch_wr(
            ch,
            fd::REG_DCR,
            (fd::Dcr::MODE | fd::Dcr::PG_ARM | fd::Dcr::ENABLE).bits(),
        );
    }

    fn disarm(&mut self, ch: usize) {
        self.ch_wr(ch, fd::REG_DCR, fd::Dcr::MODE.bits());
    }

    fn has_triggered(&self, ch: usize) -> bool {
        fd::Dcr::from_bits_truncate(self.ch_rd(ch, fd::REG_DCR)).contains(fd::Dcr::PG_TRIG)
    }
}

/// TAI readout from the CPU local registers.
pub struct MmioTaiClock {
    base: *mut u32,
}

impl MmioTaiClock {
    /// Creates an accessor over the CPU local-register window.
    ///
    /// # Safety
    ///
    /// `base` must map the local-register window for the lifetime of the
    /// value.
    #[must_use]
    pub const unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }
}

impl TaiClock for MmioTaiClock {
    fn now(&self) -> (u32, u32) {
        // Seconds first: the cycles counter latches on this read.
        let seconds = rd(self.base, lr::TAI_SEC);
        let cycles = rd(self.base, lr::TAI_CYCLES);
        (seconds, cycles)
    }
}
