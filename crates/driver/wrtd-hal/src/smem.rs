//! Shared-memory atomic cells and the loopback queue built on them.
//!
//! The shared-memory block decodes read-modify-write operations from
//! address bits: writing `x` at `cell + RANGE_ADD` adds `x` to the cell,
//! and so on. Each cell is modified by exactly one producer or consumer,
//! which is the whole concurrency story between the two soft-CPUs.

use core::ptr;

use wrtd_common::limits::LOOP_QUEUE_SIZE;
use wrtd_common::TriggerEntry;

use crate::{LoopbackRx, LoopbackTx};

/// Address-range offset performing an add on write.
pub const RANGE_ADD: usize = 0x2000;
/// Address-range offset performing a subtract on write.
pub const RANGE_SUB: usize = 0x4000;
/// Address-range offset performing an OR on write.
pub const RANGE_SET: usize = 0x6000;
/// Address-range offset performing an AND-NOT on write.
pub const RANGE_CLEAR: usize = 0x8000;
/// Address-range offset performing an XOR on write.
pub const RANGE_FLIP: usize = 0xA000;

/// One word of shared memory with hardware read-modify-write aliases.
pub struct SmemCell {
    ptr: *mut i32,
}

impl SmemCell {
    /// Creates a cell over one shared-memory word.
    ///
    /// # Safety
    ///
    /// `ptr` must point into the shared-memory block, with the aliased
    /// operation ranges mapped at the documented offsets, and stay valid
    /// for the lifetime of the value.
    #[must_use]
    pub const unsafe fn new(ptr: *mut i32) -> Self {
        Self { ptr }
    }

    /// Reads the cell.
    #[must_use]
    pub fn read(&self) -> i32 {
        // SAFETY: `ptr` validity vouched for by the constructor.
        unsafe { ptr::read_volatile(self.ptr) }
    }

    /// Overwrites the cell (not atomic with respect to the other core).
    pub fn write(&self, value: i32) {
        // SAFETY: as in `read`.
        unsafe { ptr::write_volatile(self.ptr, value) }
    }

    fn op(&self, range: usize, value: i32) {
        // SAFETY: the aliased range lies inside the block the constructor
        // vouched for; the hardware turns this store into an atomic RMW.
        unsafe { ptr::write_volatile(self.ptr.byte_add(range), value) }
    }

    /// Atomically adds `value`.
    pub fn add(&self, value: i32) {
        self.op(RANGE_ADD, value);
    }

    /// Atomically subtracts `value`.
    pub fn sub(&self, value: i32) {
        self.op(RANGE_SUB, value);
    }

    /// Atomically ORs `value` in.
    pub fn or(&self, value: i32) {
        self.op(RANGE_SET, value);
    }

    /// Atomically clears the bits of `value`.
    pub fn and_not(&self, value: i32) {
        self.op(RANGE_CLEAR, value);
    }

    /// Atomically XORs `value` in.
    pub fn xor(&self, value: i32) {
        self.op(RANGE_FLIP, value);
    }
}

/// The 16-entry loopback queue in shared memory.
///
/// Both personalities construct a handle over the same region; the input
/// core only pushes and the output core only pops, so `head` and `tail`
/// each have a single writer and `count` is kept consistent through the
/// atomic add/sub aliases.
pub struct SmemLoopQueue {
    head: SmemCell,
    tail: SmemCell,
    count: SmemCell,
    buf: *mut TriggerEntry,
}

impl SmemLoopQueue {
    /// Creates a handle over the shared loopback region.
    ///
    /// # Safety
    ///
    /// The cells and `buf` (an array of [`LOOP_QUEUE_SIZE`] entries) must
    /// all lie in the shared-memory block and describe the same queue on
    /// both cores.
    #[must_use]
    pub const unsafe fn new(
        head: SmemCell,
        tail: SmemCell,
        count: SmemCell,
        buf: *mut TriggerEntry,
    ) -> Self {
        Self { head, tail, count, buf }
    }

    /// Empties the queue; called once at init, before the peer runs.
    pub fn init(&self) {
        self.head.write(0);
        self.tail.write(0);
        self.count.write(0);
    }
}

impl LoopbackTx for SmemLoopQueue {
    fn push(&mut self, ent: &TriggerEntry) {
        if self.count.read() == LOOP_QUEUE_SIZE as i32 {
            return;
        }
        let head = self.head.read();
        // SAFETY: `head` is always in `[0, LOOP_QUEUE_SIZE)` and `buf`
        // spans that many entries.
        unsafe { ptr::write_volatile(self.buf.add(head as usize), *ent) };
        self.head.add(1);
        if self.head.read() == LOOP_QUEUE_SIZE as i32 {
            self.head.write(0);
        }
        self.count.add(1);
    }
}

impl LoopbackRx for SmemLoopQueue {
    fn pop(&mut self) -> Option<TriggerEntry> {
        if self.count.read() == 0 {
            return None;
        }
        let tail = self.tail.read();
        // SAFETY: as in `push`.
        let ent = unsafe { ptr::read_volatile(self.buf.add(tail as usize)) };
        self.tail.add(1);
        if self.tail.read() == LOOP_QUEUE_SIZE as i32 {
            self.tail.write(0);
        }
        self.count.sub(1);
        Some(ent)
    }
}
