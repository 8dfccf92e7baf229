//! The bounded per-output pulse queue.

use wrtd_common::TriggerEntry;
use wrtd_common::limits::MAX_QUEUE_PULSES;

/// One queued pulse.
#[derive(Debug, Default, Clone, Copy)]
pub struct PulseEntry {
    /// The trigger (timestamp already delay-adjusted) to execute.
    pub trig: TriggerEntry,
    /// Tick count of the unadjusted origin timestamp, for latency stats.
    pub origin_cycles: i32,
    /// Producing rule as `(arena index, output)`; `None` for test pulses.
    pub rule: Option<(u16, u8)>,
}

/// Fixed-capacity FIFO of pulses awaiting the generator.
#[derive(Debug, Clone, Copy)]
pub struct PulseQueue {
    data: [PulseEntry; MAX_QUEUE_PULSES],
    head: usize,
    tail: usize,
    count: usize,
}

impl Default for PulseQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseQueue {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: [PulseEntry {
                trig: TriggerEntry {
                    ts: wrtd_time::Timestamp::zero(),
                    id: wrtd_common::TriggerId::new(0, 0, 0),
                    seq: 0,
                },
                origin_cycles: 0,
                rule: None,
            }; MAX_QUEUE_PULSES],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Drops every queued pulse.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    /// Queued pulse count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Appends a pulse; false when the queue is full.
    pub fn push(&mut self, entry: PulseEntry) -> bool {
        if self.count == MAX_QUEUE_PULSES {
            return false;
        }
        self.data[self.head] = entry;
        self.head = (self.head + 1) % MAX_QUEUE_PULSES;
        self.count += 1;
        true
    }

    /// Oldest queued pulse.
    #[must_use]
    pub fn front(&self) -> Option<&PulseEntry> {
        if self.count == 0 { None } else { Some(&self.data[self.tail]) }
    }

    /// Releases the oldest queued pulse.
    pub fn pop(&mut self) {
        if self.count == 0 {
            return;
        }
        self.tail = (self.tail + 1) % MAX_QUEUE_PULSES;
        self.count -= 1;
    }
}
