//! Per-output channel state and its blob serialization.

use wrtd_common::limits::{DEFAULT_DEAD_TIME_TICKS, DEFAULT_WIDTH_CYCLES};
use wrtd_common::{IoFlags, LogLevel, TriggerEntry, TriggerMode};
use wrtd_proto::{MsgReader, MsgWriter};
use wrtd_time::Timestamp;

use crate::queue::PulseQueue;

/// Arming state of one output.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Not armed; matches are ignored.
    #[default]
    Idle,
    /// Armed; matches schedule pulses (or arm a condition).
    Armed,
    /// A host test pulse is pending.
    TestPending,
    /// A condition matched; waiting for its conditional trigger.
    ConditionHit,
}

impl OutputState {
    /// Wire encoding of the state.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            OutputState::Idle => 0,
            OutputState::Armed => 1,
            OutputState::TestPending => 2,
            OutputState::ConditionHit => 3,
        }
    }

    /// Decodes a wire state value.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(OutputState::Idle),
            1 => Some(OutputState::Armed),
            2 => Some(OutputState::TestPending),
            3 => Some(OutputState::ConditionHit),
            _ => None,
        }
    }
}

/// Host-owned configuration of one output.
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    /// Triggering mode.
    pub mode: TriggerMode,
    /// Channel flags.
    pub flags: IoFlags,
    /// Log-level bitset.
    pub log_level: LogLevel,
    /// Dead time between pulses, 8 ns ticks.
    pub dead_time: u32,
    /// Pulse width, 8 ns cycles.
    pub width_cycles: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::Auto,
            flags: IoFlags::empty(),
            log_level: LogLevel::empty(),
            dead_time: DEFAULT_DEAD_TIME_TICKS,
            width_cycles: DEFAULT_WIDTH_CYCLES,
        }
    }
}

/// Execute/miss counters of one output.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutputStats {
    /// Pulses executed.
    pub hits: u32,
    /// Pulses dropped because the window passed before the hardware fired.
    pub miss_timeout: u32,
    /// Pulses dropped by the dead-time check.
    pub miss_deadtime: u32,
    /// Pulses dropped because the queue was full.
    pub miss_overflow: u32,
    /// Pulses dropped because WR timing was unavailable.
    pub miss_no_timing: u32,
}

/// One output channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutputChannel {
    /// Configuration, host-owned.
    pub config: OutputConfig,
    /// Counters, firmware-owned.
    pub stats: OutputStats,
    /// Arming state.
    pub state: OutputState,
    /// Pulse-generator readiness: true when nothing is in flight.
    pub idle: bool,
    /// Pulses awaiting the generator.
    pub queue: PulseQueue,
    /// Adjusted timestamp of the last accepted pulse (dead-time reference).
    pub prev_pulse: Timestamp,
    /// Deadline for the in-flight pulse (programmed end + margin).
    pub last_programmed: Timestamp,
    /// Last trigger that produced a pulse.
    pub last_executed: TriggerEntry,
    /// Last trigger accepted into the queue.
    pub last_enqueued: TriggerEntry,
    /// Last trigger dropped in flight.
    pub last_lost: TriggerEntry,
    /// Arena index of the conditional rule awaited in `ConditionHit`.
    pub pending_trig: Option<u16>,
}

impl OutputChannel {
    /// Fresh channel: idle generator, safe defaults.
    #[must_use]
    pub fn new() -> Self {
        Self { idle: true, ..Self::default() }
    }
}

/// Serialized channel blob length in words.
pub const OUTPUT_BLOB_WORDS: usize = 40;

impl OutputChannel {
    /// Serializes the channel blob for structured-struct access.
    pub fn put_blob(&self, w: &mut MsgWriter<'_>) {
        w.put_u32(self.config.mode.code());
        w.put_u32(self.config.flags.bits());
        w.put_u32(self.config.log_level.bits());
        w.put_u32(self.config.dead_time);
        w.put_u32(self.config.width_cycles);
        w.put_u32(self.stats.hits);
        w.put_u32(self.stats.miss_timeout);
        w.put_u32(self.stats.miss_deadtime);
        w.put_u32(self.stats.miss_overflow);
        w.put_u32(self.stats.miss_no_timing);
        w.put_u32(self.state.code());
        w.put_u32(u32::from(self.idle));
        w.put_timestamp(&self.prev_pulse);
        w.put_entry(&self.last_executed);
        w.put_entry(&self.last_enqueued);
        w.put_entry(&self.last_lost);
    }

    /// Overwrites configuration and counters from a blob; false on
    /// malformed data. The pulse queue is untouched.
    pub fn set_blob(&mut self, data: &[u32]) -> bool {
        if data.len() != OUTPUT_BLOB_WORDS {
            return false;
        }
        let mut r = MsgReader::new(data);
        let Some(mode) = TriggerMode::from_code(r.get_u32()) else {
            return false;
        };
        let flags = IoFlags::from_bits_truncate(r.get_u32());
        let log_level = LogLevel::from_bits_truncate(r.get_u32());
        let dead_time = r.get_u32();
        let width_cycles = r.get_u32();
        let stats = OutputStats {
            hits: r.get_u32(),
            miss_timeout: r.get_u32(),
            miss_deadtime: r.get_u32(),
            miss_overflow: r.get_u32(),
            miss_no_timing: r.get_u32(),
        };
        let Some(state) = OutputState::from_code(r.get_u32()) else {
            return false;
        };
        let idle = r.get_u32() != 0;
        let prev_pulse = r.get_timestamp();
        let last_executed = r.get_entry();
        let last_enqueued = r.get_entry();
        let last_lost = r.get_entry();
        if r.finish().is_err() {
            return false;
        }
        self.config = OutputConfig { mode, flags, log_level, dead_time, width_cycles };
        self.stats = stats;
        self.state = state;
        self.idle = idle;
        self.prev_pulse = prev_pulse;
        self.last_executed = last_executed;
        self.last_enqueued = last_enqueued;
        self.last_lost = last_lost;
        true
    }
}
