//! Compile-time sizing and validation bounds.
//!
//! Every runtime container in the firmware is statically sized from the
//! constants here; nothing is allocated after init.

use wrtd_time::TICKS_PER_SECOND;

/// Number of input channels on the TDC mezzanine.
pub const TDC_NUM_CHANNELS: usize = 5;

/// Number of output channels on the fine-delay mezzanine.
pub const FD_NUM_CHANNELS: usize = 4;

/// Maximum triggers coalesced into one wire packet.
pub const TRIGGER_COALESCE_LIMIT: usize = 5;

/// Capacity of the routing table (valid entries across all outputs).
pub const ROUTING_ENTRIES: usize = 128;

/// Capacity of each output's pulse queue.
pub const MAX_QUEUE_PULSES: usize = 16;

/// Capacity of the shared-memory loopback queue.
pub const LOOP_QUEUE_SIZE: usize = 16;

/// Smallest accepted dead time, in 8 ns ticks (80 µs).
pub const DEAD_TIME_MIN_TICKS: u32 = 10_000;

/// Largest accepted dead time, in 8 ns ticks (80 ms).
pub const DEAD_TIME_MAX_TICKS: u32 = 10_000_000;

/// Smallest accepted pulse width, in picoseconds (250 ns).
pub const PULSE_WIDTH_MIN_PS: u64 = 250_000;

/// Pulse widths must be strictly below one second.
pub const PULSE_WIDTH_MAX_PS: u64 = 1_000_000_000_000;

/// Smallest accepted pulse width, in whole 8 ns cycles.
pub const PULSE_WIDTH_MIN_CYCLES: u32 = (PULSE_WIDTH_MIN_PS / 8_000) as u32;

/// Trigger delays must be strictly below one second of cycles.
pub const DELAY_MAX_CYCLES: u32 = TICKS_PER_SECOND as u32;

/// Dead time applied to freshly initialized channels (80 µs).
pub const DEFAULT_DEAD_TIME_TICKS: u32 = 10_000;

/// Pulse width applied to freshly initialized outputs (1 µs).
pub const DEFAULT_WIDTH_CYCLES: u32 = 1_250;

/// Delay applied to freshly assigned routing rules (100 µs).
pub const DEFAULT_RULE_DELAY_CYCLES: u32 = 12_500;
