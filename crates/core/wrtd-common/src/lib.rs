//! Shared data model of the trigger-distribution core.
//!
//! Everything that crosses a boundary — firmware to firmware over the
//! loopback queue, firmware to fabric in trigger packets, firmware to host
//! in control replies and log entries — is built from the types here.

#![cfg_attr(not(test), no_std)]

use core::fmt;

use bitflags::bitflags;
use wrtd_time::Timestamp;

pub mod limits;

/// Administrator-assigned 96-bit trigger identity.
///
/// Opaque to the firmware; equality is field-wise and ordering is
/// lexicographic over `(system, source_port, trigger)` — the routing-table
/// sort key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TriggerId {
    /// Identifier of the distributing system.
    pub system: u32,
    /// Identifier of the source port within the system.
    pub source_port: u32,
    /// Trigger number within the source port.
    pub trigger: u32,
}

impl TriggerId {
    /// Creates an identity from its three fields.
    #[must_use]
    pub const fn new(system: u32, source_port: u32, trigger: u32) -> Self {
        Self { system, source_port, trigger }
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}:{:08x}", self.system, self.source_port, self.trigger)
    }
}

/// One time-tagged trigger: timestamp, identity and per-input sequence number.
///
/// `seq` is monotonically increasing per input channel and wraps modulo
/// 2³²; the loopback queue and the fabric both preserve it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TriggerEntry {
    /// Event timestamp (after per-channel offset and delay adjustment).
    pub ts: Timestamp,
    /// Identity assigned to the originating input.
    pub id: TriggerId,
    /// Per-input sequence number.
    pub seq: u32,
}

/// Input/output triggering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TriggerMode {
    /// Trigger only on the first pulse/message after arming.
    Single,
    /// Trigger on every pulse/message.
    Auto,
}

impl TriggerMode {
    /// Wire encoding of the mode.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            TriggerMode::Single => 1,
            TriggerMode::Auto => 2,
        }
    }

    /// Decodes a wire mode value.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(TriggerMode::Single),
            2 => Some(TriggerMode::Auto),
            _ => None,
        }
    }
}

bitflags! {
    /// Per-channel I/O state flags.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct IoFlags: u32 {
        /// The channel is physically enabled.
        const ENABLED = 1 << 0;
        /// A trigger identity is assigned to the channel.
        const TRIGGER_ASSIGNED = 1 << 1;
        /// The "last" timestamp/entry fields hold valid data.
        const LAST_VALID = 1 << 2;
        /// The channel is armed.
        const ARMED = 1 << 3;
        /// The channel has triggered since the last arm.
        const TRIGGERED = 1 << 4;
        /// White Rabbit timing is currently unavailable.
        const NO_WR = 1 << 5;
    }
}

bitflags! {
    /// Per-channel log-level bitset; each bit is also a log-entry kind.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct LogLevel: u32 {
        /// Input only: every pulse tagged by the TDC.
        const RAW = 1 << 0;
        /// Input only: every trigger sent to the fabric.
        const SENT = 1 << 1;
        /// Output only: every trigger message received, matched or not.
        const PROMISC = 1 << 2;
        /// Output only: every trigger accepted into an output queue.
        const FILTERED = 1 << 3;
        /// Output only: every pulse executed by the generator.
        const EXECUTED = 1 << 4;
        /// Every trigger missed, with the miss reason.
        const MISSED = 1 << 5;
        /// All of the above.
        const ALL = (1 << 6) - 1;
    }
}

/// Why a trigger failed to produce a pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MissReason {
    /// Wall-clock TAI passed the programmed window before the hardware fired.
    Timeout,
    /// The adjusted timestamp violated the output dead time.
    DeadTime,
    /// The output pulse queue was full.
    Overflow,
    /// White Rabbit timing was not available.
    NoTiming,
}

impl MissReason {
    /// Wire encoding of the reason.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            MissReason::Timeout => 1,
            MissReason::DeadTime => 2,
            MissReason::Overflow => 3,
            MissReason::NoTiming => 4,
        }
    }

    /// Decodes a wire reason value; zero means "no miss".
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(MissReason::Timeout),
            2 => Some(MissReason::DeadTime),
            3 => Some(MissReason::Overflow),
            4 => Some(MissReason::NoTiming),
            _ => None,
        }
    }
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::Timeout => f.write_str("timeout"),
            MissReason::DeadTime => f.write_str("dead time"),
            MissReason::Overflow => f.write_str("queue overflow"),
            MissReason::NoTiming => f.write_str("no WR timing"),
        }
    }
}

/// One entry of the per-personality logging stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogEntry {
    /// What happened (exactly one [`LogLevel`] bit).
    pub kind: LogLevel,
    /// Channel the entry refers to; `-1` for node-level entries (PROMISC).
    pub channel: i32,
    /// Miss reason, for [`LogLevel::MISSED`] entries.
    pub miss_reason: Option<MissReason>,
    /// Sequence number of the trigger concerned.
    pub seq: u32,
    /// Identity of the trigger concerned.
    pub id: TriggerId,
    /// Timestamp of the trigger concerned.
    pub ts: Timestamp,
}

/// Validation failures reported to the host as NACK codes.
///
/// Raised only at command dispatch; a NACKed command is a no-op. Runtime
/// misses are not errors — they are counted per channel and per rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Channel index out of range for the personality.
    InvalidChannel,
    /// Trigger delay at or beyond one second.
    InvalidDelay,
    /// Pulse width below 250 ns or at/beyond one second.
    InvalidPulseWidth,
    /// Dead time outside the accepted tick range.
    InvalidDeadTime,
    /// Referenced trigger entry does not exist.
    TriggerNotFound,
    /// Condition delay requested on a non-conditional trigger.
    NoTriggerCondition,
    /// Routing table already holds the maximum number of entries.
    TableFull,
    /// Malformed message: bad header, bad TLV index or undersized payload.
    InvalidMessage,
}

impl ErrorKind {
    /// Wire encoding carried in a NACK payload.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            ErrorKind::InvalidChannel => 1,
            ErrorKind::InvalidDelay => 2,
            ErrorKind::InvalidPulseWidth => 3,
            ErrorKind::InvalidDeadTime => 4,
            ErrorKind::TriggerNotFound => 5,
            ErrorKind::NoTriggerCondition => 6,
            ErrorKind::TableFull => 7,
            ErrorKind::InvalidMessage => 8,
        }
    }

    /// Decodes a NACK code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ErrorKind::InvalidChannel),
            2 => Some(ErrorKind::InvalidDelay),
            3 => Some(ErrorKind::InvalidPulseWidth),
            4 => Some(ErrorKind::InvalidDeadTime),
            5 => Some(ErrorKind::TriggerNotFound),
            6 => Some(ErrorKind::NoTriggerCondition),
            7 => Some(ErrorKind::TableFull),
            8 => Some(ErrorKind::InvalidMessage),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidChannel => f.write_str("invalid channel"),
            ErrorKind::InvalidDelay => f.write_str("invalid delay"),
            ErrorKind::InvalidPulseWidth => f.write_str("invalid pulse width"),
            ErrorKind::InvalidDeadTime => f.write_str("invalid dead time"),
            ErrorKind::TriggerNotFound => f.write_str("trigger not found"),
            ErrorKind::NoTriggerCondition => f.write_str("no trigger condition"),
            ErrorKind::TableFull => f.write_str("trigger table full"),
            ErrorKind::InvalidMessage => f.write_str("invalid message"),
        }
    }
}
