//! Typed views of device state replies.

use serde::Serialize;
use wrtd_common::{IoFlags, LogLevel, TriggerEntry, TriggerId, TriggerMode};
use wrtd_proto::MsgReader;
use wrtd_time::Timestamp;

use crate::error::Error;

/// State of one input channel, as reported by `CHAN_GET_STATE`.
#[derive(Debug, Clone, Serialize)]
pub struct InputState {
    /// Channel index.
    pub input: u32,
    /// Channel flag bits.
    pub flags: u32,
    /// Log-level bits.
    pub log_level: u32,
    /// Triggering mode.
    pub mode: TriggerMode,
    /// Pulses tagged.
    pub tagged_pulses: u32,
    /// Triggers emitted.
    pub sent_triggers: u32,
    /// Packets the node sent to the fabric (node-wide).
    pub sent_packets: u32,
    /// Triggers dropped for missing WR timing.
    pub miss_no_timing: u32,
    /// Next trigger sequence number.
    pub seq: u32,
    /// Assigned trigger identity.
    pub assigned_id: TriggerId,
    /// Programmed delay.
    pub delay: Timestamp,
    /// Programmed timebase offset.
    pub timebase_offset: Timestamp,
    /// Dead time in 8 ns ticks.
    pub dead_time: u32,
    /// Timestamp of the last tagged pulse.
    pub last_tagged: Timestamp,
    /// Last emitted trigger.
    pub last_sent: TriggerEntry,
}

impl InputState {
    pub(crate) fn decode(body: &[u32]) -> Result<Self, Error> {
        let mut r = MsgReader::new(body);
        r.skip(1); // reply kind, checked by the caller
        let state = Self {
            input: r.get_u32(),
            flags: r.get_u32(),
            log_level: r.get_u32(),
            mode: TriggerMode::from_code(r.get_u32()).ok_or(Error::InvalidAnswer)?,
            tagged_pulses: r.get_u32(),
            sent_triggers: r.get_u32(),
            sent_packets: r.get_u32(),
            miss_no_timing: r.get_u32(),
            seq: r.get_u32(),
            assigned_id: r.get_trig_id(),
            delay: r.get_timestamp(),
            timebase_offset: r.get_timestamp(),
            dead_time: r.get_u32(),
            last_tagged: r.get_timestamp(),
            last_sent: r.get_entry(),
        };
        r.finish().map_err(|_| Error::InvalidAnswer)?;
        Ok(state)
    }

    /// True when the channel is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        IoFlags::from_bits_truncate(self.flags).contains(IoFlags::ENABLED)
    }
}

/// State of one output channel, as reported by `CHAN_GET_STATE`.
#[derive(Debug, Clone, Serialize)]
pub struct OutputState {
    /// Channel index.
    pub output: u32,
    /// Pulses executed.
    pub executed_pulses: u32,
    /// Pulses missed: window passed unfired.
    pub missed_pulses_late: u32,
    /// Pulses missed: dead time.
    pub missed_pulses_deadtime: u32,
    /// Pulses missed: queue overflow.
    pub missed_pulses_overflow: u32,
    /// Pulses missed: no WR timing.
    pub missed_pulses_no_timing: u32,
    /// Last executed trigger.
    pub last_executed: TriggerEntry,
    /// Last enqueued trigger.
    pub last_enqueued: TriggerEntry,
    /// Last trigger message received by the node.
    pub last_received: TriggerEntry,
    /// Last trigger dropped in flight.
    pub last_lost: TriggerEntry,
    /// Pulse generator idle.
    pub idle: bool,
    /// Arming state code.
    pub state: u32,
    /// Triggering mode.
    pub mode: TriggerMode,
    /// Channel flag bits (includes the live NO_WR bit).
    pub flags: u32,
    /// Log-level bits.
    pub log_level: u32,
    /// Dead time in 8 ns ticks.
    pub dead_time: u32,
    /// Pulse width in 8 ns cycles.
    pub width_cycles: u32,
    /// Packets received from the fabric (node-wide).
    pub received_messages: u32,
    /// Entries received over the loopback queue (node-wide).
    pub received_loopback: u32,
    /// Pulses currently queued.
    pub queued_pulses: u32,
}

impl OutputState {
    pub(crate) fn decode(body: &[u32]) -> Result<Self, Error> {
        let mut r = MsgReader::new(body);
        r.skip(1);
        let state = Self {
            output: r.get_u32(),
            executed_pulses: r.get_u32(),
            missed_pulses_late: r.get_u32(),
            missed_pulses_deadtime: r.get_u32(),
            missed_pulses_overflow: r.get_u32(),
            missed_pulses_no_timing: r.get_u32(),
            last_executed: r.get_entry(),
            last_enqueued: r.get_entry(),
            last_received: r.get_entry(),
            last_lost: r.get_entry(),
            idle: r.get_u32() != 0,
            state: r.get_u32(),
            mode: TriggerMode::from_code(r.get_u32()).ok_or(Error::InvalidAnswer)?,
            flags: r.get_u32(),
            log_level: r.get_u32(),
            dead_time: r.get_u32(),
            width_cycles: r.get_u32(),
            received_messages: r.get_u32(),
            received_loopback: r.get_u32(),
            queued_pulses: r.get_u32(),
        };
        r.finish().map_err(|_| Error::InvalidAnswer)?;
        Ok(state)
    }

    /// True when the output is armed (any non-idle arming state).
    #[must_use]
    pub fn armed(&self) -> bool {
        self.state != 0
    }
}

/// Host-side handle to an assigned trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TriggerHandle {
    /// Output channel the trigger is assigned to.
    pub channel: u32,
    /// Arena index of the condition entry, when conditional.
    pub cond: Option<u16>,
    /// Arena index of the trigger entry.
    pub trig: u16,
}

impl TriggerHandle {
    pub(crate) fn decode(body: &[u32]) -> Result<Self, Error> {
        let mut r = MsgReader::new(body);
        r.skip(1);
        let channel = r.get_u32();
        let cond_raw = r.get_u32();
        let trig = r.get_u32();
        r.finish().map_err(|_| Error::InvalidAnswer)?;
        Ok(Self {
            channel,
            cond: (cond_raw != 0).then(|| (cond_raw - 1) as u16),
            trig: trig as u16,
        })
    }

    pub(crate) fn cond_word(&self) -> u32 {
        self.cond.map_or(0, |c| u32::from(c) + 1)
    }
}

/// State of one assigned trigger, as reported by the routing-table reads.
#[derive(Debug, Clone, Serialize)]
pub struct OutputTriggerState {
    /// The trigger fires only after its condition.
    pub is_conditional: bool,
    /// The rule is enabled.
    pub enabled: bool,
    /// Trigger identity.
    pub trigger: TriggerId,
    /// Condition identity (meaningful when conditional).
    pub condition: TriggerId,
    /// Programmed delay in picoseconds.
    pub delay_ps: u64,
    /// Worst-case latency in microseconds.
    pub latency_worst_us: u32,
    /// Average latency in microseconds.
    pub latency_average_us: u32,
    /// Pulses this rule produced.
    pub executed_pulses: u32,
    /// Pulses this rule missed.
    pub missed_pulses: u32,
    /// Handle for follow-up calls.
    pub handle: TriggerHandle,
    /// Arena index of the next entry for this output, for table walks.
    pub next: Option<u16>,
}

impl OutputTriggerState {
    /// Decodes a routing-entry reply; `Ok(None)` when the device marked
    /// the entry invalid (end of a table walk).
    pub(crate) fn decode(channel: u32, body: &[u32]) -> Result<Option<Self>, Error> {
        let mut r = MsgReader::new(body);
        r.skip(1);
        if r.get_u32() == 0 {
            return Ok(None);
        }
        let is_conditional = r.get_u32() != 0;
        let trig = r.get_u32() as u16;
        let cond_raw = r.get_u32();
        let state = r.get_u16();
        let trigger = r.get_trig_id();
        let delay_cycles = r.get_u32();
        let delay_frac = r.get_u16();
        let latency_worst = r.get_u32();
        let latency_sum = r.get_u32();
        let latency_n = r.get_u32();
        let hits = r.get_u32();
        let misses = r.get_u32();
        let condition = r.get_trig_id();
        let next_raw = r.get_u32();
        r.finish().map_err(|_| Error::InvalidAnswer)?;

        let delay_ps =
            u64::from(delay_cycles) * 8_000 + u64::from(delay_frac) * 8_000 / 4_096;
        let average_ticks = if latency_n == 0 { 0 } else { latency_sum / latency_n };
        Ok(Some(Self {
            is_conditional,
            enabled: state & 0x8 == 0,
            trigger,
            condition,
            delay_ps,
            latency_worst_us: latency_worst / 125,
            latency_average_us: average_ticks / 125,
            executed_pulses: hits,
            missed_pulses: misses,
            handle: TriggerHandle {
                channel,
                cond: (cond_raw != 0).then(|| (cond_raw - 1) as u16),
                trig,
            },
            next: (next_raw != 0).then(|| (next_raw - 1) as u16),
        }))
    }
}

/// Firmware version block.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VersionBlock {
    /// Gateware identifier.
    pub fpga_id: u32,
    /// Real-time application identifier.
    pub rt_id: u32,
    /// Application version, major in the high half-word.
    pub rt_version: u32,
    /// Source revision.
    pub git_version: u32,
}

impl VersionBlock {
    pub(crate) fn decode(body: &[u32]) -> Result<Self, Error> {
        let mut r = MsgReader::new(body);
        let block = Self {
            fpga_id: r.get_u32(),
            rt_id: r.get_u32(),
            rt_version: r.get_u32(),
            git_version: r.get_u32(),
        };
        r.finish().map_err(|_| Error::InvalidAnswer)?;
        Ok(block)
    }
}

/// Human-readable flag rendering, matching the configuration tools.
#[must_use]
pub fn format_flags(bits: u32) -> String {
    let flags = IoFlags::from_bits_truncate(bits);
    let names = [
        (IoFlags::ENABLED, "Enabled"),
        (IoFlags::TRIGGER_ASSIGNED, "TrigAssigned"),
        (IoFlags::LAST_VALID, "LastTimestampValid"),
        (IoFlags::ARMED, "Armed"),
        (IoFlags::TRIGGERED, "Triggered"),
        (IoFlags::NO_WR, "NoWRTiming"),
    ];
    let mut parts = Vec::new();
    for (flag, name) in names {
        if flags.contains(flag) {
            parts.push(name);
        }
    }
    parts.join(" ")
}

/// Human-readable log-level rendering.
#[must_use]
pub fn format_log_level(bits: u32) -> String {
    if bits == 0 {
        return "off".to_owned();
    }
    let level = LogLevel::from_bits_truncate(bits);
    let names = [
        (LogLevel::RAW, "Raw"),
        (LogLevel::SENT, "Sent"),
        (LogLevel::PROMISC, "Promiscuous"),
        (LogLevel::FILTERED, "Filtered"),
        (LogLevel::EXECUTED, "Executed"),
        (LogLevel::MISSED, "Missed"),
    ];
    let mut parts = Vec::new();
    for (bit, name) in names {
        if level.contains(bit) {
            parts.push(name);
        }
    }
    parts.join(" ")
}
