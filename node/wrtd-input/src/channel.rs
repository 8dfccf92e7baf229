//! Per-channel input state and its blob serialization.

use wrtd_common::{IoFlags, LogLevel, TriggerEntry, TriggerId, TriggerMode};
use wrtd_common::limits::DEFAULT_DEAD_TIME_TICKS;
use wrtd_proto::{MsgReader, MsgWriter};
use wrtd_time::Timestamp;

/// Host-owned configuration of one input channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// Trigger identity emitted for this channel's pulses.
    pub id: TriggerId,
    /// Delay added to each tagged pulse before emission.
    pub delay: Timestamp,
    /// Offset aligning the converter timebase with WR time.
    pub timebase_offset: Timestamp,
    /// Dead time in 8 ns ticks (mirror of the shared hardware value).
    pub dead_time: u32,
    /// Triggering mode.
    pub mode: TriggerMode,
    /// Channel flags.
    pub flags: IoFlags,
    /// Log-level bitset.
    pub log_level: LogLevel,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            id: TriggerId::default(),
            delay: Timestamp::zero(),
            timebase_offset: Timestamp::zero(),
            dead_time: DEFAULT_DEAD_TIME_TICKS,
            mode: TriggerMode::Auto,
            flags: IoFlags::empty(),
            log_level: LogLevel::empty(),
        }
    }
}

/// Firmware-owned runtime state of one input channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelStats {
    /// Timestamp of the last tagged pulse (after timebase alignment).
    pub last_tagged: Timestamp,
    /// Last trigger entry emitted.
    pub last_sent: TriggerEntry,
    /// Sequence number of the next trigger.
    pub seq: u32,
    /// Pulses tagged on this channel.
    pub total_pulses: u32,
    /// Triggers actually emitted.
    pub sent_pulses: u32,
    /// Triggers dropped because WR timing was unavailable.
    pub miss_no_timing: u32,
}

/// One input channel: configuration plus runtime state.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputChannel {
    /// Configuration, host-owned.
    pub config: ChannelConfig,
    /// Runtime state, firmware-owned.
    pub stats: ChannelStats,
}

/// Serialized channel blob length in words.
pub const CHANNEL_BLOB_WORDS: usize = 31;

impl InputChannel {
    /// Serializes the channel blob for structured-struct access.
    pub fn put_blob(&self, w: &mut MsgWriter<'_>) {
        w.put_trig_id(&self.config.id);
        w.put_timestamp(&self.config.delay);
        w.put_timestamp(&self.config.timebase_offset);
        w.put_u32(self.config.dead_time);
        w.put_u32(self.config.mode.code());
        w.put_u32(self.config.flags.bits());
        w.put_u32(self.config.log_level.bits());
        w.put_timestamp(&self.stats.last_tagged);
        w.put_entry(&self.stats.last_sent);
        w.put_u32(self.stats.seq);
        w.put_u32(self.stats.total_pulses);
        w.put_u32(self.stats.sent_pulses);
        w.put_u32(self.stats.miss_no_timing);
    }

    /// Overwrites the channel from a blob; false on malformed data.
    pub fn set_blob(&mut self, data: &[u32]) -> bool {
        if data.len() != CHANNEL_BLOB_WORDS {
            return false;
        }
        let mut r = MsgReader::new(data);
        let id = r.get_trig_id();
        let delay = r.get_timestamp();
        let timebase_offset = r.get_timestamp();
        let dead_time = r.get_u32();
        let Some(mode) = TriggerMode::from_code(r.get_u32()) else {
            return false;
        };
        let flags = IoFlags::from_bits_truncate(r.get_u32());
        let log_level = LogLevel::from_bits_truncate(r.get_u32());
        let last_tagged = r.get_timestamp();
        let last_sent = r.get_entry();
        let seq = r.get_u32();
        let total_pulses = r.get_u32();
        let sent_pulses = r.get_u32();
        let miss_no_timing = r.get_u32();
        if r.finish().is_err() {
            return false;
        }
        self.config =
            ChannelConfig { id, delay, timebase_offset, dead_time, mode, flags, log_level };
        self.stats = ChannelStats {
            last_tagged,
            last_sent,
            seq,
            total_pulses,
            sent_pulses,
            miss_no_timing,
        };
        true
    }
}
