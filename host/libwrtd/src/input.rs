//! Typed API for the input (TDC) personality.

use std::sync::Mutex;
use std::time::Duration;

use wrtd_common::limits::{DEAD_TIME_MAX_TICKS, DEAD_TIME_MIN_TICKS, TDC_NUM_CHANNELS};
use wrtd_common::{LogLevel, TriggerEntry, TriggerId, TriggerMode};
use wrtd_proto::ids::{APP_ID_TDC, action, rep, tdc};
use wrtd_proto::{MsgWriter, VersionInfo};
use wrtd_time::{SECOND_PS, TICK_PS, Timestamp};

use crate::channel::SyncChannel;
use crate::error::Error;
use crate::state::{InputState, VersionBlock};
use crate::transport::Transport;

/// Control handle to a node's input personality.
///
/// A mutex serializes synchronous calls so replies can never be matched
/// to the wrong caller.
pub struct WrtdInput<T> {
    chan: Mutex<SyncChannel<T>>,
}

impl<T: Transport> WrtdInput<T> {
    /// Wraps a transport bound to the input control slots.
    pub fn new(transport: T) -> Self {
        Self { chan: Mutex::new(SyncChannel::new(transport, APP_ID_TDC, 0, 0)) }
    }

    /// Overrides the per-call reply deadline.
    pub fn set_timeout(&self, timeout: Duration) {
        self.lock().set_timeout(timeout);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SyncChannel<T>> {
        self.chan.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_channel(channel: u32) -> Result<(), Error> {
        if (channel as usize) < TDC_NUM_CHANNELS { Ok(()) } else { Err(Error::InvalidChannel) }
    }

    /// Pings the personality.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when the core does not answer.
    pub fn ping(&self) -> Result<(), Error> {
        self.lock().request_ack(tdc::PING, &[])
    }

    /// Reads the firmware version block.
    ///
    /// # Errors
    ///
    /// Propagates transport and protocol failures.
    pub fn version(&self) -> Result<VersionBlock, Error> {
        let (reply_id, body) = self.lock().request(action::RECV_VERSION, &[])?;
        if reply_id != action::SEND_VERSION {
            return Err(Error::InvalidAnswer);
        }
        VersionBlock::decode(&body)
    }

    /// Checks the version block against this library's expectations.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidAnswer`] on an application-id mismatch.
    pub fn check_version(&self) -> Result<VersionBlock, Error> {
        let block = self.version()?;
        let expect = VersionInfo {
            fpga_id: wrtd_proto::ids::FPGA_ID,
            rt_id: wrtd_proto::ids::RT_ID_TDC,
            rt_version: wrtd_proto::ids::RT_VERSION,
            git_version: 0,
        };
        if block.rt_id != expect.rt_id {
            return Err(Error::InvalidAnswer);
        }
        Ok(block)
    }

    /// Enables or disables an input channel.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidChannel`] plus device rejections.
    pub fn enable(&self, channel: u32, enable: bool) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(tdc::CHAN_ENABLE, &[channel, u32::from(enable)])
    }

    /// Sets the shared input dead time from picoseconds.
    ///
    /// The value quantizes (truncating) to 8 ns ticks before validation.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDeadTime`] when the quantized value is outside the
    /// accepted range.
    pub fn set_dead_time_ps(&self, channel: u32, ps: u64) -> Result<(), Error> {
        Self::check_channel(channel)?;
        let ticks = ps / TICK_PS;
        if !(u64::from(DEAD_TIME_MIN_TICKS)..=u64::from(DEAD_TIME_MAX_TICKS)).contains(&ticks) {
            return Err(Error::InvalidDeadTime);
        }
        self.lock().request_ack(tdc::CHAN_SET_DEAD_TIME, &[channel, ticks as u32])
    }

    /// Sets a channel's trigger delay from picoseconds.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDelay`] at or beyond one second.
    pub fn set_delay_ps(&self, channel: u32, ps: u64) -> Result<(), Error> {
        Self::check_channel(channel)?;
        if ps >= SECOND_PS {
            return Err(Error::InvalidDelay);
        }
        let delay = Timestamp::from_picos(ps);
        let mut payload = [0u32; 8];
        let mut w = MsgWriter::new(&mut payload);
        w.put_u32(channel);
        w.put_timestamp(&delay);
        let n = w.finish().map_err(|_| Error::InvalidMessage)?;
        self.lock().request_ack(tdc::CHAN_SET_DELAY, &payload[..n])
    }

    /// Sets a channel's timebase offset.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn set_timebase_offset(&self, channel: u32, offset: Timestamp) -> Result<(), Error> {
        Self::check_channel(channel)?;
        let mut payload = [0u32; 8];
        let mut w = MsgWriter::new(&mut payload);
        w.put_u32(channel);
        w.put_timestamp(&offset);
        let n = w.finish().map_err(|_| Error::InvalidMessage)?;
        self.lock().request_ack(tdc::CHAN_SET_TIMEBASE_OFFSET, &payload[..n])
    }

    /// Sets a channel's triggering mode.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn set_mode(&self, channel: u32, mode: TriggerMode) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(tdc::CHAN_SET_MODE, &[channel, mode.code()])
    }

    /// Arms or disarms a channel; arming clears the triggered flag.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn arm(&self, channel: u32, armed: bool) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(tdc::CHAN_ARM, &[channel, u32::from(armed)])
    }

    /// Assigns a trigger identity to a channel.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn assign_trigger(&self, channel: u32, id: TriggerId) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(
            tdc::CHAN_ASSIGN_TRIGGER,
            &[channel, id.system, id.source_port, id.trigger],
        )
    }

    /// Removes a channel's trigger assignment.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn unassign_trigger(&self, channel: u32) -> Result<(), Error> {
        self.assign_trigger(channel, TriggerId::default())
    }

    /// Seeds a channel's sequence counter.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn set_seq(&self, channel: u32, seq: u32) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(tdc::CHAN_SET_SEQ, &[channel, seq])
    }

    /// Sets a channel's log-level bitset.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn set_log_level(&self, channel: u32, level: LogLevel) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(tdc::CHAN_SET_LOG_LEVEL, &[channel, level.bits()])
    }

    /// Zeroes a channel's counters (including the sequence number).
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn reset_counters(&self, channel: u32) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(tdc::CHAN_RESET_COUNTERS, &[channel])
    }

    /// Emits a software trigger.
    ///
    /// `entry.ts` carries the delay from "now" at which the trigger
    /// should fire; identity and sequence pass through unchanged.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn software_trigger(&self, entry: &TriggerEntry) -> Result<(), Error> {
        let mut payload = [0u32; 8];
        let mut w = MsgWriter::new(&mut payload);
        w.put_entry(entry);
        let n = w.finish().map_err(|_| Error::InvalidMessage)?;
        self.lock().request_ack(tdc::SOFTWARE_TRIGGER, &payload[..n])
    }


    /// Reads structured variables by descriptor index.
    ///
    /// # Errors
    ///
    /// Device rejections plus transport failures.
    pub fn field_get(&self, indices: &[u32]) -> Result<Vec<u32>, Error> {
        self.lock().field_get(indices)
    }

    /// Writes structured variables as `(index, value)` pairs.
    ///
    /// # Errors
    ///
    /// Device rejections plus transport failures.
    pub fn field_set(&self, pairs: &[(u32, u32)]) -> Result<(), Error> {
        self.lock().field_set(pairs)
    }

    /// Reads structured blobs by index.
    ///
    /// # Errors
    ///
    /// Device rejections plus transport failures.
    pub fn struct_get(&self, indices: &[u32]) -> Result<Vec<(u32, Vec<u32>)>, Error> {
        self.lock().struct_get(indices)
    }

    /// Writes structured blobs as `(index, words)` records.
    ///
    /// # Errors
    ///
    /// Device rejections plus transport failures.
    pub fn struct_set(&self, records: &[(u32, Vec<u32>)]) -> Result<(), Error> {
        self.lock().struct_set(records)
    }

    /// Reads a channel's full state.
    ///
    /// # Errors
    ///
    /// Device rejections plus [`Error::InvalidAnswer`] on a malformed
    /// reply.
    pub fn state(&self, channel: u32) -> Result<InputState, Error> {
        Self::check_channel(channel)?;
        let body = self.lock().request_body(tdc::CHAN_GET_STATE, &[channel], rep::STATE)?;
        InputState::decode(&body)
    }
}
