//! Typed API for the output (FD) personality.

use std::sync::Mutex;
use std::time::Duration;

use wrtd_common::limits::{
    DEAD_TIME_MAX_TICKS, DEAD_TIME_MIN_TICKS, FD_NUM_CHANNELS, PULSE_WIDTH_MAX_PS,
    PULSE_WIDTH_MIN_PS,
};
use wrtd_common::{LogLevel, TriggerId, TriggerMode};
use wrtd_proto::ids::{APP_ID_FD, fd, rep};
use wrtd_proto::MsgWriter;
use wrtd_time::{FRAC_PER_TICK, SECOND_PS, TICK_PS, Timestamp};

use crate::channel::SyncChannel;
use crate::error::Error;
use crate::state::{OutputState, OutputTriggerState, TriggerHandle, VersionBlock};
use crate::transport::Transport;

/// Control handle to a node's output personality.
pub struct WrtdOutput<T> {
    chan: Mutex<SyncChannel<T>>,
}

impl<T: Transport> WrtdOutput<T> {
    /// Wraps a transport bound to the output control slots.
    pub fn new(transport: T) -> Self {
        Self { chan: Mutex::new(SyncChannel::new(transport, APP_ID_FD, 1, 1)) }
    }

    /// Overrides the per-call reply deadline.
    pub fn set_timeout(&self, timeout: Duration) {
        self.lock().set_timeout(timeout);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SyncChannel<T>> {
        self.chan.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_channel(channel: u32) -> Result<(), Error> {
        if (channel as usize) < FD_NUM_CHANNELS { Ok(()) } else { Err(Error::InvalidChannel) }
    }

    fn split_delay_ps(ps: u64) -> Result<(u32, u32), Error> {
        if ps >= SECOND_PS {
            return Err(Error::InvalidDelay);
        }
        let cycles = (ps / TICK_PS) as u32;
        let frac = ((ps % TICK_PS) * FRAC_PER_TICK as u64 / TICK_PS) as u32;
        Ok((cycles, frac))
    }

    /// Pings the personality.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when the core does not answer.
    pub fn ping(&self) -> Result<(), Error> {
        self.lock().request_ack(fd::PING, &[])
    }

    /// Reads the firmware version block.
    ///
    /// # Errors
    ///
    /// Device rejections plus malformed replies.
    pub fn version(&self) -> Result<VersionBlock, Error> {
        let body = self.lock().request_body(fd::VERSION, &[], rep::VERSION)?;
        VersionBlock::decode(&body[1..])
    }

    /// Reads the node's current TAI time.
    ///
    /// # Errors
    ///
    /// Device rejections plus malformed replies.
    pub fn base_time(&self) -> Result<Timestamp, Error> {
        let body = self.lock().request_body(fd::BASE_TIME, &[], rep::TIMESTAMP)?;
        decode_timestamp_reply(&body)
    }

    /// Enables or disables an output channel.
    ///
    /// Disabling drops every queued pulse, disarms the generator and
    /// returns the channel to idle.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidChannel`] plus device rejections.
    pub fn enable(&self, channel: u32, enable: bool) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(fd::CHAN_ENABLE, &[channel, u32::from(enable)])
    }

    /// Assigns a trigger to an output, optionally gated by a condition.
    ///
    /// The new rule starts disabled with a 100 µs delay; enable it with
    /// [`WrtdOutput::trig_enable`].
    ///
    /// # Errors
    ///
    /// [`Error::TableFull`] when the routing table cannot take the entry
    /// (or pair).
    pub fn trig_assign(
        &self,
        channel: u32,
        id: TriggerId,
        condition: Option<TriggerId>,
    ) -> Result<TriggerHandle, Error> {
        Self::check_channel(channel)?;
        let cond = condition.unwrap_or_default();
        let payload = [
            channel,
            id.system,
            id.source_port,
            id.trigger,
            u32::from(condition.is_some()),
            cond.system,
            cond.source_port,
            cond.trigger,
        ];
        let body = self.lock().request_body(fd::TRIG_ASSIGN, &payload, rep::TRIGGER_HANDLE)?;
        TriggerHandle::decode(&body)
    }

    /// Removes an assigned trigger (and its condition, if any).
    ///
    /// # Errors
    ///
    /// [`Error::TriggerNotFound`] on a stale handle.
    pub fn trig_remove(&self, handle: &TriggerHandle) -> Result<(), Error> {
        self.lock().request_ack(
            fd::TRIG_REMOVE,
            &[handle.channel, handle.cond_word(), u32::from(handle.trig)],
        )
    }

    /// Enables or disables an assigned trigger (and its condition pair).
    ///
    /// # Errors
    ///
    /// [`Error::TriggerNotFound`] on a stale handle.
    pub fn trig_enable(&self, handle: &TriggerHandle, enable: bool) -> Result<(), Error> {
        self.lock().request_ack(
            fd::TRIG_ENABLE,
            &[handle.channel, u32::from(enable), u32::from(handle.trig)],
        )
    }

    /// Sets an assigned trigger's delay from picoseconds.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDelay`] at or beyond one second.
    pub fn trig_set_delay_ps(&self, handle: &TriggerHandle, ps: u64) -> Result<(), Error> {
        let (cycles, frac) = Self::split_delay_ps(ps)?;
        self.lock().request_ack(
            fd::TRIG_SET_DELAY,
            &[handle.channel, u32::from(handle.trig), cycles, frac],
        )
    }

    /// Sets the condition delay of a conditional trigger.
    ///
    /// # Errors
    ///
    /// [`Error::NoTriggerCondition`] when the handle has no condition.
    pub fn trig_set_condition_delay_ps(
        &self,
        handle: &TriggerHandle,
        ps: u64,
    ) -> Result<(), Error> {
        let Some(cond) = handle.cond else {
            return Err(Error::NoTriggerCondition);
        };
        let (cycles, frac) = Self::split_delay_ps(ps)?;
        self.lock().request_ack(
            fd::TRIG_SET_DELAY,
            &[handle.channel, u32::from(cond), cycles, frac],
        )
    }

    /// Looks a trigger up by identity on one output.
    ///
    /// # Errors
    ///
    /// [`Error::TriggerNotFound`] when the identity is not assigned there.
    pub fn trig_get_by_id(
        &self,
        channel: u32,
        id: TriggerId,
    ) -> Result<OutputTriggerState, Error> {
        Self::check_channel(channel)?;
        let body = self.lock().request_body(
            fd::TRIG_GET_BY_ID,
            &[channel, id.system, id.source_port, id.trigger],
            rep::HASH_ENTRY,
        )?;
        OutputTriggerState::decode(channel, &body)?.ok_or(Error::TriggerNotFound)
    }

    /// Reads an assigned trigger's state by handle.
    ///
    /// # Errors
    ///
    /// [`Error::TriggerNotFound`] on a stale handle.
    pub fn trig_state(&self, handle: &TriggerHandle) -> Result<OutputTriggerState, Error> {
        let body = self.lock().request_body(
            fd::TRIG_GET_STATE,
            &[handle.channel, handle.cond_word(), u32::from(handle.trig)],
            rep::HASH_ENTRY,
        )?;
        OutputTriggerState::decode(handle.channel, &body)?.ok_or(Error::TriggerNotFound)
    }

    /// Walks every trigger assigned to one output.
    ///
    /// # Errors
    ///
    /// Device rejections plus malformed replies.
    pub fn trig_list(&self, channel: u32) -> Result<Vec<OutputTriggerState>, Error> {
        Self::check_channel(channel)?;
        let mut triggers = Vec::new();
        let mut cursor = 0u32;
        loop {
            let body = self
                .lock()
                .request_body(fd::READ_HASH, &[channel, cursor], rep::HASH_ENTRY)?;
            let Some(state) = OutputTriggerState::decode(channel, &body)? else {
                break;
            };
            let next = state.next;
            triggers.push(state);
            match next {
                Some(index) => cursor = u32::from(index) + 1,
                None => break,
            }
        }
        Ok(triggers)
    }

    /// Arms or disarms an output.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn arm(&self, channel: u32, armed: bool) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(fd::CHAN_ARM, &[channel, u32::from(armed)])
    }

    /// Sets an output's triggering mode.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn set_mode(&self, channel: u32, mode: TriggerMode) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(fd::CHAN_SET_MODE, &[channel, mode.code()])
    }

    /// Sets an output's pulse width from picoseconds.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPulseWidth`] below 250 ns or at/beyond one second.
    pub fn set_width_ps(&self, channel: u32, ps: u64) -> Result<(), Error> {
        Self::check_channel(channel)?;
        if !(PULSE_WIDTH_MIN_PS..PULSE_WIDTH_MAX_PS).contains(&ps) {
            return Err(Error::InvalidPulseWidth);
        }
        let cycles = (ps / TICK_PS) as u32;
        self.lock().request_ack(fd::CHAN_SET_WIDTH, &[channel, cycles])
    }

    /// Sets an output's dead time from picoseconds (truncating to 8 ns).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDeadTime`] outside the accepted range.
    pub fn set_dead_time_ps(&self, channel: u32, ps: u64) -> Result<(), Error> {
        Self::check_channel(channel)?;
        let ticks = ps / TICK_PS;
        if !(u64::from(DEAD_TIME_MIN_TICKS)..=u64::from(DEAD_TIME_MAX_TICKS)).contains(&ticks) {
            return Err(Error::InvalidDeadTime);
        }
        self.lock().request_ack(fd::CHAN_DEAD_TIME, &[channel, ticks as u32])
    }

    /// Sets an output's log-level bitset.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn set_log_level(&self, channel: u32, level: LogLevel) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(fd::CHAN_SET_LOG_LEVEL, &[channel, level.bits()])
    }

    /// Zeroes an output's counters.
    ///
    /// # Errors
    ///
    /// Device rejections only.
    pub fn reset_counters(&self, channel: u32) -> Result<(), Error> {
        Self::check_channel(channel)?;
        self.lock().request_ack(fd::CHAN_RESET_COUNTERS, &[channel])
    }

    /// Fires a test pulse: immediately (with a small margin) or at an
    /// absolute TAI time. Returns the normalized fire time.
    ///
    /// # Errors
    ///
    /// Device rejections plus malformed replies.
    pub fn software_trigger(
        &self,
        channel: u32,
        at: Option<Timestamp>,
    ) -> Result<Timestamp, Error> {
        Self::check_channel(channel)?;
        let mut payload = [0u32; 8];
        let mut w = MsgWriter::new(&mut payload);
        w.put_u32(channel);
        w.put_u32(u32::from(at.is_none()));
        if let Some(ts) = at {
            w.put_timestamp(&ts);
        }
        let n = w.finish().map_err(|_| Error::InvalidMessage)?;
        let body =
            self.lock().request_body(fd::SOFTWARE_TRIGGER, &payload[..n], rep::TIMESTAMP)?;
        decode_timestamp_reply(&body)
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

    /// Reads an output's full state.
    ///
    /// # Errors
    ///
    /// Device rejections plus malformed replies.
    pub fn state(&self, channel: u32) -> Result<OutputState, Error> {
        Self::check_channel(channel)?;
        let body = self.lock().request_body(fd::CHAN_GET_STATE, &[channel], rep::STATE)?;
        OutputState::decode(&body)
    }
}

fn decode_timestamp_reply(body: &[u32]) -> Result<Timestamp, Error> {
    let mut r = wrtd_proto::MsgReader::new(body);
    r.skip(2); // reply kind + channel
    let ts = r.get_timestamp();
    r.finish().map_err(|_| Error::InvalidAnswer)?;
    Ok(ts)
}
