//! The input personality's main loop and command handlers.

use wrtd_common::limits::{
    DEAD_TIME_MAX_TICKS, DEAD_TIME_MIN_TICKS, DEFAULT_DEAD_TIME_TICKS, TDC_NUM_CHANNELS,
    TRIGGER_COALESCE_LIMIT,
};
use wrtd_common::{ErrorKind, IoFlags, LogEntry, LogLevel, MissReason, TriggerEntry, TriggerMode};
use wrtd_hal::{LoopbackTx, MsgQueue, RawSample, TaiClock, TimestampFifo, WrLinkBits};
use wrtd_node::dispatch::{
    self, CTL_BUF_WORDS, StructSpace, VarDescriptor, WordSpace, handle_standard, is_standard,
};
use wrtd_node::{LinkMonitor, LogStream, slots};
use wrtd_proto::ids::{APP_ID_TDC, FPGA_ID, RT_ID_TDC, RT_VERSION, action, rep, tdc};
use wrtd_proto::{MsgWriter, TriggerPacket, VersionInfo};
use wrtd_time::{TICKS_PER_SECOND, Timestamp};

use crate::channel::{CHANNEL_BLOB_WORDS, InputChannel};

/// Seconds of settle the converter plumbing needs after WR lock.
const TDC_SETTLE_SECS: u32 = 4;

/// Software-trigger delays that land this many seconds out raise an
/// advisory (the send still proceeds).
const SW_TRIGGER_FAR_SECS: u64 = 1000;

/// Structured variables published by the personality.
mod var {
    /// Channel-enable mask (mirrors the hardware register).
    pub const CHAN_ENABLE: u32 = 0;
    /// Current TAI seconds (read-only).
    pub const TAI_SEC: u32 = 1;
    /// Current TAI cycles (read-only).
    pub const TAI_CYCLES: u32 = 2;
    /// Packets sent since reset.
    pub const SENT_PACKETS: u32 = 3;
    /// Shared input dead time, in ticks.
    pub const DEAD_TIME: u32 = 4;
}

/// Descriptor table backing the structured-variable actions.
const VARS: [VarDescriptor; 5] = [
    VarDescriptor { addr: var::CHAN_ENABLE, mask: 0x1F, offset: 0, write_only: false },
    VarDescriptor { addr: var::TAI_SEC, mask: 0xFFFF_FFFF, offset: 0, write_only: false },
    VarDescriptor { addr: var::TAI_CYCLES, mask: 0xFFFF_FFFF, offset: 0, write_only: false },
    VarDescriptor { addr: var::SENT_PACKETS, mask: 0xFFFF_FFFF, offset: 0, write_only: false },
    VarDescriptor { addr: var::DEAD_TIME, mask: 0xFFFF_FFFF, offset: 0, write_only: false },
];

/// The input personality.
///
/// Generic over the hardware seam so the identical trigger path runs on
/// the node and under the software models in tests.
pub struct InputNode<M, F, W, C, L> {
    mq: M,
    fifo: F,
    wr: W,
    clock: C,
    loopback: L,
    link: LinkMonitor,
    log: LogStream,
    channels: [InputChannel; TDC_NUM_CHANNELS],
    chan_enable: u32,
    dead_time: u32,
    sent_packets: u32,
    sw_trigger_warnings: u32,
    coalesce_count: usize,
}

impl<M, F, W, C, L> InputNode<M, F, W, C, L>
where
    M: MsgQueue,
    F: TimestampFifo,
    W: WrLinkBits,
    C: TaiClock,
    L: LoopbackTx,
{
    /// Initializes the personality: queues purged, acquisition masked off,
    /// channels at safe defaults, link machine offline.
    pub fn new(mq: M, fifo: F, wr: W, clock: C, loopback: L) -> Self {
        let mut node = Self {
            mq,
            fifo,
            wr,
            clock,
            loopback,
            link: LinkMonitor::new(TDC_SETTLE_SECS),
            log: LogStream { slot: slots::TDC.log_out, app_id: APP_ID_TDC },
            channels: [InputChannel::default(); TDC_NUM_CHANNELS],
            chan_enable: 0,
            dead_time: DEFAULT_DEAD_TIME_TICKS,
            sent_packets: 0,
            sw_trigger_warnings: 0,
            coalesce_count: 0,
        };
        node.mq.purge(false, slots::TDC.ctl_in);
        node.mq.purge(false, slots::TDC.log_out);
        node.mq.purge(true, slots::TDC.remote);
        node.wr.enable_lock(false);
        node.fifo.set_channel_mask(0);
        node.fifo.set_dead_time(DEFAULT_DEAD_TIME_TICKS);
        node
    }

    /// Firmware version block.
    #[must_use]
    pub fn version() -> VersionInfo {
        VersionInfo { fpga_id: FPGA_ID, rt_id: RT_ID_TDC, rt_version: RT_VERSION, git_version: 0 }
    }

    /// Channel states, for inspection.
    #[must_use]
    pub fn channels(&self) -> &[InputChannel; TDC_NUM_CHANNELS] {
        &self.channels
    }

    /// Current link state machine.
    #[must_use]
    pub fn link(&self) -> &LinkMonitor {
        &self.link
    }

    /// Packets sent since reset.
    #[must_use]
    pub fn sent_packets(&self) -> u32 {
        self.sent_packets
    }

    /// One cooperative loop iteration.
    pub fn poll(&mut self) {
        self.do_input();
        self.dispatch_control();
        self.link.update(&mut self.wr, &self.clock);
    }

    /// Converts a raw FIFO sample to WR time.
    ///
    /// The fine-time field counts 81 ps converter bins; the fixed-point
    /// identity `bins * 5308 >> 7` lands on 1/4096-tick units without a
    /// division, with the overflow folded into ticks and seconds.
    fn convert(sample: &RawSample) -> Timestamp {
        let mut frac = (u64::from(sample.fine_bins()) * 5308 >> 7) as i32;
        let mut ticks = sample.ticks as i32 + (frac >> 12);
        frac &= 0xFFF;
        let mut seconds = u64::from(sample.seconds);
        if ticks >= TICKS_PER_SECOND {
            ticks -= TICKS_PER_SECOND;
            seconds += 1;
        }
        Timestamp { seconds, ticks, frac }
    }

    /// Drains up to the coalesce limit of samples from the FIFO and
    /// flushes whatever got coalesced.
    fn do_input(&mut self) {
        self.mq.claim(true, slots::TDC.remote);

        for _ in 0..TRIGGER_COALESCE_LIMIT {
            let Some(sample) = self.fifo.pop() else { break };
            let channel = sample.channel();
            if channel >= TDC_NUM_CHANNELS {
                continue;
            }
            let ts = Self::convert(&sample);
            self.do_channel(channel, ts);
        }

        if self.coalesce_count > 0 {
            self.flush_tx();
        }
    }

    /// Runs one tagged pulse through the trigger path.
    fn do_channel(&mut self, index: usize, mut ts: Timestamp) {
        let ch = &mut self.channels[index];

        ts -= ch.config.timebase_offset;
        ch.stats.last_tagged = ts;

        self.log.emit(
            &mut self.mq,
            ch.config.log_level,
            &LogEntry {
                kind: LogLevel::RAW,
                channel: index as i32,
                miss_reason: None,
                seq: ch.stats.total_pulses,
                id: ch.config.id,
                ts,
            },
        );

        ch.stats.total_pulses = ch.stats.total_pulses.wrapping_add(1);

        ts += ch.config.delay;

        if !ch.config.flags.contains(IoFlags::TRIGGER_ASSIGNED | IoFlags::ARMED) {
            return;
        }

        if !self.link.is_timing_ok() {
            ch.stats.miss_no_timing = ch.stats.miss_no_timing.wrapping_add(1);
            self.log.emit(
                &mut self.mq,
                ch.config.log_level,
                &LogEntry {
                    kind: LogLevel::MISSED,
                    channel: index as i32,
                    miss_reason: Some(MissReason::NoTiming),
                    seq: ch.stats.seq,
                    id: ch.config.id,
                    ts,
                },
            );
            return;
        }

        let ent = TriggerEntry { ts, id: ch.config.id, seq: ch.stats.seq };
        ch.stats.seq = ch.stats.seq.wrapping_add(1);

        ch.config.flags.insert(IoFlags::TRIGGERED);
        if ch.config.mode == TriggerMode::Single {
            ch.config.flags.remove(IoFlags::ARMED);
        }

        ch.stats.sent_pulses = ch.stats.sent_pulses.wrapping_add(1);
        ch.stats.last_sent = ent;

        Self::push_trigger(
            &mut self.mq,
            &mut self.loopback,
            &mut self.coalesce_count,
            &ent,
        );

        self.log.emit(
            &mut self.mq,
            ch.config.log_level,
            &LogEntry {
                kind: LogLevel::SENT,
                channel: index as i32,
                miss_reason: None,
                seq: ent.seq,
                id: ent.id,
                ts: ent.ts,
            },
        );

        ch.config.flags.insert(IoFlags::LAST_VALID);
    }

    /// Appends an entry to the claimed packet buffer and mirrors it into
    /// the loopback queue.
    fn push_trigger(mq: &mut M, loopback: &mut L, count: &mut usize, ent: &TriggerEntry) {
        TriggerPacket::write_entry(mq.out_buf(true, slots::TDC.remote), *count, ent);
        loopback.push(ent);
        *count += 1;
    }

    /// Stamps the origin time and hands the coalesced packet to the fabric.
    fn flush_tx(&mut self) {
        let (seconds, cycles) = self.clock.now();
        let words = TriggerPacket::finalize(
            self.mq.out_buf(true, slots::TDC.remote),
            seconds,
            cycles,
            self.coalesce_count as u32,
        );
        self.mq.ready(true, slots::TDC.remote, words);
        self.coalesce_count = 0;
        self.sent_packets = self.sent_packets.wrapping_add(1);
    }

    /// Handles at most one pending control request.
    fn dispatch_control(&mut self) {
        let Some(req) = dispatch::poll_request(&mut self.mq, slots::TDC.ctl_in) else {
            return;
        };
        let header = req.header;

        let mut body = [0u32; CTL_BUF_WORDS];
        let mut w = MsgWriter::new(&mut body);

        let result = if is_standard(header.msg_id) {
            let version = Self::version();
            let mut space = Spaces {
                channels: &mut self.channels,
                chan_enable: &mut self.chan_enable,
                dead_time: &mut self.dead_time,
                sent_packets: &mut self.sent_packets,
                sw_trigger_warnings: &mut self.sw_trigger_warnings,
                fifo: &mut self.fifo,
                clock: &self.clock,
            };
            handle_standard(header.msg_id, req.payload(), &version, &VARS, &mut space, &mut w)
        } else {
            self.handle_command(header.msg_id, req.payload(), &mut w)
        };

        match result {
            Ok(msg_id) => {
                let len = w.finish().unwrap_or(0);
                dispatch::send_reply(
                    &mut self.mq,
                    slots::TDC.ctl_out,
                    APP_ID_TDC,
                    &header,
                    msg_id,
                    &body[..len],
                );
            }
            Err(kind) => {
                dispatch::send_nack(&mut self.mq, slots::TDC.ctl_out, APP_ID_TDC, &header, kind);
            }
        }
    }

    fn channel_index(&self, raw: u32) -> Result<usize, ErrorKind> {
        let index = raw as usize;
        if index < TDC_NUM_CHANNELS { Ok(index) } else { Err(ErrorKind::InvalidChannel) }
    }

    /// Runs one personality command, writing the reply body through `w`.
    fn handle_command(
        &mut self,
        msg_id: u8,
        payload: &[u32],
        w: &mut MsgWriter<'_>,
    ) -> Result<u8, ErrorKind> {
        let mut r = wrtd_proto::MsgReader::new(payload);
        match msg_id {
            tdc::PING => {
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            tdc::CHAN_ENABLE => {
                let index = self.channel_index(r.get_u32())?;
                let enable = r.get_u32() != 0;
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let ch = &mut self.channels[index];
                if enable {
                    ch.config.flags.insert(IoFlags::ENABLED);
                    self.chan_enable |= 1 << index;
                } else {
                    ch.config.flags.remove(
                        IoFlags::ENABLED | IoFlags::ARMED | IoFlags::TRIGGERED,
                    );
                    self.chan_enable &= !(1 << index);
                }
                self.fifo.set_channel_mask(self.chan_enable);
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            tdc::CHAN_SET_DEAD_TIME => {
                let _ = self.channel_index(r.get_u32())?;
                let ticks = r.get_u32();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                if !(DEAD_TIME_MIN_TICKS..=DEAD_TIME_MAX_TICKS).contains(&ticks) {
                    return Err(ErrorKind::InvalidDeadTime);
                }
                // The dead time is one hardware register; every channel
                // mirrors the same value.
                self.dead_time = ticks;
                self.fifo.set_dead_time(ticks);
                for ch in &mut self.channels {
                    ch.config.dead_time = ticks;
                }
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            tdc::CHAN_SET_DELAY => {
                let index = self.channel_index(r.get_u32())?;
                let delay = r.get_timestamp();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                if delay.seconds > 0 || delay.ticks >= TICKS_PER_SECOND {
                    return Err(ErrorKind::InvalidDelay);
                }
                self.channels[index].config.delay = delay;
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            tdc::CHAN_SET_TIMEBASE_OFFSET => {
                let index = self.channel_index(r.get_u32())?;
                let offset = r.get_timestamp();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                self.channels[index].config.timebase_offset = offset;
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            tdc::CHAN_ARM => {
                let index = self.channel_index(r.get_u32())?;
                let arm = r.get_u32() != 0;
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let flags = &mut self.channels[index].config.flags;
                flags.remove(IoFlags::TRIGGERED);
                if arm {
                    flags.insert(IoFlags::ARMED);
                } else {
                    flags.remove(IoFlags::ARMED);
                }
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            tdc::CHAN_SET_MODE => {
                let index = self.channel_index(r.get_u32())?;
                let mode =
                    TriggerMode::from_code(r.get_u32()).ok_or(ErrorKind::InvalidMessage)?;
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                self.channels[index].config.mode = mode;
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            tdc::CHAN_SET_SEQ => {
                let index = self.channel_index(r.get_u32())?;
                let seq = r.get_u32();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                self.channels[index].stats.seq = seq;
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            tdc::CHAN_ASSIGN_TRIGGER => {
                let index = self.channel_index(r.get_u32())?;
                let id = r.get_trig_id();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let ch = &mut self.channels[index];
                ch.config.id = id;
                // The all-zero identity unassigns.
                if id == wrtd_common::TriggerId::default() {
                    ch.config.flags.remove(IoFlags::TRIGGER_ASSIGNED);
                } else {
                    ch.config.flags.insert(IoFlags::TRIGGER_ASSIGNED);
                }
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            tdc::CHAN_SET_LOG_LEVEL => {
                let index = self.channel_index(r.get_u32())?;
                let level = LogLevel::from_bits_truncate(r.get_u32());
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                self.channels[index].config.log_level = level;
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            tdc::CHAN_RESET_COUNTERS => {
                let index = self.channel_index(r.get_u32())?;
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let stats = &mut self.channels[index].stats;
                stats.total_pulses = 0;
                stats.sent_pulses = 0;
                stats.miss_no_timing = 0;
                stats.seq = 0;
                self.channels[index].config.flags.remove(IoFlags::LAST_VALID);
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            tdc::CHAN_GET_STATE => {
                let index = self.channel_index(r.get_u32())?;
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let ch = &self.channels[index];
                w.put_u32(rep::STATE);
                w.put_u32(index as u32);
                w.put_u32(ch.config.flags.bits());
                w.put_u32(ch.config.log_level.bits());
                w.put_u32(ch.config.mode.code());
                w.put_u32(ch.stats.total_pulses);
                w.put_u32(ch.stats.sent_pulses);
                w.put_u32(self.sent_packets);
                w.put_u32(ch.stats.miss_no_timing);
                w.put_u32(ch.stats.seq);
                w.put_trig_id(&ch.config.id);
                w.put_timestamp(&ch.config.delay);
                w.put_timestamp(&ch.config.timebase_offset);
                w.put_u32(ch.config.dead_time);
                w.put_timestamp(&ch.stats.last_tagged);
                w.put_entry(&ch.stats.last_sent);
                Ok(action::SEND_ACK)
            }
            tdc::SOFTWARE_TRIGGER => {
                let mut ent = r.get_entry();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                // The host supplies a delay in the timestamp field; fire
                // time is that delay added to the current TAI.
                let now = self.clock.now_ts();
                ent.ts += now;
                if ent.ts.seconds > now.seconds + SW_TRIGGER_FAR_SECS {
                    self.sw_trigger_warnings = self.sw_trigger_warnings.wrapping_add(1);
                }
                if self.coalesce_count == TRIGGER_COALESCE_LIMIT {
                    self.flush_tx();
                    self.mq.claim(true, slots::TDC.remote);
                }
                Self::push_trigger(
                    &mut self.mq,
                    &mut self.loopback,
                    &mut self.coalesce_count,
                    &ent,
                );
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            _ => Err(ErrorKind::InvalidMessage),
        }
    }
}

/// Field borrows handed to the transport-standard actions.
struct Spaces<'a, F, C> {
    channels: &'a mut [InputChannel; TDC_NUM_CHANNELS],
    chan_enable: &'a mut u32,
    dead_time: &'a mut u32,
    sent_packets: &'a mut u32,
    sw_trigger_warnings: &'a mut u32,
    fifo: &'a mut F,
    clock: &'a C,
}

impl<F: TimestampFifo, C: TaiClock> WordSpace for Spaces<'_, F, C> {
    fn read_word(&mut self, addr: u32) -> u32 {
        match addr {
            var::CHAN_ENABLE => *self.chan_enable,
            var::TAI_SEC => self.clock.now().0,
            var::TAI_CYCLES => self.clock.now().1,
            var::SENT_PACKETS => *self.sent_packets,
            var::DEAD_TIME => *self.dead_time,
            _ => 0,
        }
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        match addr {
            var::CHAN_ENABLE => {
                *self.chan_enable = value & 0x1F;
                self.fifo.set_channel_mask(*self.chan_enable);
            }
            var::SENT_PACKETS => *self.sent_packets = value,
            var::DEAD_TIME => {
                *self.dead_time = value;
                self.fifo.set_dead_time(value);
            }
            _ => {}
        }
    }
}

impl<F: TimestampFifo, C: TaiClock> StructSpace for Spaces<'_, F, C> {
    fn struct_read(&self, index: u32, w: &mut MsgWriter<'_>) -> bool {
        match index {
            0 => {
                w.put_u32(*self.sent_packets);
                w.put_u32(*self.dead_time);
                w.put_u32(*self.chan_enable);
                w.put_u32(*self.sw_trigger_warnings);
                true
            }
            1..=5 => {
                self.channels[(index - 1) as usize].put_blob(w);
                true
            }
            _ => false,
        }
    }

    fn struct_write(&mut self, index: u32, data: &[u32]) -> bool {
        match index {
            0 => {
                if data.len() != 4 {
                    return false;
                }
                *self.sent_packets = data[0];
                *self.dead_time = data[1];
                *self.chan_enable = data[2] & 0x1F;
                *self.sw_trigger_warnings = data[3];
                self.fifo.set_dead_time(*self.dead_time);
                self.fifo.set_channel_mask(*self.chan_enable);
                true
            }
            1..=5 => self.channels[(index - 1) as usize].set_blob(data),
            _ => false,
        }
    }
}

const _: () = assert!(CHANNEL_BLOB_WORDS < CTL_BUF_WORDS);
