//! The output personality's main loop, scheduler and command handlers.

use wrtd_common::limits::{
    DEAD_TIME_MAX_TICKS, DEAD_TIME_MIN_TICKS, DEFAULT_RULE_DELAY_CYCLES, FD_NUM_CHANNELS,
    PULSE_WIDTH_MIN_CYCLES, ROUTING_ENTRIES,
};
use wrtd_common::{
    ErrorKind, IoFlags, LogEntry, LogLevel, MissReason, TriggerEntry, TriggerId, TriggerMode,
};
use wrtd_hal::{LoopbackRx, MsgQueue, PulseGen, TaiClock, WrLinkBits};
use wrtd_node::dispatch::{
    self, CTL_BUF_WORDS, StructSpace, VarDescriptor, WordSpace, handle_standard, is_standard,
};
use wrtd_node::{LinkMonitor, LogStream, slots};
use wrtd_proto::ids::{APP_ID_FD, FPGA_ID, RT_ID_FD, RT_VERSION, action, fd, rep};
use wrtd_proto::{MsgReader, MsgWriter, TriggerPacket, VersionInfo};
use wrtd_time::{TICKS_PER_SECOND, Timestamp};

use crate::output::{OUTPUT_BLOB_WORDS, OutputChannel, OutputState};
use crate::queue::PulseEntry;
use crate::rules::{OutputRule, RoutingTable, RuleState};

/// Watchdog margin added past the programmed end (1000 cycles ≈ 8 µs).
const DEADLINE_MARGIN_TICKS: i32 = 1_000;

/// Margin for "fire now" software pulses (10 000 ticks = 80 µs).
const SW_TRIGGER_MARGIN_TICKS: i32 = 10_000;

/// Latency accumulator reset threshold.
const LATENCY_SUM_LIMIT: u32 = 2_000_000_000;

/// Structured variables published by the personality.
mod var {
    /// Current TAI seconds (read-only).
    pub const TAI_SEC: u32 = 0;
    /// Current TAI cycles (read-only).
    pub const TAI_CYCLES: u32 = 1;
    /// Packets received from the fabric.
    pub const RX_NETWORK: u32 = 2;
    /// Entries received over the loopback queue.
    pub const RX_LOOPBACK: u32 = 3;
}

/// Descriptor table backing the structured-variable actions.
const VARS: [VarDescriptor; 4] = [
    VarDescriptor { addr: var::TAI_SEC, mask: 0xFFFF_FFFF, offset: 0, write_only: false },
    VarDescriptor { addr: var::TAI_CYCLES, mask: 0xFFFF_FFFF, offset: 0, write_only: false },
    VarDescriptor { addr: var::RX_NETWORK, mask: 0xFFFF_FFFF, offset: 0, write_only: false },
    VarDescriptor { addr: var::RX_LOOPBACK, mask: 0xFFFF_FFFF, offset: 0, write_only: false },
];

/// The output personality.
pub struct OutputNode<M, G, W, C, L> {
    mq: M,
    generators: G,
    wr: W,
    clock: C,
    loopback: L,
    link: LinkMonitor,
    log: LogStream,
    outputs: [OutputChannel; FD_NUM_CHANNELS],
    table: RoutingTable,
    last_received: TriggerEntry,
    rx_network: u32,
    rx_loopback: u32,
    promiscuous: bool,
}

impl<M, G, W, C, L> OutputNode<M, G, W, C, L>
where
    M: MsgQueue,
    G: PulseGen,
    W: WrLinkBits,
    C: TaiClock,
    L: LoopbackRx,
{
    /// Initializes the personality: queues purged, generators disarmed,
    /// outputs at safe defaults, link machine offline.
    pub fn new(mq: M, generators: G, wr: W, clock: C, loopback: L) -> Self {
        let mut node = Self {
            mq,
            generators,
            wr,
            clock,
            loopback,
            link: LinkMonitor::new(0),
            log: LogStream { slot: slots::FD.log_out, app_id: APP_ID_FD },
            outputs: [OutputChannel::new(); FD_NUM_CHANNELS],
            table: RoutingTable::new(),
            last_received: TriggerEntry::default(),
            rx_network: 0,
            rx_loopback: 0,
            promiscuous: false,
        };
        node.mq.purge(false, slots::FD.ctl_in);
        node.mq.purge(false, slots::FD.log_out);
        node.mq.purge(true, slots::FD.remote);
        node.wr.enable_lock(false);
        for ch in 0..FD_NUM_CHANNELS {
            node.generators.disarm(ch);
        }
        node
    }

    /// Firmware version block.
    #[must_use]
    pub fn version() -> VersionInfo {
        VersionInfo { fpga_id: FPGA_ID, rt_id: RT_ID_FD, rt_version: RT_VERSION, git_version: 0 }
    }

    /// Output states, for inspection.
    #[must_use]
    pub fn outputs(&self) -> &[OutputChannel; FD_NUM_CHANNELS] {
        &self.outputs
    }

    /// The routing table, for inspection.
    #[must_use]
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Current link state machine.
    #[must_use]
    pub fn link(&self) -> &LinkMonitor {
        &self.link
    }

    /// One cooperative loop iteration.
    pub fn poll(&mut self) {
        self.do_rx();
        self.do_outputs();
        self.dispatch_control();
        self.link.update(&mut self.wr, &self.clock);
    }

    /// Ingress: at most one fabric packet, then at most one loopback entry.
    fn do_rx(&mut self) {
        if self.mq.in_poll(true) & (1 << slots::FD.remote) != 0 {
            let packet = TriggerPacket::decode(self.mq.in_buf(true, slots::FD.remote));
            self.mq.discard(true, slots::FD.remote);
            if let Ok(packet) = packet {
                for trigger in &packet.triggers[..packet.count as usize] {
                    self.filter_trigger(trigger);
                }
                self.rx_network = self.rx_network.wrapping_add(1);
            }
        }

        if let Some(ent) = self.loopback.pop() {
            self.filter_trigger(&ent);
            self.rx_loopback = self.rx_loopback.wrapping_add(1);
        }
    }

    /// Routing-table match plus node-level promiscuous logging.
    fn filter_trigger(&mut self, trig: &TriggerEntry) {
        if self.promiscuous {
            self.log.emit(
                &mut self.mq,
                LogLevel::PROMISC,
                &LogEntry {
                    kind: LogLevel::PROMISC,
                    channel: -1,
                    miss_reason: None,
                    seq: trig.seq,
                    id: trig.id,
                    ts: trig.ts,
                },
            );
        }
        self.last_received = *trig;

        if let Some(index) = self.table.find(&trig.id) {
            for output in 0..FD_NUM_CHANNELS {
                if !self.table.rule(index, output).is_empty() {
                    self.enqueue_trigger(output, index, trig);
                }
            }
        }
    }

    /// Emits a MISSED log entry for `output`.
    fn log_missed(&mut self, output: usize, reason: MissReason, ent: &TriggerEntry) {
        let gate = self.outputs[output].config.log_level;
        self.log.emit(
            &mut self.mq,
            gate,
            &LogEntry {
                kind: LogLevel::MISSED,
                channel: output as i32,
                miss_reason: Some(reason),
                seq: ent.seq,
                id: ent.id,
                ts: ent.ts,
            },
        );
    }

    /// Runs one matching trigger through `output`'s gating and queue.
    fn enqueue_trigger(&mut self, output: usize, row: u16, trig: &TriggerEntry) {
        let rule = *self.table.rule(row, output);
        if rule.state.contains(RuleState::DISABLED) {
            return;
        }
        if !self.outputs[output].config.flags.contains(IoFlags::ENABLED) {
            return;
        }

        let mut adjusted = trig.ts;
        adjusted.adjust_delay(rule.delay_cycles, u32::from(rule.delay_frac));

        let dead_time = i64::from(self.outputs[output].config.dead_time);
        if adjusted.ticks_since(&self.outputs[output].prev_pulse) < dead_time {
            let rule = self.table.rule_mut(row, output);
            rule.misses = rule.misses.wrapping_add(1);
            let stats = &mut self.outputs[output].stats;
            stats.miss_deadtime = stats.miss_deadtime.wrapping_add(1);
            self.log_missed(output, MissReason::DeadTime, trig);
            return;
        }

        if !self.link.is_timing_ok() {
            let rule = self.table.rule_mut(row, output);
            rule.misses = rule.misses.wrapping_add(1);
            let stats = &mut self.outputs[output].stats;
            stats.miss_no_timing = stats.miss_no_timing.wrapping_add(1);
            self.log_missed(output, MissReason::NoTiming, trig);
            return;
        }

        {
            let out = &mut self.outputs[output];
            match out.state {
                OutputState::Idle | OutputState::TestPending => return,
                OutputState::Armed => {
                    if rule.state.contains(RuleState::CONDITION) {
                        out.pending_trig = rule.cond_ptr;
                        out.state = OutputState::ConditionHit;
                        return;
                    }
                    if rule.state.contains(RuleState::CONDITIONAL) {
                        // Gated rule without its condition: ignore.
                        return;
                    }
                    if out.config.mode == TriggerMode::Single {
                        out.config.flags.remove(IoFlags::ARMED);
                        out.state = OutputState::Idle;
                    }
                }
                OutputState::ConditionHit => {
                    if out.pending_trig != Some(row) {
                        return;
                    }
                    if out.config.mode == TriggerMode::Single {
                        out.config.flags.remove(IoFlags::ARMED);
                        out.state = OutputState::Idle;
                    } else {
                        out.state = OutputState::Armed;
                    }
                    out.pending_trig = None;
                }
            }
        }

        let entry = PulseEntry {
            trig: TriggerEntry { ts: adjusted, id: trig.id, seq: trig.seq },
            origin_cycles: trig.ts.ticks,
            rule: Some((row, output as u8)),
        };

        if !self.outputs[output].queue.push(entry) {
            let stats = &mut self.outputs[output].stats;
            stats.miss_overflow = stats.miss_overflow.wrapping_add(1);
            self.log_missed(output, MissReason::Overflow, trig);
            return;
        }

        let out = &mut self.outputs[output];
        out.prev_pulse = adjusted;
        out.last_enqueued = entry.trig;
        let gate = out.config.log_level;
        let logged = out.last_enqueued;
        self.log.emit(
            &mut self.mq,
            gate,
            &LogEntry {
                kind: LogLevel::FILTERED,
                channel: output as i32,
                miss_reason: None,
                seq: logged.seq,
                id: logged.id,
                ts: logged.ts,
            },
        );
    }

    /// Steps every output's scheduler.
    fn do_outputs(&mut self) {
        for output in 0..FD_NUM_CHANNELS {
            self.do_output(output);
        }
    }

    /// Drops the pulse at the head of `output`'s queue and disarms.
    fn drop_head(&mut self, output: usize, reason: MissReason) {
        self.outputs[output].idle = true;
        let Some(front) = self.outputs[output].queue.front().copied() else {
            return;
        };
        {
            let out = &mut self.outputs[output];
            out.queue.pop();
            match reason {
                MissReason::Timeout => out.stats.miss_timeout = out.stats.miss_timeout.wrapping_add(1),
                MissReason::NoTiming => {
                    out.stats.miss_no_timing = out.stats.miss_no_timing.wrapping_add(1);
                }
                MissReason::DeadTime => {
                    out.stats.miss_deadtime = out.stats.miss_deadtime.wrapping_add(1);
                }
                MissReason::Overflow => {
                    out.stats.miss_overflow = out.stats.miss_overflow.wrapping_add(1);
                }
            }
            out.last_lost = front.trig;
            if out.state == OutputState::TestPending {
                out.state = OutputState::Idle;
            }
        }
        if let Some((row, ch)) = front.rule {
            let rule = self.table.rule_mut(row, ch as usize);
            rule.misses = rule.misses.wrapping_add(1);
        }
        self.generators.disarm(output);
        self.log_missed(output, reason, &front.trig);
    }

    /// True when wall-clock TAI has passed `output`'s programmed deadline.
    fn past_deadline(&self, output: usize) -> bool {
        let now = self.clock.now_ts();
        now.ticks_since(&self.outputs[output].last_programmed) > 0
    }

    /// One scheduler step for `output`.
    fn do_output(&mut self, output: usize) {
        if !self.outputs[output].idle {
            // A pulse is programmed; wait for the hardware or the watchdog.
            if !self.link.is_timing_ok() {
                self.drop_head(output, MissReason::NoTiming);
                return;
            }
            if !self.generators.has_triggered(output) {
                if self.past_deadline(output) {
                    self.drop_head(output, MissReason::Timeout);
                }
                return;
            }

            let Some(front) = self.outputs[output].queue.front().copied() else {
                self.outputs[output].idle = true;
                return;
            };
            {
                let out = &mut self.outputs[output];
                out.last_executed = front.trig;
                out.queue.pop();
                out.stats.hits = out.stats.hits.wrapping_add(1);
                out.idle = true;
                out.config.flags.insert(IoFlags::TRIGGERED | IoFlags::LAST_VALID);
                if out.state == OutputState::TestPending {
                    out.state = OutputState::Idle;
                }
            }
            if let Some((row, ch)) = front.rule {
                let rule = self.table.rule_mut(row, ch as usize);
                rule.hits = rule.hits.wrapping_add(1);
            }
            let gate = self.outputs[output].config.log_level;
            self.log.emit(
                &mut self.mq,
                gate,
                &LogEntry {
                    kind: LogLevel::EXECUTED,
                    channel: output as i32,
                    miss_reason: None,
                    seq: front.trig.seq,
                    id: front.trig.id,
                    ts: front.trig.ts,
                },
            );
            return;
        }

        // Idle: look for the next pulse to program.
        if self.outputs[output].queue.is_empty() {
            return;
        }
        if !self.link.is_timing_ok() {
            self.drop_head(output, MissReason::NoTiming);
            return;
        }

        let Some(front) = self.outputs[output].queue.front().copied() else { return };
        let start = front.trig.ts;
        let mut end = start;
        end.add_ticks(self.outputs[output].config.width_cycles as i32);
        self.generators.program(output, &start, &end);

        let mut deadline = end;
        deadline.add_ticks(DEADLINE_MARGIN_TICKS);
        self.outputs[output].last_programmed = deadline;
        self.outputs[output].idle = false;

        self.update_latency_stats(&front);
    }

    /// Folds one matched-to-programmed latency sample into the rule stats.
    fn update_latency_stats(&mut self, entry: &PulseEntry) {
        let Some((row, ch)) = entry.rule else { return };
        let (_, cycles) = self.clock.now();
        let mut latency = cycles as i32 - entry.origin_cycles;
        if latency < 0 {
            latency += TICKS_PER_SECOND;
        }
        let rule = self.table.rule_mut(row, ch as usize);
        let latency = latency as u32;
        if latency > rule.latency_worst {
            rule.latency_worst = latency;
        }
        if rule.latency_avg_sum > LATENCY_SUM_LIMIT {
            rule.latency_avg_sum = 0;
            rule.latency_avg_nsamples = 0;
        }
        rule.latency_avg_sum += latency;
        rule.latency_avg_nsamples += 1;
    }

    /// Recomputes the node-level promiscuous gate (the OR of the
    /// per-output PROMISC bits).
    fn refresh_promiscuous(&mut self) {
        self.promiscuous = self
            .outputs
            .iter()
            .any(|out| out.config.log_level.contains(LogLevel::PROMISC));
    }

    fn channel_index(&self, raw: u32) -> Result<usize, ErrorKind> {
        let index = raw as usize;
        if index < FD_NUM_CHANNELS { Ok(index) } else { Err(ErrorKind::InvalidChannel) }
    }

    /// Validates a host-supplied arena index carrying a rule for `output`.
    fn rule_index(&self, raw: u32, output: usize) -> Result<u16, ErrorKind> {
        let index = raw as usize;
        if index >= ROUTING_ENTRIES {
            return Err(ErrorKind::TriggerNotFound);
        }
        let row = self.table.row(index as u16);
        if !row.valid || row.rules[output].is_empty() {
            return Err(ErrorKind::TriggerNotFound);
        }
        Ok(index as u16)
    }

    /// Handles at most one pending control request.
    fn dispatch_control(&mut self) {
        let Some(req) = dispatch::poll_request(&mut self.mq, slots::FD.ctl_in) else {
            return;
        };
        let header = req.header;

        let mut body = [0u32; CTL_BUF_WORDS];
        let mut w = MsgWriter::new(&mut body);

        let result = if is_standard(header.msg_id) {
            let version = Self::version();
            let mut space = Spaces {
                outputs: &mut self.outputs,
                rx_network: &mut self.rx_network,
                rx_loopback: &mut self.rx_loopback,
                promiscuous: self.promiscuous,
                table_len: self.table.len() as u32,
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
                    slots::FD.ctl_out,
                    APP_ID_FD,
                    &header,
                    msg_id,
                    &body[..len],
                );
            }
            Err(kind) => {
                dispatch::send_nack(&mut self.mq, slots::FD.ctl_out, APP_ID_FD, &header, kind);
            }
        }
        // Log-level changes may have altered the PROMISC union.
        self.refresh_promiscuous();
    }

    /// Serializes a routing-entry reply for `output`.
    fn put_hash_entry(&self, w: &mut MsgWriter<'_>, output: usize, index: Option<u16>) {
        w.put_u32(rep::HASH_ENTRY);
        let Some(index) = index else {
            w.put_u32(0);
            return;
        };
        let row = self.table.row(index);
        let rule = &row.rules[output];
        w.put_u32(1);
        let cond = if rule.state.contains(RuleState::CONDITIONAL) { rule.cond_ptr } else { None };
        w.put_u32(u32::from(cond.is_some()));
        w.put_u32(u32::from(index));
        w.put_u32(cond.map_or(0, |c| u32::from(c) + 1));
        w.put_u16(rule.state.bits());
        w.put_trig_id(&row.id);
        w.put_u32(rule.delay_cycles);
        w.put_u16(rule.delay_frac);
        w.put_u32(rule.latency_worst);
        w.put_u32(rule.latency_avg_sum);
        w.put_u32(rule.latency_avg_nsamples);
        w.put_u32(rule.hits);
        w.put_u32(rule.misses);
        let cond_id = cond.map_or(TriggerId::default(), |c| self.table.row(c).id);
        w.put_trig_id(&cond_id);
        let next = self.table.next_for_output(index, output);
        w.put_u32(next.map_or(0, |n| u32::from(n) + 1));
    }

    /// Runs one personality command, writing the reply body through `w`.
    #[allow(clippy::too_many_lines)]
    fn handle_command(
        &mut self,
        msg_id: u8,
        payload: &[u32],
        w: &mut MsgWriter<'_>,
    ) -> Result<u8, ErrorKind> {
        let mut r = MsgReader::new(payload);
        match msg_id {
            fd::PING => {
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            fd::VERSION => {
                w.put_u32(rep::VERSION);
                Self::version().put(w);
                Ok(action::SEND_ACK)
            }
            fd::BASE_TIME => {
                let ts = self.clock.now_ts();
                w.put_u32(rep::TIMESTAMP);
                w.put_u32(u32::MAX);
                w.put_timestamp(&ts);
                Ok(action::SEND_ACK)
            }
            fd::CHAN_ENABLE => {
                let index = self.channel_index(r.get_u32())?;
                let enable = r.get_u32() != 0;
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let out = &mut self.outputs[index];
                if enable {
                    out.config.flags.insert(IoFlags::ENABLED);
                } else {
                    out.config.flags.remove(
                        IoFlags::ENABLED | IoFlags::ARMED | IoFlags::TRIGGERED | IoFlags::LAST_VALID,
                    );
                    out.state = OutputState::Idle;
                    out.pending_trig = None;
                    out.queue.clear();
                    out.idle = true;
                    self.generators.disarm(index);
                }
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            fd::TRIG_ASSIGN => {
                let index = self.channel_index(r.get_u32())?;
                let id = r.get_trig_id();
                let is_cond = r.get_u32() != 0;
                let cond_id = r.get_trig_id();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;

                let needed = if is_cond { 2 } else { 1 };
                if self.table.len() + needed > ROUTING_ENTRIES {
                    return Err(ErrorKind::TableFull);
                }

                let cond_index = if is_cond {
                    let rule = OutputRule {
                        delay_cycles: DEFAULT_RULE_DELAY_CYCLES,
                        state: RuleState::CONDITION | RuleState::DISABLED,
                        ..OutputRule::default()
                    };
                    Some(self.table.update(&cond_id, index, &rule)?)
                } else {
                    None
                };

                let mut rule = OutputRule {
                    delay_cycles: DEFAULT_RULE_DELAY_CYCLES,
                    state: RuleState::DISABLED,
                    ..OutputRule::default()
                };
                if let Some(cond) = cond_index {
                    rule.state |= RuleState::CONDITIONAL;
                    rule.cond_ptr = Some(cond);
                } else {
                    rule.state |= RuleState::DIRECT;
                }
                let trig_index = self.table.update(&id, index, &rule)?;

                // Close the pair: the condition rule points back at the
                // conditional it arms.
                if let Some(cond) = cond_index {
                    self.table.rule_mut(cond, index).cond_ptr = Some(trig_index);
                }

                self.outputs[index].config.flags.insert(IoFlags::TRIGGER_ASSIGNED);

                w.put_u32(rep::TRIGGER_HANDLE);
                w.put_u32(index as u32);
                w.put_u32(cond_index.map_or(0, |c| u32::from(c) + 1));
                w.put_u32(u32::from(trig_index));
                Ok(action::SEND_ACK)
            }
            fd::TRIG_REMOVE => {
                let index = self.channel_index(r.get_u32())?;
                let cond_raw = r.get_u32();
                let trig_raw = r.get_u32();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;

                let trig_index = self.rule_index(trig_raw, index)?;
                let cond_index = if cond_raw == 0 {
                    None
                } else {
                    Some(self.rule_index(cond_raw - 1, index)?)
                };

                if let Some(cond) = cond_index {
                    // Re-arm an output stuck waiting on the conditional
                    // being removed.
                    let out = &mut self.outputs[index];
                    if out.state == OutputState::ConditionHit
                        && out.pending_trig == Some(trig_index)
                    {
                        out.state = OutputState::Armed;
                        out.pending_trig = None;
                    }
                    self.table.remove_rule(cond, index);
                }
                self.table.remove_rule(trig_index, index);

                if self.table.rules_count(index) == 0 {
                    self.outputs[index].config.flags.remove(IoFlags::TRIGGER_ASSIGNED);
                }
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            fd::TRIG_ENABLE => {
                let index = self.channel_index(r.get_u32())?;
                let enable = r.get_u32() != 0;
                let trig_index = self.rule_index(r.get_u32(), index)?;
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;

                let sibling = {
                    let rule = self.table.rule_mut(trig_index, index);
                    if enable {
                        rule.state.remove(RuleState::DISABLED);
                    } else {
                        rule.state.insert(RuleState::DISABLED);
                    }
                    if rule.state.contains(RuleState::CONDITIONAL) { rule.cond_ptr } else { None }
                };
                // A conditional's gating condition follows its state.
                if let Some(cond) = sibling {
                    let rule = self.table.rule_mut(cond, index);
                    if enable {
                        rule.state.remove(RuleState::DISABLED);
                    } else {
                        rule.state.insert(RuleState::DISABLED);
                    }
                }
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            fd::TRIG_SET_DELAY => {
                let index = self.channel_index(r.get_u32())?;
                let trig_index = self.rule_index(r.get_u32(), index)?;
                let cycles = r.get_u32();
                let frac = r.get_u16();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                if cycles >= TICKS_PER_SECOND as u32 {
                    return Err(ErrorKind::InvalidDelay);
                }
                let rule = self.table.rule_mut(trig_index, index);
                rule.delay_cycles = cycles;
                rule.delay_frac = frac;
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            fd::TRIG_GET_BY_ID => {
                let index = self.channel_index(r.get_u32())?;
                let id = r.get_trig_id();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let found = self
                    .table
                    .find(&id)
                    .filter(|&row| !self.table.rule(row, index).is_empty());
                if found.is_none() {
                    return Err(ErrorKind::TriggerNotFound);
                }
                self.put_hash_entry(w, index, found);
                Ok(action::SEND_ACK)
            }
            fd::TRIG_GET_STATE => {
                let index = self.channel_index(r.get_u32())?;
                let cond_raw = r.get_u32();
                let trig_raw = r.get_u32();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let shown = if cond_raw == 0 {
                    self.rule_index(trig_raw, index)?
                } else {
                    self.rule_index(cond_raw - 1, index)?
                };
                self.put_hash_entry(w, index, Some(shown));
                Ok(action::SEND_ACK)
            }
            fd::READ_HASH => {
                let index = self.channel_index(r.get_u32())?;
                let start = r.get_u32();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let entry = if start == 0 {
                    self.table.first_for_output(0, index)
                } else {
                    let raw = (start - 1) as usize;
                    if raw >= ROUTING_ENTRIES {
                        None
                    } else {
                        let row = self.table.row(raw as u16);
                        (row.valid && !row.rules[index].is_empty()).then_some(raw as u16)
                    }
                };
                self.put_hash_entry(w, index, entry);
                Ok(action::SEND_ACK)
            }
            fd::CHAN_GET_STATE => {
                let index = self.channel_index(r.get_u32())?;
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let out = &self.outputs[index];
                let mut flags = out.config.flags;
                if out.state != OutputState::Idle {
                    flags.insert(IoFlags::ARMED);
                }
                flags.remove(IoFlags::NO_WR);
                if !self.link.is_timing_ok() {
                    flags.insert(IoFlags::NO_WR);
                }
                w.put_u32(rep::STATE);
                w.put_u32(index as u32);
                w.put_u32(out.stats.hits);
                w.put_u32(out.stats.miss_timeout);
                w.put_u32(out.stats.miss_deadtime);
                w.put_u32(out.stats.miss_overflow);
                w.put_u32(out.stats.miss_no_timing);
                w.put_entry(&out.last_executed);
                w.put_entry(&out.last_enqueued);
                w.put_entry(&self.last_received);
                w.put_entry(&out.last_lost);
                w.put_u32(u32::from(out.idle));
                w.put_u32(out.state.code());
                w.put_u32(out.config.mode.code());
                w.put_u32(flags.bits());
                w.put_u32(out.config.log_level.bits());
                w.put_u32(out.config.dead_time);
                w.put_u32(out.config.width_cycles);
                w.put_u32(self.rx_network);
                w.put_u32(self.rx_loopback);
                w.put_u32(out.queue.len() as u32);
                Ok(action::SEND_ACK)
            }
            fd::CHAN_RESET_COUNTERS => {
                let index = self.channel_index(r.get_u32())?;
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let out = &mut self.outputs[index];
                out.stats = crate::output::OutputStats::default();
                out.config.flags.remove(IoFlags::LAST_VALID);
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            fd::CHAN_DEAD_TIME => {
                let index = self.channel_index(r.get_u32())?;
                let ticks = r.get_u32();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                if !(DEAD_TIME_MIN_TICKS..=DEAD_TIME_MAX_TICKS).contains(&ticks) {
                    return Err(ErrorKind::InvalidDeadTime);
                }
                self.outputs[index].config.dead_time = ticks;
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            fd::CHAN_SET_MODE => {
                let index = self.channel_index(r.get_u32())?;
                let mode =
                    TriggerMode::from_code(r.get_u32()).ok_or(ErrorKind::InvalidMessage)?;
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let out = &mut self.outputs[index];
                out.config.mode = mode;
                if mode == TriggerMode::Single {
                    out.config.flags.remove(IoFlags::ARMED);
                    out.state = OutputState::Idle;
                    out.pending_trig = None;
                }
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            fd::CHAN_ARM => {
                let index = self.channel_index(r.get_u32())?;
                let arm = r.get_u32() != 0;
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                let out = &mut self.outputs[index];
                out.config.flags.remove(IoFlags::TRIGGERED);
                if arm {
                    out.config.flags.insert(IoFlags::ARMED);
                    out.state = OutputState::Armed;
                } else {
                    out.config.flags.remove(IoFlags::ARMED);
                    out.state = OutputState::Idle;
                }
                out.pending_trig = None;
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            fd::CHAN_SET_WIDTH => {
                let index = self.channel_index(r.get_u32())?;
                let width = r.get_u32();
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                if width < PULSE_WIDTH_MIN_CYCLES || width >= TICKS_PER_SECOND as u32 {
                    return Err(ErrorKind::InvalidPulseWidth);
                }
                self.outputs[index].config.width_cycles = width;
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            fd::CHAN_SET_LOG_LEVEL => {
                let index = self.channel_index(r.get_u32())?;
                let level = LogLevel::from_bits_truncate(r.get_u32());
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                self.outputs[index].config.log_level = level;
                w.put_u32(rep::ACK);
                Ok(action::SEND_ACK)
            }
            fd::SOFTWARE_TRIGGER => {
                let index = self.channel_index(r.get_u32())?;
                let now = r.get_u32() != 0;
                let mut ts = if now {
                    let mut tc = self.clock.now_ts();
                    tc.add_ticks(SW_TRIGGER_MARGIN_TICKS);
                    tc
                } else {
                    r.get_timestamp()
                };
                r.finish().map_err(|_| ErrorKind::InvalidMessage)?;
                if ts.ticks >= TICKS_PER_SECOND {
                    ts.ticks -= TICKS_PER_SECOND;
                    ts.seconds += 1;
                }

                let out = &mut self.outputs[index];
                out.queue.clear();
                let trig = TriggerEntry {
                    ts,
                    id: TriggerId::new(u32::MAX, u32::MAX, u32::MAX),
                    seq: u32::MAX,
                };
                out.queue.push(PulseEntry {
                    trig,
                    origin_cycles: ts.ticks,
                    rule: None,
                });
                out.last_enqueued = trig;
                out.state = OutputState::TestPending;

                w.put_u32(rep::TIMESTAMP);
                w.put_u32(index as u32);
                w.put_timestamp(&ts);
                Ok(action::SEND_ACK)
            }
            _ => Err(ErrorKind::InvalidMessage),
        }
    }
}

/// Field borrows handed to the transport-standard actions.
struct Spaces<'a, C> {
    outputs: &'a mut [OutputChannel; FD_NUM_CHANNELS],
    rx_network: &'a mut u32,
    rx_loopback: &'a mut u32,
    promiscuous: bool,
    table_len: u32,
    clock: &'a C,
}

impl<C: TaiClock> WordSpace for Spaces<'_, C> {
    fn read_word(&mut self, addr: u32) -> u32 {
        match addr {
            var::TAI_SEC => self.clock.now().0,
            var::TAI_CYCLES => self.clock.now().1,
            var::RX_NETWORK => *self.rx_network,
            var::RX_LOOPBACK => *self.rx_loopback,
            _ => 0,
        }
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        match addr {
            var::RX_NETWORK => *self.rx_network = value,
            var::RX_LOOPBACK => *self.rx_loopback = value,
            _ => {}
        }
    }
}

impl<C: TaiClock> StructSpace for Spaces<'_, C> {
    fn struct_read(&self, index: u32, w: &mut MsgWriter<'_>) -> bool {
        match index {
            0 => {
                w.put_u32(*self.rx_network);
                w.put_u32(*self.rx_loopback);
                w.put_u32(u32::from(self.promiscuous));
                w.put_u32(self.table_len);
                true
            }
            1..=4 => {
                self.outputs[(index - 1) as usize].put_blob(w);
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
                *self.rx_network = data[0];
                *self.rx_loopback = data[1];
                true
            }
            1..=4 => self.outputs[(index - 1) as usize].set_blob(data),
            _ => false,
        }
    }
}

const _: () = assert!(OUTPUT_BLOB_WORDS < CTL_BUF_WORDS);
