//! A dual-mezzanine card on the bench: one input node, one output node,
//! a shared clock, shared WR status and a loopback queue between them.

use wrtd_common::TriggerEntry;
use wrtd_input::InputNode;
use wrtd_node::slots;
use wrtd_output::OutputNode;
use wrtd_proto::{TARGET_OFFSET, TriggerPacket};

use crate::mq::{SharedQueue, SimMq};
use crate::periph::{SimClock, SimLoopback, SimPulseGen, SimTdcFifo, SimWr};

/// Slot data-window width used by the models, in words.
const SLOT_WIDTH: usize = 128;
/// Outgoing queue depth used by the models.
const SLOT_DEPTH: usize = 8;

/// Input personality over the software models.
pub type SimInputNode = InputNode<SimMq, SimTdcFifo, SimWr, SimClock, SimLoopback>;
/// Output personality over the software models.
pub type SimOutputNode = OutputNode<SimMq, SimPulseGen, SimWr, SimClock, SimLoopback>;

/// One simulated card: both personalities plus every test control.
pub struct TestBench {
    /// The input node.
    pub input: SimInputNode,
    /// The output node.
    pub output: SimOutputNode,
    /// Shared TAI clock.
    pub clock: SimClock,
    /// Shared White Rabbit status bits.
    pub wr: SimWr,
    /// The input node's timestamp FIFO.
    pub fifo: SimTdcFifo,
    /// The output node's pulse generators.
    pub generators: SimPulseGen,
    /// The loopback queue between the nodes.
    pub loopback: SimLoopback,
    /// Skip the input node's poll (models a halted core).
    pub halt_input: bool,
    /// Skip the output node's poll.
    pub halt_output: bool,

    pub(crate) tdc_ctl_in: SharedQueue,
    pub(crate) tdc_ctl_out: SharedQueue,
    pub(crate) tdc_log: SharedQueue,
    pub(crate) fd_ctl_in: SharedQueue,
    pub(crate) fd_ctl_out: SharedQueue,
    pub(crate) fd_log: SharedQueue,
    input_remote_out: SharedQueue,
    output_remote_in: SharedQueue,
}

impl Default for TestBench {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBench {
    /// Builds and wires a fresh card.
    #[must_use]
    pub fn new() -> Self {
        let clock = SimClock::new();
        let wr = SimWr::new();
        let fifo = SimTdcFifo::new();
        let generators = SimPulseGen::new();
        let loopback = SimLoopback::new();

        let input_mq = SimMq::new(SLOT_WIDTH, SLOT_DEPTH);
        let tdc_ctl_in = input_mq.in_handle(false, slots::TDC.ctl_in);
        let tdc_ctl_out = input_mq.out_handle(false, slots::TDC.ctl_out);
        let tdc_log = input_mq.out_handle(false, slots::TDC.log_out);
        let input_remote_out = input_mq.out_handle(true, slots::TDC.remote);

        let output_mq = SimMq::new(SLOT_WIDTH, SLOT_DEPTH);
        let fd_ctl_in = output_mq.in_handle(false, slots::FD.ctl_in);
        let fd_ctl_out = output_mq.out_handle(false, slots::FD.ctl_out);
        let fd_log = output_mq.out_handle(false, slots::FD.log_out);
        let output_remote_in = output_mq.in_handle(true, slots::FD.remote);

        let input =
            InputNode::new(input_mq, fifo.clone(), wr.clone(), clock.clone(), loopback.clone());
        let output = OutputNode::new(
            output_mq,
            generators.clone(),
            wr.clone(),
            clock.clone(),
            loopback.clone(),
        );

        Self {
            input,
            output,
            clock,
            wr,
            fifo,
            generators,
            loopback,
            halt_input: false,
            halt_output: false,
            tdc_ctl_in,
            tdc_ctl_out,
            tdc_log,
            fd_ctl_in,
            fd_ctl_out,
            fd_log,
            input_remote_out,
            output_remote_in,
        }
    }

    /// One card iteration: input loop, then output loop.
    ///
    /// On a real card the personalities exchange through the loopback
    /// queue; packets the input node hands to the fabric leave the card.
    /// Tests modelling a second, remote card call [`TestBench::pump_fabric`]
    /// explicitly or inject packets with [`TestBench::inject_packet`].
    pub fn step(&mut self) {
        if !self.halt_input {
            self.input.poll();
        }
        if !self.halt_output {
            self.output.poll();
        }
    }

    /// Runs `n` iterations.
    pub fn step_n(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Moves readied packets from the input node onto the output node's
    /// remote slot, honoring the fabric's slot-offset routing.
    pub fn pump_fabric(&mut self) {
        let mut out = self.input_remote_out.borrow_mut();
        let mut dst = self.output_remote_in.borrow_mut();
        while let Some(msg) = out.pop_front() {
            if msg.get(2) == Some(&TARGET_OFFSET) {
                dst.push_back(msg);
            }
        }
    }

    /// Brings the WR link up and walks both link machines to `Synced`
    /// (the input side holds 4 s in its settle state).
    pub fn sync_wr(&mut self) {
        self.wr.all_up();
        self.step_n(3);
        self.clock.advance_secs(4);
        self.step_n(2);
        assert!(self.input.link().is_timing_ok(), "input link must be synced");
        assert!(self.output.link().is_timing_ok(), "output link must be synced");
    }

    /// Injects a trigger packet on the wire, as a remote master would.
    pub fn inject_packet(&mut self, entries: &[TriggerEntry]) {
        let (seconds, cycles) = {
            use wrtd_hal::TaiClock;
            self.clock.now()
        };
        let mut packet = TriggerPacket {
            transmit_seconds: seconds,
            transmit_cycles: cycles,
            count: entries.len() as u32,
            ..TriggerPacket::default()
        };
        packet.triggers[..entries.len()].copy_from_slice(entries);
        let mut words = [0u32; SLOT_WIDTH];
        let n = packet.encode(&mut words).expect("packet fits the slot");
        self.output_remote_in.borrow_mut().push_back(words[..n].to_vec());
    }

    /// Drains the packets the input node has handed to the fabric.
    pub fn take_tx_packets(&mut self) -> Vec<Vec<u32>> {
        self.input_remote_out.borrow_mut().drain(..).collect()
    }

    /// Pops the next pending log message of the input personality.
    pub fn pop_tdc_log(&mut self) -> Option<Vec<u32>> {
        self.tdc_log.borrow_mut().pop_front()
    }

    /// Pops the next pending log message of the output personality.
    pub fn pop_fd_log(&mut self) -> Option<Vec<u32>> {
        self.fd_log.borrow_mut().pop_front()
    }
}
