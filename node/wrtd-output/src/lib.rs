//! Output (FD) personality.
//!
//! Receives trigger messages from the fabric and the loopback queue,
//! matches them against the routing table, queues pulses per output under
//! dead-time and conditional gating, and drives the pulse generators with
//! a late-detection watchdog. One loop iteration is `do_rx → do_outputs →
//! dispatch_control → link update`.

#![cfg_attr(not(test), no_std)]

mod node;
mod output;
mod queue;
mod rules;

pub use node::OutputNode;
pub use output::{OutputChannel, OutputConfig, OutputState, OutputStats};
pub use queue::{PulseEntry, PulseQueue};
pub use rules::{OutputRule, RoutingTable, RuleState, TriggerRow};
