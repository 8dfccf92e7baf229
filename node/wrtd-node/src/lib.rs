//! Runtime shared by the firmware personalities.
//!
//! Each personality is a single-threaded cooperative loop with no
//! preemption and no allocation after init. This crate carries the pieces
//! both loops share: the White Rabbit link state machine, the control
//! dispatcher with the transport-standard actions, the logging stream and
//! the per-personality slot assignments.

#![cfg_attr(not(test), no_std)]

pub mod dispatch;
pub mod link;
pub mod logstream;
pub mod slots;

pub use dispatch::{
    CTL_BUF_WORDS, Request, StructSpace, VarDescriptor, WordSpace, handle_standard, is_standard,
    poll_request, send_nack, send_reply,
};
pub use link::{LinkMonitor, LinkState};
pub use logstream::LogStream;
pub use slots::SlotMap;
