//! User-space library for trigger-distribution nodes.
//!
//! Talks the framed host protocol over a [`Transport`] — the Linux
//! char-device surface on real hardware, or an in-process pipe in tests —
//! and exposes typed per-channel APIs for both personalities, a log-stream
//! reader and the structured variable/struct accessors.
//!
//! All client-side validation (channel bounds, delay/width/dead-time
//! ranges) happens before anything is transmitted; device-side rejections
//! surface as the same error kinds decoded from NACK replies.

mod channel;
mod error;
mod input;
mod logread;
mod output;
mod state;
mod transport;

pub use channel::{DEFAULT_TIMEOUT, SyncChannel};
pub use error::Error;
pub use input::WrtdInput;
pub use logread::LogReader;
pub use output::WrtdOutput;
pub use state::{
    InputState, OutputState, OutputTriggerState, TriggerHandle, VersionBlock, format_flags,
    format_log_level,
};
pub use transport::{CharDev, Transport};
