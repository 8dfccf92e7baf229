//! The host-side error taxonomy.

use thiserror::Error;
use wrtd_common::ErrorKind;

/// Everything a library call can fail with.
///
/// Validation variants are raised both client-side (before transmission)
/// and when decoding a device NACK, so callers see one taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    /// Channel index out of range for the personality.
    #[error("invalid channel index")]
    InvalidChannel,
    /// Trigger delay at or beyond one second.
    #[error("invalid delay (must be below one second)")]
    InvalidDelay,
    /// Pulse width below 250 ns or at/beyond one second.
    #[error("invalid pulse width (250 ns up to one second)")]
    InvalidPulseWidth,
    /// Dead time outside the accepted range.
    #[error("invalid dead time (80 µs up to 80 ms)")]
    InvalidDeadTime,
    /// Referenced trigger does not exist on the device.
    #[error("trigger not found")]
    TriggerNotFound,
    /// Condition delay requested on a non-conditional trigger.
    #[error("trigger has no condition")]
    NoTriggerCondition,
    /// The routing table is full.
    #[error("trigger table full")]
    TableFull,
    /// The device rejected the message as malformed.
    #[error("invalid message")]
    InvalidMessage,
    /// No matching reply arrived before the deadline.
    #[error("request timed out")]
    Timeout,
    /// The reply did not have the expected shape.
    #[error("unexpected reply from device")]
    InvalidAnswer,
    /// Transport-level failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps a NACK code onto the taxonomy.
    #[must_use]
    pub fn from_nack(code: u32) -> Self {
        match ErrorKind::from_code(code) {
            Some(ErrorKind::InvalidChannel) => Error::InvalidChannel,
            Some(ErrorKind::InvalidDelay) => Error::InvalidDelay,
            Some(ErrorKind::InvalidPulseWidth) => Error::InvalidPulseWidth,
            Some(ErrorKind::InvalidDeadTime) => Error::InvalidDeadTime,
            Some(ErrorKind::TriggerNotFound) => Error::TriggerNotFound,
            Some(ErrorKind::NoTriggerCondition) => Error::NoTriggerCondition,
            Some(ErrorKind::TableFull) => Error::TableFull,
            Some(ErrorKind::InvalidMessage) | None => Error::InvalidMessage,
        }
    }
}
