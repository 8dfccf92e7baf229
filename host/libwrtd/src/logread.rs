//! Poll-style reader for a personality's log stream.

use std::time::Duration;

use wrtd_common::LogEntry;

use crate::channel::decode_log;
use crate::error::Error;
use crate::transport::Transport;

/// Drains one personality's logging slot.
///
/// The stream is unsolicited firmware → host traffic; entries the
/// firmware could not fit in the slot were dropped at the source, so a
/// quiet reader only bounds how much history it sees, never node
/// behaviour.
pub struct LogReader<T> {
    transport: T,
}

impl<T: Transport> LogReader<T> {
    /// Wraps a transport bound to a logging slot.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Waits up to `timeout` for the next log entry.
    ///
    /// Returns `Ok(None)` when the stream stays quiet.
    ///
    /// # Errors
    ///
    /// Transport failures plus [`Error::InvalidAnswer`] for a message
    /// that is not a log entry.
    pub fn next_entry(&mut self, timeout: Duration) -> Result<Option<LogEntry>, Error> {
        match self.transport.recv(timeout)? {
            None => Ok(None),
            Some(words) => decode_log(words).map(Some),
        }
    }
}
