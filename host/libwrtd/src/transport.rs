//! Message transports: the char-device surface and the trait test
//! doubles implement.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::time::Duration;

use crate::error::Error;

/// One bidirectional message pipe: requests in, replies out.
///
/// An implementation is bound to a specific slot pair of a specific
/// device; the library never multiplexes transports.
pub trait Transport {
    /// Sends one framed message (first header word already host-encoded).
    ///
    /// # Errors
    ///
    /// Transport-level failures only; a full device queue retries inside
    /// the implementation.
    fn send(&mut self, words: &[u32]) -> Result<(), Error>;

    /// Receives one framed message, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` on expiry.
    ///
    /// # Errors
    ///
    /// Transport-level failures only.
    fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u32>>, Error>;
}

/// Largest message the char devices carry, in words.
const DEV_MSG_WORDS: usize = 128;

/// Transport over the driver's per-slot character devices.
///
/// The driver exposes one device per queue slot and direction; messages
/// are written and read whole, and readiness is signalled through
/// `poll(2)`. The hardware performs the soft-CPU byte-order fixup, so the
/// transport moves words verbatim.
pub struct CharDev {
    dev_in: Option<File>,
    dev_out: File,
}

impl CharDev {
    /// Opens the device pair backing one slot pair.
    ///
    /// # Errors
    ///
    /// Any open failure, typically a missing driver or bad device id.
    pub fn open(dev_in: &Path, dev_out: &Path) -> Result<Self, Error> {
        Ok(Self {
            dev_in: Some(OpenOptions::new().write(true).open(dev_in)?),
            dev_out: OpenOptions::new().read(true).open(dev_out)?,
        })
    }

    /// Opens a receive-only stream device (log slots).
    ///
    /// # Errors
    ///
    /// Any open failure.
    pub fn open_stream(dev_out: &Path) -> Result<Self, Error> {
        Ok(Self { dev_in: None, dev_out: OpenOptions::new().read(true).open(dev_out)? })
    }

    fn wait_readable(&self, timeout: Duration) -> Result<bool, Error> {
        let mut fds = libc::pollfd {
            fd: self.dev_out.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        // SAFETY: `fds` points at one valid pollfd for the whole call.
        let rc = unsafe { libc::poll(&mut fds, 1, millis) };
        if rc < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(rc > 0 && fds.revents & libc::POLLIN != 0)
    }
}

impl Transport for CharDev {
    fn send(&mut self, words: &[u32]) -> Result<(), Error> {
        let Some(dev_in) = &mut self.dev_in else {
            return Err(Error::Io(std::io::Error::from(std::io::ErrorKind::Unsupported)));
        };
        let mut bytes = Vec::with_capacity(words.len() * 4);
        for word in words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        dev_in.write_all(&bytes)?;
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u32>>, Error> {
        if !self.wait_readable(timeout)? {
            return Ok(None);
        }
        let mut bytes = [0u8; DEV_MSG_WORDS * 4];
        let n = self.dev_out.read(&mut bytes)?;
        let words = bytes[..n - n % 4]
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Some(words))
    }
}
