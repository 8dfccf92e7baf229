//! Synchronous request/reply over a transport.

use std::time::{Duration, Instant};

use tracing::{debug, warn};
use wrtd_common::LogEntry;
use wrtd_proto::ids::action;
use wrtd_proto::{HEADER_WORDS, Header, HeaderFlags, MsgReader, swap_first_word};

use crate::error::Error;
use crate::transport::Transport;

/// Default per-call reply deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// One synchronous control channel to a personality.
///
/// Serializes requests with a monotonically increasing sequence number,
/// applies the host-side first-word byte swap in both directions, and
/// matches each reply by sequence — stale replies (e.g. the answer to a
/// call that already timed out) are discarded on sight.
pub struct SyncChannel<T> {
    transport: T,
    app_id: u16,
    slot_io: u8,
    seq: u32,
    timeout: Duration,
}

impl<T: Transport> SyncChannel<T> {
    /// Creates a channel addressing `(slot_in, slot_out)` of `app_id`.
    pub fn new(transport: T, app_id: u16, slot_in: u8, slot_out: u8) -> Self {
        Self {
            transport,
            app_id,
            slot_io: Header::pack_slot_io(slot_in, slot_out),
            seq: 0,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the per-call reply deadline.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Sends one request and blocks for the matching reply.
    ///
    /// Returns the reply's message id and payload words.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when no matching reply arrives in time, plus any
    /// transport failure.
    pub fn request(&mut self, msg_id: u8, payload: &[u32]) -> Result<(u8, Vec<u32>), Error> {
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;

        let header = Header {
            app_id: self.app_id,
            msg_id,
            slot_io: self.slot_io,
            seq,
            len: payload.len() as u8,
            flags: HeaderFlags::SYNC,
            trans: 0,
            time: 0,
        };
        let mut words = vec![0u32; HEADER_WORDS + payload.len()];
        header.pack(&mut words).map_err(|_| Error::InvalidAnswer)?;
        words[HEADER_WORDS..].copy_from_slice(payload);
        swap_first_word(&mut words);

        debug!(msg_id, seq, len = payload.len(), "sync request");
        self.transport.send(&words)?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(msg_id, seq, "sync request timed out");
                return Err(Error::Timeout);
            }
            let Some(mut reply) = self.transport.recv(remaining)? else {
                warn!(msg_id, seq, "sync request timed out");
                return Err(Error::Timeout);
            };
            swap_first_word(&mut reply);
            let Ok(reply_header) = Header::unpack(&reply) else {
                debug!("dropping unparseable reply");
                continue;
            };
            if reply_header.seq != seq {
                debug!(stale = reply_header.seq, awaited = seq, "dropping stale reply");
                continue;
            }
            let len = (reply_header.len as usize).min(reply.len().saturating_sub(HEADER_WORDS));
            return Ok((reply_header.msg_id, reply[HEADER_WORDS..HEADER_WORDS + len].to_vec()));
        }
    }

    /// Runs a request expected to answer with a bare ACK.
    ///
    /// # Errors
    ///
    /// NACKs map onto the error taxonomy; anything else unexpected is
    /// [`Error::InvalidAnswer`].
    pub fn request_ack(&mut self, msg_id: u8, payload: &[u32]) -> Result<(), Error> {
        let (reply_id, body) = self.request(msg_id, payload)?;
        check_ack(reply_id, &body)
    }

    /// Runs a request expected to answer with a typed body starting with
    /// `rep_id`.
    ///
    /// # Errors
    ///
    /// As [`SyncChannel::request_ack`].
    pub fn request_body(&mut self, msg_id: u8, payload: &[u32], rep_id: u32) -> Result<Vec<u32>, Error> {
        let (reply_id, body) = self.request(msg_id, payload)?;
        expect_reply(reply_id, &body, rep_id)?;
        Ok(body)
    }

    /// Reads structured variables by descriptor index.
    ///
    /// # Errors
    ///
    /// NACKs (unknown index) map onto the taxonomy.
    pub fn field_get(&mut self, indices: &[u32]) -> Result<Vec<u32>, Error> {
        let mut payload = Vec::with_capacity(indices.len() * 2);
        for &index in indices {
            payload.push(index);
            payload.push(0);
        }
        let (reply_id, body) = self.request(action::RECV_FIELD_GET, &payload)?;
        if reply_id == action::SEND_NACK {
            return Err(Error::from_nack(body.get(1).copied().unwrap_or(0)));
        }
        if reply_id != action::SEND_FIELD_GET || body.len() != payload.len() {
            return Err(Error::InvalidAnswer);
        }
        Ok(body.chunks_exact(2).map(|pair| pair[1]).collect())
    }

    /// Writes structured variables as `(index, value)` pairs.
    ///
    /// # Errors
    ///
    /// NACKs map onto the taxonomy.
    pub fn field_set(&mut self, pairs: &[(u32, u32)]) -> Result<(), Error> {
        let mut payload = Vec::with_capacity(pairs.len() * 2);
        for &(index, value) in pairs {
            payload.push(index);
            payload.push(value);
        }
        self.request_ack(action::RECV_FIELD_SET, &payload)
    }

    /// Reads structured blobs by index, one TLV record each.
    ///
    /// # Errors
    ///
    /// NACKs map onto the taxonomy.
    pub fn struct_get(&mut self, indices: &[u32]) -> Result<Vec<(u32, Vec<u32>)>, Error> {
        let (reply_id, body) = self.request(action::RECV_STRUCT_GET, indices)?;
        if reply_id == action::SEND_NACK {
            return Err(Error::from_nack(body.get(1).copied().unwrap_or(0)));
        }
        if reply_id != action::SEND_STRUCT_GET {
            return Err(Error::InvalidAnswer);
        }
        let mut records = Vec::new();
        for record in wrtd_proto::tlv::records(&body) {
            let record = record.map_err(|_| Error::InvalidAnswer)?;
            records.push((record.index, record.data.to_vec()));
        }
        Ok(records)
    }

    /// Writes structured blobs as `(index, words)` records.
    ///
    /// # Errors
    ///
    /// NACKs map onto the taxonomy.
    pub fn struct_set(&mut self, records: &[(u32, Vec<u32>)]) -> Result<(), Error> {
        let mut payload = Vec::new();
        for (index, data) in records {
            payload.push(*index);
            payload.push(data.len() as u32);
            payload.extend_from_slice(data);
        }
        self.request_ack(action::RECV_STRUCT_SET, &payload)
    }
}

/// Validates an ACK/NACK pair.
///
/// # Errors
///
/// Decoded NACK kind, or [`Error::InvalidAnswer`] for anything else.
pub(crate) fn check_ack(reply_id: u8, body: &[u32]) -> Result<(), Error> {
    match reply_id {
        action::SEND_ACK => Ok(()),
        action::SEND_NACK => Err(Error::from_nack(body.get(1).copied().unwrap_or(0))),
        _ => Err(Error::InvalidAnswer),
    }
}

/// Validates a typed reply body.
pub(crate) fn expect_reply(reply_id: u8, body: &[u32], rep_id: u32) -> Result<(), Error> {
    match reply_id {
        action::SEND_NACK => Err(Error::from_nack(body.get(1).copied().unwrap_or(0))),
        _ if body.first() == Some(&rep_id) => Ok(()),
        _ => Err(Error::InvalidAnswer),
    }
}

/// Decodes one log-stream message.
///
/// # Errors
///
/// [`Error::InvalidAnswer`] when the message is not a log entry.
pub(crate) fn decode_log(mut words: Vec<u32>) -> Result<LogEntry, Error> {
    swap_first_word(&mut words);
    let header = Header::unpack(&words).map_err(|_| Error::InvalidAnswer)?;
    if header.msg_id != action::LOG {
        return Err(Error::InvalidAnswer);
    }
    let mut r = MsgReader::new(&words[HEADER_WORDS..]);
    let entry = r.get_log_entry();
    r.finish().map_err(|_| Error::InvalidAnswer)?;
    Ok(entry)
}
