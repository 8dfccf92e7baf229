//! Control-message dispatch and the transport-standard actions.
//!
//! The flow, shared by both personalities: poll the control slot, copy the
//! request out, discard the hardware buffer, run the handler, serialize
//! exactly one reply. Validation failures surface as a NACK carrying the
//! error code; the command is then a no-op.

use wrtd_common::ErrorKind;
use wrtd_hal::MsgQueue;
use wrtd_proto::ids::{action, rep};
use wrtd_proto::{HEADER_WORDS, Header, HeaderFlags, MsgReader, MsgWriter, VersionInfo, tlv};

/// Control-slot window size in words (header + payload).
pub const CTL_BUF_WORDS: usize = 128;

/// A control request copied out of the incoming slot.
#[derive(Debug)]
pub struct Request {
    /// Decoded message header.
    pub header: Header,
    payload: [u32; CTL_BUF_WORDS],
    payload_len: usize,
}

impl Request {
    /// Reader over the request payload.
    #[must_use]
    pub fn reader(&self) -> MsgReader<'_> {
        MsgReader::new(&self.payload[..self.payload_len])
    }

    /// Raw request payload.
    #[must_use]
    pub fn payload(&self) -> &[u32] {
        &self.payload[..self.payload_len]
    }
}

/// Polls the control slot and copies out one request, if pending.
///
/// The incoming hardware buffer is discarded before returning, so a
/// malformed message can never wedge the slot.
pub fn poll_request<M: MsgQueue>(mq: &mut M, slot_in: usize) -> Option<Request> {
    if mq.in_poll(false) & (1 << slot_in) == 0 {
        return None;
    }

    let mut request = None;
    {
        let buf = mq.in_buf(false, slot_in);
        if let Ok(header) = Header::unpack(buf) {
            let want = header.len as usize;
            let have = buf.len().saturating_sub(HEADER_WORDS).min(CTL_BUF_WORDS);
            let payload_len = want.min(have);
            let mut payload = [0u32; CTL_BUF_WORDS];
            payload[..payload_len]
                .copy_from_slice(&buf[HEADER_WORDS..HEADER_WORDS + payload_len]);
            request = Some(Request { header, payload, payload_len });
        }
    }
    mq.discard(false, slot_in);
    request
}

/// Serializes one reply to `request` on the control output slot.
///
/// `msg_id` is one of the `SEND_*` actions and `body` the payload words.
pub fn send_reply<M: MsgQueue>(
    mq: &mut M,
    slot_out: usize,
    app_id: u16,
    request: &Header,
    msg_id: u8,
    body: &[u32],
) {
    mq.claim(false, slot_out);
    let buf = mq.out_buf(false, slot_out);
    let header = Header {
        app_id,
        msg_id,
        slot_io: Header::pack_slot_io(request.slot_io >> 4, slot_out as u8),
        seq: request.seq,
        len: body.len() as u8,
        flags: HeaderFlags::empty(),
        trans: request.trans,
        time: 0,
    };
    if header.pack(buf).is_err() {
        return;
    }
    let end = HEADER_WORDS + body.len();
    if buf.len() < end {
        return;
    }
    buf[HEADER_WORDS..end].copy_from_slice(body);
    mq.ready(false, slot_out, end);
}

/// Serializes a NACK carrying `kind`'s error code.
pub fn send_nack<M: MsgQueue>(
    mq: &mut M,
    slot_out: usize,
    app_id: u16,
    request: &Header,
    kind: ErrorKind,
) {
    send_reply(mq, slot_out, app_id, request, action::SEND_NACK, &[rep::NACK, kind.code()]);
}

/// One published structured variable.
///
/// `addr` names a word in the personality's [`WordSpace`]; reads shift by
/// `offset` and mask, writes update only the masked field unless the
/// variable is write-only.
#[derive(Debug, Clone, Copy)]
pub struct VarDescriptor {
    /// Word address within the personality's variable space.
    pub addr: u32,
    /// Field mask, unshifted.
    pub mask: u32,
    /// Field offset within the word.
    pub offset: u8,
    /// Write-only: set without read-back.
    pub write_only: bool,
}

/// Word-addressed access behind the structured-variable actions.
pub trait WordSpace {
    /// Reads the word at `addr`.
    fn read_word(&mut self, addr: u32) -> u32;
    /// Writes the word at `addr`.
    fn write_word(&mut self, addr: u32, value: u32);
}

/// Blob access behind the structured-struct actions.
pub trait StructSpace {
    /// Serializes structure `index` through `w`; false when unknown.
    fn struct_read(&self, index: u32, w: &mut MsgWriter<'_>) -> bool;
    /// Overwrites structure `index` from `data`; false when unknown or
    /// when `data` has the wrong length.
    fn struct_write(&mut self, index: u32, data: &[u32]) -> bool;
}

/// True when `msg_id` is one of the transport-standard actions.
#[must_use]
pub fn is_standard(msg_id: u8) -> bool {
    matches!(
        msg_id,
        action::RECV_PING
            | action::RECV_FIELD_SET
            | action::RECV_FIELD_GET
            | action::RECV_STRUCT_SET
            | action::RECV_STRUCT_GET
            | action::RECV_VERSION
    )
}

/// Runs one transport-standard action, writing the reply body through `w`.
///
/// Returns the reply's `msg_id`.
///
/// # Errors
///
/// [`ErrorKind::InvalidMessage`] on a bad payload, index or length; the
/// caller turns that into a NACK.
pub fn handle_standard<S: WordSpace + StructSpace>(
    msg_id: u8,
    payload: &[u32],
    version: &VersionInfo,
    vars: &[VarDescriptor],
    space: &mut S,
    w: &mut MsgWriter<'_>,
) -> Result<u8, ErrorKind> {
    match msg_id {
        action::RECV_PING => {
            w.put_u32(rep::ACK);
            Ok(action::SEND_ACK)
        }
        action::RECV_VERSION => {
            version.put(w);
            Ok(action::SEND_VERSION)
        }
        action::RECV_FIELD_GET => {
            if payload.len() % 2 != 0 {
                return Err(ErrorKind::InvalidMessage);
            }
            for pair in payload.chunks_exact(2) {
                let desc = var_desc(vars, pair[0])?;
                let value = space.read_word(desc.addr);
                w.put_u32(pair[0]);
                w.put_u32(value >> desc.offset & desc.mask);
            }
            Ok(action::SEND_FIELD_GET)
        }
        action::RECV_FIELD_SET => {
            if payload.len() % 2 != 0 {
                return Err(ErrorKind::InvalidMessage);
            }
            for pair in payload.chunks_exact(2) {
                let desc = var_desc(vars, pair[0])?;
                let field = (pair[1] & desc.mask) << desc.offset;
                if desc.write_only {
                    space.write_word(desc.addr, field);
                } else {
                    let old = space.read_word(desc.addr);
                    let value = (old & !(desc.mask << desc.offset)) | field;
                    space.write_word(desc.addr, value);
                }
            }
            w.put_u32(rep::ACK);
            Ok(action::SEND_ACK)
        }
        action::RECV_STRUCT_GET => {
            for &index in payload {
                w.put_u32(index);
                let size_slot = w.len();
                w.put_u32(0);
                let before = w.len();
                if !space.struct_read(index, w) {
                    return Err(ErrorKind::InvalidMessage);
                }
                let size = (w.len() - before) as u32;
                w.patch(size_slot, size);
            }
            Ok(action::SEND_STRUCT_GET)
        }
        action::RECV_STRUCT_SET => {
            for record in tlv::records(payload) {
                let record = record.map_err(|_| ErrorKind::InvalidMessage)?;
                if !space.struct_write(record.index, record.data) {
                    return Err(ErrorKind::InvalidMessage);
                }
            }
            w.put_u32(rep::ACK);
            Ok(action::SEND_ACK)
        }
        _ => Err(ErrorKind::InvalidMessage),
    }
}

fn var_desc(vars: &[VarDescriptor], index: u32) -> Result<&VarDescriptor, ErrorKind> {
    vars.get(index as usize).ok_or(ErrorKind::InvalidMessage)
}
