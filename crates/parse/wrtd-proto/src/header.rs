//! The four-word framed message header.

use bitflags::bitflags;

use crate::ProtoError;

/// Serialized header length in words.
pub const HEADER_WORDS: usize = 4;

bitflags! {
    /// Header flag bits.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u8 {
        /// Message targets (or came from) the remote message queue.
        const REMOTE = 1 << 0;
        /// Synchronous request: the sender blocks for the matching reply.
        const SYNC = 1 << 1;
        /// Remote-procedure-call style exchange.
        const RPC = 1 << 2;
        /// Periodically repeated message.
        const PERIODICAL = 1 << 3;
    }
}

/// Framed message header shared by every host↔firmware message.
///
/// Word layout (little-endian fields within each word):
///
/// | word | contents |
/// |------|----------|
/// | 0 | `app_id` (low 16), `msg_id` (bits 16–23), `slot_io` (bits 24–31) |
/// | 1 | `seq` |
/// | 2 | `len` (low 8), `flags` (bits 8–15), reserved, `trans` (bits 24–31) |
/// | 3 | `time` |
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Identifier of the real-time application addressed.
    pub app_id: u16,
    /// Message identifier: a command, a standard action or a reply marker.
    pub msg_id: u8,
    /// Packed slot addressing: input index high nibble, output index low.
    pub slot_io: u8,
    /// Sequence number; replies echo the request's value.
    pub seq: u32,
    /// Payload length in words (header excluded).
    pub len: u8,
    /// Protocol flags.
    pub flags: HeaderFlags,
    /// Transaction descriptor.
    pub trans: u8,
    /// Submission timestamp, free-form.
    pub time: u32,
}

impl Header {
    /// Packs an input/output slot pair into the `slot_io` byte.
    #[must_use]
    pub const fn pack_slot_io(in_idx: u8, out_idx: u8) -> u8 {
        (in_idx << 4) | (out_idx & 0xF)
    }

    /// Input slot index carried in `slot_io`.
    #[must_use]
    pub const fn slot_in(&self) -> usize {
        (self.slot_io >> 4) as usize
    }

    /// Output slot index carried in `slot_io`.
    #[must_use]
    pub const fn slot_out(&self) -> usize {
        (self.slot_io & 0xF) as usize
    }

    /// Serializes into the first [`HEADER_WORDS`] words of `out`.
    ///
    /// # Errors
    ///
    /// [`ProtoError::Overflow`] when `out` is too short.
    pub fn pack(&self, out: &mut [u32]) -> Result<(), ProtoError> {
        if out.len() < HEADER_WORDS {
            return Err(ProtoError::Overflow);
        }
        out[0] = u32::from(self.app_id)
            | u32::from(self.msg_id) << 16
            | u32::from(self.slot_io) << 24;
        out[1] = self.seq;
        out[2] = u32::from(self.len)
            | u32::from(self.flags.bits()) << 8
            | u32::from(self.trans) << 24;
        out[3] = self.time;
        Ok(())
    }

    /// Deserializes a header from the first [`HEADER_WORDS`] words of `words`.
    ///
    /// # Errors
    ///
    /// [`ProtoError::Truncated`] when `words` is too short.
    pub fn unpack(words: &[u32]) -> Result<Self, ProtoError> {
        if words.len() < HEADER_WORDS {
            return Err(ProtoError::Truncated);
        }
        Ok(Self {
            app_id: (words[0] & 0xFFFF) as u16,
            msg_id: (words[0] >> 16 & 0xFF) as u8,
            slot_io: (words[0] >> 24) as u8,
            seq: words[1],
            len: (words[2] & 0xFF) as u8,
            flags: HeaderFlags::from_bits_truncate((words[2] >> 8 & 0xFF) as u8),
            trans: (words[2] >> 24) as u8,
            time: words[3],
        })
    }
}

/// Byte-swaps the first header word in place.
///
/// The soft-CPU sees queue memory through a byte-swapped window; the host
/// codec applies this fixup on both encode and decode so that each side
/// reads the `{app_id, msg_id, slot_io}` word natively. Payload words are
/// not touched.
pub fn swap_first_word(words: &mut [u32]) {
    if let Some(w) = words.first_mut() {
        *w = w.swap_bytes();
    }
}
