//! The coalesced trigger packet sent over the deterministic fabric.
//!
//! A packet is a six-word addressing/origin header followed by up to five
//! eight-word trigger records. Seconds travel as (hi, lo) word pairs; a
//! live master node must be validated against this layout before cutover,
//! since older deployments carried 32-bit seconds in seven-word records.

use wrtd_common::limits::TRIGGER_COALESCE_LIMIT;
use wrtd_common::TriggerEntry;

use crate::cursor::{MsgReader, MsgWriter};
use crate::ProtoError;

/// Fabric broadcast address.
pub const TARGET_IP_BROADCAST: u32 = 0xFFFF_FFFF;
/// Fabric port reserved for trigger distribution.
pub const TARGET_PORT: u32 = 0xEBD0;
/// Remote-queue slot offset the fabric routes the packet into.
pub const TARGET_OFFSET: u32 = 0x4000;

/// Addressing/origin header length in words.
pub const PACKET_HEADER_WORDS: usize = 6;
/// Trigger record length in words.
pub const ENTRY_WORDS: usize = 8;

/// Exact serialized packet length for a given trigger count.
#[must_use]
pub const fn packet_words(count: usize) -> usize {
    PACKET_HEADER_WORDS + ENTRY_WORDS * count
}

/// A decoded trigger packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPacket {
    /// TAI seconds at transmission, for receiver-side latency tracing.
    pub transmit_seconds: u32,
    /// TAI cycles at transmission.
    pub transmit_cycles: u32,
    /// Number of valid records in `triggers`.
    pub count: u32,
    /// Trigger records; slots past `count` are unspecified.
    pub triggers: [TriggerEntry; TRIGGER_COALESCE_LIMIT],
}

impl Default for TriggerPacket {
    fn default() -> Self {
        Self {
            transmit_seconds: 0,
            transmit_cycles: 0,
            count: 0,
            triggers: [TriggerEntry::default(); TRIGGER_COALESCE_LIMIT],
        }
    }
}

impl TriggerPacket {
    /// Serializes the packet.
    ///
    /// # Errors
    ///
    /// [`ProtoError::Malformed`] when `count` exceeds the coalesce limit,
    /// [`ProtoError::Overflow`] when `out` is too short.
    pub fn encode(&self, out: &mut [u32]) -> Result<usize, ProtoError> {
        let count = self.count as usize;
        if count > TRIGGER_COALESCE_LIMIT {
            return Err(ProtoError::Malformed);
        }
        let mut w = MsgWriter::new(out);
        w.put_u32(TARGET_IP_BROADCAST);
        w.put_u32(TARGET_PORT);
        w.put_u32(TARGET_OFFSET);
        w.put_u32(self.transmit_seconds);
        w.put_u32(self.transmit_cycles);
        w.put_u32(self.count);
        for trigger in &self.triggers[..count] {
            w.put_entry(trigger);
        }
        w.finish()
    }

    /// Deserializes a packet.
    ///
    /// # Errors
    ///
    /// [`ProtoError::Malformed`] when the count field exceeds the coalesce
    /// limit, [`ProtoError::Truncated`] when `words` is shorter than the
    /// count demands.
    pub fn decode(words: &[u32]) -> Result<Self, ProtoError> {
        let mut r = MsgReader::new(words);
        // Addressing words are consumed by the fabric; ignore their values.
        r.skip(3);
        let transmit_seconds = r.get_u32();
        let transmit_cycles = r.get_u32();
        let count = r.get_u32();
        if count as usize > TRIGGER_COALESCE_LIMIT {
            return Err(ProtoError::Malformed);
        }
        let mut triggers = [TriggerEntry::default(); TRIGGER_COALESCE_LIMIT];
        for trigger in triggers.iter_mut().take(count as usize) {
            *trigger = r.get_entry();
        }
        r.finish()?;
        Ok(Self { transmit_seconds, transmit_cycles, count, triggers })
    }

    /// Writes one trigger record in place, for incremental coalescing into
    /// a claimed slot buffer.
    pub fn write_entry(buf: &mut [u32], index: usize, ent: &TriggerEntry) {
        let start = packet_words(index);
        if let Some(window) = buf.get_mut(start..start + ENTRY_WORDS) {
            let mut w = MsgWriter::new(window);
            w.put_entry(ent);
        }
    }

    /// Stamps the addressing/origin header over an incrementally filled
    /// buffer and returns the exact word count to commit.
    pub fn finalize(buf: &mut [u32], tx_seconds: u32, tx_cycles: u32, count: u32) -> usize {
        if let Some(window) = buf.get_mut(..PACKET_HEADER_WORDS) {
            let mut w = MsgWriter::new(window);
            w.put_u32(TARGET_IP_BROADCAST);
            w.put_u32(TARGET_PORT);
            w.put_u32(TARGET_OFFSET);
            w.put_u32(tx_seconds);
            w.put_u32(tx_cycles);
            w.put_u32(count);
        }
        packet_words(count as usize)
    }
}
