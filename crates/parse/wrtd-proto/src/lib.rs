//! Framed host↔firmware protocol and the on-fabric trigger packet.
//!
//! Payload unit everywhere is the 32-bit word. Control messages carry a
//! fixed four-word header ([`Header`]) followed by `len` payload words;
//! replies embed a reply-kind word ([`ids::rep`]) as the first payload
//! word. The host side additionally byte-swaps the first header word in
//! both directions to compensate for the soft-CPU's view of the queue
//! memory ([`swap_first_word`]).

#![cfg_attr(not(test), no_std)]

mod cursor;
mod header;
pub mod ids;
mod packet;
pub mod tlv;

pub use cursor::{MsgReader, MsgWriter};
pub use header::{HEADER_WORDS, Header, HeaderFlags, swap_first_word};
pub use packet::{
    ENTRY_WORDS, PACKET_HEADER_WORDS, TARGET_IP_BROADCAST, TARGET_OFFSET, TARGET_PORT,
    TriggerPacket, packet_words,
};

use core::fmt;

/// Serialized length of one log-stream entry, in words.
pub const LOG_ENTRY_WORDS: usize = 11;

/// Codec-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoError {
    /// The buffer ended before the expected data.
    Truncated,
    /// A write exceeded the slot window.
    Overflow,
    /// A field held a value outside its domain.
    Malformed,
}

impl fmt::Display for ProtoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtoError::Truncated => f.write_str("message truncated"),
            ProtoError::Overflow => f.write_str("message overflows slot"),
            ProtoError::Malformed => f.write_str("malformed message field"),
        }
    }
}

/// Version block returned for a `RECV_VERSION` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    /// Gateware identifier the application expects to run on.
    pub fpga_id: u32,
    /// Real-time application identifier.
    pub rt_id: u32,
    /// Application version, major in the high half-word.
    pub rt_version: u32,
    /// Source revision the binary was built from.
    pub git_version: u32,
}

impl VersionInfo {
    /// Serialized length in words.
    pub const WORDS: usize = 4;

    /// Writes the block through `w`.
    pub fn put(&self, w: &mut MsgWriter<'_>) {
        w.put_u32(self.fpga_id);
        w.put_u32(self.rt_id);
        w.put_u32(self.rt_version);
        w.put_u32(self.git_version);
    }

    /// Reads a block through `r`.
    pub fn get(r: &mut MsgReader<'_>) -> Self {
        Self {
            fpga_id: r.get_u32(),
            rt_id: r.get_u32(),
            rt_version: r.get_u32(),
            git_version: r.get_u32(),
        }
    }
}
