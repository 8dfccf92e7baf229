//! The per-personality logging stream.
//!
//! One outgoing host-queue slot streams [`LogEntry`] messages. An entry is
//! emitted only when the gating log-level bitset contains its kind, and a
//! full slot drops the entry on the floor: the firmware never blocks on
//! the host.

use wrtd_common::{LogEntry, LogLevel};
use wrtd_hal::MsgQueue;
use wrtd_proto::ids::action;
use wrtd_proto::{HEADER_WORDS, Header, HeaderFlags, LOG_ENTRY_WORDS, MsgWriter};

/// Serializer for one personality's log slot.
#[derive(Debug, Clone, Copy)]
pub struct LogStream {
    /// Outgoing host-queue slot index.
    pub slot: usize,
    /// Application id stamped into each entry's header.
    pub app_id: u16,
}

impl LogStream {
    /// Emits `entry` when `gate` enables its kind.
    pub fn emit<M: MsgQueue>(&self, mq: &mut M, gate: LogLevel, entry: &LogEntry) {
        if !gate.contains(entry.kind) {
            return;
        }
        if mq.out_full(false, self.slot) {
            return;
        }
        mq.claim(false, self.slot);
        let buf = mq.out_buf(false, self.slot);
        let header = Header {
            app_id: self.app_id,
            msg_id: action::LOG,
            slot_io: Header::pack_slot_io(0, self.slot as u8),
            seq: entry.seq,
            len: LOG_ENTRY_WORDS as u8,
            flags: HeaderFlags::empty(),
            trans: 0,
            time: 0,
        };
        if header.pack(buf).is_err() {
            return;
        }
        let mut w = MsgWriter::new(&mut buf[HEADER_WORDS..]);
        w.put_log_entry(entry);
        let Ok(n) = w.finish() else { return };
        mq.ready(false, self.slot, HEADER_WORDS + n);
    }
}
