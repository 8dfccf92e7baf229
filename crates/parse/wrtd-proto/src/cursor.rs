//! Word-oriented payload serializers with a latched fault state.
//!
//! Firmware command handlers read and write payloads through these
//! cursors without checking each access: the first out-of-bounds access
//! latches a fault, every later access becomes a no-op, and the single
//! `finish()` call at the end reports whether the whole message fit.

use wrtd_common::{LogEntry, LogLevel, MissReason, TriggerEntry, TriggerId};
use wrtd_time::Timestamp;

use crate::ProtoError;

/// Serializing cursor over a mutable word window.
#[derive(Debug)]
pub struct MsgWriter<'a> {
    buf: &'a mut [u32],
    pos: usize,
    fault: bool,
}

impl<'a> MsgWriter<'a> {
    /// Creates a writer over `buf`.
    #[must_use]
    pub fn new(buf: &'a mut [u32]) -> Self {
        Self { buf, pos: 0, fault: false }
    }

    /// Number of words written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pos
    }

    /// True when nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Appends one word.
    pub fn put_u32(&mut self, value: u32) {
        if self.fault || self.pos >= self.buf.len() {
            self.fault = true;
            return;
        }
        self.buf[self.pos] = value;
        self.pos += 1;
    }

    /// Appends one signed word.
    pub fn put_i32(&mut self, value: i32) {
        self.put_u32(value as u32);
    }

    /// Appends a half-word in a full word slot.
    pub fn put_u16(&mut self, value: u16) {
        self.put_u32(u32::from(value));
    }

    /// Appends a timestamp: seconds (hi, lo), ticks, frac.
    pub fn put_timestamp(&mut self, ts: &Timestamp) {
        self.put_u32((ts.seconds >> 32) as u32);
        self.put_u32(ts.seconds as u32);
        self.put_i32(ts.ticks);
        self.put_i32(ts.frac);
    }

    /// Appends a trigger identity.
    pub fn put_trig_id(&mut self, id: &TriggerId) {
        self.put_u32(id.system);
        self.put_u32(id.source_port);
        self.put_u32(id.trigger);
    }

    /// Appends a full trigger entry: timestamp, identity, sequence.
    pub fn put_entry(&mut self, ent: &TriggerEntry) {
        self.put_timestamp(&ent.ts);
        self.put_trig_id(&ent.id);
        self.put_u32(ent.seq);
    }

    /// Rewrites an already-written word, e.g. a TLV length filled in after
    /// its record body.
    pub fn patch(&mut self, pos: usize, value: u32) {
        if pos >= self.pos {
            self.fault = true;
            return;
        }
        self.buf[pos] = value;
    }

    /// Appends a log-stream entry.
    pub fn put_log_entry(&mut self, entry: &LogEntry) {
        self.put_u32(entry.kind.bits());
        self.put_i32(entry.channel);
        self.put_u32(entry.miss_reason.map_or(0, MissReason::code));
        self.put_u32(entry.seq);
        self.put_trig_id(&entry.id);
        self.put_timestamp(&entry.ts);
    }

    /// Finishes serialization.
    ///
    /// # Errors
    ///
    /// [`ProtoError::Overflow`] when any write fell outside the window.
    pub fn finish(&self) -> Result<usize, ProtoError> {
        if self.fault { Err(ProtoError::Overflow) } else { Ok(self.pos) }
    }
}

/// Deserializing cursor over a word window.
#[derive(Debug)]
pub struct MsgReader<'a> {
    buf: &'a [u32],
    pos: usize,
    fault: bool,
}

impl<'a> MsgReader<'a> {
    /// Creates a reader over `buf`.
    #[must_use]
    pub fn new(buf: &'a [u32]) -> Self {
        Self { buf, pos: 0, fault: false }
    }

    /// Words not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reads one word; returns 0 once faulted.
    pub fn get_u32(&mut self) -> u32 {
        if self.fault || self.pos >= self.buf.len() {
            self.fault = true;
            return 0;
        }
        let value = self.buf[self.pos];
        self.pos += 1;
        value
    }

    /// Reads one signed word.
    pub fn get_i32(&mut self) -> i32 {
        self.get_u32() as i32
    }

    /// Reads a half-word stored in a full word slot.
    pub fn get_u16(&mut self) -> u16 {
        (self.get_u32() & 0xFFFF) as u16
    }

    /// Reads a timestamp: seconds (hi, lo), ticks, frac.
    pub fn get_timestamp(&mut self) -> Timestamp {
        let hi = u64::from(self.get_u32());
        let lo = u64::from(self.get_u32());
        Timestamp { seconds: hi << 32 | lo, ticks: self.get_i32(), frac: self.get_i32() }
    }

    /// Reads a trigger identity.
    pub fn get_trig_id(&mut self) -> TriggerId {
        TriggerId {
            system: self.get_u32(),
            source_port: self.get_u32(),
            trigger: self.get_u32(),
        }
    }

    /// Reads a full trigger entry.
    pub fn get_entry(&mut self) -> TriggerEntry {
        TriggerEntry {
            ts: self.get_timestamp(),
            id: self.get_trig_id(),
            seq: self.get_u32(),
        }
    }

    /// Skips `n` words.
    pub fn skip(&mut self, n: usize) {
        if self.fault || self.remaining() < n {
            self.fault = true;
            return;
        }
        self.pos += n;
    }

    /// Reads a log-stream entry.
    pub fn get_log_entry(&mut self) -> LogEntry {
        LogEntry {
            kind: LogLevel::from_bits_truncate(self.get_u32()),
            channel: self.get_i32(),
            miss_reason: MissReason::from_code(self.get_u32()),
            seq: self.get_u32(),
            id: self.get_trig_id(),
            ts: self.get_timestamp(),
        }
    }

    /// Finishes deserialization.
    ///
    /// # Errors
    ///
    /// [`ProtoError::Truncated`] when any read fell outside the window.
    pub fn finish(&self) -> Result<(), ProtoError> {
        if self.fault { Err(ProtoError::Truncated) } else { Ok(()) }
    }
}
