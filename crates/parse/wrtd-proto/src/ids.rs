//! Message, command and reply identifiers.
//!
//! The header `msg_id` byte carries either a transport-standard action
//! ([`action`]) or a personality command ([`tdc`], [`fd`]). Reply kinds
//! ([`rep`]) are wider than a byte and travel as the first payload word of
//! the reply, with the header marked `SEND_ACK`/`SEND_NACK`.

/// Transport-standard actions, reserved across personalities.
pub mod action {
    /// Liveness probe; replied with a bare ACK.
    pub const RECV_PING: u8 = 0x20;
    /// Structured-variable write.
    pub const RECV_FIELD_SET: u8 = 0x21;
    /// Structured-variable read.
    pub const RECV_FIELD_GET: u8 = 0x22;
    /// Structured-blob write.
    pub const RECV_STRUCT_SET: u8 = 0x23;
    /// Structured-blob read.
    pub const RECV_STRUCT_GET: u8 = 0x24;
    /// Version block read.
    pub const RECV_VERSION: u8 = 0x25;
    /// Positive acknowledgement (also carries rich replies).
    pub const SEND_ACK: u8 = 0x28;
    /// Negative acknowledgement; payload is one error-code word.
    pub const SEND_NACK: u8 = 0x29;
    /// Structured-variable read reply.
    pub const SEND_FIELD_GET: u8 = 0x2A;
    /// Structured-blob read reply.
    pub const SEND_STRUCT_GET: u8 = 0x2B;
    /// Version block reply.
    pub const SEND_VERSION: u8 = 0x2C;
    /// Log-stream entry (firmware → host, unsolicited).
    pub const LOG: u8 = 0x30;
}

/// Input-personality (TDC) commands.
pub mod tdc {
    /// Enable or disable an input channel.
    pub const CHAN_ENABLE: u8 = 0x1;
    /// Set the shared input dead time.
    pub const CHAN_SET_DEAD_TIME: u8 = 0x2;
    /// Set a channel's trigger delay.
    pub const CHAN_SET_DELAY: u8 = 0x3;
    /// Read a channel's full state.
    pub const CHAN_GET_STATE: u8 = 0x4;
    /// Arm or disarm a channel.
    pub const CHAN_ARM: u8 = 0x5;
    /// Set a channel's triggering mode.
    pub const CHAN_SET_MODE: u8 = 0x7;
    /// Seed a channel's sequence counter.
    pub const CHAN_SET_SEQ: u8 = 0x8;
    /// Assign a trigger identity to a channel.
    pub const CHAN_ASSIGN_TRIGGER: u8 = 0x9;
    /// Set a channel's timebase offset.
    pub const CHAN_SET_TIMEBASE_OFFSET: u8 = 0xB;
    /// Liveness probe.
    pub const PING: u8 = 0xC;
    /// Emit a synthetic trigger from the host.
    pub const SOFTWARE_TRIGGER: u8 = 0xD;
    /// Set a channel's log-level bitset.
    pub const CHAN_SET_LOG_LEVEL: u8 = 0xE;
    /// Zero a channel's counters.
    pub const CHAN_RESET_COUNTERS: u8 = 0xF;
}

/// Output-personality (FD) commands.
pub mod fd {
    /// Enable or disable an output channel.
    pub const CHAN_ENABLE: u8 = 0x1;
    /// Assign a trigger (optionally with a condition) to an output.
    pub const TRIG_ASSIGN: u8 = 0x2;
    /// Iterate the routing table.
    pub const READ_HASH: u8 = 0x3;
    /// Remove an assigned trigger.
    pub const TRIG_REMOVE: u8 = 0x4;
    /// Read an output channel's full state.
    pub const CHAN_GET_STATE: u8 = 0x5;
    /// Set a rule's delay.
    pub const TRIG_SET_DELAY: u8 = 0x6;
    /// Set an output's pulse width.
    pub const CHAN_SET_WIDTH: u8 = 0x7;
    /// Set an output's triggering mode.
    pub const CHAN_SET_MODE: u8 = 0x8;
    /// Fire a test pulse from the host.
    pub const SOFTWARE_TRIGGER: u8 = 0x9;
    /// Arm or disarm an output.
    pub const CHAN_ARM: u8 = 0xA;
    /// Enable or disable an assigned trigger rule.
    pub const TRIG_ENABLE: u8 = 0xB;
    /// Set an output's log-level bitset.
    pub const CHAN_SET_LOG_LEVEL: u8 = 0xC;
    /// Zero an output's counters.
    pub const CHAN_RESET_COUNTERS: u8 = 0xD;
    /// Look a trigger up by identity.
    pub const TRIG_GET_BY_ID: u8 = 0xE;
    /// Read an assigned trigger's state by handle.
    pub const TRIG_GET_STATE: u8 = 0xF;
    /// Read the node's current TAI time.
    pub const BASE_TIME: u8 = 0x10;
    /// Liveness probe.
    pub const PING: u8 = 0x11;
    /// Set an output's dead time.
    pub const CHAN_DEAD_TIME: u8 = 0x12;
    /// Read the firmware version block.
    pub const VERSION: u8 = 0x13;
}

/// Reply kinds, carried as the first payload word of a reply.
pub mod rep {
    /// Plain acknowledgement.
    pub const ACK: u32 = 0x100;
    /// Channel state dump.
    pub const STATE: u32 = 0x101;
    /// Negative acknowledgement; followed by one error-code word.
    pub const NACK: u32 = 0x102;
    /// Trigger handle returned by an assignment.
    pub const TRIGGER_HANDLE: u32 = 0x103;
    /// Routing-table entry dump.
    pub const HASH_ENTRY: u32 = 0x104;
    /// Timestamp reply (base time, software trigger fire time).
    pub const TIMESTAMP: u32 = 0x105;
    /// Version block.
    pub const VERSION: u32 = 0x106;
}

/// Application identifier of the input personality.
pub const APP_ID_TDC: u16 = 0x0154;
/// Application identifier of the output personality.
pub const APP_ID_FD: u16 = 0x0155;

/// Gateware identifier both personalities expect.
pub const FPGA_ID: u32 = 0x1157_90DE;
/// Real-time application id of the input personality.
pub const RT_ID_TDC: u32 = 0x0001;
/// Real-time application id of the output personality.
pub const RT_ID_FD: u32 = 0x0002;
/// Packed application version (major.minor).
pub const RT_VERSION: u32 = 2 << 16;
