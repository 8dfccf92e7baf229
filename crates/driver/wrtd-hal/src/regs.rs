//! Register maps of the node gateware blocks.
//!
//! Offsets are relative to each block's base in the soft-CPU address
//! space: the dedicated-peripheral window for mezzanine blocks, the CPU
//! local-register window for the TAI counters, and the two message-queue
//! windows.

/// CPU local-register window base.
pub const CPU_LR_BASE: usize = 0x10_0000;
/// Dedicated-peripheral window base.
pub const CPU_DP_BASE: usize = 0x20_0000;

/// Message-queue block.
pub mod mq {
    /// Global control-register offset.
    pub const GCR: usize = 0x0;
    /// Slot count register (incoming count low byte, outgoing next).
    pub const GCR_SLOT_COUNT: usize = 0x0;
    /// Global slot status: incoming pending bits low half, outgoing full high.
    pub const GCR_SLOT_STATUS: usize = 0x4;
    /// Interrupt mask register.
    pub const GCR_IRQ_MASK: usize = 0x8;
    /// Interrupt coalescing register.
    pub const GCR_IRQ_COALESCE: usize = 0xC;

    /// Base of incoming slot `n`'s window.
    #[must_use]
    pub const fn slot_in(n: usize) -> usize {
        0x4000 + n * 0x400
    }

    /// Base of outgoing slot `n`'s window.
    #[must_use]
    pub const fn slot_out(n: usize) -> usize {
        0x8000 + n * 0x400
    }

    /// Per-slot command register offset.
    pub const SLOT_COMMAND: usize = 0x0;
    /// Per-slot status register offset.
    pub const SLOT_STATUS: usize = 0x4;
    /// First data word offset within a slot window.
    pub const SLOT_DATA: usize = 0x8;

    /// Claim command bit.
    pub const CMD_CLAIM: u32 = 1 << 24;
    /// Purge command bit.
    pub const CMD_PURGE: u32 = 1 << 25;
    /// Ready command bit; low bits carry the word count.
    pub const CMD_READY: u32 = 1 << 26;
    /// Discard command bit.
    pub const CMD_DISCARD: u32 = 1 << 27;

    /// Slot-full bit in the per-slot status register.
    pub const STATUS_FULL: u32 = 1 << 0;
    /// Incoming-pending bits mask within the global status word.
    pub const GCR_INCOMING_MASK: u32 = 0x0000_FFFF;
}

/// CPU local registers.
pub mod lr {
    /// TAI cycle counter; latched by a seconds read.
    pub const TAI_CYCLES: usize = 0x10;
    /// TAI seconds; read this first.
    pub const TAI_SEC: usize = 0x14;
    /// GPIO set register.
    pub const GPIO_SET: usize = 0x1C;
    /// GPIO clear register.
    pub const GPIO_CLEAR: usize = 0x20;
}

/// TDC mezzanine blocks.
pub mod tdc {
    /// Control/status block base within the peripheral window.
    pub const REGS_BASE: usize = 0x2000;
    /// Direct-readout block base within the peripheral window.
    pub const DIRECT_BASE: usize = 0x8000;

    /// Acquisition control register.
    pub const REG_CTRL: usize = 0x0;
    /// White Rabbit control register.
    pub const REG_WR_CTRL: usize = 0x4;
    /// White Rabbit status register.
    pub const REG_WR_STAT: usize = 0x8;

    /// Enable-acquisition control bit.
    pub const CTRL_EN_ACQ: u32 = 1 << 0;
    /// Disable-acquisition control bit.
    pub const CTRL_DIS_ACQ: u32 = 1 << 1;
    /// WR lock enable bit.
    pub const WR_CTRL_ENABLE: u32 = 1 << 0;

    /// FIFO control/status register.
    pub const DR_FIFO_CSR: usize = 0x0;
    /// FIFO word 0: coarse seconds.
    pub const DR_FIFO_R0: usize = 0x4;
    /// FIFO word 1: 8 ns ticks.
    pub const DR_FIFO_R1: usize = 0x8;
    /// FIFO word 2: metadata (fine time + channel).
    pub const DR_FIFO_R2: usize = 0xC;
    /// Channel enable mask register.
    pub const DR_CHAN_ENABLE: usize = 0x10;
    /// Hardware dead-time register.
    pub const DR_DEAD_TIME: usize = 0x14;

    /// FIFO-empty bit of the CSR.
    pub const FIFO_CSR_EMPTY: u32 = 1 << 0;

    use bitflags::bitflags;

    bitflags! {
        /// White Rabbit status bits of the TDC block.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct WrStat: u32 {
            /// Fabric link is up.
            const LINK = 1 << 0;
            /// Auxiliary clock locked to WR.
            const AUX_LOCKED = 1 << 1;
            /// TAI time is valid.
            const TIME_VALID = 1 << 2;
        }
    }
}

/// Fine-delay mezzanine blocks.
pub mod fd {
    use bitflags::bitflags;

    /// Timing control register (device-level).
    pub const REG_TCR: usize = 0x0;

    /// Base of output channel `n`'s register block.
    #[must_use]
    pub const fn channel_base(n: usize) -> usize {
        0x100 + n * 0x100
    }

    /// Pulse start, seconds (low word).
    pub const REG_U_STARTL: usize = 0x0;
    /// Pulse start, 8 ns cycles.
    pub const REG_C_START: usize = 0x4;
    /// Pulse start, fractional units.
    pub const REG_F_START: usize = 0x8;
    /// Pulse end, seconds (low word).
    pub const REG_U_ENDL: usize = 0xC;
    /// Pulse end, 8 ns cycles.
    pub const REG_C_END: usize = 0x10;
    /// Pulse end, fractional units.
    pub const REG_F_END: usize = 0x14;
    /// Repetition control register.
    pub const REG_RCR: usize = 0x18;
    /// Delay/pulse-generator control register.
    pub const REG_DCR: usize = 0x1C;

    bitflags! {
        /// Timing control register bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Tcr: u32 {
            /// Fabric link is up.
            const WR_LINK = 1 << 0;
            /// Oscillator locked to WR.
            const WR_LOCKED = 1 << 1;
            /// WR lock enable.
            const WR_ENABLE = 1 << 2;
        }
    }

    bitflags! {
        /// Delay control register bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Dcr: u32 {
            /// Output enable.
            const ENABLE = 1 << 0;
            /// Pulse-generator mode select.
            const MODE = 1 << 1;
            /// Arm the programmed window.
            const PG_ARM = 1 << 2;
            /// The armed window has fired (read-only).
            const PG_TRIG = 1 << 3;
            /// Latch the start/end registers into the generator.
            const UPDATE = 1 << 4;
        }
    }
}
