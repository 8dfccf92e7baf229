//! Per-personality message-queue slot assignments.

/// Slot indices a personality uses on its queues.
#[derive(Debug, Clone, Copy)]
pub struct SlotMap {
    /// Host control requests arrive here (host queue, incoming).
    pub ctl_in: usize,
    /// Control replies leave here (host queue, outgoing).
    pub ctl_out: usize,
    /// The log stream leaves here (host queue, outgoing).
    pub log_out: usize,
    /// Trigger packets travel here (remote queue; outgoing on the input
    /// personality, incoming on the output personality).
    pub remote: usize,
}

/// Slot assignments of the input personality.
pub const TDC: SlotMap = SlotMap { ctl_in: 0, ctl_out: 0, log_out: 2, remote: 0 };

/// Slot assignments of the output personality.
pub const FD: SlotMap = SlotMap { ctl_in: 1, ctl_out: 1, log_out: 3, remote: 0 };
