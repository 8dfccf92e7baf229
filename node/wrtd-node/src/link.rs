//! White Rabbit link state machine.
//!
//! Every timestamp producer and consumer gates on [`LinkMonitor::is_timing_ok`],
//! true only in [`LinkState::Synced`]. Loss of link from any state drops
//! straight back to [`LinkState::Offline`] and disables the lock.

use wrtd_hal::{TaiClock, WrLinkBits};

/// Link synchronization states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No fabric link.
    Offline,
    /// Link up, waiting for valid time.
    Online,
    /// Time valid, waiting for the oscillator lock.
    Syncing,
    /// Locked, letting the input plumbing settle.
    TdcWait,
    /// Fully synchronized; timestamps may flow.
    Synced,
}

/// Debounced link monitor.
pub struct LinkMonitor {
    state: LinkState,
    settle_secs: u32,
    settle_start: u32,
}

impl LinkMonitor {
    /// Creates a monitor in [`LinkState::Offline`].
    ///
    /// `settle_secs` is the hold-off spent in [`LinkState::TdcWait`] after
    /// lock: the input personality needs 4 s for its converter plumbing to
    /// catch up, the output personality none.
    #[must_use]
    pub const fn new(settle_secs: u32) -> Self {
        Self { state: LinkState::Offline, settle_secs, settle_start: 0 }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// True when timestamps may be produced or consumed.
    #[must_use]
    pub const fn is_timing_ok(&self) -> bool {
        matches!(self.state, LinkState::Synced)
    }

    /// Advances the state machine; called once per loop iteration.
    pub fn update<W: WrLinkBits, C: TaiClock>(&mut self, wr: &mut W, clock: &C) {
        match self.state {
            LinkState::Offline => {
                if wr.link_up() {
                    self.state = LinkState::Online;
                }
            }
            LinkState::Online => {
                if wr.time_ready() {
                    self.state = LinkState::Syncing;
                    wr.enable_lock(true);
                }
            }
            LinkState::Syncing => {
                if wr.locked() {
                    self.state = LinkState::TdcWait;
                    self.settle_start = clock.now().0;
                }
            }
            LinkState::TdcWait => {
                if clock.now().0 >= self.settle_start.wrapping_add(self.settle_secs) {
                    self.state = LinkState::Synced;
                }
            }
            LinkState::Synced => {}
        }

        if self.state != LinkState::Offline && !wr.link_up() {
            self.state = LinkState::Offline;
            wr.enable_lock(false);
        }
    }
}
