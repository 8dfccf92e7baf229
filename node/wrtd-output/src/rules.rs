//! The routing table: trigger identity → per-output rules.
//!
//! A fixed arena of rows plus a parallel index kept sorted by identity,
//! so lookup is a binary search and rows never move once allocated —
//! conditional links and host-visible handles reference arena indices
//! that stay stable for the life of the entry.

use bitflags::bitflags;

use wrtd_common::limits::{FD_NUM_CHANNELS, ROUTING_ENTRIES};
use wrtd_common::{ErrorKind, TriggerId};

bitflags! {
    /// Rule state bits; an empty set marks an unused rule slot.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct RuleState: u16 {
        /// Plain rule: a match fires the output directly.
        const DIRECT = 1 << 0;
        /// Gating rule: a match arms a sibling conditional rule.
        const CONDITION = 1 << 1;
        /// Gated rule: fires only after its condition matched.
        const CONDITIONAL = 1 << 2;
        /// Rule present but suppressed; counters keep accumulating.
        const DISABLED = 1 << 3;
    }
}

/// Behaviour of one output upon a matching trigger message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutputRule {
    /// Delay added to the message timestamp, whole 8 ns cycles.
    pub delay_cycles: u32,
    /// Delay fraction, 1/4096-tick units.
    pub delay_frac: u16,
    /// Rule state bits.
    pub state: RuleState,
    /// Arena index of the paired entry: a conditional rule points at its
    /// condition row and vice versa.
    pub cond_ptr: Option<u16>,
    /// Worst-case matched-to-programmed latency, in ticks.
    pub latency_worst: u32,
    /// Rolling latency accumulator; reset before it can overflow.
    pub latency_avg_sum: u32,
    /// Samples accumulated in `latency_avg_sum`.
    pub latency_avg_nsamples: u32,
    /// Pulses this rule produced.
    pub hits: u32,
    /// Pulses this rule missed, for any reason.
    pub misses: u32,
}

impl OutputRule {
    const EMPTY: OutputRule = OutputRule {
        delay_cycles: 0,
        delay_frac: 0,
        state: RuleState::empty(),
        cond_ptr: None,
        latency_worst: 0,
        latency_avg_sum: 0,
        latency_avg_nsamples: 0,
        hits: 0,
        misses: 0,
    };

    /// True when the rule slot is unused.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

/// One arena row: an identity and a rule per output channel.
#[derive(Debug, Clone, Copy)]
pub struct TriggerRow {
    /// Row in use.
    pub valid: bool,
    /// Trigger identity (the sort key).
    pub id: TriggerId,
    /// Per-output rules.
    pub rules: [OutputRule; FD_NUM_CHANNELS],
}

impl TriggerRow {
    const EMPTY: TriggerRow = TriggerRow {
        valid: false,
        id: TriggerId::new(0, 0, 0),
        rules: [OutputRule::EMPTY; FD_NUM_CHANNELS],
    };
}

/// The routing table.
pub struct RoutingTable {
    rows: [TriggerRow; ROUTING_ENTRIES],
    /// Arena indices sorted by row identity; first `count` are live.
    order: [u16; ROUTING_ENTRIES],
    count: usize,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self { rows: [TriggerRow::EMPTY; ROUTING_ENTRIES], order: [0; ROUTING_ENTRIES], count: 0 }
    }

    /// Number of valid entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// True when no entry is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Row by arena index.
    #[must_use]
    pub fn row(&self, index: u16) -> &TriggerRow {
        &self.rows[index as usize]
    }

    /// One rule by arena index and output channel.
    #[must_use]
    pub fn rule(&self, index: u16, output: usize) -> &OutputRule {
        &self.rows[index as usize].rules[output]
    }

    /// Mutable rule by arena index and output channel.
    pub fn rule_mut(&mut self, index: u16, output: usize) -> &mut OutputRule {
        &mut self.rows[index as usize].rules[output]
    }

    /// Binary search over the sorted index.
    ///
    /// `Ok` holds the order position of the match, `Err` the insertion
    /// position.
    fn search(&self, id: &TriggerId) -> Result<usize, usize> {
        self.order[..self.count].binary_search_by(|&row| self.rows[row as usize].id.cmp(id))
    }

    /// Looks an identity up; returns the arena index.
    #[must_use]
    pub fn find(&self, id: &TriggerId) -> Option<u16> {
        self.search(id).ok().map(|pos| self.order[pos])
    }

    /// Creates or updates the rule of `output` under `id`.
    ///
    /// Returns the entry's arena index.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::TableFull`] when a new row is needed and the arena is
    /// exhausted; the table is unchanged.
    pub fn update(
        &mut self,
        id: &TriggerId,
        output: usize,
        rule: &OutputRule,
    ) -> Result<u16, ErrorKind> {
        match self.search(id) {
            Ok(pos) => {
                let index = self.order[pos];
                self.rows[index as usize].rules[output] = *rule;
                Ok(index)
            }
            Err(pos) => {
                let index = self
                    .rows
                    .iter()
                    .position(|row| !row.valid)
                    .ok_or(ErrorKind::TableFull)?;
                self.rows[index] = TriggerRow { valid: true, id: *id, rules: TriggerRow::EMPTY.rules };
                self.rows[index].rules[output] = *rule;

                let mut k = self.count;
                while k > pos {
                    self.order[k] = self.order[k - 1];
                    k -= 1;
                }
                self.order[pos] = index as u16;
                self.count += 1;
                Ok(index as u16)
            }
        }
    }

    /// Clears `output`'s rule on the row at `index`; frees the row once
    /// all four rules are empty.
    pub fn remove_rule(&mut self, index: u16, output: usize) {
        let i = index as usize;
        if !self.rows[i].valid {
            return;
        }
        self.rows[i].rules[output] = OutputRule::EMPTY;
        if self.rows[i].rules.iter().any(|rule| !rule.is_empty()) {
            return;
        }
        let id = self.rows[i].id;
        self.rows[i].valid = false;
        if let Ok(pos) = self.search(&id) {
            for k in pos..self.count - 1 {
                self.order[k] = self.order[k + 1];
            }
            self.count -= 1;
        }
        self.rows[i].id = TriggerId::default();
    }

    /// Number of non-empty rules `output` has across the table.
    #[must_use]
    pub fn rules_count(&self, output: usize) -> usize {
        self.order[..self.count]
            .iter()
            .filter(|&&row| !self.rows[row as usize].rules[output].is_empty())
            .count()
    }

    /// First arena index at or after order position `start` whose row
    /// carries a rule for `output`.
    #[must_use]
    pub fn first_for_output(&self, start: usize, output: usize) -> Option<u16> {
        self.order[start.min(self.count)..self.count]
            .iter()
            .copied()
            .find(|&row| !self.rows[row as usize].rules[output].is_empty())
    }

    /// Arena index of the next entry for `output` in identity order after
    /// the entry at arena index `index`.
    #[must_use]
    pub fn next_for_output(&self, index: u16, output: usize) -> Option<u16> {
        let pos = self.search(&self.rows[index as usize].id).ok()?;
        self.first_for_output(pos + 1, output)
    }
}
