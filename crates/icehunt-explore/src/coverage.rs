//! Persistent coverage accounting across runs.

use icehunt_protocol::MAP_SIZE;

/// Per-index hit counters accumulated over a whole session.
///
/// The volatile trace bits from one child are folded in with
/// [`absorb`](CoverageLedger::absorb); an index whose persistent counter
/// transitions from zero to one is a *new bit* — the currency both
/// engines trade in.
#[derive(Debug, Clone)]
pub struct CoverageLedger {
    counters: Vec<u32>,
    total_bits: usize,
    total_runs: u64,
}

impl CoverageLedger {
    pub fn new() -> Self {
        CoverageLedger {
            counters: vec![0; MAP_SIZE],
            total_bits: 0,
            total_runs: 0,
        }
    }

    /// Fold one run's trace bits in; returns how many indices were seen
    /// for the first time.
    pub fn absorb(&mut self, trace_bits: &[u8]) -> usize {
        let mut new_bits = 0;
        for (counter, &bit) in self.counters.iter_mut().zip(trace_bits) {
            if bit != 0 {
                *counter += 1;
                if *counter == 1 {
                    new_bits += 1;
                }
            }
        }
        self.total_bits += new_bits;
        self.total_runs += 1;
        if new_bits > 0 {
            log::debug!("{} new bits ({} total)", new_bits, self.total_bits);
        }
        new_bits
    }

    /// Unique indices seen so far. Monotonically non-decreasing until
    /// [`reset`](CoverageLedger::reset).
    pub fn total_bits(&self) -> usize {
        self.total_bits
    }

    pub fn total_runs(&self) -> u64 {
        self.total_runs
    }

    /// Forget everything — part of a restart.
    pub fn reset(&mut self) {
        self.counters.fill(0);
        self.total_bits = 0;
    }
}

impl Default for CoverageLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(indices: &[usize]) -> Vec<u8> {
        let mut bits = vec![0u8; MAP_SIZE];
        for &i in indices {
            bits[i] = 1;
        }
        bits
    }

    #[test]
    fn first_run_counts_every_lit_index() {
        let mut ledger = CoverageLedger::new();
        assert_eq!(ledger.absorb(&trace(&[3, 17, 200])), 3);
        assert_eq!(ledger.total_bits(), 3);
    }

    #[test]
    fn only_fresh_indices_count_on_later_runs() {
        let mut ledger = CoverageLedger::new();
        ledger.absorb(&trace(&[3, 17, 200]));
        assert_eq!(ledger.absorb(&trace(&[3, 17, 500])), 1);
        assert_eq!(ledger.total_bits(), 4);
    }

    #[test]
    fn total_is_monotone_across_arbitrary_runs() {
        let mut ledger = CoverageLedger::new();
        let mut prev = 0;
        for i in 0..50 {
            ledger.absorb(&trace(&[(i * 37) % MAP_SIZE, (i * 11) % MAP_SIZE]));
            assert!(ledger.total_bits() >= prev);
            prev = ledger.total_bits();
        }
    }

    #[test]
    fn empty_trace_adds_nothing() {
        let mut ledger = CoverageLedger::new();
        assert_eq!(ledger.absorb(&trace(&[])), 0);
        assert_eq!(ledger.total_bits(), 0);
        assert_eq!(ledger.total_runs(), 1);
    }

    #[test]
    fn reset_forgets_coverage() {
        let mut ledger = CoverageLedger::new();
        ledger.absorb(&trace(&[1, 2]));
        ledger.reset();
        assert_eq!(ledger.total_bits(), 0);
        // The same indices are new again after the reset.
        assert_eq!(ledger.absorb(&trace(&[1, 2])), 2);
    }

    #[test]
    fn counter_saturation_is_not_a_concern_at_u32() {
        let mut ledger = CoverageLedger::new();
        for _ in 0..300 {
            ledger.absorb(&trace(&[9]));
        }
        assert_eq!(ledger.total_bits(), 1);
    }
}
