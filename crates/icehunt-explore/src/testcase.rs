//! Scheduler entries for both engines.

use icehunt_ast::Program;
use icehunt_grammar::NodeRef;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

/// One grammar-engine queue entry.
///
/// The score is computed once at admission; lower is better.
#[derive(Debug, Clone)]
pub struct GrammarTestcase {
    pub root: NodeRef,
    pub generation: u32,
    /// Mutation indices applied along this lineage (membership only).
    pub mutations: BTreeSet<u32>,
    /// Accumulated global usage of the mutations applied here; rarely
    /// used mutations keep this low and the score boost high.
    pub mutation_counter: u32,
    /// New bits accumulated along this lineage.
    pub new_bits: u32,
    pub score: f32,
}

impl GrammarTestcase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        root: NodeRef,
        generation: u32,
        mutations: BTreeSet<u32>,
        mutation_counter: u32,
        new_bits: u32,
        leaves_available: usize,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let score = Self::raw_score(
            mutations.len(),
            generation,
            mutation_counter,
            new_bits,
            leaves_available,
        ) + 100.0 * gaussian(rng) as f32;

        GrammarTestcase {
            root,
            generation,
            mutations,
            mutation_counter,
            new_bits,
            score,
        }
    }

    /// The deterministic part of the score; the Gaussian jitter is added
    /// at construction.
    pub fn raw_score(
        nr_mutations: usize,
        generation: u32,
        mutation_counter: u32,
        new_bits: u32,
        leaves_available: usize,
    ) -> f32 {
        let mutation_counter = mutation_counter.max(1);
        let mut score = 0.0f32;
        score -= nr_mutations as f32;
        score -= 10.0 * generation as f32;
        score -= 100.0 * (mutation_counter + 1) as f32 / mutation_counter as f32;
        score -= 100.0 * new_bits as f32;
        score -= 100.0 * leaves_available as f32;
        score
    }
}

/// Standard-normal draw via Box–Muller.
fn gaussian(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.gen();
    let u2: f64 = rng.gen();
    (-2.0 * (1.0 - u1).ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// EWMA weight for the valid engine's transformation budget.
const ALPHA: f64 = 0.85;

/// One valid-engine corpus entry.
///
/// `nr_transformations` is a smoothed budget: how many transformations to
/// stack before the next compile. Failures push it towards `10 × failure
/// streak`, successes reset the streak.
#[derive(Debug, Clone)]
pub struct ValidTestcase {
    pub program: Program,
    pub nr_failures: u32,
    pub nr_transformations: f64,
}

impl ValidTestcase {
    pub fn new(program: Program) -> Self {
        ValidTestcase {
            program,
            nr_failures: 0,
            nr_transformations: 10.0,
        }
    }

    /// How many transformations the next trial should apply.
    pub fn budget(&self) -> u32 {
        (self.nr_transformations.ceil() as u32).max(1)
    }

    /// A trial produced new coverage: adopt the mutated program.
    pub fn record_success(&mut self, program: Program) {
        self.update_budget();
        self.nr_failures = 0;
        self.program = program;
    }

    /// A trial produced nothing new. Returns `true` when the entry has
    /// burned through its failure allowance and should be evicted.
    pub fn record_failure(&mut self, max_failures: u32) -> bool {
        self.nr_failures += 1;
        if self.nr_failures >= max_failures {
            return true;
        }
        self.update_budget();
        false
    }

    fn update_budget(&mut self) {
        self.nr_transformations =
            ALPHA * self.nr_transformations + (1.0 - ALPHA) * f64::from(10 * self.nr_failures);
    }
}
