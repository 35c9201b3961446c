//! The grammar engine: seed, select, expand, run, score, restart.

use crate::checkpoint::Checkpoint;
use crate::coverage::CoverageLedger;
use crate::queue::{BoundedQueue, Score};
use crate::report::{Defect, DefectKind, SessionStats};
use crate::testcase::GrammarTestcase;
use crate::ExploreError;
use icehunt_exec::{persist_reproducer, CoverageShm, IceFilter, RunStatus, Sandbox, SandboxConfig};
use icehunt_grammar::{find_leaves, MutationTable, Node};
use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Tunables for a grammar-engine session.
#[derive(Debug, Clone)]
pub struct GrammarConfig {
    pub sandbox: SandboxConfig,
    pub ice_filter: IceFilter,
    /// Master seed for the engine's RNG.
    pub seed: u64,
    /// Priority-queue capacity.
    pub queue_capacity: usize,
    /// Restart after this many executions without a new bit.
    pub restart_interval: u32,
    /// Pop the current best once the stall streak passes this threshold.
    pub stall_pop_threshold: u32,
    /// Where reproducers and checkpoints land.
    pub output_dir: PathBuf,
    /// Reproducer file extension.
    pub reproducer_ext: String,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        GrammarConfig {
            sandbox: SandboxConfig::default(),
            ice_filter: IceFilter::default(),
            seed: 42,
            queue_capacity: 750,
            restart_interval: 500,
            stall_pop_threshold: 25,
            output_dir: PathBuf::from("output"),
            reproducer_ext: "cc".to_string(),
        }
    }
}

/// Coverage-guided growth of grammar trees.
pub struct GrammarEngine {
    config: GrammarConfig,
    table: MutationTable,
    sandbox: Sandbox,
    rng: ChaCha8Rng,
    queue: BoundedQueue<GrammarTestcase>,
    ledger: CoverageLedger,
    /// Global usage count per mutation index, reset on restart.
    mutation_counters: Vec<u32>,
    nr_execs: u64,
    nr_execs_without_new_bits: u32,
    restarts: u32,
}

impl GrammarEngine {
    pub fn new(config: GrammarConfig, table: MutationTable) -> Result<Self, ExploreError> {
        let sandbox = Sandbox::new(config.sandbox.clone(), config.ice_filter.clone())?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let queue = BoundedQueue::new(config.queue_capacity);
        let mutation_counters = vec![0; table.len()];

        Ok(GrammarEngine {
            config,
            table,
            sandbox,
            rng,
            queue,
            ledger: CoverageLedger::new(),
            mutation_counters,
            nr_execs: 0,
            nr_execs_without_new_bits: 0,
            restarts: 0,
        })
    }

    /// Run until a defect stops the session.
    pub fn run(&mut self) -> Result<Defect, ExploreError> {
        info!(
            "grammar engine: {} mutations, queue capacity {}, restart interval {}",
            self.table.len(),
            self.config.queue_capacity,
            self.config.restart_interval
        );
        loop {
            if let Some(defect) = self.step()? {
                return Ok(defect);
            }
        }
    }

    /// One scheduling iteration. `Some(defect)` ends the session.
    pub fn step(&mut self) -> Result<Option<Defect>, ExploreError> {
        if self.nr_execs_without_new_bits >= self.config.restart_interval {
            self.restart()?;
        }

        if self.queue.is_empty() {
            self.seed_queue();
        }

        // Mutate the best entry without removing it; a drained queue is
        // reseeded, a stalled one is popped below.
        let current = match self.queue.top() {
            Some(t) => t.clone(),
            None => return Ok(None),
        };

        let leaves = find_leaves(&current.root);
        if leaves.is_empty() {
            self.queue.pop();
            return Ok(None);
        }

        let leaf = &leaves[self.rng.gen_range(0..leaves.len())];
        let mutation = self.rng.gen_range(0..self.table.len());
        let root = self.table.mutate(&current.root, leaf, mutation);

        let mut source = root.render();
        source.push('\n');

        let shm = CoverageShm::new()?;
        let outcome = self.sandbox.run(&source, &shm)?;
        self.nr_execs += 1;

        match outcome.status {
            RunStatus::Accepted => {
                let new_bits = self.ledger.absorb(shm.trace_bits()) as u32;

                self.mutation_counters[mutation] += 1;
                let mut mutations = current.mutations.clone();
                mutations.insert(mutation as u32);

                let leaves_available = find_leaves(&root).len();
                let testcase = GrammarTestcase::new(
                    root,
                    current.generation + 1,
                    mutations,
                    current.mutation_counter + self.mutation_counters[mutation],
                    current.new_bits + new_bits,
                    leaves_available,
                    &mut self.rng,
                );
                debug!(
                    "compiled ({} execs | score {:.2} | queue {} | {} new bits | {} bytes)",
                    self.nr_execs,
                    testcase.score,
                    self.queue.len(),
                    new_bits,
                    testcase.root.size()
                );
                self.queue.push(Score(testcase.score), testcase);

                if new_bits > 0 {
                    self.nr_execs_without_new_bits = 0;
                } else {
                    self.nr_execs_without_new_bits += 1;
                }
            }
            RunStatus::CandidateIce => {
                return Ok(Some(self.report_defect(DefectKind::Ice, &source, outcome.stderr)?));
            }
            RunStatus::Crashed { signal } => {
                return Ok(Some(self.report_defect(
                    DefectKind::Crash { signal },
                    &source,
                    outcome.stderr,
                )?));
            }
            RunStatus::Rejected { .. } | RunStatus::TimedOut | RunStatus::IgnoredIce => {
                self.nr_execs_without_new_bits += 1;
            }
        }

        if self.nr_execs_without_new_bits > self.config.stall_pop_threshold {
            self.queue.pop();
        }

        Ok(None)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            engine: "grammar",
            nr_execs: self.nr_execs,
            total_bits: self.ledger.total_bits(),
            corpus_size: self.queue.len(),
            restarts: self.restarts,
        }
    }

    fn seed_queue(&mut self) {
        let testcase =
            GrammarTestcase::new(Node::empty(), 0, BTreeSet::new(), 1, 0, 1, &mut self.rng);
        self.queue.push(Score(testcase.score), testcase);
    }

    /// Checkpoint the best test case, then wipe the queue, the coverage
    /// ledger, and the mutation counters.
    fn restart(&mut self) -> Result<(), ExploreError> {
        self.restarts += 1;
        info!(
            "restart {} after {} execs without new bits",
            self.restarts, self.nr_execs_without_new_bits
        );

        std::fs::create_dir_all(&self.config.output_dir)?;
        let checkpoint = Checkpoint {
            nr_execs: self.nr_execs,
            restarts: self.restarts,
            total_bits: self.ledger.total_bits(),
            top_score: self.queue.top_score().map(|s| s.0),
            top_source: self.queue.top().map(|t| t.root.render()),
        };
        let path = self
            .config
            .output_dir
            .join(format!("checkpoint-{}.json", self.restarts));
        checkpoint.save(&path)?;

        self.queue.clear();
        self.ledger.reset();
        self.mutation_counters.fill(0);
        self.nr_execs_without_new_bits = 0;
        Ok(())
    }

    fn report_defect(
        &self,
        kind: DefectKind,
        source: &str,
        stderr: String,
    ) -> Result<Defect, ExploreError> {
        warn!("defect found: {kind}");
        let reproducer = persist_reproducer(
            &self.config.output_dir,
            source,
            &self.config.reproducer_ext,
        )?;
        println!("{}", reproducer.display());
        Ok(Defect {
            kind,
            reproducer,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(dir: &std::path::Path, compiler: &[&str]) -> GrammarConfig {
        GrammarConfig {
            sandbox: SandboxConfig {
                command: compiler.iter().map(|s| s.to_string()).collect(),
                timeout: Duration::from_secs(2),
                stderr_limit: 4096,
            },
            output_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn table() -> MutationTable {
        MutationTable::parse("\"int [x] = [0];[]\"\n\"{ [] }\"\n\"[0] + [1]\"\n").unwrap()
    }

    #[test]
    fn accepting_compiler_grows_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = GrammarEngine::new(
            config(dir.path(), &["sh", "-c", "cat > /dev/null"]),
            table(),
        )
        .unwrap();

        for _ in 0..20 {
            assert!(engine.step().unwrap().is_none());
        }

        let stats = engine.stats();
        assert_eq!(stats.nr_execs, 20);
        assert!(stats.corpus_size > 1);
        assert_eq!(stats.restarts, 0);
    }

    #[test]
    fn generations_increase_along_the_lineage() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = GrammarEngine::new(
            config(dir.path(), &["sh", "-c", "cat > /dev/null"]),
            table(),
        )
        .unwrap();

        for _ in 0..30 {
            engine.step().unwrap();
        }
        // Without coverage every admission is score-jittered, but some
        // lineage must have advanced past the seed.
        let mut max_gen = 0;
        while let Some(t) = engine.queue.pop() {
            max_gen = max_gen.max(t.generation);
        }
        assert!(max_gen > 0);
    }

    #[test]
    fn candidate_ice_stops_with_a_reproducer() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = GrammarEngine::new(
            config(
                dir.path(),
                &[
                    "sh",
                    "-c",
                    "cat > /dev/null; echo 'internal compiler error: in new_pass' >&2; exit 1",
                ],
            ),
            table(),
        )
        .unwrap();

        let defect = loop {
            if let Some(d) = engine.step().unwrap() {
                break d;
            }
        };

        assert_eq!(defect.kind, DefectKind::Ice);
        assert!(defect.reproducer.exists());
        assert!(defect.stderr.contains("new_pass"));
    }

    #[test]
    fn crash_stops_with_the_signal() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = GrammarEngine::new(
            config(dir.path(), &["sh", "-c", "kill -SEGV $$"]),
            table(),
        )
        .unwrap();

        let defect = loop {
            if let Some(d) = engine.step().unwrap() {
                break d;
            }
        };
        assert_eq!(defect.kind, DefectKind::Crash { signal: libc::SIGSEGV });
    }

    #[test]
    fn stalling_triggers_a_checkpointed_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), &["false"]);
        cfg.restart_interval = 3;
        cfg.stall_pop_threshold = 100;
        let mut engine = GrammarEngine::new(cfg, table()).unwrap();

        for _ in 0..6 {
            assert!(engine.step().unwrap().is_none());
        }

        assert_eq!(engine.stats().restarts, 1);
        assert!(dir.path().join("checkpoint-1.json").exists());
        let checkpoint = Checkpoint::load(&dir.path().join("checkpoint-1.json")).unwrap();
        assert_eq!(checkpoint.restarts, 1);
    }

    #[test]
    fn rejections_eventually_pop_the_stalled_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), &["false"]);
        cfg.restart_interval = 1000;
        cfg.stall_pop_threshold = 2;
        let mut engine = GrammarEngine::new(cfg, table()).unwrap();

        for _ in 0..3 {
            engine.step().unwrap();
        }
        // The stall streak passed the threshold, so the seed was popped.
        assert!(engine.queue.is_empty());

        // The next step reseeds, runs once more, and pops again — the
        // engine keeps making progress while everything is rejected.
        engine.step().unwrap();
        assert_eq!(engine.stats().nr_execs, 4);
        assert!(engine.queue.is_empty());
    }
}
