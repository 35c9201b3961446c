//! The valid engine: value-preserving mutation with a coverage ratchet.
//!
//! Programs are valid by construction, so the oracle is sharp: a
//! rejection is a front-end defect, a crash is a crash, and a compiled
//! program that prints the wrong number is a miscompilation. Mutations
//! are kept only when they produce at least one new coverage bit.

use crate::coverage::CoverageLedger;
use crate::report::{Defect, DefectKind, SessionStats};
use crate::testcase::ValidTestcase;
use crate::ExploreError;
use icehunt_ast::transform::apply_random;
use icehunt_ast::Program;
use icehunt_exec::{
    persist_reproducer, ArtifactRunner, ArtifactVerdict, CoverageShm, IceFilter, RunStatus,
    Sandbox, SandboxConfig,
};
use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for a valid-engine session.
#[derive(Debug, Clone)]
pub struct ValidConfig {
    /// Compiler invocation; must leave an assemblable artifact behind.
    pub sandbox: SandboxConfig,
    pub ice_filter: IceFilter,
    /// Assembler/linker command for the compiler's artifact.
    pub assemble: Vec<String>,
    /// The binary the assemble step produces.
    pub binary: PathBuf,
    /// Wall-clock budget for the executed binary.
    pub run_timeout: Duration,
    pub seed: u64,
    /// Ceiling on live test cases; below it, fresh programs are seeded.
    pub max_testcases: usize,
    /// Transformations applied to a fresh seed program.
    pub seed_transformations: u32,
    /// Consecutive failures before a test case is evicted.
    pub max_failures: u32,
    pub output_dir: PathBuf,
    pub reproducer_ext: String,
}

impl Default for ValidConfig {
    fn default() -> Self {
        ValidConfig {
            sandbox: SandboxConfig {
                command: vec![
                    "g++".to_string(),
                    "-x".to_string(),
                    "c++".to_string(),
                    "-std=c++14".to_string(),
                    "-O3".to_string(),
                    "-S".to_string(),
                    "-".to_string(),
                    "-o".to_string(),
                    "prog.s".to_string(),
                ],
                timeout: Duration::from_secs(10),
                stderr_limit: 10 * 4096,
            },
            ice_filter: IceFilter::default(),
            assemble: vec!["g++".to_string(), "prog.s".to_string(), "-o".to_string(), "prog".to_string()],
            binary: PathBuf::from("./prog"),
            run_timeout: Duration::from_secs(5),
            seed: 42,
            max_testcases: 250,
            seed_transformations: 50,
            max_failures: 50,
            output_dir: PathBuf::from("output"),
            reproducer_ext: "cc".to_string(),
        }
    }
}

enum Trial {
    NewBits,
    NoNewBits,
    Defect(Defect),
}

/// Semantics-preserving mutation of typed programs.
pub struct ValidEngine {
    config: ValidConfig,
    sandbox: Sandbox,
    runner: ArtifactRunner,
    rng: ChaCha8Rng,
    ledger: CoverageLedger,
    testcases: Vec<ValidTestcase>,
    nr_execs: u64,
}

impl ValidEngine {
    pub fn new(config: ValidConfig) -> Result<Self, ExploreError> {
        let sandbox = Sandbox::new(config.sandbox.clone(), config.ice_filter.clone())?;
        let runner = ArtifactRunner {
            assemble: config.assemble.clone(),
            binary: config.binary.clone(),
            timeout: config.run_timeout,
        };
        let rng = ChaCha8Rng::seed_from_u64(config.seed);

        Ok(ValidEngine {
            config,
            sandbox,
            runner,
            rng,
            ledger: CoverageLedger::new(),
            testcases: Vec::new(),
            nr_execs: 0,
        })
    }

    /// Run until a defect stops the session.
    pub fn run(&mut self) -> Result<Defect, ExploreError> {
        info!(
            "valid engine: up to {} test cases, {} seed transformations",
            self.config.max_testcases, self.config.seed_transformations
        );
        loop {
            if let Some(defect) = self.step()? {
                return Ok(defect);
            }
        }
    }

    /// One scheduling iteration. `Some(defect)` ends the session.
    pub fn step(&mut self) -> Result<Option<Defect>, ExploreError> {
        if self.testcases.len() < self.config.max_testcases {
            return self.seed_one();
        }

        let index = self.rng.gen_range(0..self.testcases.len());
        let budget = self.testcases[index].budget();
        debug!(
            "[{index:3} | {:2} | {:5.2}] mutating",
            self.testcases[index].nr_failures, self.testcases[index].nr_transformations
        );

        let mut program = self.testcases[index].program.clone();
        for _ in 0..budget {
            program = apply_random(&program, &mut self.rng);
        }

        match self.try_program(&program)? {
            Trial::NewBits => {
                self.testcases[index].record_success(program);
            }
            Trial::NoNewBits => {
                if self.testcases[index].record_failure(self.config.max_failures) {
                    debug!("evicting test case {index}");
                    self.testcases.remove(index);
                }
            }
            Trial::Defect(defect) => return Ok(Some(defect)),
        }
        Ok(None)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            engine: "valid",
            nr_execs: self.nr_execs,
            total_bits: self.ledger.total_bits(),
            corpus_size: self.testcases.len(),
            restarts: 0,
        }
    }

    /// Seed one fresh program and admit it only if it finds new coverage.
    fn seed_one(&mut self) -> Result<Option<Defect>, ExploreError> {
        debug!("[{:3} new] seeding", self.testcases.len());
        let value: i32 = self.rng.gen();
        let mut program = Program::new(value);
        for _ in 0..self.config.seed_transformations {
            program = apply_random(&program, &mut self.rng);
        }

        match self.try_program(&program)? {
            Trial::NewBits => {
                self.testcases.push(ValidTestcase::new(program));
                Ok(None)
            }
            Trial::NoNewBits => Ok(None),
            Trial::Defect(defect) => Ok(Some(defect)),
        }
    }

    /// Compile, assemble, execute, and fold coverage in.
    fn try_program(&mut self, program: &Program) -> Result<Trial, ExploreError> {
        let source = program.render();
        let shm = CoverageShm::new()?;
        let outcome = self.sandbox.run(&source, &shm)?;
        self.nr_execs += 1;

        let defect_kind = match outcome.status {
            RunStatus::Accepted => match self.runner.check(program.target_value)? {
                ArtifactVerdict::Matches => {
                    let new_bits = self.ledger.absorb(shm.trace_bits());
                    debug!("{} bits; {} new", self.ledger.total_bits(), new_bits);
                    return Ok(if new_bits > 0 {
                        Trial::NewBits
                    } else {
                        Trial::NoNewBits
                    });
                }
                ArtifactVerdict::Mismatch { actual } => Some(DefectKind::Miscompilation {
                    detail: format!("printed {actual}, expected {}", program.target_value),
                }),
                ArtifactVerdict::Broken { detail } => {
                    Some(DefectKind::Miscompilation { detail })
                }
                ArtifactVerdict::TimedOut => Some(DefectKind::Miscompilation {
                    detail: "compiled program timed out".to_string(),
                }),
            },
            RunStatus::CandidateIce => Some(DefectKind::Ice),
            RunStatus::Crashed { signal } => Some(DefectKind::Crash { signal }),
            // A valid program the compiler turns away is itself a defect.
            RunStatus::Rejected { code } => Some(DefectKind::Rejection { code }),
            // Timeouts are environmental; known ICEs are already reported.
            RunStatus::TimedOut | RunStatus::IgnoredIce => None,
        };

        match defect_kind {
            Some(kind) => {
                warn!("defect found: {kind}");
                let reproducer = persist_reproducer(
                    &self.config.output_dir,
                    &source,
                    &self.config.reproducer_ext,
                )?;
                println!("{}", reproducer.display());
                Ok(Trial::Defect(Defect {
                    kind,
                    reproducer,
                    stderr: outcome.stderr,
                }))
            }
            None => Ok(Trial::NoNewBits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn config(dir: &Path, compiler: &[&str], binary: PathBuf) -> ValidConfig {
        ValidConfig {
            sandbox: SandboxConfig {
                command: compiler.iter().map(|s| s.to_string()).collect(),
                timeout: Duration::from_secs(5),
                stderr_limit: 4096,
            },
            assemble: vec!["true".to_string()],
            binary,
            run_timeout: Duration::from_secs(5),
            output_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn wrong_output_is_a_miscompilation_defect() {
        let dir = tempfile::tempdir().unwrap();
        // A "compiled program" that always prints 0 cannot match a random
        // 32-bit target.
        let binary = script(dir.path(), "prog", "echo 0");
        let mut engine = ValidEngine::new(config(
            dir.path(),
            &["sh", "-c", "cat > /dev/null"],
            binary,
        ))
        .unwrap();

        let defect = engine.step().unwrap().expect("mismatch must surface");
        assert!(matches!(defect.kind, DefectKind::Miscompilation { .. }));
        assert!(defect.reproducer.exists());

        // The reproducer is the rendered compilation unit.
        let source = std::fs::read_to_string(&defect.reproducer).unwrap();
        assert!(source.contains("int main"));
    }

    #[test]
    fn rejection_of_a_valid_program_is_a_defect() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script(dir.path(), "prog", "echo 0");
        let mut engine = ValidEngine::new(config(
            dir.path(),
            &["sh", "-c", "echo 'error: nope' >&2; exit 1"],
            binary,
        ))
        .unwrap();

        let defect = engine.step().unwrap().expect("rejection must surface");
        assert_eq!(defect.kind, DefectKind::Rejection { code: 1 });
        assert!(defect.stderr.contains("nope"));
    }

    #[test]
    fn candidate_ice_is_a_defect() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script(dir.path(), "prog", "echo 0");
        let mut engine = ValidEngine::new(config(
            dir.path(),
            &[
                "sh",
                "-c",
                "echo 'internal compiler error: in expand_expr' >&2; exit 1",
            ],
            binary,
        ))
        .unwrap();

        let defect = engine.step().unwrap().expect("ICE must surface");
        assert_eq!(defect.kind, DefectKind::Ice);
    }

    #[test]
    fn known_benign_ice_is_silently_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script(dir.path(), "prog", "echo 0");
        let mut engine = ValidEngine::new(config(
            dir.path(),
            &[
                "sh",
                "-c",
                "echo 'internal compiler error: gimplification failed' >&2; exit 1",
            ],
            binary,
        ))
        .unwrap();

        // No defect, no admission: the candidate just burned an exec.
        assert!(engine.step().unwrap().is_none());
        assert_eq!(engine.stats().corpus_size, 0);
        assert_eq!(engine.stats().nr_execs, 1);
    }

    #[test]
    fn compiler_timeout_is_not_a_defect() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script(dir.path(), "prog", "echo 0");
        let mut cfg = config(dir.path(), &["sh", "-c", "sleep 5"], binary);
        cfg.sandbox.timeout = Duration::from_millis(100);
        let mut engine = ValidEngine::new(cfg).unwrap();

        assert!(engine.step().unwrap().is_none());
        assert_eq!(engine.stats().corpus_size, 0);
    }
}
