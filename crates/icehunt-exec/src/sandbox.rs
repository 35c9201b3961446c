//! The compiler child: spawn, feed, bound, reap, classify.

use crate::outcome::{IceFilter, IceVerdict, RunOutcome, RunStatus};
use crate::shm::CoverageShm;
use crate::ExecError;
use icehunt_protocol::SHM_ENV_VAR;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// How the compiler under test is invoked.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Full argv; the program source arrives on stdin (`-` as the input
    /// argument for most drivers).
    pub command: Vec<String>,
    /// Wall-clock budget per compile; the child is killed at the
    /// deadline.
    pub timeout: Duration,
    /// How much of the diagnostic stream to keep.
    pub stderr_limit: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            command: vec![
                "g++".to_string(),
                "-x".to_string(),
                "c++".to_string(),
                "-std=c++14".to_string(),
                "-O3".to_string(),
                "-c".to_string(),
                "-".to_string(),
                "-o".to_string(),
                "prog.o".to_string(),
            ],
            timeout: Duration::from_millis(500),
            stderr_limit: 10 * 4096,
        }
    }
}

/// Runs compiler children and classifies their exits.
#[derive(Debug)]
pub struct Sandbox {
    config: SandboxConfig,
    ice_filter: IceFilter,
}

impl Sandbox {
    pub fn new(config: SandboxConfig, ice_filter: IceFilter) -> Result<Self, ExecError> {
        if config.command.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        Ok(Sandbox { config, ice_filter })
    }

    /// Compile one candidate.
    ///
    /// The child gets the source on stdin, the shared-memory id in its
    /// environment, stdout discarded, and stderr captured into a
    /// temporary file (a pipe could deadlock against a chatty compiler).
    /// It is waited on up to the configured deadline, then killed and
    /// reaped.
    pub fn run(&self, source: &str, shm: &CoverageShm) -> Result<RunOutcome, ExecError> {
        let mut stderr_file = tempfile::tempfile()?;

        let mut child = Command::new(&self.config.command[0])
            .args(&self.config.command[1..])
            .env(SHM_ENV_VAR, shm.id_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file.try_clone()?))
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that dies before draining stdin is fine; its exit
            // status tells the story.
            match stdin.write_all(source.as_bytes()) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        let deadline = Instant::now() + self.config.timeout;
        let mut timed_out = false;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None => {
                    if Instant::now() >= deadline {
                        timed_out = true;
                        // Kill then block: the child must be reaped before
                        // the next trial starts.
                        let _ = child.kill();
                        break child.wait()?;
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        };

        let stderr = {
            stderr_file.seek(SeekFrom::Start(0))?;
            let mut buf = Vec::with_capacity(self.config.stderr_limit.min(4096));
            std::io::Read::by_ref(&mut stderr_file)
                .take(self.config.stderr_limit as u64)
                .read_to_end(&mut buf)?;
            String::from_utf8_lossy(&buf).into_owned()
        };

        let status = if timed_out {
            RunStatus::TimedOut
        } else if let Some(signal) = status.signal() {
            RunStatus::Crashed { signal }
        } else {
            match status.code() {
                Some(0) => RunStatus::Accepted,
                code => {
                    let code = code.unwrap_or(-1);
                    match self.ice_filter.classify(&stderr) {
                        IceVerdict::NotIce => RunStatus::Rejected { code },
                        IceVerdict::Benign => RunStatus::IgnoredIce,
                        IceVerdict::Candidate => RunStatus::CandidateIce,
                    }
                }
            }
        };

        if matches!(status, RunStatus::TimedOut) {
            log::debug!("compiler timed out after {:?}", self.config.timeout);
        }

        Ok(RunOutcome { status, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox(argv: &[&str], timeout_ms: u64) -> Sandbox {
        let config = SandboxConfig {
            command: argv.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_millis(timeout_ms),
            stderr_limit: 40960,
        };
        Sandbox::new(config, IceFilter::default()).unwrap()
    }

    #[test]
    fn empty_command_is_refused() {
        let config = SandboxConfig {
            command: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            Sandbox::new(config, IceFilter::default()),
            Err(ExecError::EmptyCommand)
        ));
    }

    #[test]
    fn clean_exit_is_accepted() {
        let shm = CoverageShm::new().unwrap();
        let outcome = sandbox(&["cat"], 2000).run("int x;\n", &shm).unwrap();
        assert_eq!(outcome.status, RunStatus::Accepted);
    }

    #[test]
    fn nonzero_exit_is_rejected_with_code() {
        let shm = CoverageShm::new().unwrap();
        let outcome = sandbox(&["sh", "-c", "exit 3"], 2000)
            .run("", &shm)
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Rejected { code: 3 });
    }

    #[test]
    fn stderr_is_captured() {
        let shm = CoverageShm::new().unwrap();
        let outcome = sandbox(&["sh", "-c", "echo 'error: no good' >&2; exit 1"], 2000)
            .run("", &shm)
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Rejected { code: 1 });
        assert!(outcome.stderr.contains("no good"));
    }

    #[test]
    fn stderr_capture_is_bounded() {
        let shm = CoverageShm::new().unwrap();
        let config = SandboxConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "yes error | head -c 100000 >&2; exit 1".to_string(),
            ],
            timeout: Duration::from_millis(5000),
            stderr_limit: 1024,
        };
        let sandbox = Sandbox::new(config, IceFilter::default()).unwrap();
        let outcome = sandbox.run("", &shm).unwrap();
        assert_eq!(outcome.stderr.len(), 1024);
    }

    #[test]
    fn unknown_ice_is_a_candidate_defect() {
        let shm = CoverageShm::new().unwrap();
        let outcome = sandbox(
            &[
                "sh",
                "-c",
                "echo 'internal compiler error: in brand_new_pass' >&2; exit 1",
            ],
            2000,
        )
        .run("", &shm)
        .unwrap();
        assert_eq!(outcome.status, RunStatus::CandidateIce);
        assert!(outcome.status.is_defect());
    }

    #[test]
    fn known_ice_is_ignored() {
        let shm = CoverageShm::new().unwrap();
        let outcome = sandbox(
            &[
                "sh",
                "-c",
                "echo 'internal compiler error: in search_anon_aggr' >&2; exit 1",
            ],
            2000,
        )
        .run("", &shm)
        .unwrap();
        assert_eq!(outcome.status, RunStatus::IgnoredIce);
    }

    #[test]
    fn slow_child_is_killed_at_the_deadline() {
        let shm = CoverageShm::new().unwrap();
        let start = Instant::now();
        let outcome = sandbox(&["sh", "-c", "sleep 5"], 100).run("", &shm).unwrap();
        assert_eq!(outcome.status, RunStatus::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn signal_death_is_a_crash() {
        let shm = CoverageShm::new().unwrap();
        let outcome = sandbox(&["sh", "-c", "kill -SEGV $$"], 2000)
            .run("", &shm)
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Crashed { signal: libc::SIGSEGV });
        assert!(outcome.status.is_defect());
    }

    #[test]
    fn child_sees_the_shm_id() {
        let shm = CoverageShm::new().unwrap();
        let check = format!("test \"${}\" = \"{}\"", SHM_ENV_VAR, shm.id_string());
        let outcome = sandbox(&["sh", "-c", &check], 2000).run("", &shm).unwrap();
        assert_eq!(outcome.status, RunStatus::Accepted);
    }

    #[test]
    fn large_source_does_not_deadlock() {
        let shm = CoverageShm::new().unwrap();
        let source = "x".repeat(1 << 20);
        let outcome = sandbox(&["sh", "-c", "cat > /dev/null"], 5000)
            .run(&source, &shm)
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Accepted);
    }

    #[test]
    fn early_exit_while_writing_stdin_is_tolerated() {
        let shm = CoverageShm::new().unwrap();
        let source = "x".repeat(1 << 20);
        let outcome = sandbox(&["sh", "-c", "exit 7"], 2000)
            .run(&source, &shm)
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Rejected { code: 7 });
    }
}
