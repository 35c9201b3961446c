//! Running what the compiler produced, and keeping what broke it.

use crate::ExecError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Result of executing a compiled candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactVerdict {
    /// The program printed the expected value.
    Matches,
    /// The program ran but printed something else — a miscompilation.
    Mismatch { actual: i32 },
    /// The program crashed or exited nonzero or printed garbage.
    Broken { detail: String },
    /// The program overran its wall-clock budget.
    TimedOut,
}

/// Assembles the compiler's output and executes the resulting binary.
///
/// The valid engine's oracle: whatever the transformations did, the
/// binary must print the program's target value.
#[derive(Debug, Clone)]
pub struct ArtifactRunner {
    /// Assembler/linker command, e.g. `["g++", "prog.s", "-o", "prog"]`.
    pub assemble: Vec<String>,
    /// The binary the assemble step produces.
    pub binary: PathBuf,
    /// Wall-clock budget for the executed binary.
    pub timeout: Duration,
}

impl ArtifactRunner {
    /// Assemble, execute, and compare the printed integer to `expected`.
    pub fn check(&self, expected: i32) -> Result<ArtifactVerdict, ExecError> {
        if self.assemble.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        let status = Command::new(&self.assemble[0])
            .args(&self.assemble[1..])
            .stdin(Stdio::null())
            .status()?;
        if !status.success() {
            // The compiler claimed success but produced an artifact the
            // assembler rejects; that is an engine-environment problem,
            // not a scored outcome.
            return Err(ExecError::AssembleFailed { status });
        }

        let mut child = Command::new(&self.binary)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait()?;
                        return Ok(ArtifactVerdict::TimedOut);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        };

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            pipe.read_to_string(&mut stdout)?;
        }

        if !status.success() {
            return Ok(ArtifactVerdict::Broken {
                detail: format!("exited with {status}"),
            });
        }

        match stdout.trim().parse::<i32>() {
            Ok(actual) if actual == expected => Ok(ArtifactVerdict::Matches),
            Ok(actual) => Ok(ArtifactVerdict::Mismatch { actual }),
            Err(_) => Ok(ArtifactVerdict::Broken {
                detail: format!("unparsable output: {:?}", stdout.trim()),
            }),
        }
    }
}

/// Write a reproducer under `dir` as `<unix-seconds>-<pid>.<ext>` and
/// return its absolute path.
pub fn persist_reproducer(dir: &Path, source: &str, ext: &str) -> Result<PathBuf, ExecError> {
    std::fs::create_dir_all(dir)?;

    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let path = dir.join(format!("{secs}-{}.{ext}", std::process::id()));
    std::fs::write(&path, source)?;
    Ok(std::fs::canonicalize(&path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script_binary(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("prog");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn runner(binary: PathBuf) -> ArtifactRunner {
        ArtifactRunner {
            assemble: vec!["true".to_string()],
            binary,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn matching_output_passes() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script_binary(dir.path(), "echo 7");
        assert_eq!(runner(binary).check(7).unwrap(), ArtifactVerdict::Matches);
    }

    #[test]
    fn wrong_output_is_a_miscompilation() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script_binary(dir.path(), "echo 8");
        assert_eq!(
            runner(binary).check(7).unwrap(),
            ArtifactVerdict::Mismatch { actual: 8 }
        );
    }

    #[test]
    fn negative_values_parse() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script_binary(dir.path(), "echo -2147483648");
        assert_eq!(
            runner(binary).check(i32::MIN).unwrap(),
            ArtifactVerdict::Matches
        );
    }

    #[test]
    fn garbage_output_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script_binary(dir.path(), "echo pancake");
        assert!(matches!(
            runner(binary).check(0).unwrap(),
            ArtifactVerdict::Broken { .. }
        ));
    }

    #[test]
    fn nonzero_exit_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script_binary(dir.path(), "echo 7; exit 2");
        assert!(matches!(
            runner(binary).check(7).unwrap(),
            ArtifactVerdict::Broken { .. }
        ));
    }

    #[test]
    fn hung_binary_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script_binary(dir.path(), "sleep 10");
        let mut r = runner(binary);
        r.timeout = Duration::from_millis(100);
        assert_eq!(r.check(0).unwrap(), ArtifactVerdict::TimedOut);
    }

    #[test]
    fn failed_assembly_is_an_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script_binary(dir.path(), "echo 0");
        let mut r = runner(binary);
        r.assemble = vec!["false".to_string()];
        assert!(matches!(
            r.check(0),
            Err(ExecError::AssembleFailed { .. })
        ));
    }

    #[test]
    fn reproducer_name_has_seconds_and_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = persist_reproducer(dir.path(), "int main() {}\n", "cc").unwrap();

        assert!(path.is_absolute());
        let name = path.file_name().unwrap().to_str().unwrap();
        let (stem, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "cc");
        let (secs, pid) = stem.split_once('-').unwrap();
        assert!(secs.parse::<u64>().is_ok());
        assert_eq!(pid.parse::<u32>().unwrap(), std::process::id());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "int main() {}\n");
    }
}
