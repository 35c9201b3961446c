//! Session reports and the defects that end them.

use std::fmt;
use std::path::PathBuf;

/// What kind of compiler defect stopped the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefectKind {
    /// Internal compiler error not on the benign deny-list.
    Ice,
    /// The compiler died on a signal it was not sent.
    Crash { signal: i32 },
    /// The valid engine's compiler rejected a program that is valid by
    /// construction.
    Rejection { code: i32 },
    /// The compiled program did not print its target value.
    Miscompilation { detail: String },
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefectKind::Ice => write!(f, "internal compiler error"),
            DefectKind::Crash { signal } => write!(f, "compiler killed by signal {signal}"),
            DefectKind::Rejection { code } => {
                write!(f, "valid program rejected with exit code {code}")
            }
            DefectKind::Miscompilation { detail } => write!(f, "miscompilation: {detail}"),
        }
    }
}

/// A defect with its persisted reproducer.
#[derive(Debug, Clone)]
pub struct Defect {
    pub kind: DefectKind,
    pub reproducer: PathBuf,
    /// Bounded diagnostic capture from the offending run.
    pub stderr: String,
}

/// Counters for one fuzzing session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub engine: &'static str,
    pub nr_execs: u64,
    pub total_bits: usize,
    /// Queue length (grammar) or live corpus size (valid).
    pub corpus_size: usize,
    pub restarts: u32,
}

/// Format a session report for human consumption.
pub fn format_report(stats: &SessionStats, defect: Option<&Defect>) -> String {
    let mut out = String::new();

    out.push_str("═══════════════════════════════════════════════════════════════════════\n");
    out.push_str("  icehunt session report\n");
    out.push_str("═══════════════════════════════════════════════════════════════════════\n\n");

    out.push_str(&format!("Engine:           {}\n", stats.engine));
    out.push_str(&format!("Executions:       {}\n", stats.nr_execs));
    out.push_str(&format!("Unique bits:      {}\n", stats.total_bits));
    out.push_str(&format!("Corpus size:      {}\n", stats.corpus_size));
    out.push_str(&format!("Restarts:         {}\n", stats.restarts));
    out.push('\n');

    match defect {
        Some(defect) => {
            out.push_str(
                "─── Defect ─────────────────────────────────────────────────────────────\n",
            );
            out.push_str(&format!("Kind:             {}\n", defect.kind));
            out.push_str(&format!(
                "Reproducer:       {}\n",
                defect.reproducer.display()
            ));
            if !defect.stderr.is_empty() {
                out.push_str("\nDiagnostics:\n");
                for line in defect.stderr.lines().take(20) {
                    out.push_str(&format!("  {line}\n"));
                }
            }
        }
        None => {
            out.push_str(
                "─── No Defect Found ────────────────────────────────────────────────────\n",
            );
        }
    }

    out.push_str("═══════════════════════════════════════════════════════════════════════\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> SessionStats {
        SessionStats {
            engine: "grammar",
            nr_execs: 1234,
            total_bits: 567,
            corpus_size: 89,
            restarts: 2,
        }
    }

    #[test]
    fn report_without_defect() {
        let formatted = format_report(&stats(), None);
        assert!(formatted.contains("Executions:       1234"));
        assert!(formatted.contains("Unique bits:      567"));
        assert!(formatted.contains("No Defect Found"));
    }

    #[test]
    fn report_with_defect_shows_reproducer_and_diagnostics() {
        let defect = Defect {
            kind: DefectKind::Ice,
            reproducer: PathBuf::from("/tmp/output/1700000000-42.cc"),
            stderr: "internal compiler error: in foo\nplease report\n".to_string(),
        };
        let formatted = format_report(&stats(), Some(&defect));
        assert!(formatted.contains("internal compiler error"));
        assert!(formatted.contains("/tmp/output/1700000000-42.cc"));
        assert!(formatted.contains("  please report"));
    }

    #[test]
    fn defect_kinds_render() {
        assert_eq!(
            DefectKind::Crash { signal: 11 }.to_string(),
            "compiler killed by signal 11"
        );
        assert_eq!(
            DefectKind::Rejection { code: 1 }.to_string(),
            "valid program rejected with exit code 1"
        );
        assert!(DefectKind::Miscompilation {
            detail: "printed 3, expected 7".to_string()
        }
        .to_string()
        .contains("printed 3"));
    }
}
