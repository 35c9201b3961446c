//! Classification of one compiler run.

/// How a compiler child ended, after timeout handling and diagnostic
/// matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Clean exit 0 — the program was accepted.
    Accepted,
    /// Nonzero exit without an internal-failure signature: the candidate
    /// was rejected and costs nothing beyond the execution.
    Rejected { code: i32 },
    /// An internal compiler error matching the benign deny-list; dropped
    /// silently.
    IgnoredIce,
    /// An internal compiler error not on the deny-list — a defect worth a
    /// reproducer.
    CandidateIce,
    /// Terminated by a signal the engine did not send.
    Crashed { signal: i32 },
    /// Killed by the engine at the wall-clock deadline; treated as a
    /// rejection by the schedulers.
    TimedOut,
}

impl RunStatus {
    /// Whether this outcome should stop the engine with a reproducer.
    pub fn is_defect(&self) -> bool {
        matches!(self, RunStatus::CandidateIce | RunStatus::Crashed { .. })
    }
}

/// One classified run plus the bounded diagnostic capture.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub stderr: String,
}

/// Marker every internal compiler error carries on its diagnostic stream.
const ICE_MARKER: &str = "internal compiler error";

/// Substring fingerprints for already-reported internal errors.
///
/// A fingerprint is a conjunction: every part must occur in the
/// diagnostic text for the fingerprint to match. Diagnostics that contain
/// the ICE marker but match no fingerprint are candidate defects.
#[derive(Debug, Clone)]
pub struct IceFilter {
    fingerprints: Vec<Vec<String>>,
}

impl Default for IceFilter {
    /// The deny-list accumulated against GCC so far.
    fn default() -> Self {
        let single = [
            "types may not be defined in parameter types",
            "internal compiler error: in synthesize_implicit_template_parm",
            "internal compiler error: in search_anon_aggr",
            "non_type_check",
            "internal compiler error: in xref_basetypes, at",
            "internal compiler error: in build_capture_proxy",
            "internal compiler error: tree check: expected record_type or union_type \
             or qual_union_type, have array_type in reduced_constant_expression_p",
            "gimplification failed",
        ];
        let mut fingerprints: Vec<Vec<String>> =
            single.iter().map(|s| vec![s.to_string()]).collect();
        fingerprints.push(vec![
            "unexpected expression".to_string(),
            "of kind asm_expr".to_string(),
        ]);
        IceFilter { fingerprints }
    }
}

impl IceFilter {
    /// A filter that ignores nothing; every ICE is a candidate.
    pub fn empty() -> Self {
        IceFilter {
            fingerprints: Vec::new(),
        }
    }

    /// Add a fingerprint: the conjunction of `parts`.
    pub fn add(&mut self, parts: Vec<String>) {
        if !parts.is_empty() {
            self.fingerprints.push(parts);
        }
    }

    /// Classify a nonzero-exit diagnostic stream.
    pub fn classify(&self, stderr: &str) -> IceVerdict {
        if !stderr.contains(ICE_MARKER) {
            return IceVerdict::NotIce;
        }
        let benign = self
            .fingerprints
            .iter()
            .any(|parts| parts.iter().all(|p| stderr.contains(p.as_str())));
        if benign {
            IceVerdict::Benign
        } else {
            IceVerdict::Candidate
        }
    }
}

/// Result of matching a diagnostic stream against the deny-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceVerdict {
    /// No internal-failure signature at all.
    NotIce,
    /// A known, already-reported internal error.
    Benign,
    /// An internal error worth surfacing.
    Candidate,
}
