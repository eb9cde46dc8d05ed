//! Phase outcomes and reports

use std::collections::BTreeSet;
use types::ClassificationKind;

/// One phase's contribution to the verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    pub kind: ClassificationKind,
    /// Phase-local confidence in `[0, 1]`, before weighting.
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub tags: BTreeSet<String>,
}

impl Vote {
    pub fn new(kind: ClassificationKind, confidence: f64) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            evidence: Vec::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_evidence(mut self, line: impl Into<String>) -> Self {
        self.evidence.push(line.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

/// Discriminated phase result. Phases never raise; failure is an
/// abstention.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    Vote(Vote),
    /// Nothing to say about this transfer.
    Abstain,
    /// The event must be dropped entirely (internal exchange move).
    Skip,
}

impl PhaseOutcome {
    pub fn vote(&self) -> Option<&Vote> {
        match self {
            PhaseOutcome::Vote(vote) => Some(vote),
            _ => None,
        }
    }
}

/// A phase outcome annotated with its identity and aggregation weight.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: &'static str,
    pub weight: f64,
    pub outcome: PhaseOutcome,
}

impl PhaseReport {
    pub fn new(phase: &'static str, weight: f64, outcome: PhaseOutcome) -> Self {
        Self {
            phase,
            weight,
            outcome,
        }
    }
}
