// First-divergence comparison of two traces
//
// Positional only: no fuzzy matching and no resynchronization after a
// mismatch. `boundThis` is not compared.

use crate::recorder::ApiRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of the record differed first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DivergenceKind {
    Name,
    Arguments,
    Result,
    /// Baseline has no record at this position
    BaselineEnded,
    /// Candidate has no record at this position
    CandidateEnded,
}

/// First position at which two traces differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub index: usize,
    pub kind: DivergenceKind,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            DivergenceKind::Name => "api name differs",
            DivergenceKind::Arguments => "arguments differ",
            DivergenceKind::Result => "result differs",
            DivergenceKind::BaselineEnded => "baseline trace ended",
            DivergenceKind::CandidateEnded => "candidate trace ended",
        };
        write!(f, "{} at record {}", what, self.index)
    }
}

/// Find the first divergence between two traces, if any.
pub fn compare_records(baseline: &[ApiRecord], candidate: &[ApiRecord]) -> Option<Divergence> {
    let longest = baseline.len().max(candidate.len());

    (0..longest).find_map(|index| {
        let kind = match (baseline.get(index), candidate.get(index)) {
            (Some(b), Some(c)) if b.name != c.name => DivergenceKind::Name,
            (Some(b), Some(c)) if b.arguments_list != c.arguments_list => DivergenceKind::Arguments,
            (Some(b), Some(c)) if b.result != c.result => DivergenceKind::Result,
            (Some(_), Some(_)) => return None,
            (None, _) => DivergenceKind::BaselineEnded,
            (_, None) => DivergenceKind::CandidateEnded,
        };
        Some(Divergence { index, kind })
    })
}
