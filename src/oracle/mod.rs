// Oracle: decides, per case, whether a candidate script changed behavior or
// performance.
//
// Behavior: both traces are trimmed to their anchor record and walked by
// position; the first mismatch in name, arguments, or result (or a length
// mismatch) is a divergence. On divergence the full traces are dumped, diffed
// line by line, and the APIs on changed lines are reported.
//
// Performance: baseline mean and population std dev against the candidate
// mean; a regression is a slowdown over one std dev or over the threshold.

mod align;
mod analyzer;
mod artifacts;
mod compare;
mod result;
mod stats;

pub use align::{trim_records, Anchor};
pub use analyzer::Oracle;
pub use artifacts::{dump_records, extract_diff_apis, write_artifacts, ArtifactPaths, TraceDiff};
pub use compare::{compare_records, Divergence, DivergenceKind};
pub use result::{BehaviorResult, CaseResult, Finding, PerformanceResult};
pub use stats::{check_durations, summarize, DurationSummary};
