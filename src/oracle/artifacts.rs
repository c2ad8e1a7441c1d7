// Divergence diagnostics: trace dumps, line diff, implicated APIs, artifact files
//
// Traces are dumped one record per line (JSON Lines) so a line diff isolates
// whole records. The implicated API set is every distinct name appearing on an
// inserted or deleted line.

use crate::error::OracleError;
use crate::recorder::ApiRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Lines of unchanged context around each hunk in the diff artifact
const CONTEXT_RADIUS: usize = 3;

fn record_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""name":"(.*?)","argumentsList""#).expect("record name regex"))
}

/// Serialize a trace as JSON Lines, one record per line.
pub fn dump_records(records: &[ApiRecord]) -> String {
    let mut dump = String::new();
    for record in records {
        // ApiRecord holds only strings; serialization cannot fail
        if let Ok(line) = serde_json::to_string(record) {
            dump.push_str(&line);
            dump.push('\n');
        }
    }
    dump
}

/// API names mentioned in dump text
pub fn extract_diff_apis(text: &str) -> BTreeSet<String> {
    record_name_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Line diff between two dumps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceDiff {
    /// Unified diff, baseline on the left
    pub unified: String,
    /// Distinct API names on added or removed lines
    pub diff_apis: BTreeSet<String>,
}

impl TraceDiff {
    pub fn compute(baseline_dump: &str, candidate_dump: &str) -> Self {
        let diff = TextDiff::from_lines(baseline_dump, candidate_dump);

        let mut diff_apis = BTreeSet::new();
        for change in diff.iter_all_changes() {
            if change.tag() != ChangeTag::Equal {
                diff_apis.extend(extract_diff_apis(change.value()));
            }
        }

        let unified = diff
            .unified_diff()
            .context_radius(CONTEXT_RADIUS)
            .header("without-script", "with-script")
            .to_string();

        TraceDiff { unified, diff_apis }
    }
}

/// Artifact files written for one diverging case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPaths {
    pub path_to_record_without_script: PathBuf,
    pub path_to_record_with_script: PathBuf,
    pub path_to_record_diff: PathBuf,
}

impl ArtifactPaths {
    /// Names beside `case`, prefixed with the case's base name
    pub fn for_case(case: &Path) -> Self {
        let dir = case.parent().unwrap_or_else(|| Path::new("."));
        let stem = case
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "case".to_string());

        ArtifactPaths {
            path_to_record_without_script: dir.join(format!("{stem}-without-script.txt")),
            path_to_record_with_script: dir.join(format!("{stem}-with-script.txt")),
            path_to_record_diff: dir.join(format!("{stem}-resultDiff.txt")),
        }
    }
}

/// Dump both full traces, diff them, and persist all three artifacts.
pub fn write_artifacts(
    case: &Path,
    baseline: &[ApiRecord],
    candidate: &[ApiRecord],
) -> Result<(ArtifactPaths, TraceDiff), OracleError> {
    let baseline_dump = dump_records(baseline);
    let candidate_dump = dump_records(candidate);
    let diff = TraceDiff::compute(&baseline_dump, &candidate_dump);
    let paths = ArtifactPaths::for_case(case);

    for (path, contents) in [
        (&paths.path_to_record_without_script, &baseline_dump),
        (&paths.path_to_record_with_script, &candidate_dump),
        (&paths.path_to_record_diff, &diff.unified),
    ] {
        std::fs::write(path, contents).map_err(|source| OracleError::Artifact {
            path: path.clone(),
            source,
        })?;
    }

    tracing::debug!(
        case = %case.display(),
        diff = %paths.path_to_record_diff.display(),
        "wrote divergence artifacts"
    );

    Ok((paths, diff))
}
