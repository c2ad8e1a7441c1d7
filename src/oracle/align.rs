// Trace alignment on the anchor record
//
// Both traces start with initialization that does not depend on the candidate
// script, and the candidate trace may carry extra records from the script's
// own setup. Everything before the first anchor record is dropped from each
// trace independently.

use crate::recorder::ApiRecord;
use serde::{Deserialize, Serialize};

/// First script-independent record emitted by the generator's template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Anchor {
    /// Substring of the record's member path
    pub name: String,
    /// Exact canonical argument list
    pub arguments: String,
}

impl Default for Anchor {
    fn default() -> Self {
        Self {
            name: "getElementById".to_string(),
            arguments: r#"["htmlvar00001"]"#.to_string(),
        }
    }
}

impl Anchor {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn matches(&self, record: &ApiRecord) -> bool {
        record.name.contains(&self.name) && record.arguments_list == self.arguments
    }

    /// Index of the first anchor record
    pub fn position(&self, records: &[ApiRecord]) -> Option<usize> {
        records.iter().position(|record| self.matches(record))
    }
}

/// Drop every record before the anchor.
///
/// A trace without the anchor is compared from the start.
pub fn trim_records<'a>(records: &'a [ApiRecord], anchor: &Anchor) -> &'a [ApiRecord] {
    match anchor.position(records) {
        Some(start) => &records[start..],
        None => {
            tracing::debug!(
                anchor = %anchor.name,
                records = records.len(),
                "anchor not found, comparing from index 0"
            );
            records
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, args: &str) -> ApiRecord {
        ApiRecord::new(name, args, "{}", "null")
    }

    #[test]
    fn test_default_anchor() {
        let anchor = Anchor::default();
        assert!(anchor.matches(&record(
            "globalThis.Document.prototype.getElementById",
            r#"["htmlvar00001"]"#
        )));
        assert!(!anchor.matches(&record(
            "globalThis.Document.prototype.getElementById",
            r#"["htmlvar00002"]"#
        )));
        assert!(!anchor.matches(&record(
            "globalThis.Document.prototype.querySelector",
            r#"["htmlvar00001"]"#
        )));
    }

    #[test]
    fn test_trim_drops_prefix() {
        let records = vec![
            record("globalThis.Math.random", "[]"),
            record("globalThis.Document.prototype.getElementById", r#"["htmlvar00001"]"#),
            record("globalThis.Math.max", "[1,2]"),
        ];
        let trimmed = trim_records(&records, &Anchor::default());
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed[1].name, "globalThis.Math.max");
    }

    #[test]
    fn test_missing_anchor_keeps_everything() {
        let records = vec![record("globalThis.Math.max", "[1,2]")];
        assert_eq!(trim_records(&records, &Anchor::default()), &records[..]);
        assert!(trim_records(&[], &Anchor::default()).is_empty());
    }

    #[test]
    fn test_first_anchor_wins() {
        let anchor = Anchor::new("getElementById", r#"["a"]"#);
        let records = vec![
            record("globalThis.Document.prototype.getElementById", r#"["a"]"#),
            record("globalThis.Math.max", "[]"),
            record("globalThis.Document.prototype.getElementById", r#"["a"]"#),
        ];
        assert_eq!(anchor.position(&records), Some(0));
    }
}
