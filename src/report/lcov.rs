// file: src/report/lcov.rs
// version: 1.0.0
// guid: 5e939828-1037-460c-8243-68687e64eb5c

//! LCOV tracefile summary parsing

use crate::error::WatchError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::trace;

/// Aggregated totals of an LCOV tracefile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LcovSummary {
    pub files: usize,
    pub lines_found: u64,
    pub lines_hit: u64,
    pub branches_found: u64,
    pub branches_hit: u64,
    pub functions_found: u64,
    pub functions_hit: u64,
}

/// Totals for a single `SF:` record. Explicit `LF`/`LH`-style summary lines
/// win over counts derived from the detail records.
#[derive(Default)]
struct RecordTotals {
    lines_found: Option<u64>,
    lines_hit: Option<u64>,
    branches_found: Option<u64>,
    branches_hit: Option<u64>,
    functions_found: Option<u64>,
    functions_hit: Option<u64>,

    counted_lines_found: u64,
    counted_lines_hit: u64,
    counted_branches_found: u64,
    counted_branches_hit: u64,
    counted_functions_found: u64,
    counted_functions_hit: u64,
}

impl LcovSummary {
    /// Parse LCOV text. Unknown or malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut summary = Self::default();
        let mut record: Option<RecordTotals> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if line == "end_of_record" {
                if let Some(totals) = record.take() {
                    summary.add_record(totals);
                }
                continue;
            }

            let Some((tag, value)) = line.split_once(':') else {
                trace!("Skipping LCOV line without a tag: {}", line);
                continue;
            };

            if tag == "SF" {
                if let Some(totals) = record.take() {
                    summary.add_record(totals);
                }
                summary.files += 1;
                record = Some(RecordTotals::default());
                continue;
            }

            let Some(totals) = record.as_mut() else {
                continue;
            };

            match tag {
                "DA" => {
                    let mut fields = value.split(',');
                    if let (Some(_line_no), Some(count)) = (fields.next(), fields.next()) {
                        if let Ok(count) = count.trim().parse::<u64>() {
                            totals.counted_lines_found += 1;
                            if count > 0 {
                                totals.counted_lines_hit += 1;
                            }
                        }
                    }
                }
                "BRDA" => {
                    if let Some(taken) = value.split(',').nth(3) {
                        totals.counted_branches_found += 1;
                        if taken.trim().parse::<u64>().map(|n| n > 0).unwrap_or(false) {
                            totals.counted_branches_hit += 1;
                        }
                    }
                }
                "FN" => totals.counted_functions_found += 1,
                "FNDA" => {
                    if let Some((count, _name)) = value.split_once(',') {
                        if count.trim().parse::<u64>().map(|n| n > 0).unwrap_or(false) {
                            totals.counted_functions_hit += 1;
                        }
                    }
                }
                "LF" => totals.lines_found = value.trim().parse().ok(),
                "LH" => totals.lines_hit = value.trim().parse().ok(),
                "BRF" => totals.branches_found = value.trim().parse().ok(),
                "BRH" => totals.branches_hit = value.trim().parse().ok(),
                "FNF" => totals.functions_found = value.trim().parse().ok(),
                "FNH" => totals.functions_hit = value.trim().parse().ok(),
                _ => {}
            }
        }

        // tolerate a missing trailing end_of_record
        if let Some(totals) = record.take() {
            summary.add_record(totals);
        }

        summary
    }

    /// Read and parse a tracefile
    pub async fn from_file(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            WatchError::report(format!(
                "Failed to read coverage report {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::parse(&text))
    }

    fn add_record(&mut self, totals: RecordTotals) {
        // totals come straight from the tracefile and may be arbitrarily large
        let add = |acc: &mut u64, explicit: Option<u64>, counted: u64| {
            *acc = acc.saturating_add(explicit.unwrap_or(counted));
        };
        add(&mut self.lines_found, totals.lines_found, totals.counted_lines_found);
        add(&mut self.lines_hit, totals.lines_hit, totals.counted_lines_hit);
        add(&mut self.branches_found, totals.branches_found, totals.counted_branches_found);
        add(&mut self.branches_hit, totals.branches_hit, totals.counted_branches_hit);
        add(&mut self.functions_found, totals.functions_found, totals.counted_functions_found);
        add(&mut self.functions_hit, totals.functions_hit, totals.counted_functions_hit);
    }

    pub fn line_percent(&self) -> Option<f64> {
        percent(self.lines_hit, self.lines_found)
    }

    pub fn branch_percent(&self) -> Option<f64> {
        percent(self.branches_hit, self.branches_found)
    }

    pub fn function_percent(&self) -> Option<f64> {
        percent(self.functions_hit, self.functions_found)
    }
}

fn percent(hit: u64, found: u64) -> Option<f64> {
    if found == 0 {
        None
    } else {
        Some(hit as f64 * 100.0 / found as f64)
    }
}

impl std::fmt::Display for LcovSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |p: Option<f64>| match p {
            Some(p) => format!("{:.1}%", p),
            None => "n/a".to_string(),
        };
        write!(
            f,
            "lines {} ({}/{}), functions {}, branches {} across {} files",
            show(self.line_percent()),
            self.lines_hit,
            self.lines_found,
            show(self.function_percent()),
            show(self.branch_percent()),
            self.files
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LLVM_COV_SAMPLE: &str = "\
SF:/work/src/lib.rs
FN:3,add
FN:8,unused
FNDA:4,add
FNDA:0,unused
FNF:2
FNH:1
DA:3,4
DA:4,4
DA:8,0
DA:9,0
BRF:0
BRH:0
LF:4
LH:2
end_of_record
SF:/work/src/main.rs
FN:1,main
FNDA:1,main
FNF:1
FNH:1
DA:1,1
DA:2,1
LF:2
LH:2
end_of_record
";

    #[test]
    fn test_huge_totals_saturate() {
        let text = format!(
            "SF:a.rs\nLF:{max}\nLH:{max}\nend_of_record\nSF:b.rs\nLF:{max}\nLH:1\nend_of_record\n",
            max = u64::MAX
        );
        let summary = LcovSummary::parse(&text);
        assert_eq!(summary.files, 2);
        assert_eq!(summary.lines_found, u64::MAX);
        assert_eq!(summary.lines_hit, u64::MAX);
    }

    #[test]
    fn test_parse_uses_summary_lines() {
        let summary = LcovSummary::parse(LLVM_COV_SAMPLE);
        assert_eq!(summary.files, 2);
        assert_eq!(summary.lines_found, 6);
        assert_eq!(summary.lines_hit, 4);
        assert_eq!(summary.functions_found, 3);
        assert_eq!(summary.functions_hit, 2);
        assert_eq!(summary.branch_percent(), None);
    }

    #[test]
    fn test_parse_counts_detail_records_when_totals_missing() {
        let text = "\
SF:src/lib.rs
DA:1,3
DA:2,0
DA:3,1
BRDA:2,0,0,1
BRDA:2,0,1,-
BRDA:2,0,2,0
end_of_record
";
        let summary = LcovSummary::parse(text);
        assert_eq!(summary.lines_found, 3);
        assert_eq!(summary.lines_hit, 2);
        assert_eq!(summary.branches_found, 3);
        assert_eq!(summary.branches_hit, 1);
    }

    #[test]
    fn test_parse_tolerates_garbage_and_missing_end() {
        let text = "TN:\nnonsense\nSF:a.rs\nDA:1,x\nDA:2,5\nLH:not-a-number\n";
        let summary = LcovSummary::parse(text);
        assert_eq!(summary.files, 1);
        assert_eq!(summary.lines_found, 1);
        assert_eq!(summary.lines_hit, 1);
    }

    #[test]
    fn test_percentages() {
        let summary = LcovSummary::parse(LLVM_COV_SAMPLE);
        let lines = summary.line_percent().unwrap();
        assert!((lines - 66.666).abs() < 0.01);
        assert_eq!(LcovSummary::default().line_percent(), None);
    }

    #[test]
    fn test_display() {
        let summary = LcovSummary::parse(LLVM_COV_SAMPLE);
        let rendered = summary.to_string();
        assert!(rendered.starts_with("lines 66.7% (4/6)"));
        assert!(rendered.contains("branches n/a"));
        assert!(rendered.ends_with("across 2 files"));
    }

    #[tokio::test]
    async fn test_from_file_missing_is_report_error() {
        let err = LcovSummary::from_file(Path::new("/no/such/lcov.info"))
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::Report(_)));
    }
}
