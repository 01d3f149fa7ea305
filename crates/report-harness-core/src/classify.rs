//! Line classification for the table reconstructor.
//!
//! A line is one of: blank, heading, fence, pipe row, compact table, or
//! prose. "Compact" lines are tables that lost their delimiters and came
//! out as one run of concatenated labels and values, e.g.
//!
//! ```text
//! SegmentRevenueYoY GrowthiPhone$44.6B+13.5%Services$27.4B+13.3%
//! ```
//!
//! Detection is a weighted score over cheap regex signals:
//!
//! | Signal | Test | Weight |
//! |--------|------|--------|
//! | capitalized clusters | ≥2 `[A-Z][a-z]+[A-Z][a-z]+` | 2 |
//! | value tokens (currency, percentage, `45.2x` multiple) | ≥2 | 2 |
//! | signed percentage deltas | ≥2 | 1 |
//! | long line without connectives | >100 chars | 1 |
//! | number + unit tokens (including `x`) | ≥3 | 1 |
//! | label glued to a value | ≥1 `[a-z][$+-]?\d` | 1 |
//!
//! A line is compact when the score reaches [`COMPACT_THRESHOLD`] and it
//! shows concatenation (a capitalized cluster or a glued value). Prose
//! with three or more connective words and fewer than two numeric tokens
//! is never compact.
//!
//! Two weaker line shapes only count next to a compact run: a camel-case
//! header line with no values ([`is_table_header_line`]) and a short row
//! with a value glued to its label ([`is_compact_row_line`]).

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::table::{is_fence_line, parse_pipe_row};

/// Minimum weighted score for a compact classification.
pub const COMPACT_THRESHOLD: u32 = 3;
/// Lines shorter than this (after trimming) are never compact.
pub const MIN_COMPACT_LEN: usize = 30;
/// Lines longer than this with no connective words score a point.
pub const LONG_LINE_LEN: usize = 100;

const CONNECTIVES: &[&str] = &[
    "the", "is", "are", "was", "were", "will", "has", "have", "and", "with", "that", "this",
    "for", "of", "to", "in",
];

static RE_CLUSTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z][a-z]+[A-Z][a-z]+").unwrap());
static RE_MONEY_PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$%][\d.]+[BMK]?|\d[\d.]*%|\d+(?:\.\d+)?x(?:[^a-z]|$)").unwrap()
});
static RE_DELTA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[+\-]\d+\.?\d*%").unwrap());
static RE_NUMBER_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.?\d*[%$BMK]|\d+(?:\.\d+)?x(?:[^a-z]|$)").unwrap());
static RE_GLUED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z][$+\-]?\d").unwrap());
static RE_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$?\d+(?:[.,]\d+)*%?").unwrap());
static RE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z]+").unwrap());

/// Kind of a single line, as seen by the reconstructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Blank,
    Heading,
    Fence,
    PipeRow,
    Compact,
    Prose,
}

/// Raw signal counts for one line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompactSignals {
    pub clusters: usize,
    pub money_percent: usize,
    pub deltas: usize,
    pub number_units: usize,
    pub glued_values: usize,
    pub connectives: usize,
    pub numeric_tokens: usize,
    pub length: usize,
}

impl CompactSignals {
    /// Weighted score.
    pub fn score(&self) -> u32 {
        let mut score = 0;
        if self.clusters >= 2 {
            score += 2;
        }
        if self.money_percent >= 2 {
            score += 2;
        }
        if self.deltas >= 2 {
            score += 1;
        }
        if self.length > LONG_LINE_LEN && self.connectives == 0 {
            score += 1;
        }
        if self.number_units >= 3 {
            score += 1;
        }
        if self.glued_values >= 1 {
            score += 1;
        }
        score
    }

    /// Sentence-shaped text: plenty of connectives, almost no numbers.
    pub fn is_prose_like(&self) -> bool {
        self.connectives >= 3 && self.numeric_tokens < 2
    }

    pub fn shows_concatenation(&self) -> bool {
        self.clusters >= 1 || self.glued_values >= 1
    }
}

/// Count the compact-table signals of a trimmed line.
pub fn compact_signals(line: &str) -> CompactSignals {
    let line = line.trim();
    let connectives = RE_WORD
        .find_iter(line)
        .filter(|w| {
            let word = w.as_str().to_ascii_lowercase();
            CONNECTIVES.contains(&word.as_str())
        })
        .count();

    CompactSignals {
        clusters: RE_CLUSTER.find_iter(line).count(),
        money_percent: RE_MONEY_PERCENT.find_iter(line).count(),
        deltas: RE_DELTA.find_iter(line).count(),
        number_units: RE_NUMBER_UNIT.find_iter(line).count(),
        glued_values: RE_GLUED.find_iter(line).count(),
        connectives,
        numeric_tokens: RE_NUMERIC.find_iter(line).count(),
        length: line.chars().count(),
    }
}

/// True when `line` looks like a table that lost its delimiters.
pub fn is_compact_table_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.chars().count() < MIN_COMPACT_LEN
        || trimmed.starts_with('#')
        || is_fence_line(trimmed)
        || trimmed.matches('|').count() >= 2
    {
        return false;
    }

    let signals = compact_signals(trimmed);
    if signals.is_prose_like() || !signals.shows_concatenation() {
        return false;
    }
    signals.score() >= COMPACT_THRESHOLD
}

/// Longest line accepted as a detached header.
pub const MAX_HEADER_LINE_LEN: usize = 120;

/// True for a camel-case run of column names on its own line, e.g.
/// `SegmentRevenueYoY GrowthContribution to Total Revenue`.
pub fn is_table_header_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty()
        || trimmed.chars().count() > MAX_HEADER_LINE_LEN
        || trimmed.starts_with('#')
        || trimmed.contains('|')
        || trimmed.ends_with(['.', ':', '?', '!'])
    {
        return false;
    }
    let signals = compact_signals(trimmed);
    signals.clusters >= 1 && signals.numeric_tokens == 0 && signals.connectives <= 1
}

/// True for a short compact row such as `iPhone$44.6B+13.5%47.4%`: a
/// label with a value glued to it and no sentence words.
pub fn is_compact_row_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('#')
        || is_fence_line(trimmed)
        || trimmed.matches('|').count() >= 2
    {
        return false;
    }
    let signals = compact_signals(trimmed);
    signals.glued_values >= 1 && signals.money_percent >= 1 && signals.connectives == 0
}

pub fn classify_line(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        LineKind::Blank
    } else if is_fence_line(trimmed) {
        LineKind::Fence
    } else if trimmed.starts_with('#') {
        LineKind::Heading
    } else if parse_pipe_row(trimmed).is_some() {
        LineKind::PipeRow
    } else if is_compact_table_line(trimmed) {
        LineKind::Compact
    } else {
        LineKind::Prose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_scenario_is_compact() {
        let line = "RatioValueInterpretationGrossMargin75%Exceptional";
        let signals = compact_signals(line);
        assert_eq!(signals.clusters, 2);
        assert!(signals.score() >= COMPACT_THRESHOLD);
        assert_eq!(classify_line(line), LineKind::Compact);
    }

    #[test]
    fn segment_table_is_compact() {
        let line = "SegmentRevenueYoY GrowthContribution to Total RevenueiPhone$44.6B+13.5%47.4%Services$27.4B+13.3%29.1%Mac$8.0B+14.8%8.5%";
        assert_eq!(classify_line(line), LineKind::Compact);
    }

    #[test]
    fn market_share_table_is_compact() {
        let line = "CompanyMarket ShareKey ProductsNVIDIA80-85%H100, Blackwell GPUsAMD10-15%MI300 seriesIntel<5%Gaudi accelerators";
        assert!(is_compact_table_line(line));
    }

    #[test]
    fn prose_is_never_compact() {
        let samples = [
            "The company is expected to grow in the coming year and this is good news for holders.",
            "Management said that the DataCenter and GameStop comparisons are not relevant to the thesis.",
            "Revenue grew 56% to $46.7B while gross margin expanded to 75% in the quarter.",
            "Some normal text here.",
        ];
        for s in samples {
            assert_eq!(classify_line(s), LineKind::Prose, "{s}");
        }
    }

    #[test]
    fn structural_lines() {
        assert_eq!(classify_line("   "), LineKind::Blank);
        assert_eq!(classify_line("## RevenueGrowthMargin $1B $2B $3B"), LineKind::Heading);
        assert_eq!(classify_line("```json"), LineKind::Fence);
        assert_eq!(classify_line("| Metric | Value |"), LineKind::PipeRow);
    }

    #[test]
    fn short_lines_are_not_compact() {
        assert!(!is_compact_table_line("RevenueGrowth$1B$2B"));
    }

    #[test]
    fn valuation_multiples_are_compact() {
        let line = "RatioValueInterpretationP/E Ratio45.2xPremium valuationEV/Sales25.1xElevated vs peers";
        let signals = compact_signals(line);
        assert_eq!(signals.money_percent, 2);
        assert!(signals.score() >= COMPACT_THRESHOLD);
        assert_eq!(classify_line(line), LineKind::Compact);

        assert_eq!(
            classify_line("The stock trades at 45.2x forward earnings versus 30x for peers."),
            LineKind::Prose
        );
    }

    #[test]
    fn long_line_point_needs_more_than_the_limit() {
        let at_limit = CompactSignals {
            length: LONG_LINE_LEN,
            ..Default::default()
        };
        assert_eq!(at_limit.score(), 0);
        let over = CompactSignals {
            length: LONG_LINE_LEN + 1,
            ..Default::default()
        };
        assert_eq!(over.score(), 1);
    }

    #[test]
    fn detached_header_lines() {
        assert!(is_table_header_line(
            "SegmentRevenueYoY GrowthContribution to Total Revenue"
        ));
        assert!(is_table_header_line("CompanyMarket ShareKey Products"));
        assert!(!is_table_header_line("Key ratios:"));
        assert!(!is_table_header_line("DataCenter revenue was $41.1B"));
        assert!(!is_table_header_line(
            "The DataCenter and GameStop comparisons are not relevant"
        ));
    }

    #[test]
    fn short_compact_rows() {
        assert!(is_compact_row_line("iPhone$44.6B+13.5%47.4%"));
        assert!(is_compact_row_line("Mac$8.0B+14.8%8.5%"));
        assert!(!is_compact_row_line("Revenue was $46.7B"));
        assert!(!is_compact_row_line("| Mac | $8.0B |"));
        assert!(!is_compact_row_line("Ratio45 and stuff"));
    }

    #[test]
    fn stray_pipes_disqualify() {
        assert!(!is_compact_table_line(
            "RevenueGrowth | Margin$46.7B+56% | 75%Exceptional trailing"
        ));
    }
}
