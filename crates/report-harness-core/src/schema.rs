//! Schema matchers for compact tables.
//!
//! A compact block is tokenized into alternating text and value runs:
//!
//! ```text
//! RatioValueInterpretationGross Margin | 46.5% | Industry-leadingNet Margin | 23.5% | Exceptional
//!  ^ header terms + first label           ^values  ^ interpretation + next label          ^ trailing
//! ```
//!
//! Each [`TableMatcher`] interprets that token stream under one table
//! shape and either returns a grid or declines. The reconstructor tries
//! matchers in order and keeps the first plausible grid.

use regex::Regex;
use std::sync::LazyLock;

use crate::table::TableBlock;

/// Minimum and maximum header width accepted from any matcher.
pub const MIN_COLUMNS: usize = 2;
pub const MAX_COLUMNS: usize = 6;
/// Longest header cell accepted from any matcher.
pub const MAX_HEADER_CELL_LEN: usize = 40;

/// Lowercase-initial product names that must not be split at their
/// internal capital.
const LOWER_INITIAL_NAMES: &[&str] = &["iPhone", "iPad", "iPod", "iMac", "iCloud", "iOS", "eBay"];

const RATIO_FIRST_COLUMNS: &[&str] = &["ratio", "metric", "multiple", "valuation", "measure"];
const RATIO_TEXT_COLUMNS: &[&str] = &[
    "interpretation",
    "assessment",
    "comment",
    "commentary",
    "signal",
    "implication",
];

static RE_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"[~<>≈]?\d+(?:\.\d+)?[–\-]\d+(?:\.\d+)?%",
        r"|[~<>≈]?[+\-]?\$?\d+(?:,\d{3})*(?:\.\d+)?(?:bps|[BMKT]|x|%)?",
    ))
    .unwrap()
});

/// One table shape that a compact block may follow.
pub trait TableMatcher: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Try to read `text` as this shape.
    fn attempt(&self, text: &str) -> Option<TableBlock>;
}

/// The built-in matchers, in priority order.
pub fn default_matchers() -> Vec<Box<dyn TableMatcher>> {
    vec![
        Box::new(FinancialMetricsMatcher),
        Box::new(RatioValuationMatcher),
        Box::new(MarketShareMatcher),
    ]
}

/// Header of 2–6 short non-empty cells, at least one row, every row
/// labelled.
pub fn is_plausible(table: &TableBlock) -> bool {
    let header = table.header();
    (MIN_COLUMNS..=MAX_COLUMNS).contains(&header.len())
        && header
            .iter()
            .all(|h| !h.is_empty() && h.chars().count() <= MAX_HEADER_CELL_LEN)
        && !table.rows().is_empty()
        && table
            .rows()
            .iter()
            .all(|r| r.first().is_some_and(|c| !c.is_empty()))
}

/// Label plus one to three values per row, nothing after the last value.
///
/// ```text
/// SegmentRevenueYoY GrowthiPhone$44.6B+13.5%Services$27.4B+13.3%
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FinancialMetricsMatcher;

impl TableMatcher for FinancialMetricsMatcher {
    fn name(&self) -> &str {
        "financial_metrics"
    }

    fn attempt(&self, text: &str) -> Option<TableBlock> {
        let stream = tokenize(text);
        if !stream.trailing.is_empty() {
            return None;
        }
        let k = stream.uniform_width()?;
        if !(1..=3).contains(&k) {
            return None;
        }

        let (header, first_label, _) = split_header(&stream.groups[0].text, k + 1)?;
        let mut rows = Vec::with_capacity(stream.groups.len());
        for (i, group) in stream.groups.iter().enumerate() {
            let label = if i == 0 {
                first_label.clone()
            } else {
                split_glued_terms(&group.text).join(" ")
            };
            let mut row = vec![label];
            row.extend(group.values.iter().cloned());
            rows.push(row);
        }
        TableBlock::new(header, rows)
    }
}

/// Label, value, optional peer value, free-text interpretation.
///
/// ```text
/// RatioValueInterpretationGross Margin46.5%Industry-leadingNet Margin23.5%Exceptional
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RatioValuationMatcher;

impl TableMatcher for RatioValuationMatcher {
    fn name(&self) -> &str {
        "ratio_valuation"
    }

    fn attempt(&self, text: &str) -> Option<TableBlock> {
        let stream = tokenize(text);
        let k = stream.uniform_width()?;
        if !(1..=2).contains(&k) {
            return None;
        }
        let table = rows_with_trailing_text(&stream, k + 2)?;

        let header = table.header();
        let lower: Vec<String> = header.iter().map(|h| h.to_lowercase()).collect();
        if lower.iter().any(|h| h.contains("share")) {
            return None;
        }
        let first_ok = RATIO_FIRST_COLUMNS.iter().any(|c| lower[0].contains(c));
        let text_ok = lower
            .iter()
            .any(|h| RATIO_TEXT_COLUMNS.iter().any(|c| h.contains(c)));
        (first_ok || text_ok).then_some(table)
    }
}

/// Label, percentage (or percentage range), free-text products.
///
/// ```text
/// CompanyMarket ShareKey ProductsNVIDIA80-85%H100 GPUsAMD10-15%MI300 series
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketShareMatcher;

impl TableMatcher for MarketShareMatcher {
    fn name(&self) -> &str {
        "market_share"
    }

    fn attempt(&self, text: &str) -> Option<TableBlock> {
        let stream = tokenize(text);
        if stream.uniform_width()? != 1 {
            return None;
        }
        if !stream
            .groups
            .iter()
            .all(|g| g.values.iter().all(|v| v.contains('%')))
        {
            return None;
        }
        let table = rows_with_trailing_text(&stream, 3)?;
        table
            .header()
            .iter()
            .any(|h| h.to_lowercase().contains("share"))
            .then_some(table)
    }
}

/// Text run followed by the values that came right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Group {
    text: String,
    values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TokenStream {
    groups: Vec<Group>,
    trailing: String,
}

impl TokenStream {
    /// Common value count of every group, if there is one.
    fn uniform_width(&self) -> Option<usize> {
        let first = self.groups.first()?;
        if first.text.is_empty() {
            return None;
        }
        let k = first.values.len();
        self.groups
            .iter()
            .all(|g| g.values.len() == k)
            .then_some(k)
    }
}

fn value_spans(text: &str) -> Vec<(usize, usize)> {
    RE_VALUE
        .find_iter(text)
        .filter(|m| !is_identifier_digits(text, m.start(), m.as_str()))
        .map(|m| (m.start(), m.end()))
        .collect()
}

/// Bare digits glued to a capital (`Q2`, `FY2026`, `H100`) belong to a name.
fn is_identifier_digits(text: &str, start: usize, token: &str) -> bool {
    let bare = token.chars().all(|c| c.is_ascii_digit());
    let after_capital = text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_uppercase());
    bare && after_capital
}

fn tokenize(text: &str) -> TokenStream {
    let mut groups: Vec<Group> = Vec::new();
    let mut cursor = 0;

    for (start, end) in value_spans(text) {
        let gap = text[cursor..start].trim();
        let value = text[start..end].to_string();
        cursor = end;
        if gap.is_empty() {
            if let Some(group) = groups.last_mut() {
                group.values.push(value);
                continue;
            }
        }
        groups.push(Group {
            text: gap.to_string(),
            values: vec![value],
        });
    }

    TokenStream {
        groups,
        trailing: text[cursor..].trim().to_string(),
    }
}

/// First `columns` terms of the header run, then the remaining terms as
/// the first row's label. Also returns the label's term count.
fn split_header(text: &str, columns: usize) -> Option<(Vec<String>, String, usize)> {
    let terms = split_glued_terms(text);
    if terms.len() <= columns {
        return None;
    }
    let header = terms[..columns].to_vec();
    let label_terms = terms.len() - columns;
    Some((header, terms[columns..].join(" "), label_terms))
}

/// Shape shared by the ratio and market-share matchers: every row ends in
/// free text, so each middle text run holds the previous row's text cell
/// followed by the next row's label.
fn rows_with_trailing_text(stream: &TokenStream, columns: usize) -> Option<TableBlock> {
    if stream.trailing.is_empty() {
        return None;
    }
    let (header, first_label, label_terms) = split_header(&stream.groups[0].text, columns)?;

    let mut labels = vec![first_label];
    let mut notes = Vec::with_capacity(stream.groups.len());
    for group in &stream.groups[1..] {
        let terms = split_glued_terms(&group.text);
        if terms.len() < 2 {
            return None;
        }
        let take = label_terms.min(terms.len() - 1);
        let cut = terms.len() - take;
        notes.push(terms[..cut].join(" "));
        labels.push(terms[cut..].join(" "));
    }
    notes.push(split_glued_terms(&stream.trailing).join(" "));

    let rows = stream
        .groups
        .iter()
        .zip(labels)
        .zip(notes)
        .map(|((group, label), note)| {
            let mut row = vec![label];
            row.extend(group.values.iter().cloned());
            row.push(note);
            row
        })
        .collect();
    TableBlock::new(header, rows)
}

/// Split run-together words at case boundaries.
///
/// Breaks where a lowercase run of two or more letters meets a capital
/// (`RevenueGrowth`), where any lowercase letter meets an acronym
/// (`GPUsAMD`) or a slashed abbreviation (`ExceptionalP/E`), where digits
/// meet a capitalized word (`FY2026YoY`), and
/// after a sentence stop or closing parenthesis. Newlines always break.
/// Spaces never break, so `YoY Growth` stays one term.
pub fn split_glued_terms(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut breaks = vec![false; n + 1];
    let mut protected = vec![false; n + 1];

    for name in LOWER_INITIAL_NAMES {
        let pat: Vec<char> = name.chars().collect();
        let mut i = 0;
        while i + pat.len() <= n {
            if chars[i..i + pat.len()] == pat[..] {
                for p in &mut protected[i + 1..i + pat.len()] {
                    *p = true;
                }
                if i > 0 && chars[i - 1].is_alphanumeric() {
                    breaks[i] = true;
                }
                i += pat.len();
            } else {
                i += 1;
            }
        }
    }

    for i in 1..n {
        if protected[i] {
            continue;
        }
        let prev = chars[i - 1];
        let cur = chars[i];
        let next = chars.get(i + 1).copied();

        if prev.is_lowercase() && cur.is_uppercase() {
            let run = chars[..i]
                .iter()
                .rev()
                .take_while(|c| c.is_lowercase())
                .count();
            let acronym = next.is_some_and(char::is_uppercase);
            let slashed = next == Some('/');
            let word = next.is_some_and(char::is_alphanumeric);
            if acronym || slashed || (run >= 2 && word) {
                breaks[i] = true;
            }
        } else if prev.is_ascii_digit() && cur.is_uppercase() {
            if next.is_some_and(char::is_lowercase) {
                breaks[i] = true;
            }
        } else if (prev == ')' || (prev == '.' && i >= 2 && chars[i - 2].is_lowercase()))
            && cur.is_uppercase()
        {
            breaks[i] = true;
        }
    }

    let mut terms = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if breaks[i] || c == '\n' {
            push_term(&mut terms, &current);
            current.clear();
        }
        if c != '\n' {
            current.push(c);
        }
    }
    push_term(&mut terms, &current);
    terms
}

fn push_term(terms: &mut Vec<String>, term: &str) {
    let trimmed = term.trim();
    if !trimmed.is_empty() {
        terms.push(trimmed.to_string());
    }
}
