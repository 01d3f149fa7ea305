//! Inline text normalizer.
//!
//! Repairs a single string (a paragraph or a table cell) in three steps:
//!
//! 1. **Emphasis.** Paired `**x**`, `__x__`, `*x*`, `_x_` and `~~x~~`
//!    wrappers are removed, keeping the wrapped text. In
//!    [`NormalizeMode::Prose`] strong emphasis is kept but rewritten to the
//!    single canonical `**x**` form; in [`NormalizeMode::Cell`] all
//!    emphasis is removed.
//! 2. **Split words.** Tokens broken by stray spaces are rejoined through
//!    the [`SplitWordDictionary`].
//! 3. **Whitespace.** Line endings become `\n`, HTML entities are decoded,
//!    detached currency/percent/sign characters are re-attached to their
//!    numbers, runs of spaces collapse, trailing spaces go, and more than
//!    one blank line collapses to one.
//!
//! Each step only ever shortens or rewrites text toward a canonical form,
//! and [`Normalizer::normalize`] applies the steps until the text stops
//! changing, so `normalize(normalize(s)) == normalize(s)`.
//!
//! [`Normalizer::normalize_document`] applies the normalizer to a whole
//! markdown section: prose lines in prose mode, each cell of a pipe row in
//! cell mode, and fenced regions (including quarantined `unparsed` blocks)
//! left byte-for-byte intact.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::dictionary::SplitWordDictionary;
use crate::table::{is_fence_line, is_separator_row, parse_pipe_row, render_row, render_separator};

/// Upper bound on fixpoint passes that do not shrink the text. Shrinking
/// passes are not counted since they cannot repeat forever.
const MAX_PASSES: usize = 16;

static RE_EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\*\*(?P<b1>[^*\n]+?)\*\*|__(?P<b2>[^_\n]+?)__|~~(?P<st>[^~\n]+?)~~|\*(?P<i1>[^*\s][^*\n]*?)\*|\b_(?P<i2>[^_\s][^_\n]*?)_\b",
    )
    .unwrap()
});
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\x{a0}]{2,}").unwrap());
static RE_TRAILING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());
static RE_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static RE_CURRENCY_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$[ \t]+(\d)").unwrap());
static RE_PERCENT_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d)[ \t]+%").unwrap());
static RE_PLUS_GAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[\s(])\+[ \t]+(\d)").unwrap());

const ENTITIES: [(&str, &str); 6] = [
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&amp;", "&"),
];

/// Where a string lives, which decides how emphasis is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// Paragraph text: strong emphasis survives as `**x**`.
    Prose,
    /// Table cell: every emphasis marker is removed.
    Cell,
}

/// Inline text normalizer backed by a split-word table.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    dictionary: SplitWordDictionary,
}

impl Normalizer {
    pub fn new(dictionary: SplitWordDictionary) -> Self {
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &SplitWordDictionary {
        &self.dictionary
    }

    /// Normalize a single string until it reaches a fixpoint.
    pub fn normalize(&self, text: &str, mode: NormalizeMode) -> String {
        fixpoint(text, |s| self.normalize_once(s, mode))
    }

    /// Normalize a markdown section line by line.
    ///
    /// Pipe rows are re-rendered canonically with each cell normalized in
    /// cell mode; fenced blocks are copied verbatim; everything else is
    /// normalized as prose with its leading indentation preserved.
    pub fn normalize_document(&self, text: &str) -> String {
        fixpoint(text, |s| self.normalize_document_once(s))
    }

    fn normalize_once(&self, text: &str, mode: NormalizeMode) -> String {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let text = strip_emphasis(&text, mode);
        let text = self.dictionary.repair(&text);
        let text = decode_entities(&text);
        let text = attach_numeric_marks(&text);
        collapse_whitespace(&text, mode)
    }

    fn normalize_document_once(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let mut out: Vec<String> = Vec::new();
        let mut in_fence = false;

        for line in text.split('\n') {
            if is_fence_line(line) {
                in_fence = !in_fence;
                out.push(line.to_string());
                continue;
            }
            if in_fence {
                out.push(line.to_string());
                continue;
            }

            if let Some(cells) = parse_pipe_row(line) {
                if is_separator_row(&cells) {
                    out.push(render_separator(cells.len()));
                    continue;
                }
                let cells: Vec<String> = cells
                    .iter()
                    .map(|c| self.normalize_once(c, NormalizeMode::Cell))
                    .collect();
                out.push(render_row(&cells));
                continue;
            }

            if line.trim().is_empty() {
                out.push(String::new());
                continue;
            }

            let indent_len = line.len() - line.trim_start().len();
            let (indent, body) = line.split_at(indent_len);
            let body = self.normalize_once(body, NormalizeMode::Prose);
            out.push(format!("{}{}", indent, body));
        }

        collapse_blank_lines(&out)
    }
}

fn fixpoint(text: &str, pass: impl Fn(&str) -> String) -> String {
    let mut current = pass(text);
    let mut level_passes = 1;
    while level_passes < MAX_PASSES {
        let next = pass(&current);
        if next == current {
            break;
        }
        if next.len() >= current.len() {
            level_passes += 1;
        }
        current = next;
    }
    current
}

/// Remove emphasis wrappers, keeping the wrapped text.
pub fn strip_emphasis(text: &str, mode: NormalizeMode) -> String {
    RE_EMPHASIS
        .replace_all(text, |caps: &Captures| {
            let strong = caps.name("b1").or_else(|| caps.name("b2"));
            if let Some(inner) = strong {
                return match mode {
                    NormalizeMode::Prose => format!("**{}**", inner.as_str()),
                    NormalizeMode::Cell => inner.as_str().to_string(),
                };
            }
            caps.name("st")
                .or_else(|| caps.name("i1"))
                .or_else(|| caps.name("i2"))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    // Each round that changes anything shortens the text.
    let mut out = text.to_string();
    loop {
        let mut next = out.clone();
        for (entity, ch) in ENTITIES {
            next = next.replace(entity, ch);
        }
        if next == out {
            return out;
        }
        out = next;
    }
}

/// `$ 12` → `$12`, `12 %` → `12%`, ` + 5` → ` +5`.
fn attach_numeric_marks(text: &str) -> String {
    let text = RE_CURRENCY_GAP.replace_all(text, |caps: &Captures| format!("${}", &caps[1]));
    let text = RE_PERCENT_GAP.replace_all(&text, |caps: &Captures| format!("{}%", &caps[1]));
    RE_PLUS_GAP
        .replace_all(&text, |caps: &Captures| format!("{}+{}", &caps[1], &caps[2]))
        .into_owned()
}

fn collapse_whitespace(text: &str, mode: NormalizeMode) -> String {
    let text = RE_SPACES.replace_all(text, " ");
    let text = RE_TRAILING.replace_all(&text, "");
    match mode {
        NormalizeMode::Prose => RE_BLANK_LINES
            .replace_all(&text, "\n\n")
            .trim()
            .to_string(),
        // A cell is one line of a table row.
        NormalizeMode::Cell => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

fn collapse_blank_lines(lines: &[String]) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut previous_blank = true;
    for line in lines {
        let blank = line.is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push(line);
        previous_blank = blank;
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::default()
    }

    #[test]
    fn strips_italic_and_strike_in_prose() {
        let n = normalizer();
        assert_eq!(
            n.normalize("A *very* ~~bad~~ _good_ quarter", NormalizeMode::Prose),
            "A very bad good quarter"
        );
    }

    #[test]
    fn canonicalizes_strong_emphasis_in_prose() {
        let n = normalizer();
        assert_eq!(
            n.normalize("__Key point__: margins **rose**", NormalizeMode::Prose),
            "**Key point**: margins **rose**"
        );
    }

    #[test]
    fn removes_all_emphasis_in_cells() {
        let n = normalizer();
        assert_eq!(n.normalize(" **$46.7B** ", NormalizeMode::Cell), "$46.7B");
        assert_eq!(n.normalize("~~*Stable*~~", NormalizeMode::Cell), "Stable");
    }

    #[test]
    fn keeps_snake_case_and_arithmetic() {
        let n = normalizer();
        assert_eq!(
            n.normalize("set fail_on_zero_success to 2 * 3", NormalizeMode::Prose),
            "set fail_on_zero_success to 2 * 3"
        );
    }

    #[test]
    fn repairs_split_words() {
        let n = normalizer();
        assert_eq!(
            n.normalize("R are  earth mag net exports to Ch ina", NormalizeMode::Prose),
            "Rare earth magnet exports to China"
        );
    }

    #[test]
    fn collapses_whitespace_and_blank_lines() {
        let n = normalizer();
        assert_eq!(
            n.normalize("one   two  \r\n\r\n\r\n\r\nthree", NormalizeMode::Prose),
            "one two\n\nthree"
        );
    }

    #[test]
    fn reattaches_numeric_marks_and_decodes_entities() {
        let n = normalizer();
        assert_eq!(
            n.normalize("Revenue of $ 46.7B, up 56 % &amp; margin + 2pts", NormalizeMode::Prose),
            "Revenue of $46.7B, up 56% & margin +2pts"
        );
    }

    #[test]
    fn idempotent_on_tricky_inputs() {
        let n = normalizer();
        let samples = [
            "***x***",
            "**a** *b* __c__ _d_ ~~e~~",
            "&amp;lt;b&amp;gt;",
            "&amp;amp;amp;amp;amp;amp;amp;amp;amp;amp;amp;amp;amp;amp;amp;amp;amp;amp;amp;amp;lt;",
            "T h e   E B I T D A o f t h e",
            "a * b * c",
            "__**nested**__",
            "$  5 %  +  3",
            "\n\n\n  indented   text  \n\n\n",
            "",
        ];
        for s in samples {
            for mode in [NormalizeMode::Prose, NormalizeMode::Cell] {
                let once = n.normalize(s, mode);
                let twice = n.normalize(&once, mode);
                assert_eq!(once, twice, "not idempotent for {:?} in {:?}", s, mode);
            }
        }
    }

    #[test]
    fn deeply_nested_entities_settle_in_one_call() {
        let n = normalizer();
        let nested = format!("&{}lt;", "amp;".repeat(20));
        for mode in [NormalizeMode::Prose, NormalizeMode::Cell] {
            assert_eq!(n.normalize(&nested, mode), "<");
        }
        let doc = format!("Spread {} 5", nested);
        let once = n.normalize_document(&doc);
        assert_eq!(once, "Spread < 5");
        assert_eq!(n.normalize_document(&once), once);
    }

    #[test]
    fn document_normalizes_cells_and_keeps_fences() {
        let n = normalizer();
        let doc = "Intro  text with **bold**.\n\n\n\n|Metric|**Value**|\n|---|:---:|\n| Revenue | *$46.7B* |\n\n```unparsed\nRaw   **kept**  as is\n```\n";
        let out = n.normalize_document(doc);
        assert_eq!(
            out,
            "Intro text with **bold**.\n\n| Metric | Value |\n| --- | --- |\n| Revenue | $46.7B |\n\n```unparsed\nRaw   **kept**  as is\n```"
        );
    }

    #[test]
    fn document_preserves_indentation() {
        let n = normalizer();
        assert_eq!(
            n.normalize_document("- item\n  - nested   item"),
            "- item\n  - nested item"
        );
    }

    #[test]
    fn document_normalization_is_idempotent() {
        let n = normalizer();
        let doc = "## Heading\n\nTh e company   grew.\n| a |b|\n|--|--|\n|**x**| y |\n\n\n```\ncode  block\n```\n";
        let once = n.normalize_document(doc);
        assert_eq!(n.normalize_document(&once), once);
    }
}
