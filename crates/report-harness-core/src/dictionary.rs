//! Data-driven split-word repair table.
//!
//! Generated prose often arrives with words broken apart by stray spaces
//! (`"R are earth"`, `"E B I T D A"`, `"Ch in a"`). Repair is a lookup, not
//! logic: each entry maps a split pattern to the token it should become.
//! The built-in table ships as `data/split_words.json` and is parsed once;
//! callers may merge additional entries loaded from their own files.
//!
//! # Matching rules
//!
//! - Keys are matched case-insensitively on word boundaries.
//! - Each space in a key matches one or more spaces or tabs in the text.
//! - Longer keys win over shorter ones starting at the same position.
//! - A replacement containing uppercase letters (`"EBITDA"`, `"China"`) is
//!   used verbatim. Otherwise the case of the matched text is carried over:
//!   an all-caps match yields an all-caps word, a capitalized first
//!   fragment yields a capitalized word.
//!
//! # Entry invariant
//!
//! A replacement must consist of exactly the key's letters with spaces
//! removed (ignoring case and the replacement's own spaces). Repair can
//! therefore only delete whitespace, which keeps normalization monotone and
//! idempotent. Entries that violate this are rejected at load time.

use anyhow::{bail, Context, Result};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;

const BUILTIN_JSON: &str = include_str!("../data/split_words.json");

static BUILTIN: LazyLock<SplitWordDictionary> = LazyLock::new(|| {
    SplitWordDictionary::from_json(BUILTIN_JSON).expect("built-in split-word table is valid")
});

/// One `split → word` mapping as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SplitWordEntry {
    pub split: String,
    pub word: String,
}

/// Compiled split-word lookup table.
#[derive(Debug, Clone)]
pub struct SplitWordDictionary {
    entries: Vec<SplitWordEntry>,
    lookup: HashMap<String, String>,
    pattern: Option<Regex>,
}

impl SplitWordDictionary {
    /// The table shipped with the crate.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// An empty table that repairs nothing.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            lookup: HashMap::new(),
            pattern: None,
        }
    }

    /// Parse a JSON array of `{ "split": ..., "word": ... }` entries.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<SplitWordEntry> =
            serde_json::from_str(json).context("Failed to parse split-word table")?;
        Self::from_entries(entries)
    }

    /// Build a table from entries. Later entries override earlier ones
    /// that share the same (case-insensitive) split key.
    pub fn from_entries(entries: Vec<SplitWordEntry>) -> Result<Self> {
        let mut ordered: Vec<SplitWordEntry> = Vec::with_capacity(entries.len());
        let mut lookup: HashMap<String, String> = HashMap::new();

        for entry in entries {
            let key = canonical_key(&entry.split);
            validate_entry(&key, &entry)?;
            if lookup.insert(key.clone(), entry.word.clone()).is_some() {
                ordered.retain(|e| canonical_key(&e.split) != key);
            }
            ordered.push(SplitWordEntry {
                split: key,
                word: entry.word,
            });
        }

        let pattern = compile_pattern(&ordered)?;
        Ok(Self {
            entries: ordered,
            lookup,
            pattern,
        })
    }

    /// Merge `other` into this table; `other` wins on conflicting keys.
    pub fn extend(&self, other: &SplitWordDictionary) -> Result<Self> {
        let mut entries = self.entries.clone();
        entries.extend(other.entries.iter().cloned());
        Self::from_entries(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SplitWordEntry] {
        &self.entries
    }

    /// Replace every split pattern in `text` with its repaired token.
    pub fn repair(&self, text: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return text.to_string();
        };

        pattern
            .replace_all(text, |caps: &Captures| {
                let matched = &caps[0];
                match self.lookup.get(&canonical_key(matched)) {
                    Some(word) => apply_case(matched, word),
                    None => matched.to_string(),
                }
            })
            .into_owned()
    }
}

impl Default for SplitWordDictionary {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercase, single-spaced form of a split key.
fn canonical_key(split: &str) -> String {
    split
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn letters(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn validate_entry(key: &str, entry: &SplitWordEntry) -> Result<()> {
    if !key.contains(' ') {
        bail!("split-word key '{}' contains no split", entry.split);
    }
    if !key
        .chars()
        .all(|c| c == ' ' || c.is_alphanumeric() || c == '\'' || c == '-')
    {
        bail!(
            "split-word key '{}' may only contain letters, digits, apostrophes and hyphens",
            entry.split
        );
    }
    if entry.word.trim().is_empty() {
        bail!("split-word key '{}' has an empty replacement", entry.split);
    }
    if letters(key) != letters(&entry.word) {
        bail!(
            "split-word entry '{}' -> '{}' must only remove whitespace",
            entry.split,
            entry.word
        );
    }
    if canonical_key(&entry.word) == key {
        bail!(
            "split-word entry '{}' maps onto itself",
            entry.split
        );
    }
    Ok(())
}

fn compile_pattern(entries: &[SplitWordEntry]) -> Result<Option<Regex>> {
    if entries.is_empty() {
        return Ok(None);
    }

    let mut keys: Vec<&str> = entries.iter().map(|e| e.split.as_str()).collect();
    // Longest first so the leftmost-first alternation prefers full matches;
    // ties broken lexically to keep compilation deterministic.
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let alternatives: Vec<String> = keys
        .iter()
        .map(|k| {
            k.split(' ')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join("[ \\t]+")
        })
        .collect();

    let source = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    let re = Regex::new(&source).context("Failed to compile split-word pattern")?;
    Ok(Some(re))
}

/// Carry the case of the matched text over to a lowercase replacement.
fn apply_case(matched: &str, word: &str) -> String {
    if word.chars().any(char::is_uppercase) {
        return word.to_string();
    }

    let alpha: Vec<char> = matched.chars().filter(|c| c.is_alphabetic()).collect();
    if alpha.len() > 1 && alpha.iter().all(|c| c.is_uppercase()) {
        return word.to_uppercase();
    }

    match matched.chars().next() {
        Some(first) if first.is_uppercase() => {
            let mut chars = word.chars();
            match chars.next() {
                Some(w) => w.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        _ => word.to_string(),
    }
}
