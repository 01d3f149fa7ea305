//! Draft generator boundary.
//!
//! The analyst model answers with a JSON object mapping section keys to
//! markdown text, usually inside a ```` ```json ```` fence:
//!
//! ```json
//! {"fundamentalAnalysis": "...", "businessSegments": "...", "aiInsights": "..."}
//! ```
//!
//! [`parse_draft`] turns such a response into an ordered [`Draft`].
//! [`ServiceDraftGenerator`] sends the aggregated research through any
//! [`SearchService`] and parses the answer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use report_harness_core::models::DocumentSection;

use crate::service::SearchService;

/// Ordered section name → raw text, as produced by the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Draft {
    sections: Vec<DocumentSection>,
}

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a section. Replacing keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        let text = text.into();
        match self.sections.iter_mut().find(|s| s.name == name) {
            Some(existing) => existing.text = text,
            None => self.sections.push(DocumentSection::new(name, text)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.text.as_str())
    }

    pub fn sections(&self) -> &[DocumentSection] {
        &self.sections
    }

    pub fn into_sections(self) -> Vec<DocumentSection> {
        self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl<N: Into<String>, T: Into<String>> FromIterator<(N, T)> for Draft {
    fn from_iter<I: IntoIterator<Item = (N, T)>>(iter: I) -> Self {
        let mut draft = Draft::new();
        for (name, text) in iter {
            draft.insert(name, text);
        }
        draft
    }
}

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("malformed draft structure: {0}")]
    MalformedStructure(String),
    #[error("draft is missing sections: {}", .missing.join(", "))]
    IncompleteSections { missing: Vec<String>, partial: Draft },
}

#[async_trait]
pub trait DraftGenerator: Send + Sync {
    async fn generate(&self, aggregated: &str) -> Result<Draft, DraftError>;
}

/// Pull the JSON object out of a raw model response.
///
/// A fence only wraps the object when it opens before the first `{`;
/// fences inside section text are part of the JSON strings.
fn extract_object(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    let first_brace = trimmed.find('{');
    let body = match trimmed.find("```") {
        Some(start) if first_brace.map_or(true, |open| start < open) => {
            let after = &trimmed[start + 3..];
            let after = after.strip_prefix("json").unwrap_or(after);
            match after.rfind("```") {
                Some(end) => &after[..end],
                None => after,
            }
        }
        _ => trimmed,
    };
    let open = body.find('{')?;
    let close = body.rfind('}')?;
    (close > open).then(|| &body[open..=close])
}

/// Parse a raw model response into a draft.
///
/// Sections listed in `required` come first, in that order; any other
/// string-valued keys follow. Non-string values are dropped. Missing or
/// empty required sections yield [`DraftError::IncompleteSections`] with
/// whatever was parsed.
pub fn parse_draft(response: &str, required: &[&str]) -> Result<Draft, DraftError> {
    let body = extract_object(response)
        .ok_or_else(|| DraftError::MalformedStructure("no JSON object in response".into()))?;
    let value: Value = serde_json::from_str(body)
        .map_err(|e| DraftError::MalformedStructure(format!("invalid JSON: {}", e)))?;
    let Value::Object(map) = value else {
        return Err(DraftError::MalformedStructure(
            "draft must be a JSON object".into(),
        ));
    };

    let text_of = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
    };

    let mut draft = Draft::new();
    let mut missing = Vec::new();
    for &name in required {
        match text_of(name) {
            Some(text) => draft.insert(name, text),
            None => missing.push(name.to_string()),
        }
    }
    for key in map.keys() {
        if required.contains(&key.as_str()) {
            continue;
        }
        if let Some(text) = text_of(key) {
            draft.insert(key.as_str(), text);
        }
    }

    if missing.is_empty() {
        Ok(draft)
    } else {
        Err(DraftError::IncompleteSections {
            missing,
            partial: draft,
        })
    }
}

const ANALYST_INSTRUCTIONS: &str = "Write an investment research report from the research \
below. Answer with a single JSON object whose keys are the section names listed here and \
whose values are markdown text. Use markdown pipe tables for numeric comparisons.";

/// Draft generator backed by a [`SearchService`].
///
/// The aggregated research is wrapped in an instruction prompt naming the
/// expected sections and submitted once; the answer goes through
/// [`parse_draft`].
pub struct ServiceDraftGenerator {
    service: Arc<dyn SearchService>,
    sections: Vec<String>,
    required: Vec<String>,
}

impl ServiceDraftGenerator {
    /// `sections` lists every key to ask for; `required` the subset whose
    /// absence makes the draft incomplete.
    pub fn new(service: Arc<dyn SearchService>, sections: Vec<String>, required: Vec<String>) -> Self {
        Self {
            service,
            sections,
            required,
        }
    }

    fn prompt(&self, aggregated: &str) -> String {
        format!(
            "{}\n\nSections: {}\n\n{}",
            ANALYST_INSTRUCTIONS,
            self.sections.join(", "),
            aggregated
        )
    }
}

#[async_trait]
impl DraftGenerator for ServiceDraftGenerator {
    async fn generate(&self, aggregated: &str) -> Result<Draft, DraftError> {
        let response = self
            .service
            .submit(&self.prompt(aggregated))
            .await
            .map_err(|e| DraftError::MalformedStructure(format!("generator call failed: {}", e)))?;
        let required: Vec<&str> = self.required.iter().map(String::as_str).collect();
        parse_draft(&response.content, &required)
    }
}
