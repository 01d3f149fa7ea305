//! Reconstruction pipeline.
//!
//! Takes a [`Draft`] through reconstruction, normalization and validation
//! and produces an [`Artifact`]:
//!
//! ```text
//! Received ──▶ Reconstructed ──▶ Normalized ──▶ Validated ──▶ Accepted
//!                                                        └──▶ Flagged
//! ```
//!
//! Every step is synchronous and works on owned section text. A run never
//! fails: unrecoverable tables are quarantined and sections below their
//! minimum flag the artifact instead of raising.

use std::fmt::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use report_harness_core::classify::{classify_line, LineKind};
use report_harness_core::dictionary::SplitWordDictionary;
use report_harness_core::models::ValidationReport;
use report_harness_core::normalize::Normalizer;
use report_harness_core::reconstruct::Reconstructor;
use report_harness_core::table::{is_fence_line, parse_table};
use report_harness_core::validate::validate_text;

use crate::config::{Config, SectionConfig};
use crate::draft::Draft;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Reconstructed,
    Normalized,
    Validated,
    Accepted,
    Flagged,
}

/// Required shape of one report section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionContract {
    pub name: String,
    pub min_tables: usize,
    pub optional: bool,
    pub title: Option<String>,
}

impl SectionContract {
    pub fn new(name: impl Into<String>, min_tables: usize) -> Self {
        Self {
            name: name.into(),
            min_tables,
            optional: false,
            title: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn from_config(sections: &[SectionConfig]) -> Vec<Self> {
        sections
            .iter()
            .map(|s| Self {
                name: s.name.clone(),
                min_tables: s.min_tables,
                optional: s.optional,
                title: s.title.clone(),
            })
            .collect()
    }

    /// The five-section investment report contract.
    pub fn default_contract() -> Vec<Self> {
        Self::from_config(&Config::minimal().pipeline.sections)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Accepted,
    Flagged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionArtifact {
    pub name: String,
    pub text: String,
    pub report: ValidationReport,
}

/// Final output of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub status: ArtifactStatus,
    pub sections: Vec<SectionArtifact>,
    /// Compact blocks that could not be rebuilt, across all sections.
    pub quarantined: usize,
}

impl Artifact {
    pub fn is_accepted(&self) -> bool {
        self.status == ArtifactStatus::Accepted
    }

    pub fn section(&self, name: &str) -> Option<&SectionArtifact> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn failing_sections(&self) -> impl Iterator<Item = &SectionArtifact> {
        self.sections.iter().filter(|s| !s.report.passed)
    }

    /// Render the sections as one markdown document under numbered
    /// headings. Titles come from `contract`, falling back to the name.
    pub fn to_markdown(&self, title: &str, contract: &[SectionContract]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", title);
        let _ = writeln!(
            out,
            "*Generated {}*\n",
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        );
        for (i, section) in self.sections.iter().enumerate() {
            let heading = contract
                .iter()
                .find(|c| c.name == section.name)
                .map(SectionContract::title)
                .unwrap_or(section.name.as_str());
            let _ = writeln!(out, "## {}. {}\n", i + 1, heading);
            let body = section.text.trim();
            if !body.is_empty() {
                let _ = writeln!(out, "{}\n", body);
            }
        }
        out
    }
}

/// An artifact plus the stages the run passed through.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub artifact: Artifact,
    pub stages: Vec<PipelineStage>,
}

/// Per-run table counter. Owned by one run and passed down explicitly.
#[derive(Debug, Default)]
pub struct TableNumbering {
    section: usize,
    next: usize,
}

impl TableNumbering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start numbering the next section; tables restart at 1.
    pub fn begin_section(&mut self) {
        self.section += 1;
        self.next = 0;
    }

    pub fn next_caption(&mut self) -> String {
        self.next += 1;
        format!("Table {}.{}", self.section, self.next)
    }

    /// Insert a caption line above every well-formed table in `text`.
    pub fn caption_tables(&mut self, text: &str) -> String {
        let lines: Vec<&str> = text.lines().collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut in_fence = false;
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            if in_fence || is_fence_line(line) {
                if is_fence_line(line) {
                    in_fence = !in_fence;
                }
                out.push(line.to_string());
                i += 1;
                continue;
            }
            if classify_line(line) != LineKind::PipeRow {
                out.push(line.to_string());
                i += 1;
                continue;
            }

            let start = i;
            while i < lines.len() && classify_line(lines[i]) == LineKind::PipeRow {
                i += 1;
            }
            if parse_table(&lines[start..i]).is_some() {
                if out.last().is_some_and(|l| !l.trim().is_empty()) {
                    out.push(String::new());
                }
                out.push(self.next_caption());
                out.push(String::new());
            }
            out.extend(lines[start..i].iter().map(|l| l.to_string()));
        }

        let mut joined = out.join("\n");
        if text.ends_with('\n') {
            joined.push('\n');
        }
        joined
    }
}

/// Normalizer over the built-in split-word table, with any extra table
/// from `[normalize] split_words_path` merged on top.
pub fn normalizer_from_config(config: &Config) -> Result<Normalizer> {
    let mut dictionary = SplitWordDictionary::builtin();
    if let Some(path) = &config.normalize.split_words_path {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read split-word table: {}", path.display()))?;
        let extra = SplitWordDictionary::from_json(&json)
            .with_context(|| format!("Invalid split-word table: {}", path.display()))?;
        dictionary = dictionary.extend(&extra)?;
    }
    Ok(Normalizer::new(dictionary))
}

pub struct Pipeline {
    reconstructor: Reconstructor,
    normalizer: Normalizer,
    contract: Vec<SectionContract>,
    number_tables: bool,
}

impl Pipeline {
    /// Pipeline with the built-in matchers and split-word table.
    pub fn new(contract: Vec<SectionContract>) -> Self {
        Self {
            reconstructor: Reconstructor::new(),
            normalizer: Normalizer::default(),
            contract,
            number_tables: false,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(
            Self::new(SectionContract::from_config(&config.pipeline.sections))
                .with_normalizer(normalizer_from_config(config)?)
                .with_table_numbering(config.pipeline.number_tables),
        )
    }

    pub fn with_reconstructor(mut self, reconstructor: Reconstructor) -> Self {
        self.reconstructor = reconstructor;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_table_numbering(mut self, enabled: bool) -> Self {
        self.number_tables = enabled;
        self
    }

    pub fn contract(&self) -> &[SectionContract] {
        &self.contract
    }

    /// Names of the sections a draft must contain.
    pub fn required_sections(&self) -> Vec<&str> {
        self.contract
            .iter()
            .filter(|c| !c.optional)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Section list the run works on: contract order first, then any
    /// extra draft sections with no minimum.
    fn lay_out(&self, draft: &Draft) -> Vec<(String, String, usize)> {
        let mut sections = Vec::new();
        for c in &self.contract {
            match draft.get(&c.name) {
                Some(text) => sections.push((c.name.clone(), text.to_string(), c.min_tables)),
                None if c.optional => {}
                None => {
                    warn!(section = %c.name, "section missing from draft");
                    sections.push((c.name.clone(), String::new(), c.min_tables));
                }
            }
        }
        for s in draft.sections() {
            if !self.contract.iter().any(|c| c.name == s.name) {
                sections.push((s.name.clone(), s.text.clone(), 0));
            }
        }
        sections
    }

    pub fn run(&self, draft: Draft) -> PipelineRun {
        let mut stages = vec![PipelineStage::Received];
        let laid_out = self.lay_out(&draft);

        let mut quarantined = 0;
        let reconstructed: Vec<(String, String, usize)> = laid_out
            .into_iter()
            .map(|(name, text, min)| {
                let r = self.reconstructor.reconstruct(&text);
                if r.quarantined > 0 {
                    warn!(
                        section = %name,
                        quarantined = r.quarantined,
                        "table blocks could not be rebuilt"
                    );
                }
                quarantined += r.quarantined;
                (name, r.text, min)
            })
            .collect();
        stages.push(PipelineStage::Reconstructed);

        let normalized: Vec<(String, String, usize)> = reconstructed
            .into_iter()
            .map(|(name, text, min)| {
                let text = self.normalizer.normalize_document(&text);
                (name, text, min)
            })
            .collect();
        stages.push(PipelineStage::Normalized);

        let mut numbering = TableNumbering::new();
        let sections: Vec<SectionArtifact> = normalized
            .into_iter()
            .map(|(name, text, min)| {
                let report = validate_text(&name, &text, min);
                if !report.passed {
                    warn!(
                        section = %name,
                        table_count = report.table_count,
                        required_min = report.required_min,
                        "section below table minimum"
                    );
                }
                numbering.begin_section();
                let text = if self.number_tables {
                    numbering.caption_tables(&text)
                } else {
                    text
                };
                SectionArtifact { name, text, report }
            })
            .collect();
        stages.push(PipelineStage::Validated);

        let status = if sections.iter().all(|s| s.report.passed) {
            ArtifactStatus::Accepted
        } else {
            ArtifactStatus::Flagged
        };
        stages.push(match status {
            ArtifactStatus::Accepted => PipelineStage::Accepted,
            ArtifactStatus::Flagged => PipelineStage::Flagged,
        });

        let artifact = Artifact {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            status,
            sections,
            quarantined,
        };
        info!(
            run_id = %artifact.run_id,
            status = ?artifact.status,
            sections = artifact.sections.len(),
            quarantined,
            "pipeline finished"
        );
        PipelineRun { artifact, stages }
    }
}
