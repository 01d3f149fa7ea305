//! TOML configuration for Report Harness.
//!
//! ```toml
//! [retrieval]
//! max_concurrency = 5
//! max_attempts = 3
//! timeout_secs = 60
//!
//! [service]
//! provider = "sonar"
//! model = "sonar"
//!
//! [pipeline]
//! number_tables = true
//!
//! [[pipeline.sections]]
//! name = "fundamentalAnalysis"
//! min_tables = 3
//! ```
//!
//! Every table and field is optional; missing values take the defaults
//! below. [`load_config`] validates ranges after parsing.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
}

impl Config {
    /// Defaults only, for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,
    /// Treat a batch with zero successful retrievals as a hard failure.
    #[serde(default)]
    pub fail_on_zero_success: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_queries: default_max_queries(),
            fail_on_zero_success: false,
        }
    }
}

impl RetrievalConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_max_concurrency() -> usize {
    5
}
fn default_max_attempts() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    32_000
}
fn default_max_queries() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the bearer key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl ServiceConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_url() -> String {
    "https://api.perplexity.ai/chat/completions".to_string()
}
fn default_model() -> String {
    "sonar".to_string()
}
fn default_api_key_env() -> String {
    "PERPLEXITY_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_system_prompt() -> String {
    "You are a precise research assistant. Provide factual, up-to-date information with sources."
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Prefix each well-formed table with a `Table <section>.<n>` caption.
    #[serde(default)]
    pub number_tables: bool,
    #[serde(default = "default_sections")]
    pub sections: Vec<SectionConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            number_tables: false,
            sections: default_sections(),
        }
    }
}

/// One entry of the section contract.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SectionConfig {
    /// Key of the section in the draft JSON.
    pub name: String,
    #[serde(default)]
    pub min_tables: usize,
    /// Optional sections may be absent from a draft without failing it.
    #[serde(default)]
    pub optional: bool,
    /// Heading used when the artifact is rendered as markdown.
    #[serde(default)]
    pub title: Option<String>,
}

fn default_sections() -> Vec<SectionConfig> {
    [
        ("fundamentalAnalysis", 3, false, "Fundamental Analysis"),
        ("businessSegments", 3, false, "Business Segments"),
        ("growthCatalysts", 3, false, "Growth Catalysts"),
        ("valuationAnalysis", 3, false, "Valuation Analysis"),
        ("aiInsights", 2, true, "AI-Powered Insights & Predictions"),
    ]
    .into_iter()
    .map(|(name, min_tables, optional, title)| SectionConfig {
        name: name.to_string(),
        min_tables,
        optional,
        title: Some(title.to_string()),
    })
    .collect()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NormalizeConfig {
    /// Extra split-word entries merged over the built-in table.
    #[serde(default)]
    pub split_words_path: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if r.max_concurrency < 1 {
        bail!("retrieval.max_concurrency must be >= 1");
    }
    if r.max_attempts < 1 {
        bail!("retrieval.max_attempts must be >= 1");
    }
    if r.timeout_secs < 1 {
        bail!("retrieval.timeout_secs must be >= 1");
    }
    if r.base_delay_ms > r.max_delay_ms {
        bail!("retrieval.base_delay_ms must be <= retrieval.max_delay_ms");
    }
    if r.max_queries < 1 {
        bail!("retrieval.max_queries must be >= 1");
    }

    match config.service.provider.as_str() {
        "disabled" | "sonar" => {}
        other => bail!(
            "Unknown service provider: '{}'. Must be disabled or sonar.",
            other
        ),
    }

    let mut seen = HashSet::new();
    for section in &config.pipeline.sections {
        if section.name.trim().is_empty() {
            bail!("pipeline.sections entries must have a name");
        }
        if !seen.insert(section.name.as_str()) {
            bail!("Duplicate pipeline section: '{}'", section.name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_config("");
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.retrieval.max_concurrency, 5);
        assert_eq!(cfg.retrieval.max_attempts, 3);
        assert_eq!(cfg.retrieval.timeout_secs, 60);
        assert_eq!(cfg.service.provider, "disabled");
        assert_eq!(cfg.pipeline.sections.len(), 5);
        assert_eq!(cfg.pipeline.sections[4].name, "aiInsights");
        assert_eq!(cfg.pipeline.sections[4].min_tables, 2);
        assert!(cfg.pipeline.sections[4].optional);
        assert!(!cfg.pipeline.sections[0].optional);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let file = write_config(
            r#"
[retrieval]
max_concurrency = 2

[service]
provider = "sonar"
"#,
        );
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.retrieval.max_concurrency, 2);
        assert_eq!(cfg.retrieval.max_attempts, 3);
        assert!(cfg.service.is_enabled());
        assert_eq!(cfg.service.model, "sonar");
    }

    #[test]
    fn rejects_zero_concurrency() {
        let file = write_config("[retrieval]\nmax_concurrency = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn rejects_inverted_delays() {
        let file = write_config("[retrieval]\nbase_delay_ms = 5000\nmax_delay_ms = 10\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn rejects_unknown_provider() {
        let file = write_config("[service]\nprovider = \"bing\"\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("bing"));
    }

    #[test]
    fn rejects_duplicate_sections() {
        let file = write_config(
            r#"
[[pipeline.sections]]
name = "a"
min_tables = 1

[[pipeline.sections]]
name = "a"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn missing_file_names_path() {
        let err = load_config(Path::new("/nonexistent/rh.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/rh.toml"));
    }

    #[test]
    fn retry_policy_from_config() {
        let policy = Config::minimal().retrieval.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(32));
    }
}
