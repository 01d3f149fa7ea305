//! Implementations behind the `rh` subcommands.
//!
//! Each `run_*` function reads its input, does the work through the
//! library modules, and prints its result on stdout. Logs and progress go
//! to stderr.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use report_harness_core::models::RetrievalRequest;
use report_harness_core::validate::validate_text;

use crate::aggregate::format_for_analysis;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::draft::{parse_draft, Draft, DraftError, ServiceDraftGenerator};
use crate::pipeline::{normalizer_from_config, Artifact, Pipeline};
use crate::plan::{fallback_plan, requests_from_plan};
use crate::progress::ProgressMode;
use crate::report::ReportRunner;
use crate::service::create_service;

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn read_plan(cfg: &Config, path: &Path) -> Result<Vec<RetrievalRequest>> {
    let content = read_input(Some(path))?;
    requests_from_plan(&content, cfg.retrieval.max_queries)
        .with_context(|| format!("Invalid query plan: {}", path.display()))
}

/// Cancel `token` on Ctrl-C so in-flight work stops cleanly.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling collection");
            trigger.cancel();
        }
    });
    token
}

fn subject_from(subject: Option<String>, path: &Path) -> String {
    subject.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string())
    })
}

/// `rh collect`: run a query plan against the configured service.
pub async fn run_collect(
    cfg: &Config,
    plan_path: &Path,
    subject: Option<String>,
    aggregate: bool,
    progress: ProgressMode,
) -> Result<()> {
    let requests = read_plan(cfg, plan_path)?;
    let service = create_service(&cfg.service, &cfg.retrieval)?;
    let coordinator =
        Coordinator::from_config(service, &cfg.retrieval).with_progress(progress.reporter());

    let batch = coordinator
        .collect_with_cancel(&requests, cancel_on_ctrl_c())
        .await;
    if batch.is_empty_success() && cfg.retrieval.fail_on_zero_success {
        bail!(
            "No successful retrievals out of {} requests",
            batch.total()
        );
    }

    if aggregate {
        let subject = subject_from(subject, plan_path);
        print!("{}", format_for_analysis(&subject, &requests, &batch));
    } else {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    }
    Ok(())
}

fn print_artifact(artifact: &Artifact, pipeline: &Pipeline, markdown: Option<&str>) -> Result<()> {
    match markdown {
        Some(title) => print!("{}", artifact.to_markdown(title, pipeline.contract())),
        None => println!("{}", serde_json::to_string_pretty(artifact)?),
    }
    Ok(())
}

/// `rh repair`: parse a draft and run it through the pipeline.
///
/// With `section`, the whole file is treated as the text of that one
/// section instead of a JSON draft.
pub fn run_repair(
    cfg: &Config,
    path: &Path,
    section: Option<String>,
    markdown: Option<String>,
) -> Result<()> {
    let content = read_input(Some(path))?;
    let pipeline = Pipeline::from_config(cfg)?;

    let draft = match section {
        Some(name) => [(name, content)].into_iter().collect::<Draft>(),
        None => match parse_draft(&content, &pipeline.required_sections()) {
            Ok(draft) => draft,
            Err(DraftError::IncompleteSections { missing, partial }) if !partial.is_empty() => {
                warn!(missing = %missing.join(", "), "draft is incomplete");
                partial
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to parse draft: {}", path.display()))
            }
        },
    };

    let run = pipeline.run(draft);
    info!(stages = ?run.stages, "repair finished");
    print_artifact(&run.artifact, &pipeline, markdown.as_deref())
}

/// `rh validate`: count tables in one section file.
pub fn run_validate(path: &Path, min_tables: usize, section: Option<String>) -> Result<()> {
    let content = read_input(Some(path))?;
    let name = subject_from(section, path);
    let report = validate_text(&name, &content, min_tables);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// `rh normalize`: normalize a document from a file or stdin.
pub fn run_normalize(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let content = read_input(path)?;
    let normalizer = normalizer_from_config(cfg)?;
    print!("{}", normalizer.normalize_document(&content));
    Ok(())
}

/// `rh report`: collect, draft and repair in one run.
pub async fn run_report(
    cfg: &Config,
    subject: &str,
    plan_path: Option<&Path>,
    markdown: bool,
    progress: ProgressMode,
) -> Result<()> {
    let requests = match plan_path {
        Some(path) => read_plan(cfg, path)?,
        None => fallback_plan(subject, cfg.retrieval.max_queries),
    };
    let service = create_service(&cfg.service, &cfg.retrieval)?;
    let pipeline = Pipeline::from_config(cfg)?;

    let sections: Vec<String> = pipeline.contract().iter().map(|c| c.name.clone()).collect();
    let required: Vec<String> = pipeline
        .required_sections()
        .into_iter()
        .map(str::to_string)
        .collect();
    let generator = ServiceDraftGenerator::new(Arc::clone(&service), sections, required);
    let coordinator =
        Coordinator::from_config(service, &cfg.retrieval).with_progress(progress.reporter());

    let runner = ReportRunner::new(coordinator, Arc::new(generator), pipeline)
        .fail_on_zero_success(cfg.retrieval.fail_on_zero_success);
    let report = runner.run(subject, &requests).await?;

    info!(
        success = report.batch.success_count(),
        total = report.batch.total(),
        missing = report.missing_sections.len(),
        "report finished"
    );
    let title = format!("{} investment report", subject);
    print_artifact(
        &report.run.artifact,
        runner.pipeline(),
        markdown.then_some(title.as_str()),
    )
}
