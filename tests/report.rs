//! End-to-end report runs with in-process services.
//!
//! Proves the collect → aggregate → draft → pipeline chain, including the
//! two hard failures and the partial-draft path.

use async_trait::async_trait;
use report_harness::coordinator::Coordinator;
use report_harness::draft::{Draft, DraftError, DraftGenerator, ServiceDraftGenerator};
use report_harness::models::{ErrorKind, Priority, RetrievalRequest};
use report_harness::pipeline::{ArtifactStatus, Pipeline, PipelineStage, SectionContract};
use report_harness::report::{ReportError, ReportRunner};
use report_harness::retry::RetryPolicy;
use report_harness::service::{SearchService, ServiceError, ServiceResponse};
use std::sync::{Arc, Mutex};

// ─── Fakes ──────────────────────────────────────────────────────────

/// Answers every query, or fails every query with `kind`.
struct FixedService {
    failure: Option<ErrorKind>,
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl FixedService {
    fn answering(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            failure: None,
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(kind: ErrorKind) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(kind),
            reply: String::new(),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SearchService for FixedService {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn submit(&self, query: &str) -> Result<ServiceResponse, ServiceError> {
        self.prompts.lock().unwrap().push(query.to_string());
        match self.failure {
            Some(kind) => Err(ServiceError::new(kind, "scripted failure")),
            None => Ok(ServiceResponse {
                content: self.reply.clone(),
                citations: vec!["https://example.com/source".to_string()],
            }),
        }
    }
}

/// Returns a canned draft result and remembers what it was given.
struct CannedGenerator {
    result: Mutex<Option<Result<Draft, DraftError>>>,
    seen: Mutex<Option<String>>,
}

impl CannedGenerator {
    fn new(result: Result<Draft, DraftError>) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Some(result)),
            seen: Mutex::new(None),
        })
    }
}

#[async_trait]
impl DraftGenerator for CannedGenerator {
    async fn generate(&self, aggregated: &str) -> Result<Draft, DraftError> {
        *self.seen.lock().unwrap() = Some(aggregated.to_string());
        self.result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(DraftError::MalformedStructure("called twice".into())))
    }
}

fn plan() -> Vec<RetrievalRequest> {
    vec![
        RetrievalRequest::new("q1", "NVIDIA revenue", "Financials", Priority::High),
        RetrievalRequest::new("q2", "NVIDIA valuation", "Valuation", Priority::Medium),
    ]
}

fn contract() -> Vec<SectionContract> {
    vec![
        SectionContract::new("fundamentalAnalysis", 1),
        SectionContract::new("valuationAnalysis", 1),
        SectionContract::new("aiInsights", 1).optional(),
    ]
}

fn coordinator(service: Arc<dyn SearchService>) -> Coordinator {
    Coordinator::new(service).with_retry_policy(RetryPolicy::immediate(2))
}

const FUNDAMENTALS: &str = "Revenue grew strongly.\n\n| Metric | Q2 FY2026 |\n| --- | --- |\n| Revenue | $46.7B |\n";
const VALUATION: &str = "Key ratios:\n\nRatioValueInterpretationGrossMargin75%Exceptional\n";

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_is_accepted() {
    let service = FixedService::answering("Revenue was $46.7B.");
    let draft: Draft = [
        ("fundamentalAnalysis", FUNDAMENTALS),
        ("valuationAnalysis", VALUATION),
    ]
    .into_iter()
    .collect();
    let generator = CannedGenerator::new(Ok(draft));
    let runner = ReportRunner::new(
        coordinator(service),
        generator.clone(),
        Pipeline::new(contract()),
    );

    let report = runner.run("NVIDIA", &plan()).await.unwrap();

    assert_eq!(report.batch.success_count(), 2);
    assert!(report.missing_sections.is_empty());
    assert_eq!(
        report.run.stages,
        vec![
            PipelineStage::Received,
            PipelineStage::Reconstructed,
            PipelineStage::Normalized,
            PipelineStage::Validated,
            PipelineStage::Accepted,
        ]
    );
    let artifact = &report.run.artifact;
    assert_eq!(artifact.status, ArtifactStatus::Accepted);
    assert_eq!(artifact.sections.len(), 2);
    let valuation = artifact.section("valuationAnalysis").unwrap();
    assert!(valuation.text.contains("| Gross Margin | 75% | Exceptional |"));

    let seen = generator.seen.lock().unwrap().clone().unwrap();
    assert!(seen.starts_with("# NVIDIA - collected information"));
    assert!(seen.contains("Successful queries: 2/2"));
    assert!(seen.contains("### Financials"));
}

#[tokio::test]
async fn zero_successes_fatal_when_configured() {
    let generator = CannedGenerator::new(Ok(Draft::new()));
    let runner = ReportRunner::new(
        coordinator(FixedService::failing(ErrorKind::AuthFailure)),
        generator.clone(),
        Pipeline::new(contract()),
    )
    .fail_on_zero_success(true);

    let err = runner.run("NVIDIA", &plan()).await.unwrap_err();

    assert!(matches!(err, ReportError::NoSuccessfulRetrievals { total: 2 }));
    assert!(generator.seen.lock().unwrap().is_none());
}

#[tokio::test]
async fn zero_successes_still_draft_by_default() {
    let draft: Draft = [
        ("fundamentalAnalysis", FUNDAMENTALS),
        ("valuationAnalysis", "No data."),
    ]
    .into_iter()
    .collect();
    let runner = ReportRunner::new(
        coordinator(FixedService::failing(ErrorKind::Timeout)),
        CannedGenerator::new(Ok(draft)),
        Pipeline::new(contract()),
    );

    let report = runner.run("NVIDIA", &plan()).await.unwrap();

    assert_eq!(report.batch.success_count(), 0);
    assert!(report.batch.results().iter().all(|r| r.attempts == 2));
    assert_eq!(report.run.artifact.status, ArtifactStatus::Flagged);
    assert_eq!(report.run.stages.last(), Some(&PipelineStage::Flagged));
}

#[tokio::test]
async fn partial_draft_is_completed_and_flagged() {
    let partial: Draft = [("fundamentalAnalysis", FUNDAMENTALS)].into_iter().collect();
    let runner = ReportRunner::new(
        coordinator(FixedService::answering("ok")),
        CannedGenerator::new(Err(DraftError::IncompleteSections {
            missing: vec!["valuationAnalysis".to_string()],
            partial,
        })),
        Pipeline::new(contract()),
    );

    let report = runner.run("NVIDIA", &plan()).await.unwrap();

    assert_eq!(report.missing_sections, vec!["valuationAnalysis"]);
    let artifact = &report.run.artifact;
    assert_eq!(artifact.status, ArtifactStatus::Flagged);
    let valuation = artifact.section("valuationAnalysis").unwrap();
    assert_eq!(valuation.text, "");
    assert_eq!(valuation.report.table_count, 0);
    assert!(!valuation.report.passed);
    assert!(artifact.section("aiInsights").is_none());
}

#[tokio::test]
async fn unusable_draft_is_a_hard_failure() {
    let runner = ReportRunner::new(
        coordinator(FixedService::answering("ok")),
        CannedGenerator::new(Err(DraftError::IncompleteSections {
            missing: vec!["fundamentalAnalysis".to_string()],
            partial: Draft::new(),
        })),
        Pipeline::new(contract()),
    );
    let err = runner.run("NVIDIA", &plan()).await.unwrap_err();
    assert!(matches!(
        err,
        ReportError::Draft(DraftError::IncompleteSections { .. })
    ));

    let runner = ReportRunner::new(
        coordinator(FixedService::answering("ok")),
        CannedGenerator::new(Err(DraftError::MalformedStructure("not JSON".into()))),
        Pipeline::new(contract()),
    );
    let err = runner.run("NVIDIA", &plan()).await.unwrap_err();
    assert!(err.to_string().contains("not JSON"));
}

#[tokio::test]
async fn service_generator_parses_fenced_reply() {
    let reply = format!(
        "```json\n{}\n```",
        serde_json::json!({
            "fundamentalAnalysis": FUNDAMENTALS,
            "valuationAnalysis": VALUATION,
            "aiInsights": "Demand outlook stays strong.",
        })
    );
    let service = FixedService::answering(&reply);
    let generator = ServiceDraftGenerator::new(
        service.clone(),
        vec![
            "fundamentalAnalysis".into(),
            "valuationAnalysis".into(),
            "aiInsights".into(),
        ],
        vec!["fundamentalAnalysis".into(), "valuationAnalysis".into()],
    );

    let draft = generator.generate("# NVIDIA - collected information").await.unwrap();

    assert_eq!(draft.len(), 3);
    assert_eq!(draft.sections()[0].name, "fundamentalAnalysis");
    let prompts = service.prompts.lock().unwrap();
    assert!(prompts[0].contains("Sections: fundamentalAnalysis, valuationAnalysis, aiInsights"));
    assert!(prompts[0].ends_with("# NVIDIA - collected information"));
}

#[tokio::test]
async fn service_generator_failure_is_malformed() {
    let generator = ServiceDraftGenerator::new(
        FixedService::failing(ErrorKind::AuthFailure),
        vec!["a".into()],
        vec!["a".into()],
    );
    let err = generator.generate("text").await.unwrap_err();
    assert!(matches!(err, DraftError::MalformedStructure(_)));
}
