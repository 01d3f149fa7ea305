//! End-to-end report run: collect → aggregate → draft → pipeline.
//!
//! Only two outcomes are hard failures: a batch with zero successes when
//! the caller declared that fatal, and a draft with no usable content.
//! Everything else (failed queries, missing sections, tables below
//! minimum) is carried in the returned [`Report`].

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use report_harness_core::models::{RetrievalBatch, RetrievalRequest};

use crate::aggregate::format_for_analysis;
use crate::coordinator::Coordinator;
use crate::draft::{DraftError, DraftGenerator};
use crate::pipeline::{Pipeline, PipelineRun};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("no successful retrievals out of {total} requests")]
    NoSuccessfulRetrievals { total: usize },
    #[error(transparent)]
    Draft(#[from] DraftError),
}

/// Everything a report run produced.
#[derive(Debug)]
pub struct Report {
    pub batch: RetrievalBatch,
    pub run: PipelineRun,
    /// Required sections the generator left out; filled in empty by the
    /// pipeline.
    pub missing_sections: Vec<String>,
}

pub struct ReportRunner {
    coordinator: Coordinator,
    generator: Arc<dyn DraftGenerator>,
    pipeline: Pipeline,
    fail_on_zero_success: bool,
}

impl ReportRunner {
    pub fn new(coordinator: Coordinator, generator: Arc<dyn DraftGenerator>, pipeline: Pipeline) -> Self {
        Self {
            coordinator,
            generator,
            pipeline,
            fail_on_zero_success: false,
        }
    }

    pub fn fail_on_zero_success(mut self, fatal: bool) -> Self {
        self.fail_on_zero_success = fatal;
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn run(
        &self,
        subject: &str,
        requests: &[RetrievalRequest],
    ) -> Result<Report, ReportError> {
        let batch = self.coordinator.collect(requests).await;
        if batch.is_empty_success() {
            if self.fail_on_zero_success {
                return Err(ReportError::NoSuccessfulRetrievals {
                    total: batch.total(),
                });
            }
            warn!(total = batch.total(), "no successful retrievals, drafting anyway");
        }

        let aggregated = format_for_analysis(subject, requests, &batch);
        let (draft, missing_sections) = match self.generator.generate(&aggregated).await {
            Ok(draft) => (draft, Vec::new()),
            Err(DraftError::IncompleteSections { missing, partial }) if !partial.is_empty() => {
                warn!(missing = %missing.join(", "), "draft is incomplete, continuing with partial draft");
                (partial, missing)
            }
            Err(e) => return Err(e.into()),
        };

        let run = self.pipeline.run(draft);
        Ok(Report {
            batch,
            run,
            missing_sections,
        })
    }
}
