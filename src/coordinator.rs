//! Concurrent retrieval coordinator.
//!
//! Issues every [`RetrievalRequest`] as an independent call to a
//! [`SearchService`], bounded by a concurrency cap, a per-call timeout and
//! a [`RetryPolicy`]. Each request resolves to exactly one
//! [`RetrievalResult`]; one failure never blocks or aborts the others.
//!
//! ```text
//!  requests ──▶ JoinSet ──▶ Semaphore(K) ──▶ timeout(submit) ──▶ slot[i]
//!                  │                            │
//!                  │                     retryable? ──▶ backoff ──┘
//!                  ▼
//!           RetrievalBatch (request order)
//! ```
//!
//! [`Coordinator::collect`] returns only after every worker has finished;
//! the `JoinSet` is drained before returning, so no task outlives the call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use report_harness_core::models::{ErrorKind, RetrievalBatch, RetrievalRequest, RetrievalResult};

use crate::config::RetrievalConfig;
use crate::progress::{CollectProgressEvent, CollectProgressReporter, NoProgress};
use crate::retry::RetryPolicy;
use crate::service::{SearchService, ServiceError};

/// Shared, cheaply cloned state handed to every worker.
#[derive(Clone)]
struct WorkerContext {
    service: Arc<dyn SearchService>,
    progress: Arc<dyn CollectProgressReporter>,
    retry: RetryPolicy,
    timeout: Duration,
}

pub struct Coordinator {
    ctx: WorkerContext,
    max_concurrency: usize,
}

impl Coordinator {
    /// Coordinator with default limits: 5 in flight, 60 s timeout, 3 attempts.
    pub fn new(service: Arc<dyn SearchService>) -> Self {
        Self::from_config(service, &RetrievalConfig::default())
    }

    pub fn from_config(service: Arc<dyn SearchService>, config: &RetrievalConfig) -> Self {
        Self {
            ctx: WorkerContext {
                service,
                progress: Arc::new(NoProgress),
                retry: config.retry_policy(),
                timeout: config.timeout(),
            },
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.ctx.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.ctx.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn CollectProgressReporter>) -> Self {
        self.ctx.progress = progress;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Resolve every request. Never returns early; zero successes still
    /// yield a batch with `success_count == 0`.
    pub async fn collect(&self, requests: &[RetrievalRequest]) -> RetrievalBatch {
        self.collect_with_cancel(requests, CancellationToken::new())
            .await
    }

    /// Like [`collect`](Self::collect), but stops early when `cancel` fires.
    ///
    /// Queued requests are not dispatched, in-flight calls are abandoned and
    /// no further retries happen. Every request still gets a result, with
    /// error kind `cancelled` for the ones cut short.
    pub async fn collect_with_cancel(
        &self,
        requests: &[RetrievalRequest],
        cancel: CancellationToken,
    ) -> RetrievalBatch {
        let total = requests.len();
        info!(
            total,
            max_concurrency = self.max_concurrency,
            service = self.ctx.service.name(),
            "collecting"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut workers = JoinSet::new();
        for (index, request) in requests.iter().cloned().enumerate() {
            let ctx = self.ctx.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            workers.spawn(async move {
                let result = resolve_request(&ctx, &request, semaphore, cancel).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<RetrievalResult>> = vec![None; total];
        let mut done = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => {
                    done += 1;
                    self.ctx.progress.report(CollectProgressEvent::Resolved {
                        request_id: result.request_id.clone(),
                        success: result.is_success(),
                        done,
                        total,
                    });
                    slots[index] = Some(result);
                }
                Err(e) => warn!(error = %e, "retrieval worker did not complete"),
            }
        }

        let results: Vec<RetrievalResult> = slots
            .into_iter()
            .zip(requests)
            .map(|(slot, request)| {
                slot.unwrap_or_else(|| {
                    RetrievalResult::failure(
                        &request.id,
                        ErrorKind::ServerError,
                        "retrieval worker did not complete",
                        0,
                    )
                })
            })
            .collect();

        let cancelled = results
            .iter()
            .any(|r| r.error_kind == Some(ErrorKind::Cancelled));
        let batch = RetrievalBatch::new(results, cancelled);
        info!(
            total = batch.total(),
            success = batch.success_count(),
            cancelled,
            "collection finished"
        );
        batch
    }
}

fn cancelled(request: &RetrievalRequest, attempts: u32) -> RetrievalResult {
    RetrievalResult::failure(
        &request.id,
        ErrorKind::Cancelled,
        "collection cancelled",
        attempts,
    )
}

/// One worker: wait for a slot, then submit with timeout and retry.
async fn resolve_request(
    ctx: &WorkerContext,
    request: &RetrievalRequest,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) -> RetrievalResult {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return cancelled(request, 0),
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return cancelled(request, 0),
        },
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        ctx.progress.report(CollectProgressEvent::Dispatched {
            request_id: request.id.clone(),
            attempt,
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(request, attempt),
            r = tokio::time::timeout(ctx.timeout, ctx.service.submit(&request.query)) => r,
        };

        let err = match outcome {
            Ok(Ok(resp)) => {
                debug!(request_id = %request.id, attempt, "retrieval succeeded");
                return RetrievalResult::success(&request.id, resp.content, resp.citations, attempt);
            }
            Ok(Err(e)) => e,
            Err(_) => ServiceError::new(
                ErrorKind::Timeout,
                format!("no response within {} ms", ctx.timeout.as_millis()),
            ),
        };

        if !ctx.retry.should_retry(err.kind, attempt) {
            warn!(
                request_id = %request.id,
                attempt,
                kind = %err.kind,
                "retrieval failed: {}",
                err.message
            );
            return RetrievalResult::failure(&request.id, err.kind, err.message, attempt);
        }

        let delay = ctx.retry.delay_before(attempt + 1);
        debug!(
            request_id = %request.id,
            attempt,
            kind = %err.kind,
            delay_ms = delay.as_millis() as u64,
            "retrying"
        );
        ctx.progress.report(CollectProgressEvent::Retrying {
            request_id: request.id.clone(),
            attempt,
            kind: err.kind,
            delay_ms: delay.as_millis() as u64,
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(request, attempt),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
