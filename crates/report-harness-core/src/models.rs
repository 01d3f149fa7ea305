//! Core data models used throughout Report Harness.
//!
//! These types represent the retrieval requests, per-item results, and
//! document sections that flow through the collection and reconstruction
//! pipeline. Everything here is plain owned data; nothing is shared
//! mutably between runs.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Priority tier assigned to a retrieval request by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// All tiers, most important first.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Positional default used when the planner omits a priority:
    /// the first three queries are high, the next three medium, the rest low.
    pub fn for_position(index: usize) -> Self {
        match index {
            0..=2 => Priority::High,
            3..=5 => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => bail!("Unknown priority: '{}'. Must be high, medium, or low.", other),
        }
    }
}

/// One query to issue against the search service.
///
/// Immutable once created; produced by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub id: String,
    pub query: String,
    pub purpose: String,
    pub priority: Priority,
}

impl RetrievalRequest {
    pub fn new(
        id: impl Into<String>,
        query: impl Into<String>,
        purpose: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            purpose: purpose.into(),
            priority,
        }
    }
}

/// Failure class reported by the search service boundary.
///
/// `Timeout`, `RateLimited` and `ServerError` are transient and retried;
/// everything else fails the item immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    ServerError,
    MalformedResponse,
    AuthFailure,
    /// The batch was cancelled before this item resolved.
    Cancelled,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStatus {
    Success,
    Error,
}

/// The resolved outcome of exactly one [`RetrievalRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub request_id: String,
    pub status: RetrievalStatus,
    pub content: String,
    pub citations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Number of service calls made for this request (0 if never dispatched).
    pub attempts: u32,
}

impl RetrievalResult {
    pub fn success(
        request_id: impl Into<String>,
        content: impl Into<String>,
        citations: Vec<String>,
        attempts: u32,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            status: RetrievalStatus::Success,
            content: content.into(),
            citations,
            error: None,
            error_kind: None,
            attempts,
        }
    }

    pub fn failure(
        request_id: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            status: RetrievalStatus::Error,
            content: String::new(),
            citations: Vec::new(),
            error: Some(message.into()),
            error_kind: Some(kind),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RetrievalStatus::Success
    }
}

/// Ordered results of one collection cycle.
///
/// `results[i]` always belongs to the i-th request that was submitted,
/// regardless of completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalBatch {
    results: Vec<RetrievalResult>,
    total: usize,
    success_count: usize,
    cancelled: bool,
}

impl RetrievalBatch {
    pub fn new(results: Vec<RetrievalResult>, cancelled: bool) -> Self {
        let total = results.len();
        let success_count = results.iter().filter(|r| r.is_success()).count();
        Self {
            results,
            total,
            success_count,
            cancelled,
        }
    }

    pub fn results(&self) -> &[RetrievalResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<RetrievalResult> {
        self.results
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    /// True when the batch was cut short by cancellation.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_empty_success(&self) -> bool {
        self.success_count == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &RetrievalResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn get(&self, request_id: &str) -> Option<&RetrievalResult> {
        self.results.iter().find(|r| r.request_id == request_id)
    }
}

/// One named section of a generated report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub name: String,
    pub text: String,
}

impl DocumentSection {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Result of one validation-gate inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub section: String,
    pub table_count: usize,
    pub required_min: usize,
    pub passed: bool,
    /// Number of quarantined (`unparsed`) blocks present in the section.
    #[serde(default)]
    pub quarantined: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_round_trips_through_str() {
        for p in Priority::ALL {
            assert_eq!(p.as_str().parse::<Priority>().unwrap(), p);
        }
        assert_eq!(" HIGH ".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn positional_priority() {
        assert_eq!(Priority::for_position(0), Priority::High);
        assert_eq!(Priority::for_position(2), Priority::High);
        assert_eq!(Priority::for_position(3), Priority::Medium);
        assert_eq!(Priority::for_position(5), Priority::Medium);
        assert_eq!(Priority::for_position(6), Priority::Low);
        assert_eq!(Priority::for_position(40), Priority::Low);
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::ServerError.is_retryable());
        assert!(!ErrorKind::MalformedResponse.is_retryable());
        assert!(!ErrorKind::AuthFailure.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }

    #[test]
    fn batch_counts_are_derived() {
        let batch = RetrievalBatch::new(
            vec![
                RetrievalResult::success("q1", "a", vec![], 1),
                RetrievalResult::failure("q2", ErrorKind::Timeout, "timed out", 3),
                RetrievalResult::success("q3", "c", vec!["https://example.com".into()], 2),
            ],
            false,
        );
        assert_eq!(batch.total(), 3);
        assert_eq!(batch.success_count(), 2);
        assert!(!batch.is_empty_success());
        let failed: Vec<&str> = batch.failures().map(|r| r.request_id.as_str()).collect();
        assert_eq!(failed, vec!["q2"]);
        assert_eq!(batch.get("q3").unwrap().citations.len(), 1);
    }

    #[test]
    fn result_serializes_error_kind_in_snake_case() {
        let r = RetrievalResult::failure("q1", ErrorKind::RateLimited, "429", 3);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_kind"], "rate_limited");
    }
}
