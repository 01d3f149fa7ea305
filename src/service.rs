//! Search service boundary and implementations.
//!
//! - **[`SonarService`]** posts a chat-completions request to a
//!   Perplexity-compatible endpoint and returns the answer text and its
//!   citations.
//! - **[`DisabledService`]** fails every call; used when no provider is
//!   configured.
//!
//! # Error mapping
//!
//! | Outcome | [`ErrorKind`] |
//! |---------|---------------|
//! | 200 with `choices[0].message.content` | success |
//! | 200 missing `choices` or `content` | `malformed_response` |
//! | 401 / 403 | `auth_failure` |
//! | 429 | `rate_limited` |
//! | 5xx | `server_error` |
//! | other 4xx | `malformed_response` |
//! | client timeout | `timeout` |
//! | connection error | `server_error` |
//!
//! Retrying is the coordinator's job; a service makes exactly one call per
//! [`SearchService::submit`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use report_harness_core::models::ErrorKind;

use crate::config::{RetrievalConfig, ServiceConfig};

/// Successful answer from the search service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub content: String,
    pub citations: Vec<String>,
}

/// Classified failure from the search service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// A search-and-summarize backend.
///
/// Implement this to plug in another provider or an in-process fake.
///
/// ```rust
/// use async_trait::async_trait;
/// use report_harness::service::{SearchService, ServiceError, ServiceResponse};
///
/// struct Echo;
///
/// #[async_trait]
/// impl SearchService for Echo {
///     fn name(&self) -> &str { "echo" }
///
///     async fn submit(&self, query: &str) -> Result<ServiceResponse, ServiceError> {
///         Ok(ServiceResponse { content: query.to_string(), citations: vec![] })
///     }
/// }
/// ```
#[async_trait]
pub trait SearchService: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, query: &str) -> Result<ServiceResponse, ServiceError>;
}

/// Build the service named by `[service].provider`.
pub fn create_service(
    service: &ServiceConfig,
    retrieval: &RetrievalConfig,
) -> Result<Arc<dyn SearchService>> {
    match service.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledService)),
        "sonar" => Ok(Arc::new(SonarService::new(service, retrieval.timeout())?)),
        other => bail!("Unknown service provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledService;

#[async_trait]
impl SearchService for DisabledService {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn submit(&self, _query: &str) -> Result<ServiceResponse, ServiceError> {
        Err(ServiceError::new(
            ErrorKind::AuthFailure,
            "search service is disabled; set [service].provider",
        ))
    }
}

// ============ Sonar ============

/// Chat-completions search client (Perplexity Sonar wire format).
pub struct SonarService {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
}

impl SonarService {
    /// # Errors
    ///
    /// Fails if the API key environment variable is unset or the HTTP
    /// client cannot be built.
    pub fn new(config: &ServiceConfig, timeout: Duration) -> Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("{} environment variable not set", config.api_key_env),
        };
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
        })
    }

    fn request_body(&self, query: &str) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": query },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

#[async_trait]
impl SearchService for SonarService {
    fn name(&self) -> &str {
        &self.model
    }

    async fn submit(&self, query: &str) -> Result<ServiceResponse, ServiceError> {
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(query))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = resp.status();
        if status.is_success() {
            let json: Value = resp.json().await.map_err(|e| {
                ServiceError::new(ErrorKind::MalformedResponse, format!("invalid JSON: {}", e))
            })?;
            return parse_chat_response(&json);
        }

        let body_text = resp.text().await.unwrap_or_default();
        let excerpt: String = body_text.chars().take(200).collect();
        Err(ServiceError::new(
            classify_status(status.as_u16()),
            format!("API error {}: {}", status, excerpt),
        ))
    }
}

/// Map a non-success HTTP status to an error kind.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::AuthFailure,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::MalformedResponse,
    }
}

fn map_transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::new(ErrorKind::Timeout, format!("request timed out: {}", e))
    } else {
        ServiceError::new(ErrorKind::ServerError, format!("connection error: {}", e))
    }
}

/// Extract `choices[0].message.content` and citations from a
/// chat-completions response. Citations are read from the top level
/// first, then from the message.
pub fn parse_chat_response(json: &Value) -> Result<ServiceResponse, ServiceError> {
    let message = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| {
            ServiceError::new(ErrorKind::MalformedResponse, "response missing choices")
        })?;

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            ServiceError::new(ErrorKind::MalformedResponse, "response missing content")
        })?;

    let citations = json
        .get("citations")
        .or_else(|| message.get("citations"))
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(ServiceResponse {
        content: content.to_string(),
        citations,
    })
}
