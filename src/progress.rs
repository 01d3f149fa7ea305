//! Collection progress reporting.
//!
//! Reports observable progress during `rh collect` so users see which
//! queries are in flight, which are being retried, and how many are done.
//! Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.

use std::io::Write;

use report_harness_core::models::ErrorKind;

/// A single progress event for a collection cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectProgressEvent {
    /// A request acquired a concurrency slot and is about to be submitted.
    Dispatched { request_id: String, attempt: u32 },
    /// A transient failure; the request will be retried after `delay_ms`.
    Retrying {
        request_id: String,
        attempt: u32,
        kind: ErrorKind,
        delay_ms: u64,
    },
    /// The request resolved. `done` of `total` requests are now resolved.
    Resolved {
        request_id: String,
        success: bool,
        done: usize,
        total: usize,
    },
}

/// Reports collection progress. Implementations write to stderr (human or
/// JSON).
pub trait CollectProgressReporter: Send + Sync {
    fn report(&self, event: CollectProgressEvent);
}

/// Human-friendly progress on stderr: `collect q3  ok  4 / 8`.
pub struct StderrProgress;

impl CollectProgressReporter for StderrProgress {
    fn report(&self, event: CollectProgressEvent) {
        let line = match &event {
            CollectProgressEvent::Dispatched {
                request_id,
                attempt,
            } => format!("collect {}  dispatched (attempt {})\n", request_id, attempt),
            CollectProgressEvent::Retrying {
                request_id,
                attempt,
                kind,
                delay_ms,
            } => format!(
                "collect {}  {} on attempt {}, retrying in {} ms\n",
                request_id, kind, attempt, delay_ms
            ),
            CollectProgressEvent::Resolved {
                request_id,
                success,
                done,
                total,
            } => format!(
                "collect {}  {}  {} / {}\n",
                request_id,
                if *success { "ok" } else { "failed" },
                done,
                total
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl CollectProgressReporter for JsonProgress {
    fn report(&self, event: CollectProgressEvent) {
        let obj = match &event {
            CollectProgressEvent::Dispatched {
                request_id,
                attempt,
            } => serde_json::json!({
                "event": "progress",
                "phase": "dispatched",
                "request_id": request_id,
                "attempt": attempt
            }),
            CollectProgressEvent::Retrying {
                request_id,
                attempt,
                kind,
                delay_ms,
            } => serde_json::json!({
                "event": "progress",
                "phase": "retrying",
                "request_id": request_id,
                "attempt": attempt,
                "error_kind": kind,
                "delay_ms": delay_ms
            }),
            CollectProgressEvent::Resolved {
                request_id,
                success,
                done,
                total,
            } => serde_json::json!({
                "event": "progress",
                "phase": "resolved",
                "request_id": request_id,
                "success": success,
                "n": done,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl CollectProgressReporter for NoProgress {
    fn report(&self, _event: CollectProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse the `--progress` flag value.
    pub fn from_flag(flag: Option<&str>) -> anyhow::Result<Self> {
        match flag {
            None => Ok(Self::default_for_tty()),
            Some("off") | Some("none") => Ok(ProgressMode::Off),
            Some("human") => Ok(ProgressMode::Human),
            Some("json") => Ok(ProgressMode::Json),
            Some(other) => anyhow::bail!(
                "Unknown progress mode: '{}'. Must be off, human, or json.",
                other
            ),
        }
    }

    pub fn reporter(&self) -> std::sync::Arc<dyn CollectProgressReporter> {
        match self {
            ProgressMode::Off => std::sync::Arc::new(NoProgress),
            ProgressMode::Human => std::sync::Arc::new(StderrProgress),
            ProgressMode::Json => std::sync::Arc::new(JsonProgress),
        }
    }
}
