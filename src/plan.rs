//! Planner output → retrieval requests.
//!
//! The planner is an external model that answers with JSON, often wrapped
//! in a fenced block or surrounded by chatter:
//!
//! ```json
//! {"queries": [
//!   {"query": "NVIDIA Q2 FY2026 revenue", "purpose": "Latest financials", "priority": "high"},
//!   "NVIDIA data center market share"
//! ]}
//! ```
//!
//! Entries may be objects or bare strings. [`requests_from_plan`] caps the
//! list, fills in missing purposes and priorities, and assigns ids
//! `q1..qN` in plan order.

use anyhow::{bail, Context, Result};
use serde_json::Value;

use report_harness_core::models::{Priority, RetrievalRequest};

/// Strip a ```` ```json ```` (or bare ```` ``` ````) fence and any text
/// around the outermost JSON value.
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();
    let body = if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        }
    } else {
        trimmed
    };
    let body = body.trim();

    let open = body.find(['{', '[']);
    let close = body.rfind(['}', ']']);
    match (open, close) {
        (Some(open), Some(close)) if close > open => &body[open..=close],
        _ => body,
    }
}

/// Parse a planner response into at most `max_queries` requests.
pub fn requests_from_plan(response: &str, max_queries: usize) -> Result<Vec<RetrievalRequest>> {
    let json: Value = serde_json::from_str(extract_json(response))
        .with_context(|| "Failed to parse query plan JSON")?;

    let entries = match &json {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("queries").or_else(|| {
            map.get("plan")
                .and_then(|p| p.get("queries"))
        }) {
            Some(Value::Array(items)) => items,
            _ => bail!("Query plan is missing a 'queries' array"),
        },
        _ => bail!("Query plan must be a JSON object or array"),
    };

    let mut requests = Vec::new();
    for entry in entries {
        if requests.len() >= max_queries {
            break;
        }
        let position = requests.len();
        let Some((query, purpose, priority)) = read_entry(entry)? else {
            continue;
        };

        requests.push(RetrievalRequest::new(
            format!("q{}", position + 1),
            query,
            purpose.unwrap_or_else(|| format!("Query {}", position + 1)),
            priority.unwrap_or_else(|| Priority::for_position(position)),
        ));
    }

    if requests.is_empty() {
        bail!("Query plan contains no usable queries");
    }
    Ok(requests)
}

type Entry = (String, Option<String>, Option<Priority>);

/// Read one plan entry. Entries with no query text are skipped.
fn read_entry(entry: &Value) -> Result<Option<Entry>> {
    match entry {
        Value::String(q) if !q.trim().is_empty() => Ok(Some((q.trim().to_string(), None, None))),
        Value::Object(map) => {
            let Some(query) = map
                .get("query")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|q| !q.is_empty())
            else {
                return Ok(None);
            };
            let purpose = map
                .get("purpose")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string);
            let priority = match map.get("priority").and_then(Value::as_str) {
                Some(p) => Some(
                    p.parse::<Priority>()
                        .with_context(|| format!("Invalid priority for query '{}'", query))?,
                ),
                None => None,
            };
            Ok(Some((query.to_string(), purpose, priority)))
        }
        _ => Ok(None),
    }
}

/// Default plan used when the planner is unavailable.
pub fn fallback_plan(subject: &str, max_queries: usize) -> Vec<RetrievalRequest> {
    let templates = [
        ("latest financial results revenue profit", "Latest financials", Priority::High),
        ("valuation PE ratio market cap stock price analysis", "Valuation metrics", Priority::High),
        ("recent news major events announcements", "Recent news", Priority::High),
        ("competitive advantage market position industry", "Competitive position", Priority::Medium),
        ("growth forecast future outlook strategy", "Growth outlook", Priority::Medium),
        ("analyst ratings price target recommendations", "Analyst views", Priority::Medium),
        ("risks challenges concerns", "Risk factors", Priority::Low),
        ("industry trends market conditions macro environment", "Industry trends", Priority::Low),
    ];
    templates
        .iter()
        .take(max_queries)
        .enumerate()
        .map(|(i, (suffix, purpose, priority))| {
            RetrievalRequest::new(
                format!("q{}", i + 1),
                format!("{} {}", subject, suffix),
                *purpose,
                *priority,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_plan_with_mixed_entries() {
        let response = r#"Here is the plan:
```json
{"queries": [
  {"query": "NVIDIA Q2 revenue", "purpose": "Financials", "priority": "high"},
  "NVIDIA market share",
  {"query": "NVIDIA risks", "priority": "LOW"}
]}
```"#;
        let reqs = requests_from_plan(response, 8).unwrap();
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[0].id, "q1");
        assert_eq!(reqs[0].purpose, "Financials");
        assert_eq!(reqs[1].query, "NVIDIA market share");
        assert_eq!(reqs[1].purpose, "Query 2");
        assert_eq!(reqs[1].priority, Priority::High);
        assert_eq!(reqs[2].purpose, "Query 3");
        assert_eq!(reqs[2].priority, Priority::Low);
    }

    #[test]
    fn caps_at_max_queries_and_assigns_positional_priority() {
        let queries: Vec<String> = (1..=12).map(|i| format!("\"query {}\"", i)).collect();
        let response = format!("{{\"queries\": [{}]}}", queries.join(","));
        let reqs = requests_from_plan(&response, 8).unwrap();
        assert_eq!(reqs.len(), 8);
        assert_eq!(reqs[7].id, "q8");
        let tiers: Vec<Priority> = reqs.iter().map(|r| r.priority).collect();
        assert_eq!(&tiers[..3], &[Priority::High; 3]);
        assert_eq!(&tiers[3..6], &[Priority::Medium; 3]);
        assert_eq!(&tiers[6..], &[Priority::Low; 2]);
    }

    #[test]
    fn accepts_bare_array_and_nested_plan() {
        assert_eq!(requests_from_plan(r#"["a", "b"]"#, 8).unwrap().len(), 2);
        let nested = r#"{"status": "success", "plan": {"queries": ["a"]}}"#;
        assert_eq!(requests_from_plan(nested, 8).unwrap().len(), 1);
    }

    #[test]
    fn skips_entries_without_query() {
        let reqs = requests_from_plan(r#"{"queries": [{"purpose": "x"}, 7, "real"]}"#, 8).unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].id, "q1");
        assert_eq!(reqs[0].query, "real");
    }

    #[test]
    fn rejects_missing_queries_and_bad_priority() {
        assert!(requests_from_plan(r#"{"items": []}"#, 8).is_err());
        assert!(requests_from_plan("not json at all", 8).is_err());
        assert!(requests_from_plan(r#"{"queries": [{"query": "a", "priority": "urgent"}]}"#, 8).is_err());
        assert!(requests_from_plan(r#"{"queries": []}"#, 8).is_err());
    }

    #[test]
    fn fallback_plan_is_tiered() {
        let reqs = fallback_plan("NVIDIA", 8);
        assert_eq!(reqs.len(), 8);
        assert!(reqs[0].query.starts_with("NVIDIA "));
        assert_eq!(reqs[0].priority, Priority::High);
        assert_eq!(reqs[7].priority, Priority::Low);
        assert_eq!(fallback_plan("X", 3).len(), 3);
    }
}
