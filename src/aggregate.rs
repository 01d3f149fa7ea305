//! Render a retrieval batch as analysis input text.
//!
//! Successful results are grouped by priority tier, most important first,
//! each with its purpose, query, content and sources. Failed results are
//! left out; the header line records how many succeeded.

use std::fmt::Write;

use report_harness_core::models::{Priority, RetrievalBatch, RetrievalRequest};

fn tier_heading(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "Core information",
        Priority::Medium => "Important information",
        Priority::Low => "Supplementary information",
    }
}

/// Format the successful results of `batch` for the draft generator.
///
/// `requests` supplies purpose and priority for each result; results whose
/// request id is unknown are ignored.
pub fn format_for_analysis(
    subject: &str,
    requests: &[RetrievalRequest],
    batch: &RetrievalBatch,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} - collected information\n", subject);
    let _ = writeln!(
        out,
        "Successful queries: {}/{}\n",
        batch.success_count(),
        batch.total()
    );

    for tier in Priority::ALL {
        let entries: Vec<_> = requests
            .iter()
            .filter(|r| r.priority == tier)
            .filter_map(|r| {
                batch
                    .get(&r.id)
                    .filter(|res| res.is_success())
                    .map(|res| (r, res))
            })
            .collect();
        if entries.is_empty() {
            continue;
        }

        let _ = writeln!(out, "## {}\n", tier_heading(tier));
        for (request, result) in entries {
            let _ = writeln!(out, "### {}", request.purpose);
            let _ = writeln!(out, "Query: {}\n", request.query);
            let _ = writeln!(out, "{}\n", result.content.trim());
            if !result.citations.is_empty() {
                let _ = writeln!(out, "Sources:");
                for citation in &result.citations {
                    let _ = writeln!(out, "- {}", citation);
                }
                out.push('\n');
            }
            out.push_str("---\n\n");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use report_harness_core::models::{ErrorKind, RetrievalResult};

    fn requests() -> Vec<RetrievalRequest> {
        vec![
            RetrievalRequest::new("q1", "rev", "Financials", Priority::High),
            RetrievalRequest::new("q2", "risk", "Risks", Priority::Low),
            RetrievalRequest::new("q3", "share", "Market share", Priority::Medium),
            RetrievalRequest::new("q4", "news", "News", Priority::High),
        ]
    }

    #[test]
    fn groups_by_tier_and_skips_failures() {
        let batch = RetrievalBatch::new(
            vec![
                RetrievalResult::success("q1", "Revenue $46.7B", vec!["https://a".into()], 1),
                RetrievalResult::success("q2", "Supply risk", vec![], 1),
                RetrievalResult::success("q3", "80% share", vec![], 2),
                RetrievalResult::failure("q4", ErrorKind::Timeout, "timed out", 3),
            ],
            false,
        );
        let text = format_for_analysis("NVIDIA", &requests(), &batch);

        assert!(text.starts_with("# NVIDIA - collected information\n"));
        assert!(text.contains("Successful queries: 3/4"));
        let core = text.find("## Core information").unwrap();
        let important = text.find("## Important information").unwrap();
        let supplementary = text.find("## Supplementary information").unwrap();
        assert!(core < important && important < supplementary);
        assert!(text.contains("### Financials\nQuery: rev\n\nRevenue $46.7B"));
        assert!(text.contains("- https://a"));
        assert!(!text.contains("### News"));
    }

    #[test]
    fn empty_tiers_are_omitted() {
        let batch = RetrievalBatch::new(
            vec![
                RetrievalResult::success("q1", "x", vec![], 1),
                RetrievalResult::failure("q2", ErrorKind::AuthFailure, "no", 1),
                RetrievalResult::failure("q3", ErrorKind::AuthFailure, "no", 1),
                RetrievalResult::failure("q4", ErrorKind::AuthFailure, "no", 1),
            ],
            false,
        );
        let text = format_for_analysis("X", &requests(), &batch);
        assert!(text.contains("## Core information"));
        assert!(!text.contains("## Important information"));
        assert!(!text.contains("## Supplementary information"));
    }
}
