//! Structural validation gate.
//!
//! Counts well-formed tables in a section and compares the count against
//! the section's required minimum. Pure inspection: nothing is repaired
//! and a shortfall is reported, never raised.

use crate::models::{DocumentSection, ValidationReport};
use crate::table::{count_quarantined, scan_tables};

/// Number of well-formed tables in `text` (fenced regions excluded).
pub fn count_tables(text: &str) -> usize {
    scan_tables(text).len()
}

pub fn validate_text(name: &str, text: &str, required_min: usize) -> ValidationReport {
    let table_count = count_tables(text);
    ValidationReport {
        section: name.to_string(),
        table_count,
        required_min,
        passed: table_count >= required_min,
        quarantined: count_quarantined(text),
    }
}

pub fn validate_section(section: &DocumentSection, required_min: usize) -> ValidationReport {
    validate_text(&section.name, &section.text, required_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(n: usize) -> String {
        (0..n)
            .map(|i| format!("| Metric | Value |\n| --- | --- |\n| Row {i} | {i}% |"))
            .collect::<Vec<_>>()
            .join("\n\nSome commentary.\n\n")
    }

    #[test]
    fn exactly_minimum_passes() {
        let section = DocumentSection::new("valuationAnalysis", tables(3));
        let report = validate_section(&section, 3);
        assert_eq!(report.table_count, 3);
        assert!(report.passed);
    }

    #[test]
    fn one_fewer_fails() {
        let section = DocumentSection::new("valuationAnalysis", tables(2));
        let report = validate_section(&section, 3);
        assert_eq!(report.table_count, 2);
        assert!(!report.passed);
    }

    #[test]
    fn pure_prose_section() {
        let section = DocumentSection::new(
            "growthCatalysts",
            "Demand for accelerators remains strong and supply is improving.",
        );
        let report = validate_section(&section, 3);
        assert_eq!(report.table_count, 0);
        assert!(!report.passed);
        assert_eq!(report.required_min, 3);
    }

    #[test]
    fn quarantined_blocks_are_counted_separately() {
        let text = format!("{}\n\n```unparsed\nGarbledTableText$1B\n```", tables(1));
        let report = validate_text("businessSegments", &text, 1);
        assert_eq!(report.table_count, 1);
        assert_eq!(report.quarantined, 1);
        assert!(report.passed);
    }

    #[test]
    fn zero_minimum_always_passes() {
        assert!(validate_text("extra", "", 0).passed);
    }
}
