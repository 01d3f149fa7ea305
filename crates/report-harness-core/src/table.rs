//! Canonical pipe-table grid.
//!
//! A [`TableBlock`] is either a uniform grid (header plus rows of the same
//! width) or a quarantined block that carries the original text verbatim.
//! Grids render to the canonical markdown form
//!
//! ```text
//! | Metric | Q2 | YoY |
//! | --- | --- | --- |
//! | Revenue | $46.7B | +56% |
//! ```
//!
//! and quarantined blocks render inside an `unparsed` fence. Parsing a
//! canonical rendering and rendering it again yields the same text.
//!
//! Canonical cells carry no emphasis markers. The reconstructor strips
//! them from delimited rows, so a grid whose cells contain `**x**` is not
//! a fixpoint of reconstruction; its cleaned rendering is.

use serde::Serialize;

/// Opening line of a quarantine fence.
pub const UNPARSED_FENCE: &str = "```unparsed";
/// Plain fence delimiter.
pub const FENCE: &str = "```";

/// Body of a [`TableBlock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableContent {
    Rows { rows: Vec<Vec<String>> },
    Unparsed { original: String },
}

/// A reconstructed table, or the verbatim text that could not be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableBlock {
    header: Vec<String>,
    content: TableContent,
}

impl TableBlock {
    /// Build a grid. Returns `None` when the header is empty or any row's
    /// width differs from the header's.
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Option<Self> {
        if header.is_empty() || rows.iter().any(|r| r.len() != header.len()) {
            return None;
        }
        Some(Self {
            header,
            content: TableContent::Rows { rows },
        })
    }

    /// Quarantine `original` verbatim.
    pub fn unparsed(original: impl Into<String>) -> Self {
        Self {
            header: Vec::new(),
            content: TableContent::Unparsed {
                original: original.into(),
            },
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        match &self.content {
            TableContent::Rows { rows } => rows,
            TableContent::Unparsed { .. } => &[],
        }
    }

    pub fn content(&self) -> &TableContent {
        &self.content
    }

    pub fn is_unparsed(&self) -> bool {
        matches!(self.content, TableContent::Unparsed { .. })
    }

    pub fn width(&self) -> usize {
        self.header.len()
    }

    /// Canonical markdown rendering (no trailing newline).
    pub fn render(&self) -> String {
        match &self.content {
            TableContent::Rows { rows } => {
                let mut lines = Vec::with_capacity(rows.len() + 2);
                lines.push(render_row(&self.header));
                lines.push(render_separator(self.header.len()));
                for row in rows {
                    lines.push(render_row(row));
                }
                lines.join("\n")
            }
            TableContent::Unparsed { original } => {
                format!("{}\n{}\n{}", UNPARSED_FENCE, original, FENCE)
            }
        }
    }
}

/// True for lines that open or close a fenced block.
pub fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

/// Split a `| a | b |` row into trimmed cells.
///
/// Returns `None` unless the trimmed line both starts and ends with an
/// unescaped pipe. Escaped pipes (`\|`) stay inside their cell.
pub fn parse_pipe_row(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if trimmed.len() < 2 || !trimmed.starts_with('|') || !trimmed.ends_with('|') {
        return None;
    }
    if trimmed.ends_with("\\|") {
        return None;
    }

    let inner = &trimmed[1..trimmed.len() - 1];
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for ch in inner.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                current.push(ch);
                escaped = true;
            }
            '|' => {
                cells.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    cells.push(current.trim().to_string());
    Some(cells)
}

/// True when every cell is a `---` style separator (`:` alignment allowed).
pub fn is_separator_row(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells.iter().all(|c| {
            let body = c.trim_start_matches(':').trim_end_matches(':');
            !body.is_empty() && body.chars().all(|ch| ch == '-')
        })
}

/// Render cells as `| a | b |`. Bare pipes inside a cell are escaped;
/// already escaped ones are kept as they are.
pub fn render_row(cells: &[String]) -> String {
    let cells: Vec<String> = cells.iter().map(|c| escape_pipes(c)).collect();
    format!("| {} |", cells.join(" | "))
}

fn escape_pipes(cell: &str) -> String {
    if !cell.contains('|') {
        return cell.to_string();
    }
    let mut out = String::with_capacity(cell.len() + 2);
    let mut escaped = false;
    for ch in cell.chars() {
        if escaped {
            out.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                out.push(ch);
                escaped = true;
            }
            '|' => out.push_str("\\|"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn render_separator(width: usize) -> String {
    render_row(&vec!["---".to_string(); width])
}

/// Parse a run of pipe rows into a well-formed grid.
///
/// Well-formed means: a header row, a separator of the same width, at
/// least one data row, and every data row the header's width.
pub fn parse_table(lines: &[&str]) -> Option<TableBlock> {
    if lines.len() < 3 {
        return None;
    }
    let header = parse_pipe_row(lines[0])?;
    if is_separator_row(&header) {
        return None;
    }
    let separator = parse_pipe_row(lines[1])?;
    if !is_separator_row(&separator) || separator.len() != header.len() {
        return None;
    }

    let mut rows = Vec::with_capacity(lines.len() - 2);
    for line in &lines[2..] {
        let cells = parse_pipe_row(line)?;
        if is_separator_row(&cells) {
            return None;
        }
        rows.push(cells);
    }
    TableBlock::new(header, rows)
}

/// Every well-formed table in `text`, in order. Fenced regions are skipped.
pub fn scan_tables(text: &str) -> Vec<TableBlock> {
    let mut tables = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        if is_fence_line(line) {
            flush_run(&mut run, &mut tables);
            in_fence = !in_fence;
            continue;
        }
        if !in_fence && parse_pipe_row(line).is_some() {
            run.push(line);
        } else {
            flush_run(&mut run, &mut tables);
        }
    }
    flush_run(&mut run, &mut tables);
    tables
}

fn flush_run(run: &mut Vec<&str>, tables: &mut Vec<TableBlock>) {
    if let Some(table) = parse_table(run) {
        tables.push(table);
    }
    run.clear();
}

/// Number of quarantine fences in `text`.
pub fn count_quarantined(text: &str) -> usize {
    text.lines().filter(|l| l.trim() == UNPARSED_FENCE).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn renders_canonical_grid() {
        let t = TableBlock::new(
            cells(&["Metric", "Value"]),
            vec![cells(&["Revenue", "$46.7B"])],
        )
        .unwrap();
        assert_eq!(
            t.render(),
            "| Metric | Value |\n| --- | --- |\n| Revenue | $46.7B |"
        );
    }

    #[test]
    fn rejects_ragged_rows() {
        assert!(TableBlock::new(cells(&["A", "B"]), vec![cells(&["1"])]).is_none());
        assert!(TableBlock::new(vec![], vec![]).is_none());
    }

    #[test]
    fn parse_then_render_is_identity() {
        let text = "| Metric | Q2 FY2026 | YoY Change |\n| --- | --- | --- |\n| Revenue | $46.7B | +56% |\n| Gross Margin | 75% | +200bps |";
        let lines: Vec<&str> = text.lines().collect();
        let table = parse_table(&lines).unwrap();
        assert_eq!(table.render(), text);
    }

    #[test]
    fn pipe_row_parsing() {
        assert_eq!(parse_pipe_row("|a|b|"), Some(cells(&["a", "b"])));
        assert_eq!(parse_pipe_row("  | a |  |  "), Some(cells(&["a", ""])));
        assert_eq!(parse_pipe_row(r"| a \| b | c |"), Some(cells(&[r"a \| b", "c"])));
        assert_eq!(parse_pipe_row("a | b"), None);
        assert_eq!(parse_pipe_row("|"), None);
    }

    #[test]
    fn bare_pipes_in_cells_are_escaped() {
        let row = render_row(&cells(&["Gross|Margin", r"a \| b", "75%"]));
        assert_eq!(row, r"| Gross\|Margin | a \| b | 75% |");
        let parsed = parse_pipe_row(&row).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(render_row(&parsed), row);
    }

    #[test]
    fn separator_detection() {
        assert!(is_separator_row(&cells(&["---", ":---:", "--:"])));
        assert!(!is_separator_row(&cells(&["---", "x"])));
        assert!(!is_separator_row(&cells(&[":"])));
    }

    #[test]
    fn parse_requires_separator_and_data() {
        assert!(parse_table(&["| a | b |", "| 1 | 2 |", "| 3 | 4 |"]).is_none());
        assert!(parse_table(&["| a | b |", "| --- | --- |"]).is_none());
        assert!(parse_table(&["| a | b |", "| --- |", "| 1 | 2 |"]).is_none());
        assert!(parse_table(&["| a | b |", "| --- | --- |", "| 1 |"]).is_none());
    }

    #[test]
    fn scan_skips_fenced_tables() {
        let text = "Intro\n\n| a | b |\n| --- | --- |\n| 1 | 2 |\n\n```\n| x | y |\n| --- | --- |\n| 1 | 2 |\n```\n\n| c |\n| --- |\n| 3 |\n";
        let tables = scan_tables(text);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].header(), &["c".to_string()]);
    }

    #[test]
    fn unparsed_renders_fenced() {
        let t = TableBlock::unparsed("SegmentRevenue???");
        assert!(t.is_unparsed());
        assert!(t.rows().is_empty());
        assert_eq!(t.render(), "```unparsed\nSegmentRevenue???\n```");
        assert_eq!(count_quarantined(&t.render()), 1);
    }
}
