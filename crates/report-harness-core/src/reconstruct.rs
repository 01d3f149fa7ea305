//! Malformed table reconstruction.
//!
//! The [`Reconstructor`] walks a section line by line:
//!
//! - pipe rows get cell cleanup only (emphasis removed, cells trimmed,
//!   canonical `| a | b |` spacing, `---` separators);
//! - consecutive compact lines are merged and handed to the schema
//!   matchers; the first plausible grid replaces them, otherwise the
//!   original lines are quarantined in an `unparsed` fence. Short rows
//!   with glued values continue an open run, and a camel-case header on
//!   the line just above a run is merged into it when the run cannot be
//!   rebuilt on its own;
//! - fenced blocks, headings and prose pass through untouched.
//!
//! Reconstruction is deterministic and idempotent: its output contains
//! only canonical pipe tables and fences, which it leaves as they are.

use serde::Serialize;
use std::fmt;

use crate::classify::{classify_line, is_compact_row_line, is_table_header_line, LineKind};
use crate::normalize::{strip_emphasis, NormalizeMode};
use crate::schema::{default_matchers, is_plausible, TableMatcher};
use crate::table::{
    is_fence_line, is_separator_row, parse_pipe_row, parse_table, render_row, render_separator,
    TableBlock,
};

/// Outcome of reconstructing one block of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconstruction {
    pub text: String,
    /// Every table in the output, in order: delimited tables that were
    /// already well formed, rebuilt compact tables, and quarantined blocks.
    pub tables: Vec<TableBlock>,
    /// Compact blocks rebuilt into grids.
    pub rebuilt: usize,
    /// Compact blocks emitted verbatim inside an `unparsed` fence.
    pub quarantined: usize,
}

/// Ordered list of schema matchers plus the line scanner that feeds them.
pub struct Reconstructor {
    matchers: Vec<Box<dyn TableMatcher>>,
}

impl Reconstructor {
    /// Reconstructor with the built-in matchers.
    pub fn new() -> Self {
        Self::with_matchers(default_matchers())
    }

    /// Reconstructor trying `matchers` in the given order.
    pub fn with_matchers(matchers: Vec<Box<dyn TableMatcher>>) -> Self {
        Self { matchers }
    }

    pub fn matcher_names(&self) -> Vec<&str> {
        self.matchers.iter().map(|m| m.name()).collect()
    }

    /// Rebuild a merged compact block, or quarantine it.
    pub fn rebuild_block(&self, block: &str) -> TableBlock {
        self.match_block(block).unwrap_or_else(|| TableBlock::unparsed(block))
    }

    fn match_block(&self, block: &str) -> Option<TableBlock> {
        self.matchers
            .iter()
            .find_map(|m| m.attempt(block).filter(is_plausible))
    }

    /// Grid for a detached header line plus the run below it. The run on
    /// its own is tried first so an inline header wins.
    fn match_with_header(&self, header: &str, run: &[&str]) -> Option<(TableBlock, bool)> {
        if let Some(table) = self.match_block(&join_trimmed(run)) {
            return Some((table, false));
        }
        let mut lines = Vec::with_capacity(run.len() + 1);
        lines.push(header);
        lines.extend_from_slice(run);
        self.match_block(&join_trimmed(&lines)).map(|table| (table, true))
    }

    pub fn reconstruct(&self, text: &str) -> Reconstruction {
        let lines: Vec<&str> = text.lines().collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut tables = Vec::new();
        let mut rebuilt = 0;
        let mut quarantined = 0;
        let mut in_fence = false;
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            if in_fence {
                out.push(line.to_string());
                if is_fence_line(line) {
                    in_fence = false;
                }
                i += 1;
                continue;
            }

            let kind = classify_line(line);
            if kind == LineKind::Prose && is_table_header_line(line) {
                let end = run_end(&lines, i + 1);
                if end > i + 1 {
                    let run = &lines[i + 1..end];
                    if let Some((table, merged)) = self.match_with_header(line, run) {
                        if !merged {
                            out.push(line.to_string());
                        }
                        rebuilt += 1;
                        out.push(table.render());
                        tables.push(table);
                        i = end;
                        continue;
                    }
                }
            }

            match kind {
                LineKind::Fence => {
                    in_fence = true;
                    out.push(line.to_string());
                    i += 1;
                }
                LineKind::PipeRow => {
                    let start = i;
                    while i < lines.len() && classify_line(lines[i]) == LineKind::PipeRow {
                        i += 1;
                    }
                    let rows: Vec<String> = lines[start..i].iter().map(|l| clean_row(l)).collect();
                    let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
                    if let Some(table) = parse_table(&refs) {
                        tables.push(table);
                    }
                    out.extend(rows);
                }
                LineKind::Compact => {
                    let start = i;
                    i = run_end(&lines, i + 1);
                    let table = self.rebuild_block(&join_trimmed(&lines[start..i]));
                    if table.is_unparsed() {
                        quarantined += 1;
                    } else {
                        rebuilt += 1;
                    }
                    out.push(table.render());
                    tables.push(table);
                }
                LineKind::Blank | LineKind::Heading | LineKind::Prose => {
                    out.push(line.to_string());
                    i += 1;
                }
            }
        }

        let mut text_out = out.join("\n");
        if text.ends_with('\n') {
            text_out.push('\n');
        }
        Reconstruction {
            text: text_out,
            tables,
            rebuilt,
            quarantined,
        }
    }
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reconstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconstructor")
            .field("matchers", &self.matcher_names())
            .finish()
    }
}

/// End of the compact run continuing at `from`: compact lines and short
/// glued-value rows.
fn run_end(lines: &[&str], from: usize) -> usize {
    let mut end = from;
    while end < lines.len() {
        let line = lines[end];
        let continues = match classify_line(line) {
            LineKind::Compact => true,
            LineKind::Prose => is_compact_row_line(line),
            _ => false,
        };
        if !continues {
            break;
        }
        end += 1;
    }
    end
}

fn join_trimmed(lines: &[&str]) -> String {
    lines.iter().map(|l| l.trim()).collect::<Vec<_>>().join("\n")
}

/// Cell-level cleanup of one delimited row.
fn clean_row(line: &str) -> String {
    match parse_pipe_row(line) {
        Some(cells) if is_separator_row(&cells) => render_separator(cells.len()),
        Some(cells) => {
            let cleaned: Vec<String> = cells
                .iter()
                .map(|c| strip_emphasis(c, NormalizeMode::Cell).trim().to_string())
                .collect();
            render_row(&cleaned)
        }
        None => line.to_string(),
    }
}
