//! Markdown table extraction, rendering and schema migration.
//!
//! A table is located by its header signature: the first pipe-delimited line
//! whose cells match the expected headers (ignoring case and whitespace). The
//! line right after it must be a separator row with the same number of
//! columns. Data rows are the contiguous pipe-delimited lines that follow.
//!
//! ```
//! use labnote_core::table::extract_rows;
//!
//! let text = "# Session\n\n| Date | Time |\n|---|---|\n| 2024-03-05 | 10:00 |\n\nnotes";
//! let rows = extract_rows(text, &["Date", "Time"]);
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows[0]["Time"], "10:00");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::models::RawRow;

static SEPARATOR_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:?-+:?$").expect("separator pattern is valid"));

/// A located table: line span plus the cells of each data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    /// Line index of the header row.
    pub start: usize,
    /// Line index one past the last data row.
    pub end: usize,
    /// Cells of each data row, in document order. Rows keep the cell count
    /// they were written with.
    pub rows: Vec<Vec<String>>,
}

/// Locate the first table whose header matches `headers`.
///
/// Returns `None` when no header matches or when the line after the first
/// matching header is not a separator of the same width. A table with zero
/// data rows is still returned.
pub fn find_table(text: &str, headers: &[&str]) -> Option<TableBlock> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|line| header_matches(line, headers))?;

    let separator = lines.get(start + 1)?;
    if !is_separator(separator, headers.len()) {
        debug!(
            subsystem = "export",
            component = "table",
            op = "find",
            line = start + 2,
            "Header found but separator row is malformed"
        );
        return None;
    }

    let rows: Vec<Vec<String>> = lines[start + 2..]
        .iter()
        .take_while(|line| is_table_line(line))
        .map(|line| split_cells(line))
        .collect();

    let end = start + 2 + rows.len();
    trace!(
        subsystem = "export",
        component = "table",
        start,
        end,
        row_count = rows.len(),
        "Table located"
    );
    Some(TableBlock { start, end, rows })
}

/// Extract data rows keyed by the expected header names.
///
/// Missing trailing cells read as empty; cells beyond the header width are
/// dropped. An absent or malformed table yields no rows.
pub fn extract_rows(text: &str, headers: &[&str]) -> Vec<RawRow> {
    let Some(block) = find_table(text, headers) else {
        return Vec::new();
    };

    block
        .rows
        .into_iter()
        .map(|cells| {
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header.to_string(), cells.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Render a table: header, separator and one line per row.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(render_row(headers.iter().map(|h| h.to_string())));
    lines.push(render_row(headers.iter().map(|_| "---".to_string())));
    for row in rows {
        lines.push(render_row(
            (0..headers.len()).map(|i| row.get(i).cloned().unwrap_or_default()),
        ));
    }
    lines
}

/// Append an empty table (header, separator, one blank row) to `text`.
pub fn append_table(text: &str, headers: &[&str]) -> String {
    let newline = line_ending(text);
    let blank = vec![vec![String::new(); headers.len()]];
    let table = render_table(headers, &blank).join(newline);

    let mut out = text.to_string();
    if !out.is_empty() {
        if !out.ends_with('\n') {
            out.push_str(newline);
        }
        out.push_str(newline);
    }
    out.push_str(&table);
    out.push_str(newline);
    out
}

/// Rewrite the first table with header `from` so it carries header `to`.
///
/// Cells stay under their header; columns that only exist in `to` are
/// inserted blank at their position. Returns `Ok(None)` when there is no
/// `from` table. Every `from` header must also appear in `to`, otherwise data
/// would be dropped and the call fails.
pub fn migrate_table(text: &str, from: &[&str], to: &[&str]) -> Result<Option<String>> {
    let mapping: Vec<Option<usize>> = to
        .iter()
        .map(|target| from.iter().position(|h| normalize(h) == normalize(target)))
        .collect();

    let dropped: Vec<&str> = from
        .iter()
        .filter(|h| !to.iter().any(|t| normalize(t) == normalize(h)))
        .copied()
        .collect();
    if !dropped.is_empty() {
        return Err(Error::InvalidInput(format!(
            "table migration would drop columns: {}",
            dropped.join(", ")
        )));
    }

    let Some(block) = find_table(text, from) else {
        return Ok(None);
    };

    let rows: Vec<Vec<String>> = block
        .rows
        .iter()
        .map(|cells| {
            mapping
                .iter()
                .map(|source| {
                    source
                        .and_then(|i| cells.get(i).cloned())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    let newline = line_ending(text);
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    lines.splice(block.start..block.end, render_table(to, &rows));

    let mut out = lines.join(newline);
    if text.ends_with('\n') {
        out.push_str(newline);
    }

    debug!(
        subsystem = "export",
        component = "table",
        op = "migrate",
        row_count = rows.len(),
        "Migrated table to current header"
    );
    Ok(Some(out))
}

/// Split a pipe-delimited line into trimmed cells. Outer pipes are optional
/// and `\|` is a literal pipe inside a cell.
pub fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = if inner.ends_with('|') && !inner.ends_with("\\|") {
        &inner[..inner.len() - 1]
    } else {
        inner
    };

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

fn render_row(cells: impl Iterator<Item = String>) -> String {
    let cells: Vec<String> = cells.map(|c| c.replace('|', "\\|")).collect();
    format!("| {} |", cells.join(" | "))
}

/// A line with an unescaped cell delimiter. Outer pipes are optional, as in
/// GitHub-flavoured markdown.
fn is_table_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') || split_cells(trimmed).len() > 1
}

fn header_matches(line: &str, headers: &[&str]) -> bool {
    if !is_table_line(line) {
        return false;
    }
    let cells = split_cells(line);
    cells.len() == headers.len()
        && cells
            .iter()
            .zip(headers)
            .all(|(cell, header)| normalize(cell) == normalize(header))
}

fn is_separator(line: &str, width: usize) -> bool {
    if !is_table_line(line) {
        return false;
    }
    let cells = split_cells(line);
    cells.len() == width && cells.iter().all(|c| SEPARATOR_CELL.is_match(c))
}

fn normalize(cell: &str) -> String {
    cell.split_whitespace().collect::<String>().to_lowercase()
}

fn line_ending(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: [&str; 3] = ["Date", "StackID", "Comment"];

    #[test]
    fn test_extracts_rows_after_prose() {
        let text = "Intro line\n\n| Date | StackID | Comment |\n| --- | --- | --- |\n| 2024-01-01 | 1 | ok |\n| 2024-01-02 | 2 |  |\n\nTrailing prose";
        let rows = extract_rows(text, &HEADERS);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Date"], "2024-01-01");
        assert_eq!(rows[0]["Comment"], "ok");
        assert_eq!(rows[1]["StackID"], "2");
        assert_eq!(rows[1]["Comment"], "");
    }

    #[test]
    fn test_header_match_ignores_case_and_whitespace() {
        let text = "|date|  stack id |COMMENT|\n|:--|:-:|--:|\n|a|b|c|";
        let rows = extract_rows(text, &HEADERS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["StackID"], "b");
    }

    #[test]
    fn test_missing_trailing_cells_default_to_empty() {
        let text = "| Date | StackID | Comment |\n|---|---|---|\n| 2024-01-01 |";
        let rows = extract_rows(text, &HEADERS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["StackID"], "");
        assert_eq!(rows[0]["Comment"], "");
    }

    #[test]
    fn test_mismatched_separator_yields_no_rows() {
        let text = "| Date | StackID | Comment |\n|---|---|\n| 2024-01-01 | 1 | ok |";
        assert!(extract_rows(text, &HEADERS).is_empty());
        assert!(find_table(text, &HEADERS).is_none());
    }

    #[test]
    fn test_non_dash_separator_rejected() {
        let text = "| Date | StackID | Comment |\n| a | b | c |\n| 2024-01-01 | 1 | ok |";
        assert!(extract_rows(text, &HEADERS).is_empty());
    }

    #[test]
    fn test_no_header_yields_no_rows() {
        assert!(extract_rows("just some text\nwith lines", &HEADERS).is_empty());
        assert!(extract_rows("", &HEADERS).is_empty());
    }

    #[test]
    fn test_header_without_data_rows() {
        let text = "| Date | StackID | Comment |\n|---|---|---|\n\n| x | y | z |";
        assert!(extract_rows(text, &HEADERS).is_empty());
        let block = find_table(text, &HEADERS).unwrap();
        assert_eq!((block.start, block.end), (0, 2));
    }

    #[test]
    fn test_rows_stop_at_first_malformed_line() {
        let text = "| Date | StackID | Comment |\n|---|---|---|\n| a | 1 | |\n| b | 2 | |\nnot a row\n| c | 3 | |";
        let rows = extract_rows(text, &HEADERS);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["Date"], "b");
    }

    #[test]
    fn test_outer_pipes_are_optional() {
        let rows = extract_rows("Date | Time\n--- | ---\n2024 | 10", &["Date", "Time"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Date"], "2024");
        assert_eq!(rows[0]["Time"], "10");

        // Mixed styles within one table.
        let text = "| Date | StackID | Comment |\n--- | --- | ---\na | 1 | x\n| b | 2 | |\n\nc | 3 | |";
        let rows = extract_rows(text, &HEADERS);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["Date"], "b");
    }

    #[test]
    fn test_escaped_pipe_alone_is_not_a_table_line() {
        assert!(!is_table_line(r"a \| b"));
        assert!(!is_table_line("   "));
        assert!(is_table_line("| a |"));
        assert!(is_table_line("a | b"));
    }

    #[test]
    fn test_escaped_pipe_stays_in_cell() {
        assert_eq!(
            split_cells(r"| a \| b | c |"),
            vec!["a | b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_first_matching_table_wins() {
        let text = "| Date | StackID | Comment |\n|---|---|---|\n| first | 1 | |\n\n| Date | StackID | Comment |\n|---|---|---|\n| second | 2 | |";
        let rows = extract_rows(text, &HEADERS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Date"], "first");
    }

    #[test]
    fn test_render_escapes_pipes() {
        let lines = render_table(&["A", "B"], &[vec!["x|y".to_string()]]);
        assert_eq!(lines[0], "| A | B |");
        assert_eq!(lines[1], "| --- | --- |");
        assert_eq!(lines[2], r"| x\|y |  |");
        assert_eq!(split_cells(&lines[2]), vec!["x|y".to_string(), String::new()]);
    }

    #[test]
    fn test_append_table_to_text() {
        let out = append_table("# Title", &HEADERS);
        assert_eq!(
            out,
            "# Title\n\n| Date | StackID | Comment |\n| --- | --- | --- |\n|  |  |  |\n"
        );
        let block = find_table(&out, &HEADERS).unwrap();
        assert_eq!(block.rows.len(), 1);
    }

    #[test]
    fn test_migrate_inserts_blank_column() {
        let text = "before\n| Date | Comment |\n|---|---|\n| 2024-01-01 | hi |\n| 2024-01-02 | |\nafter\n";
        let migrated = migrate_table(text, &["Date", "Comment"], &HEADERS)
            .unwrap()
            .unwrap();
        assert!(migrated.starts_with("before\n| Date | StackID | Comment |"));
        assert!(migrated.ends_with("after\n"));

        let rows = extract_rows(&migrated, &HEADERS);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Date"], "2024-01-01");
        assert_eq!(rows[0]["StackID"], "");
        assert_eq!(rows[0]["Comment"], "hi");
    }

    #[test]
    fn test_migrate_without_legacy_table() {
        assert_eq!(migrate_table("nothing", &["Date"], &HEADERS).unwrap(), None);
    }

    #[test]
    fn test_migrate_refuses_to_drop_columns() {
        let err = migrate_table("", &["Date", "Weight"], &HEADERS).unwrap_err();
        assert!(err.to_string().contains("Weight"));
    }

    #[test]
    fn test_migrate_preserves_crlf() {
        let text = "| Date | Comment |\r\n|---|---|\r\n| d | c |\r\n";
        let migrated = migrate_table(text, &["Date", "Comment"], &HEADERS)
            .unwrap()
            .unwrap();
        assert_eq!(
            migrated,
            "| Date | StackID | Comment |\r\n| --- | --- | --- |\r\n| d |  | c |\r\n"
        );
    }
}
