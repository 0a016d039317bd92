use serde::Serialize;

use super::files::FileNamespace;
use super::position::{map_position, HighlightRange};
use crate::parser::SyntaxError;
use crate::runtime::GuestException;

const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Raised before any frame existed; the position comes from the error.
    Compile,
    /// Raised while running; the position comes from the failing frame.
    Runtime,
}

/// What the controller is told about a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    /// Exception class, e.g. `ZeroDivisionError`.
    pub name: String,
    /// Last line of the formatted report, e.g. `NameError: name 'x' is not defined`.
    pub summary: String,
    /// Full formatted report.
    pub message: String,
    pub highlight: HighlightRange,
}

impl ErrorReport {
    pub fn from_syntax(err: &SyntaxError, filename: &str, files: &FileNamespace) -> Self {
        let highlight = match (err.column, err.end_column) {
            (Some(col), Some(end_col)) => HighlightRange::new(err.line, col, err.end_line, end_col),
            (Some(col), None) => HighlightRange::new(err.line, col, err.line, col),
            _ => HighlightRange::line_only(err.line),
        };

        let summary = format!("{}: {}", err.kind, err.message);
        let mut message = format!("  File \"{}\", line {}\n", filename, err.line);
        if let Some(source) = files.line(filename, err.line) {
            let trimmed = source.trim_start();
            let indent = (source.chars().count() - trimmed.chars().count()) as u32;
            message.push_str(&format!("    {}\n", trimmed.trim_end()));
            if let Some(col) = err.column {
                let offset = col.saturating_sub(1).saturating_sub(indent) as usize;
                let width = match err.end_column {
                    Some(end) if err.end_line == err.line && end > col => (end - col) as usize,
                    _ => 1,
                };
                message.push_str(&format!("    {}{}\n", " ".repeat(offset), "^".repeat(width)));
            }
        }
        message.push_str(&summary);

        Self {
            kind: ErrorKind::Compile,
            name: err.kind.to_string(),
            summary,
            message,
            highlight,
        }
    }

    pub fn from_exception(exc: &GuestException, files: &FileNamespace) -> Self {
        let highlight = exc
            .failure
            .as_ref()
            .and_then(|f| map_position(&*f.unit, f.offset, f.line))
            .or_else(|| exc.traceback.last().map(|t| HighlightRange::line_only(t.line)))
            .unwrap_or_else(|| HighlightRange::line_only(1));

        let summary = exc.summary();
        let mut message = String::from("Traceback (most recent call last):\n");
        for entry in &exc.traceback {
            message.push_str(&format!(
                "  File \"{}\", line {}, in {}\n",
                entry.filename, entry.line, entry.function
            ));
            if let Some(source) = files.line(&entry.filename, entry.line) {
                message.push_str(&format!("    {}\n", source.trim()));
            }
        }
        message.push_str(&summary);

        Self {
            kind: ErrorKind::Runtime,
            name: exc.kind.name().to_string(),
            summary,
            message,
            highlight,
        }
    }
}

/// Convert bare `\n` to `\r\n` for a raw-mode terminal.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// Red, newline-normalized error text ending in a newline.
pub fn paint_error(text: &str) -> String {
    let mut body = normalize_newlines(text);
    if !body.ends_with("\r\n") {
        body.push_str("\r\n");
    }
    format!("{}{}{}", RED, body, RESET)
}
