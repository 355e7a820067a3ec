//! Terminal rendering of diagnostics against their source text

use crate::{Diagnostic, Severity, SourceMap};
use std::fmt::Write;

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// How many lines above the offending line are echoed for context.
const CONTEXT_LINES: usize = 3;

/// Renders a diagnostic with the offending source line, up to three lines of
/// leading context and a caret underline beneath the reported span. The
/// span's `file_id` selects which registered file the diagnostic points
/// into, so errors from imported files show their own source.
pub fn render_diagnostic(diag: &Diagnostic, sources: &SourceMap, color: bool) -> String {
    let file = sources.name(diag.span.file_id);
    let source = sources.source(diag.span.file_id);

    let (sev_color, bold, reset) = if color {
        let sev = match diag.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Info => RESET,
        };
        (sev, BOLD, RESET)
    } else {
        ("", "", "")
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{bold}{file}:{}:{}: {sev_color}{}{reset}{bold}: {}{reset}",
        diag.span.start.line, diag.span.start.column, diag.severity, diag.message
    );

    let lines: Vec<&str> = source.lines().collect();
    let line_idx = diag.span.start.line.saturating_sub(1) as usize;
    if line_idx >= lines.len() {
        return out;
    }

    let first = line_idx.saturating_sub(CONTEXT_LINES);
    for (i, line) in lines.iter().enumerate().take(line_idx + 1).skip(first) {
        let _ = writeln!(out, "{:>5} | {}", i + 1, line);
    }

    let column = diag.span.start.column.saturating_sub(1) as usize;
    let width = if diag.span.end.line == diag.span.start.line {
        (diag.span.end.column.saturating_sub(diag.span.start.column) as usize).max(1)
    } else {
        1
    };
    let _ = writeln!(
        out,
        "      | {}{sev_color}{}{reset}",
        " ".repeat(column),
        "^".repeat(width)
    );

    if let Some(help) = &diag.help {
        let _ = writeln!(out, "      = help: {}", help);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Position, Span};
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_caret_under_offending_token() {
        let source = "a: i32 = 0;\nb: i32 = a + ;\n";
        let mut sources = SourceMap::new();
        let file_id = sources.add("test.rs", source);

        let span = Span::new(Position::new(2, 14, 25), Position::new(2, 15, 26), file_id);
        let diag = Diagnostic::error("Expected primary expression", span);

        let rendered = render_diagnostic(&diag, &sources, false);
        let expected = "test.rs:2:14: error: Expected primary expression\n    1 | a: i32 = 0;\n    2 | b: i32 = a + ;\n      |              ^\n";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn clamps_context_to_file_start() {
        let mut sources = SourceMap::new();
        let file_id = sources.add("f.rs", "x\n");
        let diag = Diagnostic::error("bad", Span::single(Position::new(1, 1, 0), file_id));
        let rendered = render_diagnostic(&diag, &sources, false);
        assert!(rendered.contains("    1 | x"));
    }

    #[test]
    fn diagnostics_render_against_their_own_file() {
        let mut sources = SourceMap::new();
        let _main = sources.add("main.rs", "main() : i32 { return 0; }\n");
        let util = sources.add("util.rs", "ok() : i32 { return 1; }\nbroken;\n");

        let diag = Diagnostic::error(
            "Expected '('",
            Span::single(Position::new(2, 7, 31), util),
        );
        let rendered = render_diagnostic(&diag, &sources, false);
        assert!(rendered.starts_with("util.rs:2:7: error"));
        // the echoed line comes from util.rs, not main.rs
        assert!(rendered.contains("    2 | broken;"));
    }
}
