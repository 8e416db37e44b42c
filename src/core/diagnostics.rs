// src/core/diagnostics.rs
//! File + line diagnostics with a caret under the offending column.

use colored::Colorize;

use crate::core::error::PipelineError;

#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub line: usize,
    pub col: usize,
    pub len: usize, // underline length (use 1 if unknown)
}

impl Span {
    pub fn single(line: usize, col: usize) -> Self {
        Self { line, col, len: 1 }
    }
}

pub fn print_error(filename: &str, source: &str, title: &str, span: Span) {
    let ln_str = format!("{:>4}", span.line);
    let pad = " ".repeat(ln_str.len());
    eprintln!("{} {}", "error:".bright_red().bold(), title.bright_white());
    eprintln!(
        "{} {}",
        "-->".bright_blue(),
        format!("{}:{}:{}", filename, span.line, span.col).bright_white()
    );
    eprintln!("{} {}", pad, "|".dimmed());
    eprintln!("{} {} {}", ln_str.dimmed(), "|".dimmed(), nth_line(source, span.line).unwrap_or_default());
    eprintln!("{} {} {}", pad, "|".dimmed(), underline(span).bright_red());
    eprintln!();
}

/// Same layout as `print_error`, uncolored.
pub fn render_error(filename: &str, source: &str, title: &str, span: Span) -> String {
    let ln_str = format!("{:>4}", span.line);
    let pad = " ".repeat(ln_str.len());
    let line_text = nth_line(source, span.line).unwrap_or_default();
    format!(
        "error: {title}\n--> {filename}:{}:{}\n{pad} |\n{ln_str} | {line_text}\n{pad} | {}\n",
        span.line,
        span.col,
        underline(span),
    )
}

/// Report every diagnostic carried by `err`, pretty or as one plain line each.
pub fn report_pipeline_error(filename: &str, source: &str, err: &PipelineError, pretty: bool) {
    let report = err.report();
    for d in report.errors() {
        let title = format!("{}: {}", d.kind, d.message);
        if pretty && d.line > 0 {
            print_error(filename, source, &title, Span::single(d.line, d.column));
        } else if d.line > 0 {
            eprintln!("{} at {}:{}:{}", title, filename, d.line, d.column);
        } else {
            eprintln!("{}", title);
        }
    }
    if report.error_count() > 1 {
        eprintln!("{}", report.summary());
    }
}

fn underline(span: Span) -> String {
    " ".repeat(span.col.saturating_sub(1)) + &"^".repeat(span.len.max(1))
}

fn nth_line(src: &str, n: usize) -> Option<String> {
    src.lines().nth(n.saturating_sub(1)).map(|s| s.to_string())
}
