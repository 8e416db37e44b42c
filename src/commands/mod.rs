use anyhow::{Context, Result};
use std::path::Path;

use crate::core::diagnostics::report_pipeline_error;
use crate::core::error::PipelineError;
use crate::core::lexer::Lexer;
use crate::core::token::Token;

pub mod ast;
pub mod run;
pub mod tokens;

pub(crate) fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Read script {}", path.display()))
}

/// Tokenize, printing every lexer error. `None` when any were found.
pub(crate) fn lex_or_report(filename: &str, source: &str, pretty: bool) -> Option<Vec<Token>> {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize();
    if lexer.errors().is_empty() {
        return Some(tokens);
    }
    report_pipeline_error(filename, source, &PipelineError::Lex(lexer.into_errors()), pretty);
    None
}
