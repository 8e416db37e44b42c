use std::path::Path;

use super::{lex_or_report, read_source};
use crate::core::diagnostics::report_pipeline_error;
use crate::core::error::PipelineError;
use crate::core::parser::parse_program;

pub fn main(input: &Path, pretty: bool) -> anyhow::Result<i32> {
    let source = read_source(input)?;
    let filename = input.display().to_string();
    let Some(tokens) = lex_or_report(&filename, &source, pretty) else {
        return Ok(1);
    };
    match parse_program(tokens) {
        Ok(program) => {
            println!("{:#?}", program);
            Ok(0)
        }
        Err(errors) => {
            report_pipeline_error(&filename, &source, &PipelineError::Parse(errors), pretty);
            Ok(1)
        }
    }
}
