use std::path::Path;

use super::{lex_or_report, read_source};
use crate::core::token::Token;

pub fn main(input: &Path, pretty: bool) -> anyhow::Result<i32> {
    let source = read_source(input)?;
    match lex_or_report(&input.display().to_string(), &source, pretty) {
        Some(tokens) => {
            print!("{}", dump(&tokens));
            Ok(0)
        }
        None => Ok(1),
    }
}

/// One token per line.
pub fn dump(tokens: &[Token]) -> String {
    tokens.iter().map(|t| format!("{}\n", t)).collect()
}
