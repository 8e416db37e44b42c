//! Core module tree: lexer, parser, evaluator and their support types.

pub mod ast;
pub mod builtins;
pub mod debug;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod grammar;
pub mod interpreter;
pub mod lexer;
pub mod memory;
pub mod operators;
pub mod parser;
pub mod runtime;
pub mod token;
pub mod value;

pub use runtime::Runtime;
pub use token::TokenKind;
