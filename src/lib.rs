// The binary reaches these through `powerlang::...`; tests use the same paths.
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;

pub use crate::core::error::{ErrorKind, PipelineError, RuntimeError};
pub use crate::core::interpreter::{LogicMode, RuntimeOptions};
pub use crate::core::environment::ScopeMode;
pub use crate::core::value::Value;
pub use crate::core::Runtime;
