//! Embedding entry point: owns the global scope, the interpreter and the
//! memory tracker, and drives the lex → parse → run pipeline.
use std::io::Write;

use tracing::{debug, warn};

use crate::core::ast::Program;
use crate::core::builtins::get_builtins;
use crate::core::environment::Environment;
use crate::core::error::{PipelineError, RuntimeError};
use crate::core::interpreter::{Interpreter, RuntimeOptions};
use crate::core::lexer::Lexer;
use crate::core::memory::MemoryTracker;
use crate::core::parser::parse_program;
use crate::core::value::Value;

pub struct Runtime {
    interpreter: Interpreter,
    memory: MemoryTracker,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeOptions::default())
    }
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        let globals = Environment::new(options.scope);
        for (name, builtin) in get_builtins() {
            if let Err(e) = globals.define(name, builtin, true) {
                warn!(name, error = %e, "could not register builtin");
            }
        }
        debug!(scope = ?options.scope, logic = ?options.logic, "runtime ready");
        Self {
            interpreter: Interpreter::new(globals, options),
            memory: MemoryTracker::new(),
        }
    }

    /// Redirect `print` output.
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.interpreter.set_output(out);
        self
    }

    pub fn globals(&self) -> &Environment {
        self.interpreter.globals()
    }

    pub fn interpreter(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }

    pub fn memory(&self) -> &MemoryTracker {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryTracker {
        &mut self.memory
    }

    /// Register a value with the tracker and return its id.
    pub fn track(&mut self, value: Value) -> usize {
        self.memory.allocate(value)
    }

    pub fn run(&mut self, program: &Program) -> Result<Value, RuntimeError> {
        self.interpreter.run(program)
    }

    /// Full pipeline over a source string. Lexer errors stop before parsing;
    /// parser errors stop before evaluation.
    pub fn run_source(&mut self, source: &str, filename: &str) -> Result<Value, PipelineError> {
        debug!(filename, bytes = source.len(), "run_source");
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize();
        if !lexer.errors().is_empty() {
            return Err(PipelineError::Lex(lexer.into_errors()));
        }
        let program = parse_program(tokens).map_err(PipelineError::Parse)?;
        Ok(self.run(&program)?)
    }
}

impl Drop for Runtime {
    // Closures hold their defining scope, which may hold them back.
    fn drop(&mut self) {
        self.interpreter.env().clear();
        self.interpreter.globals().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::interpreter::OutputBuffer;

    #[test]
    fn builtins_are_registered_as_constants() {
        let rt = Runtime::default();
        assert!(rt.globals().contains("len"));
        assert!(rt.globals().is_constant("print"));
    }

    #[test]
    fn run_source_reports_each_stage() {
        let mut rt = Runtime::default();
        assert!(matches!(rt.run_source("\"open", "t.pow"), Err(PipelineError::Lex(_))));
        assert!(matches!(rt.run_source("$x = ;", "t.pow"), Err(PipelineError::Parse(_))));
        let err = rt.run_source("$missing + 1;", "t.pow").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NameError);
    }

    #[test]
    fn print_goes_to_the_configured_sink() {
        let buf = OutputBuffer::new();
        let mut rt = Runtime::default().with_output(buf.clone());
        let v = rt.run_source("print(\"hi\", 2); len(@(1, 2, 3));", "t.pow").unwrap();
        assert_eq!(v, Value::Int(3));
        assert_eq!(buf.contents(), "hi 2\n");
    }

    #[test]
    fn tracked_values_share_storage_with_the_script() {
        let mut rt = Runtime::default();
        let arr = rt.run_source("$a = @(1, 2); ($a);", "t.pow").unwrap();
        let id = rt.track(arr);
        rt.run_source("$a[0] = 9;", "t.pow").unwrap();
        match rt.memory().get(id) {
            Some(Value::Array(items)) => assert_eq!(items.borrow()[0], Value::Int(9)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rt.memory_mut().release(id));
    }
}
