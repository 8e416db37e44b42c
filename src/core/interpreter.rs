//! Tree-walking evaluator.
//!
//! Statements and expressions evaluate to `Result<Value, Signal>`. The error
//! side carries runtime errors together with the non-local exits `return`,
//! `break` and `continue`, so `?` unwinds all of them. Loops catch
//! `Break`/`Continue`, `switch` catches `Break`, calls catch `Return`, and
//! `try` catches `Error`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::ast::{
    CatchClause, ClassDecl, Expr, ExprKind, FunctionDecl, LambdaBody, MemberKind, Program, Stmt,
    StmtKind, SwitchCase,
};
use crate::core::environment::{Environment, ScopeMode};
use crate::core::error::RuntimeError;
use crate::core::operators;
use crate::core::token::TokenKind;
use crate::core::value::{sorted_entries, Class, Function, FunctionBody, HashKey, Instance, Number, Value};

const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Evaluation strategy for `-and`/`-or`/`&&`/`||`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogicMode {
    /// Both operands are always evaluated.
    #[default]
    Eager,
    ShortCircuit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub logic: LogicMode,
    pub scope: ScopeMode,
    pub max_call_depth: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            logic: LogicMode::default(),
            scope: ScopeMode::default(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Non-local exit out of statement execution.
#[derive(Debug, Clone)]
pub enum Signal {
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
    Error(RuntimeError),
}

impl Signal {
    fn at(self, line: usize, column: usize) -> Self {
        match self {
            Signal::Error(e) => Signal::Error(e.at(line, column)),
            other => other,
        }
    }
}

impl From<RuntimeError> for Signal {
    fn from(e: RuntimeError) -> Self {
        Signal::Error(e)
    }
}

pub type Exec = Result<Value, Signal>;

/// In-memory sink for `print` output.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Rc<RefCell<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Flow {
    Next,
    Exit,
}

pub struct Interpreter {
    env: Environment,
    globals: Environment,
    options: RuntimeOptions,
    depth: usize,
    out: Box<dyn Write>,
}

impl Interpreter {
    /// Top-level code runs in a child of `globals`.
    pub fn new(globals: Environment, options: RuntimeOptions) -> Self {
        Self {
            env: globals.child(),
            globals,
            options,
            depth: 0,
            out: Box::new(io::stdout()),
        }
    }

    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn set_output(&mut self, out: impl Write + 'static) {
        self.out = Box::new(out);
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn globals(&self) -> &Environment {
        &self.globals
    }

    pub fn options(&self) -> RuntimeOptions {
        self.options
    }

    pub fn write_line(&mut self, line: &str) -> Result<(), RuntimeError> {
        writeln!(self.out, "{}", line)
            .map_err(|e| RuntimeError::runtime(format!("Failed to write output: {}", e)))
    }

    /// Run a program: hoisted functions, then classes, then statements.
    /// The result is the last statement's value or a top-level `return` value.
    pub fn run(&mut self, program: &Program) -> Result<Value, RuntimeError> {
        debug!(
            statements = program.statements.len(),
            functions = program.functions.len(),
            classes = program.classes.len(),
            "running program"
        );
        match self.exec_program(program) {
            Ok(value) | Err(Signal::Return(value)) => Ok(value),
            Err(Signal::Error(e)) => Err(e),
            Err(Signal::Break(_)) => Err(RuntimeError::runtime("'break' used outside of a loop")),
            Err(Signal::Continue(_)) => Err(RuntimeError::runtime("'continue' used outside of a loop")),
        }
    }

    /// Call any callable value from host code.
    pub fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match self.invoke(callee, args, None) {
            Ok(value) | Err(Signal::Return(value)) => Ok(value),
            Err(Signal::Error(e)) => Err(e),
            Err(_) => Err(RuntimeError::runtime("'break' or 'continue' escaped a function call")),
        }
    }

    fn exec_program(&mut self, program: &Program) -> Exec {
        for decl in &program.functions {
            self.declare_function(decl)?;
        }
        for decl in &program.classes {
            self.declare_class(decl)?;
        }
        self.exec_statements(&program.statements)
    }

    fn in_scope<T>(&mut self, scope: Environment, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.env, scope);
        let out = f(self);
        self.env = saved;
        out
    }

    // ---------- declarations ----------

    fn make_function(&self, decl: &FunctionDecl) -> Rc<Function> {
        Rc::new(Function {
            name: Some(decl.name.clone()),
            params: decl.params.clone(),
            body: Rc::new(FunctionBody::Block(decl.body.clone())),
            closure: self.env.clone(),
            is_async: decl.is_async,
        })
    }

    fn declare_function(&mut self, decl: &FunctionDecl) -> Result<(), RuntimeError> {
        let func = self.make_function(decl);
        self.env.define(&decl.name, Value::Function(func), false)
    }

    fn declare_class(&mut self, decl: &ClassDecl) -> Result<(), RuntimeError> {
        let base = match &decl.base {
            Some(name) => match self.env.get(name) {
                Ok(Value::Class(class)) => Some(class),
                Ok(other) => {
                    return Err(RuntimeError::type_error(format!(
                        "Base type '{}' of class '{}' is a {}, not a class",
                        name,
                        decl.name,
                        other.type_name()
                    )))
                }
                // interface names and external types have no runtime class
                Err(_) => None,
            },
            None => None,
        };
        let methods = decl
            .methods
            .iter()
            .map(|m| (m.name.to_ascii_lowercase(), self.make_function(m)))
            .collect();
        let class = Class {
            name: decl.name.clone(),
            methods,
            base,
            fields: decl.fields.clone(),
            closure: self.env.clone(),
        };
        trace!(class = %decl.name, "declared class");
        self.env.define(&decl.name, Value::Class(Rc::new(class)), false)
    }

    // ---------- statements ----------

    pub fn execute(&mut self, stmt: &Stmt) -> Exec {
        self.exec_stmt(stmt).map_err(|s| s.at(stmt.line, stmt.column))
    }

    fn exec_statements(&mut self, stmts: &[Stmt]) -> Exec {
        let mut last = Value::Null;
        for stmt in stmts {
            last = self.execute(stmt)?;
        }
        Ok(last)
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Exec {
        let scope = self.env.child();
        self.in_scope(scope, |this| this.exec_statements(stmts))
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Exec {
        match &stmt.kind {
            StmtKind::Expression(expr) => self.evaluate(expr),
            StmtKind::VarDecl { name, value, is_const, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };
                self.env.define(name, value.clone(), *is_const)?;
                Ok(value)
            }
            StmtKind::Block(stmts) => self.exec_block(stmts),
            StmtKind::If {
                condition,
                then_branch,
                elseif_branches,
                else_branch,
            } => {
                if self.evaluate(condition)?.truthy() {
                    return self.execute(then_branch);
                }
                for (cond, branch) in elseif_branches {
                    if self.evaluate(cond)?.truthy() {
                        return self.execute(branch);
                    }
                }
                match else_branch {
                    Some(branch) => self.execute(branch),
                    None => Ok(Value::Null),
                }
            }
            StmtKind::While { condition, body } => {
                while self.evaluate(condition)?.truthy() {
                    if let Flow::Exit = self.loop_body(body)? {
                        break;
                    }
                }
                Ok(Value::Null)
            }
            StmtKind::DoWhile { body, condition } => {
                loop {
                    if let Flow::Exit = self.loop_body(body)? {
                        break;
                    }
                    if !self.evaluate(condition)?.truthy() {
                        break;
                    }
                }
                Ok(Value::Null)
            }
            StmtKind::For {
                init,
                condition,
                increment,
                body,
            } => {
                if let Some(init) = init {
                    self.execute(init)?;
                }
                loop {
                    if let Some(cond) = condition {
                        if !self.evaluate(cond)?.truthy() {
                            break;
                        }
                    }
                    if let Flow::Exit = self.loop_body(body)? {
                        break;
                    }
                    if let Some(inc) = increment {
                        self.evaluate(inc)?;
                    }
                }
                Ok(Value::Null)
            }
            StmtKind::Foreach {
                variable,
                iterable,
                body,
                ..
            } => {
                let items = iteration_items(&self.evaluate(iterable)?);
                let scope = self.env.child();
                self.in_scope(scope, |this| -> Exec {
                    for item in items {
                        this.env.define(variable, item, false)?;
                        if let Flow::Exit = this.loop_body(body)? {
                            break;
                        }
                    }
                    Ok(Value::Null)
                })
            }
            StmtKind::Switch { subject, cases, default } => self.exec_switch(subject, cases, default.as_deref()),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };
                Err(Signal::Return(value))
            }
            StmtKind::Break(label) => Err(Signal::Break(label.clone())),
            StmtKind::Continue(label) => Err(Signal::Continue(label.clone())),
            StmtKind::Try { body, catches, finally } => self.exec_try(body, catches, finally.as_deref()),
            StmtKind::Throw(expr) => {
                let value = self.evaluate(expr)?;
                Err(RuntimeError::runtime(value.to_string()).into())
            }
            StmtKind::Function(decl) => {
                self.declare_function(decl)?;
                Ok(Value::Null)
            }
            StmtKind::Class(decl) => {
                self.declare_class(decl)?;
                Ok(Value::Null)
            }
            StmtKind::Namespace { name, body } => {
                trace!(namespace = %name, "entering namespace");
                self.exec_program(body)
            }
            StmtKind::Using(_) => Ok(Value::Null),
        }
    }

    fn loop_body(&mut self, body: &Stmt) -> Result<Flow, Signal> {
        match self.execute(body) {
            Ok(_) | Err(Signal::Continue(_)) => Ok(Flow::Next),
            Err(Signal::Break(_)) => Ok(Flow::Exit),
            Err(other) => Err(other),
        }
    }

    fn exec_switch(&mut self, subject: &Expr, cases: &[SwitchCase], default: Option<&[Stmt]>) -> Exec {
        let value = self.evaluate(subject)?;
        let mut chosen = None;
        'cases: for case in cases {
            for candidate in &case.values {
                if self.evaluate(candidate)?.loose_eq(&value) {
                    chosen = Some(case.body.as_slice());
                    break 'cases;
                }
            }
        }
        if let Some(body) = chosen.or(default) {
            match self.exec_block(body) {
                Ok(_) | Err(Signal::Break(_)) => {}
                Err(other) => return Err(other),
            }
        }
        Ok(Value::Null)
    }

    /// The first catch clause handles any runtime error; `finally` runs on every path.
    fn exec_try(&mut self, body: &[Stmt], catches: &[CatchClause], finally: Option<&[Stmt]>) -> Exec {
        let outcome = match self.exec_block(body) {
            Err(Signal::Error(err)) => match catches.first() {
                Some(clause) => {
                    debug!(kind = %err.kind, message = %err.message, "caught runtime error");
                    let scope = self.env.child();
                    self.in_scope(scope, |this| -> Exec {
                        if let Some(name) = &clause.variable {
                            this.env.define(name, Value::from(err.message.as_str()), false)?;
                        }
                        this.exec_statements(&clause.body)
                    })
                }
                None => Err(Signal::Error(err)),
            },
            other => other,
        };
        if let Some(finally) = finally {
            self.exec_block(finally)?;
        }
        outcome
    }

    // ---------- expressions ----------

    pub fn evaluate(&mut self, expr: &Expr) -> Exec {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.eval_expr(expr).map_err(|s| s.at(expr.line, expr.column))
        })
    }

    fn eval_expr(&mut self, expr: &Expr) -> Exec {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(operators::literal(lit)),
            ExprKind::Variable(name) => Ok(self.env.get(name)?),
            ExprKind::Binary { op, left, right } => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                Ok(operators::binary(*op, &l, &r)?)
            }
            ExprKind::Logical { op, left, right } => self.eval_logical(*op, left, right),
            ExprKind::Unary { op, operand, postfix } => self.eval_unary(*op, operand, *postfix),
            ExprKind::Assign { op, target, value } => {
                let value = match operators::compound_base(*op) {
                    Some(base) => {
                        let current = self.evaluate(target)?;
                        let rhs = self.evaluate(value)?;
                        operators::binary(base, &current, &rhs)?
                    }
                    None => self.evaluate(value)?,
                };
                self.assign_to(target, value.clone())?;
                Ok(value)
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args),
            ExprKind::Member { object, name, kind } => {
                let obj = self.evaluate(object)?;
                if *kind == MemberKind::SafeDot && obj.is_null() {
                    return Ok(Value::Null);
                }
                match (&obj, member(&obj, name)?) {
                    (Value::Instance(inst), Value::Function(method)) if inst.get_field(name).is_none() => {
                        Ok(Value::Function(bind(&method, &obj)))
                    }
                    (_, value) => Ok(value),
                }
            }
            ExprKind::Index { object, index } => {
                let obj = self.evaluate(object)?;
                let idx = self.evaluate(index)?;
                Ok(index_value(&obj, &idx)?)
            }
            ExprKind::New { type_name, args } => {
                let args = self.eval_args(args)?;
                self.construct(type_name, args)
            }
            ExprKind::Lambda { params, body, is_async } => {
                let body = match body {
                    LambdaBody::Block(stmts) => FunctionBody::Block(stmts.clone()),
                    LambdaBody::Expr(expr) => FunctionBody::Expr(expr.as_ref().clone()),
                };
                Ok(Value::Function(Rc::new(Function {
                    name: None,
                    params: params.clone(),
                    body: Rc::new(body),
                    closure: self.env.clone(),
                    is_async: *is_async,
                })))
            }
            ExprKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.evaluate(condition)?.truthy() {
                    self.evaluate(then_expr)
                } else {
                    self.evaluate(else_expr)
                }
            }
            ExprKind::Range { start, end, inclusive } => {
                let lo = self.evaluate(start)?;
                let hi = self.evaluate(end)?;
                Ok(range(&lo, &hi, *inclusive)?)
            }
            ExprKind::Array(items) => Ok(Value::array(self.eval_args(items)?)),
            ExprKind::Hash(pairs) => {
                let mut map = HashMap::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.evaluate(key)?;
                    let value = self.evaluate(value)?;
                    map.insert(HashKey::from_value(&key), value);
                }
                Ok(Value::hash(map))
            }
            ExprKind::Cast { target, operand } => {
                let value = self.evaluate(operand)?;
                Ok(operators::cast(target, value)?)
            }
            ExprKind::TypeRef(target) => {
                // a class name resolves to the class itself
                match self.env.get(&target.name) {
                    Ok(class @ Value::Class(_)) if !target.is_array => Ok(class),
                    _ => Ok(Value::from(operators::type_label(target))),
                }
            }
            ExprKind::TypeOf(operand) => Ok(Value::from(self.evaluate(operand)?.type_name())),
            // async functions run to completion when called
            ExprKind::Await(operand) => self.evaluate(operand),
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, Signal> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.evaluate(arg)?);
        }
        Ok(values)
    }

    fn eval_logical(&mut self, op: TokenKind, left: &Expr, right: &Expr) -> Exec {
        let l = self.evaluate(left)?;
        let short_circuit = self.options.logic == LogicMode::ShortCircuit;
        match op {
            TokenKind::NullCoalesce => {
                if l.is_null() {
                    self.evaluate(right)
                } else {
                    Ok(l)
                }
            }
            TokenKind::And | TokenKind::AndAnd if short_circuit && !l.truthy() => Ok(Value::Bool(false)),
            TokenKind::Or | TokenKind::OrOr if short_circuit && l.truthy() => Ok(Value::Bool(true)),
            _ => {
                let r = self.evaluate(right)?;
                Ok(operators::binary(op, &l, &r)?)
            }
        }
    }

    fn eval_unary(&mut self, op: TokenKind, operand: &Expr, postfix: bool) -> Exec {
        match op {
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let old = self.evaluate(operand)?;
                let delta = if op == TokenKind::PlusPlus { 1 } else { -1 };
                let new = operators::step(&old, delta)?;
                self.assign_to(operand, new.clone())?;
                Ok(if postfix { old } else { new })
            }
            _ => {
                let value = self.evaluate(operand)?;
                Ok(operators::unary(op, &value)?)
            }
        }
    }

    /// Store through a variable, member or index target.
    fn assign_to(&mut self, target: &Expr, value: Value) -> Result<(), Signal> {
        match &target.kind {
            ExprKind::Variable(name) => {
                if self.env.contains(name) {
                    self.env.assign(name, value)?;
                } else {
                    self.env.define(name, value, false)?;
                }
            }
            ExprKind::Member { object, name, .. } => match self.evaluate(object)? {
                Value::Instance(inst) => inst.set_field(name, value),
                Value::Hash(map) => {
                    let key = hash_member_key(&map.borrow(), name);
                    map.borrow_mut().insert(key, value);
                }
                other => {
                    return Err(RuntimeError::runtime(format!(
                        "Cannot set member '{}' on {}",
                        name,
                        other.type_name()
                    ))
                    .into())
                }
            },
            ExprKind::Index { object, index } => {
                let obj = self.evaluate(object)?;
                let idx = self.evaluate(index)?;
                match obj {
                    Value::Array(items) => {
                        let mut items = items.borrow_mut();
                        let i = resolve_index(&idx, items.len())?;
                        items[i] = value;
                    }
                    Value::Hash(map) => {
                        map.borrow_mut().insert(HashKey::from_value(&idx), value);
                    }
                    other => {
                        return Err(RuntimeError::runtime(format!(
                            "Index assignment only on array or hash, got {}",
                            other.type_name()
                        ))
                        .into())
                    }
                }
            }
            _ => return Err(RuntimeError::runtime("Invalid assignment target").into()),
        }
        Ok(())
    }

    // ---------- calls and objects ----------

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Exec {
        let (target, receiver) = match &callee.kind {
            ExprKind::Member { object, name, kind } => {
                let obj = self.evaluate(object)?;
                if *kind == MemberKind::SafeDot && obj.is_null() {
                    return Ok(Value::Null);
                }
                let target = member(&obj, name).map_err(|e| e.at(callee.line, callee.column))?;
                let receiver = matches!(obj, Value::Instance(_)).then_some(obj);
                (target, receiver)
            }
            _ => (self.evaluate(callee)?, None),
        };
        let args = self.eval_args(args)?;
        self.invoke(target, args, receiver)
    }

    fn invoke(&mut self, callee: Value, args: Vec<Value>, receiver: Option<Value>) -> Exec {
        match callee {
            Value::Builtin(builtin) => {
                if let Some(arity) = builtin.arity {
                    if arity != args.len() {
                        return Err(RuntimeError::argument(format!(
                            "{}() takes {} argument(s) but {} were given",
                            builtin.name,
                            arity,
                            args.len()
                        ))
                        .into());
                    }
                }
                Ok((builtin.f)(self, args)?)
            }
            Value::Function(func) => self.call_function(&func, args, receiver),
            Value::Class(class) => self.instantiate(&class, args),
            _ => Err(RuntimeError::runtime("Can only call functions or classes").into()),
        }
    }

    /// Run a user function in a fresh child of its closure.
    fn call_function(&mut self, func: &Function, args: Vec<Value>, receiver: Option<Value>) -> Exec {
        if self.depth >= self.options.max_call_depth {
            return Err(RuntimeError::runtime("Maximum call depth exceeded").into());
        }
        self.depth += 1;
        trace!(function = func.display_name(), depth = self.depth, "call");
        let frame = func.closure.child();
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.in_scope(frame, |this| -> Exec {
                this.bind_params(func, args, receiver)?;
                match func.body.as_ref() {
                    FunctionBody::Block(stmts) => this.exec_statements(stmts),
                    FunctionBody::Expr(expr) => this.evaluate(expr),
                }
            })
        });
        self.depth -= 1;
        match result {
            Err(Signal::Return(value)) => Ok(value),
            other => other,
        }
    }

    /// Positional binding; missing arguments take their default or `null`.
    fn bind_params(&mut self, func: &Function, args: Vec<Value>, receiver: Option<Value>) -> Result<(), Signal> {
        let has_receiver = receiver.is_some();
        if let Some(this) = receiver {
            self.env.define_local("this", this);
        }
        let mut args = args.into_iter();
        for param in &func.params {
            let bare = param.name.trim_start_matches('$');
            if has_receiver && (bare.eq_ignore_ascii_case("this") || bare.eq_ignore_ascii_case("self")) {
                continue;
            }
            let value = match (args.next(), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.evaluate(default)?,
                (None, None) => Value::Null,
            };
            self.env.define_local(&param.name, value);
        }
        Ok(())
    }

    /// Allocate an instance, run field initializers (base first), then the constructor.
    fn instantiate(&mut self, class: &Rc<Class>, args: Vec<Value>) -> Exec {
        let inst = Rc::new(Instance::new(Rc::clone(class)));
        let this = Value::Instance(Rc::clone(&inst));
        self.init_fields(class, &inst, &this)?;
        if let Some(ctor) = find_constructor(class) {
            self.call_function(&ctor, args, Some(this.clone()))?;
        }
        Ok(this)
    }

    fn init_fields(&mut self, class: &Class, inst: &Instance, this: &Value) -> Result<(), Signal> {
        if let Some(base) = &class.base {
            self.init_fields(base, inst, this)?;
        }
        if class.fields.is_empty() {
            return Ok(());
        }
        let scope = class.closure.child();
        scope.define_local("this", this.clone());
        self.in_scope(scope, |interp| -> Result<(), Signal> {
            for field in &class.fields {
                let value = match &field.value {
                    Some(expr) => interp.evaluate(expr)?,
                    None => Value::Null,
                };
                inst.set_field(&field.name, value);
            }
            Ok(())
        })
    }

    fn construct(&mut self, type_name: &str, args: Vec<Value>) -> Exec {
        if let Ok(Value::Class(class)) = self.env.get(type_name) {
            return self.instantiate(&class, args);
        }
        match type_name.to_ascii_lowercase().as_str() {
            "array" | "list" => Ok(Value::array(args)),
            "hashtable" | "hash" | "dictionary" => Ok(Value::hash(HashMap::new())),
            "object" | "psobject" => {
                let class = Class {
                    name: "Object".into(),
                    methods: HashMap::new(),
                    base: None,
                    fields: Vec::new(),
                    closure: self.globals.clone(),
                };
                Ok(Value::Instance(Rc::new(Instance::new(Rc::new(class)))))
            }
            _ => Err(RuntimeError::runtime(format!("Unknown type: {}", type_name)).into()),
        }
    }
}

/// Constructor lookup through the base chain.
fn find_constructor(class: &Class) -> Option<Rc<Function>> {
    let mut current = Some(class);
    while let Some(c) = current {
        if let Some(ctor) = c.constructor() {
            return Some(ctor);
        }
        current = c.base.as_deref();
    }
    None
}

/// A copy of `method` whose closure binds `this`.
fn bind(method: &Function, this: &Value) -> Rc<Function> {
    let closure = method.closure.child();
    closure.define_local("this", this.clone());
    Rc::new(Function {
        name: method.name.clone(),
        params: method.params.clone(),
        body: Rc::clone(&method.body),
        closure,
        is_async: method.is_async,
    })
}

fn member(obj: &Value, name: &str) -> Result<Value, RuntimeError> {
    let key = name.to_ascii_lowercase();
    match obj {
        Value::Instance(inst) => {
            if let Some(value) = inst.get_field(&key) {
                return Ok(value);
            }
            if let Some(method) = inst.class.find_method(&key) {
                return Ok(Value::Function(method));
            }
        }
        Value::Class(class) => {
            if let Some(method) = class.find_method(&key) {
                return Ok(Value::Function(method));
            }
            if key == "name" {
                return Ok(Value::from(class.name.as_str()));
            }
        }
        Value::Hash(map) => {
            let map = map.borrow();
            if let Some(value) = map.get(&hash_member_key(&map, name)) {
                return Ok(value.clone());
            }
            let entries = || sorted_entries(&map);
            return match key.as_str() {
                "count" | "length" => Ok(Value::Int(map.len() as i64)),
                "keys" => Ok(Value::array(entries().into_iter().map(|(k, _)| k.to_value()).collect())),
                "values" => Ok(Value::array(entries().into_iter().map(|(_, v)| v).collect())),
                _ => Err(RuntimeError::key(format!("Key not found: '{}'", name))),
            };
        }
        Value::Array(items) if key == "length" || key == "count" => {
            return Ok(Value::Int(items.borrow().len() as i64));
        }
        Value::Str(s) if key == "length" => return Ok(Value::Int(s.chars().count() as i64)),
        _ => {}
    }
    Err(RuntimeError::runtime(format!("Member '{}' not found", key)))
}

/// The existing key matching `name` case-insensitively, else `name` itself.
fn hash_member_key(map: &HashMap<HashKey, Value>, name: &str) -> HashKey {
    let exact = HashKey::Str(name.to_string());
    if map.contains_key(&exact) {
        return exact;
    }
    map.keys()
        .find(|k| matches!(k, HashKey::Str(s) if s.eq_ignore_ascii_case(name)))
        .cloned()
        .unwrap_or(exact)
}

/// Position in a sequence of `len` items; negative indices count from the end.
fn resolve_index(idx: &Value, len: usize) -> Result<usize, RuntimeError> {
    let n = match idx.as_number() {
        Some(Number::Int(n)) => n,
        Some(Number::Float(f)) => f as i64,
        None => {
            return Err(RuntimeError::type_error(format!(
                "Index must be a number, got {}",
                idx.type_name()
            )))
        }
    };
    let i = if n < 0 { n + len as i64 } else { n };
    if i < 0 || i >= len as i64 {
        return Err(RuntimeError::index("Index out of range"));
    }
    Ok(i as usize)
}

fn index_value(obj: &Value, idx: &Value) -> Result<Value, RuntimeError> {
    match obj {
        Value::Array(items) => {
            let items = items.borrow();
            let i = resolve_index(idx, items.len())?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = resolve_index(idx, chars.len())?;
            Ok(Value::from(chars[i].to_string()))
        }
        Value::Hash(map) => map
            .borrow()
            .get(&HashKey::from_value(idx))
            .cloned()
            .ok_or_else(|| RuntimeError::key(format!("Key not found: {}", idx.repr()))),
        _ => Err(RuntimeError::runtime("Index access only on array, hash, or string")),
    }
}

/// `lo..hi` (inclusive) or `lo...hi`; ascending only, empty when `hi < lo`.
fn range(lo: &Value, hi: &Value, inclusive: bool) -> Result<Value, RuntimeError> {
    let bound = |v: &Value| match v.as_number() {
        Some(Number::Int(n)) => Ok(n),
        Some(Number::Float(f)) => Ok(f as i64),
        None => Err(RuntimeError::type_error(format!(
            "Range bounds must be numbers, got {}",
            v.type_name()
        ))),
    };
    let (lo, hi) = (bound(lo)?, bound(hi)?);
    let items: Vec<Value> = if inclusive {
        (lo..=hi).map(Value::Int).collect()
    } else {
        (lo..hi).map(Value::Int).collect()
    };
    Ok(Value::array(items))
}

/// Elements visited by `foreach`: an array snapshot, string characters,
/// sorted hash keys, or a lone scalar. `null` yields nothing.
fn iteration_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.borrow().clone(),
        Value::Str(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
        Value::Hash(map) => sorted_entries(&map.borrow())
            .into_iter()
            .map(|(k, _)| k.to_value())
            .collect(),
        other => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lexer::Lexer;
    use crate::core::parser::parse_program;

    fn run_with(src: &str, options: RuntimeOptions) -> (Result<Value, RuntimeError>, String) {
        let mut lexer = Lexer::new(src);
        let tokens = lexer.tokenize();
        assert!(lexer.errors().is_empty(), "lexer errors: {:?}", lexer.errors());
        let program = parse_program(tokens).expect("parse");
        let globals = Environment::new(options.scope);
        for (name, value) in crate::core::builtins::get_builtins() {
            globals.define(name, value, true).unwrap();
        }
        let out = OutputBuffer::new();
        let mut interp = Interpreter::new(globals, options).with_output(out.clone());
        let result = interp.run(&program);
        (result, out.contents())
    }

    fn run(src: &str) -> Value {
        run_with(src, RuntimeOptions::default()).0.expect("run")
    }

    #[test]
    fn last_statement_is_the_result() {
        assert_eq!(run("$x = 2; $x * 21;"), Value::Int(42));
    }

    #[test]
    fn top_level_return_exits_early() {
        assert_eq!(run("return 7; 8;"), Value::Int(7));
    }

    #[test]
    fn eager_logic_evaluates_both_sides() {
        let src = "$n = 0; function bump() { $n++; return true; } false -and (bump()); ($n);";
        assert_eq!(run(src), Value::Int(1));
        let (result, _) = run_with(
            src,
            RuntimeOptions {
                logic: LogicMode::ShortCircuit,
                ..RuntimeOptions::default()
            },
        );
        assert_eq!(result.unwrap(), Value::Int(0));
    }

    #[test]
    fn prefix_and_postfix_increment() {
        assert_eq!(run("$i = 1; $a = $i++; ($a);"), Value::Int(1));
        assert_eq!(run("$i = 1; $a = ++$i; ($a);"), Value::Int(2));
        assert_eq!(run("$i = 1; $i++; ($i);"), Value::Int(2));
    }

    #[test]
    fn print_writes_to_the_output_sink() {
        let (result, out) = run_with("print(\"a\", 1); print(2.0);", RuntimeOptions::default());
        assert_eq!(result.unwrap(), Value::Null);
        assert_eq!(out, "a 1\n2.0\n");
    }

    #[test]
    fn errors_carry_the_innermost_position() {
        let (result, _) = run_with("$a = 1;\n$b = $a + $missing;", RuntimeOptions::default());
        let err = result.unwrap_err();
        assert_eq!(err.message, "Undefined variable 'missing'");
        assert_eq!((err.line, err.column), (2, 11));
    }

    #[test]
    fn stray_break_is_an_error() {
        let (result, _) = run_with("break;", RuntimeOptions::default());
        assert_eq!(result.unwrap_err().message, "'break' used outside of a loop");
    }

    #[test]
    fn call_depth_is_bounded() {
        let (result, _) = run_with(
            "function down($n) { return down($n + 1); } down(0);",
            RuntimeOptions {
                max_call_depth: 64,
                ..RuntimeOptions::default()
            },
        );
        assert_eq!(result.unwrap_err().message, "Maximum call depth exceeded");
    }

    #[test]
    fn shadow_mode_keeps_outer_binding() {
        let src = "$x = 1; function f() { $x = 2; } f(); ($x);";
        assert_eq!(run(src), Value::Int(2));
        let shadow = RuntimeOptions {
            scope: ScopeMode::Shadow,
            ..RuntimeOptions::default()
        };
        let (result, _) = run_with(src, shadow);
        assert_eq!(result.unwrap(), Value::Int(1));
        // compound assignment updates the existing binding in either mode
        let (result, _) = run_with("$x = 1; { $x += 1; } ($x);", shadow);
        assert_eq!(result.unwrap(), Value::Int(2));
    }
}
