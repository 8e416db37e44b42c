//! Lexical scopes.
//!
//! Names are stored lower-cased without the `$` sigil. Scopes are shared
//! (`Rc<RefCell<..>>`): every closure created in a scope and every child
//! scope holds the same cell, so writes are visible to all of them.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::core::error::RuntimeError;
use crate::core::value::Value;

/// How `define` treats a name that already exists in an enclosing scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeMode {
    /// Rebind the existing binding wherever it lives; insert locally only when absent.
    #[default]
    DefineUpward,
    /// Always bind in the innermost scope.
    Shadow,
}

#[derive(Debug, Default)]
struct Scope {
    values: HashMap<String, Value>,
    constants: HashSet<String>,
    parent: Option<Environment>,
}

#[derive(Debug, Clone)]
pub struct Environment {
    scope: Rc<RefCell<Scope>>,
    mode: ScopeMode,
}

pub fn normalize(name: &str) -> String {
    name.trim_start_matches('$').to_ascii_lowercase()
}

impl Environment {
    pub fn new(mode: ScopeMode) -> Self {
        Self {
            scope: Rc::new(RefCell::new(Scope::default())),
            mode,
        }
    }

    pub fn child(&self) -> Self {
        let scope = Scope {
            parent: Some(self.clone()),
            ..Scope::default()
        };
        Self {
            scope: Rc::new(RefCell::new(scope)),
            mode: self.mode,
        }
    }

    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    pub fn parent(&self) -> Option<Environment> {
        self.scope.borrow().parent.clone()
    }

    /// Nearest scope (this one or an ancestor) that binds `key`.
    fn owner_of(&self, key: &str) -> Option<Environment> {
        let mut env = Some(self.clone());
        while let Some(e) = env {
            if e.scope.borrow().values.contains_key(key) {
                return Some(e);
            }
            env = e.parent();
        }
        None
    }

    /// Bind `name`. Under `DefineUpward` an existing binding in any ancestor is
    /// updated in place; otherwise the name is inserted here.
    pub fn define(&self, name: &str, value: Value, constant: bool) -> Result<(), RuntimeError> {
        let key = normalize(name);
        let target = match self.mode {
            ScopeMode::DefineUpward => match self.owner_of(&key) {
                Some(owner) if !owner.holds_builtin(&key) => owner,
                _ => self.clone(),
            },
            ScopeMode::Shadow => self.clone(),
        };
        let mut scope = target.scope.borrow_mut();
        if scope.constants.contains(&key) {
            if constant {
                return Ok(());
            }
            return Err(RuntimeError::runtime(format!("Cannot assign to constant '{}'", key)));
        }
        scope.values.insert(key.clone(), value);
        if constant {
            scope.constants.insert(key);
        }
        Ok(())
    }

    /// Bind `name` in this scope regardless of mode. Used for call frames
    /// (parameters and `this`), which must never leak into the closure.
    pub fn define_local(&self, name: &str, value: Value) {
        let key = normalize(name);
        let mut scope = self.scope.borrow_mut();
        scope.constants.remove(&key);
        scope.values.insert(key, value);
    }

    /// Builtins are constants of the root scope. A script binding of the same
    /// name shadows one from an inner scope instead of failing.
    fn holds_builtin(&self, key: &str) -> bool {
        let scope = self.scope.borrow();
        scope.constants.contains(key) && matches!(scope.values.get(key), Some(Value::Builtin(_)))
    }

    /// Update an existing binding; fails if no scope defines `name`.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let key = normalize(name);
        let Some(mut owner) = self.owner_of(&key) else {
            return Err(RuntimeError::name(format!("Undefined variable '{}'", key)));
        };
        if owner.holds_builtin(&key) {
            owner = self.clone();
        }
        let mut scope = owner.scope.borrow_mut();
        if scope.constants.contains(&key) {
            return Err(RuntimeError::runtime(format!("Cannot assign to constant '{}'", key)));
        }
        scope.values.insert(key, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        let key = normalize(name);
        let mut env = Some(self.clone());
        while let Some(e) = env {
            if let Some(v) = e.scope.borrow().values.get(&key) {
                return Ok(v.clone());
            }
            env = e.parent();
        }
        Err(RuntimeError::name(format!("Undefined variable '{}'", key)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.owner_of(&normalize(name)).is_some()
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.scope.borrow().values.contains_key(&normalize(name))
    }

    pub fn is_constant(&self, name: &str) -> bool {
        let key = normalize(name);
        self.owner_of(&key)
            .is_some_and(|e| e.scope.borrow().constants.contains(&key))
    }

    /// Names bound directly in this scope, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scope.borrow().values.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every binding in this scope. Breaks `Rc` cycles between a scope
    /// and the closures stored in it.
    pub fn clear(&self) {
        let mut scope = self.scope.borrow_mut();
        scope.values.clear();
        scope.constants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_updates_ancestor_binding() {
        let global = Environment::new(ScopeMode::DefineUpward);
        global.define("$Count", Value::Int(1), false).unwrap();
        let inner = global.child().child();
        inner.define("count", Value::Int(2), false).unwrap();
        assert!(!inner.contains_local("count"));
        assert_eq!(global.get("COUNT").unwrap(), Value::Int(2));
    }

    #[test]
    fn shadow_mode_binds_locally() {
        let global = Environment::new(ScopeMode::Shadow);
        global.define("x", Value::Int(1), false).unwrap();
        let inner = global.child();
        inner.define("x", Value::Int(2), false).unwrap();
        assert_eq!(global.get("x").unwrap(), Value::Int(1));
        assert_eq!(inner.get("x").unwrap(), Value::Int(2));
    }

    #[test]
    fn assign_requires_existing_binding() {
        let env = Environment::new(ScopeMode::DefineUpward);
        let err = env.assign("missing", Value::Null).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::NameError);
        assert_eq!(err.message, "Undefined variable 'missing'");
    }

    #[test]
    fn builtin_names_are_shadowed_not_rejected() {
        let global = Environment::new(ScopeMode::DefineUpward);
        let max = crate::core::builtins::get_builtins().remove("max").unwrap();
        global.define("max", max, true).unwrap();
        let program = global.child();
        program.define("max", Value::Int(10), false).unwrap();
        assert_eq!(program.get("max").unwrap(), Value::Int(10));
        assert!(matches!(global.get("max").unwrap(), Value::Builtin(_)));
        // later writes reach the script binding, not the builtin
        program.child().define("max", Value::Int(11), false).unwrap();
        assert_eq!(program.get("max").unwrap(), Value::Int(11));
        // the root scope itself still refuses
        assert!(global.define("max", Value::Int(1), false).is_err());
    }

    #[test]
    fn constants_reject_reassignment() {
        let env = Environment::new(ScopeMode::DefineUpward);
        env.define("pi", Value::Float(1.5), true).unwrap();
        assert!(env.assign("pi", Value::Int(3)).is_err());
        assert!(env.child().define("pi", Value::Int(3), false).is_err());
        // redefining a constant as a constant is a no-op
        env.define("pi", Value::Int(3), true).unwrap();
        assert_eq!(env.get("pi").unwrap(), Value::Float(1.5));
    }

    #[test]
    fn define_local_ignores_ancestors() {
        let global = Environment::new(ScopeMode::DefineUpward);
        global.define("n", Value::Int(1), false).unwrap();
        let frame = global.child();
        frame.define_local("n", Value::Int(9));
        assert_eq!(frame.get("n").unwrap(), Value::Int(9));
        assert_eq!(global.get("n").unwrap(), Value::Int(1));
    }

    #[test]
    fn sibling_scopes_share_parent_writes() {
        let global = Environment::new(ScopeMode::DefineUpward);
        global.define("n", Value::Int(0), false).unwrap();
        let a = global.child();
        let b = global.child();
        a.assign("n", Value::Int(5)).unwrap();
        assert_eq!(b.get("n").unwrap(), Value::Int(5));
    }
}
