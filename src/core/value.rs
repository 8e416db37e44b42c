//! Runtime value model.
//!
//! Containers and objects are shared (`Rc`) so that assigning a variable to
//! another aliases the same array, hash or instance; mutation through one
//! holder is visible through all of them.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::core::ast::{Block, Expr, FieldDecl, Param};
use crate::core::environment::Environment;
use crate::core::error::RuntimeError;
use crate::core::interpreter::Interpreter;

pub type Array = Rc<RefCell<Vec<Value>>>;
pub type Hash = Rc<RefCell<HashMap<HashKey, Value>>>;

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Array(Array),
    Hash(Hash),
    Function(Rc<Function>),
    Builtin(Rc<Builtin>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
}

/// Body of a user function: a block, or a single expression for `=>` lambdas.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Block),
    Expr(Expr),
}

pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: Rc<FunctionBody>,
    pub closure: Environment,
    pub is_async: bool,
}

impl Function {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params.iter().map(|p| &p.name).collect::<Vec<_>>())
            .field("is_async", &self.is_async)
            .finish()
    }
}

pub type BuiltinFn = fn(&mut Interpreter, Vec<Value>) -> Result<Value, RuntimeError>;

pub struct Builtin {
    pub name: &'static str,
    /// `None` for variadic builtins.
    pub arity: Option<usize>,
    pub f: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

pub struct Class {
    pub name: String,
    /// Keyed by lower-cased method name.
    pub methods: HashMap<String, Rc<Function>>,
    pub base: Option<Rc<Class>>,
    pub fields: Vec<FieldDecl>,
    pub closure: Environment,
}

impl Class {
    /// Method lookup through the base-class chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        let key = name.to_ascii_lowercase();
        let mut class = Some(self);
        while let Some(c) = class {
            if let Some(m) = c.methods.get(&key) {
                return Some(Rc::clone(m));
            }
            class = c.base.as_deref();
        }
        None
    }

    /// A method named `constructor`, else one named after the class.
    pub fn constructor(&self) -> Option<Rc<Function>> {
        self.methods
            .get("constructor")
            .or_else(|| self.methods.get(&self.name.to_ascii_lowercase()))
            .cloned()
    }

    /// True if this class is `name` or derives from it.
    pub fn is_a(&self, name: &str) -> bool {
        let mut class = Some(self);
        while let Some(c) = class {
            if c.name.eq_ignore_ascii_case(name) {
                return true;
            }
            class = c.base.as_deref();
        }
        false
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("methods", &methods)
            .field("base", &self.base.as_ref().map(|b| b.name.clone()))
            .finish()
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    pub fields: RefCell<HashMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(name.to_ascii_lowercase(), value);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<String> = self.fields.borrow().keys().cloned().collect();
        fields.sort();
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &fields)
            .finish()
    }
}

/// Hash keys are restricted to primitives; anything else is keyed by its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
}

impl HashKey {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(b) => HashKey::Bool(*b),
            Value::Int(n) => HashKey::Int(*n),
            // 1 and 1.0 address the same entry
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => HashKey::Int(*f as i64),
            Value::Float(f) => HashKey::Float(f.to_bits()),
            Value::Str(s) => HashKey::Str(s.to_string()),
            other => HashKey::Str(other.to_string()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            HashKey::Bool(b) => Value::Bool(*b),
            HashKey::Int(n) => Value::Int(*n),
            HashKey::Float(bits) => Value::Float(f64::from_bits(*bits)),
            HashKey::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Operand of an arithmetic operator after `null`/bool coercion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_zero(self) -> bool {
        self.as_f64() == 0.0
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn hash(entries: HashMap<HashKey, Value>) -> Value {
        Value::Hash(Rc::new(RefCell::new(entries)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Numeric view used by arithmetic: `null` and `false` are 0, `true` is 1.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Null => Some(Number::Int(0)),
            Value::Bool(b) => Some(Number::Int(*b as i64)),
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "double".into(),
            Value::Str(_) => "string".into(),
            Value::Array(_) => "array".into(),
            Value::Hash(_) => "hashtable".into(),
            Value::Function(_) => "function".into(),
            Value::Builtin(_) => "builtin".into(),
            Value::Class(_) => "class".into(),
            Value::Instance(i) => i.class.name.clone(),
        }
    }

    /// `-is` check against a type name, with the usual aliases.
    pub fn is_type(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        match (self, name.as_str()) {
            (Value::Null, _) => name == "null",
            (_, "object") => true,
            (Value::Bool(_), "bool" | "boolean") => true,
            (Value::Int(_), "int" | "long" | "int64" | "int32") => true,
            (Value::Float(_), "double" | "float" | "decimal") => true,
            (Value::Str(_), "string") => true,
            (Value::Array(_), "array" | "list") => true,
            (Value::Hash(_), "hashtable" | "dictionary" | "hash") => true,
            (Value::Function(_) | Value::Builtin(_), "function" | "scriptblock") => true,
            (Value::Class(_), "class" | "type") => true,
            (Value::Instance(i), n) => i.class.is_a(n),
            _ => false,
        }
    }

    /// Equality used by `-eq`, `switch` and `-contains`. Numbers and bools
    /// compare numerically; containers compare by content;
    /// functions, classes and instances by identity.
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.loose_eq_in(other, &mut Vec::new())
    }

    fn loose_eq_in(&self, other: &Value, seen: &mut Vec<(usize, usize)>) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Int(_) | Float(_) | Bool(_), Int(_) | Float(_) | Bool(_)) => {
                self.as_number().map(Number::as_f64) == other.as_number().map(Number::as_f64)
            }
            (Str(a), Str(b)) => a == b,
            (Array(a), Array(b)) => {
                Rc::ptr_eq(a, b)
                    || nested(seen, addr(a), addr(b), |seen| {
                        let (a, b) = (a.borrow(), b.borrow());
                        a.len() == b.len()
                            && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq_in(y, seen))
                    })
            }
            (Hash(a), Hash(b)) => {
                Rc::ptr_eq(a, b)
                    || nested(seen, addr(a), addr(b), |seen| {
                        let (a, b) = (a.borrow(), b.borrow());
                        a.len() == b.len()
                            && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq_in(w, seen)))
                    })
            }
            (Function(a), Function(b)) => Rc::ptr_eq(a, b),
            (Builtin(a), Builtin(b)) => Rc::ptr_eq(a, b),
            (Class(a), Class(b)) => Rc::ptr_eq(a, b),
            (Instance(a), Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering for `-gt`/`-lt`/`-ge`/`-le`. `None` when the operands are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        self.compare_in(other, &mut Vec::new())
    }

    fn compare_in(&self, other: &Value, seen: &mut Vec<(usize, usize)>) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Int(_) | Float(_) | Bool(_), Int(_) | Float(_) | Bool(_)) => {
                let a = self.as_number()?.as_f64();
                let b = other.as_number()?.as_f64();
                a.partial_cmp(&b)
            }
            (Str(a), Str(b)) => Some(a.cmp(b)),
            (Array(a), Array(b)) if Rc::ptr_eq(a, b) => Some(Ordering::Equal),
            (Array(a), Array(b)) => {
                if seen.contains(&(addr(a), addr(b))) {
                    return Some(Ordering::Equal);
                }
                seen.push((addr(a), addr(b)));
                let (a, b) = (a.borrow(), b.borrow());
                let mut ord = Some(a.len().cmp(&b.len()));
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare_in(y, seen) {
                        Some(Ordering::Equal) => continue,
                        other => {
                            ord = other;
                            break;
                        }
                    }
                }
                seen.pop();
                ord
            }
            _ => None,
        }
    }

    /// Display form with strings quoted; used for container elements.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s.as_ref()),
            other => other.to_string(),
        }
    }

    /// Convert to a plain host value. Hash keys become strings; functions,
    /// builtins and classes become their display text; instances become field maps.
    /// A container reached again through itself becomes its display marker.
    pub fn to_host(&self) -> serde_json::Value {
        self.to_host_in(&mut Vec::new())
    }

    fn to_host_in(&self, seen: &mut Vec<usize>) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(n) => J::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(J::Number).unwrap_or(J::Null),
            Value::Str(s) => J::String(s.to_string()),
            Value::Array(items) if seen.contains(&addr(items)) => J::String("@(...)".into()),
            Value::Hash(map) if seen.contains(&addr(map)) => J::String("@{...}".into()),
            Value::Array(items) => {
                seen.push(addr(items));
                let out = J::Array(items.borrow().iter().map(|v| v.to_host_in(seen)).collect());
                seen.pop();
                out
            }
            Value::Hash(map) => {
                seen.push(addr(map));
                let out = J::Object(
                    map.borrow()
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_host_in(seen)))
                        .collect(),
                );
                seen.pop();
                out
            }
            Value::Instance(inst) if seen.contains(&addr(inst)) => J::String(self.to_string()),
            Value::Instance(inst) => {
                seen.push(addr(inst));
                let out = J::Object(
                    inst.fields
                        .borrow()
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_host_in(seen)))
                        .collect(),
                );
                seen.pop();
                out
            }
            other => J::String(other.to_string()),
        }
    }

    pub fn from_host(host: &serde_json::Value) -> Value {
        use serde_json::Value as J;
        match host {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(*b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => Value::from(s.as_str()),
            J::Array(items) => Value::array(items.iter().map(Value::from_host).collect()),
            J::Object(map) => Value::hash(
                map.iter()
                    .map(|(k, v)| (HashKey::Str(k.clone()), Value::from_host(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl PartialEq for Value {
    /// Strict equality: same variant and same content (identity for shared objects).
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq_in(other, &mut Vec::new())
    }
}

impl Value {
    fn strict_eq_in(&self, other: &Value, seen: &mut Vec<(usize, usize)>) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Array(a), Array(b)) => {
                Rc::ptr_eq(a, b)
                    || nested(seen, addr(a), addr(b), |seen| {
                        let (a, b) = (a.borrow(), b.borrow());
                        a.len() == b.len()
                            && a.iter().zip(b.iter()).all(|(x, y)| x.strict_eq_in(y, seen))
                    })
            }
            (Hash(a), Hash(b)) => {
                Rc::ptr_eq(a, b)
                    || nested(seen, addr(a), addr(b), |seen| {
                        let (a, b) = (a.borrow(), b.borrow());
                        a.len() == b.len()
                            && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.strict_eq_in(w, seen)))
                    })
            }
            (Function(a), Function(b)) => Rc::ptr_eq(a, b),
            (Builtin(a), Builtin(b)) => Rc::ptr_eq(a, b),
            (Class(a), Class(b)) => Rc::ptr_eq(a, b),
            (Instance(a), Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn addr<T>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as usize
}

/// Compare two containers once per pair; a pair met again while still
/// being compared is taken as equal.
fn nested(
    seen: &mut Vec<(usize, usize)>,
    a: usize,
    b: usize,
    compare: impl FnOnce(&mut Vec<(usize, usize)>) -> bool,
) -> bool {
    if seen.contains(&(a, b)) {
        return true;
    }
    seen.push((a, b));
    let result = compare(seen);
    seen.pop();
    result
}

/// Hash entries ordered by key, for deterministic iteration and output.
pub fn sorted_entries(map: &HashMap<HashKey, Value>) -> Vec<(HashKey, Value)> {
    let mut entries: Vec<(HashKey, Value)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_in(f, &mut Vec::new())
    }
}

impl Value {
    /// `seen` holds the containers currently being written; one that
    /// contains itself is written as `@(...)` or `@{...}`.
    fn write_in(&self, f: &mut fmt::Formatter<'_>, seen: &mut Vec<usize>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(items) if seen.contains(&addr(items)) => write!(f, "@(...)"),
            Value::Hash(map) if seen.contains(&addr(map)) => write!(f, "@{{...}}"),
            Value::Array(items) => {
                seen.push(addr(items));
                write!(f, "@(")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.write_element(f, seen)?;
                }
                seen.pop();
                write!(f, ")")
            }
            Value::Hash(map) => {
                seen.push(addr(map));
                write!(f, "@{{")?;
                for (i, (k, v)) in sorted_entries(&map.borrow()).iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{} = ", k)?;
                    v.write_element(f, seen)?;
                }
                seen.pop();
                write!(f, "}}")
            }
            Value::Function(func) => write!(f, "<function {}>", func.display_name()),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Value::Class(c) => write!(f, "<class {}>", c.name),
            Value::Instance(i) => write!(f, "<{} instance>", i.class.name),
        }
    }

    fn write_element(&self, f: &mut fmt::Formatter<'_>, seen: &mut Vec<usize>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s.as_ref()),
            other => other.write_in(f, seen),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_emptiness_for_scalars_only() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Float(0.0).truthy());
        assert!(!Value::from("").truthy());
        assert!(Value::array(vec![]).truthy());
        assert!(Value::hash(HashMap::new()).truthy());
        assert!(Value::from("0").truthy());
    }

    #[test]
    fn floats_always_show_a_fraction() {
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Int(3).to_string(), "3");
    }

    #[test]
    fn containers_render_nested_values() {
        let arr = Value::array(vec![Value::Int(1), Value::from("a"), Value::Null]);
        assert_eq!(arr.to_string(), "@(1, \"a\", null)");
        let mut map = HashMap::new();
        map.insert(HashKey::Str("y".into()), Value::Int(2));
        map.insert(HashKey::Str("x".into()), Value::Int(1));
        assert_eq!(Value::hash(map).to_string(), "@{x = 1; y = 2}");
    }

    #[test]
    fn loose_equality_crosses_numeric_types() {
        assert!(Value::Int(3).loose_eq(&Value::Float(3.0)));
        assert!(Value::Int(1).loose_eq(&Value::Bool(true)));
        assert!(!Value::Int(2).loose_eq(&Value::Bool(true)));
        assert!(Value::array(vec![Value::Int(1)]).loose_eq(&Value::array(vec![Value::Float(1.0)])));
        assert_ne!(Value::Int(3), Value::Float(3.0));
    }

    #[test]
    fn non_primitive_keys_are_stringified() {
        let key = HashKey::from_value(&Value::array(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(key, HashKey::Str("@(1, 2)".into()));
    }

    #[test]
    fn integral_float_keys_match_int_keys() {
        assert_eq!(HashKey::from_value(&Value::Float(1.0)), HashKey::Int(1));
        assert_eq!(HashKey::from_value(&Value::Float(-0.0)), HashKey::Int(0));
        assert_eq!(HashKey::from_value(&Value::Float(1.5)), HashKey::Float(1.5f64.to_bits()));
    }

    #[test]
    fn self_containing_array_renders_and_compares() {
        let arr = Value::array(vec![Value::Int(1)]);
        if let Value::Array(items) = &arr {
            items.borrow_mut().push(arr.clone());
        }
        assert_eq!(arr.to_string(), "@(1, @(...))");
        assert!(arr.loose_eq(&arr.clone()));
        assert_eq!(arr, arr.clone());
        assert_eq!(arr.compare(&arr), Some(Ordering::Equal));
        assert_eq!(arr.to_host(), serde_json::json!([1, "@(...)"]));

        let other = Value::array(vec![Value::Int(1)]);
        if let Value::Array(items) = &other {
            items.borrow_mut().push(other.clone());
        }
        assert!(arr.loose_eq(&other));
        // break the cycles
        for v in [&arr, &other] {
            if let Value::Array(items) = v {
                items.borrow_mut().clear();
            }
        }
    }

    #[test]
    fn host_conversion_is_lossy_for_keys() {
        let mut map = HashMap::new();
        map.insert(HashKey::Int(1), Value::from("one"));
        let host = Value::hash(map).to_host();
        assert_eq!(host, serde_json::json!({"1": "one"}));
        let back = Value::from_host(&host);
        let Value::Hash(h) = back else { panic!("expected hash") };
        assert!(h.borrow().contains_key(&HashKey::Str("1".into())));
    }
}
