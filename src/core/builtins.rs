//! Builtin functions seeded into the global scope as constants.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::core::error::RuntimeError;
use crate::core::interpreter::Interpreter;
use crate::core::operators::{to_float, to_int};
use crate::core::value::{sorted_entries, Builtin, BuiltinFn, Number, Value};

type BuiltinResult = Result<Value, RuntimeError>;

fn builtin(name: &'static str, arity: Option<usize>, f: BuiltinFn) -> (&'static str, Value) {
    (name, Value::Builtin(Rc::new(Builtin { name, arity, f })))
}

pub fn get_builtins() -> BTreeMap<&'static str, Value> {
    [
        builtin("print", None, builtin_print),
        builtin("len", Some(1), builtin_len),
        builtin("str", Some(1), builtin_str),
        builtin("int", Some(1), builtin_int),
        builtin("float", Some(1), builtin_float),
        builtin("typeof", Some(1), builtin_typeof),
        builtin("keys", Some(1), builtin_keys),
        builtin("values", Some(1), builtin_values),
        builtin("push", Some(2), builtin_push),
        builtin("pop", Some(1), builtin_pop),
        builtin("range", None, builtin_range),
        builtin("abs", Some(1), builtin_abs),
        builtin("min", None, builtin_min),
        builtin("max", None, builtin_max),
        builtin("sqrt", Some(1), builtin_sqrt),
        builtin("round", None, builtin_round),
        builtin("upper", Some(1), builtin_upper),
        builtin("lower", Some(1), builtin_lower),
        builtin("split", None, builtin_split),
        builtin("join", None, builtin_join),
    ]
    .into_iter()
    .collect()
}

/// Arity check for variadic builtins.
fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), RuntimeError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(RuntimeError::argument(format!(
            "{}() takes {} argument(s) but {} were given",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn type_mismatch(name: &str, expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "{}() expects {}, got {}",
        name,
        expected,
        got.type_name()
    ))
}

fn builtin_print(interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    let parts: Vec<String> = args.iter().map(Value::to_string).collect();
    interp.write_line(&parts.join(" "))?;
    Ok(Value::Null)
}

fn builtin_len(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    let n = match &args[0] {
        Value::Array(items) => items.borrow().len(),
        Value::Str(s) => s.chars().count(),
        Value::Hash(map) => map.borrow().len(),
        other => return Err(type_mismatch("len", "an array, string or hashtable", other)),
    };
    Ok(Value::Int(n as i64))
}

fn builtin_str(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    Ok(Value::from(args[0].to_string()))
}

fn builtin_int(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    to_int(&args[0]).map(Value::Int)
}

fn builtin_float(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    to_float(&args[0]).map(Value::Float)
}

fn builtin_typeof(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    Ok(Value::from(args[0].type_name()))
}

fn builtin_keys(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    match &args[0] {
        Value::Hash(map) => Ok(Value::array(
            sorted_entries(&map.borrow()).into_iter().map(|(k, _)| k.to_value()).collect(),
        )),
        other => Err(type_mismatch("keys", "a hashtable", other)),
    }
}

fn builtin_values(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    match &args[0] {
        Value::Hash(map) => Ok(Value::array(
            sorted_entries(&map.borrow()).into_iter().map(|(_, v)| v).collect(),
        )),
        other => Err(type_mismatch("values", "a hashtable", other)),
    }
}

/// Appends in place and returns the same array.
fn builtin_push(_interp: &mut Interpreter, mut args: Vec<Value>) -> BuiltinResult {
    let item = args.pop().unwrap_or(Value::Null);
    let target = args.pop().unwrap_or(Value::Null);
    match &target {
        Value::Array(items) => items.borrow_mut().push(item),
        other => return Err(type_mismatch("push", "an array", other)),
    }
    Ok(target)
}

fn builtin_pop(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    match &args[0] {
        Value::Array(items) => items
            .borrow_mut()
            .pop()
            .ok_or_else(|| RuntimeError::index("pop from empty array")),
        other => Err(type_mismatch("pop", "an array", other)),
    }
}

/// `range(end)`, `range(start, end)` or `range(start, end, step)`; `end` is exclusive.
fn builtin_range(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    expect_args("range", &args, 1, 3)?;
    let nums = args.iter().map(to_int).collect::<Result<Vec<i64>, _>>()?;
    let (start, end, step) = match nums.as_slice() {
        [end] => (0, *end, 1),
        [start, end] => (*start, *end, 1),
        [start, end, step] => (*start, *end, *step),
        _ => return Err(RuntimeError::argument("range() takes 1 to 3 argument(s)")),
    };
    if step == 0 {
        return Err(RuntimeError::argument("range() step must not be zero"));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        out.push(Value::Int(i));
        i = match i.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::array(out))
}

fn builtin_abs(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    match args[0].as_number() {
        Some(Number::Int(n)) => Ok(n.checked_abs().map(Value::Int).unwrap_or(Value::Float((n as f64).abs()))),
        Some(Number::Float(f)) => Ok(Value::Float(f.abs())),
        None => Err(type_mismatch("abs", "a number", &args[0])),
    }
}

/// Candidates for `min`/`max`: a single array argument or the argument list itself.
fn extremum(name: &str, args: Vec<Value>, want: Ordering) -> BuiltinResult {
    let items = if let [Value::Array(items)] = args.as_slice() {
        let snapshot = items.borrow().clone();
        snapshot
    } else {
        args
    };
    let mut iter = items.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| RuntimeError::argument(format!("{}() arg is an empty sequence", name)))?;
    for item in iter {
        let ord = item.compare(&best).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "{}() cannot compare {} and {}",
                name,
                item.type_name(),
                best.type_name()
            ))
        })?;
        if ord == want {
            best = item;
        }
    }
    Ok(best)
}

fn builtin_min(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    extremum("min", args, Ordering::Less)
}

fn builtin_max(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    extremum("max", args, Ordering::Greater)
}

fn builtin_sqrt(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    let x = args[0]
        .as_number()
        .ok_or_else(|| type_mismatch("sqrt", "a number", &args[0]))?
        .as_f64();
    if x < 0.0 {
        return Err(RuntimeError::argument("sqrt() of a negative number"));
    }
    Ok(Value::Float(x.sqrt()))
}

/// `round(x)` gives an int; `round(x, digits)` a double.
fn builtin_round(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    expect_args("round", &args, 1, 2)?;
    let x = args[0]
        .as_number()
        .ok_or_else(|| type_mismatch("round", "a number", &args[0]))?
        .as_f64();
    match args.get(1) {
        None => Ok(Value::Int(x.round() as i64)),
        Some(digits) => {
            let digits = i32::try_from(to_int(digits)?)
                .map_err(|_| RuntimeError::argument("round() digits out of range"))?;
            let factor = 10f64.powi(digits);
            Ok(Value::Float((x * factor).round() / factor))
        }
    }
}

fn builtin_upper(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    Ok(Value::from(args[0].to_string().to_uppercase()))
}

fn builtin_lower(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    Ok(Value::from(args[0].to_string().to_lowercase()))
}

/// `split(s)` splits on whitespace; `split(s, sep)` on a literal separator.
fn builtin_split(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    expect_args("split", &args, 1, 2)?;
    let text = match &args[0] {
        Value::Str(s) => s.to_string(),
        other => return Err(type_mismatch("split", "a string", other)),
    };
    let parts: Vec<Value> = match args.get(1) {
        None => text.split_whitespace().map(Value::from).collect(),
        Some(sep) => {
            let sep = sep.to_string();
            if sep.is_empty() {
                return Err(RuntimeError::argument("split() separator must not be empty"));
            }
            text.split(sep.as_str()).map(Value::from).collect()
        }
    };
    Ok(Value::array(parts))
}

fn builtin_join(_interp: &mut Interpreter, args: Vec<Value>) -> BuiltinResult {
    expect_args("join", &args, 1, 2)?;
    let sep = args.get(1).map(Value::to_string).unwrap_or_default();
    match &args[0] {
        Value::Array(items) => {
            let parts: Vec<String> = items.borrow().iter().map(Value::to_string).collect();
            Ok(Value::from(parts.join(&sep)))
        }
        other => Err(type_mismatch("join", "an array", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::environment::Environment;
    use crate::core::interpreter::{OutputBuffer, RuntimeOptions};

    fn interp() -> (Interpreter, OutputBuffer) {
        let out = OutputBuffer::new();
        let globals = Environment::new(Default::default());
        let interp = Interpreter::new(globals, RuntimeOptions::default()).with_output(out.clone());
        (interp, out)
    }

    fn call(name: &str, args: Vec<Value>) -> BuiltinResult {
        let (mut interp, _) = interp();
        let f = get_builtins().remove(name).expect("builtin exists");
        interp.call(f, args)
    }

    #[test]
    fn table_contains_required_entries() {
        let table = get_builtins();
        assert!(table.contains_key("len"));
        assert!(table.contains_key("print"));
        assert_eq!(table.len(), 20);
    }

    #[test]
    fn len_counts_characters_and_elements() {
        assert_eq!(call("len", vec![Value::from("héllo")]).unwrap(), Value::Int(5));
        let arr = Value::array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(call("len", vec![arr]).unwrap(), Value::Int(2));
        let err = call("len", vec![Value::Int(3)]).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::TypeError);
    }

    #[test]
    fn fixed_arity_is_enforced() {
        let err = call("len", vec![]).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::ArgumentError);
        assert_eq!(err.message, "len() takes 1 argument(s) but 0 were given");
    }

    #[test]
    fn push_mutates_through_aliases() {
        let arr = Value::array(vec![]);
        call("push", vec![arr.clone(), Value::Int(9)]).unwrap();
        assert_eq!(arr.to_string(), "@(9)");
        assert_eq!(call("pop", vec![arr.clone()]).unwrap(), Value::Int(9));
        assert!(call("pop", vec![arr]).is_err());
    }

    #[test]
    fn range_and_extrema() {
        let r = call("range", vec![Value::Int(1), Value::Int(7), Value::Int(2)]).unwrap();
        assert_eq!(r.to_string(), "@(1, 3, 5)");
        let r = call("range", vec![Value::Int(3), Value::Int(0), Value::Int(-1)]).unwrap();
        assert_eq!(r.to_string(), "@(3, 2, 1)");
        let nums = Value::array(vec![Value::Int(4), Value::Float(1.5), Value::Int(9)]);
        assert_eq!(call("min", vec![nums.clone()]).unwrap(), Value::Float(1.5));
        assert_eq!(call("max", vec![nums]).unwrap(), Value::Int(9));
        assert!(call("max", vec![]).is_err());
    }

    #[test]
    fn strings() {
        let parts = call("split", vec![Value::from("a,b,c"), Value::from(",")]).unwrap();
        assert_eq!(parts.to_string(), "@(\"a\", \"b\", \"c\")");
        let joined = call("join", vec![parts, Value::from("-")]).unwrap();
        assert_eq!(joined, Value::from("a-b-c"));
        assert_eq!(call("upper", vec![Value::from("abc")]).unwrap(), Value::from("ABC"));
        assert_eq!(call("round", vec![Value::Float(2.5)]).unwrap(), Value::Int(3));
        assert_eq!(
            call("round", vec![Value::Float(1.2345), Value::Int(2)]).unwrap(),
            Value::Float(1.23)
        );
    }

    #[test]
    fn print_joins_with_spaces() {
        let (mut interp, out) = interp();
        let print = get_builtins().remove("print").unwrap();
        interp
            .call(print, vec![Value::from("x"), Value::Int(1), Value::Null])
            .unwrap();
        assert_eq!(out.contents(), "x 1 null\n");
    }
}
