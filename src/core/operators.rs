//! Operator semantics over runtime values.
//!
//! Arithmetic coerces `null` and `false` to 0 and `true` to 1. Integer
//! results that overflow `i64` fall back to floating point.

use std::cmp::Ordering;

use crate::core::ast::{LiteralValue, TypeAnnotation};
use crate::core::error::RuntimeError;
use crate::core::token::TokenKind;
use crate::core::value::{Number, Value};

pub fn literal(lit: &LiteralValue) -> Value {
    match lit {
        LiteralValue::Null => Value::Null,
        LiteralValue::Bool(b) => Value::Bool(*b),
        LiteralValue::Int(n) => Value::Int(*n),
        LiteralValue::Float(f) => Value::Float(*f),
        LiteralValue::Str(s) => Value::from(s.as_str()),
    }
}

/// Operator applied by a compound assignment, or `None` for plain `=`.
pub fn compound_base(op: TokenKind) -> Option<TokenKind> {
    use TokenKind::*;
    match op {
        PlusAssign => Some(Plus),
        MinusAssign => Some(Minus),
        StarAssign => Some(Star),
        SlashAssign => Some(Slash),
        PercentAssign => Some(Percent),
        CaretAssign => Some(Caret),
        AmpAssign => Some(Ampersand),
        PipeAssign => Some(Pipe),
        _ => None,
    }
}

pub fn binary(op: TokenKind, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    use TokenKind::*;
    match op {
        Plus => add(left, right),
        Minus => arith(left, right, "-", i64::checked_sub, |a, b| a - b),
        Star => arith(left, right, "*", i64::checked_mul, |a, b| a * b),
        Slash => divide(left, right),
        Percent => modulo(left, right),
        Caret | StarStar => power(left, right),
        Eq => Ok(Value::Bool(left.loose_eq(right))),
        Ne => Ok(Value::Bool(!left.loose_eq(right))),
        Gt | Lt | Ge | Le => relational(op, left, right),
        Like => Ok(Value::Bool(like(left, right))),
        NotLike => Ok(Value::Bool(!like(left, right))),
        Match => Ok(Value::Bool(matches_text(left, right))),
        NotMatch => Ok(Value::Bool(!matches_text(left, right))),
        Contains => Ok(Value::Bool(contains(left, right))),
        NotContains => Ok(Value::Bool(!contains(left, right))),
        InOp => Ok(Value::Bool(contains(right, left))),
        NotIn => Ok(Value::Bool(!contains(right, left))),
        IsOp => Ok(Value::Bool(is_type(left, right)?)),
        IsNot => Ok(Value::Bool(!is_type(left, right)?)),
        Replace => replace(left, right),
        BAnd | Ampersand => bitwise(left, right, "-band", |a, b| a & b),
        BOr | Pipe => bitwise(left, right, "-bor", |a, b| a | b),
        BXor => bitwise(left, right, "-bxor", |a, b| a ^ b),
        ShiftLeft => shift(left, right, "<<", i64::checked_shl),
        ShiftRight => shift(left, right, ">>", i64::checked_shr),
        And | AndAnd => Ok(Value::Bool(left.truthy() && right.truthy())),
        Or | OrOr => Ok(Value::Bool(left.truthy() || right.truthy())),
        CaretCaret => Ok(Value::Bool(left.truthy() ^ right.truthy())),
        other => Err(RuntimeError::runtime(format!("Unsupported operator '{}'", other))),
    }
}

pub fn unary(op: TokenKind, operand: &Value) -> Result<Value, RuntimeError> {
    match op {
        TokenKind::Minus => match operand.as_number() {
            Some(Number::Int(n)) => Ok(n.checked_neg().map(Value::Int).unwrap_or(Value::Float(-(n as f64)))),
            Some(Number::Float(f)) => Ok(Value::Float(-f)),
            None => Err(RuntimeError::type_error(format!(
                "Bad operand type for unary -: {}",
                operand.type_name()
            ))),
        },
        TokenKind::Plus => Ok(operand.clone()),
        TokenKind::Not | TokenKind::Bang => Ok(Value::Bool(!operand.truthy())),
        TokenKind::Tilde => Ok(Value::Int(!to_bits(operand, "~")?)),
        other => Err(RuntimeError::runtime(format!("Unsupported unary operator '{}'", other))),
    }
}

/// `++`/`--` on a numeric value.
pub fn step(value: &Value, delta: i64) -> Result<Value, RuntimeError> {
    let sym = if delta > 0 { "++" } else { "--" };
    arith(value, &Value::Int(delta), sym, i64::checked_add, |a, b| a + b)
}

fn numbers(left: &Value, right: &Value, sym: &str) -> Result<(Number, Number), RuntimeError> {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(RuntimeError::type_error(format!(
            "Unsupported operand types for {}: {} and {}",
            sym,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn arith(
    left: &Value,
    right: &Value,
    sym: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    let (a, b) = numbers(left, right, sym)?;
    Ok(match (a, b) {
        (Number::Int(x), Number::Int(y)) => match int_op(x, y) {
            Some(n) => Value::Int(n),
            None => Value::Float(float_op(x as f64, y as f64)),
        },
        _ => Value::Float(float_op(a.as_f64(), b.as_f64())),
    })
}

fn add(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::from(format!("{}{}", left, right))),
        (Value::Array(items), _) => {
            // always a fresh array; the left operand is never mutated
            let mut out = items.borrow().clone();
            match right {
                Value::Array(more) => out.extend(more.borrow().iter().cloned()),
                other => out.push(other.clone()),
            }
            Ok(Value::array(out))
        }
        (Value::Hash(a), Value::Hash(b)) => {
            let mut out = a.borrow().clone();
            out.extend(b.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Value::hash(out))
        }
        _ => arith(left, right, "+", i64::checked_add, |a, b| a + b),
    }
}

fn divide(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let (a, b) = numbers(left, right, "/")?;
    if b.is_zero() {
        return Err(RuntimeError::division_by_zero());
    }
    Ok(Value::Float(a.as_f64() / b.as_f64()))
}

/// Floored integer modulo: the result takes the sign of the divisor.
fn modulo(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let (a, b) = numbers(left, right, "%")?;
    let (a, b) = (truncate(a), truncate(b));
    if b == 0 {
        return Err(RuntimeError::division_by_zero());
    }
    let r = a.wrapping_rem(b);
    Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
}

fn power(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let (a, b) = numbers(left, right, "**")?;
    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        if let Ok(exp) = u32::try_from(y) {
            if let Some(n) = x.checked_pow(exp) {
                return Ok(Value::Int(n));
            }
        }
    }
    Ok(Value::Float(a.as_f64().powf(b.as_f64())))
}

fn relational(op: TokenKind, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let ord = left.compare(right).ok_or_else(|| {
        RuntimeError::type_error(format!(
            "Cannot compare {} and {}",
            left.type_name(),
            right.type_name()
        ))
    })?;
    let result = match op {
        TokenKind::Gt => ord == Ordering::Greater,
        TokenKind::Lt => ord == Ordering::Less,
        TokenKind::Ge => ord != Ordering::Less,
        _ => ord != Ordering::Greater,
    };
    Ok(Value::Bool(result))
}

fn truncate(n: Number) -> i64 {
    match n {
        Number::Int(i) => i,
        Number::Float(f) => f as i64,
    }
}

fn to_bits(value: &Value, sym: &str) -> Result<i64, RuntimeError> {
    match value.as_number() {
        Some(Number::Int(n)) => Ok(n),
        Some(Number::Float(f)) if f.fract() == 0.0 => Ok(f as i64),
        _ => Err(RuntimeError::type_error(format!(
            "Operator {} requires integers, got {}",
            sym,
            value.type_name()
        ))),
    }
}

fn bitwise(left: &Value, right: &Value, sym: &str, op: fn(i64, i64) -> i64) -> Result<Value, RuntimeError> {
    Ok(Value::Int(op(to_bits(left, sym)?, to_bits(right, sym)?)))
}

fn shift(
    left: &Value,
    right: &Value,
    sym: &str,
    op: fn(i64, u32) -> Option<i64>,
) -> Result<Value, RuntimeError> {
    let value = to_bits(left, sym)?;
    let amount = u32::try_from(to_bits(right, sym)?)
        .map_err(|_| RuntimeError::argument(format!("Negative shift count for {}", sym)))?;
    Ok(Value::Int(op(value, amount).unwrap_or(0)))
}

/// Case-insensitive glob match supporting `*` and `?`.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    let t: Vec<char> = text.to_lowercase().chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, mark)) = backtrack {
            pi = star + 1;
            ti = mark + 1;
            backtrack = Some((star, mark + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

fn like(left: &Value, right: &Value) -> bool {
    wildcard_match(&right.to_string(), &left.to_string())
}

fn matches_text(left: &Value, right: &Value) -> bool {
    left.to_string()
        .to_lowercase()
        .contains(&right.to_string().to_lowercase())
}

/// Membership: array elements, hash keys, or a case-insensitive substring.
pub fn contains(collection: &Value, item: &Value) -> bool {
    match collection {
        Value::Array(items) => items.borrow().iter().any(|v| v.loose_eq(item)),
        Value::Hash(map) => map
            .borrow()
            .contains_key(&crate::core::value::HashKey::from_value(item)),
        Value::Str(s) => s.to_lowercase().contains(&item.to_string().to_lowercase()),
        other => other.loose_eq(item),
    }
}

fn is_type(value: &Value, ty: &Value) -> Result<bool, RuntimeError> {
    match ty {
        Value::Str(name) => match name.strip_suffix("[]") {
            Some(_) => Ok(matches!(value, Value::Array(_))),
            None => Ok(value.is_type(name)),
        },
        Value::Class(class) => Ok(matches!(value, Value::Instance(i) if i.class.is_a(&class.name))),
        other => Err(RuntimeError::type_error(format!(
            "Right operand of -is must be a type, got {}",
            other.type_name()
        ))),
    }
}

/// `"text" -replace @("old", "new")`; a bare pattern removes matches.
fn replace(left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let (pattern, with) = match right {
        Value::Array(items) => {
            let items = items.borrow();
            match items.as_slice() {
                [p] => (p.to_string(), String::new()),
                [p, w] => (p.to_string(), w.to_string()),
                _ => {
                    return Err(RuntimeError::argument(
                        "-replace expects a pattern and an optional replacement",
                    ))
                }
            }
        }
        other => (other.to_string(), String::new()),
    };
    Ok(Value::from(replace_ignore_case(&left.to_string(), &pattern, &with)))
}

fn replace_ignore_case(text: &str, pattern: &str, with: &str) -> String {
    if pattern.is_empty() {
        return text.to_string();
    }
    // ASCII folding keeps byte offsets aligned with `text`
    let haystack = text.to_ascii_lowercase();
    let needle = pattern.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (idx, _) in haystack.match_indices(&needle) {
        out.push_str(&text[last..idx]);
        out.push_str(with);
        last = idx + needle.len();
    }
    out.push_str(&text[last..]);
    out
}

pub fn to_int(value: &Value) -> Result<i64, RuntimeError> {
    match value {
        Value::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .or_else(|_| s.parse::<f64>().map(|f| f as i64))
                .map_err(|_| RuntimeError::type_error(format!("Cannot convert '{}' to int", s)))
        }
        other => other.as_number().map(truncate).ok_or_else(|| {
            RuntimeError::type_error(format!("Cannot convert {} to int", other.type_name()))
        }),
    }
}

pub fn to_float(value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| RuntimeError::type_error(format!("Cannot convert '{}' to double", s.trim()))),
        other => other.as_number().map(Number::as_f64).ok_or_else(|| {
            RuntimeError::type_error(format!("Cannot convert {} to double", other.type_name()))
        }),
    }
}

/// Wrap a value as an array; arrays pass through (same alias), `null` is empty.
pub fn to_array(value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        Value::Null => Value::array(Vec::new()),
        other => Value::array(vec![other]),
    }
}

/// `[type]value`. Unknown and class types pass the value through.
pub fn cast(target: &TypeAnnotation, value: Value) -> Result<Value, RuntimeError> {
    if target.is_array {
        return Ok(to_array(value));
    }
    match target.name.to_ascii_lowercase().as_str() {
        "int" | "long" | "int32" | "int64" => to_int(&value).map(Value::Int),
        "double" | "float" | "decimal" => to_float(&value).map(Value::Float),
        "string" => Ok(match value {
            Value::Null => Value::from(""),
            Value::Str(_) => value,
            other => Value::from(other.to_string()),
        }),
        "bool" | "boolean" => Ok(Value::Bool(value.truthy())),
        "array" | "list" => Ok(to_array(value)),
        "hashtable" | "dictionary" => match value {
            Value::Hash(_) => Ok(value),
            other => Err(RuntimeError::type_error(format!(
                "Cannot convert {} to hashtable",
                other.type_name()
            ))),
        },
        _ => Ok(value),
    }
}

/// Text of a `[type]` reference used as a value.
pub fn type_label(target: &TypeAnnotation) -> String {
    if target.is_array {
        format!("{}[]", target.name)
    } else {
        target.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    #[test]
    fn division_always_yields_float() {
        assert_eq!(binary(TokenKind::Slash, &int(7), &int(2)).unwrap(), Value::Float(3.5));
        assert_eq!(binary(TokenKind::Slash, &int(6), &int(3)).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn null_divisor_is_zero() {
        let err = binary(TokenKind::Slash, &int(1), &Value::Null).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::DivisionByZeroError);
        assert!(binary(TokenKind::Percent, &int(1), &int(0)).is_err());
    }

    #[test]
    fn modulo_is_floored() {
        assert_eq!(binary(TokenKind::Percent, &int(-7), &int(3)).unwrap(), int(2));
        assert_eq!(binary(TokenKind::Percent, &int(7), &int(-3)).unwrap(), int(-2));
        assert_eq!(binary(TokenKind::Percent, &int(7), &int(3)).unwrap(), int(1));
    }

    #[test]
    fn overflow_falls_back_to_float() {
        let v = binary(TokenKind::Star, &int(i64::MAX), &int(2)).unwrap();
        assert!(matches!(v, Value::Float(_)));
        assert_eq!(binary(TokenKind::Caret, &int(2), &int(10)).unwrap(), int(1024));
        assert_eq!(binary(TokenKind::StarStar, &int(2), &int(-1)).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn plus_concatenates_strings_with_display_form() {
        let v = binary(TokenKind::Plus, &Value::from("n="), &Value::Float(2.0)).unwrap();
        assert_eq!(v, Value::from("n=2.0"));
        let v = binary(TokenKind::Plus, &int(1), &Value::from("x")).unwrap();
        assert_eq!(v, Value::from("1x"));
    }

    #[test]
    fn array_plus_copies_left_operand() {
        let left = Value::array(vec![int(1)]);
        let out = binary(TokenKind::Plus, &left, &int(2)).unwrap();
        assert_eq!(out.to_string(), "@(1, 2)");
        assert_eq!(left.to_string(), "@(1)");
    }

    #[test]
    fn strings_do_not_subtract() {
        let err = binary(TokenKind::Minus, &Value::from("a"), &int(1)).unwrap_err();
        assert_eq!(err.message, "Unsupported operand types for -: string and int");
    }

    #[test]
    fn wildcards() {
        assert!(wildcard_match("*.pow", "Main.POW"));
        assert!(wildcard_match("h?llo*", "hello world"));
        assert!(!wildcard_match("h?llo", "hllo"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn membership_and_replace() {
        let arr = Value::array(vec![int(1), int(2)]);
        assert_eq!(binary(TokenKind::Contains, &arr, &Value::Float(2.0)).unwrap(), Value::Bool(true));
        assert_eq!(binary(TokenKind::InOp, &int(3), &arr).unwrap(), Value::Bool(false));
        let pair = Value::array(vec![Value::from("WORLD"), Value::from("there")]);
        let v = binary(TokenKind::Replace, &Value::from("hello world"), &pair).unwrap();
        assert_eq!(v, Value::from("hello there"));
    }

    #[test]
    fn casts_convert_primitives() {
        let ty = |name: &str| TypeAnnotation { name: name.into(), is_array: false };
        assert_eq!(cast(&ty("int"), Value::from(" 42 ")).unwrap(), int(42));
        assert_eq!(cast(&ty("int"), Value::Float(3.9)).unwrap(), int(3));
        assert_eq!(cast(&ty("string"), int(5)).unwrap(), Value::from("5"));
        assert_eq!(cast(&ty("bool"), Value::from("")).unwrap(), Value::Bool(false));
        assert_eq!(cast(&ty("double"), int(2)).unwrap(), Value::Float(2.0));
        assert!(cast(&ty("int"), Value::from("abc")).is_err());
        assert_eq!(cast(&ty("array"), int(1)).unwrap().to_string(), "@(1)");
    }

    #[test]
    fn bit_operations_require_integers() {
        assert_eq!(binary(TokenKind::BAnd, &int(6), &int(3)).unwrap(), int(2));
        assert_eq!(binary(TokenKind::ShiftLeft, &int(1), &int(4)).unwrap(), int(16));
        assert_eq!(unary(TokenKind::Tilde, &int(0)).unwrap(), int(-1));
        assert!(binary(TokenKind::BOr, &Value::Float(1.5), &int(1)).is_err());
    }
}
