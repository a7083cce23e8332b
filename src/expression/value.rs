//! Value semantics for expression evaluation
//!
//! Values are plain `serde_json::Value`s. Arithmetic, comparison, truthiness and
//! stringification follow the conventions flow authors write against: integers stay
//! integers, `/` always yields a float, `//` and `%` floor toward negative infinity,
//! and booleans count as integers in numeric contexts.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::eval::{EvalError, EvalResult};

/* ===================== Numbers ===================== */

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

/// Numeric view of a value; booleans count as 0 and 1
pub fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(*b as i64)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Num::Int(i)),
            None => n.as_f64().map(Num::Float),
        },
        _ => None,
    }
}

/// Wrap a float, rejecting values JSON cannot hold
pub fn float_value(f: f64) -> EvalResult<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or(EvalError::NonFiniteFloat)
}

fn num_value(n: Num) -> EvalResult<Value> {
    match n {
        Num::Int(i) => Ok(Value::from(i)),
        Num::Float(f) => float_value(f),
    }
}

/* ===================== Type Names & Truthiness ===================== */

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_i64() {
            Some(i) => i != 0,
            None => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        },
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/* ===================== Stringification ===================== */

/// Render a value the way `str()` would
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => repr(other),
    }
}

/// Render a value the way `repr()` would
pub fn repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => match n.as_u64() {
                Some(u) => u.to_string(),
                None => format_float(n.as_f64().unwrap_or(f64::NAN)),
            },
        },
        Value::String(s) => repr_str(s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(repr).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", repr_str(k), repr(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}

fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Shortest round-trip float text with a mandatory fractional part or exponent
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        // 1e16 -> 1e+16, 1.5e-05
        let text = format!("{:e}", f);
        return match text.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                format!("{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => text,
        };
    }

    let text = f.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

/* ===================== Equality & Ordering ===================== */

/// Equality with numeric promotion (`1 == 1.0`, `True == 1`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => match (as_num(a), as_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => a == b,
        },
    }
}

pub fn compare(a: &Value, b: &Value, op: &'static str) -> EvalResult<Ordering> {
    let unsupported = || EvalError::UnsupportedOperands {
        op,
        left: type_name(a),
        right: type_name(b),
    };

    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                if !values_equal(l, r) {
                    return compare(l, r, op);
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => match (as_num(a), as_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(x.cmp(&y)),
            (Some(x), Some(y)) => x.as_f64().partial_cmp(&y.as_f64()).ok_or_else(unsupported),
            _ => Err(unsupported()),
        },
    }
}

/// Identity: `None`/booleans are singletons, equal scalars of one type are
/// the same object, containers never are
pub fn is_identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
            type_name(a) == type_name(b) && a == b
        }
        _ => false,
    }
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    match container {
        Value::String(haystack) => match item {
            Value::String(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(EvalError::TypeError(format!(
                "'in <string>' requires string as left operand, not {}",
                type_name(other)
            ))),
        },
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Object(map) => Ok(match item {
            Value::String(key) => map.contains_key(key),
            _ => false,
        }),
        other => Err(EvalError::NotIterable(type_name(other))),
    }
}

/* ===================== Arithmetic ===================== */

fn unsupported(op: &'static str, a: &Value, b: &Value) -> EvalError {
    EvalError::UnsupportedOperands {
        op,
        left: type_name(a),
        right: type_name(b),
    }
}

pub fn add(a: &Value, b: &Value) -> EvalResult<Value> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(Value::String(format!("{}{}", x, y))),
        (Value::Array(x), Value::Array(y)) => {
            Ok(Value::Array(x.iter().chain(y.iter()).cloned().collect()))
        }
        _ => match (as_num(a), as_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x
                .checked_add(y)
                .map(Value::from)
                .ok_or(EvalError::Overflow),
            (Some(x), Some(y)) => float_value(x.as_f64() + y.as_f64()),
            _ => Err(unsupported("+", a, b)),
        },
    }
}

pub fn sub(a: &Value, b: &Value) -> EvalResult<Value> {
    match (as_num(a), as_num(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => x
            .checked_sub(y)
            .map(Value::from)
            .ok_or(EvalError::Overflow),
        (Some(x), Some(y)) => float_value(x.as_f64() - y.as_f64()),
        _ => Err(unsupported("-", a, b)),
    }
}

pub fn mul(a: &Value, b: &Value) -> EvalResult<Value> {
    match (a, b) {
        (Value::String(s), Value::Number(_) | Value::Bool(_))
        | (Value::Number(_) | Value::Bool(_), Value::String(s)) => {
            let times = repeat_count(if a.is_string() { b } else { a }, a, b)?;
            if s.is_empty() || times == 0 {
                return Ok(Value::String(String::new()));
            }
            repeat_len(s.len(), times)?;
            Ok(Value::String(s.repeat(times)))
        }
        (Value::Array(items), Value::Number(_) | Value::Bool(_))
        | (Value::Number(_) | Value::Bool(_), Value::Array(items)) => {
            let times = repeat_count(if a.is_array() { b } else { a }, a, b)?;
            if items.is_empty() || times == 0 {
                return Ok(Value::Array(Vec::new()));
            }
            let mut out = Vec::with_capacity(repeat_len(items.len(), times)?);
            for _ in 0..times {
                out.extend(items.iter().cloned());
            }
            Ok(Value::Array(out))
        }
        _ => match (as_num(a), as_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x
                .checked_mul(y)
                .map(Value::from)
                .ok_or(EvalError::Overflow),
            (Some(x), Some(y)) => float_value(x.as_f64() * y.as_f64()),
            _ => Err(unsupported("*", a, b)),
        },
    }
}

/// Largest string (in bytes) or list a repetition may produce
pub const MAX_REPEAT_LEN: usize = 1 << 24;

fn repeat_count(count: &Value, a: &Value, b: &Value) -> EvalResult<usize> {
    match as_num(count) {
        Some(Num::Int(n)) => Ok(usize::try_from(n.max(0)).unwrap_or(usize::MAX)),
        _ => Err(unsupported("*", a, b)),
    }
}

fn repeat_len(len: usize, times: usize) -> EvalResult<usize> {
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(total),
        _ => Err(EvalError::Overflow),
    }
}

pub fn div(a: &Value, b: &Value) -> EvalResult<Value> {
    match (as_num(a), as_num(b)) {
        (Some(x), Some(y)) => {
            if y.as_f64() == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            float_value(x.as_f64() / y.as_f64())
        }
        _ => Err(unsupported("/", a, b)),
    }
}

pub fn floor_div(a: &Value, b: &Value) -> EvalResult<Value> {
    match (as_num(a), as_num(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => {
            if y == 0 {
                return Err(EvalError::ZeroDivision);
            }
            let q = x.checked_div(y).ok_or(EvalError::Overflow)?;
            let floored = if x % y != 0 && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            };
            Ok(Value::from(floored))
        }
        (Some(x), Some(y)) => {
            if y.as_f64() == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            float_value((x.as_f64() / y.as_f64()).floor())
        }
        _ => Err(unsupported("//", a, b)),
    }
}

pub fn modulo(a: &Value, b: &Value) -> EvalResult<Value> {
    match (as_num(a), as_num(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => {
            if y == 0 {
                return Err(EvalError::ZeroDivision);
            }
            let r = x.checked_rem(y).ok_or(EvalError::Overflow)?;
            let r = if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r };
            Ok(Value::from(r))
        }
        (Some(x), Some(y)) => {
            let (x, y) = (x.as_f64(), y.as_f64());
            if y == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            let r = x % y;
            let r = if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                r + y
            } else {
                r
            };
            float_value(r)
        }
        _ => Err(unsupported("%", a, b)),
    }
}

pub fn negate(value: &Value) -> EvalResult<Value> {
    match as_num(value) {
        Some(Num::Int(i)) => i.checked_neg().map(Value::from).ok_or(EvalError::Overflow),
        Some(Num::Float(f)) => num_value(Num::Float(-f)),
        None => Err(EvalError::BadOperand {
            op: "unary -",
            operand: type_name(value),
        }),
    }
}

/* ===================== Item Access ===================== */

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { index + len } else { index };
    (0..len).contains(&idx).then_some(idx as usize)
}

/// `container[index]`, borrowing from the container where possible
pub fn get_item<'v>(container: &'v Value, index: &Value) -> EvalResult<Cow<'v, Value>> {
    match container {
        Value::Object(map) => {
            let key = match index {
                Value::String(s) => Cow::Borrowed(s.as_str()),
                // JSON keys are strings; integers and booleans map onto their text
                other if as_num(other).is_some() => Cow::Owned(repr(other)),
                other => return Err(EvalError::KeyNotFound(repr(other))),
            };
            map.get(&*key)
                .map(Cow::Borrowed)
                .ok_or_else(|| EvalError::KeyNotFound(repr_str(&key)))
        }
        Value::Array(items) => {
            let i = match as_num(index) {
                Some(Num::Int(i)) => i,
                _ => return Err(EvalError::InvalidIndex("list", type_name(index))),
            };
            normalize_index(i, items.len())
                .map(|idx| Cow::Borrowed(&items[idx]))
                .ok_or(EvalError::IndexOutOfRange(i))
        }
        Value::String(s) => {
            let i = match as_num(index) {
                Some(Num::Int(i)) => i,
                _ => return Err(EvalError::InvalidIndex("string", type_name(index))),
            };
            let chars: Vec<char> = s.chars().collect();
            normalize_index(i, chars.len())
                .map(|idx| Cow::Owned(Value::String(chars[idx].to_string())))
                .ok_or(EvalError::IndexOutOfRange(i))
        }
        other => Err(EvalError::NotSubscriptable(type_name(other))),
    }
}

fn slice_bound(bound: Option<&Value>) -> EvalResult<Option<i64>> {
    match bound {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match as_num(v) {
            Some(Num::Int(i)) => Ok(Some(i)),
            _ => Err(EvalError::TypeError(
                "slice indices must be integers or None".to_string(),
            )),
        },
    }
}

fn clamp_range(lower: Option<i64>, upper: Option<i64>, len: usize) -> (usize, usize) {
    let len = len as i64;
    let clamp = |v: i64| {
        let v = if v < 0 { v + len } else { v };
        v.clamp(0, len)
    };
    let start = lower.map(clamp).unwrap_or(0);
    let end = upper.map(clamp).unwrap_or(len);
    (start as usize, end.max(start) as usize)
}

/// `container[lower:upper]`
pub fn get_slice(
    container: &Value,
    lower: Option<&Value>,
    upper: Option<&Value>,
) -> EvalResult<Value> {
    let lower = slice_bound(lower)?;
    let upper = slice_bound(upper)?;

    match container {
        Value::Array(items) => {
            let (start, end) = clamp_range(lower, upper, items.len());
            Ok(Value::Array(items[start..end].to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = clamp_range(lower, upper, chars.len());
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        other => Err(EvalError::NotSubscriptable(type_name(other))),
    }
}

