//! Runtime values and the operators over them

use super::ast::{BinOp, FuncDecl, NodeDecl};
use super::builtins::Builtin;
use super::error::{ErrorKind, ScriptError, ScriptResult};
use super::graph::NodeId;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

pub type ListRef = Rc<RefCell<Vec<Value>>>;

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(ListRef),
    Func(Rc<FuncDecl>),
    Builtin(Builtin),
    NodeType(Rc<NodeDecl>),
    Node(NodeId),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    /// Name used in error messages; nodes report their archetype separately
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Func(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::NodeType(_) => "type",
            Value::Node(_) => "node",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Func(_) | Value::Builtin(_) | Value::NodeType(_) | Value::Node(_) => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    fn as_num(&self) -> Option<Num> {
        match self {
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Bool(b) => Some(Num::Int(*b as i64)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn to_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn overflow() -> ScriptError {
    ScriptError::new(ErrorKind::OverflowError, "integer overflow")
}

fn unsupported(op: BinOp, a: &Value, b: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

/// Structural equality with numeric coercion
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_num(), b.as_num()) {
        return match (x, y) {
            (Num::Int(x), Num::Int(y)) => x == y,
            (x, y) => x.to_f64() == y.to_f64(),
        };
    }
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Node(x), Value::Node(y)) => x == y,
        (Value::Func(x), Value::Func(y)) => Rc::ptr_eq(x, y),
        (Value::NodeType(x), Value::NodeType(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        _ => false,
    }
}

/// Ordering for `<`, `min`, `max`
pub fn compare(op: BinOp, a: &Value, b: &Value) -> ScriptResult<Ordering> {
    if let (Some(x), Some(y)) = (a.as_num(), b.as_num()) {
        return Ok(match (x, y) {
            (Num::Int(x), Num::Int(y)) => x.cmp(&y),
            (x, y) => x
                .to_f64()
                .partial_cmp(&y.to_f64())
                .unwrap_or(Ordering::Equal),
        });
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => Err(ScriptError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// Largest string (in bytes) or list a single operation may build
pub const MAX_SEQUENCE_LEN: usize = 1 << 26;

/// Refuse to build a sequence longer than [`MAX_SEQUENCE_LEN`]
pub fn check_sequence_len(len: usize) -> ScriptResult<()> {
    if len > MAX_SEQUENCE_LEN {
        return Err(ScriptError::new(
            ErrorKind::MemoryError,
            format!("cannot allocate a sequence of {} items", len),
        ));
    }
    Ok(())
}

/// Repetition count for `seq * n` over a sequence of `len` items
fn repeat(len: usize, count: i64) -> ScriptResult<usize> {
    if len == 0 || count <= 0 {
        return Ok(0);
    }
    let total = usize::try_from(count)
        .ok()
        .and_then(|count| len.checked_mul(count))
        .ok_or_else(|| ScriptError::new(ErrorKind::OverflowError, "repeated sequence is too long"))?;
    check_sequence_len(total)?;
    Ok(total / len)
}

fn contains(needle: &Value, haystack: &Value) -> ScriptResult<bool> {
    match haystack {
        Value::List(items) => Ok(items.borrow().iter().any(|v| values_equal(v, needle))),
        Value::Str(s) => match needle {
            Value::Str(sub) => Ok(s.contains(sub.as_str())),
            other => Err(ScriptError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        other => Err(ScriptError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Apply a binary operator
pub fn binary(op: BinOp, a: Value, b: Value) -> ScriptResult<Value> {
    match op {
        BinOp::Eq => return Ok(Value::Bool(values_equal(&a, &b))),
        BinOp::Ne => return Ok(Value::Bool(!values_equal(&a, &b))),
        BinOp::Lt => return Ok(Value::Bool(compare(op, &a, &b)? == Ordering::Less)),
        BinOp::Le => return Ok(Value::Bool(compare(op, &a, &b)? != Ordering::Greater)),
        BinOp::Gt => return Ok(Value::Bool(compare(op, &a, &b)? == Ordering::Greater)),
        BinOp::Ge => return Ok(Value::Bool(compare(op, &a, &b)? != Ordering::Less)),
        BinOp::In => return Ok(Value::Bool(contains(&a, &b)?)),
        BinOp::NotIn => return Ok(Value::Bool(!contains(&a, &b)?)),
        _ => {}
    }

    // Sequence forms
    match (op, &a, &b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => return Ok(Value::Str(format!("{}{}", x, y))),
        (BinOp::Add, Value::Str(_), other) => {
            return Err(ScriptError::type_error(format!(
                "can only concatenate str (not \"{}\") to str",
                other.type_name()
            )))
        }
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            return Ok(Value::list(items));
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            let count = repeat(s.len(), n.as_int().unwrap_or(0))?;
            return Ok(Value::Str(s.repeat(count)));
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if n.as_int().is_some() =>
        {
            let items = items.borrow();
            let count = repeat(items.len(), n.as_int().unwrap_or(0))?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            return Ok(Value::list(out));
        }
        _ => {}
    }

    let (x, y) = match (a.as_num(), b.as_num()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(unsupported(op, &a, &b)),
    };

    match (x, y) {
        (Num::Int(x), Num::Int(y)) => int_binary(op, x, y),
        (x, y) => float_binary(op, x.to_f64(), y.to_f64()),
    }
}

fn int_binary(op: BinOp, x: i64, y: i64) -> ScriptResult<Value> {
    let zero_div = || ScriptError::new(ErrorKind::ZeroDivisionError, "integer division or modulo by zero");
    let value = match op {
        BinOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        BinOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        BinOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        BinOp::Div => {
            if y == 0 {
                return Err(ScriptError::new(ErrorKind::ZeroDivisionError, "division by zero"));
            }
            return Ok(Value::Float(x as f64 / y as f64));
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(zero_div());
            }
            let q = x.checked_div(y).ok_or_else(overflow)?;
            if x % y != 0 && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(zero_div());
            }
            let r = x.checked_rem(y).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (y < 0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if y < 0 {
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            let exp = u32::try_from(y).map_err(|_| overflow())?;
            x.checked_pow(exp).ok_or_else(overflow)?
        }
        _ => unreachable!("comparison operators handled by binary()"),
    };
    Ok(Value::Int(value))
}

fn float_binary(op: BinOp, x: f64, y: f64) -> ScriptResult<Value> {
    let value = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(ScriptError::new(
                    ErrorKind::ZeroDivisionError,
                    "float division by zero",
                ));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(ScriptError::new(
                    ErrorKind::ZeroDivisionError,
                    "float floor division by zero",
                ));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(ScriptError::new(ErrorKind::ZeroDivisionError, "float modulo"));
            }
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => x.powf(y),
        _ => unreachable!("comparison operators handled by binary()"),
    };
    Ok(Value::Float(value))
}

/// Python-style float rendering
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f.abs() >= 1e16 {
        let s = format!("{:e}", f);
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        }
    } else if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// Python-style string repr
pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Value {
        Value::Int(v)
    }

    #[test]
    fn test_arithmetic() {
        assert!(values_equal(&binary(BinOp::Add, int(40), int(2)).unwrap(), &int(42)));
        assert!(values_equal(&binary(BinOp::Div, int(7), int(2)).unwrap(), &Value::Float(3.5)));
        assert!(values_equal(&binary(BinOp::FloorDiv, int(-7), int(2)).unwrap(), &int(-4)));
        assert!(values_equal(&binary(BinOp::Mod, int(-7), int(3)).unwrap(), &int(2)));
        assert!(values_equal(&binary(BinOp::Pow, int(2), int(10)).unwrap(), &int(1024)));
    }

    #[test]
    fn test_errors() {
        let err = binary(BinOp::Div, int(1), int(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ZeroDivisionError);

        let err = binary(BinOp::Add, Value::str("a"), int(1)).unwrap_err();
        assert_eq!(err.message, "can only concatenate str (not \"int\") to str");

        let err = binary(BinOp::Add, int(i64::MAX), int(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OverflowError);
    }

    #[test]
    fn test_huge_repetition_raises() {
        let err = binary(BinOp::Mul, Value::str("ab"), int(1 << 62)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MemoryError);

        let err = binary(BinOp::Mul, Value::str("ab"), int(i64::MAX)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OverflowError);

        let err = binary(BinOp::Mul, int(100_000_000_000), Value::list(vec![int(1)])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MemoryError);

        // Nothing to repeat, nothing to allocate
        let empty = binary(BinOp::Mul, Value::list(Vec::new()), int(i64::MAX)).unwrap();
        assert!(values_equal(&empty, &Value::list(Vec::new())));
        let s = binary(BinOp::Mul, Value::str("ab"), int(-3)).unwrap();
        assert!(values_equal(&s, &Value::str("")));
    }

    #[test]
    fn test_sequences() {
        let s = binary(BinOp::Mul, Value::str("ab"), int(3)).unwrap();
        assert!(values_equal(&s, &Value::str("ababab")));

        let xs = binary(BinOp::Add, Value::list(vec![int(1)]), Value::list(vec![int(2)])).unwrap();
        assert!(values_equal(&xs, &Value::list(vec![int(1), int(2)])));

        let found = binary(BinOp::In, int(2), xs).unwrap();
        assert!(found.is_truthy());
    }

    #[test]
    fn test_comparison_type_error() {
        let err = binary(BinOp::Lt, Value::str("a"), int(1)).unwrap_err();
        assert_eq!(
            err.message,
            "'<' not supported between instances of 'str' and 'int'"
        );
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.5), "0.5");
        assert_eq!(format_float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_float(1e20), "1e+20");
    }

    #[test]
    fn test_quote_str() {
        assert_eq!(quote_str("Alice"), "'Alice'");
        assert_eq!(quote_str("it's"), "\"it's\"");
        assert_eq!(quote_str("a\nb"), "'a\\nb'");
    }
}
