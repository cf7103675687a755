//! Builtin functions and methods on builtin values

use super::error::{ErrorKind, ScriptError, ScriptResult};
use super::interp::Interpreter;
use super::io::InputFailure;
use super::ast::BinOp;
use super::value::{self, Value};
use jacblog_types::Stream;
use std::cmp::Ordering;

/// Largest sequence `range()` will materialize
const MAX_RANGE_LEN: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Input,
    Str,
    Int,
    Float,
    Bool,
    Len,
    Range,
    Abs,
    Min,
    Max,
    Sum,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "print" => Builtin::Print,
            "input" => Builtin::Input,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "float" => Builtin::Float,
            "bool" => Builtin::Bool,
            "len" => Builtin::Len,
            "range" => Builtin::Range,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "sum" => Builtin::Sum,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Input => "input",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::Len => "len",
            Builtin::Range => "range",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
        }
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> ScriptResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("exactly {}", min)
        } else if args.len() < min {
            format!("at least {}", min)
        } else {
            format!("at most {}", max)
        };
        return Err(ScriptError::type_error(format!(
            "{}() takes {} argument{} ({} given)",
            name,
            expected,
            if min == max && min == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

fn no_keywords(name: &str, keywords: &[(String, Value)]) -> ScriptResult<()> {
    if keywords.is_empty() {
        Ok(())
    } else {
        Err(ScriptError::type_error(format!(
            "{}() takes no keyword arguments",
            name
        )))
    }
}

fn expect_int(name: &str, value: &Value) -> ScriptResult<i64> {
    value.as_int().ok_or_else(|| {
        ScriptError::type_error(format!(
            "'{}' object cannot be interpreted as an integer in {}()",
            value.type_name(),
            name
        ))
    })
}

fn expect_str<'v>(name: &str, value: &'v Value) -> ScriptResult<&'v str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::type_error(format!(
            "{}() argument must be str, not {}",
            name,
            other.type_name()
        ))),
    }
}

impl Interpreter<'_> {
    pub(super) fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        let name = builtin.name();
        if builtin != Builtin::Print && builtin != Builtin::Sum {
            no_keywords(name, &keywords)?;
        }
        match builtin {
            Builtin::Print => self.print(args, keywords),
            Builtin::Input => {
                arity(name, &args, 0, 1)?;
                let prompt = match args.first() {
                    Some(v) => self.to_str(v),
                    None => String::new(),
                };
                self.input(&prompt)
            }
            Builtin::Str => {
                arity(name, &args, 0, 1)?;
                Ok(Value::Str(
                    args.first().map(|v| self.to_str(v)).unwrap_or_default(),
                ))
            }
            Builtin::Int => {
                arity(name, &args, 0, 1)?;
                match args.into_iter().next() {
                    None => Ok(Value::Int(0)),
                    Some(value) => to_int(value),
                }
            }
            Builtin::Float => {
                arity(name, &args, 0, 1)?;
                match args.into_iter().next() {
                    None => Ok(Value::Float(0.0)),
                    Some(value) => to_float(value),
                }
            }
            Builtin::Bool => {
                arity(name, &args, 0, 1)?;
                Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
            }
            Builtin::Len => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                    Value::List(items) => Ok(Value::Int(items.borrow().len() as i64)),
                    other => Err(ScriptError::type_error(format!(
                        "object of type '{}' has no len()",
                        self.type_name(other)
                    ))),
                }
            }
            Builtin::Range => {
                arity(name, &args, 1, 3)?;
                let ints = args
                    .iter()
                    .map(|v| expect_int(name, v))
                    .collect::<ScriptResult<Vec<_>>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => unreachable!("arity checked"),
                };
                range(start, stop, step)
            }
            Builtin::Abs => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(|| {
                        ScriptError::new(ErrorKind::OverflowError, "integer overflow")
                    }),
                    Value::Bool(b) => Ok(Value::Int(*b as i64)),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    other => Err(ScriptError::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        self.type_name(other)
                    ))),
                }
            }
            Builtin::Min | Builtin::Max => {
                let items = self.collection_arg(name, args)?;
                let mut iter = items.into_iter();
                let Some(mut best) = iter.next() else {
                    return Err(ScriptError::value_error(format!(
                        "{}() arg is an empty sequence",
                        name
                    )));
                };
                let wanted = if builtin == Builtin::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let op = if builtin == Builtin::Min { BinOp::Lt } else { BinOp::Gt };
                for item in iter {
                    if value::compare(op, &item, &best)? == wanted {
                        best = item;
                    }
                }
                Ok(best)
            }
            Builtin::Sum => {
                arity(name, &args, 1, 2)?;
                let mut args = args.into_iter();
                let items = self.iterable(name, args.next().unwrap_or(Value::None))?;
                let mut start = args.next().unwrap_or(Value::Int(0));
                for (key, value) in keywords {
                    if key != "start" {
                        return Err(ScriptError::type_error(format!(
                            "sum() got an unexpected keyword argument '{}'",
                            key
                        )));
                    }
                    start = value;
                }
                if matches!(start, Value::Str(_)) {
                    return Err(ScriptError::type_error(
                        "sum() can't sum strings [use ''.join(seq) instead]",
                    ));
                }
                items
                    .into_iter()
                    .try_fold(start, |acc, item| value::binary(BinOp::Add, acc, item))
            }
        }
    }

    fn print(&mut self, args: Vec<Value>, keywords: Vec<(String, Value)>) -> ScriptResult<Value> {
        let mut sep = " ".to_string();
        let mut end = "\n".to_string();
        for (key, value) in keywords {
            let slot = match key.as_str() {
                "sep" => &mut sep,
                "end" => &mut end,
                other => {
                    return Err(ScriptError::type_error(format!(
                        "'{}' is an invalid keyword argument for print()",
                        other
                    )))
                }
            };
            match value {
                Value::Str(s) => *slot = s,
                Value::None => {}
                other => {
                    return Err(ScriptError::type_error(format!(
                        "{} must be None or a string, not {}",
                        key,
                        other.type_name()
                    )))
                }
            }
        }
        let parts: Vec<String> = args.iter().map(|v| self.to_str(v)).collect();
        let mut text = parts.join(&sep);
        text.push_str(&end);
        self.write(Stream::Stdout, &text);
        Ok(Value::None)
    }

    /// Suspend on the host for one line; the exchange is echoed to stdout
    fn input(&mut self, prompt: &str) -> ScriptResult<Value> {
        match self.io.read_line(prompt) {
            Ok(mut response) => {
                if response.ends_with('\n') {
                    response.pop();
                    if response.ends_with('\r') {
                        response.pop();
                    }
                }
                self.write(Stream::Stdout, &format!("{}{}\n", prompt, response));
                Ok(Value::Str(response))
            }
            Err(InputFailure::Interrupted) => {
                Err(ScriptError::new(ErrorKind::KeyboardInterrupt, ""))
            }
            Err(InputFailure::TimedOut) => {
                Err(ScriptError::new(ErrorKind::EOFError, "input timed out"))
            }
            Err(InputFailure::Closed) => Err(ScriptError::new(
                ErrorKind::EOFError,
                "EOF when reading a line",
            )),
        }
    }

    fn iterable(&self, name: &str, value: Value) -> ScriptResult<Vec<Value>> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not iterable in {}()",
                self.type_name(&other),
                name
            ))),
        }
    }

    /// `min(xs)` or `min(a, b, ...)`
    fn collection_arg(&self, name: &str, args: Vec<Value>) -> ScriptResult<Vec<Value>> {
        match args.len() {
            0 => Err(ScriptError::type_error(format!(
                "{} expected at least 1 argument, got 0",
                name
            ))),
            1 => {
                let mut args = args;
                self.iterable(name, args.remove(0))
            }
            _ => Ok(args),
        }
    }

    pub(super) fn call_method(
        &mut self,
        receiver: Value,
        method: &str,
        args: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        no_keywords(method, &keywords)?;
        match &receiver {
            Value::List(items) => match method {
                "append" => {
                    arity(method, &args, 1, 1)?;
                    let mut args = args;
                    items.borrow_mut().push(args.remove(0));
                    Ok(Value::None)
                }
                "pop" => {
                    arity(method, &args, 0, 1)?;
                    let mut items = items.borrow_mut();
                    if items.is_empty() {
                        return Err(ScriptError::new(ErrorKind::IndexError, "pop from empty list"));
                    }
                    let len = items.len() as i64;
                    let raw = match args.first() {
                        Some(v) => expect_int(method, v)?,
                        None => -1,
                    };
                    let index = if raw < 0 { raw + len } else { raw };
                    if index < 0 || index >= len {
                        return Err(ScriptError::new(ErrorKind::IndexError, "pop index out of range"));
                    }
                    Ok(items.remove(index as usize))
                }
                _ => Err(self.no_attribute(&receiver, method)),
            },
            Value::Str(s) => {
                let s = s.as_str();
                match method {
                    "upper" => {
                        arity(method, &args, 0, 0)?;
                        Ok(Value::str(s.to_uppercase()))
                    }
                    "lower" => {
                        arity(method, &args, 0, 0)?;
                        Ok(Value::str(s.to_lowercase()))
                    }
                    "strip" => {
                        arity(method, &args, 0, 0)?;
                        Ok(Value::str(s.trim()))
                    }
                    "split" => {
                        arity(method, &args, 0, 1)?;
                        let parts: Vec<Value> = match args.first() {
                            None | Some(Value::None) => {
                                s.split_whitespace().map(Value::str).collect()
                            }
                            Some(sep) => {
                                let sep = expect_str(method, sep)?;
                                if sep.is_empty() {
                                    return Err(ScriptError::value_error("empty separator"));
                                }
                                s.split(sep).map(Value::str).collect()
                            }
                        };
                        Ok(Value::list(parts))
                    }
                    "join" => {
                        arity(method, &args, 1, 1)?;
                        let items = self.iterable(method, args[0].clone())?;
                        let mut parts = Vec::with_capacity(items.len());
                        for (i, item) in items.iter().enumerate() {
                            match item {
                                Value::Str(part) => parts.push(part.clone()),
                                other => {
                                    return Err(ScriptError::type_error(format!(
                                        "sequence item {}: expected str instance, {} found",
                                        i,
                                        other.type_name()
                                    )))
                                }
                            }
                        }
                        Ok(Value::Str(parts.join(s)))
                    }
                    "replace" => {
                        arity(method, &args, 2, 2)?;
                        let from = expect_str(method, &args[0])?;
                        let to = expect_str(method, &args[1])?;
                        Ok(Value::Str(s.replace(from, to)))
                    }
                    "startswith" | "endswith" => {
                        arity(method, &args, 1, 1)?;
                        let affix = expect_str(method, &args[0])?;
                        Ok(Value::Bool(if method == "startswith" {
                            s.starts_with(affix)
                        } else {
                            s.ends_with(affix)
                        }))
                    }
                    _ => Err(self.no_attribute(&receiver, method)),
                }
            }
            _ => Err(self.no_attribute(&receiver, method)),
        }
    }
}

fn to_int(value: Value) -> ScriptResult<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Bool(b) => Ok(Value::Int(b as i64)),
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(ScriptError::new(
                    ErrorKind::OverflowError,
                    "cannot convert float infinity or NaN to integer",
                ));
            }
            let truncated = f.trunc();
            if truncated.abs() >= 9.223_372_036_854_776e18 {
                return Err(ScriptError::new(ErrorKind::OverflowError, "integer overflow"));
            }
            Ok(Value::Int(truncated as i64))
        }
        Value::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| {
                ScriptError::value_error(format!(
                    "invalid literal for int() with base 10: {}",
                    value::quote_str(&s)
                ))
            }),
        other => Err(ScriptError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: Value) -> ScriptResult<Value> {
    match value {
        Value::Float(f) => Ok(Value::Float(f)),
        Value::Int(i) => Ok(Value::Float(i as f64)),
        Value::Bool(b) => Ok(Value::Float(b as i64 as f64)),
        Value::Str(s) => {
            let trimmed = s.trim().to_ascii_lowercase();
            let parsed = match trimmed.as_str() {
                "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                "nan" => Some(f64::NAN),
                other => other.parse::<f64>().ok(),
            };
            parsed.map(Value::Float).ok_or_else(|| {
                ScriptError::value_error(format!(
                    "could not convert string to float: {}",
                    value::quote_str(&s)
                ))
            })
        }
        other => Err(ScriptError::type_error(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn range(start: i64, stop: i64, step: i64) -> ScriptResult<Value> {
    if step == 0 {
        return Err(ScriptError::value_error("range() arg 3 must not be zero"));
    }
    let span = if step > 0 {
        (stop as i128 - start as i128 + step as i128 - 1) / step as i128
    } else {
        (start as i128 - stop as i128 - step as i128 - 1) / (-(step as i128))
    };
    let len = span.max(0);
    if len > MAX_RANGE_LEN as i128 {
        return Err(ScriptError::new(
            ErrorKind::OverflowError,
            "range() result has too many items",
        ));
    }
    let items = (0..len as i64).map(|i| Value::Int(start + i * step)).collect();
    Ok(Value::list(items))
}
