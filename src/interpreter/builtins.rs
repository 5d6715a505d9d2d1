//! Built-in rites: pure functions over values, plus the thin I/O rites that
//! delegate to the host adapter.
//!
//! Built-ins run synchronously at the evaluator's level (no suspension).
//! Errors raised here carry no position; the evaluator attaches the call
//! site's span. Type mismatches name the offending type tag.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{AthError, ErrorKind, Result};
use crate::runtime::host::Host;

use super::value::Value;

/// Implementation of a built-in rite.
pub type BuiltinFn = fn(&dyn Host, Vec<Value>) -> Result<Value>;

/// A named built-in rite.
pub struct BuiltinRite {
    /// The rite's language-level name.
    pub name: &'static str,
    func: BuiltinFn,
}

impl BuiltinRite {
    /// Invoke the built-in.
    pub fn call(&self, host: &dyn Host, args: Vec<Value>) -> Result<Value> {
        (self.func)(host, args)
    }
}

impl std::fmt::Debug for BuiltinRite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BuiltinRite({})", self.name)
    }
}

/// Look up a built-in rite by name.
pub fn lookup(name: &str) -> Option<&'static BuiltinRite> {
    REGISTRY.get(name)
}

macro_rules! registry {
    ($($name:literal => $func:ident),* $(,)?) => {
        Lazy::new(|| {
            let mut map = HashMap::new();
            $(map.insert($name, BuiltinRite { name: $name, func: $func });)*
            map
        })
    };
}

static REGISTRY: Lazy<HashMap<&'static str, BuiltinRite>> = registry! {
    // I/O
    "UTTER" => utter,
    "HEED" => heed,
    "SCRY" => scry,
    "INSCRIBE" => inscribe,
    // Type operations
    "TYPEOF" => typeof_,
    "LENGTH" => length,
    "PARSE_INT" => parse_int,
    "PARSE_FLOAT" => parse_float,
    "STRING" => string,
    "INT" => int,
    "FLOAT" => float,
    "CHAR" => char_,
    "CODE" => code,
    "BIN" => bin,
    "HEX" => hex,
    // Array operations
    "APPEND" => append,
    "PREPEND" => prepend,
    "SLICE" => slice,
    "FIRST" => first,
    "LAST" => last,
    "CONCAT" => concat,
    // Map operations
    "KEYS" => keys,
    "VALUES" => values,
    "HAS" => has,
    "SET" => set,
    "DELETE" => delete,
    // String operations
    "SPLIT" => split,
    "JOIN" => join,
    "SUBSTRING" => substring,
    "UPPERCASE" => uppercase,
    "LOWERCASE" => lowercase,
    "TRIM" => trim,
    "REPLACE" => replace,
    // Utility
    "RANDOM" => random,
    "RANDOM_INT" => random_int,
    "TIME" => time,
};

fn type_err(message: String) -> AthError {
    AthError::unpositioned(ErrorKind::Type, message)
}

fn constraint_err(message: String) -> AthError {
    AthError::unpositioned(ErrorKind::Constraint, message)
}

fn expect_arity(name: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(constraint_err(format!(
            "{} expects {} arguments, got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

/// Slice bounds for `SLICE` and `SUBSTRING`: negative indices count from
/// the end, both ends clamp to the length, and an inverted range is empty.
fn slice_bounds(len: usize, start: i64, end: i64) -> (usize, usize) {
    let len = len as i64;
    let resolve = |i: i64| if i < 0 { (len + i).clamp(0, len) } else { i.clamp(0, len) };
    let start = resolve(start);
    let end = resolve(end);
    if start >= end {
        (start as usize, start as usize)
    } else {
        (start as usize, end as usize)
    }
}

// ============ I/O ============

fn utter(host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    let line: Vec<String> = args.iter().map(Value::stringify).collect();
    host.output(&line.join(" "));
    Ok(Value::Void)
}

fn heed(host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("HEED", &args, 0)?;
    Ok(Value::Str(host.read_line().unwrap_or_default()))
}

fn scry(host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("SCRY", &args, 1)?;
    let content = match &args[0] {
        Value::Void => host.scry(None),
        Value::Str(path) => host.scry(Some(path)),
        other => {
            return Err(type_err(format!(
                "SCRY expects string path or VOID, got {}",
                other.type_name()
            )));
        }
    };
    content.map(Value::Str).map_err(|err| err.into_ath())
}

fn inscribe(host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("INSCRIBE", &args, 2)?;
    let Value::Str(path) = &args[0] else {
        return Err(type_err(format!(
            "INSCRIBE expects string path, got {}",
            args[0].type_name()
        )));
    };
    let content = match &args[1] {
        Value::Str(text) => text.clone(),
        other => other.stringify(),
    };
    host.inscribe(path, &content)
        .map_err(|err| err.into_ath())?;
    Ok(Value::Void)
}

// ============ Type operations ============

fn typeof_(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("TYPEOF", &args, 1)?;
    Ok(Value::str(args[0].type_name()))
}

fn length(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("LENGTH", &args, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::Integer(s.chars().count() as i64)),
        Value::Array(items) => Ok(Value::Integer(items.borrow().len() as i64)),
        other => Err(type_err(format!(
            "LENGTH expects string or array, got {}",
            other.type_name()
        ))),
    }
}

fn parse_int(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("PARSE_INT", &args, 1)?;
    let Value::Str(text) = &args[0] else {
        return Err(type_err(format!(
            "PARSE_INT expects string, got {}",
            args[0].type_name()
        )));
    };
    if text.contains('.') {
        return Err(constraint_err(format!("Cannot parse '{}' as integer", text)));
    }
    text.parse::<i64>()
        .map(Value::Integer)
        .map_err(|_| constraint_err(format!("Cannot parse '{}' as integer", text)))
}

fn parse_float(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("PARSE_FLOAT", &args, 1)?;
    let Value::Str(text) = &args[0] else {
        return Err(type_err(format!(
            "PARSE_FLOAT expects string, got {}",
            args[0].type_name()
        )));
    };
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| constraint_err(format!("Cannot parse '{}' as float", text)))
}

fn string(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("STRING", &args, 1)?;
    Ok(Value::Str(args[0].stringify()))
}

fn int(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("INT", &args, 1)?;
    match &args[0] {
        Value::Integer(n) => Ok(Value::Integer(*n)),
        Value::Float(x) => Ok(Value::Integer(x.trunc() as i64)),
        other => Err(type_err(format!("INT expects number, got {}", other.type_name()))),
    }
}

fn float(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("FLOAT", &args, 1)?;
    match &args[0] {
        Value::Integer(n) => Ok(Value::Float(*n as f64)),
        Value::Float(x) => Ok(Value::Float(*x)),
        other => Err(type_err(format!(
            "FLOAT expects number, got {}",
            other.type_name()
        ))),
    }
}

fn char_(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("CHAR", &args, 1)?;
    let Value::Integer(n) = &args[0] else {
        return Err(type_err(format!(
            "CHAR expects integer, got {}",
            args[0].type_name()
        )));
    };
    u32::try_from(*n)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::Str(c.to_string()))
        .ok_or_else(|| constraint_err(format!("Invalid code point: {}", n)))
}

fn code(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("CODE", &args, 1)?;
    let Value::Str(text) = &args[0] else {
        return Err(type_err(format!(
            "CODE expects string, got {}",
            args[0].type_name()
        )));
    };
    text.chars()
        .next()
        .map(|c| Value::Integer(c as i64))
        .ok_or_else(|| constraint_err("CODE called on empty string".to_string()))
}

fn bin(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("BIN", &args, 1)?;
    let Value::Integer(n) = &args[0] else {
        return Err(type_err(format!(
            "BIN expects integer, got {}",
            args[0].type_name()
        )));
    };
    Ok(Value::Str(if *n < 0 {
        format!("-{:b}", n.unsigned_abs())
    } else {
        format!("{:b}", n)
    }))
}

fn hex(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("HEX", &args, 1)?;
    let Value::Integer(n) = &args[0] else {
        return Err(type_err(format!(
            "HEX expects integer, got {}",
            args[0].type_name()
        )));
    };
    Ok(Value::Str(if *n < 0 {
        format!("-{:X}", n.unsigned_abs())
    } else {
        format!("{:X}", n)
    }))
}

// ============ Array operations ============

fn as_array(name: &str, value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        other => Err(type_err(format!(
            "{} expects array, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn append(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("APPEND", &args, 2)?;
    let mut items = as_array("APPEND", &args[0])?;
    items.push(args[1].clone());
    Ok(Value::array(items))
}

fn prepend(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("PREPEND", &args, 2)?;
    let items = as_array("PREPEND", &args[0])?;
    let mut result = vec![args[1].clone()];
    result.extend(items);
    Ok(Value::array(result))
}

fn slice(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("SLICE", &args, 3)?;
    let items = as_array("SLICE", &args[0])?;
    let (Value::Integer(start), Value::Integer(end)) = (&args[1], &args[2]) else {
        return Err(type_err("SLICE expects integer indices".to_string()));
    };
    let (start, end) = slice_bounds(items.len(), *start, *end);
    Ok(Value::array(items[start..end].to_vec()))
}

fn first(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("FIRST", &args, 1)?;
    let items = as_array("FIRST", &args[0])?;
    items
        .first()
        .cloned()
        .ok_or_else(|| constraint_err("FIRST called on empty array".to_string()))
}

fn last(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("LAST", &args, 1)?;
    let items = as_array("LAST", &args[0])?;
    items
        .last()
        .cloned()
        .ok_or_else(|| constraint_err("LAST called on empty array".to_string()))
}

fn concat(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("CONCAT", &args, 2)?;
    let (Value::Array(_), Value::Array(_)) = (&args[0], &args[1]) else {
        return Err(type_err("CONCAT expects two arrays".to_string()));
    };
    let mut items = as_array("CONCAT", &args[0])?;
    items.extend(as_array("CONCAT", &args[1])?);
    Ok(Value::array(items))
}

// ============ Map operations ============

fn as_map(name: &str, value: &Value) -> Result<IndexMap<String, Value>> {
    match value {
        Value::Map(entries) => Ok(entries.borrow().clone()),
        other => Err(type_err(format!(
            "{} expects map, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn string_key(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::Str(key) => Ok(key.clone()),
        other => Err(type_err(format!(
            "{} expects string key, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn keys(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("KEYS", &args, 1)?;
    let entries = as_map("KEYS", &args[0])?;
    Ok(Value::array(entries.keys().map(Value::str).collect()))
}

fn values(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("VALUES", &args, 1)?;
    let entries = as_map("VALUES", &args[0])?;
    Ok(Value::array(entries.values().cloned().collect()))
}

fn has(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("HAS", &args, 2)?;
    let entries = as_map("HAS", &args[0])?;
    let key = string_key("HAS", &args[1])?;
    Ok(Value::Boolean(entries.contains_key(&key)))
}

fn set(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("SET", &args, 3)?;
    let mut entries = as_map("SET", &args[0])?;
    let key = string_key("SET", &args[1])?;
    entries.insert(key, args[2].clone());
    Ok(Value::map(entries))
}

fn delete(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("DELETE", &args, 2)?;
    let mut entries = as_map("DELETE", &args[0])?;
    let key = string_key("DELETE", &args[1])?;
    entries.shift_remove(&key);
    Ok(Value::map(entries))
}

// ============ String operations ============

fn split(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("SPLIT", &args, 2)?;
    let (Value::Str(text), Value::Str(delimiter)) = (&args[0], &args[1]) else {
        return Err(type_err("SPLIT expects two strings".to_string()));
    };
    let parts: Vec<Value> = if delimiter.is_empty() {
        text.chars().map(|c| Value::Str(c.to_string())).collect()
    } else {
        text.split(delimiter.as_str()).map(Value::str).collect()
    };
    Ok(Value::array(parts))
}

fn join(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("JOIN", &args, 2)?;
    let items = as_array("JOIN", &args[0])?;
    let Value::Str(delimiter) = &args[1] else {
        return Err(type_err(format!(
            "JOIN expects string delimiter, got {}",
            args[1].type_name()
        )));
    };
    let parts: Vec<String> = items.iter().map(Value::stringify).collect();
    Ok(Value::Str(parts.join(delimiter)))
}

fn substring(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("SUBSTRING", &args, 3)?;
    let Value::Str(text) = &args[0] else {
        return Err(type_err(format!(
            "SUBSTRING expects string, got {}",
            args[0].type_name()
        )));
    };
    let (Value::Integer(start), Value::Integer(end)) = (&args[1], &args[2]) else {
        return Err(type_err("SUBSTRING expects integer indices".to_string()));
    };
    let chars: Vec<char> = text.chars().collect();
    let (start, end) = slice_bounds(chars.len(), *start, *end);
    Ok(Value::Str(chars[start..end].iter().collect()))
}

fn uppercase(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("UPPERCASE", &args, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::Str(s.to_uppercase())),
        other => Err(type_err(format!(
            "UPPERCASE expects string, got {}",
            other.type_name()
        ))),
    }
}

fn lowercase(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("LOWERCASE", &args, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::Str(s.to_lowercase())),
        other => Err(type_err(format!(
            "LOWERCASE expects string, got {}",
            other.type_name()
        ))),
    }
}

fn trim(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("TRIM", &args, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::str(s.trim())),
        other => Err(type_err(format!(
            "TRIM expects string, got {}",
            other.type_name()
        ))),
    }
}

fn replace(_host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("REPLACE", &args, 3)?;
    let (Value::Str(text), Value::Str(old), Value::Str(new)) = (&args[0], &args[1], &args[2])
    else {
        return Err(type_err("REPLACE expects three strings".to_string()));
    };
    Ok(Value::Str(text.replace(old.as_str(), new)))
}

// ============ Utility ============

fn random(host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("RANDOM", &args, 0)?;
    Ok(Value::Float(host.random()))
}

fn random_int(host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("RANDOM_INT", &args, 2)?;
    let (Value::Integer(min), Value::Integer(max)) = (&args[0], &args[1]) else {
        return Err(type_err("RANDOM_INT expects two integers".to_string()));
    };
    if min > max {
        return Err(constraint_err(format!(
            "RANDOM_INT expects min <= max, got {} and {}",
            min, max
        )));
    }
    let width = (*max as i128 - *min as i128 + 1) as f64;
    let offset = (host.random() * width) as i128;
    let value = (*min as i128 + offset).clamp(*min as i128, *max as i128);
    Ok(Value::Integer(value as i64))
}

fn time(host: &dyn Host, args: Vec<Value>) -> Result<Value> {
    expect_arity("TIME", &args, 0)?;
    Ok(Value::Integer(host.now_ms()))
}
