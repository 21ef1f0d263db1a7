//=============================================
// src/builtins/mod.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript builtin dispatch registry
// Objective: Static namespace -> handler table built once at startup; the
//            evaluator resolves two-part dotted calls through it
//=============================================

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::arrays::ArrayHandle;
use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::Interpreter;
use crate::maps::MapHandle;
use crate::records::RecordHandle;
use crate::value::Value;

mod array_ops;
mod date_ops;
mod json_ops;
mod map_ops;
mod math_ops;
mod random_ops;
mod record_ops;
mod screen_ops;
mod string_ops;
mod system_ops;
mod thread_ops;

/// One namespace handler: receives the function part of the dotted name and
/// dispatches it, failing with UnknownBuiltin for names it does not carry.
pub type NamespaceHandler =
    fn(&mut Interpreter, &str, usize, &[Value]) -> ScriptResult<Value>;

static REGISTRY: Lazy<HashMap<&'static str, NamespaceHandler>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, NamespaceHandler> = HashMap::new();
    map.insert("string", string_ops::dispatch);
    map.insert("array", array_ops::dispatch);
    map.insert("map", map_ops::dispatch);
    map.insert("record", record_ops::dispatch);
    map.insert("json", json_ops::dispatch);
    map.insert("date", date_ops::dispatch);
    map.insert("math", math_ops::dispatch);
    map.insert("random", random_ops::dispatch);
    map.insert("system", system_ops::dispatch);
    map.insert("thread", thread_ops::dispatch);
    map.insert("screen", screen_ops::dispatch);
    map
});

pub fn namespace_registered(namespace: &str) -> bool {
    REGISTRY.contains_key(namespace)
}

pub fn dispatch(
    interp: &mut Interpreter,
    namespace: &str,
    function: &str,
    line: usize,
    args: &[Value],
) -> ScriptResult<Value> {
    let handler = REGISTRY
        .get(namespace)
        .ok_or_else(|| ScriptError::UnknownBuiltin {
            name: format!("{}.{}", namespace, function),
        })?;
    handler(interp, function, line, args)
}

//=============================================
//            Argument helpers
//=============================================

pub(crate) fn unknown(namespace: &str, function: &str) -> ScriptError {
    ScriptError::UnknownBuiltin {
        name: format!("{}.{}", namespace, function),
    }
}

pub(crate) fn arity(
    name: &str,
    args: &[Value],
    expected: usize,
    line: usize,
) -> ScriptResult<()> {
    if args.len() != expected {
        return Err(ScriptError::runtime(
            line,
            format!(
                "{} expects {} argument{}, got {}",
                name,
                expected,
                if expected == 1 { "" } else { "s" },
                args.len()
            ),
        ));
    }
    Ok(())
}

pub(crate) fn arity_range(
    name: &str,
    args: &[Value],
    min: usize,
    max: usize,
    line: usize,
) -> ScriptResult<()> {
    if args.len() < min || args.len() > max {
        return Err(ScriptError::runtime(
            line,
            format!(
                "{} expects {}..{} arguments, got {}",
                name,
                min,
                max,
                args.len()
            ),
        ));
    }
    Ok(())
}

pub(crate) fn expect_str<'a>(name: &str, value: &'a Value, line: usize) -> ScriptResult<&'a str> {
    value.as_str().ok_or_else(|| {
        ScriptError::runtime(
            line,
            format!("{} expects a string, got {}", name, value.type_name()),
        )
    })
}

pub(crate) fn expect_array(name: &str, value: &Value, line: usize) -> ScriptResult<ArrayHandle> {
    match value {
        Value::Array(handle) => Ok(handle.clone()),
        other => Err(ScriptError::runtime(
            line,
            format!("{} expects an array, got {}", name, other.type_name()),
        )),
    }
}

pub(crate) fn expect_map(name: &str, value: &Value, line: usize) -> ScriptResult<MapHandle> {
    match value {
        Value::Map(handle) => Ok(handle.clone()),
        other => Err(ScriptError::runtime(
            line,
            format!("{} expects a map, got {}", name, other.type_name()),
        )),
    }
}

pub(crate) fn expect_record(
    name: &str,
    value: &Value,
    line: usize,
) -> ScriptResult<RecordHandle> {
    match value {
        Value::Record(handle) => Ok(handle.clone()),
        other => Err(ScriptError::runtime(
            line,
            format!("{} expects a record, got {}", name, other.type_name()),
        )),
    }
}

pub(crate) fn expect_i64(name: &str, value: &Value, line: usize) -> ScriptResult<i64> {
    match value {
        Value::Int(n) => Ok(*n as i64),
        Value::Long(n) => Ok(*n),
        other => Err(ScriptError::runtime(
            line,
            format!("{} expects an integer, got {}", name, other.type_name()),
        )),
    }
}

pub(crate) fn expect_f64(name: &str, value: &Value, line: usize) -> ScriptResult<f64> {
    value.as_f64().ok_or_else(|| {
        ScriptError::runtime(
            line,
            format!("{} expects a number, got {}", name, value.type_name()),
        )
    })
}

/// Callback arguments accept a function name or a function reference.
pub(crate) fn expect_callback(name: &str, value: &Value, line: usize) -> ScriptResult<String> {
    match value {
        Value::Str(s) => Ok(s.to_lowercase()),
        Value::FunctionRef(f) => Ok(f.clone()),
        other => Err(ScriptError::runtime(
            line,
            format!(
                "{} expects a callback function name, got {}",
                name,
                other.type_name()
            ),
        )),
    }
}
