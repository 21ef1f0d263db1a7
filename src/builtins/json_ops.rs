//=============================================
// src/builtins/json_ops.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: json.* builtins and the Value <-> JSON bridge
//=============================================

use serde_json::Value as JsonValue;

use super::{arity, expect_str, unknown};
use crate::arrays::ArrayHandle;
use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::Interpreter;
use crate::maps::MapHandle;
use crate::value::{DataType, Value};

pub fn dispatch(
    _interp: &mut Interpreter,
    function: &str,
    line: usize,
    args: &[Value],
) -> ScriptResult<Value> {
    match function {
        "encode" => {
            arity("json.encode", args, 1, line)?;
            Ok(Value::Str(value_to_json(&args[0]).to_string()))
        }
        "decode" => {
            arity("json.decode", args, 1, line)?;
            let text = expect_str("json.decode", &args[0], line)?;
            let parsed: JsonValue = serde_json::from_str(text).map_err(|err| {
                ScriptError::runtime(line, format!("json.decode failed: {}", err))
            })?;
            Ok(json_to_value(&parsed))
        }
        other => Err(unknown("json", other)),
    }
}

pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(n) => JsonValue::Number((*n).into()),
        Value::Long(n) => JsonValue::Number((*n).into()),
        Value::Float(n) => serde_json::Number::from_f64(*n as f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Double(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::Date(d) => JsonValue::String(d.format("%Y-%m-%d %H:%M:%S").to_string()),
        Value::Array(handle) => {
            JsonValue::Array(handle.snapshot().iter().map(value_to_json).collect())
        }
        Value::Map(handle) => {
            let mut object = serde_json::Map::new();
            for (key, val) in handle.entries() {
                object.insert(key, value_to_json(&val));
            }
            JsonValue::Object(object)
        }
        Value::Record(handle) => {
            let mut object = serde_json::Map::new();
            for (key, val) in handle.entries() {
                object.insert(key, value_to_json(&val));
            }
            JsonValue::Object(object)
        }
        Value::FunctionRef(name) => JsonValue::String(format!("<function {}>", name)),
    }
}

pub fn json_to_value(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(num) => {
            if let Some(n) = num.as_i64() {
                if n >= i32::MIN as i64 && n <= i32::MAX as i64 {
                    Value::Int(n as i32)
                } else {
                    Value::Long(n)
                }
            } else {
                Value::Double(num.as_f64().unwrap_or_default())
            }
        }
        JsonValue::String(s) => Value::Str(s.clone()),
        JsonValue::Array(items) => Value::Array(ArrayHandle::from_values(
            DataType::Any,
            items.iter().map(json_to_value).collect(),
        )),
        JsonValue::Object(object) => {
            let entries = object
                .iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect();
            Value::Map(MapHandle::from_entries(entries, false))
        }
    }
}
