//=============================================
// src/builtins/map_ops.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: map.* builtins
//=============================================

use super::{arity, expect_map, expect_str, unknown};
use crate::arrays::ArrayHandle;
use crate::error::ScriptResult;
use crate::interpreter::Interpreter;
use crate::value::{DataType, Value};

pub fn dispatch(
    _interp: &mut Interpreter,
    function: &str,
    line: usize,
    args: &[Value],
) -> ScriptResult<Value> {
    match function {
        "length" => {
            arity("map.length", args, 1, line)?;
            let map = expect_map("map.length", &args[0], line)?;
            Ok(Value::Int(map.len() as i32))
        }
        "keys" => {
            arity("map.keys", args, 1, line)?;
            let map = expect_map("map.keys", &args[0], line)?;
            let keys = map.keys().into_iter().map(Value::Str).collect();
            Ok(Value::Array(ArrayHandle::from_values(DataType::Str, keys)))
        }
        "values" => {
            arity("map.values", args, 1, line)?;
            let map = expect_map("map.values", &args[0], line)?;
            Ok(Value::Array(ArrayHandle::from_values(
                DataType::Any,
                map.values(),
            )))
        }
        "has" => {
            arity("map.has", args, 2, line)?;
            let map = expect_map("map.has", &args[0], line)?;
            let key = expect_str("map.has", &args[1], line)?;
            Ok(Value::Bool(map.has(key)))
        }
        "remove" => {
            arity("map.remove", args, 2, line)?;
            let map = expect_map("map.remove", &args[0], line)?;
            let key = expect_str("map.remove", &args[1], line)?;
            Ok(map.remove(key).unwrap_or(Value::Null))
        }
        // Both conversions copy; the source map is never touched.
        "tosorted" => {
            arity("map.tosorted", args, 1, line)?;
            let map = expect_map("map.tosorted", &args[0], line)?;
            Ok(Value::Map(map.to_sorted()))
        }
        "tounsorted" => {
            arity("map.tounsorted", args, 1, line)?;
            let map = expect_map("map.tounsorted", &args[0], line)?;
            Ok(Value::Map(map.to_unsorted()))
        }
        "issorted" => {
            arity("map.issorted", args, 1, line)?;
            let map = expect_map("map.issorted", &args[0], line)?;
            Ok(Value::Bool(map.is_sorted()))
        }
        other => Err(unknown("map", other)),
    }
}
