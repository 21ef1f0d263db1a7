//=============================================
// src/builtins/array_ops.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: array.* builtins
//=============================================

use super::{arity, arity_range, expect_array, unknown};
use crate::error::ScriptResult;
use crate::interpreter::Interpreter;
use crate::value::Value;

pub fn dispatch(
    _interp: &mut Interpreter,
    function: &str,
    line: usize,
    args: &[Value],
) -> ScriptResult<Value> {
    match function {
        "length" => {
            arity("array.length", args, 1, line)?;
            let handle = expect_array("array.length", &args[0], line)?;
            Ok(Value::Int(handle.len() as i32))
        }
        "add" => {
            arity("array.add", args, 2, line)?;
            let handle = expect_array("array.add", &args[0], line)?;
            handle.push(args[1].clone(), line)?;
            Ok(Value::Null)
        }
        // A view over the same storage enumerating backwards; iteration,
        // reads, and writes all pass through.
        "reverse" => {
            arity("array.reverse", args, 1, line)?;
            let handle = expect_array("array.reverse", &args[0], line)?;
            Ok(Value::Array(handle.reverse()))
        }
        "sort" => {
            arity_range("array.sort", args, 1, 2, line)?;
            let handle = expect_array("array.sort", &args[0], line)?;
            let ascending = match args.get(1) {
                Some(value) => value.is_truthy(),
                None => true,
            };
            handle.sort(ascending, line)?;
            Ok(Value::Null)
        }
        "fill" => {
            arity("array.fill", args, 2, line)?;
            let handle = expect_array("array.fill", &args[0], line)?;
            handle.fill(args[1].clone(), line)?;
            Ok(Value::Null)
        }
        "contains" => {
            arity("array.contains", args, 2, line)?;
            let handle = expect_array("array.contains", &args[0], line)?;
            Ok(Value::Bool(handle.index_of(&args[1]).is_some()))
        }
        "indexof" => {
            arity("array.indexof", args, 2, line)?;
            let handle = expect_array("array.indexof", &args[0], line)?;
            match handle.index_of(&args[1]) {
                Some(idx) => Ok(Value::Int(idx as i32)),
                None => Ok(Value::Int(-1)),
            }
        }
        other => Err(unknown("array", other)),
    }
}
