//=============================================
// src/builtins/string_ops.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: string.* builtins
//=============================================

use super::{arity, arity_range, expect_i64, expect_str, unknown};
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
            arity("string.length", args, 1, line)?;
            let s = expect_str("string.length", &args[0], line)?;
            Ok(Value::Int(s.chars().count() as i32))
        }
        "upper" => {
            arity("string.upper", args, 1, line)?;
            let s = expect_str("string.upper", &args[0], line)?;
            Ok(Value::Str(s.to_uppercase()))
        }
        "lower" => {
            arity("string.lower", args, 1, line)?;
            let s = expect_str("string.lower", &args[0], line)?;
            Ok(Value::Str(s.to_lowercase()))
        }
        "trim" => {
            arity("string.trim", args, 1, line)?;
            let s = expect_str("string.trim", &args[0], line)?;
            Ok(Value::Str(s.trim().to_string()))
        }
        "substr" => {
            arity_range("string.substr", args, 2, 3, line)?;
            let s = expect_str("string.substr", &args[0], line)?;
            let chars: Vec<char> = s.chars().collect();
            let start = expect_i64("string.substr", &args[1], line)?.max(0) as usize;
            let start = start.min(chars.len());
            let count = match args.get(2) {
                Some(value) => expect_i64("string.substr", value, line)?.max(0) as usize,
                None => chars.len() - start,
            };
            let end = (start + count).min(chars.len());
            Ok(Value::Str(chars[start..end].iter().collect()))
        }
        "indexof" => {
            arity("string.indexof", args, 2, line)?;
            let s = expect_str("string.indexof", &args[0], line)?;
            let needle = expect_str("string.indexof", &args[1], line)?;
            match s.find(needle) {
                Some(byte_pos) => {
                    let char_pos = s[..byte_pos].chars().count();
                    Ok(Value::Int(char_pos as i32))
                }
                None => Ok(Value::Int(-1)),
            }
        }
        "contains" => {
            arity("string.contains", args, 2, line)?;
            let s = expect_str("string.contains", &args[0], line)?;
            let needle = expect_str("string.contains", &args[1], line)?;
            Ok(Value::Bool(s.contains(needle)))
        }
        "replace" => {
            arity("string.replace", args, 3, line)?;
            let s = expect_str("string.replace", &args[0], line)?;
            let from = expect_str("string.replace", &args[1], line)?;
            let to = expect_str("string.replace", &args[2], line)?;
            Ok(Value::Str(s.replace(from, to)))
        }
        "split" => {
            arity("string.split", args, 2, line)?;
            let s = expect_str("string.split", &args[0], line)?;
            let sep = expect_str("string.split", &args[1], line)?;
            let parts: Vec<Value> = s
                .split(sep)
                .map(|part| Value::Str(part.to_string()))
                .collect();
            Ok(Value::Array(ArrayHandle::from_values(DataType::Str, parts)))
        }
        other => Err(unknown("string", other)),
    }
}
