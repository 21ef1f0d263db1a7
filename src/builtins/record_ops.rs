//=============================================
// src/builtins/record_ops.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: record.* builtins
//=============================================

use super::{arity, expect_record, expect_str, unknown};
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
        "fields" => {
            arity("record.fields", args, 1, line)?;
            let record = expect_record("record.fields", &args[0], line)?;
            let names = record
                .field_names()
                .into_iter()
                .map(Value::Str)
                .collect();
            Ok(Value::Array(ArrayHandle::from_values(DataType::Str, names)))
        }
        "has" => {
            arity("record.has", args, 2, line)?;
            let record = expect_record("record.has", &args[0], line)?;
            let field = expect_str("record.has", &args[1], line)?;
            Ok(Value::Bool(record.has_field(field)))
        }
        other => Err(unknown("record", other)),
    }
}
