//=============================================
// src/builtins/screen_ops.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: screen.* builtins
// Objective: Concurrency-safe access to screen-bound variables
//=============================================

use super::{arity, expect_str, unknown};
use crate::arrays::ArrayHandle;
use crate::error::ScriptResult;
use crate::interpreter::Interpreter;
use crate::value::{DataType, Value};

pub fn dispatch(
    interp: &mut Interpreter,
    function: &str,
    line: usize,
    args: &[Value],
) -> ScriptResult<Value> {
    match function {
        "get" => {
            arity("screen.get", args, 2, line)?;
            let screen = expect_str("screen.get", &args[0], line)?;
            let name = expect_str("screen.get", &args[1], line)?;
            Ok(interp
                .shared()
                .screens
                .get_var(screen, name)
                .unwrap_or(Value::Null))
        }
        "set" => {
            arity("screen.set", args, 3, line)?;
            let screen = expect_str("screen.set", &args[0], line)?;
            let name = expect_str("screen.set", &args[1], line)?;
            interp
                .shared()
                .screens
                .set_var(screen, name, args[2].clone());
            Ok(Value::Null)
        }
        "has" => {
            arity("screen.has", args, 2, line)?;
            let screen = expect_str("screen.has", &args[0], line)?;
            let name = expect_str("screen.has", &args[1], line)?;
            Ok(Value::Bool(interp.shared().screens.has_var(screen, name)))
        }
        "vars" => {
            arity("screen.vars", args, 1, line)?;
            let screen = expect_str("screen.vars", &args[0], line)?;
            let names = interp
                .shared()
                .screens
                .var_names(screen)
                .into_iter()
                .map(Value::Str)
                .collect();
            Ok(Value::Array(ArrayHandle::from_values(DataType::Str, names)))
        }
        // The screen whose context this interpreter carries, if any.
        "current" => {
            arity("screen.current", args, 0, line)?;
            match interp.current_screen() {
                Some(name) => Ok(Value::Str(name.to_string())),
                None => Ok(Value::Null),
            }
        }
        other => Err(unknown("screen", other)),
    }
}
