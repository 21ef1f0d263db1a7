//=============================================
// src/builtins/math_ops.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: math.* builtins
//=============================================

use super::{arity, expect_f64, unknown};
use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::Interpreter;
use crate::value::Value;

pub fn dispatch(
    _interp: &mut Interpreter,
    function: &str,
    line: usize,
    args: &[Value],
) -> ScriptResult<Value> {
    match function {
        "abs" => {
            arity("math.abs", args, 1, line)?;
            match &args[0] {
                Value::Int(n) => Ok(Value::Int(n.wrapping_abs())),
                Value::Long(n) => Ok(Value::Long(n.wrapping_abs())),
                Value::Float(n) => Ok(Value::Float(n.abs())),
                Value::Double(n) => Ok(Value::Double(n.abs())),
                other => Err(ScriptError::runtime(
                    line,
                    format!("math.abs expects a number, got {}", other.type_name()),
                )),
            }
        }
        "min" => {
            arity("math.min", args, 2, line)?;
            let a = expect_f64("math.min", &args[0], line)?;
            let b = expect_f64("math.min", &args[1], line)?;
            Ok(if a <= b { args[0].clone() } else { args[1].clone() })
        }
        "max" => {
            arity("math.max", args, 2, line)?;
            let a = expect_f64("math.max", &args[0], line)?;
            let b = expect_f64("math.max", &args[1], line)?;
            Ok(if a >= b { args[0].clone() } else { args[1].clone() })
        }
        "floor" => {
            arity("math.floor", args, 1, line)?;
            Ok(Value::Double(expect_f64("math.floor", &args[0], line)?.floor()))
        }
        "ceil" => {
            arity("math.ceil", args, 1, line)?;
            Ok(Value::Double(expect_f64("math.ceil", &args[0], line)?.ceil()))
        }
        "round" => {
            arity("math.round", args, 1, line)?;
            Ok(Value::Double(expect_f64("math.round", &args[0], line)?.round()))
        }
        "sqrt" => {
            arity("math.sqrt", args, 1, line)?;
            let value = expect_f64("math.sqrt", &args[0], line)?;
            if value < 0.0 {
                return Err(ScriptError::runtime(
                    line,
                    "math.sqrt expects a non-negative number",
                ));
            }
            Ok(Value::Double(value.sqrt()))
        }
        "pow" => {
            arity("math.pow", args, 2, line)?;
            let base = expect_f64("math.pow", &args[0], line)?;
            let exponent = expect_f64("math.pow", &args[1], line)?;
            Ok(Value::Double(base.powf(exponent)))
        }
        other => Err(unknown("math", other)),
    }
}
