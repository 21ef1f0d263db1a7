//=============================================
// src/builtins/random_ops.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: random.* builtins
//=============================================

use rand::Rng;

use super::{arity, expect_i64, unknown};
use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::Interpreter;
use crate::value::Value;

pub fn dispatch(
    _interp: &mut Interpreter,
    function: &str,
    line: usize,
    args: &[Value],
) -> ScriptResult<Value> {
    let mut rng = rand::thread_rng();
    match function {
        "int" => {
            arity("random.int", args, 2, line)?;
            let min = expect_i64("random.int", &args[0], line)?;
            let max = expect_i64("random.int", &args[1], line)?;
            if max < min {
                return Err(ScriptError::runtime(
                    line,
                    "random.int range end must be >= start",
                ));
            }
            Ok(Value::Long(rng.gen_range(min..=max)))
        }
        "float" => {
            arity("random.float", args, 0, line)?;
            Ok(Value::Double(rng.gen_range(0.0..1.0)))
        }
        other => Err(unknown("random", other)),
    }
}
