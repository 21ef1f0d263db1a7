//=============================================
// src/builtins/system_ops.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: system.* builtins
//=============================================

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{arity, expect_f64, expect_str, unknown};
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
        // Parks only the calling thread; other screens keep running.
        "sleep" => {
            arity("system.sleep", args, 1, line)?;
            let millis = expect_f64("system.sleep", &args[0], line)?;
            if millis < 0.0 {
                return Err(ScriptError::runtime(
                    line,
                    "system.sleep duration must be non-negative",
                ));
            }
            thread::sleep(Duration::from_secs_f64(millis / 1000.0));
            Ok(Value::Null)
        }
        "env" => {
            arity("system.env", args, 1, line)?;
            let key = expect_str("system.env", &args[0], line)?;
            match std::env::var(key) {
                Ok(value) => Ok(Value::Str(value)),
                Err(_) => Ok(Value::Null),
            }
        }
        "millis" => {
            arity("system.millis", args, 0, line)?;
            let elapsed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|err| ScriptError::runtime(line, err.to_string()))?;
            Ok(Value::Long(elapsed.as_millis() as i64))
        }
        "homedir" => {
            arity("system.homedir", args, 0, line)?;
            match dirs::home_dir() {
                Some(home) => Ok(Value::Str(home.to_string_lossy().to_string())),
                None => Ok(Value::Null),
            }
        }
        other => Err(unknown("system", other)),
    }
}
