//=============================================
// src/builtins/thread_ops.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: thread.* builtins
// Objective: Deferred callbacks and named repeating timers; callbacks run
//            serialized on the render thread with their captured screen
//=============================================

use super::{arity, expect_callback, expect_i64, expect_str, unknown};
use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::Interpreter;
use crate::scheduler::ScheduledCall;
use crate::value::Value;

pub fn dispatch(
    interp: &mut Interpreter,
    function: &str,
    line: usize,
    args: &[Value],
) -> ScriptResult<Value> {
    match function {
        // Enqueue and return immediately; the active screen context rides
        // along and is restored around the callback.
        "runlater" => {
            arity("thread.runlater", args, 1, line)?;
            let callback = expect_callback("thread.runlater", &args[0], line)?;
            let call = ScheduledCall {
                screen: interp.current_screen().map(str::to_string),
                function: callback,
            };
            interp.scheduler().run_later(call);
            Ok(Value::Null)
        }
        "timerstart" => {
            arity("thread.timerstart", args, 3, line)?;
            let name = expect_str("thread.timerstart", &args[0], line)?.to_string();
            if name.is_empty() {
                return Err(ScriptError::runtime(
                    line,
                    "thread.timerstart: timer name cannot be empty",
                ));
            }
            let period = expect_i64("thread.timerstart", &args[1], line)?;
            if period <= 0 {
                return Err(ScriptError::runtime(
                    line,
                    format!("thread.timerstart: period must be positive (got {})", period),
                ));
            }
            let callback = expect_callback("thread.timerstart", &args[2], line)?;
            let screen = interp.current_screen().map(str::to_string);
            interp
                .scheduler()
                .clone()
                .timer_start(&name, period as u64, &callback, screen);
            Ok(Value::Str(name))
        }
        "timerstop" => {
            arity("thread.timerstop", args, 1, line)?;
            let name = expect_str("thread.timerstop", &args[0], line)?;
            Ok(Value::Bool(interp.scheduler().timer_stop(name)))
        }
        "timerisrunning" => {
            arity("thread.timerisrunning", args, 1, line)?;
            let name = expect_str("thread.timerisrunning", &args[0], line)?;
            Ok(Value::Bool(interp.scheduler().timer_is_running(name)))
        }
        "timercount" => {
            arity("thread.timercount", args, 0, line)?;
            Ok(Value::Int(interp.scheduler().timer_count() as i32))
        }
        other => Err(unknown("thread", other)),
    }
}
