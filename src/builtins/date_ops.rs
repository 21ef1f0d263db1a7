//=============================================
// src/builtins/date_ops.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: date.* builtins
//=============================================

use chrono::{Datelike, NaiveDateTime, Timelike, Utc};

use super::{arity, expect_str, unknown};
use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::Interpreter;
use crate::value::Value;

fn expect_date(name: &str, value: &Value, line: usize) -> ScriptResult<NaiveDateTime> {
    match value {
        Value::Date(d) => Ok(*d),
        other => Err(ScriptError::runtime(
            line,
            format!("{} expects a date, got {}", name, other.type_name()),
        )),
    }
}

pub fn dispatch(
    _interp: &mut Interpreter,
    function: &str,
    line: usize,
    args: &[Value],
) -> ScriptResult<Value> {
    match function {
        "now" => {
            arity("date.now", args, 0, line)?;
            Ok(Value::Date(Utc::now().naive_utc()))
        }
        "year" => {
            arity("date.year", args, 1, line)?;
            Ok(Value::Int(expect_date("date.year", &args[0], line)?.year()))
        }
        "month" => {
            arity("date.month", args, 1, line)?;
            Ok(Value::Int(
                expect_date("date.month", &args[0], line)?.month() as i32,
            ))
        }
        "day" => {
            arity("date.day", args, 1, line)?;
            Ok(Value::Int(
                expect_date("date.day", &args[0], line)?.day() as i32
            ))
        }
        "hour" => {
            arity("date.hour", args, 1, line)?;
            Ok(Value::Int(
                expect_date("date.hour", &args[0], line)?.hour() as i32
            ))
        }
        "minute" => {
            arity("date.minute", args, 1, line)?;
            Ok(Value::Int(
                expect_date("date.minute", &args[0], line)?.minute() as i32,
            ))
        }
        "second" => {
            arity("date.second", args, 1, line)?;
            Ok(Value::Int(
                expect_date("date.second", &args[0], line)?.second() as i32,
            ))
        }
        "format" => {
            arity("date.format", args, 2, line)?;
            let date = expect_date("date.format", &args[0], line)?;
            let pattern = expect_str("date.format", &args[1], line)?;
            Ok(Value::Str(date.format(pattern).to_string()))
        }
        other => Err(unknown("date", other)),
    }
}
