//=============================================
// src/value.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript runtime values
// Objective: Typed value model with coercion rules; containers are shared
//            handles so aliased bindings observe each other's mutations
//=============================================

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::arrays::ArrayHandle;
use crate::ast::Literal;
use crate::error::{ScriptError, ScriptResult};
use crate::maps::MapHandle;
use crate::records::RecordHandle;

/// Declared element/field types. `Any` accepts every value unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Byte,
    Int,
    Long,
    Float,
    Double,
    Str,
    Date,
    Bool,
    Any,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::Byte => "byte",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Str => "string",
            DataType::Date => "date",
            DataType::Bool => "bool",
            DataType::Any => "any",
        }
    }

    /// Convert `value` to this type. Containers are never accepted here;
    /// the array write path routes them around coercion before calling in.
    /// Null converts to the type's additive identity, matching declaration
    /// defaults.
    pub fn coerce(self, value: Value, line: usize) -> ScriptResult<Value> {
        if self == DataType::Any {
            return Ok(value);
        }
        let fail = |value: &Value| {
            Err(ScriptError::type_conversion(
                line,
                format!(
                    "Cannot convert {} value '{}' to {}",
                    value.type_name(),
                    value,
                    self.name()
                ),
            ))
        };
        match self {
            DataType::Byte => match &value {
                Value::Null => Ok(Value::Int(0)),
                Value::Int(n) => Ok(Value::Int((*n as u8) as i32)),
                Value::Long(n) => Ok(Value::Int((*n as u8) as i32)),
                Value::Float(n) => Ok(Value::Int((*n as u8) as i32)),
                Value::Double(n) => Ok(Value::Int((*n as u8) as i32)),
                Value::Str(s) => match s.trim().parse::<u8>() {
                    Ok(n) => Ok(Value::Int(n as i32)),
                    Err(_) => fail(&value),
                },
                _ => fail(&value),
            },
            DataType::Int => match &value {
                Value::Null => Ok(Value::Int(0)),
                Value::Int(_) => Ok(value),
                Value::Long(n) => Ok(Value::Int(*n as i32)),
                Value::Float(n) => Ok(Value::Int(*n as i32)),
                Value::Double(n) => Ok(Value::Int(*n as i32)),
                Value::Str(s) => match s.trim().parse::<i32>() {
                    Ok(n) => Ok(Value::Int(n)),
                    Err(_) => fail(&value),
                },
                _ => fail(&value),
            },
            DataType::Long => match &value {
                Value::Null => Ok(Value::Long(0)),
                Value::Long(_) => Ok(value),
                Value::Int(n) => Ok(Value::Long(*n as i64)),
                Value::Float(n) => Ok(Value::Long(*n as i64)),
                Value::Double(n) => Ok(Value::Long(*n as i64)),
                Value::Str(s) => match s.trim().parse::<i64>() {
                    Ok(n) => Ok(Value::Long(n)),
                    Err(_) => fail(&value),
                },
                _ => fail(&value),
            },
            DataType::Float => match &value {
                Value::Null => Ok(Value::Float(0.0)),
                Value::Float(_) => Ok(value),
                Value::Int(n) => Ok(Value::Float(*n as f32)),
                Value::Long(n) => Ok(Value::Float(*n as f32)),
                Value::Double(n) => Ok(Value::Float(*n as f32)),
                Value::Str(s) => match s.trim().parse::<f32>() {
                    Ok(n) => Ok(Value::Float(n)),
                    Err(_) => fail(&value),
                },
                _ => fail(&value),
            },
            DataType::Double => match &value {
                Value::Null => Ok(Value::Double(0.0)),
                Value::Double(_) => Ok(value),
                Value::Int(n) => Ok(Value::Double(*n as f64)),
                Value::Long(n) => Ok(Value::Double(*n as f64)),
                Value::Float(n) => Ok(Value::Double(*n as f64)),
                Value::Str(s) => match s.trim().parse::<f64>() {
                    Ok(n) => Ok(Value::Double(n)),
                    Err(_) => fail(&value),
                },
                _ => fail(&value),
            },
            DataType::Str => match &value {
                Value::Null => Ok(Value::Str(String::new())),
                Value::Str(_) => Ok(value),
                other => Ok(Value::Str(other.to_string())),
            },
            DataType::Date => match &value {
                Value::Null => Ok(Value::Null),
                Value::Date(_) => Ok(value),
                Value::Str(s) => match parse_date(s) {
                    Some(dt) => Ok(Value::Date(dt)),
                    None => fail(&value),
                },
                _ => fail(&value),
            },
            DataType::Bool => match &value {
                Value::Null => Ok(Value::Bool(false)),
                Value::Bool(_) => Ok(value),
                Value::Str(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "y" | "yes" => Ok(Value::Bool(true)),
                    "false" | "n" | "no" => Ok(Value::Bool(false)),
                    _ => fail(&value),
                },
                _ => fail(&value),
            },
            DataType::Any => unreachable!(),
        }
    }
}

fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let normalized = text.trim().replacen('T', " ", 1);
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(normalized.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// A runtime value. Scalars copy on assignment; Array/Map/Record are
/// shared-reference handles.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Date(NaiveDateTime),
    Array(ArrayHandle),
    Map(MapHandle),
    Record(RecordHandle),
    /// Reference to a named function, used for callback registration.
    FunctionRef(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
            Value::FunctionRef(_) => "function",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Map(_) | Value::Record(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Long(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Double(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Date(_) => true,
            Value::Array(a) => !a.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Record(_) => true,
            Value::FunctionRef(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Long(n) => Some(*n as f64),
            Value::Float(n) => Some(*n as f64),
            Value::Double(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_)
        )
    }

    /// Ordering for relational operators and array sorting. Numbers compare
    /// across widths; strings, bools, and dates compare within their type.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.as_f64().unwrap().partial_cmp(&b.as_f64().unwrap())
            }
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Script-level equality: numbers compare by value across widths,
    /// containers compare by content.
    pub fn loose_equals(&self, other: &Value) -> bool {
        if self.is_numeric() && other.is_numeric() {
            return self.as_f64() == other.as_f64();
        }
        self == other
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.deep_eq(b),
            (Value::Map(a), Value::Map(b)) => a.deep_eq(b),
            (Value::Record(a), Value::Record(b)) => a.deep_eq(b),
            (Value::FunctionRef(a), Value::FunctionRef(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Long(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Double(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.snapshot().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.entries().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Record(r) => {
                write!(f, "{{")?;
                for (i, (k, v)) in r.entries().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::FunctionRef(name) => write!(f, "<function {}>", name),
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Int(*n),
            Literal::Long(n) => Value::Long(*n),
            Literal::Float(n) => Value::Float(*n),
            Literal::Double(n) => Value::Double(*n),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Date(d) => Value::Date(*d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_is_idempotent_on_matching_types() {
        let v = DataType::Int.coerce(Value::Int(7), 1).unwrap();
        assert_eq!(v, Value::Int(7));
        let v = DataType::Str.coerce(Value::Str("x".into()), 1).unwrap();
        assert_eq!(v, Value::Str("x".into()));
    }

    #[test]
    fn string_to_int_requires_numeric_text() {
        assert_eq!(
            DataType::Int.coerce(Value::Str("41".into()), 1).unwrap(),
            Value::Int(41)
        );
        let err = DataType::Int
            .coerce(Value::Str("forty-one".into()), 3)
            .expect_err("expected conversion failure");
        assert!(matches!(err, ScriptError::TypeConversion { line: 3, .. }));
    }

    #[test]
    fn null_coerces_to_identity() {
        assert_eq!(DataType::Int.coerce(Value::Null, 1).unwrap(), Value::Int(0));
        assert_eq!(
            DataType::Double.coerce(Value::Null, 1).unwrap(),
            Value::Double(0.0)
        );
        assert_eq!(
            DataType::Str.coerce(Value::Null, 1).unwrap(),
            Value::Str(String::new())
        );
    }

    #[test]
    fn loose_equality_spans_numeric_widths() {
        assert!(Value::Int(5).loose_equals(&Value::Long(5)));
        assert!(Value::Double(2.0).loose_equals(&Value::Int(2)));
        assert!(!Value::Int(5).loose_equals(&Value::Str("5".into())));
    }

    #[test]
    fn compare_orders_numbers_and_strings() {
        use std::cmp::Ordering;
        assert_eq!(
            Value::Int(1).compare(&Value::Double(2.0)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Str("b".into()).compare(&Value::Str("a".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int(1).compare(&Value::Str("1".into())), None);
    }
}
