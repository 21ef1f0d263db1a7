//=============================================
// src/records.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript record types
// Objective: Named fixed field sets with mandatory/maxlength/default
//            constraints validated at construction time
//=============================================

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::ast::Literal;
use crate::error::{ScriptError, ScriptResult};
use crate::value::{DataType, Value};

/// One declared record field. Names are stored lowercased; lookups are
/// case-insensitive.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: DataType,
    pub mandatory: bool,
    pub max_length: Option<usize>,
    pub default: Option<Literal>,
}

/// A record type definition: an ordered, fixed set of typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTypeDef {
    pub fields: Vec<FieldDef>,
}

impl RecordTypeDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        let lower = name.to_lowercase();
        self.fields.iter().find(|f| f.name == lower)
    }

    /// Build an instance from supplied field values. Violations are errors,
    /// never silent coercions: missing mandatory fields, over-long strings,
    /// and unknown fields all fail with RecordValidationError.
    pub fn construct(
        def: &Arc<Self>,
        supplied: Vec<(String, Value)>,
        line: usize,
    ) -> ScriptResult<RecordHandle> {
        let mut given: IndexMap<String, Value> = IndexMap::new();
        for (name, value) in supplied {
            let lower = name.to_lowercase();
            if def.field(&lower).is_none() {
                return Err(ScriptError::RecordValidation {
                    line,
                    message: format!("Field '{}' is not declared in the record type", name),
                });
            }
            given.insert(lower, value);
        }

        let mut values = IndexMap::new();
        for field in &def.fields {
            match given.swap_remove(&field.name) {
                Some(value) => {
                    let checked = check_field(field, value, line)?;
                    values.insert(field.name.clone(), checked);
                }
                None => {
                    if let Some(default) = &field.default {
                        values.insert(field.name.clone(), Value::from(default));
                    } else if field.mandatory {
                        return Err(ScriptError::RecordValidation {
                            line,
                            message: format!("Mandatory field '{}' is missing", field.name),
                        });
                    } else {
                        values.insert(field.name.clone(), Value::Null);
                    }
                }
            }
        }

        Ok(RecordHandle {
            inner: Arc::new(Mutex::new(RecordValue {
                ty: Arc::clone(def),
                values,
            })),
        })
    }
}

fn check_field(field: &FieldDef, value: Value, line: usize) -> ScriptResult<Value> {
    if let (Some(max), Value::Str(s)) = (field.max_length, &value) {
        if s.chars().count() > max {
            return Err(ScriptError::RecordValidation {
                line,
                message: format!(
                    "Field '{}' exceeds maxlength {} (got {} characters)",
                    field.name,
                    max,
                    s.chars().count()
                ),
            });
        }
    }
    if value.is_container() {
        return Ok(value);
    }
    field.ty.coerce(value, line)
}

#[derive(Debug)]
pub struct RecordValue {
    pub ty: Arc<RecordTypeDef>,
    pub values: IndexMap<String, Value>,
}

/// Shared handle onto one record instance.
#[derive(Debug, Clone)]
pub struct RecordHandle {
    inner: Arc<Mutex<RecordValue>>,
}

impl RecordHandle {
    pub fn get(&self, field: &str) -> Option<Value> {
        self.inner.lock().values.get(&field.to_lowercase()).cloned()
    }

    /// Field writes run the same constraint checks as construction.
    pub fn set(&self, field: &str, value: Value, line: usize) -> ScriptResult<()> {
        let mut inner = self.inner.lock();
        let lower = field.to_lowercase();
        let def = inner.ty.field(&lower).cloned().ok_or_else(|| {
            ScriptError::RecordValidation {
                line,
                message: format!("Field '{}' is not declared in the record type", field),
            }
        })?;
        let checked = check_field(&def, value, line)?;
        inner.values.insert(lower, checked);
        Ok(())
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.inner.lock().ty.field(field).is_some()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .ty
            .fields
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner
            .lock()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn ptr_eq(&self, other: &RecordHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn deep_eq(&self, other: &RecordHandle) -> bool {
        self.ptr_eq(other) || self.entries() == other.entries()
    }
}
