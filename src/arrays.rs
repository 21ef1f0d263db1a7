//=============================================
// src/arrays.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript array storage specializations
// Objective: Dynamic/fixed boxed storage plus byte- and int-packed leaf
//            storage behind one shared handle with reverse views
//=============================================

use std::sync::Arc;

use parking_lot::Mutex;

use crate::ast::{ArraySpec, StorageClass};
use crate::error::{ScriptError, ScriptResult};
use crate::value::{DataType, Value};

/// Backing storage for one array. The specialization is chosen at
/// declaration time and never changes for the array's lifetime.
#[derive(Debug)]
pub enum ArrayStorage {
    Dynamic { elem: DataType, items: Vec<Value> },
    Fixed { elem: DataType, items: Vec<Value> },
    PackedByte { items: Vec<u8> },
    PackedInt { items: Vec<i32> },
}

impl ArrayStorage {
    fn len(&self) -> usize {
        match self {
            ArrayStorage::Dynamic { items, .. } | ArrayStorage::Fixed { items, .. } => items.len(),
            ArrayStorage::PackedByte { items } => items.len(),
            ArrayStorage::PackedInt { items } => items.len(),
        }
    }

    fn get(&self, index: usize) -> Value {
        match self {
            ArrayStorage::Dynamic { items, .. } | ArrayStorage::Fixed { items, .. } => {
                items[index].clone()
            }
            ArrayStorage::PackedByte { items } => Value::Int(items[index] as i32),
            ArrayStorage::PackedInt { items } => Value::Int(items[index]),
        }
    }

    /// Element write path: a container value is stored unconverted (nested
    /// dimensions of specialized arrays depend on this); anything else is
    /// coerced to the declared element type.
    fn set(&mut self, index: usize, value: Value, line: usize) -> ScriptResult<()> {
        match self {
            ArrayStorage::Dynamic { elem, items } | ArrayStorage::Fixed { elem, items } => {
                let converted = if value.is_container() {
                    value
                } else {
                    elem.coerce(value, line)?
                };
                items[index] = converted;
                Ok(())
            }
            ArrayStorage::PackedByte { items } => {
                let converted = pack_scalar(DataType::Byte, value, line)?;
                if let Value::Int(n) = converted {
                    items[index] = n as u8;
                }
                Ok(())
            }
            ArrayStorage::PackedInt { items } => {
                let converted = pack_scalar(DataType::Int, value, line)?;
                if let Value::Int(n) = converted {
                    items[index] = n;
                }
                Ok(())
            }
        }
    }

    fn elem_type(&self) -> DataType {
        match self {
            ArrayStorage::Dynamic { elem, .. } | ArrayStorage::Fixed { elem, .. } => *elem,
            ArrayStorage::PackedByte { .. } => DataType::Byte,
            ArrayStorage::PackedInt { .. } => DataType::Int,
        }
    }

    fn is_fixed(&self) -> bool {
        !matches!(self, ArrayStorage::Dynamic { .. })
    }
}

/// Packed leaves hold primitives only; a container arriving here means the
/// declaration had no further dimension for it.
fn pack_scalar(target: DataType, value: Value, line: usize) -> ScriptResult<Value> {
    if value.is_container() {
        return Err(ScriptError::type_conversion(
            line,
            format!(
                "Cannot store {} in a packed {} array leaf",
                value.type_name(),
                target.name()
            ),
        ));
    }
    target.coerce(value, line)
}

/// Shared handle onto one array. Cloning the handle aliases the storage;
/// `reversed` makes the same storage enumerate and address indices
/// `len-1 .. 0` without copying anything.
#[derive(Debug, Clone)]
pub struct ArrayHandle {
    storage: Arc<Mutex<ArrayStorage>>,
    reversed: bool,
}

impl ArrayHandle {
    pub fn new(storage: ArrayStorage) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            reversed: false,
        }
    }

    /// Build an array for a declaration. Multi-dimensional shapes box the
    /// outer dimensions and keep the packed representation only at the leaf.
    pub fn from_spec(spec: &ArraySpec, line: usize) -> ScriptResult<ArrayHandle> {
        if spec.dims.is_empty() {
            return Ok(ArrayHandle::new(ArrayStorage::Dynamic {
                elem: spec.elem,
                items: Vec::new(),
            }));
        }
        Self::build_dimension(spec.class, spec.elem, &spec.dims, line)
    }

    fn build_dimension(
        class: StorageClass,
        elem: DataType,
        dims: &[usize],
        line: usize,
    ) -> ScriptResult<ArrayHandle> {
        let size = dims[0];
        if dims.len() == 1 {
            let storage = match class {
                StorageClass::PackedByte => ArrayStorage::PackedByte {
                    items: vec![0; size],
                },
                StorageClass::PackedInt => ArrayStorage::PackedInt {
                    items: vec![0; size],
                },
                StorageClass::Dynamic | StorageClass::Fixed => ArrayStorage::Fixed {
                    elem,
                    items: vec![Value::Null; size],
                },
            };
            return Ok(ArrayHandle::new(storage));
        }
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            let nested = Self::build_dimension(class, elem, &dims[1..], line)?;
            items.push(Value::Array(nested));
        }
        Ok(ArrayHandle::new(ArrayStorage::Fixed { elem, items }))
    }

    pub fn from_values(elem: DataType, values: Vec<Value>) -> ArrayHandle {
        ArrayHandle::new(ArrayStorage::Dynamic { elem, items: values })
    }

    pub fn len(&self) -> usize {
        self.storage.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn elem_type(&self) -> DataType {
        self.storage.lock().elem_type()
    }

    pub fn is_fixed(&self) -> bool {
        self.storage.lock().is_fixed()
    }

    fn map_index(&self, index: i64, len: usize) -> Option<usize> {
        if index < 0 || index as usize >= len {
            return None;
        }
        let idx = index as usize;
        Some(if self.reversed { len - 1 - idx } else { idx })
    }

    pub fn get(&self, index: i64, line: usize) -> ScriptResult<Value> {
        let storage = self.storage.lock();
        let len = storage.len();
        match self.map_index(index, len) {
            Some(idx) => Ok(storage.get(idx)),
            None => Err(ScriptError::ArrayIndex {
                line,
                index,
                length: len,
            }),
        }
    }

    pub fn set(&self, index: i64, value: Value, line: usize) -> ScriptResult<()> {
        let mut storage = self.storage.lock();
        let len = storage.len();
        match self.map_index(index, len) {
            Some(idx) => storage.set(idx, value, line),
            None => Err(ScriptError::ArrayIndex {
                line,
                index,
                length: len,
            }),
        }
    }

    /// Append to a dynamic array; fixed and packed arrays have a set length.
    pub fn push(&self, value: Value, line: usize) -> ScriptResult<()> {
        if self.reversed {
            return Err(ScriptError::runtime(
                line,
                "Cannot append through a reverse view",
            ));
        }
        let mut storage = self.storage.lock();
        match &mut *storage {
            ArrayStorage::Dynamic { elem, items } => {
                let converted = if value.is_container() {
                    value
                } else {
                    elem.coerce(value, line)?
                };
                items.push(converted);
                Ok(())
            }
            _ => Err(ScriptError::runtime(
                line,
                "Cannot append to a fixed-length array",
            )),
        }
    }

    /// A view over the same storage that enumerates backwards. O(1) space;
    /// reads and writes pass through to the shared elements.
    pub fn reverse(&self) -> ArrayHandle {
        ArrayHandle {
            storage: Arc::clone(&self.storage),
            reversed: !self.reversed,
        }
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Clone out the element values in view order. Used for display, JSON,
    /// and equality; iteration in the evaluator goes index-by-index instead
    /// so loop bodies observe their own mutations.
    pub fn snapshot(&self) -> Vec<Value> {
        let storage = self.storage.lock();
        let len = storage.len();
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            let idx = if self.reversed { len - 1 - i } else { i };
            out.push(storage.get(idx));
        }
        out
    }

    pub fn fill(&self, value: Value, line: usize) -> ScriptResult<()> {
        let mut storage = self.storage.lock();
        let len = storage.len();
        for idx in 0..len {
            storage.set(idx, value.clone(), line)?;
        }
        Ok(())
    }

    pub fn sort(&self, ascending: bool, line: usize) -> ScriptResult<()> {
        let mut values = self.snapshot();
        let mut failed = false;
        values.sort_by(|a, b| match a.compare(b) {
            Some(ord) => {
                if ascending {
                    ord
                } else {
                    ord.reverse()
                }
            }
            None => {
                failed = true;
                std::cmp::Ordering::Equal
            }
        });
        if failed {
            return Err(ScriptError::runtime(
                line,
                "Array elements are not comparable for sorting",
            ));
        }
        let mut storage = self.storage.lock();
        let len = storage.len();
        for (i, v) in values.into_iter().enumerate() {
            let idx = if self.reversed { len - 1 - i } else { i };
            storage.set(idx, v, line)?;
        }
        Ok(())
    }

    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        self.snapshot()
            .iter()
            .position(|v| v.loose_equals(needle))
    }

    pub fn ptr_eq(&self, other: &ArrayHandle) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    pub fn deep_eq(&self, other: &ArrayHandle) -> bool {
        if self.ptr_eq(other) && self.reversed == other.reversed {
            return true;
        }
        let a = self.snapshot();
        let b = other.snapshot();
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
    }
}
