//! `TypedValue`: a serde-derived, owned-data mirror of a heap [`Value`] for
//! exchanging data with an embedding host language, independent of the
//! precise binary wire format `quill_core::save_load` uses for same-process
//! heap snapshots.
//!
//! `Value` itself can't derive `Serialize`: it is a bare tagged word,
//! meaningless without the `Heap` it indexes into, and a heap reference can
//! be relocated by any intervening collection. `TypedValue` instead holds
//! owned `String`s and a recursive tree of boxed variants, walked once out
//! of (or back into) a specific heap at a specific moment — exactly the
//! `TypedValue`/`bincode` convenience view the reference `serialize.rs`
//! module offers its embedders, adapted to this value model's actual
//! shapes (no maps or tagged variants here, but pairs and vectors).
//!
//! Closures, code objects, and primitives carry host-specific GC/program
//! state with no host-independent representation, so converting one is an
//! error rather than a silent approximation.

use crate::primitives::{alloc_string, string_str};
use quill_core::{GlobalEnv, Heap, RootStack, TypeTag, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum SnapshotError {
    ClosureNotSerializable,
    CodeNotSerializable,
    PrimitiveNotSerializable,
    OpaqueNotSerializable(TypeTag),
    NonFiniteFloat(f64),
    BincodeError(Box<bincode::ErrorKind>),
    OutOfMemory,
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::ClosureNotSerializable => write!(f, "closures cannot be serialized: code is not data"),
            SnapshotError::CodeNotSerializable => write!(f, "code objects cannot be serialized"),
            SnapshotError::PrimitiveNotSerializable => write!(f, "primitives cannot be serialized"),
            SnapshotError::OpaqueNotSerializable(tag) => write!(f, "{tag:?} values are opaque and cannot be serialized"),
            SnapshotError::NonFiniteFloat(v) => write!(f, "cannot serialize non-finite float: {v}"),
            SnapshotError::BincodeError(e) => write!(f, "bincode error: {e}"),
            SnapshotError::OutOfMemory => write!(f, "heap exhausted while reconstructing a value"),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<bincode::Error> for SnapshotError {
    fn from(e: bincode::Error) -> Self {
        SnapshotError::BincodeError(e.into())
    }
}

/// An owned, heap-independent mirror of a [`Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Pair(Box<TypedValue>, Box<TypedValue>),
    Vector(Vec<TypedValue>),
}

impl TypedValue {
    /// Snapshot `v` out of `heap` into an owned tree. Recurses into pairs
    /// and vectors; anything containing a closure, code object, or
    /// primitive anywhere in its reachable graph fails the whole
    /// conversion rather than silently dropping the unrepresentable part.
    pub fn from_value(heap: &Heap, v: Value) -> Result<TypedValue, SnapshotError> {
        if v.is_null() {
            return Ok(TypedValue::Null);
        }
        if v.is_int() {
            return Ok(TypedValue::Int(v.as_int()));
        }
        match heap.tag(v) {
            TypeTag::String => Ok(TypedValue::String(string_str(heap, v).to_string())),
            TypeTag::Float => {
                let f = crate::arithmetic::float_from_bytes(heap.payload(v));
                if !f.is_finite() {
                    return Err(SnapshotError::NonFiniteFloat(f));
                }
                Ok(TypedValue::Float(f))
            }
            TypeTag::Pair => {
                let car = TypedValue::from_value(heap, heap.get_cell(v, 0))?;
                let cdr = TypedValue::from_value(heap, heap.get_cell(v, 1))?;
                Ok(TypedValue::Pair(Box::new(car), Box::new(cdr)))
            }
            TypeTag::Vector => {
                let n = heap.cell_count(v);
                let mut items = Vec::with_capacity(n);
                for i in 0..n {
                    items.push(TypedValue::from_value(heap, heap.get_cell(v, i))?);
                }
                Ok(TypedValue::Vector(items))
            }
            TypeTag::Closure => Err(SnapshotError::ClosureNotSerializable),
            TypeTag::Code => Err(SnapshotError::CodeNotSerializable),
            TypeTag::Primitive | TypeTag::VarargsPrimitive | TypeTag::SecurePrimitive => {
                Err(SnapshotError::PrimitiveNotSerializable)
            }
            other => Err(SnapshotError::OpaqueNotSerializable(other)),
        }
    }

    /// Materialize `self` onto `heap` as a fresh `Value`.
    pub fn to_value(
        &self,
        heap: &mut Heap,
        globals: &mut GlobalEnv,
        roots: &mut RootStack,
    ) -> Result<Value, SnapshotError> {
        match self {
            TypedValue::Null => Ok(Value::NULL),
            TypedValue::Int(n) => Ok(Value::make_int(*n)),
            TypedValue::Float(f) => heap
                .alloc_bytes(TypeTag::Float, &crate::arithmetic::float_bytes(*f), |visit| {
                    globals.for_each_root(visit);
                    roots.for_each_root(visit);
                })
                .map_err(|_| SnapshotError::OutOfMemory),
            TypedValue::String(s) => alloc_string(heap, s, |visit| {
                globals.for_each_root(visit);
                roots.for_each_root(visit);
            })
            .map_err(|_| SnapshotError::OutOfMemory),
            TypedValue::Pair(car, cdr) => {
                let depth = roots.depth();
                let car_v = car.to_value(heap, globals, roots)?;
                let car_root = roots.push(car_v);
                let cdr_v = cdr.to_value(heap, globals, roots)?;
                let car_v = roots.get(car_root);
                roots.truncate(depth);
                crate::gc_util::alloc_cells(heap, globals, roots, TypeTag::Pair, &[car_v, cdr_v])
                    .map_err(|_| SnapshotError::OutOfMemory)
            }
            TypedValue::Vector(items) => {
                let depth = roots.depth();
                let mut handles = Vec::with_capacity(items.len());
                for item in items {
                    let v = item.to_value(heap, globals, roots)?;
                    handles.push(roots.push(v));
                }
                let cells: Vec<Value> = handles.iter().map(|&h| roots.get(h)).collect();
                roots.truncate(depth);
                crate::gc_util::alloc_cells(heap, globals, roots, TypeTag::Vector, &cells)
                    .map_err(|_| SnapshotError::OutOfMemory)
            }
        }
    }

    pub fn to_bincode(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bincode(bytes: &[u8]) -> Result<TypedValue, SnapshotError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_nested_pair_through_typed_value_and_back() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let s = alloc_string(&mut heap, "hello", |visit| roots.for_each_root(visit)).unwrap();
        let pair = crate::gc_util::alloc_cells(&mut heap, &mut globals, &mut roots, TypeTag::Pair, &[s, Value::make_int(7)]).unwrap();

        let typed = TypedValue::from_value(&heap, pair).unwrap();
        assert_eq!(typed, TypedValue::Pair(Box::new(TypedValue::String("hello".into())), Box::new(TypedValue::Int(7))));

        let rebuilt = typed.to_value(&mut heap, &mut globals, &mut roots).unwrap();
        assert_eq!(heap.tag(rebuilt), TypeTag::Pair);
        assert_eq!(string_str(&heap, heap.get_cell(rebuilt, 0)), "hello");
        assert_eq!(heap.get_cell(rebuilt, 1).as_int(), 7);
    }

    #[test]
    fn bincode_round_trip_preserves_structure() {
        let typed = TypedValue::Vector(vec![TypedValue::Int(1), TypedValue::String("x".into())]);
        let bytes = typed.to_bincode().unwrap();
        let back = TypedValue::from_bincode(&bytes).unwrap();
        assert_eq!(typed, back);
    }

    #[test]
    fn a_closure_refuses_to_snapshot() {
        let mut heap = Heap::new(4096);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let header = quill_core::CodeHeader { argc: 0, seclevel: 0, nlocals: 0, stack_depth: 0 };
        let code = crate::gc_util::alloc_code(&mut heap, &mut globals, &mut roots, header, &[], &[]).unwrap();
        let closure = crate::gc_util::alloc_cells(&mut heap, &mut globals, &mut roots, TypeTag::Closure, &[code]).unwrap();
        assert!(matches!(TypedValue::from_value(&heap, closure), Err(SnapshotError::ClosureNotSerializable)));
    }
}
