//! Helpers for building a multi-cell heap object out of values that are
//! *already* live heap references.
//!
//! `Heap::alloc_cells`/`alloc_code` copy their `cells`/`consts` argument
//! verbatim during the call, but a collection triggered by that very call
//! (inside its own room check) only relocates whatever the call's
//! `visit_roots` closure can see — it has no way to reach back into an
//! already-evaluated `&[Value]` argument and fix up the offsets baked into
//! it. So passing live heap references directly as `cells` is only safe if
//! the call is guaranteed not to collect.
//!
//! The general-case fix mirrors `gc_load`'s shell-then-patch discipline:
//! allocate the object with `Value::NULL` placeholders (nothing to relocate
//! there, so the allocating call is always safe), tracking the real cell
//! values on the dynamic root stack for the duration of that call so any
//! collection it triggers relocates them correctly in place, then patch
//! the now-correct values in afterwards with `set_cell`/`set_code_const` —
//! an ordinary write, not an allocation, so no further staleness window
//! exists.

use quill_core::{GlobalEnv, Heap, OutOfMemory, RootStack, TypeTag, Value};

fn static_and_dynamic_roots<'a>(
    globals: &'a mut GlobalEnv,
    roots: &'a mut RootStack,
) -> impl FnMut(&mut dyn FnMut(&mut Value)) + 'a {
    move |visit: &mut dyn FnMut(&mut Value)| {
        globals.for_each_root(visit);
        roots.for_each_root(visit);
    }
}

/// Allocate a cell-array object (`pair`, `vector`, `closure`, `symbol`,
/// `table` bucket, ...) whose cells may themselves be live heap
/// references.
pub fn alloc_cells(
    heap: &mut Heap,
    globals: &mut GlobalEnv,
    roots: &mut RootStack,
    tag: TypeTag,
    cells: &[Value],
) -> Result<Value, OutOfMemory> {
    let depth = roots.depth();
    let handles: Vec<_> = cells.iter().map(|&c| roots.push(c)).collect();
    let placeholders = vec![Value::NULL; cells.len()];
    let obj = heap.alloc_cells(tag, &placeholders, static_and_dynamic_roots(globals, roots));
    let obj = match obj {
        Ok(obj) => obj,
        Err(e) => {
            roots.truncate(depth);
            return Err(e);
        }
    };
    for (i, h) in handles.iter().enumerate() {
        let v = roots.get(*h);
        heap.set_cell(obj, i, v).expect("a freshly allocated object is never read-only");
    }
    roots.truncate(depth);
    Ok(obj)
}

/// Allocate a one-cell `Variable` box around a value that may itself be a
/// live heap reference.
pub fn alloc_variable(
    heap: &mut Heap,
    globals: &mut GlobalEnv,
    roots: &mut RootStack,
    init: Value,
) -> Result<Value, OutOfMemory> {
    alloc_cells(heap, globals, roots, TypeTag::Variable, &[init])
}

/// Allocate a `code` object whose constant pool may contain live heap
/// references (nested code objects, shared string constants).
pub fn alloc_code(
    heap: &mut Heap,
    globals: &mut GlobalEnv,
    roots: &mut RootStack,
    header: quill_core::CodeHeader,
    consts: &[Value],
    bytecode: &[u8],
) -> Result<Value, OutOfMemory> {
    let depth = roots.depth();
    let handles: Vec<_> = consts.iter().map(|&c| roots.push(c)).collect();
    let placeholders = vec![Value::NULL; consts.len()];
    let obj = heap.alloc_code(header, &placeholders, bytecode, static_and_dynamic_roots(globals, roots));
    let obj = match obj {
        Ok(obj) => obj,
        Err(e) => {
            roots.truncate(depth);
            return Err(e);
        }
    };
    for (i, h) in handles.iter().enumerate() {
        let v = roots.get(*h);
        heap.set_code_const(obj, i, v).expect("a freshly allocated code object is never read-only");
    }
    roots.truncate(depth);
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::Heap;

    #[test]
    fn pair_survives_a_collection_triggered_by_its_own_allocation() {
        let mut heap = Heap::new(64);
        let mut globals = GlobalEnv::new();
        let mut roots = RootStack::new();
        let car = heap
            .alloc_bytes(TypeTag::String, b"hi\0", |visit| {
                globals.for_each_root(visit);
                roots.for_each_root(visit);
            })
            .unwrap();
        let car_root = roots.push(car);
        // Churn allocations to force the next alloc_cells call to collect.
        for i in 0..50 {
            let filler = Value::make_int(i);
            let _ = heap
                .alloc_cells(TypeTag::Pair, &[filler, filler], |visit| {
                    globals.for_each_root(visit);
                    roots.for_each_root(visit);
                })
                .unwrap();
        }
        let current_car = roots.get(car_root);
        let pair = alloc_cells(&mut heap, &mut globals, &mut roots, TypeTag::Pair, &[current_car, Value::NULL])
            .unwrap();
        assert_eq!(heap.tag(heap.get_cell(pair, 0)), TypeTag::String);
    }
}
