//! Black-box tests driving the public `Vm` surface end to end: compile,
//! load, apply, catch, save/load. Each test exercises one concrete scenario
//! an embedder relies on rather than a single opcode in isolation.

use quill_runtime::{ErrorCode, Vm, VmConfig};

#[test]
fn a_lambda_applied_to_an_argument_computes_the_right_answer() {
    let mut vm = Vm::new(VmConfig::default());
    let result = vm.eval("((lambda (x) (+ x 1)) 41)").unwrap();
    assert_eq!(result.as_int(), 42);
}

#[test]
fn a_tight_loop_exhausts_the_call_quota_and_throws_loop() {
    let mut vm = Vm::new(VmConfig { call_quota: 1_000, ..VmConfig::default() });
    let src = "(let ((i 0)) (while (< i 1000000) (set! i (+ i 1))) i)";
    let err = vm.eval(src).unwrap_err();
    assert_eq!(err.code, ErrorCode::Loop);
}

#[test]
fn three_calls_share_a_captured_counter() {
    let mut vm = Vm::new(VmConfig::default());
    let src = "\
        (let ((counter (let ((n 0)) (lambda () (begin (set! n (+ n 1)) n)))))\n\
          (begin (counter) (counter) (counter)))";
    let result = vm.eval(src).unwrap();
    assert_eq!(result.as_int(), 3);
}

#[test]
fn dividing_by_zero_is_a_catchable_runtime_error() {
    let mut vm = Vm::new(VmConfig::default());
    let err = vm.eval("(/ 1 0)").unwrap_err();
    assert_eq!(err.code, ErrorCode::DivideByZero);

    // The same failure, reached through the embedder's `catch_error`
    // bracket instead of propagating all the way out. Built from scratch
    // rather than through `Vm` so the closure below only needs to borrow
    // plain local variables.
    let mut heap = quill_core::Heap::new(1 << 16);
    let mut globals = quill_core::GlobalEnv::new();
    let mut roots = quill_core::RootStack::new();
    let registry = quill_runtime::register_builtins(&mut heap, &mut globals, &mut roots);
    let mut session = quill_runtime::Session::new(&VmConfig::default());

    let src = "(/ 1 0)";
    let compiled = quill_compiler::compile_source(src, &mut globals).unwrap();
    let code = quill_runtime::loader::load(&mut heap, &mut globals, &mut roots, &compiled).unwrap();
    let closure = quill_runtime::gc_util::alloc_cells(
        &mut heap,
        &mut globals,
        &mut roots,
        quill_core::TypeTag::Closure,
        &[code],
    )
    .unwrap();

    session.start(&roots, 0);
    let caught = session.catch_error(&mut roots, false, |session, roots| {
        let mut interp =
            quill_runtime::Interp { heap: &mut heap, globals: &mut globals, roots, session, registry: &registry };
        interp.apply(closure, vec![])
    });
    session.end(&mut roots);
    assert_eq!(caught.unwrap().as_int(), ErrorCode::DivideByZero as u8 as i64);
}

#[test]
fn saving_and_loading_a_value_preserves_shared_structure() {
    let mut vm = Vm::new(VmConfig::default());
    let shared = vm.eval("(let ((x 1)) x)").unwrap();
    let pair = quill_runtime::gc_util::alloc_cells(
        &mut vm.heap,
        &mut vm.globals,
        &mut vm.roots,
        quill_core::TypeTag::Vector,
        &[shared, shared],
    )
    .unwrap();
    let bytes = quill_core::gc_save(&vm.heap, pair);

    let mut vm2 = Vm::new(VmConfig::default());
    let loaded = quill_core::gc_load(&mut vm2.heap, &bytes, |visit| {
        vm2.globals.for_each_root(visit);
        vm2.roots.for_each_root(visit);
    })
    .unwrap();
    let a = vm2.heap.get_cell(loaded, 0);
    let b = vm2.heap.get_cell(loaded, 1);
    assert_eq!(a, b, "a shared cell must deserialise to the same object");
}

#[cfg(feature = "regex")]
#[test]
fn make_regexp_and_regexp_exec_round_trip_a_capture_group() {
    let mut vm = Vm::new(VmConfig::default());
    let pattern = quill_runtime::alloc_string(&mut vm.heap, "^a(.)c$", |visit| vm.roots.for_each_root(visit)).unwrap();
    let flags = quill_core::Value::make_int(0);
    let registry_idx = quill_runtime::primitive_index(&vm.heap, vm.globals.get(vm.globals.find("make-regexp").unwrap()));
    let compiled = (vm.registry.get(registry_idx).func)(
        &mut quill_runtime::PrimCtx {
            heap: &mut vm.heap,
            roots: &mut vm.roots,
            globals: &mut vm.globals,
            session: &mut vm.session,
        },
        &[pattern, flags],
    )
    .unwrap();

    let subject = quill_runtime::alloc_string(&mut vm.heap, "abc", |visit| vm.roots.for_each_root(visit)).unwrap();
    let exec_idx = quill_runtime::primitive_index(&vm.heap, vm.globals.get(vm.globals.find("regexp-exec").unwrap()));
    let result = (vm.registry.get(exec_idx).func)(
        &mut quill_runtime::PrimCtx {
            heap: &mut vm.heap,
            roots: &mut vm.roots,
            globals: &mut vm.globals,
            session: &mut vm.session,
        },
        &[compiled, subject, quill_core::Value::make_int(0), flags],
    )
    .unwrap();

    assert_eq!(vm.heap.tag(result), quill_core::TypeTag::Vector);
    assert_eq!(vm.heap.cell_count(result), 2);
    assert_eq!(quill_runtime::string_str(&vm.heap, vm.heap.get_cell(result, 0)), "abc");
    assert_eq!(quill_runtime::string_str(&vm.heap, vm.heap.get_cell(result, 1)), "b");
}
