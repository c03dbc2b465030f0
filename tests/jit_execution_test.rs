//! End-to-end tests: finalize contexts and run the generated code.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::ptr;

use inkwell::context::Context;
use inkwell::execution_engine::ExecutionEngine;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::OptimizationLevel;

use cfg_jit::builtin::memory::LIVE;
use cfg_jit::builtin::managed::STRING_ALLOC;
use cfg_jit::builtin::{ManagedString, Output, Refcount};
use cfg_jit::{BackendOption, CompilationContext, CompileError, LoadType};

type LiveFn = unsafe extern "C" fn() -> i64;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn temp_base(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("cfg_jit_{}_{}", name, std::process::id()))
}

/// Instruction lines of the body of `@name` in textual IR.
fn body_instructions<'a>(ir: &'a str, name: &str) -> Vec<&'a str> {
    let header = format!("define void @{}(", name);
    ir.lines()
        .skip_while(|line| !line.starts_with(&header))
        .skip(1)
        .take_while(|line| *line != "}")
        .filter(|line| line.starts_with("  "))
        .collect()
}

/// `!N = ...` metadata definitions by id.
fn metadata_nodes(ir: &str) -> HashMap<&str, &str> {
    ir.lines()
        .filter(|line| line.starts_with('!'))
        .filter_map(|line| line.split_once(" = "))
        .collect()
}

/// The `!N` reference following `key` in `text`.
fn reference<'a>(text: &'a str, key: &str) -> &'a str {
    let start = text.find(key).unwrap() + key.len();
    text[start..]
        .split(|c: char| c == ',' || c == ')' || c.is_whitespace())
        .next()
        .unwrap()
}

#[test]
fn test_compile_in_place_is_memoized() {
    init_logging();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();

    assert!(!ctx.is_compiled());
    let first = ctx.compile_in_place().unwrap() as *const _;
    let second = ctx.compile_in_place().unwrap() as *const _;
    assert!(ptr::eq(first, second));
    assert!(ctx.is_compiled());
    assert_eq!(ctx.stats().native_compiles, 1);
}

#[test]
fn test_failed_native_compile_is_not_counted() {
    init_logging();
    Target::initialize_native(&InitializationConfig::default()).unwrap();
    ExecutionEngine::link_in_mc_jit();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    // A module can only be owned by one execution engine.
    let _other = ctx.module().create_jit_execution_engine(OptimizationLevel::None).unwrap();

    let err = ctx.compile_in_place().unwrap_err();
    assert!(matches!(err, CompileError::Backend { .. }));
    assert!(!ctx.is_compiled());
    assert_eq!(ctx.stats().native_compiles, 0);
}

#[test]
fn test_managed_constant_lifecycle() {
    init_logging();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    let hello = ctx.constant_string_from_string("hello").unwrap();

    // long long hello_length() { return __string__length(hello); }
    let func = ctx.declare_function("hello_length", "long long", &[]).unwrap();
    let entry = llvm.append_basic_block(func.value(), "entry");
    ctx.in_block(entry, |ctx| {
        let string = ctx.load_global(hello)?;
        let length = ManagedString::length(ctx, string)?;
        ctx.builder().build_return(Some(&length))?;
        Ok(())
    })
    .unwrap();

    let result = ctx.compile_in_place().unwrap();
    unsafe {
        let live = result.get_function::<LiveFn>(LIVE).unwrap();
        let hello_length = result.get_function::<LiveFn>("hello_length").unwrap();

        result.run_init().unwrap();
        assert_eq!(live.call(), 1);
        assert_eq!(hello_length.call(), 5);

        result.run_shutdown().unwrap();
        assert_eq!(live.call(), 0);
    }
}

#[test]
fn test_each_managed_constant_is_allocated_once() {
    init_logging();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    for text in ["a", "b", "a", "", "b"] {
        ctx.constant_string_from_string(text).unwrap();
    }

    let result = ctx.compile_in_place().unwrap();
    unsafe {
        let live = result.get_function::<LiveFn>(LIVE).unwrap();
        result.run_init().unwrap();
        assert_eq!(live.call(), 3);
        result.run_shutdown().unwrap();
        assert_eq!(live.call(), 0);
    }
}

#[test]
fn test_refcounted_string_is_freed_at_zero() {
    init_logging();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    let len = ctx
        .constant_from_integer(3, Some("size_t"))
        .unwrap()
        .into_int_value();

    // Allocation plus one extra reference, released twice.
    let func = ctx.declare_function("churn", "long long", &[]).unwrap();
    let entry = llvm.append_basic_block(func.value(), "entry");
    ctx.in_block(entry, |ctx| {
        let string = ctx
            .call_value(STRING_ALLOC, &[len.into()])?
            .into_pointer_value();
        Refcount::addref(ctx, string)?;
        Refcount::delref(ctx, string)?;
        let alive = ctx.call_value(LIVE, &[])?;
        Refcount::delref(ctx, string)?;
        ctx.builder().build_return(Some(&alive))?;
        Ok(())
    })
    .unwrap();

    let result = ctx.compile_in_place().unwrap();
    unsafe {
        let live = result.get_function::<LiveFn>(LIVE).unwrap();
        let churn = result.get_function::<LiveFn>("churn").unwrap();
        result.run_init().unwrap();
        assert_eq!(churn.call(), 1);
        assert_eq!(live.call(), 0);
        result.run_shutdown().unwrap();
    }
}

#[test]
fn test_output_functions_compile() {
    init_logging();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    let greeting = ctx.constant_string_from_string("").unwrap();

    let func = ctx.declare_function("greet", "void", &[]).unwrap();
    let entry = llvm.append_basic_block(func.value(), "entry");
    ctx.in_block(entry, |ctx| {
        Output::write_literal(ctx, "")?;
        let string = ctx.load_global(greeting)?;
        Output::write_string(ctx, string)?;
        ctx.builder().build_return(None)?;
        Ok(())
    })
    .unwrap();

    let result = ctx.compile_in_place().unwrap();
    unsafe {
        result.run_init().unwrap();
        let greet = result.get_function::<unsafe extern "C" fn()>("greet").unwrap();
        greet.call();
        result.run_shutdown().unwrap();
    }
}

#[test]
fn test_constants_rejected_after_finalization() {
    init_logging();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    ctx.compile_in_place().unwrap();

    let err = ctx.constant_string_from_string("late").unwrap_err();
    assert!(matches!(err, CompileError::CodeGeneration { .. }));
}

#[test]
fn test_optimized_compile() {
    init_logging();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    ctx.set_option(BackendOption::OPTIMIZATION_LEVEL, 3i64).unwrap();
    ctx.constant_string_from_string("optimized").unwrap();

    let result = ctx.compile_in_place().unwrap();
    unsafe {
        result.run_init().unwrap();
        result.run_shutdown().unwrap();
    }
}

#[test]
fn test_import_result_has_no_lifecycle() {
    init_logging();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Import).unwrap();

    let result = ctx.compile_in_place().unwrap();
    assert_eq!(result.load_type(), LoadType::Import);
    let err = unsafe { result.run_init() }.unwrap_err();
    assert!(matches!(err, CompileError::ImportContext { .. }));
}

#[test]
fn test_debug_artifacts_are_written() {
    init_logging();
    let base = temp_base("debug");
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    ctx.set_debug(true);
    ctx.set_debug_file(&base);
    ctx.push_location("script.php", 3, 7);
    ctx.constant_string_from_string("traced").unwrap();
    ctx.pop_location();

    ctx.compile_in_place().unwrap();

    let reproducer = cfg_jit::jit::debug::reproducer_path(&base);
    let dump = cfg_jit::jit::debug::debug_path(&base);
    assert!(fs::metadata(&reproducer).unwrap().len() > 0);
    let text = fs::read_to_string(&dump).unwrap();
    assert!(text.contains("define void @__init__()"));
    assert!(text.contains("!DIFile(filename: \"script.php\""));
    assert!(text.contains("!DILocation(line: 3, column: 7"));

    let _ = fs::remove_file(reproducer);
    let _ = fs::remove_file(dump);
}

#[test]
fn test_builtin_phase_location_reaches_instructions() {
    init_logging();
    let base = temp_base("phases");
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    ctx.set_debug_file(&base);
    ctx.compile_in_place().unwrap();

    let dump = cfg_jit::jit::debug::debug_path(&base);
    let text = fs::read_to_string(&dump).unwrap();
    let body = body_instructions(&text, "__ref__addref");
    assert!(!body.is_empty());
    for inst in &body {
        assert!(inst.contains("!dbg !"), "no location on `{}`", inst);
    }

    // instruction -> DILocation -> lexical block -> file named after the phase
    let nodes = metadata_nodes(&text);
    let location = nodes[reference(body[0], "!dbg ")];
    assert!(location.starts_with("!DILocation(line: 1, column: 1"));
    let block = nodes[reference(location, "scope: ")];
    assert!(block.contains("!DILexicalBlock("));
    let file = nodes[reference(block, "file: ")];
    assert!(file.starts_with("!DIFile(filename: \"refcount::implement\""));

    let _ = fs::remove_file(cfg_jit::jit::debug::reproducer_path(&base));
    let _ = fs::remove_file(dump);
}

#[test]
fn test_debug_info_kept_when_enabled() {
    init_logging();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    ctx.set_debug(true);
    ctx.constant_string_from_string("dwarf").unwrap();
    ctx.compile_in_place().unwrap();

    assert!(ctx.debug_info().is_finalized());
    let text = ctx.module().print_to_string().to_string();
    assert!(text.contains("!llvm.dbg.cu"));
    assert!(text.contains("producer: \"cfg-jit\""));
    assert!(text.contains("!DISubprogram(name: \"__ref__addref\""));
    assert!(text.contains("!DILocation("));
    for inst in body_instructions(&text, "__ref__addref") {
        assert!(inst.contains("!dbg !"), "no location on `{}`", inst);
    }
}

#[test]
fn test_debug_info_stripped_when_disabled() {
    init_logging();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    ctx.constant_string_from_string("plain").unwrap();
    ctx.compile_in_place().unwrap();

    let text = ctx.module().print_to_string().to_string();
    assert!(!text.contains("!dbg"));
    assert!(!text.contains("!llvm.dbg.cu"));
}

#[test]
fn test_no_artifacts_without_debug_file() {
    init_logging();
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    ctx.set_debug(true);
    ctx.compile_in_place().unwrap();
    assert!(ctx.debug_file().is_none());
}

#[test]
fn test_emit_object() {
    init_logging();
    let path = temp_base("object").with_extension("o");
    let llvm = Context::create();
    let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone).unwrap();
    ctx.constant_string_from_string("object").unwrap();

    ctx.emit_object(&path).unwrap();
    assert!(fs::metadata(&path).unwrap().len() > 0);
    let _ = fs::remove_file(path);
}
