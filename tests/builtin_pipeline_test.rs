//! Tests for the builtin lifecycle driven by the compilation context.

use std::cell::RefCell;
use std::rc::Rc;

use inkwell::context::Context;

use cfg_jit::builtin::memory::LIVE;
use cfg_jit::jit::BoxedBuiltin;
use cfg_jit::{Builtin, CompilationContext, CompileError, CompileResult, Func, LoadType};

type Trace = Rc<RefCell<Vec<String>>>;

/// Declares `answer` in register and implements it returning 42.
struct Producer {
    trace: Trace,
}

impl<'ctx> Builtin<'ctx> for Producer {
    fn name(&self) -> &str {
        "producer"
    }

    fn register(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        self.trace.borrow_mut().push(ctx.current_location().label().to_string());
        ctx.declare_function("answer", "long long", &[])?;
        Ok(())
    }

    fn implement(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        self.trace.borrow_mut().push(ctx.current_location().label().to_string());
        let answer = ctx.lookup_function("answer")?;
        let entry = ctx.llvm().append_basic_block(answer.value(), "entry");
        let value = ctx.constant_from_integer(42, None)?;
        ctx.in_block(entry, |ctx| {
            ctx.builder().build_return(Some(&value))?;
            Ok(())
        })
    }
}

/// Registered before the producer, yet uses its declaration while
/// implementing.
struct Consumer {
    trace: Trace,
}

impl<'ctx> Builtin<'ctx> for Consumer {
    fn name(&self) -> &str {
        "consumer"
    }

    fn register(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        self.trace.borrow_mut().push(ctx.current_location().label().to_string());
        ctx.declare_function("answer_plus_one", "long long", &[])?;
        Ok(())
    }

    fn implement(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        self.trace.borrow_mut().push(ctx.current_location().label().to_string());
        let func = ctx.lookup_function("answer_plus_one")?;
        let entry = ctx.llvm().append_basic_block(func.value(), "entry");
        let one = ctx.constant_from_integer(1, None)?.into_int_value();
        ctx.in_block(entry, |ctx| {
            let answer = ctx.call_value("answer", &[])?.into_int_value();
            let sum = ctx.builder().build_int_add(answer, one, "sum")?;
            ctx.builder().build_return(Some(&sum))?;
            Ok(())
        })
    }

    fn initialize(&mut self, ctx: &mut CompilationContext<'ctx>, init: Func<'ctx>) -> CompileResult<()> {
        self.trace.borrow_mut().push(ctx.current_location().label().to_string());
        assert_eq!(init.name(), "__init__");
        assert_eq!(ctx.location_depth(), 1);
        Ok(())
    }
}

/// Fails in the given phase.
struct Failing {
    in_implement: bool,
}

impl<'ctx> Builtin<'ctx> for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn register(&mut self, _ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        if self.in_implement {
            return Ok(());
        }
        Err(CompileError::CodeGeneration {
            reason: "register failed".to_string(),
        })
    }

    fn implement(&mut self, _ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        Err(CompileError::CodeGeneration {
            reason: "implement failed".to_string(),
        })
    }
}

fn traced<'ctx>(trace: &Trace) -> Vec<BoxedBuiltin<'ctx>> {
    vec![
        Box::new(Consumer {
            trace: trace.clone(),
        }),
        Box::new(Producer {
            trace: trace.clone(),
        }),
    ]
}

#[test]
fn test_phases_are_full_sweeps() {
    let _ = env_logger::builder().is_test(true).try_init();
    let llvm = Context::create();
    let trace = Trace::default();
    let ctx = CompilationContext::with_builtins(&llvm, LoadType::Standalone, traced(&trace)).unwrap();

    assert_eq!(
        *trace.borrow(),
        vec![
            "consumer::register",
            "producer::register",
            "consumer::implement",
            "producer::implement",
            "consumer::initialize",
        ]
    );

    // Extras run after the foundational builtins in every phase.
    let log = &ctx.stats().phase_log;
    assert_eq!(log.len(), 18);
    assert_eq!(log[4], "consumer::register");
    assert_eq!(log[11], "producer::implement");
    assert_eq!(log[17], "producer::initialize");
    assert_eq!(ctx.location_depth(), 0);
}

#[test]
fn test_import_skips_implement_and_initialize() {
    let _ = env_logger::builder().is_test(true).try_init();
    let llvm = Context::create();
    let trace = Trace::default();
    let ctx = CompilationContext::with_builtins(&llvm, LoadType::Import, traced(&trace)).unwrap();

    assert_eq!(*trace.borrow(), vec!["consumer::register", "producer::register"]);
    assert!(ctx.lookup_function("answer").unwrap().is_declaration());
}

#[test]
fn test_register_failure_aborts_construction() {
    let llvm = Context::create();
    let extra: Vec<BoxedBuiltin> = vec![Box::new(Failing { in_implement: false })];
    let err = CompilationContext::with_builtins(&llvm, LoadType::Standalone, extra)
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Code generation failed: register failed");
}

fn failing_in_implement<'ctx>() -> Vec<BoxedBuiltin<'ctx>> {
    vec![Box::new(Failing { in_implement: true })]
}

#[test]
fn test_implement_failure_is_skipped_for_import() {
    let llvm = Context::create();
    assert!(CompilationContext::with_builtins(&llvm, LoadType::Standalone, failing_in_implement()).is_err());
    assert!(CompilationContext::with_builtins(&llvm, LoadType::Import, failing_in_implement()).is_ok());
}

#[test]
fn test_builtin_functions_run() {
    let _ = env_logger::builder().is_test(true).try_init();
    let llvm = Context::create();
    let trace = Trace::default();
    let mut ctx = CompilationContext::with_builtins(&llvm, LoadType::Standalone, traced(&trace)).unwrap();

    let result = ctx.compile_in_place().unwrap();
    unsafe {
        result.run_init().unwrap();
        let plus_one = result
            .get_function::<unsafe extern "C" fn() -> i64>("answer_plus_one")
            .unwrap();
        assert_eq!(plus_one.call(), 43);
        let live = result.get_function::<unsafe extern "C" fn() -> i64>(LIVE).unwrap();
        assert_eq!(live.call(), 0);
        result.run_shutdown().unwrap();
    }
}
