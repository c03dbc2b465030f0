// This module defines LoadType, which decides whether a context produces a runnable program
// or a declarations-only import, and CompiledResult, the memoized output of compile_in_place.
// The result wraps the MCJIT execution engine and resolves functions by name. For standalone
// results it also runs the __init__ and __shutdown__ lifecycle functions.

//! Load types and the finalized compilation result.

use inkwell::execution_engine::{ExecutionEngine, JitFunction, UnsafeFunctionPointer};

use crate::core::{CompileError, CompileResult};

use super::context::{INIT_FUNCTION, SHUTDOWN_FUNCTION};

/// What kind of artifact a context produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadType {
    /// Executable artifact with `__init__`/`__shutdown__` entry points.
    Standalone,
    /// Declarations only, for linking against.
    Import,
}

/// Native artifact produced by `CompilationContext::compile_in_place`.
#[derive(Debug)]
pub struct CompiledResult<'ctx> {
    engine: ExecutionEngine<'ctx>,
    load_type: LoadType,
}

impl<'ctx> CompiledResult<'ctx> {
    pub(crate) fn new(engine: ExecutionEngine<'ctx>, load_type: LoadType) -> Self {
        Self { engine, load_type }
    }

    pub fn load_type(&self) -> LoadType {
        self.load_type
    }

    pub fn engine(&self) -> &ExecutionEngine<'ctx> {
        &self.engine
    }

    /// Address of a compiled symbol.
    pub fn function_address(&self, name: &str) -> CompileResult<usize> {
        self.engine
            .get_function_address(name)
            .map_err(|_| CompileError::FunctionNotFound {
                name: name.to_string(),
            })
    }

    /// Typed entry point of a compiled function.
    ///
    /// # Safety
    ///
    /// `F` must match the signature the function was emitted with.
    pub unsafe fn get_function<F>(&self, name: &str) -> CompileResult<JitFunction<'ctx, F>>
    where
        F: UnsafeFunctionPointer,
    {
        unsafe { self.engine.get_function(name) }.map_err(|_| CompileError::FunctionNotFound {
            name: name.to_string(),
        })
    }

    /// Run the generated global setup.
    ///
    /// # Safety
    ///
    /// Executes generated code; must run at most once before `run_shutdown`.
    pub unsafe fn run_init(&self) -> CompileResult<()> {
        unsafe { self.run_lifecycle(INIT_FUNCTION) }
    }

    /// Run the generated global teardown.
    ///
    /// # Safety
    ///
    /// Executes generated code; must follow a completed `run_init`.
    pub unsafe fn run_shutdown(&self) -> CompileResult<()> {
        unsafe { self.run_lifecycle(SHUTDOWN_FUNCTION) }
    }

    unsafe fn run_lifecycle(&self, name: &str) -> CompileResult<()> {
        if self.load_type == LoadType::Import {
            return Err(CompileError::ImportContext { operation: "running lifecycle functions" });
        }
        let entry = unsafe { self.get_function::<unsafe extern "C" fn()>(name)? };
        log::debug!("running {}", name);
        unsafe { entry.call() };
        Ok(())
    }
}
