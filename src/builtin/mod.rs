// This module defines the builtin lifecycle protocol and the foundational runtime modules every
// compilation context starts with. A Builtin contributes to the generated program in three
// phases: register declares the native types and function signatures it needs or exposes,
// implement emits the function bodies, and initialize emits global setup into the shared init
// block. The context runs each phase as a full sweep over all builtins in registration order,
// so implement may use any builtin's declarations and initialize may call any builtin's
// functions. Import contexts only run the register sweep. The foundational set is closed:
// refcount manager, memory manager, output and the managed value type, constructed in that
// order; callers may append their own builtins for the context to drive.

//! Builtin runtime modules and their lifecycle protocol.

use std::fmt;

use crate::core::CompileResult;
use crate::jit::{CompilationContext, Func};

pub mod managed;
pub mod memory;
pub mod output;
pub mod refcount;

pub use managed::{ManagedString, ManagedType};
pub use memory::MemoryManager;
pub use output::Output;
pub use refcount::Refcount;

/// Phases of the builtin lifecycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Register,
    Implement,
    Initialize,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Register => "register",
            Phase::Implement => "implement",
            Phase::Initialize => "initialize",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime feature provider driven by the compilation context.
pub trait Builtin<'ctx> {
    /// Identity used in diagnostic locations and logs.
    fn name(&self) -> &str;

    /// Declare native types and function signatures. Always runs.
    fn register(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()>;

    /// Emit function bodies. Skipped for import contexts.
    fn implement(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()>;

    /// Emit global setup into the entry block of `init`. Skipped for import
    /// contexts.
    fn initialize(&mut self, ctx: &mut CompilationContext<'ctx>, init: Func<'ctx>) -> CompileResult<()> {
        let _ = (ctx, init);
        Ok(())
    }
}
