//! cfg-jit - Compilation context for a JIT-compiled scripting backend.
//!
//! A [`CompilationContext`] owns the LLVM module of one compilation unit. It
//! drives the builtin runtime modules through their lifecycle, pools integer
//! and string constants, resolves native types and functions by name, and
//! turns the finished module into executable code exactly once.
//!
//! # Primary Usage
//!
//! ```ignore
//! use cfg_jit::{CompilationContext, LoadType};
//! use inkwell::context::Context;
//!
//! let llvm = Context::create();
//! let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone)?;
//! ctx.constant_string_from_string("hello")?;
//!
//! let result = ctx.compile_in_place()?;
//! unsafe {
//!     result.run_init()?;
//!     result.run_shutdown()?;
//! }
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Errors, diagnostic locations, abstract types and statistics
//! - [`jit`] - The context, its registries, constant pools and finalization
//! - [`builtin`] - Runtime modules: refcounting, memory, output, managed types

pub mod builtin;
pub mod core;
pub mod jit;

pub use builtin::{Builtin, Phase};
pub use core::{AbstractType, CompileError, CompileResult, ContextStats, Location, LocationStack};
pub use jit::{
    BackendOption, CompilationContext, CompiledResult, Func, LoadType, OptionValue, INIT_FUNCTION,
    SHUTDOWN_FUNCTION,
};
