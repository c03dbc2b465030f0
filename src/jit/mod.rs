//! LLVM-backed compilation context.
//!
//! This module contains [`CompilationContext`], which owns the LLVM module of
//! one compilation unit, together with the registries, constant pools and
//! emission helpers built around it.
//!
//! # Example
//! ```ignore
//! use cfg_jit::jit::{CompilationContext, LoadType};
//! use inkwell::context::Context;
//!
//! let llvm = Context::create();
//! let mut ctx = CompilationContext::new(&llvm, LoadType::Standalone)?;
//! let hello = ctx.constant_string_from_string("hello")?;
//! let result = ctx.compile_in_place()?;
//! unsafe { result.run_init()? };
//! ```

pub mod constants;
pub mod context;
pub mod debug;
pub mod debug_info;
pub mod func;
pub mod helper;
pub mod options;
pub mod result;
pub mod types;

pub use constants::{ConstantPools, MANAGED_CONSTANT_PREFIX};
pub use context::{BoxedBuiltin, CompilationContext, INIT_FUNCTION, SHUTDOWN_FUNCTION};
pub use debug_info::DebugInfo;
pub use func::{Func, FunctionRegistry};
pub use options::{BackendOption, BackendOptions, OptionValue};
pub use result::{CompiledResult, LoadType};
pub use types::{TypeRegistry, BUILTIN_TYPE_NAMES, UNKNOWN_TYPE_NAME};
