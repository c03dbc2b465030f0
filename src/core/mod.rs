// This module gathers the backend-independent pieces of the compilation context: the fatal
// error type, the abstract value kinds produced by type inference, the diagnostic location
// stack, and the statistics the context records while emitting code. Everything that needs
// an LLVM handle lives in the jit and builtin modules instead.

//! Core infrastructure shared by the compilation context and the builtins.

pub mod error;
pub mod location;
pub mod stats;
pub mod types;

pub use error::{CompileError, CompileResult};
pub use location::{Location, LocationStack};
pub use stats::ContextStats;
pub use types::AbstractType;
