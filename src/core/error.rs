// This module defines the error type of the compilation context using the thiserror crate.
// CompileError covers every fatal condition the context can raise: unresolvable native type
// names, abstract value kinds with no native representation, lookups of functions that were
// never registered, non-integer values handed to integer backend options, operations that
// need lifecycle blocks on an import context, LLVM builder failures, module verification
// failures, native compilation failures and debug artifact write failures. None of these are
// recoverable: a context that returns one of them never produces a result. CompileResult<T>
// is the convenience alias used throughout the crate.

//! Error types for the compilation context.

use std::path::PathBuf;

use thiserror::Error;

use super::types::AbstractType;

/// Fatal compile-time faults raised by the compilation context.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Unsupported native type {name}")]
    UnsupportedNativeType {
        name: String,
    },

    #[error("Unsupported abstract type: {ty}")]
    UnsupportedAbstractType {
        ty: AbstractType,
    },

    #[error("Unable to lookup non-existing function {name}")]
    FunctionNotFound {
        name: String,
    },

    #[error("Unsupported option type {kind} for backend option {option}")]
    UnsupportedOptionValue {
        option: u32,
        kind: &'static str,
    },

    #[error("{operation} requires a standalone context")]
    ImportContext {
        operation: &'static str,
    },

    #[error("Code generation failed: {reason}")]
    CodeGeneration {
        reason: String,
    },

    #[error("Module verification failed: {reason}")]
    Verification {
        reason: String,
    },

    #[error("Native compilation failed: {reason}")]
    Backend {
        reason: String,
    },

    #[error("Failed to write debug artifact {}: {reason}", .path.display())]
    DebugArtifact {
        path: PathBuf,
        reason: String,
    },

    #[error(transparent)]
    Builder(#[from] inkwell::builder::BuilderError),
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
