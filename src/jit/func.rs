// This module defines Func, a thin copyable handle over an LLVM function value, and the
// FunctionRegistry that maps names to those handles. Builtins and generated code look functions
// up by the name they were registered under rather than by symbol, so a registered alias resolves
// just like a declaration. Registering an existing name replaces the previous entry.

//! Function handles and the name-keyed function registry.

use hashbrown::HashMap;
use inkwell::basic_block::BasicBlock;
use inkwell::values::{BasicValueEnum, FunctionValue};

use crate::core::{CompileError, CompileResult};

/// Handle to a function emitted into (or declared in) the context's module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Func<'ctx> {
    value: FunctionValue<'ctx>,
}

impl<'ctx> Func<'ctx> {
    pub fn new(value: FunctionValue<'ctx>) -> Self {
        Self { value }
    }

    pub fn value(self) -> FunctionValue<'ctx> {
        self.value
    }

    /// Symbol name of the function in the module.
    pub fn name(&self) -> String {
        self.value.get_name().to_string_lossy().into_owned()
    }

    /// True while the function has no body.
    pub fn is_declaration(&self) -> bool {
        self.value.count_basic_blocks() == 0
    }

    pub fn entry_block(&self) -> Option<BasicBlock<'ctx>> {
        self.value.get_first_basic_block()
    }

    /// The `index`-th parameter.
    pub fn param(&self, index: u32) -> CompileResult<BasicValueEnum<'ctx>> {
        self.value
            .get_nth_param(index)
            .ok_or_else(|| CompileError::CodeGeneration {
                reason: format!("{} has no parameter {}", self.name(), index),
            })
    }
}

impl<'ctx> From<FunctionValue<'ctx>> for Func<'ctx> {
    fn from(value: FunctionValue<'ctx>) -> Self {
        Self::new(value)
    }
}

/// Name to function table shared by builtins and generated code.
#[derive(Debug, Default)]
pub struct FunctionRegistry<'ctx> {
    functions: HashMap<String, Func<'ctx>>,
}

impl<'ctx> FunctionRegistry<'ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `func` under `name`, returning the handle it replaced.
    pub fn register(&mut self, name: &str, func: Func<'ctx>) -> Option<Func<'ctx>> {
        self.functions.insert(name.to_string(), func)
    }

    pub fn lookup(&self, name: &str) -> CompileResult<Func<'ctx>> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::FunctionNotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
