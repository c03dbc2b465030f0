// This module implements constant pooling for the compilation context. Three independent
// caches live in ConstantPools: 64-bit integer constants keyed by value, raw string literals
// (private NUL-terminated globals with no dynamic lifetime) keyed by content, and managed
// string-object constants keyed by content. A managed constant is an internal global holding
// a pointer to a heap-allocated __string__; on its first request the context emits, into the
// init block, the allocation through the managed type, the refcount opt-out (the object lives
// for the whole process, so it must not follow call-scoped retain/release) and the copy of the
// literal bytes, and appends the matching free to the shutdown block. Later requests only hit
// the cache. Naming counters are per context, so contexts stay isolated from each other.

//! Constant pools.

use hashbrown::HashMap;
use inkwell::module::Linkage;
use inkwell::values::{BasicValueEnum, GlobalValue, IntValue, PointerValue};

use crate::builtin::managed::{ManagedString, STRING_PTR};
use crate::builtin::{MemoryManager, Refcount};
use crate::core::CompileResult;

use super::context::CompilationContext;

/// Prefix of managed string constant globals.
pub const MANAGED_CONSTANT_PREFIX: &str = "__string__constant_";

const LITERAL_PREFIX: &str = "__literal__";

/// Per-context constant caches.
#[derive(Debug, Default)]
pub struct ConstantPools<'ctx> {
    integers: HashMap<i64, IntValue<'ctx>>,
    literals: HashMap<String, PointerValue<'ctx>>,
    managed: HashMap<String, GlobalValue<'ctx>>,
    next_literal: usize,
    next_managed: usize,
}

impl<'ctx> ConstantPools<'ctx> {
    pub fn integer_count(&self) -> usize {
        self.integers.len()
    }

    pub fn literal_count(&self) -> usize {
        self.literals.len()
    }

    pub fn managed_count(&self) -> usize {
        self.managed.len()
    }
}

impl<'ctx> CompilationContext<'ctx> {
    /// Cached `long long` constant for `value`, optionally viewed as `target`.
    ///
    /// The typed view is a fresh constant; the cached one is never altered.
    pub fn constant_from_integer(
        &mut self,
        value: i64,
        target: Option<&str>,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let constant = match self.constants.integers.get(&value) {
            Some(&constant) => constant,
            None => {
                let int_type = self.basic_type_from_string("long long")?.into_int_type();
                let constant = int_type.const_int(value as u64, true);
                self.constants.integers.insert(value, constant);
                self.stats.integer_constants += 1;
                constant
            }
        };
        match target {
            Some(type_name) => self.cast(constant, type_name),
            None => Ok(constant.into()),
        }
    }

    /// Cached pointer to a raw, NUL-terminated copy of `value`.
    pub fn constant_from_string(&mut self, value: &str) -> PointerValue<'ctx> {
        if let Some(&literal) = self.constants.literals.get(value) {
            return literal;
        }

        let bytes = self.llvm().const_string(value.as_bytes(), true);
        let name = format!("{}{}", LITERAL_PREFIX, self.constants.next_literal);
        self.constants.next_literal += 1;

        let global = self.module().add_global(bytes.get_type(), None, &name);
        global.set_initializer(&bytes);
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        global.set_unnamed_addr(true);

        let literal = global.as_pointer_value();
        self.constants.literals.insert(value.to_string(), literal);
        self.stats.string_literals += 1;
        literal
    }

    /// Cached managed string constant for `value`.
    ///
    /// Returns the global holding the `__string__*`; load it to get the
    /// object. Only standalone contexts have the lifecycle blocks this needs.
    pub fn constant_string_from_string(&mut self, value: &str) -> CompileResult<GlobalValue<'ctx>> {
        if let Some(&global) = self.constants.managed.get(value) {
            return Ok(global);
        }

        let (init_block, shutdown_block) = self.open_lifecycle_blocks("managed string constant")?;
        let ptr_type = self.basic_type_from_string(STRING_PTR)?;
        let name = format!("{}{}", MANAGED_CONSTANT_PREFIX, self.constants.next_managed);
        self.constants.next_managed += 1;

        let global = self.module().add_global(ptr_type, None, &name);
        global.set_linkage(Linkage::Internal);
        global.set_initializer(&ptr_type.const_zero());

        let length = self
            .constant_from_integer(value.len() as i64, Some("size_t"))?
            .into_int_value();
        let literal = self.constant_from_string(value);

        self.in_block(init_block, |ctx| {
            let string = ManagedString::allocate(ctx, global, length)?;
            Refcount::disable_refcount(ctx, string)?;
            let dest = ManagedString::value_ptr(ctx, string)?;
            MemoryManager::memcpy(ctx, dest, literal, length)
        })?;
        self.in_block(shutdown_block, |ctx| {
            let string = ctx.load_global(global)?;
            MemoryManager::free(ctx, string)
        })?;

        self.constants.managed.insert(value.to_string(), global);
        self.stats.record_managed_constant();
        log::debug!("managed string constant {} ({} bytes)", name, value.len());
        Ok(global)
    }
}
