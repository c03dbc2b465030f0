// This module implements the memory manager builtin. Allocation and release go through
// generated wrappers around libc malloc and free. The wrappers keep a module-level count of
// live allocations, zeroed in __init__ and readable at runtime, which is how tests check that
// every managed constant is released at shutdown.

//! Memory manager builtin.
//!
//! Wraps libc `malloc`/`free` behind `__mm__malloc`/`__mm__free` and keeps a
//! count of live allocations in a module global, readable at runtime through
//! `__mm__live`.

use inkwell::module::Linkage;
use inkwell::values::{GlobalValue, IntValue, PointerValue};

use crate::core::{CompileError, CompileResult};
use crate::jit::{CompilationContext, Func, LoadType};

use super::Builtin;

pub const MALLOC: &str = "__mm__malloc";
pub const FREE: &str = "__mm__free";
pub const LIVE: &str = "__mm__live";

/// Global holding the number of allocations not yet freed.
pub const LIVE_COUNTER: &str = "__mm__live_allocations";

const LIBC_MALLOC: &str = "malloc";
const LIBC_FREE: &str = "free";

#[derive(Debug)]
pub struct MemoryManager {
    load_type: LoadType,
}

impl MemoryManager {
    pub fn new(load_type: LoadType) -> Self {
        Self { load_type }
    }

    /// Emit an allocation of `size` bytes.
    pub fn malloc<'ctx>(
        ctx: &CompilationContext<'ctx>,
        size: IntValue<'ctx>,
    ) -> CompileResult<PointerValue<'ctx>> {
        Ok(ctx.call_value(MALLOC, &[size.into()])?.into_pointer_value())
    }

    /// Emit a release of `value`. Null is ignored at runtime.
    pub fn free<'ctx>(ctx: &CompilationContext<'ctx>, value: PointerValue<'ctx>) -> CompileResult<()> {
        ctx.call(FREE, &[value.into()])?;
        Ok(())
    }

    /// Emit a byte copy of `len` bytes from `src` to `dest`.
    pub fn memcpy<'ctx>(
        ctx: &CompilationContext<'ctx>,
        dest: PointerValue<'ctx>,
        src: PointerValue<'ctx>,
        len: IntValue<'ctx>,
    ) -> CompileResult<()> {
        ctx.builder()
            .build_memcpy(dest, 1, src, 1, len)
            .map_err(|e| CompileError::CodeGeneration {
                reason: format!("memcpy: {}", e),
            })?;
        Ok(())
    }

    fn counter<'ctx>(ctx: &CompilationContext<'ctx>) -> CompileResult<GlobalValue<'ctx>> {
        ctx.module()
            .get_global(LIVE_COUNTER)
            .ok_or_else(|| CompileError::CodeGeneration {
                reason: format!("{} is not declared", LIVE_COUNTER),
            })
    }

    /// Emit `counter += delta` at the current position.
    fn adjust_counter<'ctx>(ctx: &CompilationContext<'ctx>, delta: i64) -> CompileResult<()> {
        let counter = Self::counter(ctx)?.as_pointer_value();
        let i64_type = ctx.llvm().i64_type();
        let builder = ctx.builder();
        let live = builder.build_load(i64_type, counter, "live")?.into_int_value();
        let next = builder.build_int_add(live, i64_type.const_int(delta as u64, true), "live.next")?;
        builder.build_store(counter, next)?;
        Ok(())
    }
}

impl<'ctx> Builtin<'ctx> for MemoryManager {
    fn name(&self) -> &str {
        "memory"
    }

    fn register(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        ctx.declare_function(LIBC_MALLOC, "void*", &["size_t"])?;
        ctx.declare_function(LIBC_FREE, "void", &["void*"])?;
        ctx.declare_function(MALLOC, "void*", &["size_t"])?;
        ctx.declare_function(FREE, "void", &["void*"])?;
        ctx.declare_function(LIVE, "long long", &[])?;

        let i64_type = ctx.basic_type_from_string("long long")?.into_int_type();
        let counter = ctx.module().add_global(i64_type, None, LIVE_COUNTER);
        match self.load_type {
            LoadType::Standalone => {
                counter.set_linkage(Linkage::Internal);
                counter.set_initializer(&i64_type.const_zero());
            }
            LoadType::Import => counter.set_linkage(Linkage::External),
        }
        Ok(())
    }

    fn implement(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        let malloc = ctx.lookup_function(MALLOC)?;
        let entry = ctx.llvm().append_basic_block(malloc.value(), "entry");
        ctx.in_block(entry, |ctx| {
            let size = malloc.param(0)?;
            let value = ctx.call_value(LIBC_MALLOC, &[size.into()])?;
            Self::adjust_counter(ctx, 1)?;
            ctx.builder().build_return(Some(&value))?;
            Ok(())
        })?;

        let free = ctx.lookup_function(FREE)?;
        let entry = ctx.llvm().append_basic_block(free.value(), "entry");
        let release = ctx.llvm().append_basic_block(free.value(), "release");
        let done = ctx.llvm().append_basic_block(free.value(), "done");
        ctx.in_block(entry, |ctx| {
            let value = free.param(0)?.into_pointer_value();
            let is_null = ctx.builder().build_is_null(value, "is_null")?;
            ctx.builder().build_conditional_branch(is_null, done, release)?;

            ctx.builder().position_at_end(release);
            ctx.call(LIBC_FREE, &[value.into()])?;
            Self::adjust_counter(ctx, -1)?;
            ctx.builder().build_unconditional_branch(done)?;

            ctx.builder().position_at_end(done);
            ctx.builder().build_return(None)?;
            Ok(())
        })?;

        let live = ctx.lookup_function(LIVE)?;
        let entry = ctx.llvm().append_basic_block(live.value(), "entry");
        ctx.in_block(entry, |ctx| {
            let counter = Self::counter(ctx)?.as_pointer_value();
            let value = ctx
                .builder()
                .build_load(ctx.llvm().i64_type(), counter, "live")?;
            ctx.builder().build_return(Some(&value))?;
            Ok(())
        })?;

        Ok(())
    }

    fn initialize(&mut self, ctx: &mut CompilationContext<'ctx>, init: Func<'ctx>) -> CompileResult<()> {
        let block = init.entry_block().ok_or_else(|| CompileError::CodeGeneration {
            reason: format!("{} has no entry block", init.name()),
        })?;
        ctx.in_block(block, |ctx| {
            let counter = Self::counter(ctx)?.as_pointer_value();
            ctx.builder()
                .build_store(counter, ctx.llvm().i64_type().const_zero())?;
            Ok(())
        })
    }
}
