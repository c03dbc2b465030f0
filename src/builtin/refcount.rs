// This module implements the refcount builtin. It registers the __ref__ header type and
// declares the init, addref, delref and disable functions during registration, then emits their
// bodies during implementation. Counting only applies to objects whose type info has the
// refcounted flag set. Static constants clear that flag so that addref and delref leave them alone.

//! Reference counting for managed runtime values.
//!
//! Every managed object starts with a `__ref__` header holding its count and
//! type info. Only objects whose type info carries [`FLAG_REFCOUNTED`] take
//! part in addref/delref; static constants clear the flag and live until
//! they are freed explicitly.

use inkwell::basic_block::BasicBlock;
use inkwell::types::StructType;
use inkwell::values::{IntValue, PointerValue};
use inkwell::IntPredicate;

use crate::core::CompileResult;
use crate::jit::{CompilationContext, Func, LoadType};

use super::memory::MemoryManager;
use super::Builtin;

/// Header type shared by all managed values.
pub const REF_TYPE: &str = "__ref__";
pub const REF_PTR: &str = "__ref__*";

pub const REF_INIT: &str = "__ref__init";
pub const REF_ADDREF: &str = "__ref__addref";
pub const REF_DELREF: &str = "__ref__delref";
pub const REF_DISABLE: &str = "__ref__disable";

/// Type info bit set while an object follows addref/delref.
pub const FLAG_REFCOUNTED: u32 = 0x1;

/// Type info tag of managed strings.
pub const TYPE_STRING: u32 = 0x10;

const FIELD_REFCOUNT: u32 = 0;
const FIELD_TYPE_INFO: u32 = 1;

/// Refcount manager builtin.
#[derive(Debug)]
pub struct Refcount {
    load_type: LoadType,
}

impl Refcount {
    pub fn new(load_type: LoadType) -> Self {
        Self { load_type }
    }

    /// Emit header initialization: count 1 and `type_info`.
    pub fn init<'ctx>(
        ctx: &CompilationContext<'ctx>,
        value: PointerValue<'ctx>,
        type_info: u32,
    ) -> CompileResult<()> {
        let type_info = ctx.llvm().i32_type().const_int(u64::from(type_info), false);
        ctx.call(REF_INIT, &[value.into(), type_info.into()])?;
        Ok(())
    }

    pub fn addref<'ctx>(ctx: &CompilationContext<'ctx>, value: PointerValue<'ctx>) -> CompileResult<()> {
        ctx.call(REF_ADDREF, &[value.into()])?;
        Ok(())
    }

    pub fn delref<'ctx>(ctx: &CompilationContext<'ctx>, value: PointerValue<'ctx>) -> CompileResult<()> {
        ctx.call(REF_DELREF, &[value.into()])?;
        Ok(())
    }

    /// Emit the opt-out that exempts `value` from addref/delref.
    pub fn disable_refcount<'ctx>(
        ctx: &CompilationContext<'ctx>,
        value: PointerValue<'ctx>,
    ) -> CompileResult<()> {
        ctx.call(REF_DISABLE, &[value.into()])?;
        Ok(())
    }
}

impl<'ctx> Builtin<'ctx> for Refcount {
    fn name(&self) -> &str {
        "refcount"
    }

    fn register(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        let count = ctx.basic_type_from_string("uint32_t")?;
        let header = ctx.llvm().opaque_struct_type(REF_TYPE);
        header.set_body(&[count, count], false);
        ctx.register_type(REF_TYPE, header.into());
        let ptr = ctx.type_from_string("void*")?;
        ctx.register_type(REF_PTR, ptr);

        ctx.declare_function(REF_INIT, "void", &[REF_PTR, "uint32_t"])?;
        ctx.declare_function(REF_ADDREF, "void", &[REF_PTR])?;
        ctx.declare_function(REF_DELREF, "void", &[REF_PTR])?;
        ctx.declare_function(REF_DISABLE, "void", &[REF_PTR])?;
        log::debug!("refcount declarations for {:?} context", self.load_type);
        Ok(())
    }

    fn implement(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        let header = ctx.struct_type_from_string(REF_TYPE)?;
        let i32_type = ctx.llvm().i32_type();

        let init = ctx.lookup_function(REF_INIT)?;
        let entry = ctx.llvm().append_basic_block(init.value(), "entry");
        ctx.in_block(entry, |ctx| {
            let value = init.param(0)?.into_pointer_value();
            let type_info = init.param(1)?.into_int_value();
            let builder = ctx.builder();
            let count_ptr = builder.build_struct_gep(header, value, FIELD_REFCOUNT, "refcount")?;
            builder.build_store(count_ptr, i32_type.const_int(1, false))?;
            let info_ptr = builder.build_struct_gep(header, value, FIELD_TYPE_INFO, "type_info")?;
            builder.build_store(info_ptr, type_info)?;
            builder.build_return(None)?;
            Ok(())
        })?;

        let addref = ctx.lookup_function(REF_ADDREF)?;
        let entry = ctx.llvm().append_basic_block(addref.value(), "entry");
        ctx.in_block(entry, |ctx| {
            let (value, done) = emit_refcounted_guard(ctx, header, addref)?;
            let count_ptr = ctx
                .builder()
                .build_struct_gep(header, value, FIELD_REFCOUNT, "refcount")?;
            let count = load_i32(ctx, count_ptr, "count")?;
            let next = ctx
                .builder()
                .build_int_add(count, i32_type.const_int(1, false), "count.next")?;
            ctx.builder().build_store(count_ptr, next)?;
            ctx.builder().build_unconditional_branch(done)?;
            Ok(())
        })?;

        let delref = ctx.lookup_function(REF_DELREF)?;
        let entry = ctx.llvm().append_basic_block(delref.value(), "entry");
        ctx.in_block(entry, |ctx| {
            let (value, done) = emit_refcounted_guard(ctx, header, delref)?;
            let count_ptr = ctx
                .builder()
                .build_struct_gep(header, value, FIELD_REFCOUNT, "refcount")?;
            let count = load_i32(ctx, count_ptr, "count")?;
            let next = ctx
                .builder()
                .build_int_sub(count, i32_type.const_int(1, false), "count.next")?;
            ctx.builder().build_store(count_ptr, next)?;
            let is_dead = ctx.builder().build_int_compare(
                IntPredicate::EQ,
                next,
                i32_type.const_zero(),
                "is_dead",
            )?;
            let release = ctx.llvm().append_basic_block(delref.value(), "release");
            ctx.builder().build_conditional_branch(is_dead, release, done)?;

            ctx.builder().position_at_end(release);
            MemoryManager::free(ctx, value)?;
            ctx.builder().build_unconditional_branch(done)?;
            Ok(())
        })?;

        let disable = ctx.lookup_function(REF_DISABLE)?;
        let entry = ctx.llvm().append_basic_block(disable.value(), "entry");
        ctx.in_block(entry, |ctx| {
            let value = disable.param(0)?.into_pointer_value();
            let info_ptr = ctx
                .builder()
                .build_struct_gep(header, value, FIELD_TYPE_INFO, "type_info")?;
            let info = load_i32(ctx, info_ptr, "info")?;
            let mask = i32_type.const_int(u64::from(!FLAG_REFCOUNTED), false);
            let cleared = ctx.builder().build_and(info, mask, "info.static")?;
            ctx.builder().build_store(info_ptr, cleared)?;
            ctx.builder().build_return(None)?;
            Ok(())
        })?;

        Ok(())
    }
}

/// Emit the null and refcounted-flag checks of `func`, whose first parameter
/// is the object. Leaves the builder in the block that runs for counted
/// objects and returns the object with the shared `ret void` block.
fn emit_refcounted_guard<'ctx>(
    ctx: &CompilationContext<'ctx>,
    header: StructType<'ctx>,
    func: Func<'ctx>,
) -> CompileResult<(PointerValue<'ctx>, BasicBlock<'ctx>)> {
    let i32_type = ctx.llvm().i32_type();
    let value = func.param(0)?.into_pointer_value();

    let check = ctx.llvm().append_basic_block(func.value(), "check");
    let counted = ctx.llvm().append_basic_block(func.value(), "counted");
    let done = ctx.llvm().append_basic_block(func.value(), "done");
    let builder = ctx.builder();

    let is_null = builder.build_is_null(value, "is_null")?;
    builder.build_conditional_branch(is_null, done, check)?;

    builder.position_at_end(check);
    let info_ptr = builder.build_struct_gep(header, value, FIELD_TYPE_INFO, "type_info")?;
    let info = load_i32(ctx, info_ptr, "info")?;
    let flag = builder.build_and(
        info,
        i32_type.const_int(u64::from(FLAG_REFCOUNTED), false),
        "refcounted",
    )?;
    let is_counted =
        builder.build_int_compare(IntPredicate::NE, flag, i32_type.const_zero(), "is_counted")?;
    builder.build_conditional_branch(is_counted, counted, done)?;

    builder.position_at_end(done);
    builder.build_return(None)?;

    builder.position_at_end(counted);
    Ok((value, done))
}

fn load_i32<'ctx>(
    ctx: &CompilationContext<'ctx>,
    ptr: PointerValue<'ctx>,
    name: &str,
) -> CompileResult<IntValue<'ctx>> {
    let value = ctx.builder().build_load(ctx.llvm().i32_type(), ptr, name)?;
    Ok(value.into_int_value())
}
