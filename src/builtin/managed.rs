// This module defines the managed value types of the runtime. For now that is the string
// object: a refcount header followed by the byte length and the bytes themselves, laid out
// as __string__ = { __ref__, i64 length, [0 x i8] value }. The type builtin registers the
// struct and its pointer name so other code resolves them through the type registry, and
// implements the allocator (header initialized as a refcounted string) and the length
// accessor. ManagedString carries the emission helpers used by constant pooling.

//! Managed value types.

use inkwell::types::BasicType;
use inkwell::values::{GlobalValue, IntValue, PointerValue};

use crate::core::{CompileError, CompileResult};
use crate::jit::{CompilationContext, LoadType};

use super::memory::MemoryManager;
use super::refcount::{Refcount, FLAG_REFCOUNTED, REF_TYPE, TYPE_STRING};
use super::Builtin;

pub const STRING_TYPE: &str = "__string__";
pub const STRING_PTR: &str = "__string__*";

pub const STRING_ALLOC: &str = "__string__alloc";
pub const STRING_LENGTH: &str = "__string__length";

pub(crate) const FIELD_LENGTH: u32 = 1;
pub(crate) const FIELD_VALUE: u32 = 2;

/// Builtin registering and implementing the managed types.
#[derive(Debug)]
pub struct ManagedType {
    load_type: LoadType,
}

impl ManagedType {
    pub fn new(load_type: LoadType) -> Self {
        Self { load_type }
    }
}

impl<'ctx> Builtin<'ctx> for ManagedType {
    fn name(&self) -> &str {
        "type"
    }

    fn register(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        let header = ctx.basic_type_from_string(REF_TYPE)?;
        let length = ctx.basic_type_from_string("size_t")?;
        let bytes = ctx.basic_type_from_string("char")?.into_int_type().array_type(0);

        let string = ctx.llvm().opaque_struct_type(STRING_TYPE);
        string.set_body(&[header, length, bytes.as_basic_type_enum()], false);
        ctx.register_type(STRING_TYPE, string.into());
        let ptr = ctx.type_from_string("void*")?;
        ctx.register_type(STRING_PTR, ptr);

        ctx.declare_function(STRING_ALLOC, STRING_PTR, &["size_t"])?;
        ctx.declare_function(STRING_LENGTH, "long long", &[STRING_PTR])?;
        log::debug!("managed types registered for {:?} context", self.load_type);
        Ok(())
    }

    fn implement(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        let string = ctx.struct_type_from_string(STRING_TYPE)?;
        let size_type = ctx.basic_type_from_string("size_t")?.into_int_type();

        let alloc = ctx.lookup_function(STRING_ALLOC)?;
        let entry = ctx.llvm().append_basic_block(alloc.value(), "entry");
        ctx.in_block(entry, |ctx| {
            let length = alloc.param(0)?.into_int_value();
            let header_size = string.size_of().ok_or_else(|| CompileError::CodeGeneration {
                reason: format!("{} has no static size", STRING_TYPE),
            })?;
            let header_size = ctx
                .builder()
                .build_int_cast(header_size, size_type, "header.size")?;
            let size = ctx.builder().build_int_add(header_size, length, "size")?;
            let value = MemoryManager::malloc(ctx, size)?;
            Refcount::init(ctx, value, TYPE_STRING | FLAG_REFCOUNTED)?;
            let length_ptr = ctx
                .builder()
                .build_struct_gep(string, value, FIELD_LENGTH, "length.ptr")?;
            ctx.builder().build_store(length_ptr, length)?;
            ctx.builder().build_return(Some(&value))?;
            Ok(())
        })?;

        let length = ctx.lookup_function(STRING_LENGTH)?;
        let entry = ctx.llvm().append_basic_block(length.value(), "entry");
        ctx.in_block(entry, |ctx| {
            let value = length.param(0)?.into_pointer_value();
            let length_ptr = ctx
                .builder()
                .build_struct_gep(string, value, FIELD_LENGTH, "length.ptr")?;
            let len = ctx.builder().build_load(size_type, length_ptr, "length")?;
            ctx.builder().build_return(Some(&len))?;
            Ok(())
        })
    }
}

/// Emission helpers for managed strings.
pub struct ManagedString;

impl ManagedString {
    /// Emit the allocation of a string of `length` bytes and store it in
    /// `global`. Returns the new object.
    pub fn allocate<'ctx>(
        ctx: &CompilationContext<'ctx>,
        global: GlobalValue<'ctx>,
        length: IntValue<'ctx>,
    ) -> CompileResult<PointerValue<'ctx>> {
        let value = ctx
            .call_value(STRING_ALLOC, &[length.into()])?
            .into_pointer_value();
        ctx.builder().build_store(global.as_pointer_value(), value)?;
        Ok(value)
    }

    /// Pointer to the first byte of `value`.
    pub fn value_ptr<'ctx>(
        ctx: &mut CompilationContext<'ctx>,
        value: PointerValue<'ctx>,
    ) -> CompileResult<PointerValue<'ctx>> {
        let string = ctx.struct_type_from_string(STRING_TYPE)?;
        Ok(ctx
            .builder()
            .build_struct_gep(string, value, FIELD_VALUE, "value")?)
    }

    /// Emit a call reading the byte length of `value`.
    pub fn length<'ctx>(
        ctx: &CompilationContext<'ctx>,
        value: PointerValue<'ctx>,
    ) -> CompileResult<IntValue<'ctx>> {
        Ok(ctx
            .call_value(STRING_LENGTH, &[value.into()])?
            .into_int_value())
    }
}
