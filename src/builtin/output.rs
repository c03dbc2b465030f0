// This module implements the output builtin. It declares libc write and emits two wrappers
// over it: one for a raw byte range and one for a managed string. A null managed string
// writes nothing.

//! Output builtin: writes raw bytes and managed strings to stdout.

use inkwell::values::PointerValue;

use crate::core::CompileResult;
use crate::jit::{CompilationContext, LoadType};

use super::managed::{FIELD_LENGTH, FIELD_VALUE, STRING_TYPE};
use super::Builtin;

pub const OUTPUT_WRITE: &str = "__output__write";
pub const OUTPUT_STRING: &str = "__output__string";

const LIBC_WRITE: &str = "write";
const STDOUT_FD: u64 = 1;

#[derive(Debug)]
pub struct Output {
    load_type: LoadType,
}

impl Output {
    pub fn new(load_type: LoadType) -> Self {
        Self { load_type }
    }

    /// Emit a write of the raw bytes of `text`.
    pub fn write_literal(ctx: &mut CompilationContext<'_>, text: &str) -> CompileResult<()> {
        let bytes = ctx.constant_from_string(text);
        let len = ctx.constant_from_integer(text.len() as i64, Some("size_t"))?;
        ctx.call(OUTPUT_WRITE, &[bytes.into(), len.into()])?;
        Ok(())
    }

    /// Emit a write of the managed string `value`.
    pub fn write_string<'ctx>(ctx: &CompilationContext<'ctx>, value: PointerValue<'ctx>) -> CompileResult<()> {
        ctx.call(OUTPUT_STRING, &[value.into()])?;
        Ok(())
    }
}

impl<'ctx> Builtin<'ctx> for Output {
    fn name(&self) -> &str {
        "output"
    }

    fn register(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        ctx.declare_function(LIBC_WRITE, "long long", &["int", "const char*", "size_t"])?;
        ctx.declare_function(OUTPUT_WRITE, "void", &["const char*", "size_t"])?;
        // Managed strings register after us; pointers are untyped anyway.
        ctx.declare_function(OUTPUT_STRING, "void", &["void*"])?;
        log::trace!("output declarations for {:?} context", self.load_type);
        Ok(())
    }

    fn implement(&mut self, ctx: &mut CompilationContext<'ctx>) -> CompileResult<()> {
        let fd = ctx.basic_type_from_string("int")?.into_int_type().const_int(STDOUT_FD, false);

        let write = ctx.lookup_function(OUTPUT_WRITE)?;
        let entry = ctx.llvm().append_basic_block(write.value(), "entry");
        ctx.in_block(entry, |ctx| {
            let bytes = write.param(0)?;
            let len = write.param(1)?;
            ctx.call(LIBC_WRITE, &[fd.into(), bytes.into(), len.into()])?;
            ctx.builder().build_return(None)?;
            Ok(())
        })?;

        let string_type = ctx.struct_type_from_string(STRING_TYPE)?;
        let i64_type = ctx.basic_type_from_string("size_t")?.into_int_type();
        let print = ctx.lookup_function(OUTPUT_STRING)?;
        let entry = ctx.llvm().append_basic_block(print.value(), "entry");
        let body = ctx.llvm().append_basic_block(print.value(), "body");
        let done = ctx.llvm().append_basic_block(print.value(), "done");
        ctx.in_block(entry, |ctx| {
            let value = print.param(0)?.into_pointer_value();
            let is_null = ctx.builder().build_is_null(value, "is_null")?;
            ctx.builder().build_conditional_branch(is_null, done, body)?;

            ctx.builder().position_at_end(body);
            let len_ptr = ctx
                .builder()
                .build_struct_gep(string_type, value, FIELD_LENGTH, "length.ptr")?;
            let len = ctx.builder().build_load(i64_type, len_ptr, "length")?;
            let bytes = ctx
                .builder()
                .build_struct_gep(string_type, value, FIELD_VALUE, "value")?;
            ctx.call(OUTPUT_WRITE, &[bytes.into(), len.into()])?;
            ctx.builder().build_unconditional_branch(done)?;

            ctx.builder().position_at_end(done);
            ctx.builder().build_return(None)?;
            Ok(())
        })
    }
}
