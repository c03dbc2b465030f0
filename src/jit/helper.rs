// This module holds the emission helpers shared by the context and the builtins: block-scoped
// builder positioning, calls by registered name, loads of pointer globals and static views of
// integer constants. Positioning is also where diagnostic locations reach the IR. Whenever the
// insertion point or the location stack changes, the builder's current debug location is set
// to the current location scoped to the function being emitted into, so every instruction
// built afterwards carries it, whether it goes through these helpers or the bare builder.

//! Emission helpers shared by the context and the builtins.

use inkwell::basic_block::BasicBlock;
use inkwell::debug_info::DILocation;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, GlobalValue, IntValue, PointerValue};
use inkwell::AddressSpace;

use crate::core::{CompileError, CompileResult};

use super::context::CompilationContext;

impl<'ctx> CompilationContext<'ctx> {
    /// Run `emit` with the builder at the end of `block`, then restore the
    /// previous insertion block.
    pub fn in_block<R>(
        &mut self,
        block: BasicBlock<'ctx>,
        emit: impl FnOnce(&mut Self) -> CompileResult<R>,
    ) -> CompileResult<R> {
        let previous = self.builder().get_insert_block();
        self.builder().position_at_end(block);
        self.sync_debug_location();
        let outcome = emit(self);
        match previous {
            Some(previous) => self.builder().position_at_end(previous),
            None => self.builder().clear_insertion_position(),
        }
        self.sync_debug_location();
        outcome
    }

    /// Call the registered function `name` at the current position.
    pub fn call(
        &self,
        name: &str,
        args: &[BasicMetadataValueEnum<'ctx>],
    ) -> CompileResult<Option<BasicValueEnum<'ctx>>> {
        let func = self.lookup_function(name)?;
        let site = self.builder().build_call(func.value(), args, "")?;
        Ok(site.try_as_basic_value().left())
    }

    /// Like [`CompilationContext::call`] for functions returning a value.
    pub fn call_value(
        &self,
        name: &str,
        args: &[BasicMetadataValueEnum<'ctx>],
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        self.call(name, args)?
            .ok_or_else(|| CompileError::CodeGeneration {
                reason: format!("{} does not return a value", name),
            })
    }

    /// Load the pointer held by a pointer-typed global.
    pub fn load_global(&self, global: GlobalValue<'ctx>) -> CompileResult<PointerValue<'ctx>> {
        let ptr_type = self.llvm().ptr_type(AddressSpace::default());
        let value = self
            .builder()
            .build_load(ptr_type, global.as_pointer_value(), "")?;
        Ok(value.into_pointer_value())
    }

    /// Typed view of an integer constant.
    pub fn cast(&mut self, value: IntValue<'ctx>, type_name: &str) -> CompileResult<BasicValueEnum<'ctx>> {
        let raw = value
            .get_sign_extended_constant()
            .ok_or_else(|| CompileError::CodeGeneration {
                reason: "only integer constants can be cast statically".to_string(),
            })?;
        match self.basic_type_from_string(type_name)? {
            BasicTypeEnum::IntType(target) if target == value.get_type() => Ok(value.into()),
            BasicTypeEnum::IntType(target) if target.get_bit_width() == 1 => {
                Ok(target.const_int((raw != 0) as u64, false).into())
            }
            BasicTypeEnum::IntType(target) => Ok(target.const_int(raw as u64, true).into()),
            BasicTypeEnum::PointerType(target) => Ok(value.const_to_pointer(target).into()),
            _ => Err(CompileError::CodeGeneration {
                reason: format!("cannot view an integer constant as {}", type_name),
            }),
        }
    }

    /// The current location as a debug location in the function being
    /// emitted into; `None` while the builder is not positioned.
    pub fn location(&mut self) -> Option<DILocation<'ctx>> {
        let function = self.builder().get_insert_block()?.get_parent()?;
        let llvm = self.llvm();
        let (debug_info, locations) = self.debug_parts();
        debug_info.location(llvm, function, locations.current())
    }

    /// Point the builder's debug location at the current location.
    pub(super) fn sync_debug_location(&mut self) {
        match self.location() {
            Some(location) => self.builder().set_current_debug_location(location),
            None => self.builder().unset_current_debug_location(),
        }
    }
}
