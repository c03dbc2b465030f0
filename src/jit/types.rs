// This module implements the type registry of the compilation context: a mapping from native
// type names (the C-like spellings builtins and generated code use, such as "size_t" or
// "__string__*") to LLVM types. Explicitly registered names take precedence; any other name is
// resolved from a fixed table on first use and cached, so every name resolves at most once.
// Names outside the table are an error, never a silent default. Reverse lookups scan the
// entries in registration order and compare LLVM types structurally; since LLVM uniques its
// types, structurally equal registrations collapse onto the first registered name.

//! Native type registry.

use hashbrown::HashMap;
use inkwell::context::Context;
use inkwell::types::AnyTypeEnum;
use inkwell::AddressSpace;

use crate::core::{CompileError, CompileResult};

/// Names the registry resolves without an explicit registration.
pub const BUILTIN_TYPE_NAMES: [&str; 11] = [
    "void",
    "void*",
    "const char*",
    "char",
    "int",
    "long long",
    "size_t",
    "uint32_t",
    "bool",
    "char*",
    "char[1]",
];

/// Returned by reverse lookups that match no registered type.
pub const UNKNOWN_TYPE_NAME: &str = "unknown";

/// Bidirectional name to LLVM type mapping.
#[derive(Debug, Default)]
pub struct TypeRegistry<'ctx> {
    entries: Vec<(String, AnyTypeEnum<'ctx>)>,
    index: HashMap<String, usize>,
}

impl<'ctx> TypeRegistry<'ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the mapping for `name`.
    pub fn register(&mut self, name: &str, ty: AnyTypeEnum<'ctx>) {
        match self.index.get(name) {
            Some(&slot) => self.entries[slot].1 = ty,
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push((name.to_string(), ty));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<AnyTypeEnum<'ctx>> {
        self.index.get(name).map(|&slot| self.entries[slot].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First registered name whose type equals `ty`.
    pub fn name_of(&self, ty: AnyTypeEnum<'ctx>) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, registered)| *registered == ty)
            .map(|(name, _)| name.as_str())
    }

    /// Look `name` up, resolving it from the builtin table on a miss.
    pub fn resolve(&mut self, llvm: &'ctx Context, name: &str) -> CompileResult<AnyTypeEnum<'ctx>> {
        if let Some(ty) = self.get(name) {
            return Ok(ty);
        }
        let ty = self.builtin_type(llvm, name)?;
        log::debug!("resolved native type '{}'", name);
        self.register(name, ty);
        Ok(ty)
    }

    fn builtin_type(&mut self, llvm: &'ctx Context, name: &str) -> CompileResult<AnyTypeEnum<'ctx>> {
        // Pointers are opaque, so every pointer spelling is the same `ptr` type.
        let ptr = llvm.ptr_type(AddressSpace::default());
        let ty = match name {
            "void" => llvm.void_type().into(),
            "void*" | "const char*" | "char*" => ptr.into(),
            "char" => llvm.i8_type().into(),
            "int" | "uint32_t" => llvm.i32_type().into(),
            "long long" | "size_t" => llvm.i64_type().into(),
            "bool" => llvm.bool_type().into(),
            "char[1]" => match self.resolve(llvm, "char")? {
                AnyTypeEnum::IntType(char_type) => char_type.array_type(1).into(),
                _ => {
                    return Err(CompileError::UnsupportedNativeType {
                        name: name.to_string(),
                    })
                }
            },
            _ => {
                return Err(CompileError::UnsupportedNativeType {
                    name: name.to_string(),
                })
            }
        };
        Ok(ty)
    }
}
