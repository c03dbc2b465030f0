// This module turns diagnostic locations into DWARF. One compile unit is created per context.
// Every function the context emits into gets a DISubprogram on first use, and every location
// label seen inside a function gets a lexical block whose DIFile is named after the label, so a
// location (label, line, column) maps to a DILocation scoped to that block. The context keeps the
// builder's current debug location in sync with its insertion point and location stack, which
// stamps every instruction, including those built directly through the LLVM builder. Once the
// module is finalized no new scopes are created; instructions emitted afterwards into functions
// without a scope carry no location.

//! DWARF debug info for emitted code.

use hashbrown::HashMap;
use inkwell::context::Context;
use inkwell::debug_info::{
    AsDIScope, DICompileUnit, DIFile, DIFlags, DIFlagsConstants, DILocation, DIScope,
    DISubprogram, DISubroutineType, DWARFEmissionKind, DWARFSourceLanguage, DebugInfoBuilder,
};
use inkwell::module::{FlagBehavior, Module};
use inkwell::values::FunctionValue;

use crate::core::Location;

/// Producer recorded in the compile unit.
pub const PRODUCER: &str = "cfg-jit";

const DEBUG_INFO_VERSION: u64 = 3;

/// Debug info builder and the scopes created so far.
pub struct DebugInfo<'ctx> {
    builder: DebugInfoBuilder<'ctx>,
    compile_unit: DICompileUnit<'ctx>,
    signature: DISubroutineType<'ctx>,
    subprograms: HashMap<String, DISubprogram<'ctx>>,
    blocks: HashMap<(String, String), DIScope<'ctx>>,
    files: HashMap<String, DIFile<'ctx>>,
    finalized: bool,
}

impl<'ctx> DebugInfo<'ctx> {
    pub fn new(llvm: &'ctx Context, module: &Module<'ctx>) -> Self {
        let unit_name = module.get_name().to_string_lossy().into_owned();
        let (builder, compile_unit) = module.create_debug_info_builder(
            true,
            DWARFSourceLanguage::C,
            &unit_name,
            ".",
            PRODUCER,
            false,
            "",
            0,
            "",
            DWARFEmissionKind::Full,
            0,
            false,
            false,
            "",
            "",
        );
        module.add_basic_value_flag(
            "Debug Info Version",
            FlagBehavior::Warning,
            llvm.i32_type().const_int(DEBUG_INFO_VERSION, false),
        );
        let signature =
            builder.create_subroutine_type(compile_unit.get_file(), None, &[], DIFlags::ZERO);

        Self {
            builder,
            compile_unit,
            signature,
            subprograms: HashMap::new(),
            blocks: HashMap::new(),
            files: HashMap::new(),
            finalized: false,
        }
    }

    pub fn compile_unit(&self) -> DICompileUnit<'ctx> {
        self.compile_unit
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Debug location of `location` inside `function`.
    ///
    /// `None` once finalized for functions that never received a scope.
    pub fn location(
        &mut self,
        llvm: &'ctx Context,
        function: FunctionValue<'ctx>,
        location: &Location,
    ) -> Option<DILocation<'ctx>> {
        let scope = self.scope(function, location)?;
        Some(self.builder.create_debug_location(
            llvm,
            location.line(),
            location.column(),
            scope,
            None,
        ))
    }

    fn scope(&mut self, function: FunctionValue<'ctx>, location: &Location) -> Option<DIScope<'ctx>> {
        let name = function.get_name().to_string_lossy().into_owned();
        let key = (name, location.label().to_string());
        if let Some(&scope) = self.blocks.get(&key) {
            return Some(scope);
        }
        if self.finalized {
            return None;
        }

        let subprogram = self.subprogram(function, &key.0);
        let file = self.file(location.label());
        let block = self.builder.create_lexical_block(
            subprogram.as_debug_info_scope(),
            file,
            location.line(),
            location.column(),
        );
        let scope = block.as_debug_info_scope();
        self.blocks.insert(key, scope);
        Some(scope)
    }

    fn subprogram(&mut self, function: FunctionValue<'ctx>, name: &str) -> DISubprogram<'ctx> {
        if let Some(&subprogram) = self.subprograms.get(name) {
            return subprogram;
        }
        let file = self.compile_unit.get_file();
        let subprogram = self.builder.create_function(
            self.compile_unit.as_debug_info_scope(),
            name,
            None,
            file,
            0,
            self.signature,
            false,
            true,
            0,
            DIFlags::ZERO,
            false,
        );
        function.set_subprogram(subprogram);
        log::trace!("debug scope for {}", name);
        self.subprograms.insert(name.to_string(), subprogram);
        subprogram
    }

    fn file(&mut self, label: &str) -> DIFile<'ctx> {
        if let Some(&file) = self.files.get(label) {
            return file;
        }
        let file = self.builder.create_file(label, ".");
        self.files.insert(label.to_string(), file);
        file
    }

    /// Resolve all pending debug metadata. Later calls do nothing.
    pub fn finalize(&mut self) {
        if !self.finalized {
            self.builder.finalize();
            self.finalized = true;
        }
    }
}
