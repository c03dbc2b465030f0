// This module provides CompilationContext, the owner of everything needed to lower one
// compilation unit through LLVM. Construction creates the LLVM module (the native handle the
// context exclusively owns and releases on drop), roots the diagnostic location stack at
// "Unknown", instantiates the foundational builtins (refcount, memory, output, managed types)
// and runs the builtin pipeline: a register sweep over every builtin, then for standalone
// contexts an implement sweep, the declaration of the __init__/__shutdown__ lifecycle
// functions and an initialize sweep. Each phase invocation is bracketed by a pushed location
// that is popped whatever the phase returns. The context also hosts the type and function
// registries and the backend options, and finalizes exactly once: compile_in_place seals the
// lifecycle blocks and the debug info, optionally dumps debug artifacts, strips the DWARF
// unless debug info was requested, verifies the module, invokes MCJIT and memoizes the result.

//! Compilation context and builtin pipeline.

use std::path::{Path, PathBuf};

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::execution_engine::ExecutionEngine;
use inkwell::module::{Linkage, Module};
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
};
use inkwell::types::{
    AnyTypeEnum, BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, StructType,
};
use inkwell::OptimizationLevel;

use crate::builtin::{Builtin, ManagedType, MemoryManager, Output, Phase, Refcount};
use crate::core::{AbstractType, CompileError, CompileResult, ContextStats, Location, LocationStack};

use super::constants::ConstantPools;
use super::debug;
use super::debug_info::DebugInfo;
use super::func::{Func, FunctionRegistry};
use super::options::{BackendOption, BackendOptions, OptionValue};
use super::result::{CompiledResult, LoadType};
use super::types::{TypeRegistry, UNKNOWN_TYPE_NAME};

/// Exported global setup entry point.
pub const INIT_FUNCTION: &str = "__init__";

/// Exported global teardown entry point.
pub const SHUTDOWN_FUNCTION: &str = "__shutdown__";

const MODULE_NAME: &str = "jit";

/// Lifecycle functions and their single blocks.
#[derive(Debug, Clone, Copy)]
struct Lifecycle<'ctx> {
    init: Func<'ctx>,
    init_block: BasicBlock<'ctx>,
    shutdown: Func<'ctx>,
    shutdown_block: BasicBlock<'ctx>,
}

/// Boxed builtin held by a context.
pub type BoxedBuiltin<'ctx> = Box<dyn Builtin<'ctx> + 'ctx>;

/// Owner of one compilation unit's LLVM module and everything emitted into it.
pub struct CompilationContext<'ctx> {
    /// Scopes and locations for emitted code. Declared first so the DWARF
    /// builder goes before the module it was created from.
    debug_info: DebugInfo<'ctx>,

    /// Memoized finalization output. Declared first so the engine is
    /// released before the module it took over.
    result: Option<CompiledResult<'ctx>>,

    llvm: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    load_type: LoadType,

    /// Present for standalone contexts once the implement sweep is done.
    lifecycle: Option<Lifecycle<'ctx>>,
    /// Set once the lifecycle blocks carry their terminators.
    sealed: bool,

    locations: LocationStack,
    types: TypeRegistry<'ctx>,
    functions: FunctionRegistry<'ctx>,
    pub(super) constants: ConstantPools<'ctx>,
    builtins: Vec<BoxedBuiltin<'ctx>>,

    options: BackendOptions,
    debug_file: Option<PathBuf>,
    /// Keep DWARF in the finalized module.
    debug_enabled: bool,

    pub(super) stats: ContextStats,
}

impl<'ctx> CompilationContext<'ctx> {
    /// Create a context with the foundational builtins and run their pipeline.
    pub fn new(llvm: &'ctx Context, load_type: LoadType) -> CompileResult<Self> {
        Self::with_builtins(llvm, load_type, Vec::new())
    }

    /// Like [`CompilationContext::new`], with `extra` builtins registered
    /// after the foundational ones.
    pub fn with_builtins(
        llvm: &'ctx Context,
        load_type: LoadType,
        extra: Vec<BoxedBuiltin<'ctx>>,
    ) -> CompileResult<Self> {
        let module = llvm.create_module(MODULE_NAME);
        let mut ctx = Self {
            debug_info: DebugInfo::new(llvm, &module),
            result: None,
            llvm,
            module,
            builder: llvm.create_builder(),
            load_type,
            lifecycle: None,
            sealed: false,
            locations: LocationStack::new(Location::unknown()),
            types: TypeRegistry::new(),
            functions: FunctionRegistry::new(),
            constants: ConstantPools::default(),
            builtins: Vec::new(),
            options: BackendOptions::new(),
            debug_file: None,
            debug_enabled: false,
            stats: ContextStats::default(),
        };

        ctx.register_builtin(Box::new(Refcount::new(load_type)));
        ctx.register_builtin(Box::new(MemoryManager::new(load_type)));
        ctx.register_builtin(Box::new(Output::new(load_type)));
        ctx.register_builtin(Box::new(ManagedType::new(load_type)));
        for builtin in extra {
            ctx.register_builtin(builtin);
        }

        ctx.define_builtins()?;
        Ok(ctx)
    }

    fn register_builtin(&mut self, builtin: BoxedBuiltin<'ctx>) {
        self.builtins.push(builtin);
    }

    fn define_builtins(&mut self) -> CompileResult<()> {
        let mut builtins = std::mem::take(&mut self.builtins);
        let outcome = self.run_pipeline(&mut builtins);
        self.builtins = builtins;
        outcome
    }

    fn run_pipeline(&mut self, builtins: &mut [BoxedBuiltin<'ctx>]) -> CompileResult<()> {
        // Each sweep completes for every builtin before the next begins, so a
        // phase may rely on what any builtin did in the previous one.
        self.run_phase(builtins, Phase::Register)?;
        if self.load_type == LoadType::Import {
            log::debug!("import context: skipping builtin implementation");
            return Ok(());
        }
        self.run_phase(builtins, Phase::Implement)?;
        self.declare_lifecycle()?;
        self.run_phase(builtins, Phase::Initialize)
    }

    fn run_phase(&mut self, builtins: &mut [BoxedBuiltin<'ctx>], phase: Phase) -> CompileResult<()> {
        for builtin in builtins.iter_mut() {
            let name = builtin.name().to_string();
            log::debug!("builtin {}::{}", name, phase);
            self.push_location(format!("{}::{}", name, phase), 1, 1);
            self.stats.record_phase(&name, phase.as_str());

            let outcome = match phase {
                Phase::Register => builtin.register(self),
                Phase::Implement => builtin.implement(self),
                Phase::Initialize => match self.init_function() {
                    Some(init) => builtin.initialize(self, init),
                    None => Err(CompileError::ImportContext {
                        operation: "builtin initialization",
                    }),
                },
            };

            self.pop_location();
            outcome?;
        }
        Ok(())
    }

    fn declare_lifecycle(&mut self) -> CompileResult<()> {
        let init = self.declare_function(INIT_FUNCTION, "void", &[])?;
        let init_block = self.llvm.append_basic_block(init.value(), "initblock");
        let shutdown = self.declare_function(SHUTDOWN_FUNCTION, "void", &[])?;
        let shutdown_block = self.llvm.append_basic_block(shutdown.value(), "shutdownblock");
        self.lifecycle = Some(Lifecycle {
            init,
            init_block,
            shutdown,
            shutdown_block,
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn llvm(&self) -> &'ctx Context {
        self.llvm
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn builder(&self) -> &Builder<'ctx> {
        &self.builder
    }

    pub fn load_type(&self) -> LoadType {
        self.load_type
    }

    pub fn init_function(&self) -> Option<Func<'ctx>> {
        self.lifecycle.map(|l| l.init)
    }

    pub fn shutdown_function(&self) -> Option<Func<'ctx>> {
        self.lifecycle.map(|l| l.shutdown)
    }

    pub fn init_block(&self) -> Option<BasicBlock<'ctx>> {
        self.lifecycle.map(|l| l.init_block)
    }

    pub fn shutdown_block(&self) -> Option<BasicBlock<'ctx>> {
        self.lifecycle.map(|l| l.shutdown_block)
    }

    /// Lifecycle blocks that are still open for emission.
    pub(super) fn open_lifecycle_blocks(
        &self,
        operation: &'static str,
    ) -> CompileResult<(BasicBlock<'ctx>, BasicBlock<'ctx>)> {
        if self.sealed {
            return Err(CompileError::CodeGeneration {
                reason: format!("{} after the lifecycle blocks were sealed", operation),
            });
        }
        match (self.load_type, self.lifecycle) {
            (_, Some(l)) => Ok((l.init_block, l.shutdown_block)),
            (LoadType::Import, None) => Err(CompileError::ImportContext { operation }),
            (LoadType::Standalone, None) => Err(CompileError::CodeGeneration {
                reason: format!("{} before the lifecycle functions were declared", operation),
            }),
        }
    }

    pub fn stats(&self) -> &ContextStats {
        &self.stats
    }

    pub fn constants(&self) -> &ConstantPools<'ctx> {
        &self.constants
    }

    pub fn is_compiled(&self) -> bool {
        self.result.is_some()
    }

    // ---------------------------------------------------------------------
    // Diagnostic locations
    // ---------------------------------------------------------------------

    pub fn push_location(&mut self, label: impl Into<String>, line: u32, column: u32) {
        self.locations.push(label, line, column);
        self.sync_debug_location();
    }

    pub fn pop_location(&mut self) -> Option<Location> {
        let left = self.locations.pop();
        self.sync_debug_location();
        left
    }

    pub fn current_location(&self) -> &Location {
        self.locations.current()
    }

    pub fn location_depth(&self) -> usize {
        self.locations.depth()
    }

    pub(super) fn debug_parts(&mut self) -> (&mut DebugInfo<'ctx>, &LocationStack) {
        (&mut self.debug_info, &self.locations)
    }

    pub fn debug_info(&self) -> &DebugInfo<'ctx> {
        &self.debug_info
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    /// Base path for debug artifacts written by `compile_in_place`.
    pub fn set_debug_file(&mut self, path: impl Into<PathBuf>) {
        self.debug_file = Some(path.into());
    }

    pub fn debug_file(&self) -> Option<&Path> {
        self.debug_file.as_deref()
    }

    /// Keep DWARF line info in the compiled code. Locations are tracked
    /// either way; without this they only show up in debug artifacts.
    pub fn set_debug(&mut self, enabled: bool) {
        self.debug_enabled = enabled;
    }

    pub fn is_debug(&self) -> bool {
        self.debug_enabled
    }

    /// Forward an integer option to the native backend.
    pub fn set_option(&mut self, option: BackendOption, value: impl Into<OptionValue>) -> CompileResult<()> {
        self.options.set(option, value.into())
    }

    pub fn option(&self, option: BackendOption) -> Option<i64> {
        self.options.get(option)
    }

    // ---------------------------------------------------------------------
    // Function registry
    // ---------------------------------------------------------------------

    pub fn register_function(&mut self, name: &str, func: Func<'ctx>) {
        if self.functions.register(name, func).is_some() {
            log::warn!("function {} registered again, previous handle replaced", name);
        }
        self.stats.functions_registered += 1;
    }

    pub fn lookup_function(&self, name: &str) -> CompileResult<Func<'ctx>> {
        self.functions.lookup(name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    /// Declare `name` in the module from native type names and register it.
    ///
    /// An existing module function of that name is reused, so several
    /// builtins may declare the same libc symbol.
    pub fn declare_function(&mut self, name: &str, ret: &str, params: &[&str]) -> CompileResult<Func<'ctx>> {
        let value = match self.module.get_function(name) {
            Some(existing) => existing,
            None => {
                let fn_type = self.fn_type(ret, params)?;
                self.module.add_function(name, fn_type, Some(Linkage::External))
            }
        };
        let func = Func::new(value);
        self.register_function(name, func);
        Ok(func)
    }

    // ---------------------------------------------------------------------
    // Type registry
    // ---------------------------------------------------------------------

    pub fn register_type(&mut self, name: &str, ty: AnyTypeEnum<'ctx>) {
        self.types.register(name, ty);
    }

    /// Native type for `name`, resolved once and cached.
    pub fn type_from_string(&mut self, name: &str) -> CompileResult<AnyTypeEnum<'ctx>> {
        let cached = self.types.contains(name);
        let ty = self.types.resolve(self.llvm, name)?;
        if !cached {
            self.stats.types_resolved += 1;
        }
        Ok(ty)
    }

    /// Native type for `name`, which must be usable as a value.
    pub fn basic_type_from_string(&mut self, name: &str) -> CompileResult<BasicTypeEnum<'ctx>> {
        let ty = self.type_from_string(name)?;
        BasicTypeEnum::try_from(ty).map_err(|_| CompileError::UnsupportedNativeType {
            name: name.to_string(),
        })
    }

    /// Registered struct type `name`.
    pub fn struct_type_from_string(&mut self, name: &str) -> CompileResult<StructType<'ctx>> {
        match self.type_from_string(name)? {
            AnyTypeEnum::StructType(ty) => Ok(ty),
            _ => Err(CompileError::UnsupportedNativeType {
                name: name.to_string(),
            }),
        }
    }

    /// Native representation of an abstract value type.
    pub fn type_from_type(&mut self, ty: AbstractType) -> CompileResult<AnyTypeEnum<'ctx>> {
        let name = match ty {
            AbstractType::Long => "long long",
            AbstractType::String => crate::builtin::managed::STRING_PTR,
            other => return Err(CompileError::UnsupportedAbstractType { ty: other }),
        };
        self.type_from_string(name)
    }

    /// Registered name of `ty`, or `"unknown"`. Diagnostics only.
    pub fn string_from_type(&self, ty: AnyTypeEnum<'ctx>) -> &str {
        self.types.name_of(ty).unwrap_or(UNKNOWN_TYPE_NAME)
    }

    /// Function type built from native type names.
    pub fn fn_type(&mut self, ret: &str, params: &[&str]) -> CompileResult<FunctionType<'ctx>> {
        let params = params
            .iter()
            .map(|param| self.basic_type_from_string(param).map(Into::into))
            .collect::<CompileResult<Vec<BasicMetadataTypeEnum<'ctx>>>>()?;
        match self.type_from_string(ret)? {
            AnyTypeEnum::VoidType(void) => Ok(void.fn_type(&params, false)),
            other => {
                let ret = BasicTypeEnum::try_from(other).map_err(|_| CompileError::UnsupportedNativeType {
                    name: ret.to_string(),
                })?;
                Ok(ret.fn_type(&params, false))
            }
        }
    }

    // ---------------------------------------------------------------------
    // Finalization
    // ---------------------------------------------------------------------

    /// Compile the module once and return the memoized result.
    pub fn compile_in_place(&mut self) -> CompileResult<&CompiledResult<'ctx>> {
        if self.result.is_none() {
            self.seal()?;
            if let Some(base) = &self.debug_file {
                debug::dump_artifacts(&self.module, base)?;
            }
            self.strip_unrequested_debug_info();
            self.module.verify().map_err(|e| CompileError::Verification {
                reason: e.to_string(),
            })?;
            let engine = self.native_compile()?;
            self.result = Some(CompiledResult::new(engine, self.load_type));
        }
        self.result.as_ref().ok_or_else(|| CompileError::Backend {
            reason: "no compilation result".to_string(),
        })
    }

    /// Write the module as a native object file for the host.
    pub fn emit_object(&mut self, path: &Path) -> CompileResult<()> {
        self.seal()?;
        self.strip_unrequested_debug_info();
        let machine = host_target_machine(self.options.optimization_level())?;
        self.module.set_triple(&machine.get_triple());
        self.module
            .set_data_layout(&machine.get_target_data().get_data_layout());
        machine
            .write_to_file(&self.module, FileType::Object, path)
            .map_err(|e| CompileError::Backend {
                reason: format!("failed to write {}: {}", path.display(), e),
            })?;
        log::info!("wrote object file {}", path.display());
        Ok(())
    }

    /// Terminate the lifecycle blocks and resolve the debug info; later
    /// calls do nothing.
    fn seal(&mut self) -> CompileResult<()> {
        if self.sealed {
            return Ok(());
        }
        if let Some(lifecycle) = self.lifecycle {
            for block in [lifecycle.init_block, lifecycle.shutdown_block] {
                self.in_block(block, |ctx| {
                    ctx.builder.build_return(None)?;
                    Ok(())
                })?;
            }
        }
        self.debug_info.finalize();
        self.sealed = true;
        Ok(())
    }

    fn strip_unrequested_debug_info(&mut self) {
        if !self.debug_enabled && self.module.strip_debug_info() {
            log::debug!("stripped debug info from module");
        }
    }

    fn native_compile(&mut self) -> CompileResult<ExecutionEngine<'ctx>> {
        Target::initialize_native(&InitializationConfig::default())
            .map_err(|reason| CompileError::Backend { reason })?;
        ExecutionEngine::link_in_mc_jit();

        let level = self.options.optimization_level();
        log::info!(
            "compiling {:?} module with optimization level {:?}",
            self.load_type,
            level
        );
        let engine = self
            .module
            .create_jit_execution_engine(level)
            .map_err(|e| CompileError::Backend {
                reason: e.to_string(),
            })?;
        self.stats.native_compiles += 1;
        Ok(engine)
    }
}

fn host_target_machine(level: OptimizationLevel) -> CompileResult<TargetMachine> {
    Target::initialize_native(&InitializationConfig::default())
        .map_err(|reason| CompileError::Backend { reason })?;

    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple).map_err(|e| CompileError::Backend {
        reason: e.to_string(),
    })?;
    let cpu = TargetMachine::get_host_cpu_name();
    let features = TargetMachine::get_host_cpu_features();

    target
        .create_target_machine(
            &triple,
            cpu.to_str().unwrap_or("generic"),
            features.to_str().unwrap_or(""),
            level,
            RelocMode::PIC,
            CodeModel::Default,
        )
        .ok_or_else(|| CompileError::Backend {
            reason: "failed to create target machine".to_string(),
        })
}
