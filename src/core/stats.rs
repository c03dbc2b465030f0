// This module provides instrumentation for a compilation context. ContextStats counts what
// the context created and emitted: resolved native types, pooled integer constants, raw
// string literals, managed string constants together with the allocation and deallocation
// sequences they scheduled into the lifecycle blocks, function registrations, invocations of
// the native compiler, and an ordered log of builtin phase invocations. Tests rely on these
// counters to check the caching and single-shot guarantees of the context.

//! Compilation context statistics.

use std::fmt;

/// Counters collected over the lifetime of a compilation context.
#[derive(Debug, Default, Clone)]
pub struct ContextStats {
    /// Native type names resolved from the builtin table.
    pub types_resolved: usize,

    /// Distinct integer constants created.
    pub integer_constants: usize,

    /// Distinct raw string literals created.
    pub string_literals: usize,

    /// Distinct managed string constants created.
    pub managed_constants: usize,

    /// Allocation sequences appended to the init block.
    pub managed_allocations: usize,

    /// Deallocation calls appended to the shutdown block.
    pub managed_deallocations: usize,

    /// Function registry insertions, including overwrites.
    pub functions_registered: usize,

    /// Invocations of the native compiler.
    pub native_compiles: usize,

    /// Builtin phase invocations in execution order, as `builtin::phase`.
    pub phase_log: Vec<String>,
}

impl ContextStats {
    /// Record a builtin phase invocation.
    pub fn record_phase(&mut self, builtin: &str, phase: &str) {
        self.phase_log.push(format!("{}::{}", builtin, phase));
    }

    /// Record a managed constant together with its init/shutdown emissions.
    pub fn record_managed_constant(&mut self) {
        self.managed_constants += 1;
        self.managed_allocations += 1;
        self.managed_deallocations += 1;
    }

    /// Index of the first logged invocation of `phase`, if any.
    pub fn first_phase(&self, phase: &str) -> Option<usize> {
        let suffix = format!("::{}", phase);
        self.phase_log.iter().position(|entry| entry.ends_with(&suffix))
    }

    /// Index of the last logged invocation of `phase`, if any.
    pub fn last_phase(&self, phase: &str) -> Option<usize> {
        let suffix = format!("::{}", phase);
        self.phase_log.iter().rposition(|entry| entry.ends_with(&suffix))
    }
}

impl fmt::Display for ContextStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Context Statistics:")?;
        writeln!(f, "  Types resolved: {}", self.types_resolved)?;
        writeln!(f, "  Integer constants: {}", self.integer_constants)?;
        writeln!(f, "  String literals: {}", self.string_literals)?;
        writeln!(f, "  Managed constants: {}", self.managed_constants)?;
        writeln!(
            f,
            "  Managed allocations/deallocations: {}/{}",
            self.managed_allocations, self.managed_deallocations
        )?;
        writeln!(f, "  Functions registered: {}", self.functions_registered)?;
        writeln!(f, "  Native compiles: {}", self.native_compiles)?;
        writeln!(f, "  Builtin phases run: {}", self.phase_log.len())?;
        Ok(())
    }
}
