// This module stores the integer backend options a context collects before finalization.
// Options are keyed by an opaque numeric id and kept verbatim. At compile time the context
// reads the ones it understands; today that is only the optimization level, which maps onto
// the four inkwell OptimizationLevel values.

//! Integer options forwarded to the native compile step.
//!
//! Option ids are opaque to the context: every integer value is stored
//! verbatim under its id, and only the ids the backend knows about are
//! consulted when the module is compiled.

use std::fmt;

use hashbrown::HashMap;
use inkwell::OptimizationLevel;

use crate::core::{CompileError, CompileResult};

/// Identifier of a native backend option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendOption(u32);

impl BackendOption {
    /// Code generation optimization level, 0 to 3.
    pub const OPTIMIZATION_LEVEL: Self = Self(0);

    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BackendOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::OPTIMIZATION_LEVEL => f.write_str("optimization-level"),
            Self(id) => write!(f, "#{}", id),
        }
    }
}

/// A value supplied for a backend option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl OptionValue {
    pub fn kind(&self) -> &'static str {
        match self {
            OptionValue::Int(_) => "int",
            OptionValue::Bool(_) => "bool",
            OptionValue::Str(_) => "string",
        }
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(value.into())
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

/// Integer option values keyed by option id.
#[derive(Debug, Default)]
pub struct BackendOptions {
    ints: HashMap<BackendOption, i64>,
}

impl BackendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an integer option; any other value kind is rejected.
    pub fn set(&mut self, option: BackendOption, value: OptionValue) -> CompileResult<()> {
        match value {
            OptionValue::Int(value) => {
                log::debug!("backend option {} = {}", option, value);
                self.ints.insert(option, value);
                Ok(())
            }
            other => Err(CompileError::UnsupportedOptionValue {
                option: option.id(),
                kind: other.kind(),
            }),
        }
    }

    pub fn get(&self, option: BackendOption) -> Option<i64> {
        self.ints.get(&option).copied()
    }

    /// Optimization level for the native compiler, `None` unless set.
    pub fn optimization_level(&self) -> OptimizationLevel {
        match self.get(BackendOption::OPTIMIZATION_LEVEL) {
            None => OptimizationLevel::None,
            Some(level) if level <= 0 => OptimizationLevel::None,
            Some(1) => OptimizationLevel::Less,
            Some(2) => OptimizationLevel::Default,
            Some(_) => OptimizationLevel::Aggressive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_values_are_stored_verbatim() {
        let mut options = BackendOptions::new();
        let custom = BackendOption::from_raw(42);
        options.set(custom, OptionValue::from(-7i64)).unwrap();
        assert_eq!(options.get(custom), Some(-7));
        assert_eq!(options.get(BackendOption::OPTIMIZATION_LEVEL), None);
    }

    #[test]
    fn test_non_integer_values_are_rejected() {
        let mut options = BackendOptions::new();
        let err = options
            .set(BackendOption::OPTIMIZATION_LEVEL, OptionValue::from("fast"))
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnsupportedOptionValue { option: 0, kind: "string" }
        ));

        let err = options
            .set(BackendOption::OPTIMIZATION_LEVEL, true.into())
            .unwrap_err();
        assert!(err.to_string().contains("bool"));
        assert_eq!(options.get(BackendOption::OPTIMIZATION_LEVEL), None);
    }

    #[test]
    fn test_optimization_level_mapping() {
        let mut options = BackendOptions::new();
        assert_eq!(options.optimization_level(), OptimizationLevel::None);
        options.set(BackendOption::OPTIMIZATION_LEVEL, 2i64.into()).unwrap();
        assert_eq!(options.optimization_level(), OptimizationLevel::Default);
        options.set(BackendOption::OPTIMIZATION_LEVEL, 9i64.into()).unwrap();
        assert_eq!(options.optimization_level(), OptimizationLevel::Aggressive);
    }

    #[test]
    fn test_display() {
        assert_eq!(BackendOption::OPTIMIZATION_LEVEL.to_string(), "optimization-level");
        assert_eq!(BackendOption::from_raw(5).to_string(), "#5");
    }
}
