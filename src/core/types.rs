//! Abstract value types handed over by the front-end's type inference.
//!
//! The backend only gives a native representation to a subset of these;
//! see `CompilationContext::type_from_type`.

use std::fmt;

/// Abstract kind of a value in the source program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbstractType {
    Unknown,
    Null,
    Bool,
    Long,
    Double,
    String,
    Array,
    Object,
    Mixed,
}

impl AbstractType {
    /// Name used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            AbstractType::Unknown => "unknown",
            AbstractType::Null => "null",
            AbstractType::Bool => "bool",
            AbstractType::Long => "int",
            AbstractType::Double => "float",
            AbstractType::String => "string",
            AbstractType::Array => "array",
            AbstractType::Object => "object",
            AbstractType::Mixed => "mixed",
        }
    }
}

impl fmt::Display for AbstractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_source_names() {
        assert_eq!(AbstractType::Long.to_string(), "int");
        assert_eq!(AbstractType::Double.to_string(), "float");
        assert_eq!(AbstractType::String.to_string(), "string");
    }
}
