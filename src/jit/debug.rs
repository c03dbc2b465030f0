// This module writes the debug artifacts of a finalized module. Given a base path, the bitcode
// reproducer is written first and the textual IR dump second, so a crash while printing still
// leaves something to recompile. Both are written before debug info is stripped, so the dump
// always shows instruction locations.

//! Debug artifacts written next to a configured base path.
//!
//! `<base>.reproduce.bc` holds the module as bitcode, which `llc` can
//! recompile offline; `<base>.debug.ll` is the human-readable textual IR.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use inkwell::module::Module;

use crate::core::{CompileError, CompileResult};

/// Path of the textual dump for `base`.
pub fn debug_path(base: &Path) -> PathBuf {
    with_suffix(base, ".debug.ll")
}

/// Path of the recompilable reproducer for `base`.
pub fn reproducer_path(base: &Path) -> PathBuf {
    with_suffix(base, ".reproduce.bc")
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Write the reproducer, then the textual dump, of `module`.
pub fn dump_artifacts(module: &Module<'_>, base: &Path) -> CompileResult<()> {
    let reproducer = reproducer_path(base);
    if !module.write_bitcode_to_path(reproducer.as_path()) {
        return Err(CompileError::DebugArtifact {
            path: reproducer,
            reason: "LLVM could not write bitcode".to_string(),
        });
    }

    let debug = debug_path(base);
    module
        .print_to_file(debug.as_path())
        .map_err(|e| CompileError::DebugArtifact {
            path: debug.clone(),
            reason: e.to_string(),
        })?;

    log::info!(
        "wrote debug artifacts {} and {}",
        reproducer.display(),
        debug.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names_extend_the_base() {
        let base = Path::new("/tmp/out/program");
        assert_eq!(debug_path(base), PathBuf::from("/tmp/out/program.debug.ll"));
        assert_eq!(reproducer_path(base), PathBuf::from("/tmp/out/program.reproduce.bc"));
    }

    #[test]
    fn test_existing_extension_is_kept() {
        let base = Path::new("hello.php");
        assert_eq!(debug_path(base), PathBuf::from("hello.php.debug.ll"));
    }
}
