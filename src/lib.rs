//! Sinter Compiler Library
//!
//! Whole-program ahead-of-time compilation from Sinter source to
//! textual LLVM IR, and from there to a native executable via `clang`.
//!
//! The pipeline is five fixed stages, each with its own error type
//! (see [`error`]): lex, parse, [`analyzer::analyze`] (four passes:
//! class/interface registration, hierarchy resolution, member
//! analysis, function analysis), [`pointer_lint::validate`]
//! (flow-sensitive allocate/release/clean tracking), then
//! [`codegen::generate`].

pub mod analyzer;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod pointer_lint;
pub mod symtab;
pub mod token;
pub mod types;

pub use ast::Program;
pub use error::{Diagnostic, Severity, SinterError};

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

/// Minimum clang/LLVM version required. Generated IR uses opaque
/// pointers (`ptr`), which requires LLVM 15+.
const MIN_CLANG_VERSION: u32 = 15;

static CLANG_VERSION_CHECKED: OnceLock<Result<u32, String>> = OnceLock::new();

/// Checks that clang is available and meets the minimum version
/// requirement. Cached - runs the subprocess at most once per process.
fn check_clang_version() -> Result<u32, String> {
    CLANG_VERSION_CHECKED
        .get_or_init(|| {
            let output = Command::new("clang").arg("--version").output().map_err(|e| {
                format!(
                    "Failed to run clang: {}. Please install clang {} or later.",
                    e, MIN_CLANG_VERSION
                )
            })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(format!(
                    "clang --version failed with exit code {:?}: {}",
                    output.status.code(),
                    stderr
                ));
            }

            let version_str = String::from_utf8_lossy(&output.stdout);
            let version = parse_clang_version(&version_str).ok_or_else(|| {
                format!(
                    "Could not parse clang version from: {}\nsinterc requires clang {} or later (for opaque pointer support).",
                    version_str.lines().next().unwrap_or(&version_str),
                    MIN_CLANG_VERSION
                )
            })?;

            let is_apple = version_str.contains("Apple clang");
            let effective_min = if is_apple { 14 } else { MIN_CLANG_VERSION };
            if version < effective_min {
                return Err(format!(
                    "clang version {} detected, but sinterc requires {} {} or later.",
                    version,
                    if is_apple { "Apple clang" } else { "clang" },
                    effective_min
                ));
            }
            Ok(version)
        })
        .clone()
}

fn parse_clang_version(output: &str) -> Option<u32> {
    for line in output.lines() {
        if line.contains("clang version")
            && let Some(idx) = line.find("version ")
        {
            let after_version = &line[idx + 8..];
            let major: String = after_version.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !major.is_empty() {
                return major.parse().ok();
            }
        }
    }
    None
}

/// Result of a successful in-memory compilation: the generated IR text
/// plus any warnings accumulated along the way (spec §7: warnings never
/// abort compilation).
pub struct CompileOutput {
    pub ir: String,
    pub warnings: Vec<Diagnostic>,
}

/// Runs the full pipeline on already-loaded source text, stopping at IR
/// text (no clang invocation).
pub fn compile_to_ir(source: &str) -> Result<CompileOutput, SinterError> {
    let tokens = lexer::lex(source)?;
    let program = parser::parse(tokens)?;

    let analysis = analyzer::analyze(&program)?;
    let cleanup_warnings = pointer_lint::validate(&program)?;

    let ir = codegen::generate(&analysis.registry, analysis.symbols, &program)?;

    let mut warnings = analysis.warnings;
    warnings.extend(cleanup_warnings);
    Ok(CompileOutput { ir, warnings })
}

/// Compiles a `.sin` source file to IR text.
pub fn compile_file_to_ir(source_path: &Path) -> Result<CompileOutput, String> {
    let source = fs::read_to_string(source_path).map_err(|e| format!("Failed to read source file: {}", e))?;
    compile_to_ir(&source).map_err(|e| e.to_string())
}

/// Compiles a `.sin` source file all the way to a native executable by
/// shelling out to `clang` on the generated IR.
pub fn compile_file(source_path: &Path, output_path: &Path, keep_ir: bool) -> Result<(), String> {
    let output = compile_file_to_ir(source_path)?;
    for w in &output.warnings {
        eprintln!("{}", w);
    }

    let ir_path = output_path.with_extension("ll");
    fs::write(&ir_path, &output.ir).map_err(|e| format!("Failed to write IR file: {}", e))?;

    check_clang_version()?;

    let clang_output = Command::new("clang")
        .arg("-O0")
        .arg(&ir_path)
        .arg("-o")
        .arg(output_path)
        .output()
        .map_err(|e| format!("Failed to run clang: {}", e))?;

    if !keep_ir {
        fs::remove_file(&ir_path).ok();
    }

    if !clang_output.status.success() {
        let stderr = String::from_utf8_lossy(&clang_output.stderr);
        return Err(format!("Clang compilation failed:\n{}", stderr));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clang_version_standard() {
        let output = "clang version 15.0.0 (https://github.com/llvm/llvm-project)\nTarget: x86_64";
        assert_eq!(parse_clang_version(output), Some(15));
    }

    #[test]
    fn test_parse_clang_version_apple() {
        let output = "Apple clang version 14.0.3 (clang-1403.0.22.14.1)\nTarget: arm64-apple-darwin";
        assert_eq!(parse_clang_version(output), Some(14));
    }

    #[test]
    fn test_parse_clang_version_invalid() {
        assert_eq!(parse_clang_version("no version here"), None);
    }

    #[test]
    fn empty_class_compiles_to_ir_containing_its_struct() {
        let source = "class Empty { }\nfunction void main() { }\n";
        let output = compile_to_ir(source).unwrap();
        assert!(output.ir.contains("%class.Empty = type { ptr }"));
    }
}
