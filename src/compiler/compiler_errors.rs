//! # Compiler Error Handling
//!
//! Unified error type for every stage of the Vetch toolchain. All error
//! construction goes through the `return_*_error!` macros so messages,
//! locations and categories stay consistent across the compiler and VM.
//!
//! The compiler is fail-fast: the first error terminates compilation, and
//! runtime failures (assert / fatal VM errors) are surfaced as the same type
//! so the driver has a single thing to print and turn into an exit code.

use crate::compiler::parsers::tokenizer::tokens::{CharPosition, TextLocation};
use colour::{e_dark_yellow_ln, e_magenta_ln, e_red_ln, e_yellow, e_yellow_ln};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Eq, Hash, PartialEq, Clone)]
pub enum ErrorMetaDataKey {
    VariableName,
    ExpectedType,
    FoundType,
}

#[derive(Debug, Clone)]
pub struct CompileError {
    pub msg: String,

    // Location of the offending token. The file path is attached at the
    // pipeline boundary once the module being compiled is known.
    pub location: TextLocation,
    pub file: PathBuf,
    pub error_type: ErrorType,

    // Structured details for tooling; not shown in the default output
    pub metadata: HashMap<ErrorMetaDataKey, String>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ErrorType {
    Syntax,
    Type,
    Rule,
    File,
    Compiler,
    Runtime,
}

pub fn error_type_to_str(e_type: &ErrorType) -> &'static str {
    match e_type {
        ErrorType::Syntax => "Syntax Error",
        ErrorType::Type => "Type Error",
        ErrorType::Rule => "Language Rule Violation",
        ErrorType::File => "File Error",
        ErrorType::Compiler => "Compiler Bug",
        ErrorType::Runtime => "Runtime Error",
    }
}

impl CompileError {
    pub fn new(msg: impl Into<String>, location: TextLocation, error_type: ErrorType) -> Self {
        CompileError {
            msg: msg.into(),
            location,
            file: PathBuf::new(),
            error_type,
            metadata: HashMap::new(),
        }
    }

    pub fn with_file_path(mut self, file_path: PathBuf) -> Self {
        if self.file.as_os_str().is_empty() {
            self.file = file_path;
        }
        self
    }

    /// Internal compiler bug, not the user's fault. Carries no source location.
    pub fn compiler_error(msg: impl Into<String>) -> Self {
        CompileError::new(msg, TextLocation::default(), ErrorType::Compiler)
    }

    /// Failure while executing a compiled program (assert, fatal VM error).
    pub fn runtime_error(msg: impl Into<String>) -> Self {
        CompileError::new(msg, TextLocation::default(), ErrorType::Runtime)
    }

    pub fn file_error(path: &std::path::Path, msg: impl Into<String>) -> Self {
        let mut e = CompileError::new(msg, TextLocation::default(), ErrorType::File);
        e.file = path.to_path_buf();
        e
    }

    pub fn new_metadata_entry(&mut self, key: ErrorMetaDataKey, value: impl Into<String>) {
        self.metadata.insert(key, value.into());
    }
}

pub fn print_formatted_error(e: &CompileError) {
    e_red_ln!("{}", error_type_to_str(&e.error_type));

    if !e.file.as_os_str().is_empty() {
        e_yellow!("{} ", e.file.display());
    }

    let CharPosition {
        line_number,
        char_column,
    } = e.location.start_pos;
    if line_number > 0 {
        e_yellow_ln!("(line {}, column {})", line_number, char_column);
    } else {
        eprintln!();
    }

    e_magenta_ln!("  {}", e.msg);

    for (key, value) in &e.metadata {
        e_dark_yellow_ln!("    {:?}: {}", key, value);
    }
}

/// Returns a new CompileError for malformed code that does not follow the
/// Vetch grammar.
///
/// Usage: `return_syntax_error!(location, "expected '{}'", token)`;
#[macro_export]
macro_rules! return_syntax_error {
    ($location:expr, $($arg:tt)*) => {
        return Err($crate::compiler::compiler_errors::CompileError::new(
            format!($($arg)*),
            $location,
            $crate::compiler::compiler_errors::ErrorType::Syntax,
        ))
    };
}

/// Returns a new CompileError for type system violations. Should mention both
/// the expected and the actual type where they are known.
///
/// Usage: `return_type_error!(location, "cannot convert '{}' to '{}'", a, b)`;
#[macro_export]
macro_rules! return_type_error {
    ($location:expr, $($arg:tt)*) => {
        return Err($crate::compiler::compiler_errors::CompileError::new(
            format!($($arg)*),
            $location,
            $crate::compiler::compiler_errors::ErrorType::Type,
        ))
    };
}

/// Returns a new CompileError for semantic rule violations: unknown names,
/// duplicate declarations, `break` outside a loop, const violations.
///
/// Usage: `return_rule_error!(location, "could not find variable '{}'", name)`;
#[macro_export]
macro_rules! return_rule_error {
    ($location:expr, $($arg:tt)*) => {
        return Err($crate::compiler::compiler_errors::CompileError::new(
            format!($($arg)*),
            $location,
            $crate::compiler::compiler_errors::ErrorType::Rule,
        ))
    };
}

/// Returns a new CompileError for internal compiler bugs. These indicate a
/// defect in the compiler itself rather than in the program being compiled.
#[macro_export]
macro_rules! return_compiler_error {
    ($($arg:tt)*) => {
        return Err($crate::compiler::compiler_errors::CompileError::compiler_error(
            format!($($arg)*),
        ))
    };
}
