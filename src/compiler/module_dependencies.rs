//! Import resolution.
//!
//! `import "file.vch";` splices the imported module's statements ahead of
//! the importing module's, depth-first, with each file loaded at most once.
//! The result is a single flat module handed to the code generator, which
//! never sees an import statement.

use crate::compiler::compiler_errors::CompileError;
use crate::compiler::parsers::ast_nodes::{Ast, Statement, StatementKind};
use crate::compiler::parsers::tokenizer::tokenizer::tokenize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Load a source file and every file it imports into one module.
pub fn resolve_module_dependencies(entry_point: &Path) -> Result<Ast, CompileError> {
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let statements = load_module(entry_point, &mut visited)?;
    Ok(Ast { statements })
}

fn load_module(
    path: &Path,
    visited: &mut HashSet<PathBuf>,
) -> Result<Vec<Statement>, CompileError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| CompileError::file_error(path, format!("could not resolve path: {}", e)))?;
    if !visited.insert(canonical) {
        return Ok(Vec::new());
    }

    let source_code = fs::read_to_string(path)
        .map_err(|e| CompileError::file_error(path, format!("could not read file: {}", e)))?;

    let mut tokens = tokenize(&source_code).map_err(|e| e.with_file_path(path.to_path_buf()))?;
    let ast = Ast::new(&mut tokens).map_err(|e| e.with_file_path(path.to_path_buf()))?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut statements = Vec::new();
    for statement in ast.statements {
        match statement.kind {
            StatementKind::Import {
                path: ref import_path,
            } => {
                let target = base_dir.join(import_path);
                statements.extend(load_module(&target, visited)?);
            }
            _ => statements.push(statement),
        }
    }
    Ok(statements)
}
