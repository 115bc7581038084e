pub mod settings;

pub(crate) mod bytecode {
    pub(crate) mod opcodes;
    pub(crate) mod program;
}

pub(crate) mod compiler {
    pub(crate) mod builtins;
    pub(crate) mod compiler_dev_logging;
    pub(crate) mod compiler_errors;
    pub(crate) mod datatypes;
    pub(crate) mod module_dependencies;
    pub(crate) mod type_registry;
    pub(crate) mod variable_manager;

    pub(crate) mod parsers {
        pub(crate) mod ast_nodes;
        pub(crate) mod build_ast;
        pub(crate) mod parse_expression;

        pub(crate) mod tokenizer {
            pub(crate) mod tokenizer;
            pub(crate) mod tokens;
        }
    }

    pub(crate) mod codegen;
}

pub(crate) mod runtime {
    pub(crate) mod memory;
    pub(crate) mod vm;
}

pub(crate) mod compiler_tests {
    #[cfg(test)]
    pub(crate) mod codegen_tests;
    #[cfg(test)]
    pub(crate) mod tokenizer_tests;
    #[cfg(test)]
    pub(crate) mod type_system_tests;
    #[cfg(test)]
    pub(crate) mod variable_manager_tests;
    #[cfg(test)]
    pub(crate) mod vm_tests;
}

pub use bytecode::program::BytecodeProgram;
pub use compiler::compiler_errors::{print_formatted_error, CompileError, ErrorType};
pub use runtime::vm::run_program;

use crate::compiler::codegen::compile;
use crate::compiler::module_dependencies::resolve_module_dependencies;
use crate::compiler::parsers::ast_nodes::Ast;
use crate::compiler::parsers::tokenizer::tokenizer::tokenize;
use crate::compiler::parsers::tokenizer::tokens::TokenStream;
use crate::settings::Config;
use std::path::Path;

#[derive(PartialEq, Debug)]
pub enum Flag {
    ShowTokens,
    ShowAst,
    ShowBytecode,
    DisableTimers,
    Debug,
}

pub struct Compiler<'a> {
    config: &'a Config,
}

impl<'a> Compiler<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// TOKENIZER
    /// ---------
    pub fn source_to_tokens(&self, source_code: &str) -> Result<TokenStream, CompileError> {
        tokenize(source_code)
    }

    /// AST CREATION
    /// ------------
    pub fn tokens_to_ast(&self, tokens: &mut TokenStream) -> Result<Ast, CompileError> {
        Ast::new(tokens)
    }

    /// CODE GENERATION
    /// ---------------
    /// Type checking, template instantiation and bytecode emission all
    /// happen in this single AST walk.
    pub fn ast_to_bytecode(&self, ast: &Ast) -> Result<BytecodeProgram, CompileError> {
        compile(ast, self.config)
    }

    /// Compile a single source string (no import resolution)
    pub fn compile_source(&self, source_code: &str) -> Result<BytecodeProgram, CompileError> {
        let mut tokens = self.source_to_tokens(source_code)?;
        let ast = self.tokens_to_ast(&mut tokens)?;
        self.ast_to_bytecode(&ast)
    }

    /// Compile an entry-point file and everything it imports
    pub fn compile_file(&self, path: &Path) -> Result<BytecodeProgram, CompileError> {
        let ast = resolve_module_dependencies(path)?;
        self.ast_to_bytecode(&ast)
            .map_err(|e| e.with_file_path(path.to_path_buf()))
    }
}
