//! Code generation: walks the AST and emits bytecode for the stack machine.
//!
//! The [`Codegen`] aggregate owns everything the walk needs: the type
//! registry, the function table, the read-only data segment, the template
//! stashes and the stack of currently-open function/struct contexts. There
//! is no global state; one `Codegen` is built per compilation and consumed
//! into the final [`BytecodeProgram`].
//!
//! Expressions compile in one of two modes: `Val` pushes the bytes of the
//! result, `Ptr` pushes a pointer to its storage (lvalues only).

pub mod expressions;
pub mod statements;

use crate::bytecode::opcodes::{emit_op, emit_u64, emit_u64_placeholder, patch_u64, Op};
use crate::bytecode::program::{BytecodeFunction, BytecodeProgram};
use crate::compiler::compiler_errors::{CompileError, ErrorMetaDataKey};
use crate::compiler::datatypes::{TypeKind, TypeName, PTR_SIZE};
use crate::compiler::parsers::ast_nodes::{
    Ast, Expression, FunctionDef, FunctionSignature, Statement, StatementKind, StructDef,
};
use crate::compiler::parsers::tokenizer::tokens::TextLocation;
use crate::compiler::type_registry::{Field, TemplateMap, TypeRegistry};
use crate::compiler::variable_manager::{emit_arena_releases, VariableManager};
use crate::return_compiler_error;
use crate::return_rule_error;
use crate::return_type_error;
use crate::settings::Config;
use expressions::{push_expr, CompileType};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
pub struct Signature {
    pub params: Vec<TypeName>,
    pub return_type: TypeName,
}

#[derive(Debug)]
pub struct FunctionInfo {
    pub name: String,
    pub id: u64,
    pub code: Vec<u8>,
    pub sig: Signature,
    pub variables: VariableManager,
}

struct CurrentFunction {
    id: usize,
    templates: TemplateMap,
}

struct CurrentStruct {
    name: TypeName,
    templates: TemplateMap,
}

/// The anonymous namespace that free functions live in
fn global_namespace() -> TypeName {
    TypeName::structure("")
}

pub struct Codegen<'a> {
    pub types: TypeRegistry,
    pub functions: Vec<FunctionInfo>,
    pub functions_by_name: FxHashMap<String, usize>,
    pub rom: Vec<u8>,

    // Uninstantiated template ASTs, keyed by name without the `!(...)` part
    pub struct_templates: FxHashMap<String, StructDef>,
    pub function_templates: FxHashMap<String, FunctionDef>,

    current_function: Vec<CurrentFunction>,
    current_struct: Vec<CurrentStruct>,

    pub config: &'a Config,
    hidden_counter: u64,
}

/// Compile a parsed module into a bytecode program. Function 0 is the module
/// entry point; top-level statements execute in its frame and top-level
/// variables are the globals.
pub fn compile(ast: &Ast, config: &Config) -> Result<BytecodeProgram, CompileError> {
    let mut com = Codegen {
        types: TypeRegistry::new(),
        functions: Vec::new(),
        functions_by_name: FxHashMap::default(),
        rom: Vec::new(),
        struct_templates: FxHashMap::default(),
        function_templates: FxHashMap::default(),
        current_function: Vec::new(),
        current_struct: Vec::new(),
        config,
        hidden_counter: 0,
    };

    com.functions.push(FunctionInfo {
        name: "$main".to_string(),
        id: 0,
        code: Vec::new(),
        sig: Signature {
            params: Vec::new(),
            return_type: TypeName::null(),
        },
        variables: VariableManager::new(false),
    });
    com.functions_by_name.insert("$main".to_string(), 0);

    com.current_function.push(CurrentFunction {
        id: 0,
        templates: TemplateMap::default(),
    });
    com.current_struct.push(CurrentStruct {
        name: global_namespace(),
        templates: TemplateMap::default(),
    });

    com.variables().new_scope();
    for statement in &ast.statements {
        statements::push_stmt(&mut com, statement)?;
    }
    com.pop_scope_emit();

    emit_op(com.code(), Op::EndProgram);

    let mut program = BytecodeProgram {
        functions: Vec::new(),
        rom: com.rom,
    };
    for function in com.functions {
        program.functions.push(BytecodeFunction {
            name: function.name,
            id: function.id,
            code: function.code,
        });
    }
    Ok(program)
}

impl<'a> Codegen<'a> {
    // --- context access ------------------------------------------------------

    /// The function currently being compiled
    pub fn current(&mut self) -> &mut FunctionInfo {
        let id = self.current_function.last().expect("no current function").id;
        &mut self.functions[id]
    }

    /// Bytecode of the function currently being compiled
    pub fn code(&mut self) -> &mut Vec<u8> {
        &mut self.current().code
    }

    /// Local variables if inside a function, otherwise the globals
    pub fn variables(&mut self) -> &mut VariableManager {
        &mut self.current().variables
    }

    pub fn in_function(&self) -> bool {
        self.current_function.len() > 1
    }

    pub fn current_struct_name(&self) -> TypeName {
        self.current_struct
            .last()
            .map(|s| s.name.clone())
            .unwrap_or_else(global_namespace)
    }

    /// A fresh name for a compiler-introduced local
    pub fn hidden_name(&mut self, base: &str) -> String {
        self.hidden_counter += 1;
        format!("#:{}:{}", base, self.hidden_counter)
    }

    // --- names and types -----------------------------------------------------

    /// Resolve a bare name to a type, checking the template maps of the
    /// current function and struct before the fundamentals.
    pub fn make_type(&self, name: &str) -> TypeName {
        if let Some(current) = self.current_function.last() {
            if let Some(bound) = current.templates.get(name) {
                return bound.clone();
            }
        }
        if let Some(current) = self.current_struct.last() {
            if let Some(bound) = current.templates.get(name) {
                return bound.clone();
            }
        }

        match name {
            "null" => TypeName::null(),
            "bool" => TypeName::bool(),
            "char" => TypeName::char(),
            "i32" => TypeName::i32(),
            "i64" => TypeName::i64(),
            "u64" => TypeName::u64(),
            "f64" => TypeName::f64(),
            "nullptr" => TypeName::nullptr(),
            "arena" => TypeName::arena(),
            _ => TypeName::structure(name),
        }
    }

    /// Evaluate an expression that must denote a type and return the inner
    /// type. `null` and `nullptr` are also their own types.
    pub fn resolve_type(&mut self, expr: &Expression) -> Result<TypeName, CompileError> {
        let type_expr_type = self.type_of_expr(expr)?;

        if matches!(
            type_expr_type.kind,
            TypeKind::Fundamental(crate::compiler::datatypes::Fundamental::Null)
                | TypeKind::Fundamental(crate::compiler::datatypes::Fundamental::NullPtr)
        ) {
            return Ok(type_expr_type);
        }

        if !type_expr_type.is_type_value() {
            return_type_error!(
                expr.location.clone(),
                "expected a type expression, got '{}'",
                type_expr_type
            );
        }
        Ok(type_expr_type.inner_type())
    }

    /// Canonical struct type for a possibly-templated name:
    /// `Pair` with args `(i64, bool)` becomes the struct `Pair!(i64, bool)`.
    pub fn struct_name(
        &mut self,
        name: &str,
        template_args: &[Expression],
    ) -> Result<TypeName, CompileError> {
        if template_args.is_empty() {
            return Ok(self.make_type(name));
        }
        let formatted = self.format_template_args(template_args)?;
        Ok(self.make_type(&format!("{}!({})", name, formatted)))
    }

    fn format_template_args(&mut self, args: &[Expression]) -> Result<String, CompileError> {
        let mut out = String::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let resolved = self.resolve_type(arg)?;
            out.push_str(&resolved.to_string());
        }
        Ok(out)
    }

    /// Full function name: `Struct::name!(T1, T2)` for members,
    /// `name!(T1, T2)` for free functions.
    pub fn fn_name(
        &mut self,
        struct_name: &TypeName,
        function_name: &str,
        template_args: &[Expression],
    ) -> Result<String, CompileError> {
        let mut name = String::new();
        if *struct_name != global_namespace() {
            name.push_str(&format!("{}::", struct_name.clone().remove_const()));
        }
        name.push_str(function_name);
        if !template_args.is_empty() {
            let formatted = self.format_template_args(template_args)?;
            name.push_str(&format!("!({})", formatted));
        }
        Ok(name)
    }

    pub fn get_function(&self, full_name: &str) -> Option<(u64, Signature)> {
        self.functions_by_name
            .get(full_name)
            .map(|&id| (self.functions[id].id, self.functions[id].sig.clone()))
    }

    // --- read-only segment ---------------------------------------------------

    /// Intern a byte string in the read-only segment, reusing an existing
    /// occurrence when present, and return its offset.
    pub fn insert_into_rom(&mut self, data: &[u8]) -> u64 {
        if data.is_empty() {
            return 0;
        }
        if data.len() <= self.rom.len() {
            if let Some(pos) = self
                .rom
                .windows(data.len())
                .position(|window| window == data)
            {
                return pos as u64;
            }
        }
        let offset = self.rom.len() as u64;
        self.rom.extend_from_slice(data);
        offset
    }

    // --- variables -----------------------------------------------------------

    /// Register a name in the current scope
    pub fn declare_var(
        &mut self,
        location: &TextLocation,
        name: &str,
        type_name: TypeName,
    ) -> Result<(), CompileError> {
        let size = self.types.size_of(&type_name)?;
        if !self.variables().declare(name, type_name, size) {
            let mut error = CompileError::new(
                format!("name already in use: '{}'", name),
                location.clone(),
                crate::compiler::compiler_errors::ErrorType::Rule,
            );
            error.new_metadata_entry(ErrorMetaDataKey::VariableName, name);
            return Err(error);
        }
        Ok(())
    }

    /// Push a pointer to the variable's storage and return its type
    pub fn push_var_addr(
        &mut self,
        location: &TextLocation,
        name: &str,
    ) -> Result<TypeName, CompileError> {
        if self.in_function() {
            if let Some(var) = self.current().variables.find(name) {
                emit_op(self.code(), Op::PushPtrLocal);
                emit_u64(self.code(), var.location);
                return Ok(var.type_name);
            }
        }

        let Some(var) = self.functions[0].variables.find(name) else {
            return_rule_error!(location.clone(), "could not find variable '{}'", name);
        };
        emit_op(self.code(), Op::PushPtrGlobal);
        emit_u64(self.code(), var.location);
        Ok(var.type_name)
    }

    pub fn load_variable(
        &mut self,
        location: &TextLocation,
        name: &str,
    ) -> Result<TypeName, CompileError> {
        let type_name = self.push_var_addr(location, name)?;
        let size = self.types.size_of(&type_name)?;
        emit_op(self.code(), Op::Load);
        emit_u64(self.code(), size);
        Ok(type_name)
    }

    pub fn save_variable(
        &mut self,
        location: &TextLocation,
        name: &str,
    ) -> Result<(), CompileError> {
        let type_name = self.push_var_addr(location, name)?;
        let size = self.types.size_of(&type_name)?;
        emit_op(self.code(), Op::Save);
        emit_u64(self.code(), size);
        Ok(())
    }

    // --- expression support --------------------------------------------------

    /// Type of an expression: compile it for value, record the type, then
    /// discard the emitted bytes.
    pub fn type_of_expr(&mut self, expr: &Expression) -> Result<TypeName, CompileError> {
        let code_size = self.code().len();
        let type_name = push_expr(self, CompileType::Val, expr)?;
        self.code().truncate(code_size);
        Ok(type_name)
    }

    /// Emit one pointer-width load per pointer layer so a value of the
    /// returned (non-pointer) type is reachable. No-op for non-pointers.
    pub fn auto_deref_pointer(&mut self, type_name: &TypeName) -> TypeName {
        let mut t = type_name.clone();
        while t.is_ptr() {
            emit_op(self.code(), Op::Load);
            emit_u64(self.code(), PTR_SIZE);
            t = t.remove_ptr();
        }
        t
    }

    /// Compile a copy of `expr` where a value of type `expected` is needed,
    /// verifying const-correct convertibility. Top-level const is stripped on
    /// both sides since a copy is being made.
    pub fn push_copy_typechecked(
        &mut self,
        expr: &Expression,
        expected_raw: &TypeName,
        location: &TextLocation,
    ) -> Result<(), CompileError> {
        let actual = push_expr(self, CompileType::Val, expr)?.remove_const();
        let expected = expected_raw.clone().remove_const();

        // nullptr converts to any pointer
        if actual == TypeName::nullptr() && expected.is_ptr() {
            return Ok(());
        }

        // nullptr converts to a span by producing the zero-length span
        if actual == TypeName::nullptr() && expected.is_span() {
            emit_op(self.code(), Op::PushU64);
            emit_u64(self.code(), 0);
            return Ok(());
        }

        if actual.is_arena() || expected.is_arena() {
            return_type_error!(location.clone(), "arenas can not be copied or assigned");
        }

        if !crate::compiler::datatypes::const_convertible_to(&actual, &expected) {
            let mut error = CompileError::new(
                format!("cannot convert '{}' to '{}'", actual, expected),
                location.clone(),
                crate::compiler::compiler_errors::ErrorType::Type,
            );
            error.new_metadata_entry(ErrorMetaDataKey::ExpectedType, expected.to_string());
            error.new_metadata_entry(ErrorMetaDataKey::FoundType, actual.to_string());
            return Err(error);
        }
        Ok(())
    }

    // --- scopes and control flow ---------------------------------------------

    /// Pop the innermost scope: release its arenas and emit the stack-adjust
    /// for the bytes it owned.
    pub fn pop_scope_emit(&mut self) {
        let current = self.current();
        let scope = current.variables.pop_scope();
        emit_arena_releases(&scope, &mut current.code);
        let released = scope.scope_size();
        if released > 0 {
            emit_op(&mut current.code, Op::Pop);
            emit_u64(&mut current.code, released);
        }
    }

    /// Lower a `break`: unwind to the loop boundary and emit a jump to be
    /// patched when the loop scope closes.
    pub fn push_break(&mut self, location: &TextLocation) -> Result<(), CompileError> {
        if !self.variables().in_loop() {
            return_rule_error!(location.clone(), "cannot use 'break' outside of a loop");
        }
        let current = self.current();
        current.variables.handle_loop_exit(&mut current.code);
        emit_op(&mut current.code, Op::Jump);
        let pos = emit_u64_placeholder(&mut current.code);
        current
            .variables
            .get_loop_info()
            .expect("in_loop checked above")
            .breaks
            .push(pos);
        Ok(())
    }

    /// Wrap a body in the loop scaffolding: a loop scope for break/continue
    /// bookkeeping, an inner scope per iteration, the back-jump, and the
    /// patching of every break and continue recorded while compiling it.
    pub fn push_loop(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<(), CompileError>,
    ) -> Result<(), CompileError> {
        self.variables().new_loop_scope();

        let begin_pos = self.code().len() as u64;
        self.variables().new_scope();
        body(self)?;
        self.pop_scope_emit();
        emit_op(self.code(), Op::Jump);
        emit_u64(self.code(), begin_pos);

        let end_pos = self.code().len() as u64;
        let current = self.current();
        if let Some(info) = current.variables.get_loop_info() {
            for pos in info.breaks.drain(..) {
                patch_u64(&mut current.code, pos, end_pos);
            }
            for pos in info.continues.drain(..) {
                patch_u64(&mut current.code, pos, begin_pos);
            }
        }

        self.pop_scope_emit();
        Ok(())
    }

    // --- functions -----------------------------------------------------------

    /// True when every control path through the statement ends in a return
    pub fn ends_in_return(statement: &Statement) -> bool {
        match &statement.kind {
            StatementKind::Block(sequence) => match sequence.last() {
                Some(last) => Self::ends_in_return(last),
                None => false,
            },
            StatementKind::If {
                body, else_body, ..
            } => match else_body {
                // both branches must exist and return
                Some(else_body) => {
                    Self::ends_in_return(body) && Self::ends_in_return(else_body)
                }
                None => false,
            },
            StatementKind::Return { .. } => true,
            _ => false,
        }
    }

    /// Map template parameter names to the resolved argument types
    pub fn build_template_map(
        &mut self,
        location: &TextLocation,
        names: &[String],
        types: &[Expression],
    ) -> Result<TemplateMap, CompileError> {
        if names.len() != types.len() {
            return_type_error!(
                location.clone(),
                "bad number of template args: expected {}, got {}",
                names.len(),
                types.len()
            );
        }
        let mut map = TemplateMap::default();
        for (name, type_expr) in names.iter().zip(types) {
            let resolved = self.resolve_type(type_expr)?;
            if map.insert(name.clone(), resolved).is_some() {
                return_type_error!(location.clone(), "duplicate template name {}", name);
            }
        }
        Ok(map)
    }

    /// Compile one function body under the given template bindings. For
    /// member functions the first parameter must be a pointer to the
    /// enclosing struct.
    pub fn compile_function(
        &mut self,
        location: &TextLocation,
        full_name: &str,
        node_sig: &FunctionSignature,
        body: &Statement,
        map: TemplateMap,
    ) -> Result<(), CompileError> {
        let struct_name = self.current_struct_name();

        let id = self.functions.len();
        self.current_function.push(CurrentFunction { id, templates: map });

        if self
            .functions_by_name
            .insert(full_name.to_string(), id)
            .is_some()
        {
            return_rule_error!(
                location.clone(),
                "a function with the name '{}' already exists",
                full_name
            );
        }
        self.functions.push(FunctionInfo {
            name: full_name.to_string(),
            id: id as u64,
            code: Vec::new(),
            sig: Signature {
                params: Vec::new(),
                return_type: TypeName::null(),
            },
            variables: VariableManager::new(true),
        });

        // member function: the first argument must point at an instance
        if struct_name != global_namespace() {
            if node_sig.params.is_empty() {
                return_type_error!(
                    location.clone(),
                    "member functions must have at least one arg"
                );
            }
            let actual = self.resolve_type(&node_sig.params[0].type_expr)?;
            let expected = struct_name
                .clone()
                .add_const()
                .add_ptr()
                .add_const();
            if !crate::compiler::datatypes::const_convertible_to(&actual, &expected) {
                return_type_error!(
                    location.clone(),
                    "first parameter to a struct member function must be a pointer to '{}', got '{}'",
                    struct_name,
                    actual
                );
            }
        }

        let return_type = match &node_sig.return_type {
            Some(type_expr) => self.resolve_type(type_expr)?,
            None => TypeName::null(),
        };

        self.variables().new_function_scope(return_type.clone());

        let mut params = Vec::new();
        for param in &node_sig.params {
            let param_type = self.resolve_type(&param.type_expr)?;
            self.declare_var(location, &param.name, param_type.clone())?;
            params.push(param_type);
        }
        self.current().sig = Signature {
            params,
            return_type: return_type.clone(),
        };

        // compiling the body may compile further template instantiations
        statements::push_stmt(self, body)?;

        if !Self::ends_in_return(body) {
            // functions returning null get the final return added for them
            if return_type != TypeName::null() {
                return_type_error!(
                    location.clone(),
                    "fn '{}' does not end in a return (needs {})",
                    full_name,
                    return_type
                );
            }
            let current = self.current();
            current.variables.handle_function_exit(&mut current.code);
            emit_op(&mut current.code, Op::PushNull);
            emit_op(&mut current.code, Op::Ret);
            emit_u64(&mut current.code, 1);
        }

        self.variables().pop_scope();
        self.current_function.pop();
        Ok(())
    }

    // --- template instantiation ----------------------------------------------

    /// Instantiate a function template on first use. `base_name` is the full
    /// name without template arguments (the stash key) and `full_name` the
    /// canonical instantiated name.
    pub fn instantiate_function_template(
        &mut self,
        location: &TextLocation,
        base_name: &str,
        full_name: &str,
        template_args: &[Expression],
    ) -> Result<(), CompileError> {
        let Some(ast) = self.function_templates.get(base_name).cloned() else {
            return Ok(());
        };
        if self.functions_by_name.contains_key(full_name) {
            return Ok(());
        }
        let map = self.build_template_map(location, &ast.templates, template_args)?;
        self.compile_function(location, full_name, &ast.sig, &ast.body, map)
    }

    /// Instantiate a struct template on first use: register the instantiated
    /// type with the bindings active (so field types see the parameters) and
    /// stash its member functions for call-site compilation.
    pub fn instantiate_struct_template(
        &mut self,
        location: &TextLocation,
        base_name: &str,
        instantiated: &TypeName,
        template_args: &[Expression],
    ) -> Result<bool, CompileError> {
        let Some(ast) = self.struct_templates.get(base_name).cloned() else {
            return Ok(false);
        };
        if self.types.contains(instantiated) {
            return Ok(true);
        }

        let map = self.build_template_map(location, &ast.templates, template_args)?;
        self.current_struct.push(CurrentStruct {
            name: instantiated.clone(),
            templates: map.clone(),
        });

        let mut fields = Vec::new();
        for field in &ast.fields {
            fields.push(Field {
                name: field.name.clone(),
                type_name: self.resolve_type(&field.type_expr)?,
            });
        }
        let TypeKind::Struct(canonical) = &instantiated.kind else {
            return_compiler_error!("instantiated template '{}' is not a struct", instantiated);
        };
        self.types.add(canonical, fields, map);

        for function in &ast.functions {
            let func_name = self.fn_name(instantiated, &function.name, &[])?;
            // member functions are compiled at the call site; stash the ast
            if self
                .function_templates
                .insert(func_name.clone(), function.clone())
                .is_some()
            {
                self.current_struct.pop();
                return_rule_error!(
                    location.clone(),
                    "function template named '{}' already defined",
                    func_name
                );
            }
        }

        self.current_struct.pop();
        Ok(true)
    }

    /// Open a struct context (used when compiling member functions)
    pub fn enter_struct(&mut self, name: TypeName, templates: TemplateMap) {
        self.current_struct.push(CurrentStruct { name, templates });
    }

    pub fn exit_struct(&mut self) {
        self.current_struct.pop();
    }
}
