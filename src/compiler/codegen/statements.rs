//! Statement lowering.

use crate::bytecode::opcodes::{emit_op, emit_u64, emit_u64_placeholder, patch_u64, Op};
use crate::compiler::codegen::expressions::{
    is_lvalue_expr, is_rvalue_expr, push_expr, CompileType,
};
use crate::compiler::codegen::Codegen;
use crate::compiler::compiler_errors::CompileError;
use crate::compiler::datatypes::{Fundamental, TypeKind, TypeName};
use crate::compiler::parsers::ast_nodes::{
    Expression, FunctionDef, Statement, StatementKind, StructDef,
};
use crate::compiler::parsers::tokenizer::tokens::TextLocation;
use crate::compiler::type_registry::{Field, TemplateMap};
use crate::return_compiler_error;
use crate::return_rule_error;
use crate::return_type_error;

pub fn push_stmt(com: &mut Codegen, statement: &Statement) -> Result<(), CompileError> {
    let location = &statement.location;

    match &statement.kind {
        StatementKind::Block(sequence) => {
            com.variables().new_scope();
            for child in sequence {
                push_stmt(com, child)?;
            }
            com.pop_scope_emit();
            Ok(())
        }

        StatementKind::Loop { body } => com.push_loop(|com| push_stmt(com, body)),

        // loop { if !<condition> break; <body> }
        StatementKind::While { condition, body } => com.push_loop(|com| {
            let cond_type = push_expr(com, CompileType::Val, condition)?.remove_const();
            if cond_type != TypeName::bool() {
                return_type_error!(
                    condition.location.clone(),
                    "while-stmt condition must be bool, got {}",
                    cond_type
                );
            }
            emit_op(com.code(), Op::BoolNot);
            emit_op(com.code(), Op::JumpIfFalse);
            let jump_pos = emit_u64_placeholder(com.code());
            com.push_break(location)?;
            let after_break = com.code().len() as u64;
            patch_u64(com.code(), jump_pos, after_break);

            push_stmt(com, body)
        }),

        StatementKind::For { name, iter, body } => push_for_stmt(com, location, name, iter, body),

        StatementKind::If {
            condition,
            body,
            else_body,
        } => {
            let cond_type = push_expr(com, CompileType::Val, condition)?.remove_const();
            if cond_type != TypeName::bool() {
                return_type_error!(
                    condition.location.clone(),
                    "if-stmt condition must be bool, got {}",
                    cond_type
                );
            }

            emit_op(com.code(), Op::JumpIfFalse);
            let jump_pos = emit_u64_placeholder(com.code());
            push_stmt(com, body)?;

            match else_body {
                Some(else_body) => {
                    emit_op(com.code(), Op::Jump);
                    let else_pos = emit_u64_placeholder(com.code());
                    let in_else_pos = com.code().len() as u64;
                    push_stmt(com, else_body)?;
                    let end_pos = com.code().len() as u64;
                    patch_u64(com.code(), jump_pos, in_else_pos);
                    patch_u64(com.code(), else_pos, end_pos);
                }
                None => {
                    let end_pos = com.code().len() as u64;
                    patch_u64(com.code(), jump_pos, end_pos);
                }
            }
            Ok(())
        }

        StatementKind::StructDef(node) => push_struct_stmt(com, location, node),

        StatementKind::FunctionDef(node) => push_function_stmt(com, node),

        StatementKind::Break => com.push_break(location),

        StatementKind::Continue => {
            if !com.variables().in_loop() {
                return_rule_error!(location.clone(), "cannot use 'continue' outside of a loop");
            }
            let current = com.current();
            current.variables.handle_loop_exit(&mut current.code);
            emit_op(&mut current.code, Op::Jump);
            let pos = emit_u64_placeholder(&mut current.code);
            current
                .variables
                .get_loop_info()
                .expect("in_loop checked above")
                .continues
                .push(pos);
            Ok(())
        }

        StatementKind::Declaration {
            name,
            explicit_type,
            expr,
            add_const,
        } => {
            let mut type_name = match explicit_type {
                Some(type_expr) => com.resolve_type(type_expr)?,
                None => com.type_of_expr(expr)?,
            };
            type_name.is_const = *add_const;

            if type_name.is_arena() {
                return_type_error!(location.clone(), "cannot create copies of arenas");
            }
            com.push_copy_typechecked(expr, &type_name, location)?;
            com.declare_var(location, name, type_name)
        }

        StatementKind::ArenaDeclaration { name } => {
            emit_op(com.code(), Op::ArenaNew);
            com.declare_var(location, name, TypeName::arena())
        }

        StatementKind::Assignment { target, expr } => {
            let lhs_type = com.type_of_expr(target)?;
            if lhs_type.is_const {
                return_rule_error!(location.clone(), "cannot assign to a const variable");
            }
            com.push_copy_typechecked(expr, &lhs_type, location)?;
            let lhs = push_expr(com, CompileType::Ptr, target)?;
            let size = com.types.size_of(&lhs)?;
            emit_op(com.code(), Op::Save);
            emit_u64(com.code(), size);
            Ok(())
        }

        StatementKind::ExpressionStmt(expr) => {
            let type_name = com.type_of_expr(expr)?;
            if matches!(
                type_name.kind,
                TypeKind::TypeValue(_)
                    | TypeKind::Builtin { .. }
                    | TypeKind::BoundMethod { .. }
                    | TypeKind::BoundBuiltinMethod { .. }
            ) {
                return_type_error!(
                    location.clone(),
                    "expression of type '{}' has no runtime value",
                    type_name
                );
            }
            push_expr(com, CompileType::Val, expr)?;
            let size = com.types.size_of(&type_name)?;
            emit_op(com.code(), Op::Pop);
            emit_u64(com.code(), size);
            Ok(())
        }

        StatementKind::Return { expr } => {
            if !com.in_function() {
                return_rule_error!(location.clone(), "can only return within functions");
            }
            let return_type = match expr {
                Some(expr) => push_expr(com, CompileType::Val, expr)?,
                None => {
                    emit_op(com.code(), Op::PushNull);
                    TypeName::null()
                }
            };
            if return_type.is_arena() {
                return_type_error!(location.clone(), "arenas can not be returned");
            }
            let expected = com.current().sig.return_type.clone();
            if return_type.clone().remove_const() != expected.clone().remove_const() {
                return_type_error!(
                    location.clone(),
                    "wrong return type: expected {}, got {}",
                    expected,
                    return_type
                );
            }
            let size = com.types.size_of(&return_type)?;
            let current = com.current();
            current.variables.handle_function_exit(&mut current.code);
            emit_op(&mut current.code, Op::Ret);
            emit_u64(&mut current.code, size);
            Ok(())
        }

        StatementKind::Assert { expr } => {
            let expr_type = push_expr(com, CompileType::Val, expr)?.remove_const();
            if expr_type != TypeName::bool() {
                return_type_error!(
                    location.clone(),
                    "bad assertion expression: expected bool, got {}",
                    expr_type
                );
            }
            let message = format!("line {}", location.start_pos.line_number);
            let offset = com.insert_into_rom(message.as_bytes());
            emit_op(com.code(), Op::Assert);
            emit_u64(com.code(), offset);
            emit_u64(com.code(), message.len() as u64);
            Ok(())
        }

        StatementKind::Print { message, args } => push_print_stmt(com, location, message, args),

        StatementKind::Delete { expr } => {
            let type_name = push_expr(com, CompileType::Val, expr)?;
            let stripped = com.auto_deref_pointer(&type_name);
            if !stripped.is_arena() {
                return_type_error!(
                    location.clone(),
                    "'delete' is only valid on arenas, got {}",
                    stripped
                );
            }
            emit_op(com.code(), Op::ArenaDelete);
            Ok(())
        }

        StatementKind::Import { path } => {
            return_compiler_error!("import of '{}' was not resolved before code generation", path)
        }
    }
}

//{
//    <<materialize the iterator when it is an rvalue>>
//    idx := 0u64;
//    size := <<length of iter>>;
//    loop {
//        if idx == size break;
//        name := iter[idx]&;
//        idx = idx + 1u64;
//        <body>
//    }
//}
fn push_for_stmt(
    com: &mut Codegen,
    location: &TextLocation,
    name: &str,
    iter: &Expression,
    body: &Statement,
) -> Result<(), CompileError> {
    com.variables().new_scope();

    let iter_type = com.type_of_expr(iter)?;
    let is_array = iter_type.is_array();
    let is_lvalue_span = iter_type.is_span() && is_lvalue_expr(iter);
    if !is_array && !is_lvalue_span {
        return_type_error!(
            location.clone(),
            "for-loops only supported for arrays and lvalue spans, got {}",
            iter_type
        );
    }

    let iter_name = com.hidden_name("iter");
    let idx_name = com.hidden_name("idx");
    let size_name = com.hidden_name("size");

    // rvalue iterators live in a hidden scoped variable
    if is_rvalue_expr(iter) {
        push_expr(com, CompileType::Val, iter)?;
        com.declare_var(location, &iter_name, iter_type.clone())?;
    }

    // idx := 0u64;
    emit_op(com.code(), Op::PushU64);
    emit_u64(com.code(), 0);
    com.declare_var(location, &idx_name, TypeName::u64())?;

    // size := <<length of iter>>;
    if is_array {
        emit_op(com.code(), Op::PushU64);
        emit_u64(com.code(), iter_type.array_length());
    } else {
        push_expr(com, CompileType::Ptr, iter)?;
        emit_op(com.code(), Op::PushU64);
        emit_u64(com.code(), crate::compiler::datatypes::PTR_SIZE);
        emit_op(com.code(), Op::U64Add); // offset to the length word
        emit_op(com.code(), Op::Load);
        emit_u64(com.code(), 8);
    }
    com.declare_var(location, &size_name, TypeName::u64())?;

    let mut inner = iter_type.inner_type();
    if iter_type.is_const {
        inner = inner.add_const();
    }
    let inner_size = com.types.size_of(&inner)?;

    com.push_loop(|com| {
        // if idx == size break;
        com.load_variable(location, &idx_name)?;
        com.load_variable(location, &size_name)?;
        emit_op(com.code(), Op::U64Eq);
        emit_op(com.code(), Op::JumpIfFalse);
        let jump_pos = emit_u64_placeholder(com.code());
        com.push_break(location)?;
        let after_break = com.code().len() as u64;
        patch_u64(com.code(), jump_pos, after_break);

        // name := iter[idx]&;
        if is_rvalue_expr(iter) {
            com.push_var_addr(location, &iter_name)?;
        } else {
            push_expr(com, CompileType::Ptr, iter)?;
            if iter_type.is_span() {
                emit_op(com.code(), Op::Load);
                emit_u64(com.code(), crate::compiler::datatypes::PTR_SIZE);
            }
        }
        com.load_variable(location, &idx_name)?;
        emit_op(com.code(), Op::PushU64);
        emit_u64(com.code(), inner_size);
        emit_op(com.code(), Op::U64Mul);
        emit_op(com.code(), Op::U64Add);
        com.declare_var(location, name, inner.clone().add_ptr())?;

        // idx = idx + 1u64;
        com.load_variable(location, &idx_name)?;
        emit_op(com.code(), Op::PushU64);
        emit_u64(com.code(), 1);
        emit_op(com.code(), Op::U64Add);
        com.save_variable(location, &idx_name)?;

        push_stmt(com, body)
    })?;

    com.pop_scope_emit();
    Ok(())
}

fn push_struct_stmt(
    com: &mut Codegen,
    location: &TextLocation,
    node: &StructDef,
) -> Result<(), CompileError> {
    // templates are stashed and instantiated on first use
    if !node.templates.is_empty() {
        if com
            .struct_templates
            .insert(node.name.clone(), node.clone())
            .is_some()
        {
            return_rule_error!(
                location.clone(),
                "struct template named '{}' already defined",
                node.name
            );
        }
        return Ok(());
    }

    let struct_name = com.make_type(&node.name);
    if com.types.contains(&struct_name) || com.functions_by_name.contains_key(&node.name) {
        return_rule_error!(location.clone(), "type '{}' already defined", node.name);
    }

    com.enter_struct(struct_name.clone(), TemplateMap::default());

    let mut fields = Vec::new();
    for field in &node.fields {
        fields.push(Field {
            name: field.name.clone(),
            type_name: com.resolve_type(&field.type_expr)?,
        });
    }
    let TypeKind::Struct(canonical) = &struct_name.kind else {
        com.exit_struct();
        return_type_error!(location.clone(), "'{}' is not usable as a struct name", node.name);
    };
    com.types.add(canonical, fields, TemplateMap::default());

    for function in &node.functions {
        if let Err(e) = push_function_stmt(com, function) {
            com.exit_struct();
            return Err(e);
        }
    }

    com.exit_struct();
    Ok(())
}

fn push_function_stmt(com: &mut Codegen, node: &FunctionDef) -> Result<(), CompileError> {
    // The full name never carries template arguments: either this is not a
    // template and the name is complete, or it is and the bare name keys the
    // template stash.
    let struct_name = com.current_struct_name();
    let function_name = com.fn_name(&struct_name, &node.name, &[])?;

    if !node.templates.is_empty() {
        if com
            .function_templates
            .insert(function_name.clone(), node.clone())
            .is_some()
        {
            return_rule_error!(
                node.location.clone(),
                "function template named '{}' already defined",
                function_name
            );
        }
        return Ok(());
    }

    com.compile_function(
        &node.location,
        &function_name,
        &node.sig,
        &node.body,
        TemplateMap::default(),
    )
}

fn push_print_stmt(
    com: &mut Codegen,
    location: &TextLocation,
    message: &str,
    args: &[Expression],
) -> Result<(), CompileError> {
    // easy way to dump the compile-time types of expressions
    if message == "__dump_type" {
        println!("__dump_type(");
        for arg in args {
            let type_name = com.type_of_expr(arg)?;
            println!("    {},", type_name);
        }
        println!(")");
        return Ok(());
    }

    let parts: Vec<&str> = message.split("{}").collect();
    if parts.len() != args.len() + 1 {
        return_type_error!(
            location.clone(),
            "wrong number of args to fill all placeholders: {} placeholders, {} args",
            parts.len() - 1,
            args.len()
        );
    }

    if !parts[0].is_empty() {
        push_string_fragment(com, parts[0]);
    }
    for (i, arg) in args.iter().enumerate() {
        push_print_fundamental(com, arg)?;
        if !parts[i + 1].is_empty() {
            push_string_fragment(com, parts[i + 1]);
        }
    }
    Ok(())
}

fn push_string_fragment(com: &mut Codegen, fragment: &str) {
    let offset = com.insert_into_rom(fragment.as_bytes());
    emit_op(com.code(), Op::PushStringLiteral);
    emit_u64(com.code(), offset);
    emit_u64(com.code(), fragment.len() as u64);
    emit_op(com.code(), Op::PrintCharSpan);
}

fn push_print_fundamental(com: &mut Codegen, arg: &Expression) -> Result<(), CompileError> {
    let type_name = push_expr(com, CompileType::Val, arg)?.remove_const();

    let print_op = match &type_name.kind {
        TypeKind::Fundamental(Fundamental::Null) => Op::PrintNull,
        TypeKind::Fundamental(Fundamental::Bool) => Op::PrintBool,
        TypeKind::Fundamental(Fundamental::Char) => Op::PrintChar,
        TypeKind::Fundamental(Fundamental::I32) => Op::PrintI32,
        TypeKind::Fundamental(Fundamental::I64) => Op::PrintI64,
        TypeKind::Fundamental(Fundamental::U64) => Op::PrintU64,
        TypeKind::Fundamental(Fundamental::F64) => Op::PrintF64,
        TypeKind::Fundamental(Fundamental::NullPtr) => Op::PrintPtr,
        TypeKind::Ptr(_) => Op::PrintPtr,
        TypeKind::Span(inner)
            if inner.clone().remove_const() == TypeName::char() =>
        {
            Op::PrintCharSpan
        }
        _ => {
            return_type_error!(
                arg.location.clone(),
                "cannot print value of type {}",
                type_name
            )
        }
    };
    emit_op(com.code(), print_op);
    Ok(())
}
