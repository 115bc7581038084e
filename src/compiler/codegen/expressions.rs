//! Expression lowering.
//!
//! Every expression compiles in one of two modes: `Val` pushes the bytes of
//! the result onto the stack, `Ptr` pushes a pointer to its storage. `Ptr`
//! is only valid for lvalues (names, fields, derefs, subscripts); asking for
//! the address of anything else is a compile error.
//!
//! Names resolve in order: function template instantiation, struct template
//! instantiation, compiled function, builtin, registered type, variable.

use crate::bytecode::opcodes::{emit_op, emit_u64, emit_u8, Op};
use crate::codegen_log;
use crate::compiler::codegen::Codegen;
use crate::compiler::compiler_errors::CompileError;
use crate::compiler::datatypes::{Fundamental, TypeKind, TypeName, PTR_SIZE};
use crate::compiler::parsers::ast_nodes::{
    BinaryOperator, Expression, ExpressionKind, UnaryOperator,
};
use crate::compiler::parsers::tokenizer::tokens::TextLocation;
use crate::return_rule_error;
use crate::return_type_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileType {
    Val,
    Ptr,
}

/// Lvalue forms: expressions whose storage has a compile-time address
pub fn is_lvalue_expr(expr: &Expression) -> bool {
    matches!(
        expr.kind,
        ExpressionKind::Name { .. }
            | ExpressionKind::FieldAccess { .. }
            | ExpressionKind::Deref(_)
            | ExpressionKind::Subscript { .. }
    )
}

pub fn is_rvalue_expr(expr: &Expression) -> bool {
    !is_lvalue_expr(expr)
}

fn require_val(
    ct: CompileType,
    location: &TextLocation,
    what: &str,
) -> Result<(), CompileError> {
    if ct != CompileType::Val {
        return_rule_error!(location.clone(), "cannot take the address of {}", what);
    }
    Ok(())
}

pub fn push_expr(
    com: &mut Codegen,
    ct: CompileType,
    node: &Expression,
) -> Result<TypeName, CompileError> {
    codegen_log!("push_expr {:?}: {:?}", ct, node.kind);
    let location = &node.location;

    match &node.kind {
        ExpressionKind::LiteralI32(value) => {
            require_val(ct, location, "an i32 literal")?;
            emit_op(com.code(), Op::PushI32);
            crate::bytecode::opcodes::emit_i32(com.code(), *value);
            Ok(TypeName::i32())
        }
        ExpressionKind::LiteralI64(value) => {
            require_val(ct, location, "an i64 literal")?;
            emit_op(com.code(), Op::PushI64);
            crate::bytecode::opcodes::emit_i64(com.code(), *value);
            Ok(TypeName::i64())
        }
        ExpressionKind::LiteralU64(value) => {
            require_val(ct, location, "a u64 literal")?;
            emit_op(com.code(), Op::PushU64);
            emit_u64(com.code(), *value);
            Ok(TypeName::u64())
        }
        ExpressionKind::LiteralF64(value) => {
            require_val(ct, location, "an f64 literal")?;
            emit_op(com.code(), Op::PushF64);
            crate::bytecode::opcodes::emit_f64(com.code(), *value);
            Ok(TypeName::f64())
        }
        ExpressionKind::LiteralBool(value) => {
            require_val(ct, location, "a bool literal")?;
            emit_op(com.code(), Op::PushBool);
            emit_u8(com.code(), *value as u8);
            Ok(TypeName::bool())
        }
        ExpressionKind::LiteralChar(value) => {
            require_val(ct, location, "a char literal")?;
            emit_op(com.code(), Op::PushChar);
            emit_u8(com.code(), *value);
            Ok(TypeName::char())
        }
        ExpressionKind::LiteralNull => {
            require_val(ct, location, "a null literal")?;
            emit_op(com.code(), Op::PushNull);
            Ok(TypeName::null())
        }
        ExpressionKind::LiteralNullptr => {
            require_val(ct, location, "a nullptr literal")?;
            emit_op(com.code(), Op::PushNullptr);
            Ok(TypeName::nullptr())
        }
        ExpressionKind::LiteralString(value) => {
            require_val(ct, location, "a string literal")?;
            let bytes = value.clone().into_bytes();
            let offset = com.insert_into_rom(&bytes);
            emit_op(com.code(), Op::PushStringLiteral);
            emit_u64(com.code(), offset);
            emit_u64(com.code(), bytes.len() as u64);
            Ok(TypeName::string_literal())
        }

        ExpressionKind::UnaryOp { op, expr } => {
            require_val(ct, location, "a unary op")?;
            push_unary_op(com, location, *op, expr)
        }

        ExpressionKind::BinaryOp { op, lhs, rhs } => {
            require_val(ct, location, "a binary op")?;
            push_binary_op(com, location, *op, lhs, rhs)
        }

        ExpressionKind::Call { expr, args } => {
            require_val(ct, location, "a call expression")?;
            push_call_expr(com, location, expr, args)
        }

        ExpressionKind::ArrayLiteral(elements) => {
            require_val(ct, location, "an array expression")?;
            if elements.is_empty() {
                return_type_error!(location.clone(), "cannot have empty array literals");
            }
            let inner_type = push_expr(com, CompileType::Val, &elements[0])?.remove_const();
            if inner_type.is_type_value() {
                return_type_error!(location.clone(), "invalid use of type expressions");
            }
            for element in &elements[1..] {
                let element_type = push_expr(com, CompileType::Val, element)?.remove_const();
                if element_type != inner_type {
                    return_type_error!(
                        element.location.clone(),
                        "array has mismatching element types: '{}' and '{}'",
                        inner_type,
                        element_type
                    );
                }
            }
            let count = elements.len() as u64;
            Ok(inner_type.add_array(count))
        }

        ExpressionKind::RepeatArrayLiteral { value, count } => {
            require_val(ct, location, "a repeat array expression")?;
            let inner_type = com.type_of_expr(value)?.remove_const();
            if inner_type.is_type_value() {
                return_type_error!(location.clone(), "invalid use of type expressions");
            }
            for _ in 0..*count {
                push_expr(com, CompileType::Val, value)?;
            }
            Ok(inner_type.add_array(*count))
        }

        ExpressionKind::AddrOf(expr) => {
            require_val(ct, location, "an address-of expression")?;
            let type_name = com.type_of_expr(expr)?;
            if type_name.is_type_value() {
                // type constructor: `T&` is the pointer type
                return Ok(TypeName::type_value(type_name.inner_type().add_ptr()));
            }
            push_expr(com, CompileType::Ptr, expr)?;
            Ok(type_name.add_ptr())
        }

        ExpressionKind::Deref(expr) => {
            let type_name = push_expr(com, CompileType::Val, expr)?;
            if !type_name.is_ptr() {
                return_type_error!(
                    location.clone(),
                    "cannot use deref operator on non-ptr type '{}'",
                    type_name
                );
            }
            let pointee = type_name.remove_ptr();
            if ct == CompileType::Val {
                let size = com.types.size_of(&pointee)?;
                emit_op(com.code(), Op::Load);
                emit_u64(com.code(), size);
            }
            Ok(pointee)
        }

        ExpressionKind::Sizeof(expr) => {
            require_val(ct, location, "a sizeof expression")?;
            let type_name = com.type_of_expr(expr)?;
            let size = if type_name.is_type_value() {
                com.types.size_of(&type_name.inner_type())?
            } else {
                com.types.size_of(&type_name)?
            };
            emit_op(com.code(), Op::PushU64);
            emit_u64(com.code(), size);
            Ok(TypeName::u64())
        }

        ExpressionKind::Typeof(expr) => {
            require_val(ct, location, "a typeof expression")?;
            let type_name = com.type_of_expr(expr)?;
            Ok(TypeName::type_value(type_name))
        }

        ExpressionKind::Span {
            expr,
            lower_bound,
            upper_bound,
        } => push_span_expr(com, ct, location, expr, lower_bound, upper_bound),

        ExpressionKind::FunctionPtrType {
            param_types,
            return_type,
        } => {
            require_val(ct, location, "a function ptr type expression")?;
            let mut params = Vec::new();
            for param in param_types {
                params.push(com.resolve_type(param)?);
            }
            let return_type = match return_type {
                Some(expr) => com.resolve_type(expr)?,
                None => TypeName::null(),
            };
            Ok(TypeName::type_value(TypeName::new(TypeKind::FunctionPtr {
                param_types: params,
                return_type: Box::new(return_type),
            })))
        }

        ExpressionKind::ConstType(expr) => {
            require_val(ct, location, "a const expression")?;
            let type_name = com.type_of_expr(expr)?;
            if !type_name.is_type_value() {
                return_type_error!(location.clone(), "invalid use of a const-expr");
            }
            Ok(TypeName::type_value(type_name.inner_type().add_const()))
        }

        ExpressionKind::New {
            object,
            count,
            arena,
        } => push_new_expr(com, ct, location, object, count, arena),

        ExpressionKind::Name {
            name,
            template_args,
        } => push_name_expr(com, ct, location, name, template_args),

        ExpressionKind::FieldAccess {
            expr,
            field_name,
            template_args,
        } => push_field_expr(com, ct, location, expr, field_name, template_args),

        ExpressionKind::Subscript { expr, index } => {
            push_subscript_expr(com, ct, location, node, expr, index)
        }
    }
}

fn push_unary_op(
    com: &mut Codegen,
    location: &TextLocation,
    op: UnaryOperator,
    expr: &Expression,
) -> Result<TypeName, CompileError> {
    let type_name = push_expr(com, CompileType::Val, expr)?.remove_const();
    if type_name.is_type_value() {
        return_type_error!(location.clone(), "invalid use of type expression");
    }

    match op {
        UnaryOperator::Negate => {
            if type_name == TypeName::i32() {
                emit_op(com.code(), Op::I32Neg);
                return Ok(type_name);
            }
            if type_name == TypeName::i64() {
                emit_op(com.code(), Op::I64Neg);
                return Ok(type_name);
            }
            if type_name == TypeName::f64() {
                emit_op(com.code(), Op::F64Neg);
                return Ok(type_name);
            }
        }
        UnaryOperator::Not => {
            if type_name == TypeName::bool() {
                emit_op(com.code(), Op::BoolNot);
                return Ok(type_name);
            }
        }
    }

    let symbol = match op {
        UnaryOperator::Negate => "-",
        UnaryOperator::Not => "!",
    };
    return_type_error!(location.clone(), "could not find op '{}{}'", symbol, type_name)
}

fn comparison_ops(fundamental: Fundamental) -> Option<[Op; 6]> {
    // eq, ne, lt, le, gt, ge
    let ops = match fundamental {
        Fundamental::I32 => [Op::I32Eq, Op::I32Ne, Op::I32Lt, Op::I32Le, Op::I32Gt, Op::I32Ge],
        Fundamental::I64 => [Op::I64Eq, Op::I64Ne, Op::I64Lt, Op::I64Le, Op::I64Gt, Op::I64Ge],
        Fundamental::U64 => [Op::U64Eq, Op::U64Ne, Op::U64Lt, Op::U64Le, Op::U64Gt, Op::U64Ge],
        Fundamental::F64 => [Op::F64Eq, Op::F64Ne, Op::F64Lt, Op::F64Le, Op::F64Gt, Op::F64Ge],
        _ => return None,
    };
    Some(ops)
}

fn arithmetic_ops(fundamental: Fundamental) -> Option<[Option<Op>; 5]> {
    // add, sub, mul, div, mod
    let ops = match fundamental {
        Fundamental::I32 => [
            Some(Op::I32Add),
            Some(Op::I32Sub),
            Some(Op::I32Mul),
            Some(Op::I32Div),
            Some(Op::I32Mod),
        ],
        Fundamental::I64 => [
            Some(Op::I64Add),
            Some(Op::I64Sub),
            Some(Op::I64Mul),
            Some(Op::I64Div),
            Some(Op::I64Mod),
        ],
        Fundamental::U64 => [
            Some(Op::U64Add),
            Some(Op::U64Sub),
            Some(Op::U64Mul),
            Some(Op::U64Div),
            Some(Op::U64Mod),
        ],
        Fundamental::F64 => [
            Some(Op::F64Add),
            Some(Op::F64Sub),
            Some(Op::F64Mul),
            Some(Op::F64Div),
            None,
        ],
        _ => return None,
    };
    Some(ops)
}

fn push_binary_op(
    com: &mut Codegen,
    location: &TextLocation,
    op: BinaryOperator,
    lhs: &Expression,
    rhs: &Expression,
) -> Result<TypeName, CompileError> {
    let lhs_type = push_expr(com, CompileType::Val, lhs)?.remove_const();
    let rhs_type = push_expr(com, CompileType::Val, rhs)?.remove_const();

    if lhs_type.is_type_value() || rhs_type.is_type_value() {
        return_type_error!(location.clone(), "invalid use of type expression");
    }

    let mismatch = |lhs_type: &TypeName, rhs_type: &TypeName| {
        CompileError::new(
            format!("could not find op '{} {} {}'", lhs_type, op, rhs_type),
            location.clone(),
            crate::compiler::compiler_errors::ErrorType::Type,
        )
    };

    // Pointers compare with nullptr
    if (lhs_type.is_ptr() && rhs_type == TypeName::nullptr())
        || (rhs_type.is_ptr() && lhs_type == TypeName::nullptr())
    {
        match op {
            BinaryOperator::Equals => {
                emit_op(com.code(), Op::U64Eq);
                return Ok(TypeName::bool());
            }
            BinaryOperator::NotEquals => {
                emit_op(com.code(), Op::U64Ne);
                return Ok(TypeName::bool());
            }
            _ => return Err(mismatch(&lhs_type, &rhs_type)),
        }
    }

    if lhs_type != rhs_type {
        return Err(mismatch(&lhs_type, &rhs_type));
    }
    let type_name = lhs_type;

    if type_name.is_ptr() {
        match op {
            BinaryOperator::Equals => {
                emit_op(com.code(), Op::U64Eq);
                return Ok(TypeName::bool());
            }
            BinaryOperator::NotEquals => {
                emit_op(com.code(), Op::U64Ne);
                return Ok(TypeName::bool());
            }
            _ => return Err(mismatch(&type_name, &type_name)),
        }
    }

    let fundamental = match &type_name.kind {
        TypeKind::Fundamental(fundamental) => *fundamental,
        _ => return Err(mismatch(&type_name, &type_name)),
    };

    match fundamental {
        Fundamental::Char => match op {
            BinaryOperator::Equals => {
                emit_op(com.code(), Op::CharEq);
                return Ok(TypeName::bool());
            }
            BinaryOperator::NotEquals => {
                emit_op(com.code(), Op::CharNe);
                return Ok(TypeName::bool());
            }
            _ => return Err(mismatch(&type_name, &type_name)),
        },
        Fundamental::Bool => {
            let bool_op = match op {
                BinaryOperator::And => Op::BoolAnd,
                BinaryOperator::Or => Op::BoolOr,
                BinaryOperator::Equals => Op::BoolEq,
                BinaryOperator::NotEquals => Op::BoolNe,
                _ => return Err(mismatch(&type_name, &type_name)),
            };
            emit_op(com.code(), bool_op);
            return Ok(TypeName::bool());
        }
        _ => {}
    }

    if let Some([eq, ne, lt, le, gt, ge]) = comparison_ops(fundamental) {
        let comparison = match op {
            BinaryOperator::Equals => Some(eq),
            BinaryOperator::NotEquals => Some(ne),
            BinaryOperator::LessThan => Some(lt),
            BinaryOperator::LessThanOrEqual => Some(le),
            BinaryOperator::GreaterThan => Some(gt),
            BinaryOperator::GreaterThanOrEqual => Some(ge),
            _ => None,
        };
        if let Some(comparison) = comparison {
            emit_op(com.code(), comparison);
            return Ok(TypeName::bool());
        }
    }

    if let Some([add, sub, mul, div, modulus]) = arithmetic_ops(fundamental) {
        let arithmetic = match op {
            BinaryOperator::Add => add,
            BinaryOperator::Subtract => sub,
            BinaryOperator::Multiply => mul,
            BinaryOperator::Divide => div,
            BinaryOperator::Modulus => modulus,
            _ => None,
        };
        if let Some(arithmetic) = arithmetic {
            emit_op(com.code(), arithmetic);
            return Ok(type_name);
        }
    }

    Err(mismatch(&type_name, &type_name))
}

fn get_constructor_params(
    com: &Codegen,
    type_name: &TypeName,
) -> Vec<TypeName> {
    if type_name.is_fundamental() {
        return vec![type_name.clone()];
    }
    com.types
        .fields_of(type_name)
        .into_iter()
        .map(|field| field.type_name)
        .collect()
}

fn push_call_expr(
    com: &mut Codegen,
    location: &TextLocation,
    callee: &Expression,
    args: &[Expression],
) -> Result<TypeName, CompileError> {
    let callee_type = com.type_of_expr(callee)?;

    match &callee_type.kind {
        // Constructor
        TypeKind::TypeValue(inner) => {
            let obj_type = (**inner).clone();
            if args.is_empty() {
                // default constructor: reserve zeroed storage
                let size = com.types.size_of(&obj_type)?;
                emit_op(com.code(), Op::Push);
                emit_u64(com.code(), size);
                return Ok(obj_type);
            }
            let expected_params = get_constructor_params(com, &obj_type);
            if args.len() != expected_params.len() {
                return_type_error!(
                    location.clone(),
                    "bad number of arguments to constructor call: expected {}, got {}",
                    expected_params.len(),
                    args.len()
                );
            }
            for (arg, expected) in args.iter().zip(&expected_params) {
                com.push_copy_typechecked(arg, expected, location)?;
            }
            Ok(obj_type)
        }

        // Function pointer call
        TypeKind::FunctionPtr {
            param_types,
            return_type,
        } => {
            let param_types = param_types.clone();
            let return_type = (**return_type).clone();
            if args.len() != param_types.len() {
                return_type_error!(
                    location.clone(),
                    "invalid number of args for function call: expected {}, got {}",
                    param_types.len(),
                    args.len()
                );
            }
            let mut args_size = 0;
            for (arg, expected) in args.iter().zip(&param_types) {
                com.push_copy_typechecked(arg, expected, location)?;
                args_size += com.types.size_of(expected)?;
            }
            push_expr(com, CompileType::Val, callee)?;
            emit_op(com.code(), Op::Call);
            emit_u64(com.code(), args_size);
            Ok(return_type)
        }

        // Builtin call
        TypeKind::Builtin {
            id,
            param_types,
            return_type,
            ..
        } => {
            let id = *id;
            let param_types = param_types.clone();
            let return_type = (**return_type).clone();
            if args.len() != param_types.len() {
                return_type_error!(
                    location.clone(),
                    "bad number of arguments to builtin call: expected {}, got {}",
                    param_types.len(),
                    args.len()
                );
            }
            for (arg, expected) in args.iter().zip(&param_types) {
                com.push_copy_typechecked(arg, expected, location)?;
            }
            emit_op(com.code(), Op::BuiltinCall);
            emit_u64(com.code(), id);
            Ok(return_type)
        }

        // Member function call: the bound instance pointer goes first
        TypeKind::BoundMethod {
            function_id,
            param_types,
            return_type,
        } => {
            let function_id = *function_id;
            let param_types = param_types.clone();
            let return_type = (**return_type).clone();
            if args.len() != param_types.len() - 1 {
                return_type_error!(
                    location.clone(),
                    "invalid number of args for function call: expected {}, got {}",
                    param_types.len() - 1,
                    args.len()
                );
            }

            // the bound method type wraps a pointer to the instance, so the
            // types deliberately mismatch here and a plain push is used
            push_expr(com, CompileType::Val, callee)?;
            let mut args_size = com.types.size_of(&param_types[0])?;

            for (arg, expected) in args.iter().zip(&param_types[1..]) {
                com.push_copy_typechecked(arg, expected, location)?;
                args_size += com.types.size_of(expected)?;
            }

            emit_op(com.code(), Op::PushFunctionPtr);
            emit_u64(com.code(), function_id);
            emit_op(com.code(), Op::Call);
            emit_u64(com.code(), args_size);
            Ok(return_type)
        }

        // `.size` on arrays, spans and arenas
        TypeKind::BoundBuiltinMethod { name, receiver } => {
            let receiver = (**receiver).clone();
            if !args.is_empty() {
                return_type_error!(location.clone(), "'{}' takes no arguments", name);
            }
            if receiver.is_array() && name == "size" {
                emit_op(com.code(), Op::PushU64);
                emit_u64(com.code(), receiver.array_length());
                return Ok(TypeName::u64());
            }
            if receiver.is_span() && name == "size" {
                push_expr(com, CompileType::Val, callee)?; // pointer to the span
                emit_op(com.code(), Op::PushU64);
                emit_u64(com.code(), PTR_SIZE);
                emit_op(com.code(), Op::U64Add); // offset to the length word
                emit_op(com.code(), Op::Load);
                emit_u64(com.code(), 8);
                return Ok(TypeName::u64());
            }
            if receiver.is_arena() && name == "size" {
                push_expr(com, CompileType::Val, callee)?; // pointer to the arena
                emit_op(com.code(), Op::Load);
                emit_u64(com.code(), PTR_SIZE); // load the arena handle
                emit_op(com.code(), Op::ArenaSize);
                return Ok(TypeName::u64());
            }
            return_type_error!(location.clone(), "unable to call '{}' on '{}'", name, receiver)
        }

        _ => {
            return_type_error!(
                location.clone(),
                "unable to call non-callable type {}",
                callee_type
            )
        }
    }
}

fn push_span_expr(
    com: &mut Codegen,
    ct: CompileType,
    location: &TextLocation,
    expr: &Expression,
    lower_bound: &Option<Box<Expression>>,
    upper_bound: &Option<Box<Expression>>,
) -> Result<TypeName, CompileError> {
    require_val(ct, location, "a span expression")?;

    let type_name = com.type_of_expr(expr)?;
    if type_name.is_type_value() {
        // type constructor: `T[]` is the span type
        return Ok(TypeName::type_value(type_name.inner_type().add_span()));
    }

    if !type_name.is_array() && !type_name.is_span() {
        return_type_error!(
            location.clone(),
            "can only span arrays and other spans, not {}",
            type_name
        );
    }

    push_expr(com, CompileType::Ptr, expr)?;

    // A span holds the address of its data; switch to it by loading
    if type_name.is_span() {
        emit_op(com.code(), Op::Load);
        emit_u64(com.code(), PTR_SIZE);
    }

    let inner = type_name.inner_type();
    let inner_size = com.types.size_of(&inner)?;

    if let Some(lower) = lower_bound {
        // move the base pointer up by lower * elem_size
        emit_op(com.code(), Op::PushU64);
        emit_u64(com.code(), inner_size);
        let lower_type = push_expr(com, CompileType::Val, lower)?.remove_const();
        if lower_type != TypeName::u64() {
            return_type_error!(lower.location.clone(), "subspan indices must be u64");
        }
        emit_op(com.code(), Op::U64Mul);
        emit_op(com.code(), Op::U64Add);
    }

    // second half of the span: the length word
    match (lower_bound, upper_bound) {
        (Some(lower), Some(upper)) => {
            let upper_type = push_expr(com, CompileType::Val, upper)?.remove_const();
            if upper_type != TypeName::u64() {
                return_type_error!(upper.location.clone(), "subspan indices must be u64");
            }
            push_expr(com, CompileType::Val, lower)?;
            emit_op(com.code(), Op::U64Sub);
        }
        _ => {
            if type_name.is_span() {
                // load the length out of the source span
                push_expr(com, CompileType::Ptr, expr)?;
                emit_op(com.code(), Op::PushU64);
                emit_u64(com.code(), PTR_SIZE);
                emit_op(com.code(), Op::U64Add);
                emit_op(com.code(), Op::Load);
                emit_u64(com.code(), 8);
            } else {
                emit_op(com.code(), Op::PushU64);
                emit_u64(com.code(), type_name.array_length());
            }
        }
    }

    // element const-ness propagates out of const arrays and spans
    if type_name.is_array() {
        if type_name.is_const {
            Ok(inner.add_const().add_span())
        } else {
            Ok(inner.add_span())
        }
    } else if type_name.is_const {
        Ok(inner.add_const().add_span())
    } else {
        Ok(type_name)
    }
}

fn push_new_expr(
    com: &mut Codegen,
    ct: CompileType,
    location: &TextLocation,
    object: &Expression,
    count: &Option<Box<Expression>>,
    arena: &Expression,
) -> Result<TypeName, CompileError> {
    require_val(ct, location, "a new expression")?;

    // build the object on the stack; a bare type default-constructs
    let object_type = com.type_of_expr(object)?;
    let elem_type = if object_type.is_type_value() {
        let inner = object_type.inner_type();
        let size = com.types.size_of(&inner)?;
        emit_op(com.code(), Op::Push);
        emit_u64(com.code(), size);
        inner
    } else {
        push_expr(com, CompileType::Val, object)?.remove_const()
    };
    if elem_type.is_arena() {
        return_type_error!(location.clone(), "arenas can not be arena-allocated");
    }
    let elem_size = com.types.size_of(&elem_type)?;

    if let Some(count) = count {
        let count_type = push_expr(com, CompileType::Val, count)?.remove_const();
        if count_type != TypeName::u64() {
            return_type_error!(
                count.location.clone(),
                "wrong type for span size when allocating: expected u64, got {}",
                count_type
            );
        }
        let arena_type = push_expr(com, CompileType::Val, arena)?;
        let stripped = com.auto_deref_pointer(&arena_type); // by value or pointer
        if !stripped.is_arena() {
            return_type_error!(arena.location.clone(), "'new' requires an arena, got {}", stripped);
        }
        emit_op(com.code(), Op::ArenaAllocArray);
        emit_u64(com.code(), elem_size);
        Ok(elem_type.add_span())
    } else {
        let arena_type = push_expr(com, CompileType::Val, arena)?;
        let stripped = com.auto_deref_pointer(&arena_type);
        if !stripped.is_arena() {
            return_type_error!(arena.location.clone(), "'new' requires an arena, got {}", stripped);
        }
        emit_op(com.code(), Op::ArenaAlloc);
        emit_u64(com.code(), elem_size);
        Ok(elem_type.add_ptr())
    }
}

// A name can be a function (template), a type (template), a builtin, or a
// variable, resolved in that order.
fn push_name_expr(
    com: &mut Codegen,
    ct: CompileType,
    location: &TextLocation,
    name: &str,
    template_args: &[Expression],
) -> Result<TypeName, CompileError> {
    let global = TypeName::structure("");

    // function template needing instantiation at this use
    let base_name = com.fn_name(&global, name, &[])?;
    let full_name = com.fn_name(&global, name, template_args)?;
    com.instantiate_function_template(location, &base_name, &full_name, template_args)?;

    // struct template needing instantiation at this use
    let struct_type = com.struct_name(name, template_args)?;
    if com.struct_templates.contains_key(name)
        && com.instantiate_struct_template(location, name, &struct_type, template_args)?
    {
        if ct != CompileType::Val {
            return_rule_error!(location.clone(), "cannot take the address of a type");
        }
        return Ok(TypeName::type_value(struct_type));
    }

    // a compiled function
    if let Some((id, sig)) = com.get_function(&full_name) {
        require_val(ct, location, "a function ptr")?;
        emit_op(com.code(), Op::PushFunctionPtr);
        emit_u64(com.code(), id);
        return Ok(TypeName::new(TypeKind::FunctionPtr {
            param_types: sig.params,
            return_type: Box::new(sig.return_type),
        }));
    }

    // a builtin
    if let Some(builtin) = crate::compiler::builtins::get_builtin(name) {
        require_val(ct, location, "a builtin")?;
        if !template_args.is_empty() {
            return_type_error!(location.clone(), "builtins cannot be templated");
        }
        return Ok(TypeName::new(TypeKind::Builtin {
            name: builtin.name.to_string(),
            id: builtin.id,
            param_types: builtin.param_types.clone(),
            return_type: Box::new(builtin.return_type.clone()),
        }));
    }

    // a registered type
    if com.types.contains(&struct_type) {
        require_val(ct, location, "a type")?;
        return Ok(TypeName::type_value(struct_type));
    }

    // otherwise it must be a variable
    if !template_args.is_empty() {
        return_type_error!(location.clone(), "variables cannot be templated ({})", name);
    }
    if ct == CompileType::Ptr {
        return com.push_var_addr(location, name);
    }
    let type_name = com.push_var_addr(location, name)?;
    let size = com.types.size_of(&type_name)?;
    emit_op(com.code(), Op::Load);
    emit_u64(com.code(), size);
    Ok(type_name)
}

fn strip_pointers(type_name: &TypeName) -> TypeName {
    let mut t = type_name.clone();
    while t.is_ptr() {
        t = t.remove_ptr();
    }
    t
}

fn push_field_expr(
    com: &mut Codegen,
    ct: CompileType,
    location: &TextLocation,
    expr: &Expression,
    field_name: &str,
    template_args: &[Expression],
) -> Result<TypeName, CompileError> {
    let type_name = com.type_of_expr(expr)?;
    if type_name.is_type_value() {
        return_type_error!(location.clone(), "fields of types are not supported");
    }

    let stripped = strip_pointers(&type_name);

    // compile the member function at this call site if it is still a stash
    let base_name = com.fn_name(&stripped, field_name, &[])?;
    let full_name = com.fn_name(&stripped, field_name, template_args)?;
    if com.function_templates.contains_key(&base_name)
        && com.get_function(&full_name).is_none()
    {
        let ast = com.function_templates[&base_name].clone();
        let struct_context = stripped.clone().remove_const();
        let struct_templates = com.types.templates_of(&struct_context);
        com.enter_struct(struct_context, struct_templates);
        let map = com.build_template_map(location, &ast.templates, template_args)?;
        let result = com.compile_function(location, &full_name, &ast.sig, &ast.body, map);
        com.exit_struct();
        result?;
    }

    // a member function binds the instance pointer
    if let Some((id, sig)) = com.get_function(&full_name) {
        require_val(ct, location, "a bound method")?;
        push_expr(com, CompileType::Ptr, expr)?; // pointer to the instance
        let base = com.auto_deref_pointer(&type_name); // access through pointers
        if base.is_const && !sig.params[0].remove_ptr().is_const {
            return_type_error!(
                location.clone(),
                "cannot bind a const variable to a non-const member function"
            );
        }
        return Ok(TypeName::new(TypeKind::BoundMethod {
            function_id: id,
            param_types: sig.params,
            return_type: Box::new(sig.return_type),
        }));
    }

    // `.size` on the builtin sequence types
    if (stripped.is_array() || stripped.is_span() || stripped.is_arena()) && field_name == "size" {
        if !template_args.is_empty() {
            return_type_error!(location.clone(), "builtin member functions cannot be templated");
        }
        require_val(ct, location, "a bound builtin method")?;
        push_expr(com, CompileType::Ptr, expr)?; // pointer to the instance
        com.auto_deref_pointer(&type_name);
        return Ok(TypeName::new(TypeKind::BoundBuiltinMethod {
            name: field_name.to_string(),
            receiver: Box::new(stripped),
        }));
    }

    // otherwise it is a data member
    if !template_args.is_empty() {
        return_type_error!(location.clone(), "data members cannot be templated");
    }
    push_expr(com, CompileType::Ptr, expr)?;
    com.auto_deref_pointer(&type_name);

    let struct_type = stripped.clone().remove_const();
    let Some((offset, mut field_type)) = com.types.field_offset(&struct_type, field_name)? else {
        return_type_error!(
            location.clone(),
            "could not find field '{}' for type '{}'",
            field_name,
            struct_type
        );
    };
    emit_op(com.code(), Op::PushU64);
    emit_u64(com.code(), offset);
    emit_op(com.code(), Op::U64Add);

    if ct == CompileType::Val {
        let size = com.types.size_of(&field_type)?;
        emit_op(com.code(), Op::Load);
        emit_u64(com.code(), size);
    }

    if stripped.is_const {
        field_type.is_const = true; // const propagates to fields
    }
    Ok(field_type)
}

fn push_subscript_expr(
    com: &mut Codegen,
    ct: CompileType,
    location: &TextLocation,
    node: &Expression,
    expr: &Expression,
    index: &Expression,
) -> Result<TypeName, CompileError> {
    let type_name = com.type_of_expr(expr)?;

    if type_name.is_type_value() {
        // type constructor: `T[N]` is the array type
        let count = match &index.kind {
            ExpressionKind::LiteralU64(count) => *count,
            ExpressionKind::LiteralI64(count) if *count > 0 => *count as u64,
            _ => {
                return_type_error!(
                    location.clone(),
                    "array length must be a positive integer literal"
                )
            }
        };
        return Ok(TypeName::type_value(
            type_name.inner_type().add_array(count),
        ));
    }

    if ct == CompileType::Ptr {
        let is_array = type_name.is_array();
        let is_span = type_name.is_span();
        if !is_array && !is_span {
            return_type_error!(
                location.clone(),
                "subscript only supported for arrays and spans"
            );
        }

        push_expr(com, CompileType::Ptr, expr)?;

        // A span holds the address of its data; switch to it by loading
        if is_span {
            emit_op(com.code(), Op::Load);
            emit_u64(com.code(), PTR_SIZE);
        }

        let inner = type_name.inner_type();
        let index_type = push_expr(com, CompileType::Val, index)?.remove_const();
        if index_type != TypeName::u64() {
            return_type_error!(
                index.location.clone(),
                "subscript argument must be u64, got {}",
                index_type
            );
        }

        // debug builds bounds-check array subscripts
        if com.config.debug && is_array {
            let message = format!("line {}: array index out of range", location.start_pos.line_number);
            let offset = com.insert_into_rom(message.as_bytes());
            emit_op(com.code(), Op::PushU64);
            emit_u64(com.code(), type_name.array_length());
            emit_op(com.code(), Op::BoundsCheck);
            emit_u64(com.code(), offset);
            emit_u64(com.code(), message.len() as u64);
        }

        // offset the pointer by index * elem_size
        let inner_size = com.types.size_of(&inner)?;
        emit_op(com.code(), Op::PushU64);
        emit_u64(com.code(), inner_size);
        emit_op(com.code(), Op::U64Mul);
        emit_op(com.code(), Op::U64Add);

        if is_array && type_name.is_const {
            return Ok(inner.add_const()); // const propagates to elements
        }
        return Ok(inner);
    }

    let element_type = push_expr(com, CompileType::Ptr, node)?;
    let size = com.types.size_of(&element_type)?;
    emit_op(com.code(), Op::Load);
    emit_u64(com.code(), size);
    Ok(element_type)
}
