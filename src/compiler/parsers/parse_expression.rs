//! Expression parsing.
//!
//! Precedence-climbing over a fixed operator table, with a postfix loop for
//! calls, subscripts, spans, field access, template arguments and the
//! postfix type operators (`&`, `~`, `const`).
//!
//! Types are ordinary expressions here; whether a name denotes a variable,
//! function or type is resolved during code generation.

use crate::compiler::compiler_errors::CompileError;
use crate::compiler::parsers::ast_nodes::{
    BinaryOperator, Expression, ExpressionKind, UnaryOperator,
};
use crate::compiler::parsers::tokenizer::tokens::{IntSuffix, TokenKind, TokenStream};
use crate::return_syntax_error;

/// Binary operator binding levels, tightest first
fn binary_operator(kind: &TokenKind) -> Option<(BinaryOperator, u8)> {
    let entry = match kind {
        TokenKind::Star => (BinaryOperator::Multiply, 1),
        TokenKind::Slash => (BinaryOperator::Divide, 1),
        TokenKind::Percent => (BinaryOperator::Modulus, 1),
        TokenKind::Plus => (BinaryOperator::Add, 2),
        TokenKind::Minus => (BinaryOperator::Subtract, 2),
        TokenKind::Less => (BinaryOperator::LessThan, 3),
        TokenKind::LessEquals => (BinaryOperator::LessThanOrEqual, 3),
        TokenKind::Greater => (BinaryOperator::GreaterThan, 3),
        TokenKind::GreaterEquals => (BinaryOperator::GreaterThanOrEqual, 3),
        TokenKind::EqualsEquals => (BinaryOperator::Equals, 3),
        TokenKind::BangEquals => (BinaryOperator::NotEquals, 3),
        TokenKind::AmpersandAmpersand => (BinaryOperator::And, 4),
        TokenKind::BarBar => (BinaryOperator::Or, 5),
        _ => return None,
    };
    Some(entry)
}

const MAX_PRECEDENCE: u8 = 5;

pub fn create_expression(tokens: &mut TokenStream) -> Result<Expression, CompileError> {
    parse_binary(tokens, MAX_PRECEDENCE)
}

fn parse_binary(tokens: &mut TokenStream, level: u8) -> Result<Expression, CompileError> {
    if level == 0 {
        return parse_unary(tokens);
    }

    let mut left = parse_binary(tokens, level - 1)?;
    while let Some((op, op_level)) = binary_operator(tokens.current_token_kind()) {
        if op_level != level {
            break;
        }
        let location = tokens.current_location();
        tokens.advance();
        let right = parse_binary(tokens, level - 1)?;
        left = Expression::new(
            ExpressionKind::BinaryOp {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            },
            location,
        );
    }
    Ok(left)
}

fn parse_unary(tokens: &mut TokenStream) -> Result<Expression, CompileError> {
    let location = tokens.current_location();
    match tokens.current_token_kind() {
        TokenKind::Minus => {
            tokens.advance();
            let expr = parse_unary(tokens)?;
            Ok(Expression::new(
                ExpressionKind::UnaryOp {
                    op: UnaryOperator::Negate,
                    expr: Box::new(expr),
                },
                location,
            ))
        }
        TokenKind::Bang => {
            tokens.advance();
            let expr = parse_unary(tokens)?;
            Ok(Expression::new(
                ExpressionKind::UnaryOp {
                    op: UnaryOperator::Not,
                    expr: Box::new(expr),
                },
                location,
            ))
        }
        _ => parse_postfix(tokens),
    }
}

fn parse_postfix(tokens: &mut TokenStream) -> Result<Expression, CompileError> {
    let mut expr = parse_primary(tokens)?;

    loop {
        let location = tokens.current_location();
        match tokens.current_token_kind() {
            // Call
            TokenKind::OpenParenthesis => {
                tokens.advance();
                let mut args = Vec::new();
                if !tokens.consume_maybe(&TokenKind::CloseParenthesis) {
                    loop {
                        args.push(create_expression(tokens)?);
                        if !tokens.consume_maybe(&TokenKind::Comma) {
                            break;
                        }
                    }
                    tokens.consume_only(&TokenKind::CloseParenthesis)?;
                }
                expr = Expression::new(
                    ExpressionKind::Call {
                        expr: Box::new(expr),
                        args,
                    },
                    location,
                );
            }

            // Subscript or span
            TokenKind::OpenBracket => {
                tokens.advance();
                expr = parse_bracket_suffix(tokens, expr, location)?;
            }

            // Field access
            TokenKind::Dot => {
                tokens.advance();
                let (field_name, _) = tokens.consume_symbol()?;
                expr = Expression::new(
                    ExpressionKind::FieldAccess {
                        expr: Box::new(expr),
                        field_name,
                        template_args: Vec::new(),
                    },
                    location,
                );
            }

            // Template arguments attach to the name or field they follow
            TokenKind::Bang if *tokens.peek_kind(1) == TokenKind::OpenParenthesis => {
                tokens.advance();
                tokens.advance();
                let mut template_args = Vec::new();
                loop {
                    template_args.push(create_expression(tokens)?);
                    if !tokens.consume_maybe(&TokenKind::Comma) {
                        break;
                    }
                }
                tokens.consume_only(&TokenKind::CloseParenthesis)?;

                match &mut expr.kind {
                    ExpressionKind::Name {
                        template_args: slot,
                        ..
                    }
                    | ExpressionKind::FieldAccess {
                        template_args: slot,
                        ..
                    } => {
                        if !slot.is_empty() {
                            return_syntax_error!(location, "duplicate template argument list");
                        }
                        *slot = template_args;
                    }
                    _ => {
                        return_syntax_error!(
                            location,
                            "template arguments can only follow a name"
                        )
                    }
                }
            }

            // Postfix address-of: also builds pointer types
            TokenKind::Ampersand => {
                tokens.advance();
                expr = Expression::new(ExpressionKind::AddrOf(Box::new(expr)), location);
            }

            // Postfix dereference
            TokenKind::Tilde => {
                tokens.advance();
                expr = Expression::new(ExpressionKind::Deref(Box::new(expr)), location);
            }

            // Postfix const type qualifier
            TokenKind::Const => {
                tokens.advance();
                expr = Expression::new(ExpressionKind::ConstType(Box::new(expr)), location);
            }

            _ => break,
        }
    }

    Ok(expr)
}

// The opening bracket has been consumed. Either a subscript `[index]`, a
// bounded span `[lo:hi]`, or an unbounded span `[]` / `[:]`.
fn parse_bracket_suffix(
    tokens: &mut TokenStream,
    expr: Expression,
    location: crate::compiler::parsers::tokenizer::tokens::TextLocation,
) -> Result<Expression, CompileError> {
    if tokens.consume_maybe(&TokenKind::CloseBracket) {
        return Ok(Expression::new(
            ExpressionKind::Span {
                expr: Box::new(expr),
                lower_bound: None,
                upper_bound: None,
            },
            location,
        ));
    }

    if tokens.consume_maybe(&TokenKind::Colon) {
        tokens.consume_only(&TokenKind::CloseBracket)?;
        return Ok(Expression::new(
            ExpressionKind::Span {
                expr: Box::new(expr),
                lower_bound: None,
                upper_bound: None,
            },
            location,
        ));
    }

    let first = create_expression(tokens)?;

    if tokens.consume_maybe(&TokenKind::Colon) {
        let upper = create_expression(tokens)?;
        tokens.consume_only(&TokenKind::CloseBracket)?;
        return Ok(Expression::new(
            ExpressionKind::Span {
                expr: Box::new(expr),
                lower_bound: Some(Box::new(first)),
                upper_bound: Some(Box::new(upper)),
            },
            location,
        ));
    }

    tokens.consume_only(&TokenKind::CloseBracket)?;
    Ok(Expression::new(
        ExpressionKind::Subscript {
            expr: Box::new(expr),
            index: Box::new(first),
        },
        location,
    ))
}

fn int_literal_kind(
    value: u64,
    suffix: IntSuffix,
    location: &crate::compiler::parsers::tokenizer::tokens::TextLocation,
) -> Result<ExpressionKind, CompileError> {
    let kind = match suffix {
        IntSuffix::I32 => {
            if value > i32::MAX as u64 {
                return_syntax_error!(location.clone(), "literal '{}' does not fit in i32", value);
            }
            ExpressionKind::LiteralI32(value as i32)
        }
        IntSuffix::None | IntSuffix::I64 => {
            if value > i64::MAX as u64 {
                return_syntax_error!(location.clone(), "literal '{}' does not fit in i64", value);
            }
            ExpressionKind::LiteralI64(value as i64)
        }
        IntSuffix::U64 => ExpressionKind::LiteralU64(value),
    };
    Ok(kind)
}

fn parse_primary(tokens: &mut TokenStream) -> Result<Expression, CompileError> {
    let location = tokens.current_location();
    let kind = tokens.current_token_kind().clone();

    let expr_kind = match kind {
        TokenKind::IntLiteral(value, suffix) => {
            tokens.advance();
            int_literal_kind(value, suffix, &location)?
        }
        TokenKind::FloatLiteral(value) => {
            tokens.advance();
            ExpressionKind::LiteralF64(value)
        }
        TokenKind::CharLiteral(value) => {
            tokens.advance();
            ExpressionKind::LiteralChar(value)
        }
        TokenKind::StringLiteral(value) => {
            tokens.advance();
            ExpressionKind::LiteralString(value)
        }
        TokenKind::True => {
            tokens.advance();
            ExpressionKind::LiteralBool(true)
        }
        TokenKind::False => {
            tokens.advance();
            ExpressionKind::LiteralBool(false)
        }
        TokenKind::Null => {
            tokens.advance();
            ExpressionKind::LiteralNull
        }
        TokenKind::Nullptr => {
            tokens.advance();
            ExpressionKind::LiteralNullptr
        }

        TokenKind::Symbol(name) => {
            tokens.advance();
            ExpressionKind::Name {
                name,
                template_args: Vec::new(),
            }
        }

        // Fundamental type keywords are names for code generation
        TokenKind::BoolType
        | TokenKind::CharType
        | TokenKind::I32Type
        | TokenKind::I64Type
        | TokenKind::U64Type
        | TokenKind::F64Type => {
            let name = match kind {
                TokenKind::BoolType => "bool",
                TokenKind::CharType => "char",
                TokenKind::I32Type => "i32",
                TokenKind::I64Type => "i64",
                TokenKind::U64Type => "u64",
                TokenKind::F64Type => "f64",
                _ => unreachable!(),
            };
            tokens.advance();
            ExpressionKind::Name {
                name: name.to_string(),
                template_args: Vec::new(),
            }
        }

        TokenKind::OpenParenthesis => {
            tokens.advance();
            let inner = create_expression(tokens)?;
            tokens.consume_only(&TokenKind::CloseParenthesis)?;
            return Ok(inner);
        }

        // Array literal `[a, b, c]` or repeat form `[value; count]`
        TokenKind::OpenBracket => {
            tokens.advance();
            if tokens.consume_maybe(&TokenKind::CloseBracket) {
                return_syntax_error!(location, "cannot have empty array literals");
            }
            let first = create_expression(tokens)?;

            if tokens.consume_maybe(&TokenKind::Semicolon) {
                let count = match tokens.current_token_kind() {
                    TokenKind::IntLiteral(count, IntSuffix::U64 | IntSuffix::None) => *count,
                    other => {
                        return_syntax_error!(
                            tokens.current_location(),
                            "repeat array count must be an integer literal, got '{}'",
                            other
                        )
                    }
                };
                tokens.advance();
                tokens.consume_only(&TokenKind::CloseBracket)?;
                if count == 0 {
                    return_syntax_error!(location, "cannot have empty array literals");
                }
                ExpressionKind::RepeatArrayLiteral {
                    value: Box::new(first),
                    count,
                }
            } else {
                let mut elements = vec![first];
                while tokens.consume_maybe(&TokenKind::Comma) {
                    elements.push(create_expression(tokens)?);
                }
                tokens.consume_only(&TokenKind::CloseBracket)?;
                ExpressionKind::ArrayLiteral(elements)
            }
        }

        TokenKind::Sizeof => {
            tokens.advance();
            tokens.consume_only(&TokenKind::OpenParenthesis)?;
            let inner = create_expression(tokens)?;
            tokens.consume_only(&TokenKind::CloseParenthesis)?;
            ExpressionKind::Sizeof(Box::new(inner))
        }

        TokenKind::Typeof => {
            tokens.advance();
            tokens.consume_only(&TokenKind::OpenParenthesis)?;
            let inner = create_expression(tokens)?;
            tokens.consume_only(&TokenKind::CloseParenthesis)?;
            ExpressionKind::Typeof(Box::new(inner))
        }

        // `new T using a` / `new T : count using a`
        TokenKind::New => {
            tokens.advance();
            let object = parse_postfix(tokens)?;

            let count = if tokens.consume_maybe(&TokenKind::Colon) {
                Some(Box::new(create_expression(tokens)?))
            } else {
                None
            };

            if !tokens.peek_contextual("using") {
                return_syntax_error!(
                    tokens.current_location(),
                    "expected 'using' and an arena after 'new'"
                );
            }
            tokens.advance();
            let arena = create_expression(tokens)?;

            ExpressionKind::New {
                object: Box::new(object),
                count,
                arena: Box::new(arena),
            }
        }

        // Function pointer type literal `fn(T1, T2) -> R`
        TokenKind::Fn => {
            tokens.advance();
            tokens.consume_only(&TokenKind::OpenParenthesis)?;
            let mut param_types = Vec::new();
            if !tokens.consume_maybe(&TokenKind::CloseParenthesis) {
                loop {
                    param_types.push(create_expression(tokens)?);
                    if !tokens.consume_maybe(&TokenKind::Comma) {
                        break;
                    }
                }
                tokens.consume_only(&TokenKind::CloseParenthesis)?;
            }
            let return_type = if tokens.consume_maybe(&TokenKind::Arrow) {
                Some(Box::new(create_expression(tokens)?))
            } else {
                None
            };
            ExpressionKind::FunctionPtrType {
                param_types,
                return_type,
            }
        }

        other => {
            return_syntax_error!(
                location,
                "expected a value, variable or type, got '{}'",
                other
            )
        }
    };

    Ok(Expression::new(expr_kind, location))
}
