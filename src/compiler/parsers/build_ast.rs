//! Statement parsing: builds the module AST from a token stream.
//!
//! `var`, `arena`, `print` and `using` are contextual keywords; the lexer
//! emits them as symbols and this parser recognizes them in statement
//! position, so they remain usable as ordinary names elsewhere.

use crate::ast_log;
use crate::compiler::compiler_errors::CompileError;
use crate::compiler::parsers::ast_nodes::{
    Ast, Expression, ExpressionKind, FunctionDef, FunctionSignature, Param, Statement,
    StatementKind, StructDef,
};
use crate::compiler::parsers::parse_expression::create_expression;
use crate::compiler::parsers::tokenizer::tokens::{TokenKind, TokenStream};
use crate::return_syntax_error;

impl Ast {
    pub fn new(tokens: &mut TokenStream) -> Result<Ast, CompileError> {
        let mut statements = Vec::new();
        while !tokens.is_eof() {
            let statement = parse_statement(tokens)?;
            ast_log!("parsed statement: {:?}", statement.kind);
            statements.push(statement);
        }
        Ok(Ast { statements })
    }
}

fn parse_statement(tokens: &mut TokenStream) -> Result<Statement, CompileError> {
    let location = tokens.current_location();

    match tokens.current_token_kind() {
        TokenKind::OpenBrace => parse_block(tokens),

        TokenKind::Struct => parse_struct(tokens),

        TokenKind::Fn => {
            let function = parse_function(tokens)?;
            Ok(Statement::new(StatementKind::FunctionDef(function), location))
        }

        TokenKind::If => parse_if(tokens),

        TokenKind::While => {
            tokens.advance();
            let condition = create_expression(tokens)?;
            let body = parse_block(tokens)?;
            Ok(Statement::new(
                StatementKind::While {
                    condition,
                    body: Box::new(body),
                },
                location,
            ))
        }

        TokenKind::Loop => {
            tokens.advance();
            let body = parse_block(tokens)?;
            Ok(Statement::new(
                StatementKind::Loop {
                    body: Box::new(body),
                },
                location,
            ))
        }

        TokenKind::For => {
            tokens.advance();
            let (name, _) = tokens.consume_symbol()?;
            tokens.consume_only(&TokenKind::In)?;
            let iter = create_expression(tokens)?;
            let body = parse_block(tokens)?;
            Ok(Statement::new(
                StatementKind::For {
                    name,
                    iter,
                    body: Box::new(body),
                },
                location,
            ))
        }

        TokenKind::Break => {
            tokens.advance();
            tokens.consume_only(&TokenKind::Semicolon)?;
            Ok(Statement::new(StatementKind::Break, location))
        }

        TokenKind::Continue => {
            tokens.advance();
            tokens.consume_only(&TokenKind::Semicolon)?;
            Ok(Statement::new(StatementKind::Continue, location))
        }

        TokenKind::Return => {
            tokens.advance();
            let expr = if tokens.consume_maybe(&TokenKind::Semicolon) {
                None
            } else {
                let value = create_expression(tokens)?;
                tokens.consume_only(&TokenKind::Semicolon)?;
                Some(value)
            };
            Ok(Statement::new(StatementKind::Return { expr }, location))
        }

        TokenKind::Assert => {
            tokens.advance();
            let expr = create_expression(tokens)?;
            tokens.consume_only(&TokenKind::Semicolon)?;
            Ok(Statement::new(StatementKind::Assert { expr }, location))
        }

        TokenKind::Delete => {
            tokens.advance();
            let expr = create_expression(tokens)?;
            tokens.consume_only(&TokenKind::Semicolon)?;
            Ok(Statement::new(StatementKind::Delete { expr }, location))
        }

        TokenKind::Import => {
            tokens.advance();
            let path = match tokens.current_token_kind().clone() {
                TokenKind::StringLiteral(path) => {
                    tokens.advance();
                    path
                }
                other => {
                    return_syntax_error!(
                        tokens.current_location(),
                        "expected a file path string after 'import', got '{}'",
                        other
                    )
                }
            };
            tokens.consume_only(&TokenKind::Semicolon)?;
            Ok(Statement::new(StatementKind::Import { path }, location))
        }

        // Const declaration
        TokenKind::Const if matches!(tokens.peek_kind(1), TokenKind::Symbol(_)) => {
            tokens.advance();
            parse_declaration(tokens, true)
        }

        // Contextual keywords
        TokenKind::Symbol(word) => match word.as_str() {
            "var" if matches!(tokens.peek_kind(1), TokenKind::Symbol(_)) => {
                tokens.advance();
                parse_declaration(tokens, false)
            }
            "arena"
                if matches!(tokens.peek_kind(1), TokenKind::Symbol(_))
                    && *tokens.peek_kind(2) == TokenKind::Semicolon =>
            {
                tokens.advance();
                let (name, _) = tokens.consume_symbol()?;
                tokens.consume_only(&TokenKind::Semicolon)?;
                Ok(Statement::new(StatementKind::ArenaDeclaration { name }, location))
            }
            "print" if *tokens.peek_kind(1) == TokenKind::OpenParenthesis => {
                tokens.advance();
                parse_print(tokens, location)
            }
            _ => parse_assignment_or_expression(tokens),
        },

        _ => parse_assignment_or_expression(tokens),
    }
}

fn parse_block(tokens: &mut TokenStream) -> Result<Statement, CompileError> {
    let location = tokens.current_location();
    tokens.consume_only(&TokenKind::OpenBrace)?;
    let mut statements = Vec::new();
    while !tokens.consume_maybe(&TokenKind::CloseBrace) {
        if tokens.is_eof() {
            return_syntax_error!(location, "unclosed block, expected '}}'");
        }
        statements.push(parse_statement(tokens)?);
    }
    Ok(Statement::new(StatementKind::Block(statements), location))
}

// `name := expr ;` or `name : type = expr ;`, with the leading keyword
// (`var` / `const`) already consumed
fn parse_declaration(tokens: &mut TokenStream, add_const: bool) -> Result<Statement, CompileError> {
    let location = tokens.current_location();
    let (name, _) = tokens.consume_symbol()?;

    let explicit_type = if tokens.consume_maybe(&TokenKind::ColonEquals) {
        None
    } else {
        tokens.consume_only(&TokenKind::Colon)?;
        let type_expr = create_expression(tokens)?;
        tokens.consume_only(&TokenKind::Equals)?;
        Some(type_expr)
    };

    let expr = create_expression(tokens)?;
    tokens.consume_only(&TokenKind::Semicolon)?;

    Ok(Statement::new(
        StatementKind::Declaration {
            name,
            explicit_type,
            expr,
            add_const,
        },
        location,
    ))
}

fn parse_print(
    tokens: &mut TokenStream,
    location: crate::compiler::parsers::tokenizer::tokens::TextLocation,
) -> Result<Statement, CompileError> {
    tokens.consume_only(&TokenKind::OpenParenthesis)?;

    let message = match tokens.current_token_kind().clone() {
        TokenKind::StringLiteral(message) => {
            tokens.advance();
            message
        }
        other => {
            return_syntax_error!(
                tokens.current_location(),
                "print expects a string literal message, got '{}'",
                other
            )
        }
    };

    let mut args = Vec::new();
    while tokens.consume_maybe(&TokenKind::Comma) {
        args.push(create_expression(tokens)?);
    }
    tokens.consume_only(&TokenKind::CloseParenthesis)?;
    tokens.consume_only(&TokenKind::Semicolon)?;

    Ok(Statement::new(StatementKind::Print { message, args }, location))
}

fn parse_assignment_or_expression(tokens: &mut TokenStream) -> Result<Statement, CompileError> {
    let location = tokens.current_location();
    let expr = create_expression(tokens)?;

    if tokens.consume_maybe(&TokenKind::Equals) {
        let value = create_expression(tokens)?;
        tokens.consume_only(&TokenKind::Semicolon)?;
        return Ok(Statement::new(
            StatementKind::Assignment {
                target: expr,
                expr: value,
            },
            location,
        ));
    }

    tokens.consume_only(&TokenKind::Semicolon)?;
    Ok(Statement::new(StatementKind::ExpressionStmt(expr), location))
}

fn parse_if(tokens: &mut TokenStream) -> Result<Statement, CompileError> {
    let location = tokens.current_location();
    tokens.consume_only(&TokenKind::If)?;
    let condition = create_expression(tokens)?;
    let body = parse_block(tokens)?;

    let else_body = if tokens.consume_maybe(&TokenKind::Else) {
        if *tokens.current_token_kind() == TokenKind::If {
            Some(Box::new(parse_if(tokens)?))
        } else {
            Some(Box::new(parse_block(tokens)?))
        }
    } else {
        None
    };

    Ok(Statement::new(
        StatementKind::If {
            condition,
            body: Box::new(body),
            else_body,
        },
        location,
    ))
}

// Optional `!(T, U)` after a struct or function name
fn parse_template_names(tokens: &mut TokenStream) -> Result<Vec<String>, CompileError> {
    let mut names = Vec::new();
    if *tokens.current_token_kind() == TokenKind::Bang
        && *tokens.peek_kind(1) == TokenKind::OpenParenthesis
    {
        tokens.advance();
        tokens.advance();
        loop {
            let (name, _) = tokens.consume_symbol()?;
            names.push(name);
            if !tokens.consume_maybe(&TokenKind::Comma) {
                break;
            }
        }
        tokens.consume_only(&TokenKind::CloseParenthesis)?;
    }
    Ok(names)
}

fn parse_function(tokens: &mut TokenStream) -> Result<FunctionDef, CompileError> {
    let location = tokens.current_location();
    tokens.consume_only(&TokenKind::Fn)?;
    let (name, _) = tokens.consume_symbol()?;
    let templates = parse_template_names(tokens)?;

    tokens.consume_only(&TokenKind::OpenParenthesis)?;
    let mut params = Vec::new();
    if !tokens.consume_maybe(&TokenKind::CloseParenthesis) {
        loop {
            let (param_name, _) = tokens.consume_symbol()?;
            tokens.consume_only(&TokenKind::Colon)?;
            let type_expr = create_expression(tokens)?;
            params.push(Param {
                name: param_name,
                type_expr,
            });
            if !tokens.consume_maybe(&TokenKind::Comma) {
                break;
            }
        }
        tokens.consume_only(&TokenKind::CloseParenthesis)?;
    }

    let return_type = if tokens.consume_maybe(&TokenKind::Arrow) {
        Some(create_expression(tokens)?)
    } else {
        None
    };

    let body = parse_block(tokens)?;

    Ok(FunctionDef {
        name,
        templates,
        sig: FunctionSignature {
            params,
            return_type,
        },
        body: Box::new(body),
        location,
    })
}

fn parse_struct(tokens: &mut TokenStream) -> Result<Statement, CompileError> {
    let location = tokens.current_location();
    tokens.consume_only(&TokenKind::Struct)?;
    let (name, _) = tokens.consume_symbol()?;
    let templates = parse_template_names(tokens)?;

    tokens.consume_only(&TokenKind::OpenBrace)?;
    let mut fields = Vec::new();
    let mut functions = Vec::new();

    while !tokens.consume_maybe(&TokenKind::CloseBrace) {
        match tokens.current_token_kind() {
            TokenKind::Fn => functions.push(parse_function(tokens)?),
            TokenKind::Symbol(_) => {
                let (field_name, _) = tokens.consume_symbol()?;
                tokens.consume_only(&TokenKind::Colon)?;
                let type_expr = create_expression(tokens)?;
                tokens.consume_only(&TokenKind::Semicolon)?;
                fields.push(Param {
                    name: field_name,
                    type_expr,
                });
            }
            other => {
                return_syntax_error!(
                    tokens.current_location(),
                    "expected a field or member function in struct '{}', got '{}'",
                    name,
                    other
                )
            }
        }
    }

    Ok(Statement::new(
        StatementKind::StructDef(StructDef {
            name,
            templates,
            fields,
            functions,
        }),
        location,
    ))
}
