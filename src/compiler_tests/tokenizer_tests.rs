//! Unit tests for the lexer.

use crate::compiler::parsers::tokenizer::tokenizer::tokenize;
use crate::compiler::parsers::tokenizer::tokens::{IntSuffix, TokenKind};

fn kinds(source: &str) -> Vec<TokenKind> {
    let stream = tokenize(source).expect("tokenize failed");
    stream.tokens.into_iter().map(|t| t.kind).collect()
}

#[test]
fn test_punctuation_and_keywords() {
    let tokens = kinds("fn foo() -> i64 { return 1; }");
    assert_eq!(
        tokens,
        vec![
            TokenKind::Fn,
            TokenKind::Symbol("foo".to_string()),
            TokenKind::OpenParenthesis,
            TokenKind::CloseParenthesis,
            TokenKind::Arrow,
            TokenKind::I64Type,
            TokenKind::OpenBrace,
            TokenKind::Return,
            TokenKind::IntLiteral(1, IntSuffix::None),
            TokenKind::Semicolon,
            TokenKind::CloseBrace,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_integer_suffixes() {
    assert_eq!(
        kinds("1i32 2i64 3u64 4u 5"),
        vec![
            TokenKind::IntLiteral(1, IntSuffix::I32),
            TokenKind::IntLiteral(2, IntSuffix::I64),
            TokenKind::IntLiteral(3, IntSuffix::U64),
            TokenKind::IntLiteral(4, IntSuffix::U64),
            TokenKind::IntLiteral(5, IntSuffix::None),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_float_literals() {
    assert_eq!(
        kinds("1.5 0.25"),
        vec![
            TokenKind::FloatLiteral(1.5),
            TokenKind::FloatLiteral(0.25),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_field_access_is_not_a_float() {
    // `xs.size` must lex as symbol, dot, symbol
    assert_eq!(
        kinds("xs.size"),
        vec![
            TokenKind::Symbol("xs".to_string()),
            TokenKind::Dot,
            TokenKind::Symbol("size".to_string()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_two_char_operators() {
    assert_eq!(
        kinds(":= -> == != <= >= && ||"),
        vec![
            TokenKind::ColonEquals,
            TokenKind::Arrow,
            TokenKind::EqualsEquals,
            TokenKind::BangEquals,
            TokenKind::LessEquals,
            TokenKind::GreaterEquals,
            TokenKind::AmpersandAmpersand,
            TokenKind::BarBar,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_string_escapes() {
    assert_eq!(
        kinds(r#""a\nb""#),
        vec![TokenKind::StringLiteral("a\nb".to_string()), TokenKind::Eof]
    );
}

#[test]
fn test_char_literals() {
    assert_eq!(
        kinds(r"'x' '\n'"),
        vec![
            TokenKind::CharLiteral(b'x'),
            TokenKind::CharLiteral(b'\n'),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        kinds("1 # a comment\n2"),
        vec![
            TokenKind::IntLiteral(1, IntSuffix::None),
            TokenKind::IntLiteral(2, IntSuffix::None),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_line_and_column_positions() {
    let stream = tokenize("a\n  b").expect("tokenize failed");
    let a = &stream.tokens[0];
    let b = &stream.tokens[1];
    assert_eq!(a.location.start_pos.line_number, 1);
    assert_eq!(a.location.start_pos.char_column, 1);
    assert_eq!(b.location.start_pos.line_number, 2);
    assert_eq!(b.location.start_pos.char_column, 3);
}

#[test]
fn test_contextual_keywords_are_symbols() {
    assert_eq!(
        kinds("var arena print using"),
        vec![
            TokenKind::Symbol("var".to_string()),
            TokenKind::Symbol("arena".to_string()),
            TokenKind::Symbol("print".to_string()),
            TokenKind::Symbol("using".to_string()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_unterminated_string_fails() {
    assert!(tokenize("\"abc").is_err());
}

#[test]
fn test_bad_suffix_fails() {
    assert!(tokenize("1x9").is_err());
}
