//! Lexer for Vetch source code.
//!
//! Produces the closed token set consumed by the parser. Contextual words
//! (`var`, `arena`, `print`, `using`) are emitted as plain symbols.

use crate::compiler::compiler_errors::CompileError;
use crate::compiler::parsers::tokenizer::tokens::{
    CharPosition, IntSuffix, TextLocation, Token, TokenKind, TokenStream,
};
use crate::return_syntax_error;
use crate::token_log;
use std::iter::Peekable;
use std::str::Chars;

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: i32,
    column: i32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> CharPosition {
        CharPosition {
            line_number: self.line,
            char_column: self.column,
        }
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn consume_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.next_char();
            return true;
        }
        false
    }
}

fn keyword_kind(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "assert" => TokenKind::Assert,
        "bool" => TokenKind::BoolType,
        "break" => TokenKind::Break,
        "char" => TokenKind::CharType,
        "continue" => TokenKind::Continue,
        "delete" => TokenKind::Delete,
        "else" => TokenKind::Else,
        "f64" => TokenKind::F64Type,
        "false" => TokenKind::False,
        "for" => TokenKind::For,
        "fn" => TokenKind::Fn,
        "i32" => TokenKind::I32Type,
        "i64" => TokenKind::I64Type,
        "if" => TokenKind::If,
        "import" => TokenKind::Import,
        "in" => TokenKind::In,
        "loop" => TokenKind::Loop,
        "new" => TokenKind::New,
        "null" => TokenKind::Null,
        "nullptr" => TokenKind::Nullptr,
        "return" => TokenKind::Return,
        "sizeof" => TokenKind::Sizeof,
        "struct" => TokenKind::Struct,
        "true" => TokenKind::True,
        "typeof" => TokenKind::Typeof,
        "u64" => TokenKind::U64Type,
        "while" => TokenKind::While,
        "const" => TokenKind::Const,
        _ => return None,
    };
    Some(kind)
}

fn escape_char(c: char, location: &TextLocation) -> Result<u8, CompileError> {
    let escaped = match c {
        'n' => b'\n',
        't' => b'\t',
        'r' => b'\r',
        '0' => 0,
        '\\' => b'\\',
        '\'' => b'\'',
        '"' => b'"',
        _ => return_syntax_error!(location.clone(), "unknown escape sequence '\\{}'", c),
    };
    Ok(escaped)
}

/// Lex a whole source file into a token stream.
pub fn tokenize(source_code: &str) -> Result<TokenStream, CompileError> {
    let mut lexer = Lexer::new(source_code);
    let mut tokens: Vec<Token> = Vec::new();

    loop {
        // Skip whitespace and line comments
        loop {
            match lexer.peek() {
                Some(c) if c.is_whitespace() => {
                    lexer.next_char();
                }
                Some('#') => {
                    while let Some(c) = lexer.peek() {
                        if c == '\n' {
                            break;
                        }
                        lexer.next_char();
                    }
                }
                _ => break,
            }
        }

        let start = lexer.position();
        let c = match lexer.next_char() {
            Some(c) => c,
            None => {
                let location = TextLocation::new(start, start);
                tokens.push(Token::new(TokenKind::Eof, location));
                break;
            }
        };

        let kind = match c {
            '(' => TokenKind::OpenParenthesis,
            ')' => TokenKind::CloseParenthesis,
            '{' => TokenKind::OpenBrace,
            '}' => TokenKind::CloseBrace,
            '[' => TokenKind::OpenBracket,
            ']' => TokenKind::CloseBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '~' => TokenKind::Tilde,
            '+' => TokenKind::Plus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,

            ':' => {
                if lexer.consume_if('=') {
                    TokenKind::ColonEquals
                } else {
                    TokenKind::Colon
                }
            }
            '-' => {
                if lexer.consume_if('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            '&' => {
                if lexer.consume_if('&') {
                    TokenKind::AmpersandAmpersand
                } else {
                    TokenKind::Ampersand
                }
            }
            '|' => {
                if lexer.consume_if('|') {
                    TokenKind::BarBar
                } else {
                    TokenKind::Bar
                }
            }
            '!' => {
                if lexer.consume_if('=') {
                    TokenKind::BangEquals
                } else {
                    TokenKind::Bang
                }
            }
            '=' => {
                if lexer.consume_if('=') {
                    TokenKind::EqualsEquals
                } else {
                    TokenKind::Equals
                }
            }
            '<' => {
                if lexer.consume_if('=') {
                    TokenKind::LessEquals
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if lexer.consume_if('=') {
                    TokenKind::GreaterEquals
                } else {
                    TokenKind::Greater
                }
            }

            '\'' => {
                let location = TextLocation::new(start, lexer.position());
                let value = match lexer.next_char() {
                    Some('\\') => match lexer.next_char() {
                        Some(esc) => escape_char(esc, &location)?,
                        None => {
                            return_syntax_error!(location, "unterminated character literal")
                        }
                    },
                    Some(ch) if ch.is_ascii() => ch as u8,
                    Some(ch) => {
                        return_syntax_error!(location, "non-ascii character literal '{}'", ch)
                    }
                    None => return_syntax_error!(location, "unterminated character literal"),
                };
                if lexer.next_char() != Some('\'') {
                    return_syntax_error!(location, "unterminated character literal");
                }
                TokenKind::CharLiteral(value)
            }

            '"' => {
                let mut value = String::new();
                loop {
                    let location = TextLocation::new(start, lexer.position());
                    match lexer.next_char() {
                        Some('"') => break,
                        Some('\\') => match lexer.next_char() {
                            Some(esc) => value.push(escape_char(esc, &location)? as char),
                            None => return_syntax_error!(location, "unterminated string literal"),
                        },
                        Some(ch) => value.push(ch),
                        None => return_syntax_error!(location, "unterminated string literal"),
                    }
                }
                TokenKind::StringLiteral(value)
            }

            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                digits.push(c);
                while let Some(d) = lexer.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        lexer.next_char();
                    } else {
                        break;
                    }
                }

                // A '.' followed by a digit continues a float literal
                let mut is_float = false;
                if lexer.peek() == Some('.') {
                    let mut lookahead = lexer.chars.clone();
                    lookahead.next();
                    if lookahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                        is_float = true;
                        digits.push('.');
                        lexer.next_char();
                        while let Some(d) = lexer.peek() {
                            if d.is_ascii_digit() {
                                digits.push(d);
                                lexer.next_char();
                            } else {
                                break;
                            }
                        }
                    }
                }

                let location = TextLocation::new(start, lexer.position());
                if is_float {
                    match digits.parse::<f64>() {
                        Ok(value) => TokenKind::FloatLiteral(value),
                        Err(_) => {
                            return_syntax_error!(location, "invalid float literal '{}'", digits)
                        }
                    }
                } else {
                    let mut suffix_text = String::new();
                    while let Some(s) = lexer.peek() {
                        if s.is_ascii_alphanumeric() {
                            suffix_text.push(s);
                            lexer.next_char();
                        } else {
                            break;
                        }
                    }
                    let suffix = match suffix_text.as_str() {
                        "" => IntSuffix::None,
                        "i32" => IntSuffix::I32,
                        "i64" => IntSuffix::I64,
                        "u" | "u64" => IntSuffix::U64,
                        other => {
                            return_syntax_error!(
                                location,
                                "invalid integer suffix '{}' on literal '{}'",
                                other,
                                digits
                            )
                        }
                    };
                    match digits.parse::<u64>() {
                        Ok(value) => TokenKind::IntLiteral(value, suffix),
                        Err(_) => {
                            return_syntax_error!(location, "integer literal '{}' too large", digits)
                        }
                    }
                }
            }

            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                word.push(c);
                while let Some(d) = lexer.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        word.push(d);
                        lexer.next_char();
                    } else {
                        break;
                    }
                }
                match keyword_kind(&word) {
                    Some(kind) => kind,
                    None => TokenKind::Symbol(word),
                }
            }

            other => {
                let location = TextLocation::new(start, lexer.position());
                return_syntax_error!(location, "unexpected character '{}'", other)
            }
        };

        let token = Token::new(kind, TextLocation::new(start, lexer.position()));
        token_log!(&token);
        tokens.push(token);
    }

    Ok(TokenStream::new(tokens))
}
