//! Cypher lexer — tokenizes a query string.
//!
//! Every token keeps its byte span in the source so callers can splice
//! rewrites back into the original text without re-serializing it.

use crate::{Error, Result};

/// A token from the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
}

/// Source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Match, OptionalMatch, Where, Return, With, Create,
    Order, By, Skip, Limit, Asc, Desc, Distinct,
    And, Or, Not, Xor, Is, Null, True, False, In, As,
    StartsWith, EndsWith, Contains,

    // Literals
    Integer, Float, StringLiteral,

    // Identifiers and parameters
    Identifier, Parameter,

    // Punctuation
    LParen, RParen, LBracket, RBracket, LBrace, RBrace,
    Dot, Comma, Colon, Semicolon, Pipe, Star,
    Arrow,      // ->
    LeftArrow,  // <-
    Dash,       // -
    DotDot,     // ..

    // Operators
    Eq, Neq, Lt, Lte, Gt, Gte,
    Plus, Slash, Percent,
    // Lexed only so the make rule can tokenize such queries; the parser rejects them.
    Caret,      // ^
    PlusEq,     // +=
    RegexMatch, // =~

    // Whitespace / EOF
    Eof,
}

/// Tokenize a Cypher query string.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            // Skip whitespace
            c if c.is_whitespace() => { chars.next(); }

            // Skip block comments /* ... */
            '/' if matches!(chars.clone().nth(1), Some((_, '*'))) => {
                let comment_start = pos;
                chars.next(); // skip '/'
                chars.next(); // skip '*'
                loop {
                    match chars.next() {
                        Some((_, '*')) => {
                            if matches!(chars.peek(), Some(&(_, '/'))) {
                                chars.next(); // skip '/'
                                break;
                            }
                        }
                        Some(_) => {}
                        None => {
                            return Err(Error::SyntaxError {
                                position: comment_start,
                                message: "Unterminated block comment".into(),
                            });
                        }
                    }
                }
            }

            // Skip line comments
            '/' if matches!(chars.clone().nth(1), Some((_, '/'))) => {
                while chars.peek().map_or(false, |&(_, c)| c != '\n') {
                    chars.next();
                }
            }

            // String literals
            '\'' | '"' => {
                let quote = ch;
                chars.next(); // consume opening quote
                let start = pos;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\\')) => {
                            if let Some((_, escaped)) = chars.next() {
                                match escaped {
                                    'n' => s.push('\n'),
                                    't' => s.push('\t'),
                                    '\\' => s.push('\\'),
                                    c if c == quote => s.push(c),
                                    c => { s.push('\\'); s.push(c); }
                                }
                            }
                        }
                        Some((end, c)) if c == quote => {
                            tokens.push(Token {
                                kind: TokenKind::StringLiteral,
                                span: Span { start, end: end + 1 },
                                text: s,
                            });
                            break;
                        }
                        Some((_, c)) => s.push(c),
                        None => return Err(Error::SyntaxError {
                            position: start,
                            message: "Unterminated string literal".into(),
                        }),
                    }
                }
            }

            // Numbers
            c if c.is_ascii_digit() => {
                let start = pos;
                let mut num = String::new();
                let mut is_float = false;
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        num.push(c);
                        chars.next();
                    } else if c == '.' && !is_float {
                        is_float = true;
                        num.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: if is_float { TokenKind::Float } else { TokenKind::Integer },
                    span: Span { start, end: start + num.len() },
                    text: num,
                });
            }

            // Parameter: $name
            '$' => {
                chars.next();
                let start = pos;
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Parameter,
                    span: Span { start, end: start + name.len() + 1 },
                    text: name,
                });
            }

            // Identifiers and keywords
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let kind = keyword_or_ident(&ident);
                tokens.push(Token {
                    kind,
                    span: Span { start, end: start + ident.len() },
                    text: ident,
                });
            }

            // Escaped identifiers: `lot number`
            '`' => {
                chars.next();
                let start = pos;
                let mut ident = String::new();
                loop {
                    match chars.next() {
                        Some((end, '`')) => {
                            tokens.push(Token {
                                kind: TokenKind::Identifier,
                                span: Span { start, end: end + 1 },
                                text: ident,
                            });
                            break;
                        }
                        Some((_, c)) => ident.push(c),
                        None => return Err(Error::SyntaxError {
                            position: start,
                            message: "Unterminated escaped identifier".into(),
                        }),
                    }
                }
            }

            '!' if matches!(chars.clone().nth(1), Some((_, '='))) => {
                chars.next();
                chars.next();
                tokens.push(punct(TokenKind::Neq, pos, "!="));
            }

            // Punctuation
            '(' => { chars.next(); tokens.push(punct(TokenKind::LParen, pos, "(")); }
            ')' => { chars.next(); tokens.push(punct(TokenKind::RParen, pos, ")")); }
            '[' => { chars.next(); tokens.push(punct(TokenKind::LBracket, pos, "[")); }
            ']' => { chars.next(); tokens.push(punct(TokenKind::RBracket, pos, "]")); }
            '{' => { chars.next(); tokens.push(punct(TokenKind::LBrace, pos, "{")); }
            '}' => { chars.next(); tokens.push(punct(TokenKind::RBrace, pos, "}")); }
            ',' => { chars.next(); tokens.push(punct(TokenKind::Comma, pos, ",")); }
            ':' => { chars.next(); tokens.push(punct(TokenKind::Colon, pos, ":")); }
            ';' => { chars.next(); tokens.push(punct(TokenKind::Semicolon, pos, ";")); }
            '|' => { chars.next(); tokens.push(punct(TokenKind::Pipe, pos, "|")); }
            '*' => { chars.next(); tokens.push(punct(TokenKind::Star, pos, "*")); }
            '.' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '.'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::DotDot, pos, ".."));
                } else {
                    tokens.push(punct(TokenKind::Dot, pos, "."));
                }
            }
            '+' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::PlusEq, pos, "+="));
                } else {
                    tokens.push(punct(TokenKind::Plus, pos, "+"));
                }
            }
            '/' => { chars.next(); tokens.push(punct(TokenKind::Slash, pos, "/")); }
            '%' => { chars.next(); tokens.push(punct(TokenKind::Percent, pos, "%")); }
            '^' => { chars.next(); tokens.push(punct(TokenKind::Caret, pos, "^")); }
            '=' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '~'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::RegexMatch, pos, "=~"));
                } else {
                    tokens.push(punct(TokenKind::Eq, pos, "="));
                }
            }
            '<' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Lte, pos, "<="));
                } else if matches!(chars.peek(), Some(&(_, '-'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::LeftArrow, pos, "<-"));
                } else if matches!(chars.peek(), Some(&(_, '>'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Neq, pos, "<>"));
                } else {
                    tokens.push(punct(TokenKind::Lt, pos, "<"));
                }
            }
            '>' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Gte, pos, ">="));
                } else {
                    tokens.push(punct(TokenKind::Gt, pos, ">"));
                }
            }
            '-' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '>'))) {
                    chars.next();
                    tokens.push(punct(TokenKind::Arrow, pos, "->"));
                } else {
                    tokens.push(punct(TokenKind::Dash, pos, "-"));
                }
            }

            other => {
                return Err(Error::SyntaxError {
                    position: pos,
                    message: format!("Unexpected character: '{other}'"),
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span { start: input.len(), end: input.len() },
        text: String::new(),
    });

    Ok(merge_string_operators(tokens))
}

/// Fold `STARTS WITH` / `ENDS WITH` into single operator tokens.
fn merge_string_operators(tokens: Vec<Token>) -> Vec<Token> {
    let mut merged: Vec<Token> = Vec::with_capacity(tokens.len());
    for tok in tokens {
        if tok.kind == TokenKind::With {
            if let Some(prev) = merged.last_mut() {
                let kind = match prev.text.to_uppercase().as_str() {
                    "STARTS" if prev.kind == TokenKind::Identifier => Some(TokenKind::StartsWith),
                    "ENDS" if prev.kind == TokenKind::Identifier => Some(TokenKind::EndsWith),
                    _ => None,
                };
                if let Some(kind) = kind {
                    prev.kind = kind;
                    prev.span.end = tok.span.end;
                    prev.text = format!("{} {}", prev.text, tok.text);
                    continue;
                }
            }
        }
        merged.push(tok);
    }
    merged
}

impl Token {
    /// Whether the token can name a variable (plain or keyword-shaped word).
    pub fn is_word(&self) -> bool {
        let mut chars = self.text.chars();
        !self.text.is_empty()
            && self.kind != TokenKind::StringLiteral
            && self.kind != TokenKind::Parameter
            && chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_')
    }
}

fn punct(kind: TokenKind, pos: usize, text: &str) -> Token {
    Token {
        kind,
        span: Span { start: pos, end: pos + text.len() },
        text: text.to_string(),
    }
}

fn keyword_or_ident(s: &str) -> TokenKind {
    match s.to_uppercase().as_str() {
        "MATCH" => TokenKind::Match,
        "OPTIONAL" => TokenKind::OptionalMatch,
        "WHERE" => TokenKind::Where,
        "RETURN" => TokenKind::Return,
        "WITH" => TokenKind::With,
        "CREATE" => TokenKind::Create,
        "ORDER" => TokenKind::Order,
        "BY" => TokenKind::By,
        "SKIP" => TokenKind::Skip,
        "LIMIT" => TokenKind::Limit,
        "ASC" | "ASCENDING" => TokenKind::Asc,
        "DESC" | "DESCENDING" => TokenKind::Desc,
        "DISTINCT" => TokenKind::Distinct,
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "NOT" => TokenKind::Not,
        "XOR" => TokenKind::Xor,
        "IS" => TokenKind::Is,
        "NULL" => TokenKind::Null,
        "TRUE" => TokenKind::True,
        "FALSE" => TokenKind::False,
        "IN" => TokenKind::In,
        "AS" => TokenKind::As,
        "CONTAINS" => TokenKind::Contains,
        _ => TokenKind::Identifier,
    }
}
