//! # Cypher Language
//!
//! Lexer plus a parser for the MATCH/WHERE/RETURN/CREATE subset.
//! Pure functions — no I/O, no state, no storage dependency.

pub mod ast;
pub mod lexer;
pub mod parser;

use crate::Result;
use ast::Statement;

/// Parse a Cypher query string into an AST.
pub fn parse(query: &str) -> Result<Statement> {
    let tokens = lexer::tokenize(query)?;
    parser::parse_statement(query, &tokens)
}
