//! Cypher recursive descent parser.
//!
//! Parses token streams into AST nodes. Supports:
//! - MATCH / OPTIONAL MATCH with pattern chains and inline property maps
//! - WHERE, RETURN [DISTINCT], ORDER BY, SKIP, LIMIT
//! - CREATE (repeated) with an optional trailing RETURN
//! - Expressions with precedence: OR, XOR, AND, NOT, comparison,
//!   string operators, arithmetic, property access, function calls
//!
//! Anything else (WITH, UNWIND, MERGE, CALL, ...) is a syntax error; callers
//! treat that as "outside the supported subset".

use crate::{Error, Result};
use super::ast::*;
use super::lexer::{Token, TokenKind};
use std::collections::HashMap;

/// Parser state — wraps a token slice with cursor.
struct Parser<'t> {
    source: &'t str,
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn new(source: &'t str, tokens: &'t [Token]) -> Self {
        Self { source, tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_nth_kind(&self, n: usize) -> TokenKind {
        self.tokens[(self.pos + n).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token> {
        let tok = self.peek();
        if tok.kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!("Expected {:?}, got {:?} '{}'", kind, tok.kind, tok.text)))
        }
    }

    /// A name position (label, key, alias): identifiers and keyword-shaped words.
    fn expect_name(&mut self) -> Result<String> {
        if self.peek().is_word() && self.peek_kind() != TokenKind::Eof {
            Ok(self.advance().text.clone())
        } else {
            let tok = self.peek();
            Err(self.error(format!("Expected a name, got {:?} '{}'", tok.kind, tok.text)))
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, msg: String) -> Error {
        Error::SyntaxError {
            position: self.peek().span.start,
            message: msg,
        }
    }

    /// Source text between the token at `from` and the last consumed token.
    fn text_since(&self, from: usize) -> String {
        if self.pos == 0 || from >= self.pos {
            return String::new();
        }
        let start = self.tokens[from].span.start;
        let end = self.tokens[self.pos - 1].span.end;
        self.source.get(start..end).unwrap_or_default().trim().to_string()
    }
}

/// Parse a complete Cypher statement from tokens.
pub fn parse_statement(source: &str, tokens: &[Token]) -> Result<Statement> {
    let mut p = Parser::new(source, tokens);

    let stmt = match p.peek_kind() {
        TokenKind::Match | TokenKind::OptionalMatch => parse_query_stmt(&mut p)?,
        TokenKind::Create => parse_create_stmt(&mut p)?,
        kind => {
            return Err(p.error(format!("Unexpected token {:?} at start of statement", kind)));
        }
    };

    // Allow optional semicolon + EOF
    p.eat(TokenKind::Semicolon);
    if !p.at(TokenKind::Eof) {
        return Err(p.error(format!("Unexpected token after statement: {:?} '{}'", p.peek_kind(), p.peek().text)));
    }

    Ok(stmt)
}

// ============================================================================
// Statement parsers
// ============================================================================

fn parse_query_stmt(p: &mut Parser) -> Result<Statement> {
    let mut matches = Vec::new();

    while p.at(TokenKind::Match) || p.at(TokenKind::OptionalMatch) {
        let optional = if p.eat(TokenKind::OptionalMatch) {
            p.expect(TokenKind::Match)?;
            true
        } else {
            p.advance();
            false
        };

        let patterns = parse_pattern_list(p)?;
        let where_clause = if p.eat(TokenKind::Where) {
            Some(parse_expr(p)?)
        } else {
            None
        };
        matches.push(MatchClause { optional, patterns, where_clause });
    }

    if !p.eat(TokenKind::Return) {
        return Err(p.error("Expected RETURN clause".into()));
    }
    let return_clause = parse_return_clause(p)?;

    let order_by = if p.eat(TokenKind::Order) {
        p.expect(TokenKind::By)?;
        parse_order_by(p)?
    } else {
        Vec::new()
    };

    let skip = if p.eat(TokenKind::Skip) { Some(parse_expr(p)?) } else { None };
    let limit = if p.eat(TokenKind::Limit) { Some(parse_expr(p)?) } else { None };

    Ok(Statement::Query(Query {
        matches,
        return_clause,
        order_by,
        skip,
        limit,
    }))
}

fn parse_create_stmt(p: &mut Parser) -> Result<Statement> {
    let mut patterns = Vec::new();
    while p.eat(TokenKind::Create) {
        patterns.extend(parse_pattern_list(p)?);
    }
    let return_clause = if p.eat(TokenKind::Return) {
        Some(parse_return_clause(p)?)
    } else {
        None
    };
    Ok(Statement::Create(CreateClause { patterns, return_clause }))
}

// ============================================================================
// Patterns
// ============================================================================

fn parse_pattern_list(p: &mut Parser) -> Result<Vec<Pattern>> {
    let mut patterns = Vec::new();
    patterns.push(parse_pattern(p)?);
    while p.eat(TokenKind::Comma) {
        patterns.push(parse_pattern(p)?);
    }
    Ok(patterns)
}

fn parse_pattern(p: &mut Parser) -> Result<Pattern> {
    let start = parse_node_pattern(p)?;
    let mut hops = Vec::new();

    while p.at(TokenKind::Dash) || p.at(TokenKind::LeftArrow) {
        let rel = parse_rel_pattern(p)?;
        let node = parse_node_pattern(p)?;
        hops.push((rel, node));
    }

    Ok(Pattern { start, hops })
}

fn parse_node_pattern(p: &mut Parser) -> Result<NodePattern> {
    p.expect(TokenKind::LParen)?;

    let mut node = NodePattern::default();

    if p.peek().is_word() && !p.at(TokenKind::Colon) {
        node.alias = Some(p.advance().text.clone());
    }

    while p.eat(TokenKind::Colon) {
        node.labels.push(p.expect_name()?);
    }

    if p.at(TokenKind::LBrace) {
        node.properties = parse_map_literal_inner(p)?;
    }

    p.expect(TokenKind::RParen)?;

    Ok(node)
}

fn parse_rel_pattern(p: &mut Parser) -> Result<RelPattern> {
    // <-[...]- or -[...]-> or -[...]-
    let left_arrow = p.eat(TokenKind::LeftArrow);
    if !left_arrow {
        p.expect(TokenKind::Dash)?;
    }

    let mut alias = None;
    let mut rel_types = Vec::new();
    let mut properties = HashMap::new();
    let mut var_length = false;

    if p.eat(TokenKind::LBracket) {
        if p.peek().is_word() && !p.at(TokenKind::Colon) {
            alias = Some(p.advance().text.clone());
        }

        if p.eat(TokenKind::Colon) {
            rel_types.push(p.expect_name()?);
            while p.eat(TokenKind::Pipe) {
                p.eat(TokenKind::Colon);
                rel_types.push(p.expect_name()?);
            }
        }

        // *, *2, *1..3
        if p.eat(TokenKind::Star) {
            var_length = true;
            while matches!(p.peek_kind(), TokenKind::Integer | TokenKind::Float | TokenKind::Dot | TokenKind::DotDot) {
                p.advance();
            }
        }

        if p.at(TokenKind::LBrace) {
            properties = parse_map_literal_inner(p)?;
        }

        p.expect(TokenKind::RBracket)?;
    }

    let direction = if left_arrow {
        p.expect(TokenKind::Dash)?;
        PatternDirection::Left
    } else if p.eat(TokenKind::Arrow) {
        PatternDirection::Right
    } else {
        p.expect(TokenKind::Dash)?;
        PatternDirection::Both
    };

    Ok(RelPattern {
        alias,
        rel_types,
        direction,
        properties,
        var_length,
    })
}

// ============================================================================
// RETURN / ORDER BY
// ============================================================================

fn parse_return_clause(p: &mut Parser) -> Result<ReturnClause> {
    let distinct = p.eat(TokenKind::Distinct);
    let mut items = Vec::new();

    if p.at(TokenKind::Star) {
        p.advance();
        items.push(ReturnItem { expr: Expr::Star, alias: None, text: "*".into() });
    } else {
        items.push(parse_return_item(p)?);
        while p.eat(TokenKind::Comma) {
            items.push(parse_return_item(p)?);
        }
    }

    Ok(ReturnClause { distinct, items })
}

fn parse_return_item(p: &mut Parser) -> Result<ReturnItem> {
    let from = p.pos;
    let expr = parse_expr(p)?;
    let text = p.text_since(from);
    let alias = if p.eat(TokenKind::As) {
        Some(p.expect_name()?)
    } else {
        None
    };
    Ok(ReturnItem { expr, alias, text })
}

fn parse_order_by(p: &mut Parser) -> Result<Vec<OrderExpr>> {
    let mut exprs = Vec::new();
    exprs.push(parse_order_expr(p)?);
    while p.eat(TokenKind::Comma) {
        exprs.push(parse_order_expr(p)?);
    }
    Ok(exprs)
}

fn parse_order_expr(p: &mut Parser) -> Result<OrderExpr> {
    let from = p.pos;
    let expr = parse_expr(p)?;
    let text = p.text_since(from);
    let ascending = if p.eat(TokenKind::Desc) {
        false
    } else {
        p.eat(TokenKind::Asc);
        true
    };
    Ok(OrderExpr { expr, text, ascending })
}

// ============================================================================
// Expression parsing (precedence climbing)
// ============================================================================

fn parse_expr(p: &mut Parser) -> Result<Expr> {
    parse_or_expr(p)
}

fn parse_or_expr(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_xor_expr(p)?;
    while p.eat(TokenKind::Or) {
        let right = parse_xor_expr(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Or, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_xor_expr(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_and_expr(p)?;
    while p.eat(TokenKind::Xor) {
        let right = parse_and_expr(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Xor, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_and_expr(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_not_expr(p)?;
    while p.eat(TokenKind::And) {
        let right = parse_not_expr(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::And, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_not_expr(p: &mut Parser) -> Result<Expr> {
    if p.eat(TokenKind::Not) {
        let expr = parse_not_expr(p)?;
        Ok(Expr::UnaryOp { op: UnaryOp::Not, expr: Box::new(expr) })
    } else {
        parse_comparison(p)
    }
}

fn parse_comparison(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_string_op(p)?;

    if p.eat(TokenKind::Is) {
        let negated = p.eat(TokenKind::Not);
        p.expect(TokenKind::Null)?;
        return Ok(Expr::IsNull { expr: Box::new(left), negated });
    }

    if p.eat(TokenKind::In) {
        let list = parse_addition(p)?;
        return Ok(Expr::In { expr: Box::new(left), list: Box::new(list) });
    }

    let op = match p.peek_kind() {
        TokenKind::Eq => Some(BinaryOp::Eq),
        TokenKind::Neq => Some(BinaryOp::Neq),
        TokenKind::Lt => Some(BinaryOp::Lt),
        TokenKind::Lte => Some(BinaryOp::Lte),
        TokenKind::Gt => Some(BinaryOp::Gt),
        TokenKind::Gte => Some(BinaryOp::Gte),
        _ => None,
    };

    if let Some(op) = op {
        p.advance();
        let right = parse_string_op(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) };
    }

    Ok(left)
}

fn parse_string_op(p: &mut Parser) -> Result<Expr> {
    let left = parse_addition(p)?;

    let op = match p.peek_kind() {
        TokenKind::StartsWith => StringOp::StartsWith,
        TokenKind::EndsWith => StringOp::EndsWith,
        TokenKind::Contains => StringOp::Contains,
        _ => return Ok(left),
    };
    p.advance();
    let right = parse_addition(p)?;
    Ok(Expr::StringOp { left: Box::new(left), op, right: Box::new(right) })
}

fn parse_addition(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_multiplication(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Dash => BinaryOp::Sub,
            _ => break,
        };
        p.advance();
        let right = parse_multiplication(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_multiplication(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_unary(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            _ => break,
        };
        p.advance();
        let right = parse_unary(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_unary(p: &mut Parser) -> Result<Expr> {
    if p.eat(TokenKind::Dash) {
        let expr = parse_property_access(p)?;
        Ok(Expr::UnaryOp { op: UnaryOp::Negate, expr: Box::new(expr) })
    } else {
        parse_property_access(p)
    }
}

fn parse_property_access(p: &mut Parser) -> Result<Expr> {
    let mut expr = parse_primary(p)?;

    // Property access chain: n.name
    while p.eat(TokenKind::Dot) {
        let key = p.expect_name()?;
        expr = Expr::Property { expr: Box::new(expr), key };
    }

    // Label check: n:Name
    if p.at(TokenKind::Colon) {
        if let Expr::Variable(_) = &expr {
            p.advance();
            let label = p.expect_name()?;
            expr = Expr::HasLabel { expr: Box::new(expr), label };
        }
    }

    Ok(expr)
}

fn parse_primary(p: &mut Parser) -> Result<Expr> {
    match p.peek_kind() {
        TokenKind::Integer => {
            let tok = p.advance();
            let val = tok.text.parse::<i64>().map_err(|_| {
                Error::SyntaxError { position: tok.span.start, message: "Invalid integer".into() }
            })?;
            Ok(Expr::Literal(Literal::Int(val)))
        }
        TokenKind::Float => {
            let tok = p.advance();
            let val = tok.text.parse::<f64>().map_err(|_| {
                Error::SyntaxError { position: tok.span.start, message: "Invalid float".into() }
            })?;
            Ok(Expr::Literal(Literal::Float(val)))
        }
        TokenKind::StringLiteral => {
            let tok = p.advance();
            Ok(Expr::Literal(Literal::String(tok.text.clone())))
        }
        TokenKind::True => {
            p.advance();
            Ok(Expr::Literal(Literal::Bool(true)))
        }
        TokenKind::False => {
            p.advance();
            Ok(Expr::Literal(Literal::Bool(false)))
        }
        TokenKind::Null => {
            p.advance();
            Ok(Expr::Literal(Literal::Null))
        }
        TokenKind::Parameter => {
            let tok = p.advance();
            Ok(Expr::Parameter(tok.text.clone()))
        }
        TokenKind::Star => {
            p.advance();
            Ok(Expr::Star)
        }
        TokenKind::LParen => {
            p.advance();
            let expr = parse_expr(p)?;
            p.expect(TokenKind::RParen)?;
            Ok(expr)
        }
        TokenKind::LBracket => {
            p.advance();
            let mut items = Vec::new();
            if !p.at(TokenKind::RBracket) {
                items.push(parse_expr(p)?);
                while p.eat(TokenKind::Comma) {
                    items.push(parse_expr(p)?);
                }
            }
            p.expect(TokenKind::RBracket)?;
            Ok(Expr::List(items))
        }
        TokenKind::LBrace => {
            let map = parse_map_literal_inner(p)?;
            Ok(Expr::MapLiteral(map))
        }

        // Identifier: variable or function call
        TokenKind::Identifier => {
            let tok = p.advance().clone();
            if p.eat(TokenKind::LParen) {
                let mut args = Vec::new();
                let distinct = p.eat(TokenKind::Distinct);

                if p.at(TokenKind::Star) && p.peek_nth_kind(1) == TokenKind::RParen {
                    // count(*)
                    p.advance();
                    args.push(Expr::Star);
                } else if !p.at(TokenKind::RParen) {
                    args.push(parse_expr(p)?);
                    while p.eat(TokenKind::Comma) {
                        args.push(parse_expr(p)?);
                    }
                }
                p.expect(TokenKind::RParen)?;
                Ok(Expr::FunctionCall { name: tok.text, args, distinct })
            } else {
                Ok(Expr::Variable(tok.text))
            }
        }

        _ => Err(p.error(format!("Unexpected token in expression: {:?} '{}'", p.peek_kind(), p.peek().text))),
    }
}

fn parse_map_literal_inner(p: &mut Parser) -> Result<HashMap<String, Expr>> {
    p.expect(TokenKind::LBrace)?;
    let mut map = HashMap::new();
    if !p.at(TokenKind::RBrace) {
        loop {
            let key = p.expect_name()?;
            p.expect(TokenKind::Colon)?;
            let value = parse_expr(p)?;
            map.insert(key, value);
            if !p.eat(TokenKind::Comma) {
                break;
            }
        }
    }
    p.expect(TokenKind::RBrace)?;
    Ok(map)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::lexer::tokenize;

    fn parse(query: &str) -> Result<Statement> {
        let tokens = tokenize(query)?;
        parse_statement(query, &tokens)
    }

    fn parse_query(query: &str) -> Query {
        match parse(query).unwrap() {
            Statement::Query(q) => q,
            other => panic!("Expected Query, got {other:?}"),
        }
    }

    #[test]
    fn test_count_template() {
        let q = parse_query("MATCH (n:Name)-[:HAS_LOT]->(l:LotNumber) RETURN COUNT(DISTINCT l) AS total_cars");
        assert_eq!(q.matches.len(), 1);
        let pattern = &q.matches[0].patterns[0];
        assert_eq!(pattern.start.alias.as_deref(), Some("n"));
        assert_eq!(pattern.start.labels, vec!["Name"]);
        let (rel, target) = &pattern.hops[0];
        assert_eq!(rel.rel_types, vec!["HAS_LOT"]);
        assert_eq!(rel.direction, PatternDirection::Right);
        assert_eq!(target.labels, vec!["LotNumber"]);

        let item = &q.return_clause.items[0];
        assert_eq!(item.column_name(), "total_cars");
        match &item.expr {
            Expr::FunctionCall { name, distinct, args } => {
                assert_eq!(name, "COUNT");
                assert!(*distinct);
                assert_eq!(args.len(), 1);
            }
            other => panic!("Expected FunctionCall, got {other:?}"),
        }
        assert!(item.expr.is_aggregate());
    }

    #[test]
    fn test_inline_property_filter() {
        let q = parse_query(
            "MATCH (m:Make {name: \"Honda\"})-[:MANUFACTURES]->(n:Name)-[:HAS_LOT]->(l:LotNumber) RETURN COUNT(DISTINCT l) AS total_cars",
        );
        let pattern = &q.matches[0].patterns[0];
        assert!(matches!(
            pattern.start.properties.get("name"),
            Some(Expr::Literal(Literal::String(s))) if s == "Honda"
        ));
        assert_eq!(pattern.hops.len(), 2);
        assert_eq!(pattern.segments().count(), 2);
    }

    #[test]
    fn test_incoming_relationship() {
        let q = parse_query("MATCH (l:LotNumber)<-[:BID_MIN]-(p:MinPrice) RETURN p.amount");
        let (rel, _) = &q.matches[0].patterns[0].hops[0];
        assert_eq!(rel.direction, PatternDirection::Left);
    }

    #[test]
    fn test_undirected_relationship() {
        let q = parse_query("MATCH (a:Name)-[:HAS_LOT]-(b) RETURN a");
        let (rel, _) = &q.matches[0].patterns[0].hops[0];
        assert_eq!(rel.direction, PatternDirection::Both);
    }

    #[test]
    fn test_where_order_limit() {
        let q = parse_query(
            "MATCH (n:Name) WHERE n.name STARTS WITH 'C' AND NOT n.name = 'Civic' \
             RETURN n.name ORDER BY n.name DESC SKIP 1 LIMIT 5",
        );
        assert!(q.matches[0].where_clause.is_some());
        assert_eq!(q.return_clause.items[0].column_name(), "n.name");
        assert_eq!(q.order_by.len(), 1);
        assert!(!q.order_by[0].ascending);
        assert_eq!(q.order_by[0].text, "n.name");
        assert!(q.skip.is_some());
        assert!(q.limit.is_some());
    }

    #[test]
    fn test_optional_match_and_multiple_clauses() {
        let q = parse_query(
            "MATCH (n:Name) OPTIONAL MATCH (n)-[:HAS_YEAR]->(y:Year) RETURN n.name, y.value",
        );
        assert_eq!(q.matches.len(), 2);
        assert!(!q.matches[0].optional);
        assert!(q.matches[1].optional);
    }

    #[test]
    fn test_create_template_with_return() {
        let stmt = parse(
            "CREATE (n:Name {name: $name}) CREATE (mk:Make {name: $make}) \
             CREATE (mk)-[:MANUFACTURES]->(n) RETURN n.name AS name",
        )
        .unwrap();
        match stmt {
            Statement::Create(c) => {
                assert_eq!(c.patterns.len(), 3);
                assert!(matches!(
                    c.patterns[0].start.properties.get("name"),
                    Some(Expr::Parameter(p)) if p == "name"
                ));
                assert_eq!(c.return_clause.unwrap().items[0].column_name(), "name");
            }
            other => panic!("Expected Create, got {other:?}"),
        }
    }

    #[test]
    fn test_count_star() {
        let q = parse_query("MATCH (n:Name) RETURN count(*)");
        match &q.return_clause.items[0].expr {
            Expr::FunctionCall { args, .. } => assert!(matches!(args[0], Expr::Star)),
            other => panic!("Expected FunctionCall, got {other:?}"),
        }
        assert_eq!(q.return_clause.items[0].column_name(), "count(*)");
    }

    #[test]
    fn test_missing_return_is_error() {
        assert!(parse("MATCH (n:Name)").is_err());
    }

    #[test]
    fn test_unsupported_clause_is_error() {
        assert!(parse("MATCH (n:Name) WITH n RETURN n").is_err());
        assert!(parse("MERGE (n:Name {name: 'x'})").is_err());
    }
}
