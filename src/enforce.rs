//! # Rule Enforcer
//!
//! Deterministic corrections applied to generated Cypher before it reaches
//! the store:
//!
//! - [`enforce`] rewrites the first `MATCH (<var>:Make)` fragment into the
//!   canonical manufacturer clause and keeps the `m`/`n` bindings stable.
//! - [`capitalize_filter_literals`] upper-cases the first letter of
//!   name/make/place/model filter strings.
//! - [`validate`] checks labels, relationship directions and property reads
//!   against the schema registry.
//!
//! Rewrites work on the lexer's token spans so whitespace, keyword case and
//! string contents are respected. Text the lexer rejects goes through a
//! plain regex substitution instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::PipelineConfig;
use crate::cypher::ast::{Expr, NodePattern, Pattern, PatternDirection, Statement};
use crate::cypher::lexer::{self, Span, Token, TokenKind};
use crate::cypher;
use crate::schema::SchemaRegistry;
use crate::{Error, Result};

/// The only accepted way of joining a manufacturer to a model.
pub const CANONICAL_MAKE_CLAUSE: &str = "MATCH (m:Make)-[:MANUFACTURES]->(n:Name)";

/// Appended when a rewritten query has no RETURN.
pub const FALLBACK_RETURN: &str = " RETURN m.name, n.name";

const MAKE_VAR: &str = "m";
const NAME_VAR: &str = "n";

static MAKE_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:MATCH)\s*\(([^:()]*):Make\)").unwrap());

static MATCH_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bMATCH\b").unwrap());

static RETURN_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bRETURN\b").unwrap());

const FILTER_KEYS: &[&str] = &["name", "make", "place", "model"];

// ============================================================================
// Make rule
// ============================================================================

/// Force every manufacturer lookup through [`CANONICAL_MAKE_CLAUSE`].
///
/// Queries already holding the canonical clause, and queries that never
/// mention the `Make` label, come back unchanged.
pub fn enforce(query: &str) -> String {
    if query.contains(CANONICAL_MAKE_CLAUSE) {
        return query.to_string();
    }

    let rewritten = match lexer::tokenize(query) {
        Ok(tokens) => {
            if !references_make(&tokens) {
                return query.to_string();
            }
            match find_make_fragment(&tokens) {
                Some(fragment) => splice_fragment(query, &tokens, &fragment),
                None => rewrite_textual(query),
            }
        }
        Err(e) => {
            if !(MATCH_KEYWORD.is_match(query) && query.contains(":Make")) {
                return query.to_string();
            }
            tracing::debug!(error = %e, "query does not tokenize, using textual make rewrite");
            rewrite_textual(query)
        }
    };

    ensure_return(rewritten)
}

fn references_make(tokens: &[Token]) -> bool {
    tokens.iter().any(|t| t.kind == TokenKind::Match)
        && tokens
            .windows(2)
            .any(|w| w[0].kind == TokenKind::Colon && w[1].kind == TokenKind::Identifier && w[1].text == "Make")
}

/// Token positions of the first `MATCH (<var>:Make)` and, when present, the
/// `-[:MANUFACTURES]->(<var>:Name)` hop right after it.
#[derive(Debug)]
struct MakeFragment {
    first: usize,
    last: usize,
    make_var: Option<usize>,
    name_var: Option<usize>,
}

fn kind_at(tokens: &[Token], idx: usize) -> TokenKind {
    tokens.get(idx).map_or(TokenKind::Eof, |t| t.kind)
}

fn ident_at(tokens: &[Token], idx: usize, text: &str) -> bool {
    tokens
        .get(idx)
        .is_some_and(|t| t.kind == TokenKind::Identifier && t.text == text)
}

/// Match `( [word] : Label )` starting at `idx`; returns the variable index
/// and the index of the closing paren.
fn labelled_node(tokens: &[Token], idx: usize, label: &str) -> Option<(Option<usize>, usize)> {
    if kind_at(tokens, idx) != TokenKind::LParen {
        return None;
    }
    let mut at = idx + 1;
    let var = match tokens.get(at) {
        Some(t) if t.is_word() => {
            at += 1;
            Some(at - 1)
        }
        _ => None,
    };
    if kind_at(tokens, at) != TokenKind::Colon || !ident_at(tokens, at + 1, label) {
        return None;
    }
    if kind_at(tokens, at + 2) != TokenKind::RParen {
        return None;
    }
    Some((var, at + 2))
}

fn find_make_fragment(tokens: &[Token]) -> Option<MakeFragment> {
    for (i, tok) in tokens.iter().enumerate() {
        if tok.kind != TokenKind::Match {
            continue;
        }
        let Some((make_var, close)) = labelled_node(tokens, i + 1, "Make") else {
            continue;
        };

        // -[:MANUFACTURES]->
        let hop_matches = kind_at(tokens, close + 1) == TokenKind::Dash
            && kind_at(tokens, close + 2) == TokenKind::LBracket
            && kind_at(tokens, close + 3) == TokenKind::Colon
            && ident_at(tokens, close + 4, "MANUFACTURES")
            && kind_at(tokens, close + 5) == TokenKind::RBracket
            && kind_at(tokens, close + 6) == TokenKind::Arrow;

        if hop_matches {
            if let Some((name_var, name_close)) = labelled_node(tokens, close + 7, "Name") {
                return Some(MakeFragment { first: i, last: name_close, make_var, name_var });
            }
        }
        return Some(MakeFragment { first: i, last: close, make_var, name_var: None });
    }
    None
}

/// Whether the word at `idx` sits where a variable can be referenced.
fn is_variable_position(tokens: &[Token], idx: usize) -> bool {
    let prev = if idx == 0 { TokenKind::Eof } else { tokens[idx - 1].kind };
    let next = kind_at(tokens, idx + 1);
    match prev {
        // A label or type is never followed by these; a map value can be.
        TokenKind::Colon => {
            return matches!(next, TokenKind::Dot | TokenKind::RBrace | TokenKind::Comma);
        }
        TokenKind::Dot | TokenKind::As => return false,
        TokenKind::LBrace | TokenKind::Comma if next == TokenKind::Colon => return false,
        _ => {}
    }
    next != TokenKind::LParen
}

fn splice_fragment(query: &str, tokens: &[Token], fragment: &MakeFragment) -> String {
    let span = Span {
        start: tokens[fragment.first].span.start,
        end: tokens[fragment.last].span.end,
    };

    let mut renames: Vec<(&str, &str)> = Vec::new();
    if let Some(idx) = fragment.make_var {
        if tokens[idx].text != MAKE_VAR {
            renames.push((tokens[idx].text.as_str(), MAKE_VAR));
        }
    }
    if let Some(idx) = fragment.name_var {
        if tokens[idx].text != NAME_VAR {
            renames.push((tokens[idx].text.as_str(), NAME_VAR));
        }
    }

    let mut edits: Vec<(Span, &str)> = vec![(span, CANONICAL_MAKE_CLAUSE)];
    let splice_only = apply_edits(query, &edits);

    if renames.is_empty() {
        tracing::debug!(query = %splice_only, "make fragment rewritten");
        return splice_only;
    }

    for (idx, tok) in tokens.iter().enumerate() {
        if (fragment.first..=fragment.last).contains(&idx) || !tok.is_word() {
            continue;
        }
        let Some((_, to)) = renames.iter().find(|(from, _)| *from == tok.text) else {
            continue;
        };
        if is_variable_position(tokens, idx) {
            edits.push((tok.span, *to));
        }
    }

    let renamed = apply_edits(query, &edits);
    if renamed.matches(CANONICAL_MAKE_CLAUSE).count() > 1 {
        tracing::warn!(query = %splice_only, "renaming would duplicate the make clause, keeping original variables");
        return splice_only;
    }

    tracing::debug!(query = %renamed, renames = ?renames, "make fragment rewritten");
    renamed
}

fn apply_edits(query: &str, edits: &[(Span, &str)]) -> String {
    let mut sorted: Vec<&(Span, &str)> = edits.iter().collect();
    sorted.sort_by_key(|(span, _)| span.start);

    let mut out = String::with_capacity(query.len() + 64);
    let mut cursor = 0;
    for (span, replacement) in sorted {
        out.push_str(&query[cursor..span.start]);
        out.push_str(replacement);
        cursor = span.end;
    }
    out.push_str(&query[cursor..]);
    out
}

fn rewrite_textual(query: &str) -> String {
    let rewritten = MAKE_FRAGMENT.replace(query, CANONICAL_MAKE_CLAUSE).into_owned();
    if rewritten != query {
        tracing::debug!(query = %rewritten, "make fragment rewritten textually");
    }
    rewritten
}

fn ensure_return(query: String) -> String {
    let has_return = match lexer::tokenize(&query) {
        Ok(tokens) => tokens.iter().any(|t| t.kind == TokenKind::Return),
        Err(_) => RETURN_KEYWORD.is_match(&query),
    };
    if has_return {
        return query;
    }

    let mut query = query;
    let trimmed_len = query.trim_end().trim_end_matches(';').trim_end().len();
    query.truncate(trimmed_len);

    let dropped = bound_variables(&query);
    if !dropped.is_empty() {
        tracing::warn!(dropped = ?dropped, "appended RETURN only projects m and n");
    }

    query.push_str(FALLBACK_RETURN);
    query
}

/// Variables declared in node or relationship patterns, other than m and n.
fn bound_variables(query: &str) -> Vec<String> {
    let Ok(tokens) = lexer::tokenize(query) else {
        return Vec::new();
    };
    let mut vars: Vec<String> = Vec::new();
    for (idx, tok) in tokens.iter().enumerate().skip(1) {
        let opens = matches!(tokens[idx - 1].kind, TokenKind::LParen | TokenKind::LBracket);
        let closes = matches!(
            kind_at(&tokens, idx + 1),
            TokenKind::Colon | TokenKind::RParen | TokenKind::RBracket | TokenKind::LBrace
        );
        if opens && closes && tok.is_word() && tok.text != MAKE_VAR && tok.text != NAME_VAR
            && !vars.contains(&tok.text)
        {
            vars.push(tok.text.clone());
        }
    }
    vars
}

// ============================================================================
// Literal capitalization
// ============================================================================

/// Upper-case the first letter of string literals that filter on
/// `name`, `make`, `place` or `model`.
///
/// Recognized forms: `{name: 'honda'}`, `x.name = 'honda'` and
/// `'honda' = x.name`. Anything else is left alone.
pub fn capitalize_filter_literals(query: &str) -> String {
    let tokens = match lexer::tokenize(query) {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::debug!(error = %e, "query does not tokenize, literals left as written");
            return query.to_string();
        }
    };

    let is_filter_key = |idx: usize| {
        tokens
            .get(idx)
            .is_some_and(|t| t.kind == TokenKind::Identifier && FILTER_KEYS.contains(&t.text.as_str()))
    };

    let mut targets: Vec<usize> = Vec::new();
    for (idx, tok) in tokens.iter().enumerate() {
        if tok.kind != TokenKind::StringLiteral || idx == 0 {
            continue;
        }
        let prev = tokens[idx - 1].kind;

        // {key: 'lit'} / , key: 'lit'
        let map_entry = prev == TokenKind::Colon
            && idx >= 3
            && is_filter_key(idx - 2)
            && matches!(tokens[idx - 3].kind, TokenKind::LBrace | TokenKind::Comma);

        // x.key = 'lit'
        let rhs = prev == TokenKind::Eq
            && idx >= 3
            && is_filter_key(idx - 2)
            && tokens[idx - 3].kind == TokenKind::Dot;

        // 'lit' = x.key
        let lhs = kind_at(&tokens, idx + 1) == TokenKind::Eq
            && tokens.get(idx + 2).is_some_and(Token::is_word)
            && kind_at(&tokens, idx + 3) == TokenKind::Dot
            && is_filter_key(idx + 4);

        if map_entry || rhs || lhs {
            targets.push(idx);
        }
    }

    let mut out = query.to_string();
    // Back to front so earlier byte offsets stay valid.
    for idx in targets.into_iter().rev() {
        let first = tokens[idx].span.start + 1;
        let Some(c) = query[first..].chars().next() else { continue };
        if c.is_lowercase() {
            out.replace_range(first..first + c.len_utf8(), &c.to_uppercase().to_string());
        }
    }

    if out != query {
        tracing::debug!(query = %out, "filter literals capitalized");
    }
    out
}

// ============================================================================
// Schema validation
// ============================================================================

/// A way in which a query steps outside the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    UnknownLabel(String),
    UnknownRelationship(String),
    /// The relationship exists, but only the other way round.
    ReversedRelationship { rel_type: String, source: String, target: String },
    /// The relationship exists, but not between these labels.
    IllegalEndpoints { rel_type: String, source: Option<String>, target: Option<String> },
    /// A property other than the one the label exposes.
    UnknownProperty { label: String, property: String },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |label: &Option<String>| label.as_deref().map_or_else(|| "()".to_string(), |l| format!("(:{l})"));
        match self {
            Self::UnknownLabel(label) => write!(f, "unknown label :{label}"),
            Self::UnknownRelationship(rel) => write!(f, "unknown relationship :{rel}"),
            Self::ReversedRelationship { rel_type, source, target } => write!(
                f,
                "relationship :{rel_type} runs (:{target})->(:{source}), not (:{source})->(:{target})"
            ),
            Self::IllegalEndpoints { rel_type, source, target } => write!(
                f,
                "relationship :{rel_type} does not connect {}->{}",
                side(source),
                side(target)
            ),
            Self::UnknownProperty { label, property } => {
                write!(f, "property .{property} is not exposed by :{label}")
            }
        }
    }
}

/// Check a query against the schema. Queries outside the parseable subset
/// are not validated.
pub fn validate(query: &str, schema: &SchemaRegistry) -> Vec<SchemaViolation> {
    let statement = match cypher::parse(query) {
        Ok(statement) => statement,
        Err(e) => {
            tracing::debug!(error = %e, "query outside the parseable subset, skipping validation");
            return Vec::new();
        }
    };

    let mut patterns: Vec<&Pattern> = Vec::new();
    let mut exprs: Vec<&Expr> = Vec::new();
    match &statement {
        Statement::Query(q) => {
            for clause in &q.matches {
                patterns.extend(clause.patterns.iter());
                exprs.extend(clause.where_clause.iter());
            }
            exprs.extend(q.return_clause.items.iter().map(|i| &i.expr));
            exprs.extend(q.order_by.iter().map(|o| &o.expr));
        }
        Statement::Create(c) => {
            patterns.extend(c.patterns.iter());
            if let Some(ret) = &c.return_clause {
                exprs.extend(ret.items.iter().map(|i| &i.expr));
            }
        }
    }

    let mut violations = Vec::new();
    let mut push = |v: SchemaViolation| {
        if !violations.contains(&v) {
            violations.push(v);
        }
    };

    // alias -> first known label
    let mut bound: HashMap<&str, &str> = HashMap::new();
    for pattern in &patterns {
        for node in pattern.nodes() {
            if let (Some(alias), Some(label)) = (&node.alias, node.labels.first()) {
                bound.entry(alias.as_str()).or_insert(label.as_str());
            }
        }
    }
    let label_of = |node: &NodePattern| -> Option<String> {
        node.labels
            .first()
            .map(String::as_str)
            .or_else(|| node.alias.as_deref().and_then(|a| bound.get(a).copied()))
            .filter(|l| schema.node(l).is_some())
            .map(str::to_string)
    };

    for pattern in &patterns {
        for node in pattern.nodes() {
            for label in &node.labels {
                if schema.node(label).is_none() {
                    push(SchemaViolation::UnknownLabel(label.clone()));
                }
            }
            if let Some(label) = label_of(node) {
                let exposed = schema.return_property(&label);
                for key in node.properties.keys() {
                    if exposed != Some(key.as_str()) {
                        push(SchemaViolation::UnknownProperty { label: label.clone(), property: key.clone() });
                    }
                }
            }
        }

        for (left, rel, right) in pattern.segments() {
            let (l, r) = (label_of(left), label_of(right));
            for rel_type in &rel.rel_types {
                if !schema.has_relationship_type(rel_type) {
                    push(SchemaViolation::UnknownRelationship(rel_type.clone()));
                    continue;
                }
                if rel.var_length {
                    continue;
                }
                let (source, target) = match rel.direction {
                    PatternDirection::Right => (l.clone(), r.clone()),
                    PatternDirection::Left => (r.clone(), l.clone()),
                    PatternDirection::Both => {
                        if schema.allows(l.as_deref(), rel_type, r.as_deref())
                            || schema.allows(r.as_deref(), rel_type, l.as_deref())
                        {
                            continue;
                        }
                        push(SchemaViolation::IllegalEndpoints {
                            rel_type: rel_type.clone(),
                            source: l.clone(),
                            target: r.clone(),
                        });
                        continue;
                    }
                };
                if schema.allows(source.as_deref(), rel_type, target.as_deref()) {
                    continue;
                }
                match (source, target) {
                    (Some(source), Some(target))
                        if schema.allows(Some(target.as_str()), rel_type, Some(source.as_str())) =>
                    {
                        push(SchemaViolation::ReversedRelationship { rel_type: rel_type.clone(), source, target });
                    }
                    (source, target) => {
                        push(SchemaViolation::IllegalEndpoints { rel_type: rel_type.clone(), source, target });
                    }
                }
            }
        }
    }

    let mut reads = Vec::new();
    for expr in exprs {
        property_reads(expr, &mut reads);
    }
    for (var, key) in reads {
        let Some(label) = bound.get(var).filter(|l| schema.node(l).is_some()) else {
            continue;
        };
        if schema.return_property(label) != Some(key) {
            push(SchemaViolation::UnknownProperty { label: label.to_string(), property: key.to_string() });
        }
    }

    violations
}

/// `(variable, key)` for every `variable.key` inside `expr`.
fn property_reads<'a>(expr: &'a Expr, out: &mut Vec<(&'a str, &'a str)>) {
    match expr {
        Expr::Property { expr, key } => match expr.as_ref() {
            Expr::Variable(var) => out.push((var, key)),
            inner => property_reads(inner, out),
        },
        Expr::FunctionCall { args, .. } | Expr::List(args) => {
            args.iter().for_each(|a| property_reads(a, out));
        }
        Expr::BinaryOp { left, right, .. } | Expr::StringOp { left, right, .. } => {
            property_reads(left, out);
            property_reads(right, out);
        }
        Expr::In { expr, list } => {
            property_reads(expr, out);
            property_reads(list, out);
        }
        Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } | Expr::HasLabel { expr, .. } => {
            property_reads(expr, out);
        }
        Expr::MapLiteral(map) => map.values().for_each(|v| property_reads(v, out)),
        Expr::Literal(_) | Expr::Variable(_) | Expr::Parameter(_) | Expr::Star => {}
    }
}

// ============================================================================
// Enforcer
// ============================================================================

/// The full rule pass the pipeline runs on every generated query.
#[derive(Debug, Clone)]
pub struct Enforcer {
    config: PipelineConfig,
    schema: &'static SchemaRegistry,
}

impl Enforcer {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_schema(config, SchemaRegistry::auto_auction())
    }

    pub fn with_schema(config: PipelineConfig, schema: &'static SchemaRegistry) -> Self {
        Self { config, schema }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Make rule, then capitalization, then validation.
    pub fn apply(&self, query: &str) -> Result<String> {
        let mut query = enforce(query);
        if self.config.capitalize_literals {
            query = capitalize_filter_literals(&query);
        }

        let violations = validate(&query, self.schema);
        if violations.is_empty() {
            tracing::debug!(query = %query, "enforced query passes schema validation");
            return Ok(query);
        }

        let summary = violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        if self.config.strict_schema {
            return Err(Error::SchemaViolation(summary));
        }
        tracing::warn!(violations = %summary, query = %query, "query breaks the schema, running it anyway");
        Ok(query)
    }
}

impl Default for Enforcer {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}
