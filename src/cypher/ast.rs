//! Cypher AST for the read/create subset this crate understands.
//!
//! Pure data: no behavior, no storage references, no execution logic.

use std::collections::HashMap;

/// A complete Cypher statement.
#[derive(Debug, Clone)]
pub enum Statement {
    /// MATCH ... [WHERE ...] RETURN ...
    Query(Query),
    /// CREATE ... [RETURN ...]
    Create(CreateClause),
}

/// A read query.
#[derive(Debug, Clone)]
pub struct Query {
    pub matches: Vec<MatchClause>,
    pub return_clause: ReturnClause,
    pub order_by: Vec<OrderExpr>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
}

/// MATCH clause with its patterns and the WHERE that follows it.
#[derive(Debug, Clone)]
pub struct MatchClause {
    pub optional: bool,
    pub patterns: Vec<Pattern>,
    pub where_clause: Option<Expr>,
}

/// A pattern chain: (m:Make)-[:MANUFACTURES]->(n:Name)
#[derive(Debug, Clone)]
pub struct Pattern {
    pub start: NodePattern,
    pub hops: Vec<(RelPattern, NodePattern)>,
}

impl Pattern {
    /// Every node pattern in the chain, left to right.
    pub fn nodes(&self) -> impl Iterator<Item = &NodePattern> {
        std::iter::once(&self.start).chain(self.hops.iter().map(|(_, n)| n))
    }

    /// Each hop with the node on its left.
    pub fn segments(&self) -> impl Iterator<Item = (&NodePattern, &RelPattern, &NodePattern)> {
        let lefts = self.nodes();
        lefts.zip(self.hops.iter()).map(|(left, (rel, right))| (left, rel, right))
    }
}

/// Node pattern: (alias:Label {prop: value})
#[derive(Debug, Clone, Default)]
pub struct NodePattern {
    pub alias: Option<String>,
    pub labels: Vec<String>,
    pub properties: HashMap<String, Expr>,
}

/// Relationship pattern: -[alias:TYPE {props}]->
#[derive(Debug, Clone)]
pub struct RelPattern {
    pub alias: Option<String>,
    pub rel_types: Vec<String>,
    pub direction: PatternDirection,
    pub properties: HashMap<String, Expr>,
    pub var_length: bool,
}

/// Pattern direction, read left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternDirection {
    /// ->
    Right,
    /// <-
    Left,
    /// - (undirected)
    Both,
}

/// RETURN clause.
#[derive(Debug, Clone)]
pub struct ReturnClause {
    pub distinct: bool,
    pub items: Vec<ReturnItem>,
}

/// Single item in RETURN.
#[derive(Debug, Clone)]
pub struct ReturnItem {
    pub expr: Expr,
    pub alias: Option<String>,
    /// Source text of `expr`, used as the column name when there is no alias.
    pub text: String,
}

impl ReturnItem {
    pub fn column_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.text)
    }
}

/// ORDER BY expression.
#[derive(Debug, Clone)]
pub struct OrderExpr {
    pub expr: Expr,
    pub text: String,
    pub ascending: bool,
}

/// CREATE clause (one or more CREATE keywords, each with patterns).
#[derive(Debug, Clone)]
pub struct CreateClause {
    pub patterns: Vec<Pattern>,
    pub return_clause: Option<ReturnClause>,
}

// ============================================================================
// Expressions
// ============================================================================

/// Expression in Cypher.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    /// Variable reference: `n`, `m`
    Variable(String),
    /// Property access: `n.name`
    Property { expr: Box<Expr>, key: String },
    /// Parameter: `$name`
    Parameter(String),
    /// Function call: `count(DISTINCT l)`
    FunctionCall { name: String, args: Vec<Expr>, distinct: bool },
    BinaryOp { left: Box<Expr>, op: BinaryOp, right: Box<Expr> },
    UnaryOp { op: UnaryOp, expr: Box<Expr> },
    List(Vec<Expr>),
    MapLiteral(HashMap<String, Expr>),
    /// `x IN [1, 2, 3]`
    In { expr: Box<Expr>, list: Box<Expr> },
    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },
    /// Label check: `n:Name`
    HasLabel { expr: Box<Expr>, label: String },
    StringOp { left: Box<Expr>, op: StringOp, right: Box<Expr> },
    /// `*` in RETURN * or count(*)
    Star,
}

impl Expr {
    /// Whether evaluating this expression folds rows together.
    pub fn is_aggregate(&self) -> bool {
        match self {
            Expr::FunctionCall { name, args, .. } => {
                is_aggregate_function(name) || args.iter().any(Expr::is_aggregate)
            }
            Expr::Property { expr, .. }
            | Expr::UnaryOp { expr, .. }
            | Expr::IsNull { expr, .. }
            | Expr::HasLabel { expr, .. } => expr.is_aggregate(),
            Expr::BinaryOp { left, right, .. } | Expr::StringOp { left, right, .. } => {
                left.is_aggregate() || right.is_aggregate()
            }
            Expr::In { expr, list } => expr.is_aggregate() || list.is_aggregate(),
            Expr::List(items) => items.iter().any(Expr::is_aggregate),
            Expr::MapLiteral(map) => map.values().any(Expr::is_aggregate),
            Expr::Literal(_) | Expr::Variable(_) | Expr::Parameter(_) | Expr::Star => false,
        }
    }
}

/// Names of the aggregate functions the executor folds.
pub fn is_aggregate_function(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "count" | "sum" | "avg" | "min" | "max" | "collect"
    )
}

/// Literal values.
#[derive(Debug, Clone)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add, Sub, Mul, Div, Mod,
    // Comparison
    Eq, Neq, Lt, Lte, Gt, Gte,
    // Logical
    And, Or, Xor,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// String-specific operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    StartsWith,
    EndsWith,
    Contains,
}
