//! Statement evaluation over the in-memory [`Graph`].
//!
//! Reads bind pattern variables row by row (backtracking over every hop),
//! filter with `WHERE`, then project. Projection either maps each row
//! independently or, when any item aggregates, groups rows by the
//! non-aggregate items first. `CREATE` is staged in full before anything
//! touches the graph.

use std::collections::HashMap;

use crate::cypher::ast::{
    BinaryOp, CreateClause, Expr, Literal, NodePattern, OrderExpr, Pattern, PatternDirection,
    Query, RelPattern, ReturnClause, ReturnItem, StringOp, UnaryOp, is_aggregate_function,
};
use crate::model::{Direction, Node, NodeId, PropertyMap, Record, RelId, Relationship, Value};
use crate::{Error, Result};
use super::Graph;

/// Variable bindings of one candidate row.
type Row = HashMap<String, Value>;

/// Upper bound on hops for `*` relationship patterns.
const VAR_LENGTH_LIMIT: usize = 8;

fn fail(message: impl Into<String>) -> Error {
    Error::StoreExecution(message.into())
}

// ============================================================================
// Reads
// ============================================================================

pub(super) fn run_query(graph: &Graph, query: &Query, params: &PropertyMap) -> Result<Vec<Record>> {
    let mut rows: Vec<Row> = vec![Row::new()];

    for clause in &query.matches {
        let mut next = Vec::new();
        for row in &rows {
            let mut matched = Vec::new();
            for candidate in match_patterns(graph, &clause.patterns, row, params)? {
                let keep = match &clause.where_clause {
                    Some(predicate) => eval(predicate, &candidate, params)?.is_truthy(),
                    None => true,
                };
                if keep {
                    matched.push(candidate);
                }
            }

            if matched.is_empty() && clause.optional {
                let mut padded = row.clone();
                for name in pattern_variables(&clause.patterns) {
                    padded.entry(name).or_insert(Value::Null);
                }
                next.push(padded);
            } else {
                next.extend(matched);
            }
        }
        rows = next;
    }

    project(
        &rows,
        &query.return_clause,
        &query.order_by,
        query.skip.as_ref(),
        query.limit.as_ref(),
        params,
    )
}

fn pattern_variables(patterns: &[Pattern]) -> Vec<String> {
    let mut names = Vec::new();
    for pattern in patterns {
        names.extend(pattern.start.alias.iter().cloned());
        for (rel, node) in &pattern.hops {
            names.extend(rel.alias.iter().cloned());
            names.extend(node.alias.iter().cloned());
        }
    }
    names
}

fn match_patterns(graph: &Graph, patterns: &[Pattern], row: &Row, params: &PropertyMap) -> Result<Vec<Row>> {
    let mut rows = vec![row.clone()];
    for pattern in patterns {
        let mut next = Vec::new();
        for row in &rows {
            next.extend(match_pattern(graph, pattern, row, params)?);
        }
        rows = next;
    }
    Ok(rows)
}

fn match_pattern(graph: &Graph, pattern: &Pattern, row: &Row, params: &PropertyMap) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for start in start_candidates(graph, &pattern.start, row, params)? {
        let mut bound = row.clone();
        bind_node(&mut bound, &pattern.start, start);
        extend(graph, pattern, 0, start.id, bound, &mut Vec::new(), params, &mut out)?;
    }
    Ok(out)
}

fn start_candidates<'g>(
    graph: &'g Graph,
    pat: &NodePattern,
    row: &Row,
    params: &PropertyMap,
) -> Result<Vec<&'g Node>> {
    if let Some(alias) = &pat.alias {
        if let Some(bound) = row.get(alias) {
            return match bound {
                Value::Node(n) => match graph.node(n.id) {
                    Some(node) if node_matches(node, pat, row, params)? => Ok(vec![node]),
                    _ => Ok(Vec::new()),
                },
                Value::Null => Ok(Vec::new()),
                other => Err(fail(format!(
                    "Type mismatch: expected Node but was {} for `{alias}`",
                    other.type_name()
                ))),
            };
        }
    }

    let mut out = Vec::new();
    for node in graph.scan(pat.labels.first().map(String::as_str)) {
        if node_matches(node, pat, row, params)? {
            out.push(node);
        }
    }
    Ok(out)
}

fn node_matches(node: &Node, pat: &NodePattern, row: &Row, params: &PropertyMap) -> Result<bool> {
    if !pat.labels.iter().all(|l| node.has_label(l)) {
        return Ok(false);
    }
    properties_match(&node.properties, &pat.properties, row, params)
}

fn properties_match(
    actual: &PropertyMap,
    wanted: &HashMap<String, Expr>,
    row: &Row,
    params: &PropertyMap,
) -> Result<bool> {
    for (key, expr) in wanted {
        let expected = eval(expr, row, params)?;
        let matches = actual.get(key).is_some_and(|v| v.neo4j_eq(&expected));
        if !matches {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Whether the node reached by a hop satisfies its pattern and any
/// existing binding of its alias.
fn target_matches(node: &Node, pat: &NodePattern, row: &Row, params: &PropertyMap) -> Result<bool> {
    if let Some(bound) = pat.alias.as_ref().and_then(|a| row.get(a)) {
        match bound {
            Value::Node(n) if n.id == node.id => {}
            _ => return Ok(false),
        }
    }
    node_matches(node, pat, row, params)
}

fn rel_matches(rel: &Relationship, pat: &RelPattern, row: &Row, params: &PropertyMap) -> Result<bool> {
    if !pat.rel_types.is_empty() && !pat.rel_types.iter().any(|t| *t == rel.rel_type) {
        return Ok(false);
    }
    properties_match(&rel.properties, &pat.properties, row, params)
}

fn walk_direction(dir: PatternDirection) -> Direction {
    match dir {
        PatternDirection::Right => Direction::Outgoing,
        PatternDirection::Left => Direction::Incoming,
        PatternDirection::Both => Direction::Both,
    }
}

fn bind_node(row: &mut Row, pat: &NodePattern, node: &Node) {
    if let Some(alias) = &pat.alias {
        row.insert(alias.clone(), Value::Node(Box::new(node.clone())));
    }
}

#[allow(clippy::too_many_arguments)]
fn extend(
    graph: &Graph,
    pattern: &Pattern,
    hop: usize,
    current: NodeId,
    row: Row,
    used: &mut Vec<RelId>,
    params: &PropertyMap,
    out: &mut Vec<Row>,
) -> Result<()> {
    let Some((rel_pat, node_pat)) = pattern.hops.get(hop) else {
        out.push(row);
        return Ok(());
    };
    let dir = walk_direction(rel_pat.direction);

    if rel_pat.var_length {
        let mut ends = Vec::new();
        walk_var_length(graph, current, dir, rel_pat, &row, params, used, &mut Vec::new(), &mut ends)?;
        for (end, path) in ends {
            let Some(node) = graph.node(end) else { continue };
            if !target_matches(node, node_pat, &row, params)? {
                continue;
            }
            let mut next = row.clone();
            if let Some(alias) = &rel_pat.alias {
                let rels = path.iter().map(|r| Value::Relationship(Box::new(r.clone()))).collect();
                next.insert(alias.clone(), Value::List(rels));
            }
            bind_node(&mut next, node_pat, node);
            let mut path_used: Vec<RelId> = used.clone();
            path_used.extend(path.iter().map(|r| r.id));
            extend(graph, pattern, hop + 1, end, next, &mut path_used, params, out)?;
        }
        return Ok(());
    }

    for rel in graph.edges(current, dir) {
        if used.contains(&rel.id) || !rel_matches(rel, rel_pat, &row, params)? {
            continue;
        }
        if let Some(Value::Relationship(bound)) = rel_pat.alias.as_ref().and_then(|a| row.get(a)) {
            if bound.id != rel.id {
                continue;
            }
        }
        let Some(other) = rel.other_node(current).and_then(|id| graph.node(id)) else {
            continue;
        };
        if !target_matches(other, node_pat, &row, params)? {
            continue;
        }

        let mut next = row.clone();
        if let Some(alias) = &rel_pat.alias {
            next.insert(alias.clone(), Value::Relationship(Box::new(rel.clone())));
        }
        bind_node(&mut next, node_pat, other);

        used.push(rel.id);
        extend(graph, pattern, hop + 1, other.id, next, used, params, out)?;
        used.pop();
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn walk_var_length(
    graph: &Graph,
    current: NodeId,
    dir: Direction,
    rel_pat: &RelPattern,
    row: &Row,
    params: &PropertyMap,
    used: &mut Vec<RelId>,
    path: &mut Vec<Relationship>,
    ends: &mut Vec<(NodeId, Vec<Relationship>)>,
) -> Result<()> {
    if path.len() == VAR_LENGTH_LIMIT {
        return Ok(());
    }
    for rel in graph.edges(current, dir) {
        if used.contains(&rel.id) || !rel_matches(rel, rel_pat, row, params)? {
            continue;
        }
        let Some(next) = rel.other_node(current) else { continue };
        used.push(rel.id);
        path.push(rel.clone());
        ends.push((next, path.clone()));
        walk_var_length(graph, next, dir, rel_pat, row, params, used, path, ends)?;
        path.pop();
        used.pop();
    }
    Ok(())
}

// ============================================================================
// Projection
// ============================================================================

fn project(
    rows: &[Row],
    ret: &ReturnClause,
    order_by: &[OrderExpr],
    skip: Option<&Expr>,
    limit: Option<&Expr>,
    params: &PropertyMap,
) -> Result<Vec<Record>> {
    let items = expand_star(&ret.items, rows);
    let aggregate = items.iter().any(|i| i.expr.is_aggregate());

    // Each output row keeps the bindings ORDER BY may still refer to.
    let mut out: Vec<(Record, Row)> = if aggregate {
        aggregate_rows(rows, &items, params)?
    } else {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = Record::new();
            let mut ctx = row.clone();
            for item in &items {
                let value = eval(&item.expr, row, params)?;
                ctx.insert(item.column_name().to_string(), value.clone());
                record.push(item.column_name(), value);
            }
            out.push((record, ctx));
        }
        out
    };

    if ret.distinct {
        let mut unique: Vec<(Record, Row)> = Vec::with_capacity(out.len());
        for entry in out {
            if !unique.iter().any(|(seen, _)| *seen == entry.0) {
                unique.push(entry);
            }
        }
        out = unique;
    }

    if !order_by.is_empty() {
        let mut keyed = Vec::with_capacity(out.len());
        for (record, ctx) in out {
            let mut keys = Vec::with_capacity(order_by.len());
            for order in order_by {
                let key = match record.value(&order.text) {
                    Some(v) => v.clone(),
                    None => eval(&order.expr, &ctx, params)?,
                };
                keys.push(key);
            }
            keyed.push((keys, record, ctx));
        }
        keyed.sort_by(|(a, _, _), (b, _, _)| {
            for (idx, order) in order_by.iter().enumerate() {
                let ord = a[idx].sort_cmp(&b[idx]);
                let ord = if order.ascending { ord } else { ord.reverse() };
                if ord.is_ne() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        out = keyed.into_iter().map(|(_, record, ctx)| (record, ctx)).collect();
    }

    let skip = count_clause("SKIP", skip, params)?.unwrap_or(0);
    let limit = count_clause("LIMIT", limit, params)?.unwrap_or(usize::MAX);
    Ok(out.into_iter().skip(skip).take(limit).map(|(record, _)| record).collect())
}

fn expand_star(items: &[ReturnItem], rows: &[Row]) -> Vec<ReturnItem> {
    if !matches!(items, [ReturnItem { expr: Expr::Star, .. }]) {
        return items.to_vec();
    }
    let mut names: Vec<&String> = rows.iter().flat_map(|r| r.keys()).collect();
    names.sort();
    names.dedup();
    names
        .into_iter()
        .map(|name| ReturnItem { expr: Expr::Variable(name.clone()), alias: None, text: name.clone() })
        .collect()
}

fn count_clause(clause: &str, expr: Option<&Expr>, params: &PropertyMap) -> Result<Option<usize>> {
    let Some(expr) = expr else { return Ok(None) };
    match eval(expr, &Row::new(), params)? {
        Value::Int(n) if n >= 0 => Ok(Some(n as usize)),
        other => Err(fail(format!("{clause} expects a non-negative integer, got {other}"))),
    }
}

fn aggregate_rows(rows: &[Row], items: &[ReturnItem], params: &PropertyMap) -> Result<Vec<(Record, Row)>> {
    let key_items: Vec<&ReturnItem> = items.iter().filter(|i| !i.expr.is_aggregate()).collect();

    let mut groups: Vec<(Vec<Value>, Vec<&Row>)> = Vec::new();
    for row in rows {
        let key = key_items
            .iter()
            .map(|item| eval(&item.expr, row, params))
            .collect::<Result<Vec<_>>>()?;
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }
    // Aggregating nothing without grouping keys still yields one row.
    if groups.is_empty() && key_items.is_empty() {
        groups.push((Vec::new(), Vec::new()));
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut record = Record::new();
        let mut keys = key.into_iter();
        for item in items {
            let value = if item.expr.is_aggregate() {
                eval_aggregate(&item.expr, &members, params)?
            } else {
                keys.next().unwrap_or(Value::Null)
            };
            record.push(item.column_name(), value);
        }
        let mut ctx = members.first().map(|r| (*r).clone()).unwrap_or_default();
        for (name, value) in record.iter() {
            ctx.insert(name.to_string(), value.clone());
        }
        out.push((record, ctx));
    }
    Ok(out)
}

/// Evaluate an expression containing aggregates over one group.
fn eval_aggregate(expr: &Expr, members: &[&Row], params: &PropertyMap) -> Result<Value> {
    let mut ctx = members.first().map(|r| (*r).clone()).unwrap_or_default();
    let mut slot = 0;
    let rewritten = substitute_aggregates(expr, members, params, &mut ctx, &mut slot)?;
    eval(&rewritten, &ctx, params)
}

/// Replace each aggregate call by a variable bound to its folded value.
fn substitute_aggregates(
    expr: &Expr,
    members: &[&Row],
    params: &PropertyMap,
    ctx: &mut Row,
    slot: &mut usize,
) -> Result<Expr> {
    let sub = |e: &Expr, ctx: &mut Row, slot: &mut usize| substitute_aggregates(e, members, params, ctx, slot);
    Ok(match expr {
        Expr::FunctionCall { name, args, distinct } if is_aggregate_function(name) => {
            let value = fold(name, args, *distinct, members, params)?;
            *slot += 1;
            let var = format!(" agg{slot}");
            ctx.insert(var.clone(), value);
            Expr::Variable(var)
        }
        Expr::FunctionCall { name, args, distinct } => Expr::FunctionCall {
            name: name.clone(),
            args: args.iter().map(|a| sub(a, ctx, slot)).collect::<Result<_>>()?,
            distinct: *distinct,
        },
        Expr::Property { expr, key } => Expr::Property { expr: Box::new(sub(expr, ctx, slot)?), key: key.clone() },
        Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
            left: Box::new(sub(left, ctx, slot)?),
            op: *op,
            right: Box::new(sub(right, ctx, slot)?),
        },
        Expr::UnaryOp { op, expr } => Expr::UnaryOp { op: *op, expr: Box::new(sub(expr, ctx, slot)?) },
        Expr::StringOp { left, op, right } => Expr::StringOp {
            left: Box::new(sub(left, ctx, slot)?),
            op: *op,
            right: Box::new(sub(right, ctx, slot)?),
        },
        Expr::In { expr, list } => Expr::In { expr: Box::new(sub(expr, ctx, slot)?), list: Box::new(sub(list, ctx, slot)?) },
        Expr::IsNull { expr, negated } => Expr::IsNull { expr: Box::new(sub(expr, ctx, slot)?), negated: *negated },
        Expr::HasLabel { expr, label } => Expr::HasLabel { expr: Box::new(sub(expr, ctx, slot)?), label: label.clone() },
        Expr::List(items) => Expr::List(items.iter().map(|i| sub(i, ctx, slot)).collect::<Result<_>>()?),
        Expr::MapLiteral(map) => {
            let mut out = HashMap::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), sub(v, ctx, slot)?);
            }
            Expr::MapLiteral(out)
        }
        Expr::Literal(_) | Expr::Variable(_) | Expr::Parameter(_) | Expr::Star => expr.clone(),
    })
}

fn fold(name: &str, args: &[Expr], distinct: bool, members: &[&Row], params: &PropertyMap) -> Result<Value> {
    let name = name.to_lowercase();
    if name == "count" && matches!(args, [Expr::Star]) {
        return Ok(Value::Int(members.len() as i64));
    }
    let [arg] = args else {
        return Err(fail(format!("{name}() takes exactly one argument")));
    };

    let mut values = Vec::with_capacity(members.len());
    for row in members {
        let value = eval(arg, row, params)?;
        if value.is_null() || (distinct && values.contains(&value)) {
            continue;
        }
        values.push(value);
    }

    match name.as_str() {
        "count" => Ok(Value::Int(values.len() as i64)),
        "collect" => Ok(Value::List(values)),
        "sum" => {
            let mut int_sum: i64 = 0;
            let mut float_sum: Option<f64> = None;
            for v in &values {
                match v {
                    Value::Int(i) => {
                        int_sum = int_sum.checked_add(*i).ok_or_else(|| fail("integer overflow in sum()"))?
                    }
                    Value::Float(f) => *float_sum.get_or_insert(0.0) += f,
                    other => return Err(fail(format!("sum() of {}", other.type_name()))),
                }
            }
            Ok(match float_sum {
                Some(f) => Value::Float(f + int_sum as f64),
                None => Value::Int(int_sum),
            })
        }
        "avg" => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let mut total = 0.0;
            for v in &values {
                total += v.as_float().ok_or_else(|| fail(format!("avg() of {}", v.type_name())))?;
            }
            Ok(Value::Float(total / values.len() as f64))
        }
        "min" => Ok(values.into_iter().min_by(|a, b| a.sort_cmp(b)).unwrap_or(Value::Null)),
        "max" => Ok(values.into_iter().max_by(|a, b| a.sort_cmp(b)).unwrap_or(Value::Null)),
        other => Err(fail(format!("Unknown aggregate function '{other}'"))),
    }
}

// ============================================================================
// Expressions
// ============================================================================

pub(super) fn eval(expr: &Expr, row: &Row, params: &PropertyMap) -> Result<Value> {
    match expr {
        Expr::Literal(lit) => Ok(literal(lit)),
        Expr::Variable(name) => row
            .get(name)
            .cloned()
            .ok_or_else(|| fail(format!("Variable `{name}` not defined"))),
        Expr::Property { expr, key } => property(eval(expr, row, params)?, key),
        Expr::Parameter(name) => params
            .get(name)
            .cloned()
            .ok_or_else(|| fail(format!("Expected parameter(s): {name}"))),
        Expr::FunctionCall { name, args, .. } => {
            if is_aggregate_function(name) {
                return Err(fail(format!("Aggregate function {name}() is not allowed here")));
            }
            let values = args.iter().map(|a| eval(a, row, params)).collect::<Result<Vec<_>>>()?;
            call_function(name, values)
        }
        Expr::BinaryOp { left, op, right } => {
            binary(*op, eval(left, row, params)?, eval(right, row, params)?)
        }
        Expr::UnaryOp { op, expr } => {
            let value = eval(expr, row, params)?;
            match (op, value) {
                (_, Value::Null) => Ok(Value::Null),
                (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (UnaryOp::Negate, Value::Int(i)) => {
                    i.checked_neg().map(Value::Int).ok_or_else(|| fail("integer overflow"))
                }
                (UnaryOp::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
                (op, other) => Err(fail(format!("Cannot apply {op:?} to {}", other.type_name()))),
            }
        }
        Expr::List(items) => Ok(Value::List(
            items.iter().map(|i| eval(i, row, params)).collect::<Result<_>>()?,
        )),
        Expr::MapLiteral(map) => {
            let mut out = HashMap::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), eval(v, row, params)?);
            }
            Ok(Value::Map(out))
        }
        Expr::In { expr, list } => {
            let needle = eval(expr, row, params)?;
            match eval(list, row, params)? {
                Value::Null => Ok(Value::Null),
                Value::List(items) => {
                    if needle.is_null() {
                        return Ok(Value::Null);
                    }
                    if items.iter().any(|i| needle.neo4j_eq(i)) {
                        Ok(Value::Bool(true))
                    } else if items.iter().any(Value::is_null) {
                        Ok(Value::Null)
                    } else {
                        Ok(Value::Bool(false))
                    }
                }
                other => Err(fail(format!("IN expects a list, got {}", other.type_name()))),
            }
        }
        Expr::IsNull { expr, negated } => Ok(Value::Bool(eval(expr, row, params)?.is_null() != *negated)),
        Expr::HasLabel { expr, label } => match eval(expr, row, params)? {
            Value::Node(n) => Ok(Value::Bool(n.has_label(label))),
            Value::Null => Ok(Value::Null),
            other => Err(fail(format!("Label check on {}", other.type_name()))),
        },
        Expr::StringOp { left, op, right } => {
            match (eval(left, row, params)?, eval(right, row, params)?) {
                (Value::String(a), Value::String(b)) => Ok(Value::Bool(match op {
                    StringOp::StartsWith => a.starts_with(&b),
                    StringOp::EndsWith => a.ends_with(&b),
                    StringOp::Contains => a.contains(&b),
                })),
                _ => Ok(Value::Null),
            }
        }
        Expr::Star => Err(fail("`*` is only allowed in RETURN * and count(*)")),
    }
}

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn property(base: Value, key: &str) -> Result<Value> {
    match base {
        Value::Node(n) => Ok(n.get(key).cloned().unwrap_or(Value::Null)),
        Value::Relationship(r) => Ok(r.properties.get(key).cloned().unwrap_or(Value::Null)),
        Value::Map(m) => Ok(m.get(key).cloned().unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(fail(format!(
            "Type mismatch: cannot read property `{key}` of {}",
            other.type_name()
        ))),
    }
}

fn truth(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Bool(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        other => Err(fail(format!("Type mismatch: expected Boolean but was {}", other.type_name()))),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    use BinaryOp::*;
    match op {
        And | Or | Xor => {
            let (a, b) = (truth(&left)?, truth(&right)?);
            let result = match op {
                And => match (a, b) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                },
                Or => match (a, b) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                },
                _ => a.zip(b).map(|(a, b)| a != b),
            };
            Ok(result.map_or(Value::Null, Value::Bool))
        }
        Eq | Neq => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            let eq = left.neo4j_eq(&right);
            Ok(Value::Bool(if op == Eq { eq } else { !eq }))
        }
        Lt | Lte | Gt | Gte => Ok(match left.neo4j_cmp(&right) {
            Some(ord) => Value::Bool(match op {
                Lt => ord.is_lt(),
                Lte => ord.is_le(),
                Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }),
            None => Value::Null,
        }),
        Add => match (left, right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (Value::List(mut a), b) => {
                a.push(b);
                Ok(Value::List(a))
            }
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            (Value::String(a), b @ (Value::Int(_) | Value::Float(_))) => Ok(Value::String(format!("{a}{b}"))),
            (a @ (Value::Int(_) | Value::Float(_)), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (a, b) => arithmetic(op, a, b),
        },
        Sub | Mul | Div | Mod => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            arithmetic(op, left, right)
        }
    }
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    use BinaryOp::*;
    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                Add => a.checked_add(b),
                Sub => a.checked_sub(b),
                Mul => a.checked_mul(b),
                Div | Mod if b == 0 => return Err(fail("/ by zero")),
                Div => a.checked_div(b),
                Mod => a.checked_rem(b),
                _ => None,
            };
            result.map(Value::Int).ok_or_else(|| fail("integer overflow"))
        }
        _ => match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => Ok(Value::Float(match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                _ => a % b,
            })),
            _ => Err(fail(format!(
                "Cannot apply {op:?} to {} and {}",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

fn call_function(name: &str, args: Vec<Value>) -> Result<Value> {
    let lower = name.to_lowercase();
    if lower == "coalesce" {
        return Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null));
    }

    let [arg]: [Value; 1] = args
        .try_into()
        .map_err(|_| fail(format!("{name}() takes exactly one argument")))?;
    if arg.is_null() {
        return Ok(Value::Null);
    }

    let mismatch = |v: &Value| fail(format!("{name}() does not accept {}", v.type_name()));
    match lower.as_str() {
        "tolower" => arg.as_str().map(|s| Value::String(s.to_lowercase())).ok_or_else(|| mismatch(&arg)),
        "toupper" => arg.as_str().map(|s| Value::String(s.to_uppercase())).ok_or_else(|| mismatch(&arg)),
        "trim" => arg.as_str().map(|s| Value::String(s.trim().to_string())).ok_or_else(|| mismatch(&arg)),
        "tostring" => match &arg {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => Ok(Value::String(arg.to_string())),
            other => Err(mismatch(other)),
        },
        "tointeger" => match &arg {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
            Value::String(s) => Ok(s.trim().parse::<i64>().map_or(Value::Null, Value::Int)),
            other => Err(mismatch(other)),
        },
        "tofloat" => match &arg {
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::String(s) => Ok(s.trim().parse::<f64>().map_or(Value::Null, Value::Float)),
            other => Err(mismatch(other)),
        },
        "abs" => match arg {
            Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(|| fail("integer overflow")),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(mismatch(&other)),
        },
        "round" => arg.as_float().map(|f| Value::Float(f.round())).ok_or_else(|| mismatch(&arg)),
        "size" => match &arg {
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(l) => Ok(Value::Int(l.len() as i64)),
            other => Err(mismatch(other)),
        },
        "labels" => match &arg {
            Value::Node(n) => Ok(Value::List(n.labels.iter().cloned().map(Value::String).collect())),
            other => Err(mismatch(other)),
        },
        "type" => match &arg {
            Value::Relationship(r) => Ok(Value::String(r.rel_type.clone())),
            other => Err(mismatch(other)),
        },
        "id" => match &arg {
            Value::Node(n) => Ok(Value::Int(n.id.0 as i64)),
            Value::Relationship(r) => Ok(Value::Int(r.id.0 as i64)),
            other => Err(mismatch(other)),
        },
        _ => Err(fail(format!("Unknown function '{name}'"))),
    }
}

// ============================================================================
// CREATE
// ============================================================================

/// Nodes and relationships of one CREATE statement, not yet in the graph.
struct Staging {
    next_node: u64,
    next_rel: u64,
    nodes: Vec<Node>,
    relationships: Vec<Relationship>,
}

impl Staging {
    fn node(&mut self, pat: &NodePattern, row: &mut Row, params: &PropertyMap) -> Result<NodeId> {
        if let Some(alias) = &pat.alias {
            if let Some(bound) = row.get(alias) {
                if !pat.labels.is_empty() || !pat.properties.is_empty() {
                    return Err(fail(format!("Variable `{alias}` already declared")));
                }
                return match bound {
                    Value::Node(n) => Ok(n.id),
                    other => Err(fail(format!("`{alias}` is a {}, not a node", other.type_name()))),
                };
            }
        }

        self.next_node += 1;
        let mut node = Node::new(NodeId(self.next_node)).with_labels(pat.labels.iter().cloned());
        node.properties = evaluate_properties(&pat.properties, row, params)?;
        if let Some(alias) = &pat.alias {
            row.insert(alias.clone(), Value::Node(Box::new(node.clone())));
        }
        let id = node.id;
        self.nodes.push(node);
        Ok(id)
    }

    fn relationship(
        &mut self,
        pat: &RelPattern,
        left: NodeId,
        right: NodeId,
        row: &mut Row,
        params: &PropertyMap,
    ) -> Result<()> {
        let [rel_type] = pat.rel_types.as_slice() else {
            return Err(fail("Exactly one relationship type must be specified for CREATE"));
        };
        if pat.var_length {
            return Err(fail("Variable length relationships cannot be used in CREATE"));
        }
        let (src, dst) = match pat.direction {
            PatternDirection::Right => (left, right),
            PatternDirection::Left => (right, left),
            PatternDirection::Both => {
                return Err(fail("Only directed relationships are supported in CREATE"));
            }
        };

        self.next_rel += 1;
        let mut rel = Relationship::new(RelId(self.next_rel), src, dst, rel_type.clone());
        rel.properties = evaluate_properties(&pat.properties, row, params)?;
        if let Some(alias) = &pat.alias {
            if row.contains_key(alias) {
                return Err(fail(format!("Variable `{alias}` already declared")));
            }
            row.insert(alias.clone(), Value::Relationship(Box::new(rel.clone())));
        }
        self.relationships.push(rel);
        Ok(())
    }
}

/// Null-valued properties are not stored.
fn evaluate_properties(exprs: &HashMap<String, Expr>, row: &Row, params: &PropertyMap) -> Result<PropertyMap> {
    let mut props = PropertyMap::with_capacity(exprs.len());
    for (key, expr) in exprs {
        let value = eval(expr, row, params)?;
        if !value.is_null() {
            props.insert(key.clone(), value);
        }
    }
    Ok(props)
}

pub(super) fn run_create(graph: &mut Graph, create: &CreateClause, params: &PropertyMap) -> Result<Vec<Record>> {
    let mut row = Row::new();
    let mut staging = Staging {
        next_node: graph.next_node_id,
        next_rel: graph.next_rel_id,
        nodes: Vec::new(),
        relationships: Vec::new(),
    };

    for pattern in &create.patterns {
        let mut left = staging.node(&pattern.start, &mut row, params)?;
        for (rel_pat, node_pat) in &pattern.hops {
            let right = staging.node(node_pat, &mut row, params)?;
            staging.relationship(rel_pat, left, right, &mut row, params)?;
            left = right;
        }
    }

    let (nodes, rels) = (staging.nodes.len(), staging.relationships.len());
    for node in staging.nodes {
        graph.insert_node(node);
    }
    for rel in staging.relationships {
        graph.insert_relationship(rel);
    }
    graph.next_node_id = staging.next_node;
    graph.next_rel_id = staging.next_rel;
    tracing::debug!(nodes, relationships = rels, "memory store CREATE applied");

    match &create.return_clause {
        Some(ret) => project(&[row], ret, &[], None, None, params),
        None => Ok(Vec::new()),
    }
}
