//! Property tests for the make rule.

use neo4j_nlq::enforce::{CANONICAL_MAKE_CLAUSE, FALLBACK_RETURN, enforce};
use proptest::prelude::*;

fn make_variable() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["x", "mk", "a1", "car", "brand", "maker", "m", "n"])
}

/// Continuations after a `MATCH (<var>:Make)` fragment. `{v}` is the make variable.
fn tail_with_return() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        " RETURN {v}.name",
        " WHERE {v}.name = 'Honda' RETURN {v}.name AS make",
        "-[:MANUFACTURES]->(c:Name) RETURN c.name",
        "-[:MANUFACTURES]->(c:Name)-[:HAS_LOT]->(l:LotNumber) WHERE {v}.name = 'kia' RETURN COUNT(DISTINCT l) AS total_cars",
        " MATCH (p:Place) RETURN {v}.name, p.name",
    ])
}

fn tail_without_return() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "",
        " WHERE {v}.name = 'Toyota'",
        " WHERE {v}.name = 'Toyota';",
        "-[:MANUFACTURES]->(c:Name)-[:HAS_YEAR]->(y:Year) WHERE y.value > 2015",
    ])
}

fn other_label() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["Name", "CC", "Year", "Kilometers", "LotNumber", "Place", "StartPrice", "MinPrice"])
}

fn keyword_case() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["MATCH", "match", "Match"])
}

proptest! {
    #[test]
    fn prop_canonical_clause_is_left_alone(
        prefix in prop::sample::select(vec!["", "OPTIONAL MATCH (p:Place) "]),
        tail in tail_with_return(),
    ) {
        let q = format!("{prefix}{CANONICAL_MAKE_CLAUSE}{}", tail.replace("{v}", "m"));
        prop_assert_eq!(enforce(&q), q);
    }

    #[test]
    fn prop_make_fragment_yields_one_canonical_clause(
        keyword in keyword_case(),
        var in make_variable(),
        tail in prop_oneof![tail_with_return(), tail_without_return()],
    ) {
        let q = format!("{keyword} ({var}:Make){}", tail.replace("{v}", var));
        let out = enforce(&q);
        prop_assert_eq!(out.matches(CANONICAL_MAKE_CLAUSE).count(), 1, "{}", out);
        if var != "m" {
            let stale = format!("({var}:Make)");
            prop_assert!(!out.contains(&stale), "{}", out);
        }
        prop_assert_eq!(enforce(&out), out.clone());
    }

    #[test]
    fn prop_missing_return_is_appended(
        var in make_variable(),
        tail in tail_without_return(),
    ) {
        let q = format!("MATCH ({var}:Make){}", tail.replace("{v}", var));
        let out = enforce(&q);
        prop_assert!(out.ends_with(FALLBACK_RETURN), "{}", out);
        prop_assert!(!out.contains(';'), "{}", out);
    }

    #[test]
    fn prop_queries_without_make_are_unchanged(
        label in other_label(),
        filter in "[a-z]{0,8}",
    ) {
        let q = format!("MATCH (x:{label}) WHERE x.name = '{filter}' RETURN x");
        prop_assert_eq!(enforce(&q), q);
    }

    #[test]
    fn prop_arbitrary_text_without_make_is_unchanged(q in "[ -~]{0,80}") {
        prop_assume!(!q.contains("Make"));
        prop_assert_eq!(enforce(&q), q);
    }
}
