//! # Record Normalizer
//!
//! Converts store rows into plain JSON objects. Graph entities collapse to
//! their property maps; values without a structured JSON form (non-finite
//! floats, bytes, temporal and spatial values) fall back to their display
//! text. Normalization never fails.

use std::collections::HashMap;

use serde_json::{Map, Number, Value as JsonValue};

use crate::model::{Record, Value};

/// One row as a JSON object, columns in query order.
pub fn normalize(record: &Record) -> Map<String, JsonValue> {
    record
        .iter()
        .map(|(key, value)| (key.to_string(), normalize_value(key, value)))
        .collect()
}

/// Every row of a result set.
pub fn normalize_all(records: &[Record]) -> Vec<JsonValue> {
    records.iter().map(|r| JsonValue::Object(normalize(r))).collect()
}

fn normalize_value(column: &str, value: &Value) -> JsonValue {
    match to_json(value) {
        Some(json) => json,
        None => {
            tracing::debug!(column, kind = value.type_name(), "value has no JSON form, using its text");
            JsonValue::String(value.to_string())
        }
    }
}

/// Structured conversion; `None` when any part of the value has no JSON form.
pub fn to_json(value: &Value) -> Option<JsonValue> {
    match value {
        Value::Null => Some(JsonValue::Null),
        Value::Bool(b) => Some(JsonValue::Bool(*b)),
        Value::Int(i) => Some(JsonValue::Number((*i).into())),
        Value::Float(f) => Number::from_f64(*f).map(JsonValue::Number),
        Value::String(s) => Some(JsonValue::String(s.clone())),
        Value::List(items) => items.iter().map(to_json).collect::<Option<Vec<_>>>().map(JsonValue::Array),
        Value::Map(map) => properties_to_json(map),
        Value::Node(node) => properties_to_json(&node.properties),
        Value::Relationship(rel) => properties_to_json(&rel.properties),
        Value::Bytes(_)
        | Value::Date(_)
        | Value::Time(_)
        | Value::DateTime(_)
        | Value::LocalDateTime(_)
        | Value::Duration(_)
        | Value::Point2D { .. }
        | Value::Point3D { .. } => None,
    }
}

fn properties_to_json(map: &HashMap<String, Value>) -> Option<JsonValue> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    let mut out = Map::with_capacity(map.len());
    for key in keys {
        out.insert(key.clone(), to_json(&map[key])?);
    }
    Some(JsonValue::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, NodeId};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_scalars_pass_through_in_column_order() {
        let record = Record::new()
            .with("total_cars", 3i64)
            .with("make", "Toyota")
            .with("avg", 1.5f64)
            .with("missing", Value::Null);
        let row = normalize(&record);
        assert_eq!(
            JsonValue::Object(row.clone()),
            json!({"total_cars": 3, "make": "Toyota", "avg": 1.5, "missing": null})
        );
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["total_cars", "make", "avg", "missing"]);
    }

    #[test]
    fn test_node_becomes_property_map() {
        let node = Node::new(NodeId(7))
            .with_labels(["Name"])
            .with_property("name", "Corolla");
        let row = normalize(&Record::new().with("n", node));
        assert_eq!(JsonValue::Object(row), json!({"n": {"name": "Corolla"}}));
    }

    #[test]
    fn test_nested_containers() {
        let value = Value::List(vec![
            Value::Int(1),
            Value::Map(HashMap::from([("amount".to_string(), Value::Float(2.5))])),
        ]);
        assert_eq!(to_json(&value), Some(json!([1, {"amount": 2.5}])));
    }

    #[test]
    fn test_unstructured_values_fall_back_to_text() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let record = Record::new()
            .with("d", Value::Date(date))
            .with("nan", Value::Float(f64::NAN))
            .with("l", Value::List(vec![Value::Int(1), Value::Bytes(vec![1])]));
        let row = normalize(&record);
        assert_eq!(row["d"], json!(Value::Date(date).to_string()));
        assert!(row["nan"].is_string());
        assert!(row["l"].is_string());
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<f64>().prop_map(Value::Float),
            "[a-zA-Z ]{0,12}".prop_map(Value::String),
            proptest::collection::vec(any::<u8>(), 0..4).prop_map(Value::Bytes),
            (-1000i64..1000).prop_map(|d| Value::Duration(crate::model::IsoDuration {
                months: 0,
                days: d,
                seconds: 0,
                nanoseconds: 0,
            })),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
                proptest::collection::hash_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_normalize_never_panics_and_keeps_shape(value in arb_value()) {
            let row = normalize(&Record::new().with("v", value.clone()));
            let out = &row["v"];
            match (&value, to_json(&value)) {
                (_, None) => prop_assert!(out.is_string()),
                (Value::Map(_), Some(_)) => prop_assert!(out.is_object()),
                (Value::List(_), Some(_)) => prop_assert!(out.is_array()),
                (Value::Int(i), Some(_)) => prop_assert_eq!(out.as_i64(), Some(*i)),
                (Value::String(s), Some(_)) => prop_assert_eq!(out.as_str(), Some(s.as_str())),
                (Value::Bool(b), Some(_)) => prop_assert_eq!(out.as_bool(), Some(*b)),
                (Value::Null, Some(_)) => prop_assert!(out.is_null()),
                _ => {}
            }
        }
    }
}
