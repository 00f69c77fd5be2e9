//! Query execution.
//!
//! Runs an enforced read query, or the fixed vehicle creation template,
//! through one scoped session per call. The session is closed on every exit
//! path and every store failure surfaces as [`Error::StoreExecution`].

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::model::{PropertyMap, Record, Value};
use crate::storage::{GraphStore, Session};
use crate::{Error, Result};

/// Writes one vehicle with its attribute, lot and price subgraph and echoes
/// the created name, make and lot number.
pub const CREATE_TEMPLATE: &str = "\
CREATE (n:Name {name: $name})
CREATE (mk:Make {name: $make})
CREATE (cc:CC {value: $cc})
CREATE (year:Year {value: $year})
CREATE (km:Kilometers {value: $km})
CREATE (p:Place {name: $place})
CREATE (lot:LotNumber {lot_number: $lot_number})
CREATE (sp:StartPrice {amount: $start_price})
CREATE (minPrice:MinPrice {amount: $predictedminbid})
CREATE (maxPrice:MaxPrice {amount: $predictedmaxbid})
CREATE (n)-[:HAS_CC]->(cc)
CREATE (cc)-[:BELONGS_TO]->(n)
CREATE (mk)-[:MANUFACTURES]->(n)
CREATE (n)-[:HAS_YEAR]->(year)
CREATE (year)-[:YEAR_OF]->(n)
CREATE (n)-[:HAS_KM]->(km)
CREATE (km)-[:KILOMETERS_OF]->(n)
CREATE (lot)-[:HAS_PLACE]->(p)
CREATE (p)-[:LOCATION_OF]->(lot)
CREATE (lot)-[:ASSIGNED_TO]->(n)
CREATE (n)-[:HAS_LOT]->(lot)
CREATE (lot)-[:HAS_START_PRICE]->(sp)
CREATE (sp)-[:START_PRICE_OF]->(lot)
CREATE (lot)<-[:BID_MIN]-(minPrice)
CREATE (minPrice)-[:BELONGS_TO_LOT]->(lot)
CREATE (lot)<-[:BID_MAX]-(maxPrice)
CREATE (maxPrice)-[:BELONGS_TO_LOT]->(lot)
RETURN n.name AS name, mk.name AS make, lot.lot_number AS lot_number";

/// One auction listing to write. Absent fields are sent as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateRow {
    pub name: Option<JsonValue>,
    pub make: Option<JsonValue>,
    pub cc: Option<JsonValue>,
    pub year: Option<JsonValue>,
    pub km: Option<JsonValue>,
    pub place: Option<JsonValue>,
    pub lot_number: Option<JsonValue>,
    pub start_price: Option<JsonValue>,
    pub predictedminbid: Option<JsonValue>,
    pub predictedmaxbid: Option<JsonValue>,
}

impl CreateRow {
    fn fields(&self) -> [(&'static str, &Option<JsonValue>); 10] {
        [
            ("name", &self.name),
            ("make", &self.make),
            ("cc", &self.cc),
            ("year", &self.year),
            ("km", &self.km),
            ("place", &self.place),
            ("lot_number", &self.lot_number),
            ("start_price", &self.start_price),
            ("predictedminbid", &self.predictedminbid),
            ("predictedmaxbid", &self.predictedmaxbid),
        ]
    }

    /// Whether every field is absent.
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, v)| v.is_none())
    }

    /// Names of the fields that are absent or null.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.fields()
            .into_iter()
            .filter(|(_, v)| v.as_ref().is_none_or(JsonValue::is_null))
            .map(|(k, _)| k)
            .collect()
    }

    /// The template parameters, one per field.
    pub fn to_params(&self) -> PropertyMap {
        self.fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.clone().map_or(Value::Null, Value::from_json)))
            .collect()
    }
}

/// Read and create execution over a graph store.
pub struct QueryExecutor<S> {
    store: S,
    require_complete_rows: bool,
}

impl<S: GraphStore> QueryExecutor<S> {
    pub fn new(store: S) -> Self {
        Self { store, require_complete_rows: false }
    }

    /// Reject create rows with missing fields instead of writing nulls.
    pub fn require_complete_rows(mut self, yes: bool) -> Self {
        self.require_complete_rows = yes;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run `query` in a read transaction and return every row.
    pub async fn execute_read(&self, query: &str) -> Result<Vec<Record>> {
        let mut session = self.store.open_session().await.map_err(store_error)?;
        let result = session.execute_read(query).await;
        let closed = session.close().await;

        let rows = result.map_err(store_error)?;
        closed.map_err(store_error)?;
        tracing::info!(rows = rows.len(), "read query finished");
        Ok(rows)
    }

    /// Write one listing with the creation template.
    pub async fn execute_create(&self, row: &CreateRow) -> Result<Vec<Record>> {
        let missing = row.missing_fields();
        if !missing.is_empty() {
            if self.require_complete_rows {
                return Err(Error::IncompleteRow(missing.join(", ")));
            }
            tracing::warn!(missing = ?missing, "create row has missing fields, writing nulls");
        }

        let mut session = self.store.open_session().await.map_err(store_error)?;
        let result = session.execute_write(CREATE_TEMPLATE, row.to_params()).await;
        let closed = session.close().await;

        let rows = result.map_err(store_error)?;
        closed.map_err(store_error)?;
        tracing::info!(rows = rows.len(), "creation template finished");
        Ok(rows)
    }
}

fn store_error(e: Error) -> Error {
    match e {
        Error::StoreExecution(_) => e,
        other => Error::StoreExecution(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn full_row() -> CreateRow {
        serde_json::from_value(json!({
            "name": "Corolla",
            "make": "Toyota",
            "cc": 1800,
            "year": 2015,
            "km": 82000,
            "place": "Osaka",
            "lot_number": "A-1024",
            "start_price": 450000,
            "predictedminbid": 500000,
            "predictedmaxbid": 620000
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_writes_full_subgraph() {
        let executor = QueryExecutor::new(MemoryStore::new());
        let rows = executor.execute_create(&full_row()).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("name").unwrap(), "Corolla");
        assert_eq!(rows[0].get::<String>("make").unwrap(), "Toyota");
        assert_eq!(rows[0].get::<String>("lot_number").unwrap(), "A-1024");

        let store = executor.store();
        assert_eq!(store.node_count(), 10);
        assert_eq!(store.relationship_count(), 17);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_template_edges_follow_schema() {
        let executor = QueryExecutor::new(MemoryStore::new());
        executor.execute_create(&full_row()).await.unwrap();

        let schema = SchemaRegistry::auto_auction();
        for (source, rel_type, target) in executor.store().relationship_summary() {
            assert!(
                schema.allows(source.first().map(String::as_str), &rel_type, target.first().map(String::as_str)),
                "{source:?}-[:{rel_type}]->{target:?} is not in the schema"
            );
        }
    }

    #[test]
    fn test_missing_fields_and_null_params() {
        let row = CreateRow {
            name: Some(json!("Civic")),
            make: Some(json!("Honda")),
            km: Some(JsonValue::Null),
            ..CreateRow::default()
        };
        assert_eq!(
            row.missing_fields(),
            vec!["cc", "year", "km", "place", "lot_number", "start_price", "predictedminbid", "predictedmaxbid"]
        );
        let params = row.to_params();
        assert_eq!(params.len(), 10);
        assert_eq!(params["name"], Value::from("Civic"));
        assert_eq!(params["cc"], Value::Null);
    }

    #[test]
    fn test_empty_row() {
        assert!(CreateRow::default().is_empty());
        let row: CreateRow = serde_json::from_value(json!({"name": null})).unwrap();
        assert!(row.is_empty());
        assert!(!full_row().is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_row_is_rejected_when_required() {
        let executor = QueryExecutor::new(MemoryStore::new()).require_complete_rows(true);
        let row = CreateRow { name: Some(json!("Civic")), ..CreateRow::default() };
        let result = executor.execute_create(&row).await;
        assert!(matches!(result, Err(Error::IncompleteRow(_))));
        assert_eq!(executor.store().sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_row_writes_nulls_by_default() {
        let executor = QueryExecutor::new(MemoryStore::new());
        let row = CreateRow { name: Some(json!("Civic")), make: Some(json!("Honda")), ..CreateRow::default() };
        let rows = executor.execute_create(&row).await.unwrap();
        assert_eq!(rows[0].value("lot_number"), Some(&Value::Null));
        assert_eq!(executor.store().node_count(), 10);
    }

    #[tokio::test]
    async fn test_read_failure_maps_to_store_error_and_closes_session() {
        let executor = QueryExecutor::new(MemoryStore::new());
        let result = executor.execute_read("MATCH (n:Name RETURN n").await;
        assert!(matches!(result, Err(Error::StoreExecution(_))));
        assert_eq!(executor.store().open_sessions(), 0);
        assert_eq!(executor.store().sessions_opened(), 1);
    }
}
