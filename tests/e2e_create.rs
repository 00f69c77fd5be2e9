//! End-to-end tests for the create path.
//!
//! The creation template bypasses translation and enforcement: the row goes
//! straight to the executor and the echo comes back through the packager.

use neo4j_nlq::prompt::COUNT_ALL_TEMPLATE;
use neo4j_nlq::{CreateRow, MemoryStore, PipelineConfig, QueryTool, ScriptedClient, SchemaRegistry, Value};
use pretty_assertions::assert_eq;
use serde_json::{Value as JsonValue, json};

fn corolla() -> CreateRow {
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

fn tool(config: PipelineConfig) -> QueryTool<MemoryStore, ScriptedClient> {
    QueryTool::new(MemoryStore::new(), ScriptedClient::new(), config)
}

fn parse(response: &str) -> JsonValue {
    serde_json::from_str(response).unwrap()
}

// ============================================================================
// 1. A full row writes the whole subgraph and echoes it
// ============================================================================

#[tokio::test]
async fn test_full_row_creates_subgraph() {
    let tool = tool(PipelineConfig::default());
    let response = tool.query_neo4j_with_llm("", true, Some(corolla())).await;

    assert_eq!(
        parse(&response),
        json!({"result": [{"name": "Corolla", "make": "Toyota", "lot_number": "A-1024"}]})
    );

    let store = tool.store();
    assert_eq!(store.node_count(), 10);
    assert_eq!(store.relationship_count(), 17);
    for label in SchemaRegistry::auto_auction().nodes().iter().map(|n| n.label) {
        assert_eq!(store.nodes_with_label(label).len(), 1, "exactly one :{label} node");
    }
    assert_eq!(store.open_sessions(), 0);
    assert!(tool.client().requests().is_empty());
}

#[tokio::test]
async fn test_properties_land_on_their_nodes() {
    let tool = tool(PipelineConfig::default());
    tool.create(&corolla()).await.unwrap();

    let store = tool.store();
    let min = &store.nodes_with_label("MinPrice")[0];
    assert_eq!(min.get("amount"), Some(&Value::Int(500000)));
    let place = &store.nodes_with_label("Place")[0];
    assert_eq!(place.get("name"), Some(&Value::from("Osaka")));
    let km = &store.nodes_with_label("Kilometers")[0];
    assert_eq!(km.get("value"), Some(&Value::Int(82000)));
}

#[tokio::test]
async fn test_every_created_edge_is_in_the_schema() {
    let tool = tool(PipelineConfig::default());
    tool.create(&corolla()).await.unwrap();

    let schema = SchemaRegistry::auto_auction();
    let summary = tool.store().relationship_summary();
    assert_eq!(summary.len(), schema.relationships().len());
    for (source, rel_type, target) in summary {
        let source = source.first().map(String::as_str);
        let target = target.first().map(String::as_str);
        assert!(schema.allows(source, &rel_type, target), "{source:?}-[:{rel_type}]->{target:?}");
    }
}

// ============================================================================
// 2. Incomplete rows
// ============================================================================

#[tokio::test]
async fn test_missing_fields_are_written_as_null() {
    let tool = tool(PipelineConfig::default());
    let row = CreateRow { name: Some(json!("Fit")), make: Some(json!("Honda")), ..CreateRow::default() };

    let response = tool.query_neo4j_with_llm("", true, Some(row)).await;
    assert_eq!(
        parse(&response),
        json!({"result": [{"name": "Fit", "make": "Honda", "lot_number": null}]})
    );
    assert_eq!(tool.store().node_count(), 10);
}

#[tokio::test]
async fn test_strict_rows_reject_missing_fields() {
    let tool = tool(PipelineConfig { require_complete_rows: true, ..PipelineConfig::default() });
    let row = CreateRow { name: Some(json!("Fit")), ..CreateRow::default() };

    let response = parse(&tool.query_neo4j_with_llm("", true, Some(row)).await);
    let message = response["error"].as_str().unwrap();
    assert!(message.starts_with("Error creating nodes: "), "{message}");
    assert!(message.contains("make"), "{message}");
    assert_eq!(tool.store().node_count(), 0);
    assert_eq!(tool.store().sessions_opened(), 0);
}

// ============================================================================
// 3. Host arguments and follow-up reads
// ============================================================================

#[tokio::test]
async fn test_call_json_create() {
    let tool = tool(PipelineConfig::default());
    let args = json!({
        "natural_query": "",
        "create_nodes": true,
        "row": serde_json::to_value(corolla()).unwrap()
    });
    let response = tool.call_json(args).await;
    assert!(!response.is_error());
    assert_eq!(tool.store().sessions_opened(), 1);
}

#[tokio::test]
async fn test_empty_row_answers_the_question() {
    let store = MemoryStore::new();
    QueryTool::new(store.clone(), ScriptedClient::new(), PipelineConfig::default())
        .create(&corolla())
        .await
        .unwrap();

    let tool = QueryTool::new(
        store,
        ScriptedClient::new().reply_cypher(COUNT_ALL_TEMPLATE),
        PipelineConfig::default(),
    );
    let args = json!({"natural_query": "How many cars are there?", "create_nodes": true, "row": {}});
    let response = tool.call_json(args).await;

    assert_eq!(response.to_json(), json!({"result": [{"total_cars": 1}]}));
    assert_eq!(tool.store().node_count(), 10);
    assert_eq!(tool.client().requests().len(), 1);
}

#[tokio::test]
async fn test_created_cars_are_counted() {
    let store = MemoryStore::new();
    let writer = QueryTool::new(store.clone(), ScriptedClient::new(), PipelineConfig::default());
    writer.create(&corolla()).await.unwrap();
    let mut second = corolla();
    second.lot_number = Some(json!("A-2048"));
    writer.create(&second).await.unwrap();
    assert_eq!(store.node_count(), 20);

    let reader = QueryTool::new(
        store,
        ScriptedClient::new().reply_cypher(COUNT_ALL_TEMPLATE),
        PipelineConfig::default(),
    );
    let response = reader.query_neo4j_with_llm("How many cars are there?", false, None).await;
    assert_eq!(parse(&response), json!({"result": [{"total_cars": 2}]}));
    assert_eq!(reader.store().open_sessions(), 0);
}
