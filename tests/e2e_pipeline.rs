//! End-to-end tests for the question → answer pipeline.
//!
//! Each test exercises: translate -> enforce -> execute -> normalize ->
//! package, with a `ScriptedClient` standing in for the model and a
//! `MemoryStore` seeded through the creation template.

use neo4j_nlq::llm::Role;
use neo4j_nlq::prompt::COUNT_ALL_TEMPLATE;
use neo4j_nlq::tool::UNANSWERABLE_MESSAGE;
use neo4j_nlq::{CreateRow, MemoryStore, PipelineConfig, QueryTool, ScriptedClient};
use pretty_assertions::assert_eq;
use serde_json::{Value as JsonValue, json};

fn listing(name: &str, make: &str, lot: &str, place: &str) -> CreateRow {
    serde_json::from_value(json!({
        "name": name,
        "make": make,
        "cc": 1500,
        "year": 2016,
        "km": 64000,
        "place": place,
        "lot_number": lot,
        "start_price": 300000,
        "predictedminbid": 350000,
        "predictedmaxbid": 410000
    }))
    .unwrap()
}

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    let seeder = QueryTool::new(store.clone(), ScriptedClient::new(), PipelineConfig::default());
    for (name, make, lot, place) in [
        ("Corolla", "Toyota", "A-1", "Osaka"),
        ("Prius", "Toyota", "A-2", "Nagoya"),
        ("Civic", "Honda", "B-1", "Osaka"),
    ] {
        seeder.create(&listing(name, make, lot, place)).await.unwrap();
    }
    store
}

async fn tool_with(replies: ScriptedClient, config: PipelineConfig) -> QueryTool<MemoryStore, ScriptedClient> {
    QueryTool::new(seeded_store().await, replies, config)
}

fn parse(response: &str) -> JsonValue {
    serde_json::from_str(response).unwrap()
}

// ============================================================================
// 1. Count template passes unchanged and counts every lot
// ============================================================================

#[tokio::test]
async fn test_count_all_cars() {
    let tool = tool_with(ScriptedClient::new().reply_cypher(COUNT_ALL_TEMPLATE), PipelineConfig::default()).await;

    let response = tool.query_neo4j_with_llm("How many cars are there?", false, None).await;
    assert_eq!(parse(&response), json!({"result": [{"total_cars": 3}]}));

    let requests = tool.client().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].temperature, 0.0);
    assert_eq!(requests[0].n, 1);
    assert_eq!(requests[0].messages[0].role, Role::System);
    assert_eq!(requests[0].messages[1].content, "How many cars are there?");
}

// ============================================================================
// 2. Drifting make fragment and lowercase literal are repaired
// ============================================================================

#[tokio::test]
async fn test_honda_count_is_enforced() {
    let generated = "MATCH (mk:Make)-[:MANUFACTURES]->(c:Name)-[:HAS_LOT]->(l:LotNumber) \
                     WHERE mk.name = 'honda' RETURN COUNT(DISTINCT l) AS total_cars";
    let tool = tool_with(ScriptedClient::new().reply_cypher(generated), PipelineConfig::default()).await;

    let response = tool.query_neo4j_with_llm("How many Honda cars?", false, None).await;
    assert_eq!(parse(&response), json!({"result": [{"total_cars": 1}]}));
}

#[tokio::test]
async fn test_bare_make_fragment_gets_canonical_hop() {
    let generated = "MATCH (x:Make) WHERE x.name = 'toyota' RETURN x.name AS make, n.name AS model ORDER BY model";
    let tool = tool_with(ScriptedClient::new().reply_cypher(generated), PipelineConfig::default()).await;

    let response = tool.query_neo4j_with_llm("Which Toyota models are listed?", false, None).await;
    assert_eq!(
        parse(&response),
        json!({"result": [
            {"make": "Toyota", "model": "Corolla"},
            {"make": "Toyota", "model": "Prius"}
        ]})
    );
}

#[tokio::test]
async fn test_missing_return_falls_back_to_make_and_name() {
    let generated = "MATCH (x:Make) WHERE x.name = 'honda'";
    let tool = tool_with(ScriptedClient::new().reply_cypher(generated), PipelineConfig::default()).await;

    let response = tool.query_neo4j_with_llm("Show Honda cars", false, None).await;
    assert_eq!(parse(&response), json!({"result": [{"m.name": "Honda", "n.name": "Civic"}]}));
}

#[tokio::test]
async fn test_place_and_price_traversal() {
    let generated = "MATCH (n:Name)-[:HAS_LOT]->(l:LotNumber)-[:HAS_PLACE]->(p:Place {name: 'osaka'}) \
                     MATCH (minPrice:MinPrice)-[:BID_MIN]->(l) \
                     RETURN n.name AS model, minPrice.amount AS min_bid ORDER BY model";
    let tool = tool_with(ScriptedClient::new().reply_cypher(generated), PipelineConfig::default()).await;

    let response = tool.query_neo4j_with_llm("Minimum bids for cars in Osaka?", false, None).await;
    assert_eq!(
        parse(&response),
        json!({"result": [
            {"model": "Civic", "min_bid": 350000},
            {"model": "Corolla", "min_bid": 350000}
        ]})
    );
}

// ============================================================================
// 3. Unanswerable questions never reach the store
// ============================================================================

#[tokio::test]
async fn test_out_of_schema_question() {
    let tool = tool_with(ScriptedClient::new().reply(r#"{ "cypher": "" }"#), PipelineConfig::default()).await;
    let opened_before = tool.store().sessions_opened();

    let response = tool.query_neo4j_with_llm("What is the car's color?", false, None).await;
    assert_eq!(parse(&response), json!({"result": UNANSWERABLE_MESSAGE}));
    assert_eq!(tool.store().sessions_opened(), opened_before);
}

#[tokio::test]
async fn test_whitespace_sentinel_is_unanswerable() {
    let tool = tool_with(ScriptedClient::new().reply_cypher("   "), PipelineConfig::default()).await;
    let response = tool.query_neo4j_with_llm("Anything?", false, None).await;
    assert_eq!(parse(&response), json!({"result": UNANSWERABLE_MESSAGE}));
}

// ============================================================================
// 4. Error shapes
// ============================================================================

fn error_message(response: &str) -> String {
    let value = parse(response);
    let object = value.as_object().unwrap();
    assert_eq!(object.len(), 1, "response must carry exactly one key: {response}");
    object["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_fenced_reply_is_translation_error() {
    let reply = "```json\n{\"cypher\": \"MATCH (n:Name) RETURN n.name\"}\n```";
    let tool = tool_with(ScriptedClient::new().reply(reply), PipelineConfig::default()).await;

    let message = error_message(&tool.query_neo4j_with_llm("List models", false, None).await);
    assert!(message.starts_with("Error: "), "{message}");
    assert!(message.contains("cypher"), "{message}");
}

#[tokio::test]
async fn test_completion_failure_is_reported() {
    let tool = tool_with(ScriptedClient::new().fail("connection refused"), PipelineConfig::default()).await;
    let message = error_message(&tool.query_neo4j_with_llm("List models", false, None).await);
    assert!(message.starts_with("Error: "));
    assert!(message.contains("connection refused"));
}

#[tokio::test]
async fn test_store_failure_is_reported_and_session_released() {
    let tool = tool_with(
        ScriptedClient::new().reply_cypher("MATCH (n:Name) RETURN x.name"),
        PipelineConfig::default(),
    )
    .await;
    let message = error_message(&tool.query_neo4j_with_llm("List models", false, None).await);
    assert!(message.starts_with("Error: "));
    assert!(message.contains("`x`"), "{message}");
    assert_eq!(tool.store().open_sessions(), 0);
}

#[tokio::test]
async fn test_strict_schema_rejects_before_execution() {
    let config = PipelineConfig { strict_schema: true, ..PipelineConfig::default() };
    let tool = tool_with(
        ScriptedClient::new().reply_cypher("MATCH (n:Name)-[:HAS_COLOR]->(c:Color) RETURN c.value"),
        config,
    )
    .await;
    let opened_before = tool.store().sessions_opened();

    let message = error_message(&tool.query_neo4j_with_llm("What color is it?", false, None).await);
    assert!(message.starts_with("Error: "));
    assert!(message.contains("Color"), "{message}");
    assert_eq!(tool.store().sessions_opened(), opened_before);
}

#[tokio::test]
async fn test_lenient_schema_runs_anyway() {
    let tool = tool_with(
        ScriptedClient::new().reply_cypher("MATCH (n:Name)-[:HAS_COLOR]->(c:Color) RETURN c.value"),
        PipelineConfig::default(),
    )
    .await;
    let response = tool.query_neo4j_with_llm("What color is it?", false, None).await;
    assert_eq!(parse(&response), json!({"result": []}));
}

#[tokio::test]
async fn test_integer_overflow_is_reported() {
    let store = MemoryStore::new();
    let mut row = listing("Corolla", "Toyota", "A-1", "Osaka");
    row.year = Some(json!(i64::MIN));
    QueryTool::new(store.clone(), ScriptedClient::new(), PipelineConfig::default())
        .create(&row)
        .await
        .unwrap();

    let tool = QueryTool::new(
        store,
        ScriptedClient::new().reply_cypher("MATCH (y:Year) RETURN -y.value AS v"),
        PipelineConfig::default(),
    );
    let message = error_message(&tool.query_neo4j_with_llm("Negated years?", false, None).await);
    assert!(message.starts_with("Error: "), "{message}");
    assert!(message.contains("overflow"), "{message}");
    assert_eq!(tool.store().open_sessions(), 0);
}

// ============================================================================
// 5. Raw host arguments
// ============================================================================

#[tokio::test]
async fn test_call_json_reads_host_arguments() {
    let tool = tool_with(ScriptedClient::new().reply_cypher(COUNT_ALL_TEMPLATE), PipelineConfig::default()).await;
    let response = tool.call_json(json!({"natural_query": "How many cars are there?"})).await;
    assert_eq!(response.to_json(), json!({"result": [{"total_cars": 3}]}));
}

#[tokio::test]
async fn test_call_json_rejects_bad_arguments() {
    let tool = tool_with(ScriptedClient::new(), PipelineConfig::default()).await;
    let response = tool.call_json(json!({"question": 42})).await;
    assert!(response.is_error());
    assert!(tool.client().requests().is_empty());
}

#[tokio::test]
async fn test_create_flag_without_row_answers_question() {
    let tool = tool_with(ScriptedClient::new().reply_cypher(COUNT_ALL_TEMPLATE), PipelineConfig::default()).await;
    let response = tool.query_neo4j_with_llm("How many cars are there?", true, None).await;
    assert_eq!(parse(&response), json!({"result": [{"total_cars": 3}]}));
}
