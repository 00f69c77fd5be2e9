//! # Query Tool
//!
//! The single invocation surface a host exposes: a question (and optionally
//! a listing to create) in, one JSON document out. Every failure is folded
//! into `{"error": ...}`; nothing escapes as a fault.

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::config::PipelineConfig;
use crate::enforce::Enforcer;
use crate::execution::{CreateRow, QueryExecutor};
use crate::llm::CompletionClient;
use crate::normalize;
use crate::storage::GraphStore;
use crate::translate::{QueryCandidate, Translator};
use crate::Result;

/// Informational result for questions the schema cannot answer.
pub const UNANSWERABLE_MESSAGE: &str = "Query cannot be answered with the available schema.";

/// Name under which hosts register the tool.
pub const TOOL_NAME: &str = "query_neo4j_with_llm";

/// Arguments of one tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub natural_query: String,
    #[serde(default)]
    pub create_nodes: bool,
    #[serde(default)]
    pub row: Option<CreateRow>,
}

/// Outcome of the read path.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Rows(Vec<JsonValue>),
    Unanswerable,
}

/// The wire shape: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ToolResponse {
    #[serde(rename = "result")]
    Result(ResultPayload),
    #[serde(rename = "error")]
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultPayload {
    Rows(Vec<JsonValue>),
    Message(String),
}

impl ToolResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolResponse::Error(_))
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            ToolResponse::Result(ResultPayload::Rows(rows)) => json!({ "result": rows }),
            ToolResponse::Result(ResultPayload::Message(msg)) => json!({ "result": msg }),
            ToolResponse::Error(msg) => json!({ "error": msg }),
        }
    }
}

impl std::fmt::Display for ToolResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Translator, enforcer and executor wired into one pipeline.
pub struct QueryTool<S, C> {
    translator: Translator<C>,
    enforcer: Enforcer,
    executor: QueryExecutor<S>,
}

impl<S: GraphStore, C: CompletionClient> QueryTool<S, C> {
    pub fn new(store: S, client: C, config: PipelineConfig) -> Self {
        let executor = QueryExecutor::new(store).require_complete_rows(config.require_complete_rows);
        Self {
            translator: Translator::new(client),
            enforcer: Enforcer::new(config),
            executor,
        }
    }

    pub fn store(&self) -> &S {
        self.executor.store()
    }

    pub fn client(&self) -> &C {
        self.translator.client()
    }

    /// Translate, enforce, execute and normalize one question.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let query = match self.translator.translate(question).await? {
            QueryCandidate::Unanswerable => return Ok(Answer::Unanswerable),
            QueryCandidate::Cypher(query) => query,
        };

        let enforced = self.enforcer.apply(&query)?;
        if enforced != query {
            tracing::info!(before = %query, after = %enforced, "query rewritten by rule enforcement");
        }

        let records = self.executor.execute_read(&enforced).await?;
        Ok(Answer::Rows(normalize::normalize_all(&records)))
    }

    /// Write one listing and return the normalized echo.
    pub async fn create(&self, row: &CreateRow) -> Result<Vec<JsonValue>> {
        let records = self.executor.execute_create(row).await?;
        Ok(normalize::normalize_all(&records))
    }

    pub async fn call(&self, request: ToolRequest) -> ToolResponse {
        let row = request.row.filter(|row| !row.is_empty());
        match (request.create_nodes, row) {
            (true, Some(row)) => match self.create(&row).await {
                Ok(rows) => ToolResponse::Result(ResultPayload::Rows(rows)),
                Err(e) => {
                    tracing::warn!(error = %e, "create path failed");
                    ToolResponse::Error(format!("Error creating nodes: {e}"))
                }
            },
            (create_nodes, _) => {
                if create_nodes {
                    tracing::debug!("create_nodes set without a usable row, answering the question instead");
                }
                match self.answer(&request.natural_query).await {
                    Ok(Answer::Rows(rows)) => ToolResponse::Result(ResultPayload::Rows(rows)),
                    Ok(Answer::Unanswerable) => {
                        ToolResponse::Result(ResultPayload::Message(UNANSWERABLE_MESSAGE.into()))
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "read path failed");
                        ToolResponse::Error(format!("Error: {e}"))
                    }
                }
            }
        }
    }

    /// The tool entry point: returns the response as a JSON string.
    pub async fn query_neo4j_with_llm(
        &self,
        natural_query: &str,
        create_nodes: bool,
        row: Option<CreateRow>,
    ) -> String {
        let request = ToolRequest { natural_query: natural_query.to_string(), create_nodes, row };
        self.call(request).await.to_string()
    }

    /// Call with the raw argument object a host received.
    pub async fn call_json(&self, args: JsonValue) -> ToolResponse {
        match serde_json::from_value::<ToolRequest>(args) {
            Ok(request) => self.call(request).await,
            Err(e) => ToolResponse::Error(format!("Error: invalid tool arguments: {e}")),
        }
    }
}

#[cfg(feature = "http")]
impl QueryTool<crate::storage::HttpStore, crate::llm::OpenAiClient> {
    /// Tool over a Neo4j HTTP endpoint and an OpenAI-compatible model.
    pub fn from_config(config: crate::config::Config) -> Result<Self> {
        let store = crate::storage::HttpStore::new(config.store)?;
        let client = crate::llm::OpenAiClient::new(config.llm)?;
        Ok(Self::new(store, client, config.pipeline))
    }
}

/// Tool descriptor with the JSON schema of its arguments.
pub fn tool_definition() -> JsonValue {
    let field = |description: &str| json!({ "description": description });
    json!({
        "name": TOOL_NAME,
        "description": "Answer a question about the vehicle auction graph by translating it to Cypher, \
                        or create one vehicle listing when create_nodes is true and row is given.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "natural_query": { "type": "string", "description": "The question in plain language" },
                "create_nodes": { "type": "boolean", "default": false },
                "row": {
                    "type": "object",
                    "properties": {
                        "name": field("Vehicle model"),
                        "make": field("Manufacturer"),
                        "cc": field("Engine displacement"),
                        "year": field("Model year"),
                        "km": field("Odometer reading"),
                        "place": field("Auction venue"),
                        "lot_number": field("Auction lot number"),
                        "start_price": field("Starting price"),
                        "predictedminbid": field("Predicted minimum bid"),
                        "predictedmaxbid": field("Predicted maximum bid")
                    }
                }
            },
            "required": ["natural_query"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_response_shapes() {
        let rows = ToolResponse::Result(ResultPayload::Rows(vec![json!({"total_cars": 3})]));
        assert_eq!(rows.to_json(), json!({"result": [{"total_cars": 3}]}));
        assert_eq!(serde_json::to_value(&rows).unwrap(), rows.to_json());

        let message = ToolResponse::Result(ResultPayload::Message(UNANSWERABLE_MESSAGE.into()));
        assert_eq!(message.to_string(), json!({"result": UNANSWERABLE_MESSAGE}).to_string());

        let error = ToolResponse::Error("Error: boom".into());
        assert!(error.is_error());
        assert_eq!(serde_json::to_value(&error).unwrap(), json!({"error": "Error: boom"}));
    }

    #[test]
    fn test_request_defaults() {
        let request: ToolRequest = serde_json::from_value(json!({"natural_query": "How many cars?"})).unwrap();
        assert_eq!(request, ToolRequest { natural_query: "How many cars?".into(), ..ToolRequest::default() });
    }

    #[test]
    fn test_definition_lists_row_fields() {
        let def = tool_definition();
        assert_eq!(def["name"], TOOL_NAME);
        let row = &def["inputSchema"]["properties"]["row"]["properties"];
        assert_eq!(row.as_object().map(|o| o.len()), Some(10));
        assert_eq!(def["inputSchema"]["required"], json!(["natural_query"]));
    }
}
