//! # neo4j-nlq — Natural-Language Questions over a Vehicle Auction Graph
//!
//! Translates a free-text question into schema-legal Cypher, forces the
//! result through deterministic rewrite and validation rules, runs it
//! against a property-graph store and returns plain JSON rows.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `GraphStore` and `CompletionClient` are the seams to the outside world
//! 2. **Clean DTOs**: `Node`, `Relationship`, `Value`, `Record` cross all boundaries
//! 3. **Parser owns nothing**: Cypher → AST is a pure function shared by the enforcer and the memory store
//! 4. **Never trust the generator**: every generated query passes the rule enforcer before it runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use neo4j_nlq::{MemoryStore, PipelineConfig, QueryTool, ScriptedClient};
//!
//! # async fn example() {
//! let client = ScriptedClient::new()
//!     .reply_cypher("MATCH (n:Name)-[:HAS_LOT]->(l:LotNumber) RETURN COUNT(DISTINCT l) AS total_cars");
//! let tool = QueryTool::new(MemoryStore::new(), client, PipelineConfig::default());
//!
//! let response = tool.query_neo4j_with_llm("How many cars are there?", false, None).await;
//! assert_eq!(response, r#"{"result":[{"total_cars":0}]}"#);
//! # }
//! ```
//!
//! ## Graph Stores
//!
//! | Store | Feature | Description |
//! |-------|---------|-------------|
//! | Memory | (always) | In-process graph running the generated Cypher subset |
//! | HTTP | `http` (default) | Neo4j transactional HTTP endpoint |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod cypher;
pub mod schema;
pub mod prompt;
pub mod llm;
pub mod translate;
pub mod enforce;
pub mod storage;
pub mod execution;
pub mod normalize;
pub mod tool;
pub mod config;
pub mod tx;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, Relationship, Value, PropertyMap, Record,
    NodeId, RelId, Direction,
};

// ============================================================================
// Re-exports: Pipeline
// ============================================================================

pub use schema::SchemaRegistry;
pub use translate::{QueryCandidate, Translator};
pub use enforce::{Enforcer, SchemaViolation};
pub use execution::{CreateRow, QueryExecutor};
pub use tool::{Answer, QueryTool, ToolRequest, ToolResponse, tool_definition};
pub use config::{Config, LlmConfig, PipelineConfig, StoreConfig};

// ============================================================================
// Re-exports: Stores and clients
// ============================================================================

pub use storage::{GraphStore, Session, MemoryStore};
#[cfg(feature = "http")]
pub use storage::HttpStore;
pub use llm::{CompletionClient, ScriptedClient};
#[cfg(feature = "http")]
pub use llm::OpenAiClient;
pub use tx::TxMode;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("completion is not a {{\"cypher\": ...}} object: {0}")]
    TranslationFormat(String),

    #[error("completion failed: {0}")]
    Completion(String),

    #[error("{0}")]
    StoreExecution(String),

    #[error("query breaks the graph schema: {0}")]
    SchemaViolation(String),

    #[error("create row is missing fields: {0}")]
    IncompleteRow(String),

    #[error("Cypher syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
