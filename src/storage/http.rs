//! Neo4j transactional HTTP endpoint.
//!
//! Every statement is sent as a single auto-committing transaction to
//! `POST {uri}/db/{database}/tx/commit`. The transaction access mode travels
//! in the `access-mode` header so a read session is refused writes by the
//! server itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GraphStore, Session};
use crate::config::StoreConfig;
use crate::model::{PropertyMap, Record, Value};
use crate::normalize;
use crate::tx::TxMode;
use crate::{Error, Result};

/// Graph store backed by a Neo4j server's HTTP API.
#[derive(Clone)]
pub struct HttpStore {
    inner: Arc<HttpInner>,
}

struct HttpInner {
    config: StoreConfig,
    client: Client,
}

impl HttpStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        if !(config.uri.starts_with("http://") || config.uri.starts_with("https://")) {
            return Err(Error::Config(format!(
                "store uri must be an http(s) URL, got {:?}",
                config.uri
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { inner: Arc::new(HttpInner { config, client }) })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }
}

impl HttpInner {
    fn endpoint(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.config.uri.trim_end_matches('/'),
            self.config.database
        )
    }

    async fn run(&self, mode: TxMode, query: &str, params: &PropertyMap) -> Result<Vec<Record>> {
        let body = CommitRequest {
            statements: vec![StatementRequest {
                statement: query,
                parameters: params
                    .iter()
                    .map(|(k, v)| (k.clone(), parameter_json(v)))
                    .collect(),
                result_data_contents: &["row"],
            }],
        };

        tracing::debug!(mode = %mode, database = %self.config.database, "neo4j http statement");

        let response = self
            .client
            .post(self.endpoint())
            .basic_auth(&self.config.user, Some(&self.config.password))
            .header("access-mode", mode.access_mode())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::StoreExecution(format!("failed to reach {}: {e}", self.config.uri)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::StoreExecution(format!("Neo4j HTTP error ({status}): {error_text}")));
        }

        let commit: CommitResponse = response
            .json()
            .await
            .map_err(|e| Error::StoreExecution(format!("unreadable Neo4j response: {e}")))?;
        into_records(commit)
    }
}

/// Parameters go out as plain JSON; values without a JSON form are sent as text.
fn parameter_json(value: &Value) -> serde_json::Value {
    normalize::to_json(value).unwrap_or_else(|| serde_json::Value::String(value.to_string()))
}

fn into_records(commit: CommitResponse) -> Result<Vec<Record>> {
    if let Some(first) = commit.errors.first() {
        return Err(Error::StoreExecution(format!("{}: {}", first.code, first.message)));
    }
    let Some(result) = commit.results.into_iter().next() else {
        return Ok(Vec::new());
    };

    let mut records = Vec::with_capacity(result.data.len());
    for data in result.data {
        if data.row.len() != result.columns.len() {
            return Err(Error::StoreExecution(format!(
                "row has {} values for {} columns",
                data.row.len(),
                result.columns.len()
            )));
        }
        records.push(
            result
                .columns
                .iter()
                .cloned()
                .zip(data.row.into_iter().map(Value::from_json))
                .collect(),
        );
    }
    Ok(records)
}

#[async_trait]
impl GraphStore for HttpStore {
    type Session = HttpSession;

    async fn open_session(&self) -> Result<HttpSession> {
        Ok(HttpSession { inner: Arc::clone(&self.inner), open: true })
    }
}

/// Session over an [`HttpStore`]. Holds no server-side state between statements.
pub struct HttpSession {
    inner: Arc<HttpInner>,
    open: bool,
}

impl HttpSession {
    async fn run(&mut self, mode: TxMode, query: &str, params: &PropertyMap) -> Result<Vec<Record>> {
        if !self.open {
            return Err(Error::StoreExecution("session is closed".into()));
        }
        self.inner.run(mode, query, params).await
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn execute_read(&mut self, query: &str) -> Result<Vec<Record>> {
        self.run(TxMode::ReadOnly, query, &PropertyMap::new()).await
    }

    async fn execute_write(&mut self, query: &str, params: PropertyMap) -> Result<Vec<Record>> {
        self.run(TxMode::ReadWrite, query, &params).await
    }

    async fn close(mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    statements: Vec<StatementRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatementRequest<'a> {
    statement: &'a str,
    parameters: serde_json::Map<String, serde_json::Value>,
    result_data_contents: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
struct RowData {
    row: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    code: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store(uri: &str) -> HttpStore {
        HttpStore::new(StoreConfig { uri: uri.into(), ..StoreConfig::default() }).unwrap()
    }

    #[test]
    fn test_endpoint_uses_database() {
        let store = store("http://db.local:7474/");
        assert_eq!(store.inner.endpoint(), "http://db.local:7474/db/neo4j/tx/commit");
    }

    #[test]
    fn test_rejects_bolt_uri() {
        let result = HttpStore::new(StoreConfig { uri: "bolt://localhost:7687".into(), ..StoreConfig::default() });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_request_body_shape() {
        let params = PropertyMap::from([("name".to_string(), Value::from("Corolla"))]);
        let body = CommitRequest {
            statements: vec![StatementRequest {
                statement: "CREATE (n:Name {name: $name})",
                parameters: params.iter().map(|(k, v)| (k.clone(), parameter_json(v))).collect(),
                result_data_contents: &["row"],
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"statements": [{
                "statement": "CREATE (n:Name {name: $name})",
                "parameters": {"name": "Corolla"},
                "resultDataContents": ["row"]
            }]})
        );
    }

    #[test]
    fn test_rows_follow_columns() {
        let commit: CommitResponse = serde_json::from_value(json!({
            "results": [{
                "columns": ["make", "total"],
                "data": [{"row": ["Toyota", 2], "meta": [null, null]}, {"row": ["Honda", 1]}]
            }],
            "errors": []
        }))
        .unwrap();
        let rows = into_records(commit).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].keys(), &["make".to_string(), "total".to_string()]);
        assert_eq!(rows[1].get::<i64>("total").unwrap(), 1);
    }

    #[test]
    fn test_server_error_becomes_store_error() {
        let commit: CommitResponse = serde_json::from_value(json!({
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input"}]
        }))
        .unwrap();
        match into_records(commit) {
            Err(Error::StoreExecution(msg)) => assert!(msg.contains("SyntaxError")),
            other => panic!("expected store error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_session_refuses_statements() {
        let store = store("http://localhost:7474");
        let mut session = store.open_session().await.unwrap();
        session.open = false;
        let result = session.execute_read("MATCH (n) RETURN n").await;
        assert!(matches!(result, Err(Error::StoreExecution(_))));
    }
}
