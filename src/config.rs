//! Explicit configuration values.
//!
//! Credentials and endpoints are carried as plain values into the
//! constructors that need them. `Config::from_env` is a convenience for
//! hosts; nothing else in the crate reads the environment.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Everything a `QueryTool` needs to be assembled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

/// Graph store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the Neo4j HTTP endpoint, e.g. `http://localhost:7474`.
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:7474".into(),
            user: "neo4j".into(),
            password: "password".into(),
            database: "neo4j".into(),
            timeout_secs: 30,
        }
    }
}

/// Completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, without the `/chat/completions` suffix.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// Rule enforcement knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper-case the first letter of name/make/place/model filter literals.
    pub capitalize_literals: bool,
    /// Reject queries that break the schema instead of logging them.
    pub strict_schema: bool,
    /// Reject create rows with absent fields instead of sending nulls.
    pub require_complete_rows: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capitalize_literals: true,
            strict_schema: false,
            require_complete_rows: false,
        }
    }
}

impl Config {
    /// Read `NEO4J_*`, `OPENAI_*` and `NLQ_*` variables over the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(v) = lookup("NEO4J_URI") { config.store.uri = v; }
        if let Some(v) = lookup("NEO4J_USER") { config.store.user = v; }
        if let Some(v) = lookup("NEO4J_PASSWORD") { config.store.password = v; }
        if let Some(v) = lookup("NEO4J_DATABASE") { config.store.database = v; }

        if let Some(v) = lookup("OPENAI_BASE_URL") { config.llm.base_url = v; }
        if let Some(v) = lookup("OPENAI_MODEL") { config.llm.model = v; }
        config.llm.api_key = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty());

        if let Some(v) = lookup("NLQ_STRICT_SCHEMA") {
            config.pipeline.strict_schema = parse_flag("NLQ_STRICT_SCHEMA", &v)?;
        }

        Ok(config)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.store.user, "neo4j");
        assert!(config.pipeline.capitalize_literals);
        assert!(!config.pipeline.strict_schema);
    }

    #[test]
    fn test_lookup_overrides() {
        let env: HashMap<&str, &str> = [
            ("NEO4J_URI", "http://graph:7474"),
            ("OPENAI_API_KEY", "sk-test"),
            ("NLQ_STRICT_SCHEMA", "yes"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.store.uri, "http://graph:7474");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert!(config.pipeline.strict_schema);
    }

    #[test]
    fn test_bad_flag_is_config_error() {
        let result = Config::from_lookup(|k| (k == "NLQ_STRICT_SCHEMA").then(|| "maybe".to_string()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"llm": {"model": "gpt-4o"}}"#).unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(config.store.database, "neo4j");
    }
}
