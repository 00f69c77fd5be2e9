//! # Translator
//!
//! Turns a natural-language question into a Cypher candidate by asking the
//! completion client once, at temperature 0, with the compiled schema
//! instructions as the system message.

use serde_json::Value as JsonValue;

use crate::llm::{CompletionClient, CompletionRequest, Message};
use crate::prompt;
use crate::{Error, Result};

/// What the generator proposed for a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryCandidate {
    /// A non-empty query text, not yet enforced.
    Cypher(String),
    /// The generator replied with the empty-query sentinel.
    Unanswerable,
}

pub struct Translator<C> {
    client: C,
    instructions: String,
    temperature: f32,
}

impl<C: CompletionClient> Translator<C> {
    /// Translator using the built-in schema instructions.
    pub fn new(client: C) -> Self {
        Self::with_instructions(client, prompt::system_prompt())
    }

    pub fn with_instructions(client: C, instructions: impl Into<String>) -> Self {
        Self { client, instructions: instructions.into(), temperature: 0.0 }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Ask for one completion and parse it into a candidate.
    pub async fn translate(&self, question: &str) -> Result<QueryCandidate> {
        let request = CompletionRequest {
            messages: vec![Message::system(&self.instructions), Message::user(question)],
            temperature: self.temperature,
            n: 1,
        };

        let reply = self.client.complete(&request).await?;
        tracing::debug!(model = self.client.model_name(), reply = %reply, "completion received");

        let cypher = parse_reply(&reply)?;
        if cypher.is_empty() {
            tracing::info!(question, "generator reported the question as unanswerable");
            Ok(QueryCandidate::Unanswerable)
        } else {
            tracing::info!(cypher = %cypher, "generated query");
            Ok(QueryCandidate::Cypher(cypher))
        }
    }
}

/// Extract the `cypher` string from a `{"cypher": "..."}` reply.
pub fn parse_reply(reply: &str) -> Result<String> {
    let parsed: JsonValue = serde_json::from_str(reply.trim()).map_err(|e| {
        Error::TranslationFormat(format!("not valid JSON: {e}"))
    })?;

    let JsonValue::Object(map) = parsed else {
        return Err(Error::TranslationFormat(
            "JSON but not an object".into(),
        ));
    };

    let extra: Vec<&str> = map.keys().map(String::as_str).filter(|k| *k != "cypher").collect();
    if !extra.is_empty() {
        tracing::warn!(keys = ?extra, "ignoring unexpected keys in completion");
    }

    match map.get("cypher") {
        Some(JsonValue::String(cypher)) => Ok(cypher.trim().to_string()),
        Some(other) => Err(Error::TranslationFormat(format!(
            "\"cypher\" must be a string, got {other}"
        ))),
        None => Err(Error::TranslationFormat(
            "no \"cypher\" key".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Role, ScriptedClient};

    #[test]
    fn test_parse_reply_accepts_contract() {
        assert_eq!(parse_reply(r#"  {"cypher": "MATCH (n:Name) RETURN n.name"}  "#).unwrap(), "MATCH (n:Name) RETURN n.name");
        assert_eq!(parse_reply(r#"{ "cypher": "" }"#).unwrap(), "");
        assert_eq!(parse_reply(r#"{"cypher": "  "}"#).unwrap(), "");
    }

    #[test]
    fn test_parse_reply_ignores_extra_keys() {
        let cypher = parse_reply(r#"{"cypher": "MATCH (p:Place) RETURN p.name", "note": "x"}"#).unwrap();
        assert_eq!(cypher, "MATCH (p:Place) RETURN p.name");
    }

    #[test]
    fn test_parse_reply_rejects_other_shapes() {
        for reply in [
            "MATCH (n:Name) RETURN n.name",
            "```json\n{\"cypher\": \"\"}\n```",
            r#"{"query": "MATCH (n) RETURN n"}"#,
            r#"{"cypher": null}"#,
            r#"["cypher"]"#,
        ] {
            assert!(
                matches!(parse_reply(reply), Err(Error::TranslationFormat(_))),
                "accepted {reply}"
            );
        }
    }

    #[test]
    fn test_format_errors_name_the_contract_once() {
        let message = parse_reply("not json").unwrap_err().to_string();
        assert!(message.starts_with("completion is not a {\"cypher\": ...} object: not valid JSON"), "{message}");
        assert_eq!(message.matches("completion").count(), 1, "{message}");

        let message = parse_reply(r#"{"query": ""}"#).unwrap_err().to_string();
        assert_eq!(message, "completion is not a {\"cypher\": ...} object: no \"cypher\" key");
    }

    #[tokio::test]
    async fn test_translate_sends_one_deterministic_request() {
        let client = ScriptedClient::new().reply_cypher("MATCH (y:Year) RETURN y.value");
        let translator = Translator::new(client);

        let candidate = translator.translate("Which years are listed?").await.unwrap();
        assert_eq!(candidate, QueryCandidate::Cypher("MATCH (y:Year) RETURN y.value".into()));

        let requests = translator.client().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].n, 1);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[0].content, prompt::system_prompt());
        assert_eq!(requests[0].messages[1].content, "Which years are listed?");
    }

    #[tokio::test]
    async fn test_translate_empty_is_unanswerable() {
        let translator = Translator::new(ScriptedClient::new().reply(prompt::UNANSWERABLE_REPLY));
        let candidate = translator.translate("What is the car's color?").await.unwrap();
        assert_eq!(candidate, QueryCandidate::Unanswerable);
    }

    #[tokio::test]
    async fn test_translate_propagates_client_failure() {
        let translator = Translator::new(ScriptedClient::new().fail("timeout"));
        let result = translator.translate("How many cars?").await;
        assert!(matches!(result, Err(Error::Completion(_))));
    }
}
