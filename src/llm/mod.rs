//! # Completion Clients
//!
//! The text-generation capability behind the translator, reached through
//! the `CompletionClient` trait.
//!
//! | Client | Feature | Description |
//! |--------|---------|-------------|
//! | `ScriptedClient` | (default) | Replays canned replies; records requests |
//! | `OpenAiClient` | `http` | OpenAI-compatible `/chat/completions` endpoint |

#[cfg(feature = "http")]
pub mod openai;

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[cfg(feature = "http")]
pub use openai::OpenAiClient;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    /// Number of completions requested. The translator always asks for one.
    pub n: u32,
}

/// Anything that can turn a chat into one completion text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the text of the first completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

#[async_trait]
impl<C: CompletionClient + ?Sized> CompletionClient for std::sync::Arc<C> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        (**self).complete(request).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

// ============================================================================
// ScriptedClient
// ============================================================================

/// Completion client that replays queued replies in order.
///
/// Every request is recorded so callers can inspect what was sent. An
/// exhausted queue is a `Completion` error.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful completion text.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(text.into()));
        self
    }

    /// Queue a `{"cypher": ...}` reply.
    pub fn reply_cypher(self, cypher: &str) -> Self {
        let body = serde_json::json!({ "cypher": cypher }).to_string();
        self.reply(body)
    }

    /// Queue a client failure.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.replies.lock().push_back(Err(Error::Completion(message.into())));
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Completion("no scripted reply left".into())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
