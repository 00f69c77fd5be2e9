//! # Graph Store Trait
//!
//! The contract between the query executor and whatever holds the graph.
//! A store hands out sessions; a session runs statements in read or write
//! transactions and is closed once the caller is done with it.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-process property graph for tests and embedding |
//! | `HttpStore` | `http` | Neo4j transactional HTTP endpoint (feature `http`) |

pub mod memory;
#[cfg(feature = "http")]
pub mod http;

use async_trait::async_trait;

use crate::model::{PropertyMap, Record};
use crate::Result;

pub use memory::MemoryStore;
#[cfg(feature = "http")]
pub use http::HttpStore;

/// Something that can open sessions against a graph.
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    /// The session type for this store.
    type Session: Session;

    /// Open a new session. Sessions are short-lived: one per invocation.
    async fn open_session(&self) -> Result<Self::Session>;

    /// Release everything the store holds.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// One scoped unit of work against a store.
#[async_trait]
pub trait Session: Send + Sized + 'static {
    /// Run `query` in a read transaction and materialize every row.
    async fn execute_read(&mut self, query: &str) -> Result<Vec<Record>>;

    /// Run `query` with `params` in a write transaction and materialize every row.
    async fn execute_write(&mut self, query: &str, params: PropertyMap) -> Result<Vec<Record>>;

    /// Release the session.
    async fn close(self) -> Result<()>;
}
