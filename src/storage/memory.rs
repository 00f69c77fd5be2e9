//! In-memory graph store.
//!
//! An in-process property graph that runs the Cypher subset the pipeline
//! produces: `MATCH` / `OPTIONAL MATCH` chains with inline property maps,
//! `WHERE` predicates, `RETURN` with `DISTINCT`, aliases and aggregates,
//! `ORDER BY`, `SKIP`, `LIMIT`, and `CREATE` patterns with parameters.
//!
//! ## Limitations
//!
//! - **Single lock**: the whole graph sits behind one `RwLock`. A `CREATE`
//!   statement is staged first and applied under the write lock, so it is
//!   all-or-nothing, but there is no MVCC.
//! - **No indexes** beyond a label → node list. Property lookups scan.
//!
//! Use this store for:
//! - Running the pipeline without a Neo4j server
//! - Tests that need to count sessions and inspect what was written

mod eval;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::cypher::{self, ast::Statement};
use crate::model::*;
use crate::tx::TxMode;
use crate::{Error, Result};
use super::{GraphStore, Session};

// ============================================================================
// Graph
// ============================================================================

/// The stored graph. Ordered maps keep scan order equal to creation order.
#[derive(Debug, Default)]
pub(crate) struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    relationships: BTreeMap<RelId, Relationship>,
    /// node_id → list of relationship IDs
    adjacency: HashMap<NodeId, Vec<RelId>>,
    /// label → node IDs (poor man's label index)
    label_index: HashMap<String, Vec<NodeId>>,
    next_node_id: u64,
    next_rel_id: u64,
}

impl Graph {
    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Nodes carrying `label`, or every node when `label` is `None`.
    fn scan(&self, label: Option<&str>) -> Vec<&Node> {
        match label {
            Some(label) => self
                .label_index
                .get(label)
                .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
                .unwrap_or_default(),
            None => self.nodes.values().collect(),
        }
    }

    /// Relationships touching `id` that can be walked in `dir`.
    fn edges(&self, id: NodeId, dir: Direction) -> impl Iterator<Item = &Relationship> {
        self.adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.relationships.get(rid))
            .filter(move |rel| rel.leaves(id, dir))
    }

    fn insert_node(&mut self, node: Node) {
        for label in &node.labels {
            self.label_index.entry(label.clone()).or_default().push(node.id);
        }
        self.adjacency.entry(node.id).or_default();
        self.nodes.insert(node.id, node);
    }

    fn insert_relationship(&mut self, rel: Relationship) {
        self.adjacency.entry(rel.src).or_default().push(rel.id);
        if rel.dst != rel.src {
            self.adjacency.entry(rel.dst).or_default().push(rel.id);
        }
        self.relationships.insert(rel.id, rel);
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory property graph store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    graph: RwLock<Graph>,
    open_sessions: AtomicUsize,
    sessions_opened: AtomicU64,
    statements_run: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a statement outside any session, e.g. to seed a test graph.
    pub fn seed(&self, query: &str, params: PropertyMap) -> Result<Vec<Record>> {
        self.inner.run(TxMode::ReadWrite, query, &params)
    }

    pub fn node_count(&self) -> usize {
        self.inner.graph.read().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.inner.graph.read().relationships.len()
    }

    /// Nodes with `label`, in creation order.
    pub fn nodes_with_label(&self, label: &str) -> Vec<Node> {
        self.inner.graph.read().scan(Some(label)).into_iter().cloned().collect()
    }

    /// Every relationship as `(source labels, type, target labels)`.
    pub fn relationship_summary(&self) -> Vec<(Vec<String>, String, Vec<String>)> {
        let graph = self.inner.graph.read();
        graph
            .relationships
            .values()
            .map(|rel| {
                let labels = |id| graph.node(id).map(|n| n.labels.clone()).unwrap_or_default();
                (labels(rel.src), rel.rel_type.clone(), labels(rel.dst))
            })
            .collect()
    }

    /// Sessions opened and not yet closed or dropped.
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions opened over the store's lifetime.
    pub fn sessions_opened(&self) -> u64 {
        self.inner.sessions_opened.load(Ordering::SeqCst)
    }

    /// Statements run through sessions over the store's lifetime.
    pub fn statements_run(&self) -> u64 {
        self.inner.statements_run.load(Ordering::SeqCst)
    }
}

impl MemoryInner {
    fn run(&self, mode: TxMode, query: &str, params: &PropertyMap) -> Result<Vec<Record>> {
        let statement = cypher::parse(query)?;
        match statement {
            Statement::Query(q) => {
                let graph = self.graph.read();
                eval::run_query(&graph, &q, params)
            }
            Statement::Create(create) => {
                if !mode.allows_writes() {
                    return Err(Error::StoreExecution(
                        "Writing in read access mode not allowed".into(),
                    ));
                }
                let mut graph = self.graph.write();
                eval::run_create(&mut graph, &create, params)
            }
        }
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    type Session = MemorySession;

    async fn open_session(&self) -> Result<MemorySession> {
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession { inner: Arc::clone(&self.inner), open: true })
    }
}

// ============================================================================
// MemorySession
// ============================================================================

/// Session over a [`MemoryStore`]. Dropping it counts as closing it.
pub struct MemorySession {
    inner: Arc<MemoryInner>,
    open: bool,
}

impl MemorySession {
    fn run(&mut self, mode: TxMode, query: &str, params: &PropertyMap) -> Result<Vec<Record>> {
        if !self.open {
            return Err(Error::StoreExecution("session is closed".into()));
        }
        self.inner.statements_run.fetch_add(1, Ordering::SeqCst);
        let rows = self.inner.run(mode, query, params)?;
        tracing::debug!(mode = %mode, rows = rows.len(), "memory store statement finished");
        Ok(rows)
    }

    fn release(&mut self) {
        if std::mem::replace(&mut self.open, false) {
            self.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn execute_read(&mut self, query: &str) -> Result<Vec<Record>> {
        self.run(TxMode::ReadOnly, query, &PropertyMap::new())
    }

    async fn execute_write(&mut self, query: &str, params: PropertyMap) -> Result<Vec<Record>> {
        self.run(TxMode::ReadWrite, query, &params)
    }

    async fn close(mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.release();
    }
}
