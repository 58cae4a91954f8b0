//! Trait definitions for the knowledge-graph store

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

use crate::models::{EntityType, KnowledgeNode, KnowledgeRelation};
use crate::storage::errors::StorageResult;

/// Counts reported by a successful commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub nodes_written: usize,
    pub edges_written: usize,
}

/// Node and edge totals of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
}

/// Read access to the knowledge graph.
///
/// Resolution and validation only need this view, so they can run against a
/// snapshot or a read replica.
#[async_trait]
pub trait GraphView: Send + Sync + Debug {
    /// Get a node by its ID
    async fn get_node(&self, id: &Uuid) -> StorageResult<Option<KnowledgeNode>>;

    /// Nodes of one type, optionally filtered by a case-insensitive substring of
    /// their name or aliases. Results are ordered by id.
    async fn find_nodes(
        &self,
        node_type: EntityType,
        name_pattern: Option<&str>,
    ) -> StorageResult<Vec<KnowledgeNode>>;

    /// Get an edge by its ID
    async fn get_edge(&self, id: &Uuid) -> StorageResult<Option<KnowledgeRelation>>;

    /// Edges running from `source` to `target`, ordered by id.
    async fn edges_between(&self, source: &Uuid, target: &Uuid) -> StorageResult<Vec<KnowledgeRelation>>;
}

/// Write access to the knowledge graph.
#[async_trait]
pub trait GraphStore: GraphView {
    /// Insert or replace a node, returning its id
    async fn upsert_node(&self, node: KnowledgeNode) -> StorageResult<Uuid>;

    /// Insert or replace an edge; both endpoints must already exist
    async fn upsert_edge(&self, edge: KnowledgeRelation) -> StorageResult<Uuid>;

    /// Write nodes then edges as one unit: either everything is stored or nothing is.
    async fn commit(
        &self,
        nodes: Vec<KnowledgeNode>,
        edges: Vec<KnowledgeRelation>,
    ) -> StorageResult<CommitSummary>;

    /// Node and edge totals
    async fn stats(&self) -> StorageResult<GraphStats>;
}
