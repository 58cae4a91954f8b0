//! In-memory graph store for tests, demos and small deployments

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{EntityType, KnowledgeNode, KnowledgeRelation};
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::traits::{CommitSummary, GraphStats, GraphStore, GraphView};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct GraphState {
    nodes: BTreeMap<Uuid, KnowledgeNode>,
    edges: BTreeMap<Uuid, KnowledgeRelation>,
}

/// Graph store keeping every node and edge in memory behind one lock.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the whole graph to JSON.
    pub async fn to_json(&self) -> StorageResult<String> {
        let state = self.state.read().await;
        Ok(serde_json::to_string(&*state)?)
    }

    /// Restore a graph previously written by [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> StorageResult<Self> {
        let state: GraphState = serde_json::from_str(json)?;
        for edge in state.edges.values() {
            check_endpoints(edge, |id| state.nodes.contains_key(id))?;
        }
        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

fn check_endpoints(edge: &KnowledgeRelation, exists: impl Fn(&Uuid) -> bool) -> StorageResult<()> {
    for endpoint in [&edge.source, &edge.target] {
        if !exists(endpoint) {
            return Err(StorageError::Integrity(format!(
                "edge {} references missing node {}",
                edge.id, endpoint
            )));
        }
    }
    Ok(())
}

fn matches_pattern(node: &KnowledgeNode, pattern: &str) -> bool {
    let pattern = pattern.to_lowercase();
    node.known_names()
        .any(|name| name.to_lowercase().contains(&pattern))
}

#[async_trait]
impl GraphView for InMemoryGraphStore {
    async fn get_node(&self, id: &Uuid) -> StorageResult<Option<KnowledgeNode>> {
        Ok(self.state.read().await.nodes.get(id).cloned())
    }

    async fn find_nodes(
        &self,
        node_type: EntityType,
        name_pattern: Option<&str>,
    ) -> StorageResult<Vec<KnowledgeNode>> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .values()
            .filter(|n| n.node_type == node_type)
            .filter(|n| name_pattern.is_none_or(|p| matches_pattern(n, p)))
            .cloned()
            .collect())
    }

    async fn get_edge(&self, id: &Uuid) -> StorageResult<Option<KnowledgeRelation>> {
        Ok(self.state.read().await.edges.get(id).cloned())
    }

    async fn edges_between(&self, source: &Uuid, target: &Uuid) -> StorageResult<Vec<KnowledgeRelation>> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .values()
            .filter(|e| e.source == *source && e.target == *target)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_node(&self, node: KnowledgeNode) -> StorageResult<Uuid> {
        let id = node.id;
        self.state.write().await.nodes.insert(id, node);
        Ok(id)
    }

    async fn upsert_edge(&self, edge: KnowledgeRelation) -> StorageResult<Uuid> {
        let mut state = self.state.write().await;
        check_endpoints(&edge, |id| state.nodes.contains_key(id))?;
        let id = edge.id;
        state.edges.insert(id, edge);
        Ok(id)
    }

    async fn commit(
        &self,
        nodes: Vec<KnowledgeNode>,
        edges: Vec<KnowledgeRelation>,
    ) -> StorageResult<CommitSummary> {
        let mut state = self.state.write().await;

        // Check everything before touching the maps.
        for edge in &edges {
            check_endpoints(edge, |id| {
                state.nodes.contains_key(id) || nodes.iter().any(|n| n.id == *id)
            })?;
        }

        let summary = CommitSummary {
            nodes_written: nodes.len(),
            edges_written: edges.len(),
        };
        for node in nodes {
            state.nodes.insert(node.id, node);
        }
        for edge in edges {
            state.edges.insert(edge.id, edge);
        }

        tracing::debug!(
            nodes = summary.nodes_written,
            edges = summary.edges_written,
            "Committed graph changes"
        );
        Ok(summary)
    }

    async fn stats(&self) -> StorageResult<GraphStats> {
        let state = self.state.read().await;
        Ok(GraphStats {
            node_count: state.nodes.len(),
            edge_count: state.edges.len(),
        })
    }
}
