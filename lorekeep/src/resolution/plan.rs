//! The resolver's output: a proposed, not yet applied, set of graph changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{EntityType, Metadata, MetadataValue, Observation, RelationshipType, normalize_name};

/// How an entity was matched to an existing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Alias,
    Fuzzy,
}

/// A node to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCreation {
    pub node_id: Uuid,
    pub node_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub properties: Metadata,
    /// Confidence computed from the new node's observations
    pub confidence: f32,
    /// Entity ids in the source collection that resolved here
    pub entity_ids: Vec<String>,
    pub observations: Vec<Observation>,
}

/// Evidence to append to an existing node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMerge {
    pub node_id: Uuid,
    pub node_type: EntityType,
    pub match_kind: MatchKind,
    /// Similarity of the winning match
    pub score: f32,
    pub entity_ids: Vec<String>,
    /// Surface forms that resolved here
    pub surface_names: Vec<String>,
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub new_aliases: Vec<String>,
    /// Properties the node does not have yet
    #[serde(default)]
    pub property_updates: Metadata,
}

/// An edge to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCreation {
    pub edge_id: Uuid,
    pub source: Uuid,
    pub target: Uuid,
    pub relationship_type: RelationshipType,
    pub confidence: f32,
    #[serde(default)]
    pub properties: Metadata,
    pub relationship_ids: Vec<String>,
    pub observations: Vec<Observation>,
}

/// Evidence to append to an existing edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMerge {
    pub edge_id: Uuid,
    pub relationship_ids: Vec<String>,
    pub observations: Vec<Observation>,
}

/// A contradiction surfaced for review. Existing values are never overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    /// A mention asserts a property value different from the node's.
    Property {
        node_id: Uuid,
        key: String,
        existing: MetadataValue,
        proposed: MetadataValue,
        entity_id: String,
    },
    /// Two specific relationship types link the same pair of nodes.
    RelationshipType {
        source: Uuid,
        target: Uuid,
        existing: RelationshipType,
        proposed: RelationshipType,
    },
}

/// A relationship dropped because an endpoint did not resolve to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedReferenceWarning {
    pub relationship_id: String,
    pub missing_entity_id: String,
}

/// Several nodes matched an entity almost equally well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguousMatchWarning {
    pub entity_id: String,
    pub chosen: Uuid,
    /// Runner-up candidates with their scores
    pub candidates: Vec<(Uuid, f32)>,
}

/// A relationship whose type cannot link its endpoints, kept as `RelatesTo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompatibleRelationshipWarning {
    pub relationship_id: String,
    pub proposed: RelationshipType,
    pub source_type: EntityType,
    pub target_type: EntityType,
}

/// Non-fatal diagnostics attached to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    UnresolvedReference(UnresolvedReferenceWarning),
    AmbiguousMatch(AmbiguousMatchWarning),
    IncompatibleRelationship(IncompatibleRelationshipWarning),
}

/// A low-confidence, unanchored mention that needs a human or agent to confirm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub entity_id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub confidence: f32,
    pub question: String,
}

/// Append-and-merge changes proposed for one entity collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeUpdatePlan {
    pub source_id: String,
    /// Evidence time; also the instant confidences were computed at
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub node_creations: Vec<NodeCreation>,
    #[serde(default)]
    pub node_merges: Vec<NodeMerge>,
    #[serde(default)]
    pub edge_creations: Vec<EdgeCreation>,
    #[serde(default)]
    pub edge_merges: Vec<EdgeMerge>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    #[serde(default)]
    pub warnings: Vec<PlanWarning>,
    #[serde(default)]
    pub clarifications: Vec<ClarificationRequest>,
    /// Node each resolved entity maps to
    #[serde(default)]
    pub entity_targets: BTreeMap<String, Uuid>,
}

impl KnowledgeUpdatePlan {
    pub fn new(source_id: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            source_id: source_id.into(),
            as_of,
            node_creations: Vec::new(),
            node_merges: Vec::new(),
            edge_creations: Vec::new(),
            edge_merges: Vec::new(),
            conflicts: Vec::new(),
            warnings: Vec::new(),
            clarifications: Vec::new(),
            entity_targets: BTreeMap::new(),
        }
    }

    /// Whether applying this plan would change nothing.
    pub fn is_empty(&self) -> bool {
        self.node_creations.is_empty()
            && self.node_merges.is_empty()
            && self.edge_creations.is_empty()
            && self.edge_merges.is_empty()
    }

    pub fn unresolved_references(&self) -> impl Iterator<Item = &UnresolvedReferenceWarning> {
        self.warnings.iter().filter_map(|w| match w {
            PlanWarning::UnresolvedReference(u) => Some(u),
            _ => None,
        })
    }

    pub fn ambiguous_matches(&self) -> impl Iterator<Item = &AmbiguousMatchWarning> {
        self.warnings.iter().filter_map(|w| match w {
            PlanWarning::AmbiguousMatch(a) => Some(a),
            _ => None,
        })
    }

    pub fn incompatible_relationships(&self) -> impl Iterator<Item = &IncompatibleRelationshipWarning> {
        self.warnings.iter().filter_map(|w| match w {
            PlanWarning::IncompatibleRelationship(i) => Some(i),
            _ => None,
        })
    }

    /// Resolution buckets this plan writes to, as `Type:normalized name` keys.
    pub fn bucket_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .node_creations
            .iter()
            .map(|c| bucket_key(c.node_type, &c.name))
            .chain(self.node_merges.iter().flat_map(|m| {
                m.surface_names.iter().map(move |name| bucket_key(m.node_type, name))
            }))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Every lock a commit of this plan must hold: its buckets plus the
    /// nodes and edges it reads back and rewrites.
    ///
    /// Different surface names can resolve to one node, so bucket locks alone
    /// do not serialise two merges into it.
    pub fn lock_keys(&self) -> Vec<String> {
        let nodes = self
            .node_creations
            .iter()
            .map(|c| c.node_id)
            .chain(self.node_merges.iter().map(|m| m.node_id))
            .chain(self.edge_creations.iter().flat_map(|e| [e.source, e.target]))
            .map(node_key);
        let edges = self
            .edge_creations
            .iter()
            .map(|e| e.edge_id)
            .chain(self.edge_merges.iter().map(|m| m.edge_id))
            .map(edge_key);
        let mut keys = self.bucket_keys();
        keys.extend(nodes.chain(edges));
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Key of the resolution bucket an entity of `entity_type` named `name` falls into.
pub fn bucket_key(entity_type: EntityType, name: &str) -> String {
    format!("{}:{}", entity_type.as_str(), normalize_name(name))
}

/// Lock key of a stored node.
pub fn node_key(id: Uuid) -> String {
    format!("node:{id}")
}

fn edge_key(id: Uuid) -> String {
    format!("edge:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_plan() {
        let plan = KnowledgeUpdatePlan::new("s", Utc::now());
        assert!(plan.is_empty());
        assert!(plan.bucket_keys().is_empty());
    }

    #[test]
    fn test_bucket_keys_sorted_and_unique() {
        let mut plan = KnowledgeUpdatePlan::new("s", Utc::now());
        plan.node_merges.push(NodeMerge {
            node_id: Uuid::new_v4(),
            node_type: EntityType::Person,
            match_kind: MatchKind::Alias,
            score: 1.0,
            entity_ids: vec!["e1".into(), "e3".into()],
            surface_names: vec!["Omar".into(), "omar".into()],
            observations: Vec::new(),
            new_aliases: Vec::new(),
            property_updates: Metadata::new(),
        });
        assert_eq!(plan.bucket_keys(), vec!["Person:omar".to_string()]);
    }

    #[test]
    fn test_lock_keys_cover_merged_node() {
        let node_id = Uuid::new_v4();
        let mut plan = KnowledgeUpdatePlan::new("s", Utc::now());
        plan.node_merges.push(NodeMerge {
            node_id,
            node_type: EntityType::Person,
            match_kind: MatchKind::Alias,
            score: 1.0,
            entity_ids: vec!["e1".into()],
            surface_names: vec!["Omar".into()],
            observations: Vec::new(),
            new_aliases: Vec::new(),
            property_updates: Metadata::new(),
        });

        let keys = plan.lock_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"Person:omar".to_string()));
        assert!(keys.contains(&node_key(node_id)));
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }
}
