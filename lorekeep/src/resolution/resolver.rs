//! Reconciles an entity collection against the knowledge graph.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::plan::{
    AmbiguousMatchWarning, ClarificationRequest, Conflict, EdgeCreation, EdgeMerge,
    IncompatibleRelationshipWarning, KnowledgeUpdatePlan, MatchKind, NodeCreation, NodeMerge, PlanWarning,
    UnresolvedReferenceWarning,
};
use super::similarity::{NameEmbedder, SimilarityMetric, cosine_similarity, edit_similarity};
use crate::Result;
use crate::confidence::{NodeConfidenceParams, node_confidence};
use crate::config::ResolutionConfig;
use crate::models::{
    EXTRACTORS_KEY, Entity, EntityCollection, EntityType, KnowledgeNode, KnowledgeRelation, Metadata,
    Observation, ObservationLog, Relationship, RelationshipType, normalize_name,
};
use crate::storage::GraphView;

/// Secondary ordering among equally similar candidate nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    HighestConfidence,
    MostRecent,
    MostObserved,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Create(usize),
    Merge(usize),
}

struct Candidate<'a> {
    node: &'a KnowledgeNode,
    score: f32,
}

struct MatchOutcome {
    node_id: uuid::Uuid,
    kind: MatchKind,
    score: f32,
    runners_up: Vec<(uuid::Uuid, f32)>,
}

/// Per-call working state.
struct Session<'c> {
    collection: &'c EntityCollection,
    plan: KnowledgeUpdatePlan,
    targets: HashMap<(EntityType, String), Target>,
    nodes_by_type: HashMap<EntityType, Vec<KnowledgeNode>>,
    merged_nodes: HashMap<uuid::Uuid, KnowledgeNode>,
    embeddings: HashMap<String, Option<Vec<f32>>>,
}

/// Maps each extracted entity onto an existing or new graph node.
///
/// Resolution of one collection against one graph state is deterministic:
/// ids derive from names, timestamps from the collection, and candidate
/// ranking has a total order.
#[derive(Debug, Clone)]
pub struct EntityResolver {
    config: ResolutionConfig,
    node_params: NodeConfidenceParams,
    embedder: Option<Arc<dyn NameEmbedder>>,
}

impl EntityResolver {
    pub fn new(config: ResolutionConfig, node_params: NodeConfidenceParams) -> Self {
        Self {
            config,
            node_params,
            embedder: None,
        }
    }

    /// Supply embeddings for the `embedding` and `max` similarity metrics.
    pub fn with_embedder(mut self, embedder: Arc<dyn NameEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Produce an update plan for `collection` against the graph behind `view`.
    pub async fn resolve(&self, collection: &EntityCollection, view: &dyn GraphView) -> Result<KnowledgeUpdatePlan> {
        if self.config.similarity_metric != SimilarityMetric::EditDistance && self.embedder.is_none() {
            tracing::warn!(
                metric = ?self.config.similarity_metric,
                "No name embedder configured; falling back to edit distance"
            );
        }

        let mut session = Session {
            collection,
            plan: KnowledgeUpdatePlan::new(&collection.source_id, collection.extracted_at),
            targets: HashMap::new(),
            nodes_by_type: HashMap::new(),
            merged_nodes: HashMap::new(),
            embeddings: HashMap::new(),
        };

        let unanchored = self.unanchored_low_confidence(collection);
        for entity in collection.entities() {
            if unanchored.contains(entity.id.as_str()) {
                session.plan.clarifications.push(ClarificationRequest {
                    entity_id: entity.id.clone(),
                    name: entity.name.clone(),
                    entity_type: entity.entity_type,
                    confidence: entity.confidence,
                    question: format!(
                        "Is \"{}\" a {} worth remembering? It was mentioned with low confidence ({:.2}).",
                        entity.name, entity.entity_type, entity.confidence
                    ),
                });
                continue;
            }
            self.resolve_entity(&mut session, entity, view).await?;
        }

        for relationship in collection.relationships() {
            self.resolve_relationship(&mut session, relationship, view).await?;
        }

        let mut plan = session.plan;
        self.finalize_confidences(&mut plan);

        tracing::info!(
            source_id = %plan.source_id,
            creations = plan.node_creations.len(),
            merges = plan.node_merges.len(),
            edge_creations = plan.edge_creations.len(),
            edge_merges = plan.edge_merges.len(),
            conflicts = plan.conflicts.len(),
            warnings = plan.warnings.len(),
            clarifications = plan.clarifications.len(),
            "Resolved entity collection"
        );
        Ok(plan)
    }

    /// Low-confidence entities not linked to any confident entity.
    fn unanchored_low_confidence<'c>(&self, collection: &'c EntityCollection) -> HashSet<&'c str> {
        let floor = self.config.clarification_floor;
        let low: HashSet<&str> = collection
            .entities()
            .iter()
            .filter(|e| e.confidence < floor)
            .map(|e| e.id.as_str())
            .collect();
        low.iter()
            .copied()
            .filter(|id| {
                !collection.relationships_for(id).any(|r| {
                    let other = if r.source == *id { &r.target } else { &r.source };
                    !low.contains(other.as_str())
                })
            })
            .collect()
    }

    async fn resolve_entity(&self, session: &mut Session<'_>, entity: &Entity, view: &dyn GraphView) -> Result<()> {
        let normalized = normalize_name(&entity.name);
        if normalized.is_empty() {
            tracing::debug!(entity_id = %entity.id, "Skipping entity with empty name");
            return Ok(());
        }
        let key = (entity.entity_type, normalized.clone());

        let target = match session.targets.get(&key) {
            Some(target) => *target,
            None => {
                let target = self.match_or_create(session, entity, &normalized, view).await?;
                session.targets.insert(key, target);
                target
            }
        };

        let observation = Observation::from_entity(session.collection, entity, self.config.context_window);
        match target {
            Target::Create(idx) => {
                let creation = &mut session.plan.node_creations[idx];
                creation.entity_ids.push(entity.id.clone());
                creation.observations.push(observation);
                for (key, value) in entity.asserted_properties() {
                    match creation.properties.get(&key) {
                        None => {
                            creation.properties.insert(key, value);
                        }
                        Some(existing) if !existing.agrees_with(&value) => {
                            let conflict = Conflict::Property {
                                node_id: creation.node_id,
                                key,
                                existing: existing.clone(),
                                proposed: value,
                                entity_id: entity.id.clone(),
                            };
                            push_unique(&mut session.plan.conflicts, conflict);
                        }
                        Some(_) => {}
                    }
                }
                session.plan.entity_targets.insert(entity.id.clone(), creation.node_id);
            }
            Target::Merge(idx) => {
                let merge = &mut session.plan.node_merges[idx];
                let node = session
                    .merged_nodes
                    .get(&merge.node_id)
                    .ok_or_else(|| crate::LorekeepError::Resolution(format!("merge target {} not loaded", merge.node_id)))?;
                merge.entity_ids.push(entity.id.clone());
                if !merge.surface_names.iter().any(|n| normalize_name(n) == normalized) {
                    merge.surface_names.push(entity.name.clone());
                }
                merge.observations.push(observation);

                let already_known = node.has_name(&normalized)
                    || node.has_alias(&normalized)
                    || merge.new_aliases.iter().any(|a| normalize_name(a) == normalized);
                if !already_known {
                    merge.new_aliases.push(entity.name.clone());
                }

                for (key, value) in entity.asserted_properties() {
                    let existing = node.properties.get(&key).or_else(|| merge.property_updates.get(&key));
                    match existing {
                        None => {
                            merge.property_updates.insert(key, value);
                        }
                        Some(existing) if !existing.agrees_with(&value) => {
                            let conflict = Conflict::Property {
                                node_id: merge.node_id,
                                key,
                                existing: existing.clone(),
                                proposed: value,
                                entity_id: entity.id.clone(),
                            };
                            push_unique(&mut session.plan.conflicts, conflict);
                        }
                        Some(_) => {}
                    }
                }
                session.plan.entity_targets.insert(entity.id.clone(), merge.node_id);
            }
        }
        Ok(())
    }

    async fn match_or_create(
        &self,
        session: &mut Session<'_>,
        entity: &Entity,
        normalized: &str,
        view: &dyn GraphView,
    ) -> Result<Target> {
        if !session.nodes_by_type.contains_key(&entity.entity_type) {
            let nodes = view.find_nodes(entity.entity_type, None).await?;
            session.nodes_by_type.insert(entity.entity_type, nodes);
        }

        if let Some(outcome) = self.best_match(session, entity, normalized).await {
            tracing::debug!(
                entity = %entity.name,
                node_id = %outcome.node_id,
                kind = ?outcome.kind,
                score = outcome.score,
                "Matched entity to existing node"
            );
            if !outcome.runners_up.is_empty() {
                session.plan.warnings.push(PlanWarning::AmbiguousMatch(AmbiguousMatchWarning {
                    entity_id: entity.id.clone(),
                    chosen: outcome.node_id,
                    candidates: outcome.runners_up.clone(),
                }));
            }

            if let Some(idx) = session
                .plan
                .node_merges
                .iter()
                .position(|m| m.node_id == outcome.node_id)
            {
                return Ok(Target::Merge(idx));
            }

            let node = session
                .nodes_by_type
                .get(&entity.entity_type)
                .and_then(|nodes| nodes.iter().find(|n| n.id == outcome.node_id))
                .cloned()
                .ok_or_else(|| crate::LorekeepError::Resolution(format!("node {} vanished", outcome.node_id)))?;
            session.plan.node_merges.push(NodeMerge {
                node_id: node.id,
                node_type: node.node_type,
                match_kind: outcome.kind,
                score: outcome.score,
                entity_ids: Vec::new(),
                surface_names: Vec::new(),
                observations: Vec::new(),
                new_aliases: Vec::new(),
                property_updates: Metadata::new(),
            });
            session.merged_nodes.insert(node.id, node);
            return Ok(Target::Merge(session.plan.node_merges.len() - 1));
        }

        let node_id = KnowledgeNode::deterministic_id(entity.entity_type, &entity.name);
        tracing::debug!(entity = %entity.name, node_id = %node_id, "Proposing new node");
        session.plan.node_creations.push(NodeCreation {
            node_id,
            node_type: entity.entity_type,
            name: entity.name.trim().to_string(),
            aliases: Vec::new(),
            properties: Metadata::new(),
            confidence: 0.0,
            entity_ids: Vec::new(),
            observations: Vec::new(),
        });
        Ok(Target::Create(session.plan.node_creations.len() - 1))
    }

    /// Exact name, then alias, then fuzzy similarity above the threshold.
    async fn best_match(&self, session: &mut Session<'_>, entity: &Entity, normalized: &str) -> Option<MatchOutcome> {
        let nodes = session.nodes_by_type.get(&entity.entity_type)?.clone();

        let exact: Vec<Candidate> = nodes
            .iter()
            .filter(|n| n.has_name(normalized))
            .map(|node| Candidate { node, score: 1.0 })
            .collect();
        if let Some(outcome) = self.pick(exact, MatchKind::Exact) {
            return Some(outcome);
        }

        let alias: Vec<Candidate> = nodes
            .iter()
            .filter(|n| n.has_alias(normalized))
            .map(|node| Candidate { node, score: 1.0 })
            .collect();
        if let Some(outcome) = self.pick(alias, MatchKind::Alias) {
            return Some(outcome);
        }

        let mut fuzzy = Vec::new();
        for node in &nodes {
            let score = self.node_similarity(session, normalized, node).await;
            if score >= self.config.fuzzy_threshold {
                fuzzy.push(Candidate { node, score });
            }
        }
        self.pick(fuzzy, MatchKind::Fuzzy)
    }

    fn pick(&self, mut candidates: Vec<Candidate<'_>>, kind: MatchKind) -> Option<MatchOutcome> {
        candidates.sort_by(|a, b| self.rank(a, b));
        let winner = candidates.first()?;
        let runners_up = candidates[1..]
            .iter()
            .filter(|c| winner.score - c.score <= self.config.ambiguity_margin)
            .map(|c| (c.node.id, c.score))
            .collect();
        Some(MatchOutcome {
            node_id: winner.node.id,
            kind,
            score: winner.score,
            runners_up,
        })
    }

    fn rank(&self, a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
        let mut ordering = b.score.total_cmp(&a.score);
        for tie_break in &self.config.tie_break {
            ordering = ordering.then_with(|| match tie_break {
                TieBreak::HighestConfidence => b.node.confidence.total_cmp(&a.node.confidence),
                TieBreak::MostRecent => b.node.updated_at.cmp(&a.node.updated_at),
                TieBreak::MostObserved => b
                    .node
                    .observations
                    .total_count()
                    .cmp(&a.node.observations.total_count()),
            });
        }
        ordering.then_with(|| a.node.id.cmp(&b.node.id))
    }

    async fn node_similarity(&self, session: &mut Session<'_>, normalized: &str, node: &KnowledgeNode) -> f32 {
        let edit = || {
            node.known_names()
                .map(|name| edit_similarity(normalized, &normalize_name(name)))
                .fold(0.0f32, f32::max)
        };
        let Some(embedder) = &self.embedder else {
            return edit();
        };

        let semantic = match self.config.similarity_metric {
            SimilarityMetric::EditDistance => return edit(),
            SimilarityMetric::Embedding | SimilarityMetric::Max => {
                let query = embed_cached(session, embedder.as_ref(), normalized).await;
                let mut best = None;
                if let Some(query) = &query {
                    let stored = node.embedding.clone();
                    let mut vectors = Vec::new();
                    match stored {
                        Some(v) => vectors.push(Some(v)),
                        None => vectors.push(embed_cached(session, embedder.as_ref(), &normalize_name(&node.name)).await),
                    }
                    for alias in &node.aliases {
                        vectors.push(embed_cached(session, embedder.as_ref(), &normalize_name(alias)).await);
                    }
                    best = vectors
                        .iter()
                        .flatten()
                        .map(|v| cosine_similarity(query, v))
                        .reduce(f32::max);
                }
                best
            }
        };

        match (self.config.similarity_metric, semantic) {
            (SimilarityMetric::Max, Some(score)) => score.max(edit()),
            (SimilarityMetric::Embedding, Some(score)) => score,
            _ => edit(),
        }
    }

    async fn resolve_relationship(
        &self,
        session: &mut Session<'_>,
        relationship: &Relationship,
        view: &dyn GraphView,
    ) -> Result<()> {
        let plan = &mut session.plan;
        let source = plan.entity_targets.get(&relationship.source).copied();
        let target = plan.entity_targets.get(&relationship.target).copied();
        let (source, target) = match (source, target) {
            (Some(s), Some(t)) => (s, t),
            (None, _) | (_, None) => {
                let missing = if source.is_none() {
                    &relationship.source
                } else {
                    &relationship.target
                };
                tracing::debug!(
                    relationship_id = %relationship.id,
                    missing = %missing,
                    "Dropping relationship with unresolved endpoint"
                );
                plan.warnings.push(PlanWarning::UnresolvedReference(UnresolvedReferenceWarning {
                    relationship_id: relationship.id.clone(),
                    missing_entity_id: missing.clone(),
                }));
                return Ok(());
            }
        };

        let mut kind = &relationship.relationship_type;
        let generic = RelationshipType::RelatesTo;
        if let (Some(source_type), Some(target_type)) = (
            endpoint_type(plan, source, view).await?,
            endpoint_type(plan, target, view).await?,
        ) && !kind.accepts(source_type, target_type)
        {
            tracing::debug!(
                relationship_id = %relationship.id,
                proposed = %kind,
                %source_type,
                %target_type,
                "Relationship type cannot link its endpoints; keeping it as relatesTo"
            );
            plan.warnings.push(PlanWarning::IncompatibleRelationship(IncompatibleRelationshipWarning {
                relationship_id: relationship.id.clone(),
                proposed: kind.clone(),
                source_type,
                target_type,
            }));
            kind = &generic;
        }

        if source == target && !kind.allows_reflexive() {
            tracing::debug!(relationship_id = %relationship.id, "Dropping relationship collapsed onto one node");
            return Ok(());
        }

        for other in &relationship.conflicts_with {
            if other < kind {
                push_unique(
                    &mut plan.conflicts,
                    Conflict::RelationshipType {
                        source,
                        target,
                        existing: other.clone(),
                        proposed: kind.clone(),
                    },
                );
            }
        }

        let edge_id = KnowledgeRelation::deterministic_id(source, kind, target);
        let observation = Observation::from_relationship(session.collection, relationship, self.config.context_window);

        if let Some(creation) = plan.edge_creations.iter_mut().find(|c| c.edge_id == edge_id) {
            creation.relationship_ids.push(relationship.id.clone());
            creation.observations.push(observation);
            return Ok(());
        }
        if let Some(merge) = plan.edge_merges.iter_mut().find(|m| m.edge_id == edge_id) {
            merge.relationship_ids.push(relationship.id.clone());
            merge.observations.push(observation);
            return Ok(());
        }

        if view.get_edge(&edge_id).await?.is_some() {
            plan.edge_merges.push(EdgeMerge {
                edge_id,
                relationship_ids: vec![relationship.id.clone()],
                observations: vec![observation],
            });
            return Ok(());
        }

        if !kind.is_generic() {
            for existing in view.edges_between(&source, &target).await? {
                if !existing.relationship_type.is_generic() && &existing.relationship_type != kind {
                    push_unique(
                        &mut plan.conflicts,
                        Conflict::RelationshipType {
                            source,
                            target,
                            existing: existing.relationship_type.clone(),
                            proposed: kind.clone(),
                        },
                    );
                }
            }
        }

        let properties: Metadata = relationship
            .metadata
            .iter()
            .filter(|(key, _)| key.as_str() != EXTRACTORS_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        plan.edge_creations.push(EdgeCreation {
            edge_id,
            source,
            target,
            relationship_type: kind.clone(),
            confidence: 0.0,
            properties,
            relationship_ids: vec![relationship.id.clone()],
            observations: vec![observation],
        });
        Ok(())
    }

    fn finalize_confidences(&self, plan: &mut KnowledgeUpdatePlan) {
        let as_of = plan.as_of;
        for creation in &mut plan.node_creations {
            let log: ObservationLog = creation.observations.iter().cloned().collect();
            creation.confidence = node_confidence(&log, &self.node_params, as_of);
        }
        for creation in &mut plan.edge_creations {
            let log: ObservationLog = creation.observations.iter().cloned().collect();
            creation.confidence = node_confidence(&log, &self.node_params, as_of);
        }
    }
}

/// Type of a node the plan creates, merges into, or finds in the graph.
async fn endpoint_type(plan: &KnowledgeUpdatePlan, id: uuid::Uuid, view: &dyn GraphView) -> Result<Option<EntityType>> {
    if let Some(creation) = plan.node_creations.iter().find(|c| c.node_id == id) {
        return Ok(Some(creation.node_type));
    }
    if let Some(merge) = plan.node_merges.iter().find(|m| m.node_id == id) {
        return Ok(Some(merge.node_type));
    }
    Ok(view.get_node(&id).await?.map(|node| node.node_type))
}

async fn embed_cached(session: &mut Session<'_>, embedder: &dyn NameEmbedder, text: &str) -> Option<Vec<f32>> {
    if let Some(cached) = session.embeddings.get(text) {
        return cached.clone();
    }
    let embedding = match embedder.embed(text).await {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::warn!(text, error = %err, "Embedding failed; using edit distance for this name");
            None
        }
    };
    session.embeddings.insert(text.to_string(), embedding.clone());
    embedding
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self::new(ResolutionConfig::default(), NodeConfidenceParams::default())
    }
}

/// Entities of a collection grouped by the node they resolved to.
pub fn entities_by_node(plan: &KnowledgeUpdatePlan) -> BTreeMap<uuid::Uuid, Vec<String>> {
    let mut grouped: BTreeMap<uuid::Uuid, Vec<String>> = BTreeMap::new();
    for (entity_id, node_id) in &plan.entity_targets {
        grouped.entry(*node_id).or_default().push(entity_id.clone());
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{GraphStore, InMemoryGraphStore};
    use crate::validation::PlanValidator;
    use chrono::{TimeZone, Utc};

    fn collection(text: &str, entities: Vec<Entity>) -> EntityCollection {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut collection = EntityCollection::with_timestamp("turn-1", text, at);
        for entity in entities {
            collection.add_entity(entity).unwrap();
        }
        collection
    }

    fn person(name: &str, start: usize, confidence: f32) -> Entity {
        Entity::new(name, EntityType::Person, start, start + name.len(), confidence, "model").unwrap()
    }

    #[tokio::test]
    async fn test_alias_match_merges_into_existing_node() {
        let store = InMemoryGraphStore::new();
        let mut existing = KnowledgeNode::new(EntityType::Person, "Omar El Mountassir");
        existing.add_alias("Omar");
        store.upsert_node(existing.clone()).await.unwrap();

        let collection = collection("Omar is here", vec![person("Omar", 0, 0.9)]);
        let plan = EntityResolver::default().resolve(&collection, &store).await.unwrap();

        assert!(plan.node_creations.is_empty());
        assert_eq!(plan.node_merges.len(), 1);
        assert_eq!(plan.node_merges[0].node_id, existing.id);
        assert_eq!(plan.node_merges[0].match_kind, MatchKind::Alias);
        assert!(plan.node_merges[0].new_aliases.is_empty());
        assert_eq!(plan.entity_targets["e1"], existing.id);
    }

    #[tokio::test]
    async fn test_repeated_mentions_share_one_creation() {
        let store = InMemoryGraphStore::new();
        let collection = collection(
            "Sara met Omar. Later sara left.",
            vec![person("Sara", 0, 0.9), person("Omar", 9, 0.9), person("sara", 21, 0.8)],
        );
        let plan = EntityResolver::default().resolve(&collection, &store).await.unwrap();

        assert_eq!(plan.node_creations.len(), 2);
        let sara = &plan.node_creations[0];
        assert_eq!(sara.entity_ids, vec!["e1".to_string(), "e3".to_string()]);
        assert_eq!(sara.observations.len(), 2);
        assert_eq!(plan.entity_targets["e1"], plan.entity_targets["e3"]);
        assert!(sara.confidence > 0.0 && sara.confidence <= 1.0);

        let grouped = entities_by_node(&plan);
        assert_eq!(grouped.len(), 2);
    }

    #[tokio::test]
    async fn test_fuzzy_match_adds_alias() {
        let store = InMemoryGraphStore::new();
        let node = KnowledgeNode::new(EntityType::Technology, "PostgreSQL");
        store.upsert_node(node.clone()).await.unwrap();

        let entity = Entity::new("Postgres", EntityType::Technology, 0, 8, 0.9, "model").unwrap();
        let collection = collection("Postgres rocks", vec![entity]);
        let config = ResolutionConfig {
            fuzzy_threshold: 0.75,
            ..ResolutionConfig::default()
        };
        let plan = EntityResolver::new(config, NodeConfidenceParams::default())
            .resolve(&collection, &store)
            .await
            .unwrap();

        assert_eq!(plan.node_merges.len(), 1);
        let merge = &plan.node_merges[0];
        assert_eq!(merge.match_kind, MatchKind::Fuzzy);
        assert!((merge.score - 0.8).abs() < 1e-6);
        assert_eq!(merge.new_aliases, vec!["Postgres".to_string()]);
    }

    #[tokio::test]
    async fn test_below_threshold_creates_new_node() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_node(KnowledgeNode::new(EntityType::Technology, "PostgreSQL"))
            .await
            .unwrap();

        let entity = Entity::new("Postgres", EntityType::Technology, 0, 8, 0.9, "model").unwrap();
        let plan = EntityResolver::default()
            .resolve(&collection("Postgres rocks", vec![entity]), &store)
            .await
            .unwrap();

        assert!(plan.node_merges.is_empty());
        assert_eq!(plan.node_creations.len(), 1);
        assert_eq!(
            plan.node_creations[0].node_id,
            KnowledgeNode::deterministic_id(EntityType::Technology, "postgres")
        );
    }

    #[tokio::test]
    async fn test_ambiguous_candidates_warn_but_choose() {
        let store = InMemoryGraphStore::new();
        let mut first = KnowledgeNode::new(EntityType::Person, "Sam Carter");
        first.add_alias("Sam");
        first.confidence = 0.9;
        let mut second = KnowledgeNode::new(EntityType::Person, "Sam Jones");
        second.add_alias("Sam");
        second.confidence = 0.4;
        store.upsert_node(first.clone()).await.unwrap();
        store.upsert_node(second.clone()).await.unwrap();

        let plan = EntityResolver::default()
            .resolve(&collection("Sam called", vec![person("Sam", 0, 0.9)]), &store)
            .await
            .unwrap();

        assert_eq!(plan.node_merges[0].node_id, first.id);
        let warnings: Vec<_> = plan.ambiguous_matches().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].chosen, first.id);
        assert_eq!(warnings[0].candidates, vec![(second.id, 1.0)]);
    }

    #[tokio::test]
    async fn test_property_conflict_keeps_existing_value() {
        let store = InMemoryGraphStore::new();
        let mut node = KnowledgeNode::new(EntityType::Person, "Omar");
        node.properties.insert("role".into(), "engineer".into());
        store.upsert_node(node.clone()).await.unwrap();

        let entity = person("Omar", 0, 0.9)
            .with_metadata("role", "designer")
            .with_metadata("email", "omar@example.com");
        let plan = EntityResolver::default()
            .resolve(&collection("Omar designs", vec![entity]), &store)
            .await
            .unwrap();

        let merge = &plan.node_merges[0];
        assert!(!merge.property_updates.contains_key("role"));
        assert!(merge.property_updates.contains_key("email"));
        assert!(matches!(
            &plan.conflicts[0],
            Conflict::Property { key, node_id, .. } if key == "role" && *node_id == node.id
        ));
    }

    #[tokio::test]
    async fn test_low_confidence_unanchored_entity_needs_clarification() {
        let store = InMemoryGraphStore::new();
        let mut collection = collection(
            "Omar mentioned Zed and Rust",
            vec![
                person("Omar", 0, 0.9),
                Entity::new("Zed", EntityType::Technology, 15, 18, 0.2, "model").unwrap(),
                Entity::new("Rust", EntityType::Technology, 23, 27, 0.3, "model").unwrap(),
            ],
        );
        collection
            .add_relationship(Relationship::new("e1", "e3", RelationshipType::Uses, 0.7, "model"))
            .unwrap();

        let plan = EntityResolver::default().resolve(&collection, &store).await.unwrap();

        assert_eq!(plan.clarifications.len(), 1);
        assert_eq!(plan.clarifications[0].entity_id, "e2");
        assert!(!plan.entity_targets.contains_key("e2"));
        assert!(plan.entity_targets.contains_key("e3"));
        assert_eq!(plan.edge_creations.len(), 1);
    }

    #[tokio::test]
    async fn test_relationship_to_clarified_entity_is_unresolved() {
        let store = InMemoryGraphStore::new();
        let mut collection = collection(
            "Zed uses Qux",
            vec![
                Entity::new("Zed", EntityType::Person, 0, 3, 0.2, "model").unwrap(),
                Entity::new("Qux", EntityType::Technology, 9, 12, 0.1, "model").unwrap(),
            ],
        );
        collection
            .add_relationship(Relationship::new("e1", "e2", RelationshipType::Uses, 0.7, "model"))
            .unwrap();

        let plan = EntityResolver::default().resolve(&collection, &store).await.unwrap();

        assert_eq!(plan.clarifications.len(), 2);
        assert!(plan.edge_creations.is_empty());
        let unresolved: Vec<_> = plan.unresolved_references().collect();
        assert_eq!(unresolved[0].relationship_id, "r1");
        assert_eq!(unresolved[0].missing_entity_id, "e1");
    }

    #[tokio::test]
    async fn test_incompatible_relationship_kept_as_relates_to() {
        let store = InMemoryGraphStore::new();
        let omar = KnowledgeNode::new(EntityType::Person, "Omar");
        store.upsert_node(omar.clone()).await.unwrap();

        let mut collection = collection(
            "Omar works with Sara",
            vec![person("Omar", 0, 0.9), person("Sara", 16, 0.9)],
        );
        collection
            .add_relationship(Relationship::new("e1", "e2", RelationshipType::WorksOn, 0.8, "model"))
            .unwrap();

        let plan = EntityResolver::default().resolve(&collection, &store).await.unwrap();

        assert_eq!(plan.edge_creations.len(), 1);
        let edge = &plan.edge_creations[0];
        assert_eq!(edge.relationship_type, RelationshipType::RelatesTo);
        assert_eq!(edge.source, omar.id);
        assert_eq!(
            edge.edge_id,
            KnowledgeRelation::deterministic_id(omar.id, &RelationshipType::RelatesTo, edge.target)
        );

        let incompatible: Vec<_> = plan.incompatible_relationships().collect();
        assert_eq!(incompatible.len(), 1);
        assert_eq!(incompatible[0].relationship_id, "r1");
        assert_eq!(incompatible[0].proposed, RelationshipType::WorksOn);
        assert_eq!(
            (incompatible[0].source_type, incompatible[0].target_type),
            (EntityType::Person, EntityType::Person)
        );

        PlanValidator::default().validate(&plan, &store).await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_edge_becomes_merge_and_type_conflict_flagged() {
        let store = InMemoryGraphStore::new();
        let omar = KnowledgeNode::new(EntityType::Person, "Omar");
        let python = KnowledgeNode::new(EntityType::Technology, "Python");
        store.upsert_node(omar.clone()).await.unwrap();
        store.upsert_node(python.clone()).await.unwrap();
        store
            .upsert_edge(KnowledgeRelation::new(omar.id, python.id, RelationshipType::Uses))
            .await
            .unwrap();
        store
            .upsert_edge(KnowledgeRelation::new(omar.id, python.id, RelationshipType::Creates))
            .await
            .unwrap();

        let mut collection = collection(
            "Omar uses Python",
            vec![
                person("Omar", 0, 0.9),
                Entity::new("Python", EntityType::Technology, 10, 16, 0.9, "model").unwrap(),
            ],
        );
        collection
            .add_relationship(Relationship::new("e1", "e2", RelationshipType::Uses, 0.8, "model"))
            .unwrap();
        collection
            .add_relationship(Relationship::new("e1", "e2", RelationshipType::WorksOn, 0.6, "model"))
            .unwrap();

        let plan = EntityResolver::default().resolve(&collection, &store).await.unwrap();

        assert_eq!(plan.edge_merges.len(), 1);
        assert_eq!(
            plan.edge_merges[0].edge_id,
            KnowledgeRelation::deterministic_id(omar.id, &RelationshipType::Uses, python.id)
        );
        assert_eq!(plan.edge_creations.len(), 1);
        assert_eq!(plan.edge_creations[0].relationship_type, RelationshipType::WorksOn);
        let type_conflicts = plan
            .conflicts
            .iter()
            .filter(|c| matches!(c, Conflict::RelationshipType { .. }))
            .count();
        assert_eq!(type_conflicts, 2);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_node(KnowledgeNode::new(EntityType::Person, "Omar"))
            .await
            .unwrap();
        let mut collection = collection(
            "Omar uses Python",
            vec![
                person("Omar", 0, 0.9),
                Entity::new("Python", EntityType::Technology, 10, 16, 0.9, "model").unwrap(),
            ],
        );
        collection
            .add_relationship(Relationship::new("e1", "e2", RelationshipType::Uses, 0.8, "model"))
            .unwrap();

        let resolver = EntityResolver::default();
        let first = resolver.resolve(&collection, &store).await.unwrap();
        let second = resolver.resolve(&collection, &store).await.unwrap();
        assert_eq!(first, second);
    }
}
