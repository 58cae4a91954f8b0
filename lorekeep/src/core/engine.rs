//! The knowledge engine: the primary interface to Lorekeep.
//!
//! [`KnowledgeEngine`] runs the full pipeline for a text: composite
//! extraction, entity resolution against the stored graph, plan validation and
//! one atomic commit. Resolution and commit for the same (type, name) bucket,
//! and for the same stored node, are serialised, so concurrent ingests
//! mentioning one entity under any of its names converge on a single node.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{LorekeepConfig, validate_config};
use crate::confidence::{NodeConfidenceParams, node_confidence};
use crate::extraction::{CompositeExtractor, Extractor, NlpModel};
use crate::models::{EntityCollection, KnowledgeNode, KnowledgeRelation, ObservationLog};
use crate::resolution::{EntityResolver, KnowledgeUpdatePlan, NameEmbedder, ResolutionLocks, bucket_key};
use crate::storage::{CommitSummary, GraphStore, StorageError};
use crate::validation::PlanValidator;
use crate::{Result, log_error};

/// Everything one ingest produced.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub collection: EntityCollection,
    pub plan: KnowledgeUpdatePlan,
    pub summary: CommitSummary,
}

/// Extraction-and-resolution engine over a graph store.
#[derive(Debug)]
pub struct KnowledgeEngine {
    /// Configuration the engine was built from
    config: LorekeepConfig,

    /// Configured extractors, merged
    extractor: CompositeExtractor,

    resolver: EntityResolver,

    validator: PlanValidator,

    store: Arc<dyn GraphStore>,

    /// Per-bucket resolution locks
    locks: ResolutionLocks,

    node_params: NodeConfidenceParams,
}

impl KnowledgeEngine {
    /// Build an engine from configuration.
    ///
    /// `model` backs every enabled `model` extractor; it may be `None` when
    /// only gazetteers are configured.
    pub fn new(config: LorekeepConfig, store: Arc<dyn GraphStore>, model: Option<Arc<dyn NlpModel>>) -> Result<Self> {
        validate_config(&config)?;

        let extractor = CompositeExtractor::from_config(&config.extraction, model)?;
        let node_params = NodeConfidenceParams::from(&config.confidence);
        let resolver = EntityResolver::new(config.resolution.clone(), node_params.clone());
        let validator = PlanValidator::new(&config.validation);

        tracing::info!(
            extractors = extractor.extractors().len(),
            fuzzy_threshold = config.resolution.fuzzy_threshold,
            "Knowledge engine ready"
        );

        Ok(Self {
            config,
            extractor,
            resolver,
            validator,
            store,
            locks: ResolutionLocks::new(),
            node_params,
        })
    }

    /// Use `embedder` for embedding-based name similarity.
    pub fn with_embedder(mut self, embedder: Arc<dyn NameEmbedder>) -> Self {
        self.resolver = self.resolver.with_embedder(embedder);
        self
    }

    /// Add a custom extractor after the configured ones.
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>, weight: f32, timeout: Option<Duration>) -> Self {
        let timeout = timeout.unwrap_or(self.config.extraction.default_timeout);
        self.extractor = self.extractor.with_extractor(extractor, weight, timeout);
        self
    }

    pub fn config(&self) -> &LorekeepConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn extractor(&self) -> &CompositeExtractor {
        &self.extractor
    }

    /// Run composite extraction only.
    pub async fn extract(&self, text: &str, source_id: &str) -> Result<EntityCollection> {
        self.extractor.extract(text, source_id).await
    }

    /// Resolve a collection against the current graph without writing.
    pub async fn resolve(&self, collection: &EntityCollection) -> Result<KnowledgeUpdatePlan> {
        self.resolver.resolve(collection, self.store.as_ref()).await
    }

    /// Validate and commit a plan produced by [`resolve`](Self::resolve).
    ///
    /// The plan's buckets and the nodes it touches are locked for the
    /// duration. A plan that has gone stale, for instance because another
    /// ingest created one of its nodes in the meantime, is rejected by
    /// validation.
    pub async fn apply(&self, plan: &KnowledgeUpdatePlan) -> Result<CommitSummary> {
        let _guard = self.locks.acquire(plan.lock_keys()).await;
        self.apply_locked(plan).await
    }

    /// Extract, resolve, validate and commit one text.
    pub async fn ingest(&self, text: &str, source_id: &str) -> Result<IngestReport> {
        let collection = self.extract(text, source_id).await?;

        let mut keys: Vec<String> = collection
            .entities()
            .iter()
            .map(|e| bucket_key(e.entity_type, &e.name))
            .collect();

        // Resolution decides which nodes the plan rewrites. Until the guard
        // covers all of them, widen it and resolve again.
        let (plan, _guard) = loop {
            let guard = self.locks.acquire(keys.clone()).await;
            let plan = self.resolve(&collection).await?;
            let needed = plan.lock_keys();
            if needed.iter().all(|key| guard.keys().binary_search(key).is_ok()) {
                break (plan, guard);
            }
            tracing::debug!(source_id, held = guard.keys().len(), needed = needed.len(), "Widening resolution locks");
            drop(guard);
            keys.extend(needed);
        };
        let summary = self.apply_locked(&plan).await?;

        tracing::info!(
            source_id,
            entities = collection.len(),
            failures = collection.failure_count(),
            nodes_written = summary.nodes_written,
            edges_written = summary.edges_written,
            "Ingested text"
        );

        Ok(IngestReport {
            collection,
            plan,
            summary,
        })
    }

    /// Ingest independent texts concurrently.
    ///
    /// Results are returned in input order; one failing text does not affect the others.
    pub async fn ingest_batch<I, T, S>(&self, items: I) -> Vec<Result<IngestReport>>
    where
        I: IntoIterator<Item = (T, S)>,
        T: AsRef<str>,
        S: AsRef<str>,
    {
        let items: Vec<(T, S)> = items.into_iter().collect();
        let runs = items.iter().map(|(text, source_id)| async move {
            let result = self.ingest(text.as_ref(), source_id.as_ref()).await;
            if let Err(err) = &result {
                log_error!(err, source_id = source_id.as_ref(), "Batch ingest failed");
            }
            result
        });
        join_all(runs).await
    }

    /// Validate and commit; the caller holds the plan's lock keys.
    async fn apply_locked(&self, plan: &KnowledgeUpdatePlan) -> Result<CommitSummary> {
        self.validator.validate(plan, self.store.as_ref()).await?;

        if plan.is_empty() {
            tracing::debug!(source_id = %plan.source_id, "Nothing to apply");
            return Ok(CommitSummary::default());
        }

        let max_observations = self.config.retention.max_observations;
        let mut nodes = Vec::with_capacity(plan.node_creations.len() + plan.node_merges.len());
        let mut edges = Vec::with_capacity(plan.edge_creations.len() + plan.edge_merges.len());

        for creation in &plan.node_creations {
            let mut node = KnowledgeNode::new(creation.node_type, creation.name.clone());
            node.id = creation.node_id;
            for alias in &creation.aliases {
                node.add_alias(alias.clone());
            }
            node.properties = creation.properties.clone();
            node.created_at = plan.as_of;
            node.updated_at = plan.as_of;
            node.add_source(&plan.source_id);
            node.observations.extend(creation.observations.iter().cloned());
            self.settle(&mut node.observations, &mut node.confidence, max_observations, plan.as_of);
            nodes.push(node);
        }

        for merge in &plan.node_merges {
            let mut node = self
                .store
                .get_node(&merge.node_id)
                .await?
                .ok_or_else(|| StorageError::NotFound(format!("node {}", merge.node_id)))?;
            for alias in &merge.new_aliases {
                node.add_alias(alias.clone());
            }
            for (key, value) in &merge.property_updates {
                node.properties.entry(key.clone()).or_insert_with(|| value.clone());
            }
            node.add_source(&plan.source_id);
            node.updated_at = node.updated_at.max(plan.as_of);
            node.observations.extend(merge.observations.iter().cloned());
            let as_of = node.updated_at;
            self.settle(&mut node.observations, &mut node.confidence, max_observations, as_of);
            nodes.push(node);
        }

        for creation in &plan.edge_creations {
            let mut edge = KnowledgeRelation::new(creation.source, creation.target, creation.relationship_type.clone());
            edge.id = creation.edge_id;
            edge.properties = creation.properties.clone();
            edge.created_at = plan.as_of;
            edge.updated_at = plan.as_of;
            edge.observations.extend(creation.observations.iter().cloned());
            self.settle(&mut edge.observations, &mut edge.confidence, max_observations, plan.as_of);
            edges.push(edge);
        }

        for merge in &plan.edge_merges {
            let mut edge = self
                .store
                .get_edge(&merge.edge_id)
                .await?
                .ok_or_else(|| StorageError::NotFound(format!("edge {}", merge.edge_id)))?;
            edge.updated_at = edge.updated_at.max(plan.as_of);
            edge.observations.extend(merge.observations.iter().cloned());
            let as_of = edge.updated_at;
            self.settle(&mut edge.observations, &mut edge.confidence, max_observations, as_of);
            edges.push(edge);
        }

        let summary = self.store.commit(nodes, edges).await?;
        tracing::debug!(
            source_id = %plan.source_id,
            nodes_written = summary.nodes_written,
            edges_written = summary.edges_written,
            "Committed plan"
        );
        Ok(summary)
    }

    /// Apply retention, then recompute confidence from what remains.
    fn settle(&self, log: &mut ObservationLog, confidence: &mut f32, max_observations: usize, as_of: DateTime<Utc>) {
        let folded = log.compact(max_observations);
        if folded > 0 {
            tracing::debug!(folded, "Compacted observation log");
        }
        *confidence = node_confidence(log, &self.node_params, as_of);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigBuilder, ExtractorConfig, GazetteerSettings};
    use crate::storage::InMemoryGraphStore;
    use std::collections::BTreeMap;

    fn gazetteer_engine(max_observations: usize) -> KnowledgeEngine {
        let mut patterns = BTreeMap::new();
        patterns.insert("Person".to_string(), vec!["Omar".to_string()]);
        patterns.insert("Technology".to_string(), vec!["Python".to_string(), "Rust".to_string()]);
        let config = ConfigBuilder::testing()
            .with_extractors(vec![ExtractorConfig::gazetteer(
                "gazetteer",
                GazetteerSettings {
                    patterns,
                    ..GazetteerSettings::default()
                },
            )])
            .with_max_observations(max_observations)
            .build()
            .unwrap();
        KnowledgeEngine::new(config, Arc::new(InMemoryGraphStore::new()), None).unwrap()
    }

    #[tokio::test]
    async fn test_model_extractor_requires_model() {
        let result = KnowledgeEngine::new(LorekeepConfig::default(), Arc::new(InMemoryGraphStore::new()), None);
        assert!(matches!(result, Err(crate::LorekeepError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_ingest_creates_then_merges() {
        let engine = gazetteer_engine(100);

        let first = engine.ingest("Omar likes Python.", "turn-1").await.unwrap();
        assert_eq!(first.plan.node_creations.len(), 2);
        assert_eq!(first.summary.nodes_written, 2);
        assert_eq!(first.summary.edges_written, 1);

        let second = engine.ingest("Python again, says Omar.", "turn-2").await.unwrap();
        assert!(second.plan.node_creations.is_empty());
        assert_eq!(second.plan.node_merges.len(), 2);

        let stats = engine.store().stats().await.unwrap();
        assert_eq!(stats.node_count, 2);

        let python_id = KnowledgeNode::deterministic_id(crate::models::EntityType::Technology, "Python");
        let python = engine.store().get_node(&python_id).await.unwrap().unwrap();
        assert_eq!(python.observations.total_count(), 2);
        assert_eq!(python.sources, vec!["turn-1".to_string(), "turn-2".to_string()]);
    }

    #[tokio::test]
    async fn test_retention_compacts_observations() {
        let engine = gazetteer_engine(2);
        for i in 0..4 {
            engine.ingest("Rust", &format!("turn-{i}")).await.unwrap();
        }

        let rust_id = KnowledgeNode::deterministic_id(crate::models::EntityType::Technology, "Rust");
        let rust = engine.store().get_node(&rust_id).await.unwrap().unwrap();
        assert_eq!(rust.observations.entries().len(), 2);
        assert_eq!(rust.observations.total_count(), 4);
        assert!(rust.confidence > 0.0 && rust.confidence <= 1.0);
    }

    #[tokio::test]
    async fn test_stale_plan_rejected() {
        let engine = gazetteer_engine(100);
        let collection = engine.extract("Omar", "turn-1").await.unwrap();
        let plan = engine.resolve(&collection).await.unwrap();

        engine.apply(&plan).await.unwrap();
        let err = engine.apply(&plan).await.unwrap_err();
        assert!(matches!(err, crate::LorekeepError::InvalidPlan(_)));
    }

    #[tokio::test]
    async fn test_empty_text_commits_nothing() {
        let engine = gazetteer_engine(100);
        let report = engine.ingest("nothing to see", "turn-1").await.unwrap();
        assert!(report.plan.is_empty());
        assert_eq!(report.summary, CommitSummary::default());
    }
}
