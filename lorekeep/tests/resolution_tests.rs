//! Integration tests for resolving extracted entities onto the graph.

mod common;

use async_trait::async_trait;
use common::*;
use lorekeep::config::ConfigBuilder;
use lorekeep::core::KnowledgeEngine;
use lorekeep::models::{EntityType, KnowledgeNode, KnowledgeRelation, RelationshipType};
use lorekeep::resolution::{MatchKind, NameEmbedder, SimilarityMetric};
use lorekeep::storage::{GraphStore, GraphView, InMemoryGraphStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Fixed vectors for a handful of names; anything else fails to embed.
#[derive(Debug)]
struct TableEmbedder {
    vectors: HashMap<&'static str, Vec<f32>>,
}

impl TableEmbedder {
    fn languages() -> Self {
        let vectors = [
            ("golang", vec![1.0, 0.1, 0.0]),
            ("go", vec![0.95, 0.15, 0.0]),
            ("rust", vec![0.0, 0.2, 1.0]),
        ]
        .into_iter()
        .collect();
        Self { vectors }
    }
}

#[async_trait]
impl NameEmbedder for TableEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no vector for '{text}'"))
    }
}

async fn seeded_store(nodes: Vec<KnowledgeNode>) -> Arc<InMemoryGraphStore> {
    let store = Arc::new(InMemoryGraphStore::new());
    for node in nodes {
        store.upsert_node(node).await.unwrap();
    }
    store
}

fn omar_engine(store: Arc<InMemoryGraphStore>) -> KnowledgeEngine {
    let config = pipeline_config(&[("Technology", &["Python"])]);
    KnowledgeEngine::new(config, store, Some(Arc::new(omar_model()))).unwrap()
}

mod alias_tests {
    use super::*;

    #[tokio::test]
    async fn test_alias_mention_merges_into_known_person() {
        let mut known = KnowledgeNode::new(EntityType::Person, "Omar El Mountassir");
        known.add_alias("Omar");
        let store = seeded_store(vec![known.clone()]).await;
        let engine = omar_engine(store.clone());

        let report = engine.ingest("Omar uses Python", "turn-1").await.unwrap();
        let plan = &report.plan;

        assert_eq!(plan.node_merges.len(), 1);
        assert_eq!(plan.node_merges[0].node_id, known.id);
        assert_eq!(plan.node_merges[0].match_kind, MatchKind::Alias);
        assert_eq!(plan.node_creations.len(), 1);
        assert_eq!(plan.node_creations[0].name, "Python");
        assert!(plan.node_creations.iter().all(|c| c.node_type != EntityType::Person));

        assert_eq!(plan.edge_creations.len(), 1);
        let edge = &plan.edge_creations[0];
        assert_eq!(edge.source, known.id);
        assert_eq!(edge.target, plan.node_creations[0].node_id);
        assert_eq!(edge.relationship_type, RelationshipType::Uses);

        let stats = store.stats().await.unwrap();
        assert_eq!((stats.node_count, stats.edge_count), (2, 1));

        let stored = store.get_node(&known.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Omar El Mountassir");
        assert_eq!(stored.observations.total_count(), 1);
        assert!(stored.sources.contains(&"turn-1".to_string()));
    }

    #[tokio::test]
    async fn test_repeat_ingest_only_adds_evidence() {
        let store = seeded_store(Vec::new()).await;
        let engine = omar_engine(store.clone());

        let first = engine.ingest("Omar uses Python", "turn-1").await.unwrap();
        assert_eq!(first.plan.node_creations.len(), 2);
        assert_eq!(first.plan.edge_creations.len(), 1);

        let second = engine.ingest("Omar uses Python", "turn-2").await.unwrap();
        assert!(second.plan.node_creations.is_empty());
        assert!(second.plan.edge_creations.is_empty());
        assert_eq!(second.plan.node_merges.len(), 2);
        assert_eq!(second.plan.edge_merges.len(), 1);
        assert!(
            second
                .plan
                .node_merges
                .iter()
                .all(|m| m.match_kind == MatchKind::Exact)
        );

        let stats = store.stats().await.unwrap();
        assert_eq!((stats.node_count, stats.edge_count), (2, 1));

        let omar_id = KnowledgeNode::deterministic_id(EntityType::Person, "Omar");
        let python_id = KnowledgeNode::deterministic_id(EntityType::Technology, "Python");
        let omar = store.get_node(&omar_id).await.unwrap().unwrap();
        assert_eq!(omar.observations.total_count(), 2);
        assert_eq!(omar.sources, vec!["turn-1".to_string(), "turn-2".to_string()]);

        let edge_id = KnowledgeRelation::deterministic_id(omar_id, &RelationshipType::Uses, python_id);
        let edge = store.get_edge(&edge_id).await.unwrap().unwrap();
        assert_eq!(edge.observations.total_count(), 2);
        assert!(edge.confidence > 0.0 && edge.confidence <= 1.0);
    }

    #[tokio::test]
    async fn test_resolving_twice_gives_identical_plans() {
        let store = seeded_store(vec![KnowledgeNode::new(EntityType::Person, "Omar")]).await;
        let engine = omar_engine(store);

        let collection = engine.extract("Omar uses Python", "turn-1").await.unwrap();
        let first = engine.resolve(&collection).await.unwrap();
        let second = engine.resolve(&collection).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }
}

mod similarity_tests {
    use super::*;

    fn go_config(metric: SimilarityMetric) -> lorekeep::config::LorekeepConfig {
        ConfigBuilder::testing()
            .without_model_extractors()
            .with_gazetteer_patterns("Technology", ["Go", "Rust"])
            .with_similarity_metric(metric)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_embedding_similarity_matches_short_name() {
        let golang = KnowledgeNode::new(EntityType::Technology, "Golang");
        let store = seeded_store(vec![golang.clone()]).await;
        let engine = KnowledgeEngine::new(go_config(SimilarityMetric::Embedding), store, None)
            .unwrap()
            .with_embedder(Arc::new(TableEmbedder::languages()));

        let report = engine.ingest("We ship Go services", "turn-1").await.unwrap();

        assert!(report.plan.node_creations.is_empty());
        let merge = &report.plan.node_merges[0];
        assert_eq!(merge.node_id, golang.id);
        assert_eq!(merge.match_kind, MatchKind::Fuzzy);
        assert!(merge.score >= 0.85);
        assert_eq!(merge.new_aliases, vec!["Go".to_string()]);
    }

    #[tokio::test]
    async fn test_edit_distance_keeps_short_name_separate() {
        let golang = KnowledgeNode::new(EntityType::Technology, "Golang");
        let store = seeded_store(vec![golang]).await;
        let engine = KnowledgeEngine::new(go_config(SimilarityMetric::EditDistance), store, None)
            .unwrap()
            .with_embedder(Arc::new(TableEmbedder::languages()));

        let report = engine.ingest("We ship Go services", "turn-1").await.unwrap();

        assert!(report.plan.node_merges.is_empty());
        assert_eq!(report.plan.node_creations[0].name, "Go");
    }

    #[tokio::test]
    async fn test_dissimilar_embedding_does_not_merge() {
        let golang = KnowledgeNode::new(EntityType::Technology, "Golang");
        let store = seeded_store(vec![golang]).await;
        let engine = KnowledgeEngine::new(go_config(SimilarityMetric::Max), store, None)
            .unwrap()
            .with_embedder(Arc::new(TableEmbedder::languages()));

        let report = engine.ingest("Rust is fast", "turn-1").await.unwrap();

        assert!(report.plan.node_merges.is_empty());
        assert_eq!(report.plan.node_creations[0].name, "Rust");
    }
}
