//! Traits for extraction functionality.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::models::{Entity, EntityCollection, EntityType, Relationship, Span};

/// Trait for extracting entities and relationships from text.
///
/// Extractors hold no mutable shared state, so one instance can serve
/// concurrent extraction calls.
#[async_trait]
pub trait Extractor: Send + Sync + std::fmt::Debug {
    /// Extract entities (and any relationships among them) from `text`.
    async fn extract(&self, text: &str, source_id: &str) -> Result<EntityCollection>;

    /// Propose relationships among an already merged entity set.
    ///
    /// Runs after every extractor's entities have been merged, so an extractor
    /// can link entities that other extractors found. Returned relationships
    /// reference ids from `entities`.
    async fn relate(&self, _text: &str, _source_id: &str, _entities: &[Entity]) -> Result<Vec<Relationship>> {
        Ok(Vec::new())
    }

    /// Get the name of this extractor for identification purposes.
    fn name(&self) -> &str;

    /// Get the entity types this extractor can produce.
    fn supported_types(&self) -> Vec<EntityType>;
}

/// A labelled span predicted by an NLP model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanPrediction {
    pub start: usize,
    pub end: usize,
    /// Native model label (e.g. `PERSON`, `ORG`)
    pub label: String,
    /// Raw model score in [0, 1]
    pub score: f32,
}

/// A subject-verb-object triple from a dependency parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyTriple {
    pub subject: Span,
    pub verb_lemma: String,
    pub object: Span,
}

/// Named-entity and dependency-parse capability backing `ModelExtractor`.
///
/// Implementations wrap whatever model the host application ships; errors are
/// opaque to this crate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NlpModel: Send + Sync + std::fmt::Debug {
    /// Labelled entity spans for `text`.
    async fn predict(&self, text: &str) -> anyhow::Result<Vec<SpanPrediction>>;

    /// Subject-verb-object triples for `text`.
    async fn dependencies(&self, text: &str) -> anyhow::Result<Vec<DependencyTriple>>;
}
