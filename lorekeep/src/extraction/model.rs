//! Model-backed extractor delegating to an `NlpModel`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Extractor, NlpModel};
use crate::config::ModelSettings;
use crate::models::{Entity, EntityCollection, EntityType, Relationship, RelationshipType, Span};
use crate::{LorekeepError, Result};

/// Metadata key holding the native model label of an entity.
pub const MODEL_LABEL_KEY: &str = "model_label";

/// Metadata key holding the verb lemma behind a relationship.
pub const VERB_LEMMA_KEY: &str = "verb_lemma";

/// Default mapping from common NER labels onto entity types.
pub fn default_label_map() -> BTreeMap<String, EntityType> {
    [
        ("PERSON", EntityType::Person),
        ("PER", EntityType::Person),
        ("ORG", EntityType::Organization),
        ("LANGUAGE", EntityType::Technology),
        ("PRODUCT", EntityType::Technology),
        ("LAW", EntityType::Resource),
        ("WORK_OF_ART", EntityType::Resource),
        ("NORP", EntityType::Concept),
        ("EVENT", EntityType::Project),
    ]
    .into_iter()
    .map(|(label, t)| (label.to_string(), t))
    .collect()
}

/// Shorter mentions are less trustworthy: `clamp(chars / 5, 0.7, 1.0)`.
fn length_factor(name: &str) -> f32 {
    (name.chars().count() as f32 / 5.0).clamp(0.7, 1.0)
}

/// Extractor backed by a statistical NER and dependency model.
///
/// Output is only as deterministic as the model behind it. Predictions with
/// labels missing from the label map, invalid spans, or adjusted confidence
/// below `min_confidence` are dropped.
#[derive(Debug)]
pub struct ModelExtractor {
    name: String,
    model: Arc<dyn NlpModel>,
    label_map: BTreeMap<String, EntityType>,
    min_confidence: f32,
    relation_confidence: f32,
}

impl ModelExtractor {
    pub fn new(name: impl Into<String>, model: Arc<dyn NlpModel>) -> Self {
        Self::from_settings(name, model, &ModelSettings::default())
    }

    pub fn from_settings(name: impl Into<String>, model: Arc<dyn NlpModel>, settings: &ModelSettings) -> Self {
        let label_map = if settings.label_map.is_empty() {
            default_label_map()
        } else {
            settings
                .label_map
                .iter()
                .map(|(label, t)| (label.to_uppercase(), *t))
                .collect()
        };
        Self {
            name: name.into(),
            model,
            label_map,
            min_confidence: settings.min_confidence,
            relation_confidence: settings.relation_confidence,
        }
    }

    fn model_error(&self, err: anyhow::Error) -> LorekeepError {
        LorekeepError::Extraction {
            extractor: self.name.clone(),
            message: format!("{:#}", err),
        }
    }

    /// Map dependency triples onto entities whose spans overlap subject and object.
    async fn link(&self, text: &str, entities: &[Entity]) -> Result<Vec<Relationship>> {
        let triples = self.model.dependencies(text).await.map_err(|e| self.model_error(e))?;
        let mut relationships = Vec::new();

        for triple in triples {
            let (Some(source), Some(target)) = (
                best_overlap(entities, &triple.subject),
                best_overlap(entities, &triple.object),
            ) else {
                tracing::trace!(verb = %triple.verb_lemma, "Dependency triple has no matching entities");
                continue;
            };
            if source.id == target.id {
                continue;
            }
            let relationship_type = RelationshipType::from_verb_lemma(&triple.verb_lemma);
            relationships.push(
                Relationship::new(
                    &source.id,
                    &target.id,
                    relationship_type,
                    self.relation_confidence,
                    &self.name,
                )
                .with_metadata(VERB_LEMMA_KEY, triple.verb_lemma.to_lowercase()),
            );
        }
        Ok(relationships)
    }
}

/// The entity sharing the most bytes with `span`; earlier entities win ties.
fn best_overlap<'a>(entities: &'a [Entity], span: &Span) -> Option<&'a Entity> {
    entities
        .iter()
        .filter(|e| e.span.overlaps(span))
        .fold(None, |best: Option<&Entity>, e| match best {
            Some(b) if b.span.overlap(span) >= e.span.overlap(span) => Some(b),
            _ => Some(e),
        })
}

#[async_trait]
impl Extractor for ModelExtractor {
    async fn extract(&self, text: &str, source_id: &str) -> Result<EntityCollection> {
        let predictions = self.model.predict(text).await.map_err(|e| self.model_error(e))?;
        let mut collection = EntityCollection::new(source_id, text);

        for prediction in predictions {
            let Some(&entity_type) = self.label_map.get(&prediction.label.to_uppercase()) else {
                tracing::trace!(label = %prediction.label, "Dropping unmapped label");
                continue;
            };
            let span = Span {
                start: prediction.start,
                end: prediction.end,
            };
            if prediction.start >= prediction.end || !span.is_valid_for(text) {
                tracing::warn!(
                    extractor = %self.name,
                    start = prediction.start,
                    end = prediction.end,
                    "Dropping prediction with invalid span"
                );
                continue;
            }
            let raw = &text[span.start..span.end];
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            let start = span.start + (raw.len() - raw.trim_start().len());
            let end = start + name.len();
            let confidence = prediction.score.clamp(0.0, 1.0) * length_factor(name);
            if confidence < self.min_confidence {
                tracing::debug!(name, confidence, "Prediction below confidence threshold");
                continue;
            }
            let entity = Entity::new(name, entity_type, start, end, confidence, &self.name)?
            .with_metadata(MODEL_LABEL_KEY, prediction.label.clone());
            collection.add_entity(entity)?;
        }

        let own_entities = collection.entities().to_vec();
        for relationship in self.link(text, &own_entities).await? {
            collection.add_relationship(relationship)?;
        }

        tracing::debug!(
            extractor = %self.name,
            entities = collection.len(),
            relationships = collection.relationships().len(),
            "Model extraction complete"
        );
        Ok(collection)
    }

    async fn relate(&self, text: &str, _source_id: &str, entities: &[Entity]) -> Result<Vec<Relationship>> {
        self.link(text, entities).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supported_types(&self) -> Vec<EntityType> {
        let mut types: Vec<EntityType> = self.label_map.values().copied().collect();
        types.sort();
        types.dedup();
        types
    }
}
