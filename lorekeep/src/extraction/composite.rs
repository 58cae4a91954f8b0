//! Runs several extractors over one text and merges their proposals.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use super::{Extractor, GazetteerExtractor, ModelExtractor, NlpModel};
use crate::confidence::ConfidenceCalculator;
use crate::config::{ConfigError, ExtractionConfig, ExtractorKind};
use crate::models::{
    EXTRACTORS_KEY, Entity, EntityCollection, EntityType, ExtractorFailure, METHOD_AGREEMENT_KEY,
    MetadataValue, Relationship, RelationshipType, normalize_name,
};
use crate::{LorekeepError, Result};

/// An extractor together with its weight and time budget.
#[derive(Debug, Clone)]
pub struct ConfiguredExtractor {
    pub extractor: Arc<dyn Extractor>,
    pub weight: f32,
    pub timeout: Duration,
}

/// Fans text out to every configured extractor and merges the results.
///
/// A failing or slow extractor is reported as an `ExtractorFailure` on the
/// returned collection; the others still contribute.
#[derive(Debug, Clone)]
pub struct CompositeExtractor {
    extractors: Vec<ConfiguredExtractor>,
    span_overlap_threshold: f32,
    calculator: ConfidenceCalculator,
}

/// One proposal awaiting merge.
struct Candidate {
    order: usize,
    entity: Entity,
    key: (EntityType, String),
}

impl CompositeExtractor {
    pub fn new(span_overlap_threshold: f32) -> Self {
        Self {
            extractors: Vec::new(),
            span_overlap_threshold,
            calculator: ConfidenceCalculator::default(),
        }
    }

    /// Add an extractor; configuration order breaks exact confidence ties.
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>, weight: f32, timeout: Duration) -> Self {
        self.extractors.push(ConfiguredExtractor {
            extractor,
            weight,
            timeout,
        });
        self.calculator = ConfidenceCalculator::new(
            self.extractors
                .iter()
                .map(|c| (c.extractor.name().to_string(), c.weight)),
        );
        self
    }

    /// Build the enabled extractors described by `config`.
    ///
    /// Model-backed extractors require `model`.
    pub fn from_config(config: &ExtractionConfig, model: Option<Arc<dyn NlpModel>>) -> Result<Self> {
        let mut composite = Self::new(config.span_overlap_threshold);
        for entry in config.extractors.iter().filter(|e| e.enabled) {
            let extractor: Arc<dyn Extractor> = match &entry.kind {
                ExtractorKind::Gazetteer(settings) => {
                    Arc::new(GazetteerExtractor::from_settings(&entry.name, settings)?)
                }
                ExtractorKind::Model(settings) => {
                    let model = model.clone().ok_or_else(|| {
                        ConfigError::ValidationError(format!(
                            "extractor '{}' is model-backed but no NLP model was supplied",
                            entry.name
                        ))
                    })?;
                    Arc::new(ModelExtractor::from_settings(&entry.name, model, settings))
                }
            };
            let timeout = entry.timeout.unwrap_or(config.default_timeout);
            composite = composite.with_extractor(extractor, entry.weight, timeout);
        }
        if composite.extractors.is_empty() {
            return Err(ConfigError::ValidationError("no extractors are enabled".to_string()).into());
        }
        Ok(composite)
    }

    pub fn extractors(&self) -> &[ConfiguredExtractor] {
        &self.extractors
    }

    /// Extract with every configured extractor and merge the results.
    pub async fn extract(&self, text: &str, source_id: &str) -> Result<EntityCollection> {
        if self.extractors.is_empty() {
            return Err(ConfigError::ValidationError("no extractors are enabled".to_string()).into());
        }

        let runs = self.extractors.iter().map(|configured| async move {
            let name = configured.extractor.name().to_string();
            let outcome =
                tokio::time::timeout(configured.timeout, configured.extractor.extract(text, source_id)).await;
            let result = match outcome {
                Ok(result) => result,
                Err(_) => Err(LorekeepError::Timeout {
                    extractor: name.clone(),
                    timeout: configured.timeout,
                }),
            };
            (name, result)
        });
        let outputs = join_all(runs).await;

        let mut failures = Vec::new();
        let mut failed: BTreeSet<String> = BTreeSet::new();
        let mut candidates = Vec::new();
        let mut proposed: Vec<(usize, Relationship)> = Vec::new();
        for (order, (name, result)) in outputs.into_iter().enumerate() {
            match result {
                Ok(collection) => {
                    let (entities, relationships, nested) = collection.into_parts();
                    failures.extend(nested);
                    candidates.extend(entities.into_iter().map(|entity| Candidate {
                        order,
                        key: (entity.entity_type, normalize_name(&entity.name)),
                        entity,
                    }));
                    proposed.extend(relationships.into_iter().map(|r| (order, r)));
                }
                Err(err) => {
                    tracing::warn!(extractor = %name, error = %err, "Extractor failed; continuing without it");
                    failures.push(ExtractorFailure::new(name.clone(), err.to_string()));
                    failed.insert(name);
                }
            }
        }

        let groups = self.group(&candidates);
        let (entities, id_map) = merge_groups(&candidates, groups);

        let mut merged = RelationshipMerger::default();
        for (order, relationship) in proposed {
            let source = id_map.get(&(order, relationship.source.clone()));
            let target = id_map.get(&(order, relationship.target.clone()));
            if let (Some(source), Some(target)) = (source, target) {
                merged.add(source.clone(), target.clone(), relationship);
            }
        }

        let related = self.relate(text, source_id, &entities, &failed).await;
        for (name, result) in related {
            match result {
                Ok(relationships) => {
                    for relationship in relationships {
                        merged.add(relationship.source.clone(), relationship.target.clone(), relationship);
                    }
                }
                Err(err) => {
                    tracing::warn!(extractor = %name, error = %err, "Relation phase failed");
                    failures.push(ExtractorFailure::new(name, format!("relation phase: {}", err)));
                }
            }
        }

        let mut collection = EntityCollection::new(source_id, text);
        for entity in entities {
            collection.add_entity(entity)?;
        }
        for relationship in merged.finish(&collection) {
            collection.add_relationship(relationship)?;
        }
        for failure in failures {
            collection.record_failure(failure);
        }

        self.calculator.rescore(&mut collection);

        tracing::info!(
            source_id,
            entities = collection.len(),
            relationships = collection.relationships().len(),
            failures = collection.failure_count(),
            "Composite extraction complete"
        );
        Ok(collection)
    }

    /// Relation phase over merged entities, skipping extractors that already failed.
    async fn relate(
        &self,
        text: &str,
        source_id: &str,
        entities: &[Entity],
        failed: &BTreeSet<String>,
    ) -> Vec<(String, Result<Vec<Relationship>>)> {
        if entities.is_empty() {
            return Vec::new();
        }
        let known: BTreeSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        let active = self
            .extractors
            .iter()
            .filter(|configured| !failed.contains(configured.extractor.name()));
        let runs = active.map(|configured| {
            let known = &known;
            async move {
                let name = configured.extractor.name().to_string();
                let outcome = tokio::time::timeout(
                    configured.timeout,
                    configured.extractor.relate(text, source_id, entities),
                )
                .await;
                let result = match outcome {
                    Ok(Ok(relationships)) => Ok(relationships
                        .into_iter()
                        .filter(|r| known.contains(r.source.as_str()) && known.contains(r.target.as_str()))
                        .collect()),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(LorekeepError::Timeout {
                        extractor: name.clone(),
                        timeout: configured.timeout,
                    }),
                };
                (name, result)
            }
        });
        join_all(runs).await
    }

    /// Union proposals of the same (type, name) whose spans overlap enough.
    fn group(&self, candidates: &[Candidate]) -> Vec<Vec<usize>> {
        let mut parent: Vec<usize> = (0..candidates.len()).collect();

        fn find(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }

        let mut by_key: BTreeMap<&(EntityType, String), Vec<usize>> = BTreeMap::new();
        for (i, candidate) in candidates.iter().enumerate() {
            by_key.entry(&candidate.key).or_default().push(i);
        }
        for members in by_key.values() {
            for (pos, &a) in members.iter().enumerate() {
                for &b in &members[pos + 1..] {
                    let ratio = candidates[a].entity.span.overlap_ratio(&candidates[b].entity.span);
                    if ratio >= self.span_overlap_threshold {
                        let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                        if ra != rb {
                            parent[ra.max(rb)] = ra.min(rb);
                        }
                    }
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..candidates.len() {
            let root = find(&mut parent, i);
            groups.entry(root).or_default().push(i);
        }
        groups.into_values().collect()
    }
}

/// Collapse each group onto its representative and assign `eN` ids.
///
/// Returns the merged entities plus a map from (extractor order, original id)
/// to merged id.
fn merge_groups(
    candidates: &[Candidate],
    groups: Vec<Vec<usize>>,
) -> (Vec<Entity>, HashMap<(usize, String), String>) {
    let mut merged: Vec<(Entity, Vec<usize>)> = groups
        .into_iter()
        .map(|mut members| {
            // Highest confidence first; earlier extractor then earlier span on ties.
            members.sort_by(|&a, &b| {
                let (ca, cb) = (&candidates[a], &candidates[b]);
                cb.entity
                    .confidence
                    .total_cmp(&ca.entity.confidence)
                    .then_with(|| ca.order.cmp(&cb.order))
                    .then_with(|| ca.entity.span.cmp(&cb.entity.span))
            });
            let mut representative = candidates[members[0]].entity.clone();
            for &member in &members[1..] {
                for (key, value) in &candidates[member].entity.metadata {
                    representative
                        .metadata
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
            }
            let contributors: BTreeSet<String> = members
                .iter()
                .map(|&m| candidates[m].entity.extractor.clone())
                .collect();
            representative.metadata.insert(
                METHOD_AGREEMENT_KEY.to_string(),
                MetadataValue::Number(contributors.len() as f64),
            );
            representative.metadata.insert(
                EXTRACTORS_KEY.to_string(),
                MetadataValue::StringList(contributors.into_iter().collect()),
            );
            (representative, members)
        })
        .collect();

    merged.sort_by(|(a, _), (b, _)| {
        a.span
            .cmp(&b.span)
            .then_with(|| a.entity_type.cmp(&b.entity_type))
            .then_with(|| normalize_name(&a.name).cmp(&normalize_name(&b.name)))
    });

    let mut id_map = HashMap::new();
    let mut entities = Vec::with_capacity(merged.len());
    for (position, (mut entity, members)) in merged.into_iter().enumerate() {
        let id = format!("e{}", position + 1);
        for member in members {
            let candidate = &candidates[member];
            id_map.insert((candidate.order, candidate.entity.id.clone()), id.clone());
        }
        entity.id = id;
        entities.push(entity);
    }
    (entities, id_map)
}

/// Accumulates relationships keyed by (source, target, type).
#[derive(Default)]
struct RelationshipMerger {
    merged: BTreeMap<(String, String, RelationshipType), Relationship>,
}

impl RelationshipMerger {
    fn add(&mut self, source: String, target: String, relationship: Relationship) {
        if source == target && !relationship.relationship_type.allows_reflexive() {
            return;
        }
        let key = (source.clone(), target.clone(), relationship.relationship_type.clone());
        match self.merged.get_mut(&key) {
            Some(existing) => {
                let mut contributors: BTreeSet<String> = existing
                    .metadata
                    .get(EXTRACTORS_KEY)
                    .and_then(|v| v.as_list())
                    .map(|l| l.iter().cloned().collect())
                    .unwrap_or_default();
                contributors.insert(relationship.extractor.clone());
                if relationship.confidence > existing.confidence
                    || (relationship.confidence == existing.confidence
                        && relationship.extractor < existing.extractor)
                {
                    existing.confidence = relationship.confidence;
                    existing.extractor = relationship.extractor.clone();
                }
                for (k, v) in relationship.metadata {
                    existing.metadata.entry(k).or_insert(v);
                }
                existing.metadata.insert(
                    EXTRACTORS_KEY.to_string(),
                    MetadataValue::StringList(contributors.into_iter().collect()),
                );
            }
            None => {
                let mut relationship = relationship;
                relationship.id = String::new();
                relationship.source = source;
                relationship.target = target;
                relationship.conflicts_with.clear();
                relationship.metadata.insert(
                    EXTRACTORS_KEY.to_string(),
                    MetadataValue::StringList(vec![relationship.extractor.clone()]),
                );
                self.merged.insert(key, relationship);
            }
        }
    }

    /// Flag competing specific types per endpoint pair and order by entity position.
    fn finish(self, collection: &EntityCollection) -> Vec<Relationship> {
        let mut by_pair: BTreeMap<(String, String), Vec<RelationshipType>> = BTreeMap::new();
        for (source, target, kind) in self.merged.keys() {
            if !kind.is_generic() {
                by_pair
                    .entry((source.clone(), target.clone()))
                    .or_default()
                    .push(kind.clone());
            }
        }

        let mut relationships: Vec<Relationship> = self
            .merged
            .into_values()
            .map(|mut r| {
                if !r.relationship_type.is_generic()
                    && let Some(kinds) = by_pair.get(&(r.source.clone(), r.target.clone()))
                    && kinds.len() > 1
                {
                    r.conflicts_with = kinds
                        .iter()
                        .filter(|k| **k != r.relationship_type)
                        .cloned()
                        .collect();
                }
                r
            })
            .collect();

        let position = |id: &str| collection.position_of(id).unwrap_or(usize::MAX);
        relationships.sort_by(|a, b| {
            position(&a.source)
                .cmp(&position(&b.source))
                .then_with(|| position(&a.target).cmp(&position(&b.target)))
                .then_with(|| a.relationship_type.cmp(&b.relationship_type))
        });
        relationships
    }
}

#[async_trait]
impl Extractor for CompositeExtractor {
    async fn extract(&self, text: &str, source_id: &str) -> Result<EntityCollection> {
        CompositeExtractor::extract(self, text, source_id).await
    }

    fn name(&self) -> &str {
        "composite"
    }

    fn supported_types(&self) -> Vec<EntityType> {
        let mut types: Vec<EntityType> = self
            .extractors
            .iter()
            .flat_map(|c| c.extractor.supported_types())
            .collect();
        types.sort();
        types.dedup();
        types
    }
}
