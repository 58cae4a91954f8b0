//! Confidence scoring for extracted entities, relationships and graph records.
//!
//! Every function here returns a value in [0, 1], whatever its inputs. Non-finite
//! inputs collapse to 0 rather than escaping the bound.

mod node;

pub use node::{NodeConfidenceParams, node_confidence};

use std::collections::BTreeMap;

use crate::extraction::gazetteer::build_pattern;
use crate::extraction::text::SentenceIndex;
use crate::models::{Entity, EntityCollection, METHOD_AGREEMENT_KEY};

/// Maximum number of additional mentions counted by the frequency factor.
pub const MAX_FREQUENCY_BONUS: usize = 3;

/// Context support for relationships whose endpoints share a sentence.
pub const SAME_SENTENCE_SUPPORT: f32 = 1.0;

/// Context support for relationships spanning sentences.
pub const CROSS_SENTENCE_SUPPORT: f32 = 0.8;

/// Clamp a score into [0, 1], mapping NaN and infinities to 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

/// `base × context × (1 + 0.2 × frequency) × (0.8 + 0.2 × agreement)`, clamped.
pub fn entity_confidence(
    base: f32,
    context_factor: f32,
    frequency_factor: f32,
    method_agreement: f32,
) -> f32 {
    let base = finite_or_zero(base);
    let context = finite_or_zero(context_factor);
    let frequency = finite_or_zero(frequency_factor);
    let agreement = finite_or_zero(method_agreement);
    clamp_unit(base * context * (1.0 + 0.2 * frequency) * (0.8 + 0.2 * agreement))
}

/// `min(source, target) × strength × context_support`, clamped.
pub fn relationship_confidence(
    source_confidence: f32,
    target_confidence: f32,
    strength: f32,
    context_support: f32,
) -> f32 {
    let endpoint = finite_or_zero(source_confidence).min(finite_or_zero(target_confidence));
    clamp_unit(endpoint * finite_or_zero(strength) * finite_or_zero(context_support))
}

/// How well the surrounding text supports a mention.
///
/// Starts at 0.8, gains 0.1 for a capitalised or technical-looking surface form
/// and 0.1 for a known-pattern match.
pub fn context_factor(entity: &Entity) -> f32 {
    let mut factor = 0.8;
    let capitalised = entity
        .name
        .chars()
        .next()
        .is_some_and(|c| c.is_uppercase());
    let technical = entity
        .name
        .chars()
        .any(|c| c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | '+' | '#' | '/'));
    if capitalised || technical {
        factor += 0.1;
    }
    if entity.is_pattern_match() {
        factor += 0.1;
    }
    clamp_unit(factor)
}

/// Additional case-insensitive whole-word occurrences of `name` in `text`, capped.
pub fn frequency_factor(text: &str, name: &str) -> f32 {
    let needle = name.trim();
    if needle.is_empty() {
        return 0.0;
    }
    let occurrences = match build_pattern(needle, true, true) {
        Ok(pattern) => pattern.find_iter(text).count(),
        Err(err) => {
            tracing::warn!(name = needle, error = %err, "Cannot count mentions");
            return 0.0;
        }
    };
    occurrences.saturating_sub(1).min(MAX_FREQUENCY_BONUS) as f32
}

/// Rescales every entity and relationship of a merged collection.
///
/// Method agreement is the weighted fraction of configured extractors that
/// proposed an entity.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceCalculator {
    weights: BTreeMap<String, f32>,
}

impl ConfidenceCalculator {
    /// Create a calculator over the configured extractors and their weights.
    pub fn new(weights: impl IntoIterator<Item = (String, f32)>) -> Self {
        Self {
            weights: weights.into_iter().collect(),
        }
    }

    fn total_weight(&self) -> f32 {
        let mut weights: Vec<f32> = self.weights.values().map(|w| w.max(0.0)).collect();
        weights.sort_by(f32::total_cmp);
        weights.iter().sum()
    }

    /// Weighted fraction of configured extractors among `contributors`.
    pub fn method_agreement<S: AsRef<str>>(&self, contributors: &[S]) -> f32 {
        let total = self.total_weight();
        if total <= 0.0 {
            return 0.0;
        }
        let mut seen: Vec<&str> = contributors.iter().map(AsRef::as_ref).collect();
        seen.sort_unstable();
        seen.dedup();
        let agreed: f32 = seen
            .iter()
            .filter_map(|name| self.weights.get(*name))
            .map(|w| w.max(0.0))
            .sum();
        clamp_unit(agreed / total)
    }

    /// Apply the entity then relationship formulas in place.
    pub(crate) fn rescore(&self, collection: &mut EntityCollection) {
        let text = collection.text.clone();

        for entity in collection.entities_mut() {
            let contributors = entity.contributors();
            let agreement = self.method_agreement(&contributors);
            let rescored = entity_confidence(
                entity.confidence,
                context_factor(entity),
                frequency_factor(&text, &entity.name),
                agreement,
            );
            tracing::trace!(
                entity = %entity.name,
                before = entity.confidence,
                after = rescored,
                agreement,
                "Rescored entity"
            );
            entity.confidence = rescored;
            entity
                .metadata
                .entry(METHOD_AGREEMENT_KEY.to_string())
                .or_insert_with(|| (distinct_count(&contributors) as f64).into());
        }

        let sentences = SentenceIndex::new(&text);
        let endpoints: BTreeMap<String, (f32, usize)> = collection
            .entities()
            .iter()
            .map(|e| (e.id.clone(), (e.confidence, e.span.start)))
            .collect();

        for relationship in collection.relationships_mut() {
            let (Some(&(source_conf, source_pos)), Some(&(target_conf, target_pos))) = (
                endpoints.get(&relationship.source),
                endpoints.get(&relationship.target),
            ) else {
                continue;
            };
            let support = if sentences.same_sentence(source_pos, target_pos) {
                SAME_SENTENCE_SUPPORT
            } else {
                CROSS_SENTENCE_SUPPORT
            };
            relationship.confidence =
                relationship_confidence(source_conf, target_conf, relationship.confidence, support);
        }
    }
}

fn distinct_count(contributors: &[String]) -> usize {
    let mut names: Vec<&String> = contributors.iter().collect();
    names.sort();
    names.dedup();
    names.len()
}
