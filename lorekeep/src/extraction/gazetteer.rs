//! Pattern-based extractor matching known surface forms.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;

use super::Extractor;
use super::text::{SentenceIndex, is_word_char};
use crate::config::GazetteerSettings;
use crate::models::{Entity, EntityCollection, EntityType, PATTERN_MATCH_KEY, Relationship, RelationshipType};
use crate::{LorekeepError, Result};

/// Metadata key recording how a relationship was inferred.
pub const EVIDENCE_KEY: &str = "evidence";

#[derive(Debug)]
struct GazetteerEntry {
    entity_type: EntityType,
    surface: String,
    regex: Regex,
}

#[derive(Debug)]
struct Match {
    entry: usize,
    start: usize,
    end: usize,
}

/// Matches configured surface forms per entity type with a fixed base confidence.
///
/// Also proposes low-confidence `relatesTo` links between matches that share a
/// sentence.
#[derive(Debug)]
pub struct GazetteerExtractor {
    name: String,
    entries: Vec<GazetteerEntry>,
    base_confidence: f32,
    cooccurrence_confidence: f32,
}

impl GazetteerExtractor {
    /// Create a gazetteer from a type-name to surface-forms map, with default settings.
    pub fn new(name: impl Into<String>, patterns: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let settings = GazetteerSettings {
            patterns: patterns.clone(),
            ..GazetteerSettings::default()
        };
        Self::from_settings(name, &settings)
    }

    pub fn from_settings(name: impl Into<String>, settings: &GazetteerSettings) -> Result<Self> {
        let name = name.into();
        let mut entries = Vec::new();
        for (type_name, surfaces) in &settings.patterns {
            let entity_type: EntityType = type_name.parse().map_err(|e| {
                LorekeepError::Configuration(crate::config::ConfigError::ValidationError(format!(
                    "gazetteer '{}': {}",
                    name, e
                )))
            })?;
            for surface in surfaces {
                let surface = surface.trim();
                if surface.is_empty() {
                    continue;
                }
                let regex = build_pattern(surface, settings.case_insensitive, settings.whole_words)
                    .map_err(|e| {
                        LorekeepError::Configuration(crate::config::ConfigError::ValidationError(
                            format!("gazetteer '{}': invalid pattern '{}': {}", name, surface, e),
                        ))
                    })?;
                entries.push(GazetteerEntry {
                    entity_type,
                    surface: surface.to_string(),
                    regex,
                });
            }
        }

        tracing::debug!(extractor = %name, patterns = entries.len(), "Built gazetteer");

        Ok(Self {
            name,
            entries,
            base_confidence: settings.base_confidence,
            cooccurrence_confidence: settings.cooccurrence_confidence,
        })
    }

    /// Leftmost-longest matches with overlapping matches removed.
    fn find_matches(&self, text: &str) -> Vec<Match> {
        let mut matches: Vec<Match> = self
            .entries
            .iter()
            .enumerate()
            .flat_map(|(entry, e)| {
                e.regex.find_iter(text).map(move |m| Match {
                    entry,
                    start: m.start(),
                    end: m.end(),
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
                .then_with(|| a.entry.cmp(&b.entry))
        });

        let mut accepted: Vec<Match> = Vec::with_capacity(matches.len());
        for candidate in matches {
            if accepted.last().is_none_or(|last| candidate.start >= last.end) {
                accepted.push(candidate);
            }
        }
        accepted
    }
}

/// Literal pattern for `surface`, bounded at word edges when `whole_words` is set.
pub(crate) fn build_pattern(
    surface: &str,
    case_insensitive: bool,
    whole_words: bool,
) -> std::result::Result<Regex, regex::Error> {
    let mut pattern = String::new();
    if case_insensitive {
        pattern.push_str("(?i)");
    }
    let bounded_start = whole_words && surface.chars().next().is_some_and(is_word_char);
    let bounded_end = whole_words && surface.chars().last().is_some_and(is_word_char);
    if bounded_start {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(surface));
    if bounded_end {
        pattern.push_str(r"\b");
    }
    Regex::new(&pattern)
}

#[async_trait]
impl Extractor for GazetteerExtractor {
    async fn extract(&self, text: &str, source_id: &str) -> Result<EntityCollection> {
        let mut collection = EntityCollection::new(source_id, text);

        for m in self.find_matches(text) {
            let entry = &self.entries[m.entry];
            let entity = Entity::new(
                &text[m.start..m.end],
                entry.entity_type,
                m.start,
                m.end,
                self.base_confidence,
                &self.name,
            )?
            .with_metadata(PATTERN_MATCH_KEY, entry.surface.as_str());
            collection.add_entity(entity)?;
        }

        let sentences = SentenceIndex::new(text);
        let mut links = Vec::new();
        let entities = collection.entities();
        for (i, a) in entities.iter().enumerate() {
            for b in &entities[i + 1..] {
                if a.entity_type == b.entity_type && a.name.eq_ignore_ascii_case(&b.name) {
                    continue;
                }
                if sentences.same_sentence(a.span.start, b.span.start) {
                    links.push(
                        Relationship::new(
                            &a.id,
                            &b.id,
                            RelationshipType::RelatesTo,
                            self.cooccurrence_confidence,
                            &self.name,
                        )
                        .with_metadata(EVIDENCE_KEY, "co-occurrence"),
                    );
                }
            }
        }
        for link in links {
            collection.add_relationship(link)?;
        }

        tracing::debug!(
            extractor = %self.name,
            entities = collection.len(),
            relationships = collection.relationships().len(),
            "Gazetteer extraction complete"
        );
        Ok(collection)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supported_types(&self) -> Vec<EntityType> {
        let mut types: Vec<EntityType> = self.entries.iter().map(|e| e.entity_type).collect();
        types.sort();
        types.dedup();
        types
    }
}
