//! Observations: the evidence records behind every graph node and edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::collection::EntityCollection;
use super::entity::{Entity, Metadata, Span};
use super::relationship::Relationship;

/// Default number of characters captured on each side of a mention.
pub const DEFAULT_CONTEXT_WINDOW: usize = 50;

/// Text surrounding a mention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationContext {
    pub before: String,
    pub exact: String,
    pub after: String,
}

impl ObservationContext {
    /// Capture up to `window` characters on each side of `span`.
    ///
    /// Spans that do not fall on char boundaries yield an empty context.
    pub fn around(text: &str, span: Span, window: usize) -> Self {
        if !span.is_valid_for(text) {
            return Self::default();
        }
        let head = &text[..span.start];
        let before_start = head
            .char_indices()
            .rev()
            .nth(window.saturating_sub(1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let before = if window == 0 { "" } else { &head[before_start..] };

        let tail = &text[span.end..];
        let after_end = tail
            .char_indices()
            .nth(window)
            .map(|(i, _)| i)
            .unwrap_or(tail.len());

        Self {
            before: before.to_string(),
            exact: text[span.start..span.end].to_string(),
            after: tail[..after_end].to_string(),
        }
    }
}

/// One piece of evidence supporting a node or edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Surface text of the mention
    pub text: String,
    /// Source identifier (e.g. conversation turn)
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f32,
    pub extractor: String,
    pub context: ObservationContext,
    pub position: Span,
    /// Property values asserted by this mention
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Metadata,
}

impl Observation {
    /// Evidence for an entity mention.
    pub fn from_entity(collection: &EntityCollection, entity: &Entity, window: usize) -> Self {
        Self {
            text: entity.name.clone(),
            source: collection.source_id.clone(),
            timestamp: collection.extracted_at,
            confidence: entity.confidence,
            extractor: entity.extractor.clone(),
            context: ObservationContext::around(&collection.text, entity.span, window),
            position: entity.span,
            attributes: entity.asserted_properties(),
        }
    }

    /// Evidence for a relationship; the position covers both endpoint mentions.
    pub fn from_relationship(
        collection: &EntityCollection,
        relationship: &Relationship,
        window: usize,
    ) -> Self {
        let spans: Vec<Span> = [&relationship.source, &relationship.target]
            .iter()
            .filter_map(|id| collection.get_entity(id))
            .map(|e| e.span)
            .collect();
        let position = match (spans.iter().map(|s| s.start).min(), spans.iter().map(|s| s.end).max()) {
            (Some(start), Some(end)) => Span { start, end },
            _ => Span { start: 0, end: 0 },
        };
        let context = ObservationContext::around(&collection.text, position, window);
        Self {
            text: context.exact.clone(),
            source: collection.source_id.clone(),
            timestamp: collection.extracted_at,
            confidence: relationship.confidence,
            extractor: relationship.extractor.clone(),
            context,
            position,
            attributes: Metadata::new(),
        }
    }
}

/// Aggregate of observations folded out of a log by compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSummary {
    pub count: usize,
    pub confidence_sum: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub extractor_counts: BTreeMap<String, usize>,
}

impl ObservationSummary {
    pub fn mean_confidence(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.confidence_sum / self.count as f64
        }
    }

    fn absorb(&mut self, observation: &Observation) {
        self.count += 1;
        self.confidence_sum += observation.confidence as f64;
        self.first_seen = self.first_seen.min(observation.timestamp);
        self.last_seen = self.last_seen.max(observation.timestamp);
        *self
            .extractor_counts
            .entry(observation.extractor.clone())
            .or_insert(0) += 1;
    }

    fn from_observation(observation: &Observation) -> Self {
        let mut summary = Self {
            count: 0,
            confidence_sum: 0.0,
            first_seen: observation.timestamp,
            last_seen: observation.timestamp,
            extractor_counts: BTreeMap::new(),
        };
        summary.absorb(observation);
        summary
    }
}

/// Append-only observation history with an optional compacted prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationLog {
    #[serde(default)]
    entries: Vec<Observation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<ObservationSummary>,
}

impl ObservationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observation: Observation) {
        self.entries.push(observation);
    }

    pub fn entries(&self) -> &[Observation] {
        &self.entries
    }

    pub fn summary(&self) -> Option<&ObservationSummary> {
        self.summary.as_ref()
    }

    /// Observations ever recorded, including compacted ones.
    pub fn total_count(&self) -> usize {
        self.entries.len() + self.summary.as_ref().map_or(0, |s| s.count)
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        let newest_entry = self.entries.iter().map(|o| o.timestamp).max();
        let summarized = self.summary.as_ref().map(|s| s.last_seen);
        newest_entry.max(summarized)
    }

    /// Fold the oldest entries into the summary so at most `max_entries` remain.
    ///
    /// Returns the number of entries folded.
    pub fn compact(&mut self, max_entries: usize) -> usize {
        if self.entries.len() <= max_entries {
            return 0;
        }
        self.entries.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.position.cmp(&b.position))
        });
        let excess = self.entries.len() - max_entries;
        for observation in self.entries.drain(..excess) {
            match self.summary.as_mut() {
                Some(summary) => summary.absorb(&observation),
                None => self.summary = Some(ObservationSummary::from_observation(&observation)),
            }
        }
        excess
    }
}

impl Extend<Observation> for ObservationLog {
    fn extend<T: IntoIterator<Item = Observation>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

impl FromIterator<Observation> for ObservationLog {
    fn from_iter<T: IntoIterator<Item = Observation>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            summary: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn observation(minutes: i64, confidence: f32) -> Observation {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Observation {
            text: "Python".into(),
            source: format!("turn-{minutes}"),
            timestamp: base + Duration::minutes(minutes),
            confidence,
            extractor: "gazetteer".into(),
            context: ObservationContext::default(),
            position: Span { start: 0, end: 6 },
            attributes: Metadata::new(),
        }
    }

    #[test]
    fn test_context_window_clipped_to_text() {
        let text = "Omar uses Python daily";
        let ctx = ObservationContext::around(text, Span { start: 10, end: 16 }, 5);
        assert_eq!(ctx.before, "uses ");
        assert_eq!(ctx.exact, "Python");
        assert_eq!(ctx.after, " dail");

        let wide = ObservationContext::around(text, Span { start: 0, end: 4 }, 50);
        assert_eq!(wide.before, "");
        assert_eq!(wide.after, " uses Python daily");
    }

    #[test]
    fn test_context_respects_char_boundaries() {
        let text = "Zoë écrit en Rust";
        let start = text.find("Rust").unwrap();
        let ctx = ObservationContext::around(text, Span { start, end: start + 4 }, 3);
        assert_eq!(ctx.before, "en ");
        let bad = ObservationContext::around(text, Span { start: 3, end: 4 }, 3);
        assert_eq!(bad, ObservationContext::default());
    }

    #[test]
    fn test_compaction_keeps_most_recent() {
        let mut log: ObservationLog = (0..5).map(|i| observation(i, 0.5)).collect();
        let folded = log.compact(2);
        assert_eq!(folded, 3);
        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.total_count(), 5);

        let summary = log.summary().unwrap();
        assert_eq!(summary.count, 3);
        assert!((summary.mean_confidence() - 0.5).abs() < 1e-6);
        assert_eq!(summary.extractor_counts.get("gazetteer"), Some(&3));
        assert!(log.entries().iter().all(|o| o.timestamp > summary.last_seen));
    }

    #[test]
    fn test_latest_timestamp_considers_summary() {
        let mut log: ObservationLog = (0..3).map(|i| observation(i, 0.5)).collect();
        log.compact(0);
        assert!(log.entries().is_empty());
        assert_eq!(log.latest_timestamp(), Some(observation(2, 0.5).timestamp));
    }
}
