//! Confidence of persisted nodes and edges, recomputed from their evidence.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use super::clamp_unit;
use crate::config::ConfidenceConfig;
use crate::models::ObservationLog;

/// Parameters for recomputing a record's confidence from its observations.
#[derive(Debug, Clone)]
pub struct NodeConfidenceParams {
    pub recency_half_life: Duration,
    pub recency_floor: f32,
    pub conflict_penalty: f32,
    pub source_quality: BTreeMap<String, f32>,
    pub default_source_quality: f32,
}

impl Default for NodeConfidenceParams {
    fn default() -> Self {
        Self::from(&ConfidenceConfig::default())
    }
}

impl From<&ConfidenceConfig> for NodeConfidenceParams {
    fn from(config: &ConfidenceConfig) -> Self {
        Self {
            recency_half_life: config.recency_half_life,
            recency_floor: config.recency_floor,
            conflict_penalty: config.conflict_penalty,
            source_quality: config.source_quality.clone(),
            default_source_quality: config.default_source_quality,
        }
    }
}

impl NodeConfidenceParams {
    fn quality_of(&self, extractor: &str) -> f64 {
        self.source_quality
            .get(extractor)
            .copied()
            .unwrap_or(self.default_source_quality)
            .clamp(0.0, 1.0) as f64
    }
}

/// `base × consistency × recency × source_quality` over an observation log.
///
/// Inputs are sorted before they are combined, so any insertion order of the
/// same observations yields the same result.
pub fn node_confidence(log: &ObservationLog, params: &NodeConfidenceParams, as_of: DateTime<Utc>) -> f32 {
    if log.is_empty() {
        return 0.0;
    }
    let score = base_evidence(log) * consistency(log, params) * recency(log, params, as_of)
        * source_quality(log, params);
    clamp_unit(score as f32)
}

/// Noisy-OR over observation confidences; compacted observations count at their mean.
fn base_evidence(log: &ObservationLog) -> f64 {
    let mut confidences: Vec<f64> = log
        .entries()
        .iter()
        .map(|o| clamp_unit(o.confidence) as f64)
        .collect();
    confidences.sort_by(f64::total_cmp);

    let mut disbelief: f64 = confidences.iter().map(|c| 1.0 - c).product();
    if let Some(summary) = log.summary() {
        let mean = summary.mean_confidence().clamp(0.0, 1.0);
        disbelief *= (1.0 - mean).powi(summary.count as i32);
    }
    1.0 - disbelief
}

/// Penalises observations whose attributes contradict the majority value.
fn consistency(log: &ObservationLog, params: &NodeConfidenceParams) -> f64 {
    let asserting: Vec<_> = log
        .entries()
        .iter()
        .filter(|o| !o.attributes.is_empty())
        .collect();
    if asserting.is_empty() {
        return 1.0;
    }

    // key -> rendered value -> count
    let mut tallies: BTreeMap<&str, BTreeMap<String, usize>> = BTreeMap::new();
    for observation in &asserting {
        for (key, value) in &observation.attributes {
            *tallies
                .entry(key.as_str())
                .or_default()
                .entry(canonical(value))
                .or_insert(0) += 1;
        }
    }
    let majority: BTreeMap<&str, String> = tallies
        .into_iter()
        .filter_map(|(key, counts)| {
            counts
                .into_iter()
                .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then_with(|| vb.cmp(va)))
                .map(|(value, _)| (key, value))
        })
        .collect();

    let contradicting = asserting
        .iter()
        .filter(|o| {
            o.attributes
                .iter()
                .any(|(key, value)| majority.get(key.as_str()).is_some_and(|m| *m != canonical(value)))
        })
        .count();

    let fraction = contradicting as f64 / asserting.len() as f64;
    (1.0 - params.conflict_penalty.clamp(0.0, 1.0) as f64 * fraction).max(0.0)
}

fn canonical(value: &crate::models::MetadataValue) -> String {
    match value {
        crate::models::MetadataValue::String(s) => s.trim().to_lowercase(),
        other => other.to_string(),
    }
}

/// Exponential decay from the newest observation, floored.
fn recency(log: &ObservationLog, params: &NodeConfidenceParams, as_of: DateTime<Utc>) -> f64 {
    let floor = params.recency_floor.clamp(0.0, 1.0) as f64;
    let Some(latest) = log.latest_timestamp() else {
        return floor;
    };
    let half_life = params.recency_half_life.as_secs_f64();
    if half_life <= 0.0 {
        return 1.0;
    }
    let age = (as_of - latest).num_milliseconds().max(0) as f64 / 1000.0;
    floor + (1.0 - floor) * 0.5f64.powf(age / half_life)
}

/// Mean quality weight of the extractors behind the observations.
fn source_quality(log: &ObservationLog, params: &NodeConfidenceParams) -> f64 {
    let mut weights: Vec<f64> = log
        .entries()
        .iter()
        .map(|o| params.quality_of(&o.extractor))
        .collect();
    if let Some(summary) = log.summary() {
        for (extractor, count) in &summary.extractor_counts {
            weights.extend(std::iter::repeat_n(params.quality_of(extractor), *count));
        }
    }
    if weights.is_empty() {
        return params.default_source_quality.clamp(0.0, 1.0) as f64;
    }
    weights.sort_by(f64::total_cmp);
    weights.iter().sum::<f64>() / weights.len() as f64
}
