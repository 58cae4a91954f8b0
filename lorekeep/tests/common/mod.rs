//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use lorekeep::config::{ConfigBuilder, ExtractorConfig, GazetteerSettings, LorekeepConfig, ModelSettings};
use lorekeep::extraction::{DependencyTriple, NlpModel, SpanPrediction};
use lorekeep::models::Span;
use std::collections::BTreeMap;
use std::time::Duration;

/// A lexicon-driven stand-in for an NER and dependency model.
///
/// Every scripted surface form is labelled wherever it occurs in the input;
/// a scripted triple fires when both of its surfaces occur.
#[derive(Debug, Default, Clone)]
pub struct ScriptedModel {
    labels: Vec<(String, String, f32)>,
    triples: Vec<(String, String, String)>,
    delay: Option<Duration>,
    fail: bool,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, surface: &str, label: &str, score: f32) -> Self {
        self.labels.push((surface.to_string(), label.to_string(), score));
        self
    }

    pub fn triple(mut self, subject: &str, verb_lemma: &str, object: &str) -> Self {
        self.triples
            .push((subject.to_string(), verb_lemma.to_string(), object.to_string()));
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    async fn pause(&self) -> anyhow::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("model backend unavailable");
        }
        Ok(())
    }
}

fn first_span(text: &str, surface: &str) -> Option<Span> {
    text.find(surface).map(|start| Span {
        start,
        end: start + surface.len(),
    })
}

#[async_trait]
impl NlpModel for ScriptedModel {
    async fn predict(&self, text: &str) -> anyhow::Result<Vec<SpanPrediction>> {
        self.pause().await?;
        let mut predictions = Vec::new();
        for (surface, label, score) in &self.labels {
            for (start, _) in text.match_indices(surface.as_str()) {
                predictions.push(SpanPrediction {
                    start,
                    end: start + surface.len(),
                    label: label.clone(),
                    score: *score,
                });
            }
        }
        predictions.sort_by_key(|p| (p.start, p.end));
        Ok(predictions)
    }

    async fn dependencies(&self, text: &str) -> anyhow::Result<Vec<DependencyTriple>> {
        self.pause().await?;
        Ok(self
            .triples
            .iter()
            .filter_map(|(subject, verb, object)| {
                Some(DependencyTriple {
                    subject: first_span(text, subject)?,
                    verb_lemma: verb.clone(),
                    object: first_span(text, object)?,
                })
            })
            .collect())
    }
}

/// Gazetteer settings from `(type, surfaces)` pairs.
pub fn gazetteer(patterns: &[(&str, &[&str])]) -> GazetteerSettings {
    let patterns: BTreeMap<String, Vec<String>> = patterns
        .iter()
        .map(|(t, surfaces)| (t.to_string(), surfaces.iter().map(|s| s.to_string()).collect()))
        .collect();
    GazetteerSettings {
        patterns,
        ..GazetteerSettings::default()
    }
}

/// A gazetteer followed by a model extractor, with testing defaults.
pub fn pipeline_config(patterns: &[(&str, &[&str])]) -> LorekeepConfig {
    ConfigBuilder::testing()
        .with_extractors(vec![
            ExtractorConfig::gazetteer("gazetteer", gazetteer(patterns)),
            ExtractorConfig::model("model", ModelSettings::default()),
        ])
        .build()
        .expect("valid test config")
}

/// The Omar/Python fixture model.
pub fn omar_model() -> ScriptedModel {
    ScriptedModel::new()
        .label("Omar", "PERSON", 0.95)
        .triple("Omar", "use", "Python")
}
