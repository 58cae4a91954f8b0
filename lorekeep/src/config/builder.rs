//! Configuration builder.
//!
//! This module provides a builder pattern API for creating configurations.

use super::{Result, models::*, validation};
use crate::resolution::{SimilarityMetric, TieBreak};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Builder for creating LorekeepConfig instances.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: LorekeepConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder with default values.
    pub fn new() -> Self {
        Self {
            config: LorekeepConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: LorekeepConfig) -> Self {
        Self { config }
    }

    /// Replace the extractor list.
    pub fn with_extractors(mut self, extractors: Vec<ExtractorConfig>) -> Self {
        self.config.extraction.extractors = extractors;
        self
    }

    /// Append an extractor after the configured ones.
    pub fn with_extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.config.extraction.extractors.push(extractor);
        self
    }

    /// Add surface forms to every gazetteer extractor.
    pub fn with_gazetteer_patterns<I, S>(mut self, entity_type: &str, surfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let surfaces: Vec<String> = surfaces.into_iter().map(Into::into).collect();
        for extractor in &mut self.config.extraction.extractors {
            if let ExtractorKind::Gazetteer(settings) = &mut extractor.kind {
                settings
                    .patterns
                    .entry(entity_type.to_string())
                    .or_default()
                    .extend(surfaces.iter().cloned());
            }
        }
        self
    }

    /// Keep only gazetteer extractors, for setups without an NLP model.
    pub fn without_model_extractors(mut self) -> Self {
        self.config
            .extraction
            .extractors
            .retain(|e| !matches!(e.kind, ExtractorKind::Model(_)));
        self
    }

    pub fn with_span_overlap_threshold(mut self, threshold: f32) -> Self {
        self.config.extraction.span_overlap_threshold = threshold;
        self
    }

    /// Timeout for extractors that do not set their own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.config.extraction.default_timeout = timeout;
        self
    }

    pub fn with_similarity_metric(mut self, metric: SimilarityMetric) -> Self {
        self.config.resolution.similarity_metric = metric;
        self
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f32) -> Self {
        self.config.resolution.fuzzy_threshold = threshold;
        self
    }

    pub fn with_ambiguity_margin(mut self, margin: f32) -> Self {
        self.config.resolution.ambiguity_margin = margin;
        self
    }

    pub fn with_clarification_floor(mut self, floor: f32) -> Self {
        self.config.resolution.clarification_floor = floor;
        self
    }

    pub fn with_tie_break(mut self, order: Vec<TieBreak>) -> Self {
        self.config.resolution.tie_break = order;
        self
    }

    pub fn with_context_window(mut self, chars: usize) -> Self {
        self.config.resolution.context_window = chars;
        self
    }

    pub fn with_recency_half_life(mut self, half_life: Duration) -> Self {
        self.config.confidence.recency_half_life = half_life;
        self
    }

    /// Quality of one extractor's observations.
    pub fn with_source_quality(mut self, extractor: impl Into<String>, quality: f32) -> Self {
        self.config.confidence.source_quality.insert(extractor.into(), quality);
        self
    }

    /// Properties new nodes of `entity_type` must carry.
    pub fn with_required_properties<I, S>(mut self, entity_type: crate::models::EntityType, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .validation
            .required_properties
            .insert(entity_type, keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_observations(mut self, max: usize) -> Self {
        self.config.retention.max_observations = max;
        self
    }

    /// Set the log level.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.config.logging.format = format;
        self
    }

    /// Configure logging to a file.
    pub fn with_log_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.logging.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// JSON logging to stdout and to `~/.lorekeep/logs/lorekeep.log`.
    pub fn with_default_logging(mut self) -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        self.config.logging.level = LogLevel::Info;
        self.config.logging.format = LogFormat::Json;
        self.config.logging.file = Some(home_dir.join(".lorekeep").join("logs").join("lorekeep.log"));
        self
    }

    /// Create a configuration for development.
    ///
    /// Debug-level pretty logging to stdout; otherwise defaults.
    pub fn development() -> Self {
        Self::new()
            .with_log_level(LogLevel::Debug)
            .with_log_format(LogFormat::Pretty)
    }

    /// Create a configuration for automated tests.
    ///
    /// Quiet logging, short extractor timeouts and a small retention window.
    pub fn testing() -> Self {
        Self::new()
            .with_log_level(LogLevel::Warn)
            .with_default_timeout(Duration::from_secs(1))
            .with_max_observations(20)
    }

    /// Create a production configuration with file logging.
    pub fn production() -> Self {
        Self::new().with_default_logging()
    }

    /// Build the configuration, validating it in the process.
    pub fn build(self) -> Result<LorekeepConfig> {
        validation::validate_config(&self.config)?;

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
