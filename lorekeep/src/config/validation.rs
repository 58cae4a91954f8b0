//! Configuration validation utilities.
//!
//! This module provides validation functions for configuration values.

use std::collections::HashSet;

use super::ConfigError;
use super::models::*;

/// Validate the entire configuration.
pub fn validate_config(config: &LorekeepConfig) -> Result<(), ConfigError> {
    validate_extraction_config(&config.extraction)?;
    validate_resolution_config(&config.resolution)?;
    validate_confidence_config(&config.confidence)?;

    if config.retention.max_observations == 0 {
        return Err(ConfigError::ValidationError(
            "retention.max_observations must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn unit_range(name: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "{name} must be between 0 and 1, got {value}"
        )))
    }
}

/// Validate extraction configuration.
fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    unit_range("extraction.span_overlap_threshold", config.span_overlap_threshold)?;

    if config.default_timeout.is_zero() {
        return Err(ConfigError::ValidationError(
            "extraction.default_timeout must be greater than 0".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for extractor in &config.extractors {
        if extractor.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Extractor name cannot be empty".to_string(),
            ));
        }
        if !names.insert(extractor.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Duplicate extractor name '{}'",
                extractor.name
            )));
        }
        if !(extractor.weight >= 0.0 && extractor.weight.is_finite()) {
            return Err(ConfigError::ValidationError(format!(
                "Extractor '{}' weight must be a non-negative number",
                extractor.name
            )));
        }
        if extractor.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ValidationError(format!(
                "Extractor '{}' timeout must be greater than 0",
                extractor.name
            )));
        }

        match &extractor.kind {
            ExtractorKind::Gazetteer(settings) => {
                unit_range("gazetteer base_confidence", settings.base_confidence)?;
                unit_range("gazetteer cooccurrence_confidence", settings.cooccurrence_confidence)?;
            }
            ExtractorKind::Model(settings) => {
                unit_range("model min_confidence", settings.min_confidence)?;
                unit_range("model relation_confidence", settings.relation_confidence)?;
            }
        }
    }

    if !config.extractors.iter().any(|e| e.enabled) {
        return Err(ConfigError::ValidationError(
            "At least one extractor must be enabled".to_string(),
        ));
    }

    Ok(())
}

/// Validate resolution configuration.
fn validate_resolution_config(config: &ResolutionConfig) -> Result<(), ConfigError> {
    unit_range("resolution.fuzzy_threshold", config.fuzzy_threshold)?;
    unit_range("resolution.ambiguity_margin", config.ambiguity_margin)?;
    unit_range("resolution.clarification_floor", config.clarification_floor)?;
    Ok(())
}

/// Validate confidence configuration.
fn validate_confidence_config(config: &ConfidenceConfig) -> Result<(), ConfigError> {
    if config.recency_half_life.is_zero() {
        return Err(ConfigError::ValidationError(
            "confidence.recency_half_life must be greater than 0".to_string(),
        ));
    }
    unit_range("confidence.recency_floor", config.recency_floor)?;
    unit_range("confidence.conflict_penalty", config.conflict_penalty)?;
    unit_range("confidence.default_source_quality", config.default_source_quality)?;
    for (extractor, quality) in &config.source_quality {
        unit_range(&format!("confidence.source_quality.{extractor}"), *quality)?;
    }
    Ok(())
}
