//! Configuration model definitions.
//!
//! Every section carries serde defaults, so a partial file or a handful of
//! environment variables is enough to override single values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::{DEFAULT_CONTEXT_WINDOW, EntityType};
use crate::resolution::{SimilarityMetric, TieBreak};

/// Main configuration structure for Lorekeep.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LorekeepConfig {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Extractor set and merge settings
    pub extraction: ExtractionConfig,

    /// Entity resolution thresholds
    pub resolution: ResolutionConfig,

    /// Node and edge confidence parameters
    pub confidence: ConfidenceConfig,

    /// Plan validation rules
    pub validation: ValidationConfig,

    /// Observation retention
    pub retention: RetentionConfig,
}

/// Configuration of the composite extractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Extractors in configured order. Order breaks exact merge ties.
    pub extractors: Vec<ExtractorConfig>,

    /// Minimum overlap, relative to the longer span, for two proposals to merge
    pub span_overlap_threshold: f32,

    /// Timeout for extractors without their own
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            extractors: vec![
                ExtractorConfig::gazetteer("gazetteer", GazetteerSettings::default()),
                ExtractorConfig::model("model", ModelSettings::default()),
            ],
            span_overlap_threshold: 0.5,
            default_timeout: Duration::from_secs(5),
        }
    }
}

/// One configured extractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractorConfig {
    /// Unique name; also the key for weights and source quality
    pub name: String,

    #[serde(flatten)]
    pub kind: ExtractorKind,

    /// Contribution to method agreement
    #[serde(default = "default_weight")]
    pub weight: f32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Overrides the extraction default timeout
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

fn default_weight() -> f32 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl ExtractorConfig {
    pub fn gazetteer(name: impl Into<String>, settings: GazetteerSettings) -> Self {
        Self {
            name: name.into(),
            kind: ExtractorKind::Gazetteer(settings),
            weight: default_weight(),
            enabled: true,
            timeout: None,
        }
    }

    pub fn model(name: impl Into<String>, settings: ModelSettings) -> Self {
        Self {
            name: name.into(),
            kind: ExtractorKind::Model(settings),
            weight: default_weight(),
            enabled: true,
            timeout: None,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Which extraction method an extractor entry uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Known surface forms matched literally
    Gazetteer(GazetteerSettings),

    /// Statistical NER and dependency parsing through an injected model
    Model(ModelSettings),
}

/// Settings of a pattern gazetteer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GazetteerSettings {
    /// Entity type name to surface forms
    pub patterns: BTreeMap<String, Vec<String>>,
    pub case_insensitive: bool,
    pub whole_words: bool,
    pub base_confidence: f32,
    /// Confidence of same-sentence co-occurrence relationships
    pub cooccurrence_confidence: f32,
}

impl Default for GazetteerSettings {
    fn default() -> Self {
        Self {
            patterns: BTreeMap::new(),
            case_insensitive: false,
            whole_words: true,
            base_confidence: 0.9,
            cooccurrence_confidence: 0.3,
        }
    }
}

/// Settings of a model-backed extractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    /// Model label to entity type; empty uses the built-in map
    pub label_map: BTreeMap<String, EntityType>,
    /// Predictions scored below this are dropped
    pub min_confidence: f32,
    pub relation_confidence: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            label_map: BTreeMap::new(),
            min_confidence: 0.5,
            relation_confidence: 0.7,
        }
    }
}

/// Entity resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolutionConfig {
    pub similarity_metric: SimilarityMetric,

    /// Minimum similarity for a fuzzy match
    pub fuzzy_threshold: f32,

    /// Candidates this close to the winner raise an ambiguity warning
    pub ambiguity_margin: f32,

    /// Unanchored entities below this confidence become clarification requests
    pub clarification_floor: f32,

    /// Ordering among equally similar candidates, applied after score
    pub tie_break: Vec<TieBreak>,

    /// Characters of context kept on each side of an observation
    pub context_window: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            similarity_metric: SimilarityMetric::EditDistance,
            fuzzy_threshold: 0.85,
            ambiguity_margin: 0.05,
            clarification_floor: 0.4,
            tie_break: vec![TieBreak::HighestConfidence, TieBreak::MostRecent],
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

/// Parameters of node and edge confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Age at which the recency factor has dropped halfway to its floor
    #[serde(with = "humantime_serde")]
    pub recency_half_life: Duration,

    /// Lowest value the recency factor decays to
    pub recency_floor: f32,

    /// Weight of contradicting observations in the consistency factor
    pub conflict_penalty: f32,

    /// Extractor name to quality in [0, 1]
    pub source_quality: BTreeMap<String, f32>,

    pub default_source_quality: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            recency_half_life: Duration::from_secs(30 * 24 * 60 * 60),
            recency_floor: 0.5,
            conflict_penalty: 0.5,
            source_quality: BTreeMap::new(),
            default_source_quality: 1.0,
        }
    }
}

/// Plan validation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ValidationConfig {
    /// Properties new nodes of a type must carry. A non-blank name is always required.
    pub required_properties: BTreeMap<EntityType, Vec<String>>,
}

/// Observation retention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetentionConfig {
    /// Observations kept verbatim per node or edge; older ones are folded into a summary
    pub max_observations: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { max_observations: 100 }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,

    /// Log format
    pub format: LogFormat,

    /// File to log to (if any)
    pub file: Option<PathBuf>,

    /// Whether to log to stdout
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Default,
            file: None,
            stdout: true,
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Default format
    Default,

    /// JSON format
    Json,

    /// Compact format
    Compact,

    /// Pretty format
    Pretty,
}
