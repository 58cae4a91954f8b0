//! # Lorekeep
//!
//! Entity extraction and knowledge-graph resolution for agent memory.
//!
//! Lorekeep turns free text into durable knowledge: several extractors propose
//! entities and relationships, their proposals are merged with calibrated
//! confidence, and every mention is resolved onto an existing or new node of a
//! knowledge graph. Changes are planned, validated, then committed atomically,
//! with every fact backed by observations that record where it was seen.
//!
//! ## Quick Start
//!
//! ```rust
//! use lorekeep::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let config = ConfigBuilder::new()
//!     .without_model_extractors()
//!     .with_gazetteer_patterns("Technology", ["Python"])
//!     .with_gazetteer_patterns("Person", ["Omar"])
//!     .build()?;
//! let engine = KnowledgeEngine::new(config, Arc::new(InMemoryGraphStore::new()), None)?;
//!
//! let report = engine.ingest("Omar uses Python every day.", "turn-1").await?;
//! assert_eq!(report.plan.node_creations.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **extraction**: gazetteer and model-backed extractors, combined by the composite extractor
//! - **confidence**: mention-level rescoring and evidence-based node confidence
//! - **resolution**: matching mentions to nodes and building update plans
//! - **validation**: integrity rules a plan must pass before it is applied
//! - **storage**: the graph capability and an in-memory implementation
//! - **core**: the [`KnowledgeEngine`](core::KnowledgeEngine) facade

pub mod confidence;
pub mod config;
pub mod core;
pub mod extraction;
pub mod logging;
pub mod models;
pub mod resolution;
pub mod storage;
pub mod validation;

/// The prelude re-exports commonly used types for convenience
pub mod prelude {
    pub use crate::init;

    pub use crate::config::{
        ConfigBuilder, ConfigLoader, ExtractorConfig, ExtractorKind, GazetteerSettings, LogLevel, LorekeepConfig,
        ModelSettings,
    };

    pub use crate::core::{IngestReport, KnowledgeEngine};

    pub use crate::extraction::{
        CompositeExtractor, DependencyTriple, Extractor, GazetteerExtractor, ModelExtractor, NlpModel,
        SpanPrediction,
    };

    pub use crate::models::{
        Entity, EntityCollection, EntityType, KnowledgeNode, KnowledgeRelation, Observation, Relationship,
        RelationshipType,
    };

    pub use crate::resolution::{
        Conflict, EntityResolver, KnowledgeUpdatePlan, NameEmbedder, PlanWarning, SimilarityMetric,
    };

    pub use crate::storage::{GraphStore, GraphView, InMemoryGraphStore, StorageError};

    pub use crate::validation::{InvalidPlanError, PlanValidator};

    pub use crate::{LorekeepError, Result};
}

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error type for Lorekeep operations
#[derive(Debug, thiserror::Error)]
pub enum LorekeepError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Configuration(#[from] crate::config::ConfigError),

    /// Logging error
    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LogError),

    /// A data-model invariant was violated during construction
    #[error("Model error: {0}")]
    Model(#[from] crate::models::ModelError),

    /// Error during storage operations
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// A plan failed validation and was not applied
    #[error("{0}")]
    InvalidPlan(#[from] crate::validation::InvalidPlanError),

    /// An extractor failed
    #[error("Extractor '{extractor}' failed: {message}")]
    Extraction { extractor: String, message: String },

    /// An extractor did not finish within its timeout
    #[error("Extractor '{extractor}' timed out after {timeout:?}")]
    Timeout {
        extractor: String,
        timeout: std::time::Duration,
    },

    /// Resolution could not complete
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Other unclassified errors
    #[error("{0}")]
    Other(String),
}

/// Result type for Lorekeep operations
pub type Result<T> = std::result::Result<T, LorekeepError>;

/// Initialize logging and build a [`KnowledgeEngine`](core::KnowledgeEngine).
///
/// Logging setup errors are ignored so that an already installed subscriber
/// does not prevent start-up.
///
/// # Examples
///
/// ```rust
/// use lorekeep::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<()> {
/// let config = ConfigBuilder::development().without_model_extractors().build()?;
/// let engine = init(config, Arc::new(InMemoryGraphStore::new()), None)?;
/// let report = engine.ingest("Nothing known yet.", "turn-1").await?;
/// assert!(report.plan.is_empty());
/// # Ok(())
/// # }
/// ```
pub fn init(
    config: config::LorekeepConfig,
    store: std::sync::Arc<dyn storage::GraphStore>,
    model: Option<std::sync::Arc<dyn extraction::NlpModel>>,
) -> Result<core::KnowledgeEngine> {
    if let Err(err) = logging::init(&config.logging) {
        eprintln!("lorekeep: logging disabled: {err}");
    }

    core::KnowledgeEngine::new(config, store, model)
}
