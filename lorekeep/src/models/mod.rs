//! Domain models: extraction-time entities and relationships, the per-text
//! `EntityCollection`, observations, and the persisted knowledge-graph records.

pub mod collection;
pub mod entity;
pub mod knowledge;
pub mod observation;
pub mod relationship;

pub use collection::{DanglingReferenceError, EntityCollection, ExtractorFailure};
pub use entity::{
    Entity, EntityType, EXTRACTORS_KEY, METHOD_AGREEMENT_KEY, Metadata, MetadataValue,
    PATTERN_MATCH_KEY, Span,
};
pub use knowledge::{KnowledgeNode, KnowledgeRelation, normalize_name};
pub use observation::{
    DEFAULT_CONTEXT_WINDOW, Observation, ObservationContext, ObservationLog, ObservationSummary,
};
pub use relationship::{Relationship, RelationshipType};

/// Errors raised when building or decoding model values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error(transparent)]
    DanglingReference(#[from] DanglingReferenceError),

    #[error("invalid span: start {start} is after end {end}")]
    InvalidSpan { start: usize, end: usize },

    #[error("duplicate entity id '{0}'")]
    DuplicateEntityId(String),

    #[error("duplicate relationship id '{0}'")]
    DuplicateRelationshipId(String),

    #[error("relationship '{relationship_id}' of type '{relationship_type}' cannot connect an entity to itself")]
    SelfLoop {
        relationship_id: String,
        relationship_type: RelationshipType,
    },

    #[error("unknown entity type '{0}'")]
    UnknownEntityType(String),
}
