//! Entity resolution: mapping extracted mentions onto knowledge graph nodes.
//!
//! [`EntityResolver`] turns an [`EntityCollection`](crate::models::EntityCollection)
//! into a [`KnowledgeUpdatePlan`] without touching storage. The plan is applied
//! separately, after validation, so a caller can inspect conflicts, warnings and
//! clarification requests first.

pub mod locks;
pub mod plan;
pub mod resolver;
pub mod similarity;

pub use locks::{BucketGuard, ResolutionLocks};
pub use plan::{
    AmbiguousMatchWarning, ClarificationRequest, Conflict, EdgeCreation, EdgeMerge,
    IncompatibleRelationshipWarning, KnowledgeUpdatePlan, MatchKind, NodeCreation, NodeMerge, PlanWarning,
    UnresolvedReferenceWarning, bucket_key, node_key,
};
pub use resolver::{EntityResolver, TieBreak, entities_by_node};
pub use similarity::{NameEmbedder, SimilarityMetric, cosine_similarity, edit_similarity, levenshtein_distance};
