//! Plan validation.
//!
//! A [`KnowledgeUpdatePlan`] is checked against the graph before anything is
//! written. The first violated rule rejects the whole plan.

mod rules;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::Result;
use crate::config::ValidationConfig;
use crate::models::EntityType;
use crate::resolution::KnowledgeUpdatePlan;
use crate::storage::GraphView;

/// The check a rejected plan failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    DuplicateId,
    MergeTargetMissing,
    MissingProperty,
    ConfidenceOutOfRange,
    DanglingEdge,
    TypeIncompatible,
    SelfLoop,
}

impl ValidationRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationRule::DuplicateId => "duplicate_id",
            ValidationRule::MergeTargetMissing => "merge_target_missing",
            ValidationRule::MissingProperty => "missing_property",
            ValidationRule::ConfidenceOutOfRange => "confidence_out_of_range",
            ValidationRule::DanglingEdge => "dangling_edge",
            ValidationRule::TypeIncompatible => "type_incompatible",
            ValidationRule::SelfLoop => "self_loop",
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plan failed validation and must not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Invalid plan ({rule}) at {element_id}: {message}")]
pub struct InvalidPlanError {
    pub rule: ValidationRule,
    /// Id of the node, edge or observation owner that violated the rule
    pub element_id: String,
    pub message: String,
}

impl InvalidPlanError {
    pub fn new(rule: ValidationRule, element_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule,
            element_id: element_id.into(),
            message: message.into(),
        }
    }
}

/// Checks plans against integrity rules before they are applied.
#[derive(Debug, Clone, Default)]
pub struct PlanValidator {
    required_properties: BTreeMap<EntityType, Vec<String>>,
}

impl PlanValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            required_properties: config.required_properties.clone(),
        }
    }

    /// Run every rule in order; the first failure rejects the plan.
    pub async fn validate(&self, plan: &KnowledgeUpdatePlan, view: &dyn GraphView) -> Result<()> {
        let outcome = self.check(plan, view).await;
        match &outcome {
            Ok(()) => tracing::debug!(source_id = %plan.source_id, "Plan passed validation"),
            Err(err) => tracing::warn!(
                source_id = %plan.source_id,
                rule = %err.rule,
                element_id = %err.element_id,
                "Plan rejected: {}",
                err.message
            ),
        }
        outcome.map_err(Into::into)
    }

    async fn check(&self, plan: &KnowledgeUpdatePlan, view: &dyn GraphView) -> std::result::Result<(), InvalidPlanError> {
        rules::unique_ids(plan, view).await?;
        let merge_types = rules::merge_targets_exist(plan, view).await?;
        rules::required_properties(plan, &self.required_properties)?;
        rules::confidence_ranges(plan)?;
        let endpoint_types = rules::referential_integrity(plan, view, &merge_types).await?;
        rules::edge_merge_targets_exist(plan, view).await?;
        rules::type_compatibility(plan, &endpoint_types)?;
        rules::self_loops(plan)?;
        Ok(())
    }
}
