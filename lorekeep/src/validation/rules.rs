use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use super::{InvalidPlanError, ValidationRule};
use crate::models::{EntityType, Observation};
use crate::resolution::KnowledgeUpdatePlan;
use crate::storage::GraphView;

type RuleResult<T = ()> = Result<T, InvalidPlanError>;

fn storage_failure(element_id: impl ToString, err: crate::storage::StorageError) -> InvalidPlanError {
    InvalidPlanError::new(
        ValidationRule::DanglingEdge,
        element_id.to_string(),
        format!("graph lookup failed: {err}"),
    )
}

/// No id appears twice in the plan, and nothing created already exists.
pub(super) async fn unique_ids(plan: &KnowledgeUpdatePlan, view: &dyn GraphView) -> RuleResult {
    let mut seen = HashSet::new();
    let node_ids = plan
        .node_creations
        .iter()
        .map(|c| c.node_id)
        .chain(plan.node_merges.iter().map(|m| m.node_id));
    for id in node_ids {
        if !seen.insert(id) {
            return Err(InvalidPlanError::new(
                ValidationRule::DuplicateId,
                id.to_string(),
                "node id appears more than once in the plan",
            ));
        }
    }

    let mut seen = HashSet::new();
    let edge_ids = plan
        .edge_creations
        .iter()
        .map(|c| c.edge_id)
        .chain(plan.edge_merges.iter().map(|m| m.edge_id));
    for id in edge_ids {
        if !seen.insert(id) {
            return Err(InvalidPlanError::new(
                ValidationRule::DuplicateId,
                id.to_string(),
                "edge id appears more than once in the plan",
            ));
        }
    }

    for creation in &plan.node_creations {
        let existing = view
            .get_node(&creation.node_id)
            .await
            .map_err(|e| storage_failure(creation.node_id, e))?;
        if existing.is_some() {
            return Err(InvalidPlanError::new(
                ValidationRule::DuplicateId,
                creation.node_id.to_string(),
                format!("node '{}' already exists in the graph", creation.name),
            ));
        }
    }
    for creation in &plan.edge_creations {
        let existing = view
            .get_edge(&creation.edge_id)
            .await
            .map_err(|e| storage_failure(creation.edge_id, e))?;
        if existing.is_some() {
            return Err(InvalidPlanError::new(
                ValidationRule::DuplicateId,
                creation.edge_id.to_string(),
                "edge already exists in the graph",
            ));
        }
    }
    Ok(())
}

/// Every merged node exists. Returns the stored type of each merge target.
pub(super) async fn merge_targets_exist(
    plan: &KnowledgeUpdatePlan,
    view: &dyn GraphView,
) -> RuleResult<HashMap<Uuid, EntityType>> {
    let mut types = HashMap::new();
    for merge in &plan.node_merges {
        let node = view
            .get_node(&merge.node_id)
            .await
            .map_err(|e| storage_failure(merge.node_id, e))?
            .ok_or_else(|| {
                InvalidPlanError::new(
                    ValidationRule::MergeTargetMissing,
                    merge.node_id.to_string(),
                    "merge target node does not exist",
                )
            })?;
        if node.node_type != merge.node_type {
            return Err(InvalidPlanError::new(
                ValidationRule::TypeIncompatible,
                merge.node_id.to_string(),
                format!("merge of a {} into a {} node", merge.node_type, node.node_type),
            ));
        }
        types.insert(node.id, node.node_type);
    }
    Ok(types)
}

/// New nodes carry a non-blank name and every property their type requires.
pub(super) fn required_properties(
    plan: &KnowledgeUpdatePlan,
    required: &BTreeMap<EntityType, Vec<String>>,
) -> RuleResult {
    for creation in &plan.node_creations {
        if creation.name.trim().is_empty() {
            return Err(InvalidPlanError::new(
                ValidationRule::MissingProperty,
                creation.node_id.to_string(),
                "required property 'name' is blank",
            ));
        }
        for key in required.get(&creation.node_type).into_iter().flatten() {
            if key != "name" && !creation.properties.contains_key(key) {
                return Err(InvalidPlanError::new(
                    ValidationRule::MissingProperty,
                    creation.node_id.to_string(),
                    format!("{} node is missing required property '{key}'", creation.node_type),
                ));
            }
        }
    }
    Ok(())
}

fn check_unit(value: f32, element_id: impl ToString, what: &str) -> RuleResult {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(InvalidPlanError::new(
            ValidationRule::ConfidenceOutOfRange,
            element_id.to_string(),
            format!("{what} confidence {value} is outside [0, 1]"),
        ))
    }
}

fn check_observations(observations: &[Observation], owner: Uuid) -> RuleResult {
    observations
        .iter()
        .try_for_each(|o| check_unit(o.confidence, owner, "observation"))
}

pub(super) fn confidence_ranges(plan: &KnowledgeUpdatePlan) -> RuleResult {
    for creation in &plan.node_creations {
        check_unit(creation.confidence, creation.node_id, "node")?;
        check_observations(&creation.observations, creation.node_id)?;
    }
    for merge in &plan.node_merges {
        check_unit(merge.score, merge.node_id, "match")?;
        check_observations(&merge.observations, merge.node_id)?;
    }
    for creation in &plan.edge_creations {
        check_unit(creation.confidence, creation.edge_id, "edge")?;
        check_observations(&creation.observations, creation.edge_id)?;
    }
    for merge in &plan.edge_merges {
        check_observations(&merge.observations, merge.edge_id)?;
    }
    Ok(())
}

/// Every edge endpoint is created by the plan or already stored.
///
/// Returns the type of every endpoint for the compatibility check.
pub(super) async fn referential_integrity(
    plan: &KnowledgeUpdatePlan,
    view: &dyn GraphView,
    merge_types: &HashMap<Uuid, EntityType>,
) -> RuleResult<HashMap<Uuid, EntityType>> {
    let mut types: HashMap<Uuid, EntityType> = plan
        .node_creations
        .iter()
        .map(|c| (c.node_id, c.node_type))
        .collect();
    types.extend(merge_types.iter().map(|(id, t)| (*id, *t)));

    for edge in &plan.edge_creations {
        for endpoint in [edge.source, edge.target] {
            if types.contains_key(&endpoint) {
                continue;
            }
            let node = view
                .get_node(&endpoint)
                .await
                .map_err(|e| storage_failure(edge.edge_id, e))?
                .ok_or_else(|| {
                    InvalidPlanError::new(
                        ValidationRule::DanglingEdge,
                        edge.edge_id.to_string(),
                        format!("endpoint {endpoint} is neither created by the plan nor stored"),
                    )
                })?;
            types.insert(endpoint, node.node_type);
        }
    }
    Ok(types)
}

pub(super) async fn edge_merge_targets_exist(plan: &KnowledgeUpdatePlan, view: &dyn GraphView) -> RuleResult {
    for merge in &plan.edge_merges {
        let edge = view
            .get_edge(&merge.edge_id)
            .await
            .map_err(|e| storage_failure(merge.edge_id, e))?;
        if edge.is_none() {
            return Err(InvalidPlanError::new(
                ValidationRule::MergeTargetMissing,
                merge.edge_id.to_string(),
                "merge target edge does not exist",
            ));
        }
    }
    Ok(())
}

pub(super) fn type_compatibility(plan: &KnowledgeUpdatePlan, types: &HashMap<Uuid, EntityType>) -> RuleResult {
    for edge in &plan.edge_creations {
        let (Some(source), Some(target)) = (types.get(&edge.source), types.get(&edge.target)) else {
            continue;
        };
        if !edge.relationship_type.accepts(*source, *target) {
            return Err(InvalidPlanError::new(
                ValidationRule::TypeIncompatible,
                edge.edge_id.to_string(),
                format!("{} cannot link a {source} to a {target}", edge.relationship_type),
            ));
        }
    }
    Ok(())
}

pub(super) fn self_loops(plan: &KnowledgeUpdatePlan) -> RuleResult {
    match plan
        .edge_creations
        .iter()
        .find(|e| e.source == e.target && !e.relationship_type.allows_reflexive())
    {
        Some(edge) => Err(InvalidPlanError::new(
            ValidationRule::SelfLoop,
            edge.edge_id.to_string(),
            format!("{} edge may not point at its own source", edge.relationship_type),
        )),
        None => Ok(()),
    }
}
