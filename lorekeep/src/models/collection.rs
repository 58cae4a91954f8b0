//! The per-text unit of extraction output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ModelError;
use super::entity::{Entity, EntityType};
use super::relationship::{Relationship, RelationshipType};

/// Raised when a relationship references an entity id missing from its collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("relationship '{relationship_id}' references unknown entity '{missing_entity_id}'")]
pub struct DanglingReferenceError {
    pub relationship_id: String,
    pub missing_entity_id: String,
}

/// Diagnostic recorded when one extractor fails during a composite run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("extractor '{extractor}' failed: {reason}")]
pub struct ExtractorFailure {
    pub extractor: String,
    pub reason: String,
}

impl ExtractorFailure {
    pub fn new(extractor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            extractor: extractor.into(),
            reason: reason.into(),
        }
    }
}

/// Entities and relationships extracted from one text.
///
/// Entities keep first-detected order. An id index gives O(1) lookup, and every
/// relationship's endpoints are guaranteed to be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawCollection")]
pub struct EntityCollection {
    pub source_id: String,
    pub text: String,
    pub extracted_at: DateTime<Utc>,
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    failures: Vec<ExtractorFailure>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl PartialEq for EntityCollection {
    fn eq(&self, other: &Self) -> bool {
        self.source_id == other.source_id
            && self.text == other.text
            && self.extracted_at == other.extracted_at
            && self.entities == other.entities
            && self.relationships == other.relationships
            && self.failures == other.failures
    }
}

impl EntityCollection {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_timestamp(source_id, text, Utc::now())
    }

    pub fn with_timestamp(
        source_id: impl Into<String>,
        text: impl Into<String>,
        extracted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            extracted_at,
            entities: Vec::new(),
            relationships: Vec::new(),
            failures: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add an entity, assigning the next `eN` id when the entity has none.
    ///
    /// Returns the entity's id. Duplicate ids are rejected.
    pub fn add_entity(&mut self, mut entity: Entity) -> Result<String, ModelError> {
        if entity.id.is_empty() {
            entity.id = self.next_id('e', self.entities.len(), |c, id| c.index.contains_key(id));
        } else if self.index.contains_key(&entity.id) {
            return Err(ModelError::DuplicateEntityId(entity.id));
        }
        let id = entity.id.clone();
        self.index.insert(id.clone(), self.entities.len());
        self.entities.push(entity);
        Ok(id)
    }

    /// Add a relationship whose endpoints are already in this collection.
    ///
    /// Assigns the next `rN` id when the relationship has none.
    pub fn add_relationship(&mut self, mut relationship: Relationship) -> Result<String, ModelError> {
        if relationship.id.is_empty() {
            relationship.id = self.next_id('r', self.relationships.len(), |c, id| {
                c.relationships.iter().any(|r| r.id == id)
            });
        } else if self.relationships.iter().any(|r| r.id == relationship.id) {
            return Err(ModelError::DuplicateRelationshipId(relationship.id));
        }

        for endpoint in [&relationship.source, &relationship.target] {
            if !self.index.contains_key(endpoint) {
                return Err(DanglingReferenceError {
                    relationship_id: relationship.id.clone(),
                    missing_entity_id: endpoint.clone(),
                }
                .into());
            }
        }

        if relationship.is_self_loop() && !relationship.relationship_type.allows_reflexive() {
            return Err(ModelError::SelfLoop {
                relationship_id: relationship.id,
                relationship_type: relationship.relationship_type,
            });
        }

        let id = relationship.id.clone();
        self.relationships.push(relationship);
        Ok(id)
    }

    pub fn record_failure(&mut self, failure: ExtractorFailure) {
        self.failures.push(failure);
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn failures(&self) -> &[ExtractorFailure] {
        &self.failures
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn get_entity(&self, id: &str) -> Option<&Entity> {
        self.index.get(id).map(|&position| &self.entities[position])
    }

    /// Position of an entity in first-detected order.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn entities_of_type(&self, entity_type: EntityType) -> impl Iterator<Item = &Entity> {
        self.entities
            .iter()
            .filter(move |e| e.entity_type == entity_type)
    }

    pub fn relationships_of_type<'a>(
        &'a self,
        relationship_type: &'a RelationshipType,
    ) -> impl Iterator<Item = &'a Relationship> {
        self.relationships
            .iter()
            .filter(move |r| &r.relationship_type == relationship_type)
    }

    /// Relationships in which the entity appears at either end.
    pub fn relationships_for<'a>(&'a self, entity_id: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.relationships
            .iter()
            .filter(move |r| r.source == entity_id || r.target == entity_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub(crate) fn entities_mut(&mut self) -> &mut [Entity] {
        &mut self.entities
    }

    pub(crate) fn relationships_mut(&mut self) -> &mut [Relationship] {
        &mut self.relationships
    }

    pub(crate) fn into_parts(self) -> (Vec<Entity>, Vec<Relationship>, Vec<ExtractorFailure>) {
        (self.entities, self.relationships, self.failures)
    }

    fn next_id(&self, prefix: char, start: usize, taken: impl Fn(&Self, &str) -> bool) -> String {
        let mut n = start + 1;
        loop {
            let candidate = format!("{}{}", prefix, n);
            if !taken(self, &candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Wire shape of a collection; converting it re-checks every invariant.
#[derive(Deserialize)]
struct RawCollection {
    source_id: String,
    text: String,
    extracted_at: DateTime<Utc>,
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default)]
    relationships: Vec<Relationship>,
    #[serde(default)]
    failures: Vec<ExtractorFailure>,
}

impl TryFrom<RawCollection> for EntityCollection {
    type Error = ModelError;

    fn try_from(raw: RawCollection) -> Result<Self, Self::Error> {
        let mut collection = EntityCollection::with_timestamp(raw.source_id, raw.text, raw.extracted_at);
        for entity in raw.entities {
            collection.add_entity(entity)?;
        }
        for relationship in raw.relationships {
            collection.add_relationship(relationship)?;
        }
        collection.failures = raw.failures;
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EntityCollection {
        let mut collection = EntityCollection::new("turn-1", "Omar uses Python daily");
        collection
            .add_entity(Entity::new("Omar", EntityType::Person, 0, 4, 0.8, "model").unwrap())
            .unwrap();
        collection
            .add_entity(Entity::new("Python", EntityType::Technology, 10, 16, 0.9, "gazetteer").unwrap())
            .unwrap();
        collection
    }

    #[test]
    fn test_ids_assigned_in_order() {
        let collection = sample();
        let ids: Vec<_> = collection.entities().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        assert_eq!(collection.get_entity("e2").unwrap().name, "Python");
    }

    #[test]
    fn test_dangling_relationship_rejected() {
        let mut collection = sample();
        let err = collection
            .add_relationship(Relationship::new("e1", "e9", RelationshipType::Uses, 0.7, "model"))
            .unwrap_err();
        match err {
            ModelError::DanglingReference(e) => {
                assert_eq!(e.relationship_id, "r1");
                assert_eq!(e.missing_entity_id, "e9");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(collection.relationships().is_empty());
    }

    #[test]
    fn test_self_loop_rejected_for_builtin_types() {
        let mut collection = sample();
        assert!(
            collection
                .add_relationship(Relationship::new("e1", "e1", RelationshipType::Has, 0.5, "x"))
                .is_err()
        );
        assert!(
            collection
                .add_relationship(Relationship::new(
                    "e1",
                    "e1",
                    RelationshipType::Custom("mentorsSelf".into()),
                    0.5,
                    "x"
                ))
                .is_ok()
        );
    }

    #[test]
    fn test_duplicate_entity_id_rejected() {
        let mut collection = sample();
        let mut entity = Entity::new("Rust", EntityType::Technology, 0, 4, 0.9, "x").unwrap();
        entity.id = "e1".to_string();
        assert!(matches!(
            collection.add_entity(entity),
            Err(ModelError::DuplicateEntityId(_))
        ));
    }

    #[test]
    fn test_json_round_trip_rebuilds_index() {
        let mut collection = sample();
        collection
            .add_relationship(Relationship::new("e1", "e2", RelationshipType::Uses, 0.7, "model"))
            .unwrap();
        let json = serde_json::to_string(&collection).unwrap();
        let restored: EntityCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, collection);
        assert_eq!(restored.get_entity("e1").unwrap().name, "Omar");
    }

    #[test]
    fn test_deserializing_dangling_relationship_fails() {
        let json = serde_json::json!({
            "source_id": "s",
            "text": "Omar",
            "extracted_at": "2026-01-01T00:00:00Z",
            "entities": [],
            "relationships": [{
                "id": "r1", "source": "e1", "target": "e2",
                "relationship_type": "uses", "confidence": 0.5, "extractor": "x"
            }]
        });
        assert!(serde_json::from_value::<EntityCollection>(json).is_err());
    }

    #[test]
    fn test_queries() {
        let mut collection = sample();
        collection
            .add_relationship(Relationship::new("e1", "e2", RelationshipType::Uses, 0.7, "model"))
            .unwrap();
        assert_eq!(collection.entities_of_type(EntityType::Person).count(), 1);
        assert_eq!(collection.relationships_for("e2").count(), 1);
        assert_eq!(collection.relationships_of_type(&RelationshipType::Has).count(), 0);
        assert_eq!(collection.failure_count(), 0);
    }
}
