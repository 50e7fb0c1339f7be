//! Entity descriptor registry

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{EntityDescriptor, SchemaError};

/// Read-only map of entity name to descriptor.
///
/// Populated once at startup; afterwards shared behind an `Arc` and only
/// ever read.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<&'static str, Arc<EntityDescriptor>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from descriptors, rejecting duplicate names
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = EntityDescriptor>,
    ) -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, descriptor: EntityDescriptor) -> Result<(), SchemaError> {
        let name = descriptor.name;
        if self.entities.contains_key(name) {
            return Err(SchemaError::DuplicateEntity { entity: name });
        }
        self.entities.insert(name, Arc::new(descriptor));
        Ok(())
    }

    /// Look up a descriptor by entity name
    pub fn describe(&self, name: &str) -> Result<&Arc<EntityDescriptor>, SchemaError> {
        self.entities.get(name).ok_or_else(|| SchemaError::NotFound {
            entity: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entities.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityDescriptor>> + '_ {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;
    use assert_matches::assert_matches;

    fn sessions() -> EntityDescriptor {
        EntityDescriptor::builder("Sessions")
            .field(FieldDef::string("id"))
            .field(FieldDef::int("access").nullable())
            .field(FieldDef::string("data").nullable())
            .identity(&["id"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_describe() {
        let registry = EntityRegistry::from_descriptors([sessions()]).unwrap();
        assert_eq!(registry.describe("Sessions").unwrap().identity, vec!["id"]);
        assert_matches!(
            registry.describe("Nope"),
            Err(SchemaError::NotFound { entity }) if entity == "Nope"
        );
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let err = EntityRegistry::from_descriptors([sessions(), sessions()]).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateEntity { entity: "Sessions" });
    }
}
