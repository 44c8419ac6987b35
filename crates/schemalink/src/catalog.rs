//! Entity catalog: every known entity, keyed by `(database, reference)`.
//!
//! The catalog starts empty and is filled by [`EntityCatalog::load`]. It is
//! owned by whoever feeds entities to the links (usually a
//! [`LinkManager`](crate::LinkManager)); nothing else writes to it.

use std::sync::Arc;

use indexmap::IndexMap;
use schemalink_model::{Entity, EntityKey};

#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entities: IndexMap<EntityKey, Arc<Entity>>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole catalog.
    pub fn load(&mut self, entities: impl IntoIterator<Item = Entity>) {
        self.entities = entities
            .into_iter()
            .map(|e| (e.key(), Arc::new(e)))
            .collect();
        tracing::debug!(entities = self.entities.len(), "catalog loaded");
    }

    /// Insert or replace an entity. Returns the previous version.
    pub fn upsert(&mut self, entity: Entity) -> Option<Arc<Entity>> {
        self.entities.insert(entity.key(), Arc::new(entity))
    }

    pub fn remove(&mut self, key: &EntityKey) -> Option<Arc<Entity>> {
        self.entities.shift_remove(key)
    }

    /// Entities of one database, in insertion order.
    pub fn find_by_database(&self, database: &str) -> Vec<Arc<Entity>> {
        self.entities
            .values()
            .filter(|e| e.database == database)
            .cloned()
            .collect()
    }

    pub fn find_one(&self, database: &str, reference: &str) -> Option<Arc<Entity>> {
        self.entities
            .get(&EntityKey::new(database, reference))
            .cloned()
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

    fn entity(database: &str, reference: &str) -> Entity {
        Entity::new(database, reference, reference.to_lowercase())
    }

    #[test]
    fn test_starts_empty() {
        let catalog = EntityCatalog::new();
        assert!(catalog.is_empty());
        assert!(catalog.find_by_database("main").is_empty());
    }

    #[test]
    fn test_load_replaces() {
        let mut catalog = EntityCatalog::new();
        catalog.upsert(entity("main", "Stale"));
        catalog.load([entity("main", "Order"), entity("system", "Account")]);

        assert_eq!(catalog.len(), 2);
        assert!(catalog.find_one("main", "Stale").is_none());
        assert_eq!(catalog.find_one("system", "Account").unwrap().table_name, "account");
    }

    #[test]
    fn test_same_reference_in_two_databases() {
        let mut catalog = EntityCatalog::new();
        catalog.upsert(entity("main", "Order"));
        catalog.upsert(entity("archive", "Order"));

        assert_eq!(catalog.len(), 2);
        let main: Vec<_> = catalog
            .find_by_database("main")
            .iter()
            .map(|e| e.key().to_string())
            .collect();
        assert_eq!(main, vec!["main.Order"]);
    }

    #[test]
    fn test_upsert_and_remove() {
        let mut catalog = EntityCatalog::new();
        assert!(catalog.upsert(entity("main", "Order")).is_none());

        let updated = entity("main", "Order").tag("readonly");
        let previous = catalog.upsert(updated).unwrap();
        assert!(previous.tags.is_empty());
        assert!(catalog.find_one("main", "Order").unwrap().is_readonly());

        let removed = catalog.remove(&EntityKey::new("main", "Order"));
        assert!(removed.is_some());
        assert!(catalog.is_empty());
    }
}
