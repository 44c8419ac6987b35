//! Link manager.
//!
//! Owns the named connections and the [`EntityCatalog`] that feeds them, and
//! routes entity changes to the connection of the entity's database.

use std::sync::Arc;

use indexmap::IndexMap;
use schemalink_model::Entity;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::catalog::EntityCatalog;
use crate::config::LinkConfig;
use crate::connection::Connection;
use crate::sync::SyncReport;
use crate::{Error, Result};

#[derive(Default)]
pub struct LinkManager {
    links: RwLock<IndexMap<String, Arc<Connection>>>,
    catalog: RwLock<EntityCatalog>,
}

impl LinkManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: EntityCatalog) -> Self {
        Self {
            links: RwLock::default(),
            catalog: RwLock::new(catalog),
        }
    }

    /// Replace the catalog contents. Connections are not touched until the
    /// next association.
    pub async fn load(&self, entities: impl IntoIterator<Item = Entity>) {
        self.catalog.write().await.load(entities);
    }

    /// Open a link and associate the catalog entities of its database.
    #[instrument(skip(self, config), fields(database = %config.name))]
    pub async fn connect(&self, config: &LinkConfig) -> Result<Arc<Connection>> {
        let connection = Connection::open(config).await?;
        self.add(connection).await
    }

    /// Register an opened connection and associate its catalog entities.
    /// A link with the same name is closed and replaced.
    pub async fn add(&self, connection: Connection) -> Result<Arc<Connection>> {
        let connection = Arc::new(connection);
        let entities = self.catalog_entities(connection.database()).await;
        if !entities.is_empty() {
            connection.associate(&entities).await?;
        }

        let previous = self
            .links
            .write()
            .await
            .insert(connection.database().to_string(), Arc::clone(&connection));
        if let Some(previous) = previous {
            tracing::info!(database = %previous.database(), "replacing link");
            previous.close().await;
        }
        Ok(connection)
    }

    pub async fn find(&self, name: &str) -> Result<Arc<Connection>> {
        self.links
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::LinkNotFound(name.to_string()))
    }

    pub async fn names(&self) -> Vec<String> {
        self.links.read().await.keys().cloned().collect()
    }

    async fn catalog_entities(&self, database: &str) -> Vec<Entity> {
        self.catalog
            .read()
            .await
            .find_by_database(database)
            .iter()
            .map(|e| Entity::clone(e))
            .collect()
    }

    /// Record `entities` in the catalog and associate them with their link.
    #[instrument(skip(self, entities), fields(entities = entities.len()))]
    pub async fn associate(&self, database: &str, entities: &[Entity]) -> Result<SyncReport> {
        let link = self.find(database).await?;
        {
            let mut catalog = self.catalog.write().await;
            for entity in entities {
                catalog.upsert(entity.clone());
            }
        }
        link.associate(entities).await
    }

    /// An entity was created or updated: record it and re-associate the
    /// whole entity set of its database.
    #[instrument(skip(self, entity), fields(database = %entity.database, entity = %entity.reference))]
    pub async fn entity_changed(&self, entity: Entity) -> Result<SyncReport> {
        tracing::info!("entity changed");
        let link = self.find(&entity.database).await?;
        let database = entity.database.clone();
        self.catalog.write().await.upsert(entity);

        let entities = self.catalog_entities(&database).await;
        link.associate(&entities).await
    }

    /// Reverse-derive entities for the tables of `database` that no
    /// association covers.
    pub async fn discover(&self, database: &str) -> Result<Vec<Entity>> {
        let link = self.find(database).await?;
        let discovered = link.discover().await?;
        tracing::info!(database, tables = discovered.len(), "discovered tables");
        Ok(discovered)
    }

    /// Close and forget one link.
    pub async fn close(&self, name: &str) -> Result<()> {
        let link = self
            .links
            .write()
            .await
            .shift_remove(name)
            .ok_or_else(|| Error::LinkNotFound(name.to_string()))?;
        link.close().await;
        tracing::info!(database = name, "link closed");
        Ok(())
    }

    pub async fn close_all(&self) {
        let links: Vec<_> = self.links.write().await.drain(..).collect();
        for (_, link) in links {
            link.close().await;
        }
    }
}
