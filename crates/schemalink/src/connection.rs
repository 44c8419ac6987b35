//! A database link and its association registry.
//!
//! [`Connection::associate`] registers entities, detects structural changes
//! and reconciles the database. Calls are serialized per connection; readers
//! ([`Connection::entity`], [`Connection::model`]...) only take the registry
//! read lock and are never blocked by running DDL.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use schemalink_model::Entity;
use schemalink_sql::Dialect;
use tokio::sync::{Mutex, RwLock, broadcast};

use crate::config::{LinkConfig, SyncOptions};
use crate::driver::{self, Driver};
use crate::events::LinkEvent;
use crate::model::Model;
use crate::structure::Structure;
use crate::sync::{SyncContext, SyncReport, Synchronizer};
use crate::transform::{resolve_relations, to_dialect, to_schema, to_structure};
use crate::{Error, Result};

const EVENT_CAPACITY: usize = 64;

/// Registry record of one entity.
#[derive(Debug, Clone)]
pub struct Association {
    pub entity: Arc<Entity>,
    pub structure: Structure,
    /// The database matched `structure` at the end of the last pass.
    pub in_sync: bool,
    pub model: Arc<Model>,
}

pub struct Connection {
    database: String,
    driver: Arc<dyn Driver>,
    synchronizer: Synchronizer,
    /// Serializes `associate` calls.
    sync_lock: Mutex<()>,
    registry: RwLock<IndexMap<String, Association>>,
    events: broadcast::Sender<LinkEvent>,
}

impl Connection {
    pub fn new(database: impl Into<String>, driver: Arc<dyn Driver>, options: SyncOptions) -> Self {
        let database = database.into();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            synchronizer: Synchronizer::new(&database, Arc::clone(&driver), options),
            database,
            driver,
            sync_lock: Mutex::new(()),
            registry: RwLock::new(IndexMap::new()),
            events,
        }
    }

    /// Connect with `config` and start with an empty registry.
    pub async fn open(config: &LinkConfig) -> Result<Self> {
        let driver = driver::open(config).await?;
        Ok(Self::new(&config.name, driver, config.sync.clone()))
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    /// Register or update `entities`, then reconcile the database.
    pub async fn associate(&self, entities: &[Entity]) -> Result<SyncReport> {
        self.associate_with(entities, &SyncContext::new()).await
    }

    pub async fn associate_with(&self, entities: &[Entity], ctx: &SyncContext) -> Result<SyncReport> {
        let _guard = self.sync_lock.lock().await;

        let dialect = self.dialect();
        let batch: Vec<Arc<Entity>> = entities
            .iter()
            .map(|e| Arc::new(to_dialect(e, dialect)))
            .collect();

        let (snapshot, pending) = self.register(&batch).await?;

        let expected: HashMap<&str, &Structure> = pending
            .iter()
            .map(|(reference, structure)| (reference.as_str(), structure))
            .collect();
        let references: Vec<String> = pending.iter().map(|(r, _)| r.clone()).collect();

        let report = self.synchronizer.sync(&snapshot, &references, ctx).await?;

        {
            let mut registry = self.registry.write().await;
            for reference in &report.processed {
                if let Some(association) = registry.get_mut(reference)
                    && expected.get(reference.as_str()) == Some(&&association.structure)
                {
                    association.in_sync = true;
                }
            }
        }

        // nobody listening is fine
        let _ = self.events.send(LinkEvent::Updated {
            database: self.database.clone(),
        });

        Ok(report)
    }

    /// Upsert `batch` into the registry, then recompute every structure and
    /// rewire every model.
    ///
    /// Returns the associated entities and the out-of-sync references with
    /// the structure they were planned against. Nothing is registered when an
    /// entity of the batch is invalid.
    async fn register(
        &self,
        batch: &[Arc<Entity>],
    ) -> Result<(Vec<Arc<Entity>>, Vec<(String, Structure)>)> {
        let mut registry = self.registry.write().await;

        let in_batch: HashSet<&str> = batch.iter().map(|e| e.reference.as_str()).collect();
        let mut known: Vec<Arc<Entity>> = registry
            .values()
            .filter(|a| !in_batch.contains(a.entity.reference.as_str()))
            .map(|a| Arc::clone(&a.entity))
            .collect();
        known.extend(batch.iter().cloned());

        let lookup = |reference: &str| {
            known
                .iter()
                .find(|e| e.reference == reference)
                .map(|e| &**e)
        };

        for entity in batch {
            if entity.database != self.database {
                return Err(Error::invalid(
                    &entity.reference,
                    format!(
                        "declared for database [{}], not [{}]",
                        entity.database, self.database
                    ),
                ));
            }
        }

        // a newly registered target changes the foreign keys of its sources
        let mut structures = HashMap::with_capacity(known.len());
        for entity in &known {
            let resolved = resolve_relations(entity, lookup)?;
            let structure = to_structure(&resolved, self.synchronizer.type_map())?;
            structures.insert(entity.reference.as_str(), structure);
        }

        for entity in &known {
            let Some(structure) = structures.remove(entity.reference.as_str()) else {
                continue;
            };
            match registry.get_mut(&entity.reference) {
                Some(association) => {
                    association.entity = Arc::clone(entity);
                    if association.structure != structure {
                        tracing::info!(
                            entity = %entity.reference,
                            fingerprint = %structure.fingerprint(),
                            "structure changed"
                        );
                        association.structure = structure;
                        association.in_sync = false;
                    }
                }
                None => {
                    tracing::info!(
                        entity = %entity.reference,
                        fingerprint = %structure.fingerprint(),
                        "registered"
                    );
                    registry.insert(
                        entity.reference.clone(),
                        Association {
                            model: Arc::new(Model::new(entity)),
                            entity: Arc::clone(entity),
                            structure,
                            in_sync: false,
                        },
                    );
                }
            }
        }

        // relations are wired once every target is registered
        let snapshot: Vec<Arc<Entity>> = registry.values().map(|a| Arc::clone(&a.entity)).collect();
        let lookup = |reference: &str| {
            snapshot
                .iter()
                .find(|e| e.reference == reference)
                .map(|e| &**e)
        };
        for association in registry.values_mut() {
            association.model = Arc::new(Model::bind(&association.entity, lookup));
        }

        let pending = registry
            .iter()
            .filter(|(_, a)| !a.in_sync)
            .map(|(reference, a)| (reference.clone(), a.structure.clone()))
            .collect();

        Ok((snapshot, pending))
    }

    fn not_associated(&self, reference: &str) -> Error {
        Error::NotAssociated {
            database: self.database.clone(),
            reference: reference.to_string(),
        }
    }

    async fn with_association<T>(
        &self,
        reference: &str,
        f: impl FnOnce(&Association) -> T,
    ) -> Result<T> {
        self.registry
            .read()
            .await
            .get(reference)
            .map(f)
            .ok_or_else(|| self.not_associated(reference))
    }

    /// The entity as registered, patched for the dialect.
    pub async fn entity(&self, reference: &str) -> Result<Arc<Entity>> {
        self.with_association(reference, |a| Arc::clone(&a.entity))
            .await
    }

    pub async fn model(&self, reference: &str) -> Result<Arc<Model>> {
        self.with_association(reference, |a| Arc::clone(&a.model))
            .await
    }

    pub async fn structure(&self, reference: &str) -> Result<Structure> {
        self.with_association(reference, |a| a.structure.clone())
            .await
    }

    /// Every associated entity, in registration order.
    pub async fn entities(&self) -> Vec<Arc<Entity>> {
        self.registry
            .read()
            .await
            .values()
            .map(|a| Arc::clone(&a.entity))
            .collect()
    }

    /// False for unknown references.
    pub async fn is_in_sync(&self, reference: &str) -> bool {
        self.registry
            .read()
            .await
            .get(reference)
            .is_some_and(|a| a.in_sync)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Reverse-derive entities for the tables no association covers.
    ///
    /// Tables holding a column type with no logical mapping are skipped.
    pub async fn discover(&self) -> Result<Vec<Entity>> {
        let known = self.entities().await;
        let covered: HashSet<&str> = known.iter().map(|e| e.table_name.as_str()).collect();

        let mut discovered = Vec::new();
        for table in self.driver.inspector().tables().await? {
            if covered.contains(table.as_str()) {
                continue;
            }
            let metadata = self.synchronizer.inspect(&table).await?;
            match to_schema(&self.database, &table, &metadata, self.dialect(), known.as_slice()) {
                Ok(entity) => discovered.push(entity),
                Err(Error::UnknownColumnType {
                    column, data_type, ..
                }) => tracing::warn!(
                    table = %table,
                    column = %column,
                    data_type = %data_type,
                    "table not discovered, column type has no logical mapping"
                ),
                Err(e) => return Err(e),
            }
        }
        Ok(discovered)
    }

    /// Release the pool. Later calls do nothing.
    pub async fn close(&self) {
        if self.driver.is_closed() {
            return;
        }
        tracing::info!(database = %self.database, "closing the connection pool");
        self.driver.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.driver.is_closed()
    }
}
