//! The synchronizer: reconcile a live database with its associated entities.
//!
//! One pass:
//!
//! 1. order the out-of-sync entities by their foreign keys (cycles allowed);
//! 2. plan each table: create it when missing, otherwise introspect it,
//!    reverse-derive its structure and diff;
//! 3. validate the plan against a virtual copy of the live schema;
//! 4. execute phase by phase. Inside a phase, tables run concurrently and the
//!    steps of one table run in order. The foreign phase runs one table at a
//!    time: adding a foreign key locks the referenced table too, and two
//!    tables referencing each other would lock in opposite order.
//!
//! Nothing is executed until every table is planned, so entity errors
//! (unsupported types, invalid relations) never leave a half-applied pass.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use schemalink_model::{Entity, Relation, RelationKind};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::SyncOptions;
use crate::diff::{Drift, create_changes, diff_table};
use crate::driver::Driver;
use crate::graph::DependencyGraph;
use crate::plan::{ChangeStep, Phase, Plan, VirtualSchema};
use crate::transform::{TableMetadata, resolve_relations, to_schema, to_structure};
use crate::types::TypeMap;
use crate::{Error, Result};

/// Cancellation and deadline for one pass. Checked between phases only.
#[derive(Debug, Clone, Default)]
pub struct SyncContext {
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl SyncContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Outcome of a pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Executed steps per phase.
    pub phases: BTreeMap<Phase, usize>,
    /// Executed steps, phase by phase, tables in plan order.
    pub executed: Vec<ChangeStep>,
    pub drift: Vec<Drift>,
    /// References of the entities this pass covered, readonly ones included.
    pub processed: Vec<String>,
}

impl SyncReport {
    /// True when no DDL ran.
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty()
    }

    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.executed.iter().map(|s| s.sql.as_str())
    }
}

pub struct Synchronizer {
    database: String,
    driver: Arc<dyn Driver>,
    type_map: TypeMap,
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(database: impl Into<String>, driver: Arc<dyn Driver>, options: SyncOptions) -> Self {
        Self {
            database: database.into(),
            type_map: TypeMap::new(driver.dialect()),
            driver,
            options,
        }
    }

    pub fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    /// Reconcile the tables of `pending` with the database.
    ///
    /// `entities` is every entity associated with the connection, already
    /// patched for the dialect; it resolves relation targets and reverse
    /// names. `pending` lists the references to process.
    pub async fn sync(
        &self,
        entities: &[Arc<Entity>],
        pending: &[String],
        ctx: &SyncContext,
    ) -> Result<SyncReport> {
        if pending.is_empty() {
            return Ok(SyncReport::default());
        }
        let span = tracing::info_span!("sync", database = %self.database);
        self.run(entities, pending, ctx).instrument(span).await
    }

    async fn run(
        &self,
        entities: &[Arc<Entity>],
        pending: &[String],
        ctx: &SyncContext,
    ) -> Result<SyncReport> {
        let lookup = |reference: &str| {
            entities
                .iter()
                .find(|e| e.reference == reference)
                .map(|e| &**e)
        };

        let mut graph = DependencyGraph::new();
        for reference in pending {
            graph.add_node(reference.clone());
        }
        for reference in pending {
            if let Some(entity) = lookup(reference) {
                for target in entity.belongs_to_targets() {
                    graph.add_dependency(reference, target);
                }
            }
        }
        for cycle in graph.cycles() {
            tracing::warn!(
                entities = %cycle.join(" → "),
                "circular foreign keys, constraints are added after every table exists"
            );
        }

        ctx.check()?;
        let existing: HashSet<String> = self.driver.inspector().tables().await?.into_iter().collect();
        let mut schema = VirtualSchema::from_existing(existing.iter().cloned());

        let mut report = SyncReport::default();
        let mut steps = Vec::new();

        for reference in graph.overall_order() {
            let entity = lookup(reference).ok_or_else(|| Error::NotAssociated {
                database: self.database.clone(),
                reference: reference.to_string(),
            })?;
            report.processed.push(reference.to_string());

            if entity.is_readonly() {
                tracing::debug!(entity = %reference, "readonly, skipped");
                continue;
            }

            for relation in &entity.relations {
                if relation.kind == RelationKind::BelongsToMany {
                    self.check_join_entity(entity, relation, &lookup)?;
                }
            }

            let resolved = resolve_relations(entity, lookup)?;
            let declared = to_structure(&resolved, &self.type_map)?;
            let table = &resolved.table_name;

            let changes = if existing.contains(table) {
                let metadata = self.inspect(table).await?;
                schema.with_columns(table, metadata.columns.iter().map(|c| c.name.clone()));

                let reverse = to_schema(
                    &self.database,
                    table,
                    &metadata,
                    self.type_map.dialect(),
                    entities,
                )?;
                let actual = to_structure(&reverse, &self.type_map)?;
                let diff = diff_table(
                    &resolved,
                    &declared,
                    &actual,
                    &metadata,
                    &self.type_map,
                    lookup,
                )?;
                for drift in &diff.drift {
                    tracing::warn!(%drift, "structure drift, manual migration required");
                }
                report.drift.extend(diff.drift);
                diff.changes
            } else {
                create_changes(&resolved, &declared, &self.type_map, lookup)?
            };

            tracing::debug!(
                entity = %reference,
                table = %table,
                changes = changes.len(),
                fingerprint = %declared.fingerprint(),
                "planned"
            );
            steps.extend(
                changes
                    .into_iter()
                    .map(|c| ChangeStep::new(table.as_str(), c, self.type_map.dialect())),
            );
        }

        let plan = Plan::new(steps);
        plan.validate(schema)?;
        if plan.is_empty() {
            tracing::info!(entities = report.processed.len(), "up to date");
            return Ok(report);
        }
        tracing::info!(steps = plan.len(), "plan validated");

        for phase in Phase::ALL {
            ctx.check()?;
            let groups = plan.by_table(phase);
            if groups.is_empty() {
                continue;
            }
            let count: usize = groups.values().map(Vec::len).sum();
            tracing::info!("phase {}: {} step(s)", phase, count);

            let executed = self.run_phase(phase, groups.into_values().collect()).await?;
            report.phases.insert(phase, executed.len());
            report.executed.extend(executed);
        }

        Ok(report)
    }

    fn check_join_entity<'a>(
        &self,
        entity: &Entity,
        relation: &Relation,
        lookup: &impl Fn(&str) -> Option<&'a Entity>,
    ) -> Result<()> {
        let Some(through) = &relation.through else {
            return Err(Error::Unsupported {
                dialect: self.type_map.dialect(),
                what: format!(
                    "relation '{}' of [{}] without a join entity",
                    relation.name, entity.reference
                ),
            });
        };
        let join = lookup(through).ok_or_else(|| {
            Error::invalid(
                &entity.reference,
                format!(
                    "join entity [{}] of relation '{}' is not associated",
                    through, relation.name
                ),
            )
        })?;

        let targets: HashSet<&str> = join.belongs_to_targets().collect();
        if !targets.contains(entity.reference.as_str()) || !targets.contains(relation.target.as_str())
        {
            return Err(Error::invalid(
                &entity.reference,
                format!(
                    "join entity [{}] must belong to both [{}] and [{}]",
                    through, entity.reference, relation.target
                ),
            ));
        }
        Ok(())
    }

    pub(crate) async fn inspect(&self, table: &str) -> Result<TableMetadata> {
        let inspector = self.driver.inspector();
        let columns = inspector.columns(table).await?;
        let foreign_keys = inspector.foreign_keys(table).await?;
        let uniques = inspector.uniques(table).await?;
        let indexes = inspector.indexes(table).await?;
        let enumerators = inspector.enumerators(table, &columns).await?;
        Ok(TableMetadata {
            columns,
            foreign_keys,
            uniques,
            indexes,
            enumerators,
        })
    }

    /// Tables of `phase` allowed to run at the same time.
    fn concurrency(&self, phase: Phase) -> usize {
        match phase {
            Phase::Foreign => 1,
            _ => self.options.phase_concurrency.max(1),
        }
    }

    /// Run one phase. Every table group runs to completion even when another
    /// fails; the first failure is returned afterwards.
    async fn run_phase(
        &self,
        phase: Phase,
        groups: Vec<Vec<&ChangeStep>>,
    ) -> Result<Vec<ChangeStep>> {
        let concurrency = self.concurrency(phase);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut outcomes = Vec::with_capacity(groups.len());

        if concurrency == 1 {
            for (index, group) in groups.iter().enumerate() {
                let steps: Vec<ChangeStep> = group.iter().map(|s| (*s).clone()).collect();
                let driver = Arc::clone(&self.driver);
                let outcome = run_group(driver, Arc::clone(&semaphore), phase, steps).await;
                outcomes.push((index, outcome));
            }
        } else {
            let mut tasks = JoinSet::new();
            for (index, group) in groups.iter().enumerate() {
                let steps: Vec<ChangeStep> = group.iter().map(|s| (*s).clone()).collect();
                let driver = Arc::clone(&self.driver);
                let semaphore = Arc::clone(&semaphore);
                tasks.spawn(
                    async move { (index, run_group(driver, semaphore, phase, steps).await) }
                        .in_current_span(),
                );
            }
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(_) => return Err(Error::Cancelled),
                }
            }
        }

        let mut results: Vec<Option<Vec<ChangeStep>>> = vec![None; groups.len()];
        let mut failure = None;
        for (index, outcome) in outcomes {
            match outcome {
                Ok(done) => results[index] = Some(done),
                Err((done, err)) => {
                    results[index] = Some(done);
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        Ok(results.into_iter().flatten().flatten().collect())
    }
}

/// Steps that ran, and the error that stopped the group.
type GroupOutcome = std::result::Result<Vec<ChangeStep>, (Vec<ChangeStep>, Error)>;

async fn run_group(
    driver: Arc<dyn Driver>,
    semaphore: Arc<Semaphore>,
    phase: Phase,
    steps: Vec<ChangeStep>,
) -> GroupOutcome {
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return Err((Vec::new(), Error::Cancelled));
    };

    let mut done = Vec::with_capacity(steps.len());
    for step in steps {
        tracing::debug!(%step, "executing");
        if let Err(source) = driver.execute(&step).await {
            let err = Error::Ddl {
                phase,
                table: step.table.clone(),
                sql: step.sql.clone(),
                source,
            };
            return Err((done, err));
        }
        done.push(step);
    }
    Ok(done)
}
