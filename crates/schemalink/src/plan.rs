//! Phased change plans.
//!
//! Every change belongs to one [`Phase`]; phases run in a fixed global order
//! so that destructive work never happens before dependents are detached:
//!
//! ```text
//! backup → copy → create → constraint → foreign → drop
//! ```
//!
//! Before anything runs, the plan is simulated against a [`VirtualSchema`] of
//! the live database. A failed simulation means the planner produced an
//! impossible ordering, for example a foreign key to a table that is neither
//! present nor created earlier.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use schemalink_sql::Dialect;
use thiserror::Error;

use crate::ddl::Change;

/// DDL stage. Ordering follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Backup,
    Copy,
    Create,
    Constraint,
    Foreign,
    Drop,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Backup,
        Phase::Copy,
        Phase::Create,
        Phase::Constraint,
        Phase::Foreign,
        Phase::Drop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Backup => "backup",
            Phase::Copy => "copy",
            Phase::Create => "create",
            Phase::Constraint => "constraint",
            Phase::Foreign => "foreign",
            Phase::Drop => "drop",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One change with its table and rendered SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeStep {
    pub phase: Phase,
    pub table: String,
    pub change: Change,
    pub sql: String,
}

impl ChangeStep {
    pub fn new(table: impl Into<String>, change: Change, dialect: Dialect) -> Self {
        let table = table.into();
        Self {
            phase: change.phase(),
            sql: change.to_sql(&table, dialect),
            table,
            change,
        }
    }
}

impl fmt::Display for ChangeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.change)
    }
}

/// Error when a plan cannot be executed in order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("{change}: table '{table}' does not exist")]
    TableNotFound { change: String, table: String },

    #[error("{change}: table '{table}' already exists")]
    TableAlreadyExists { change: String, table: String },

    #[error("{change}: column '{table}.{column}' already exists")]
    ColumnAlreadyExists {
        change: String,
        table: String,
        column: String,
    },

    #[error("{change}: column '{table}.{column}' does not exist")]
    ColumnNotFound {
        change: String,
        table: String,
        column: String,
    },

    #[error("{change}: foreign key from '{source_table}' references non-existent table '{target_table}'")]
    ForeignKeyTargetNotFound {
        change: String,
        source_table: String,
        target_table: String,
    },
}

#[derive(Debug, Clone, Default)]
struct VirtualTable {
    /// `None` when the table exists but its columns were not inspected.
    columns: Option<HashSet<String>>,
}

impl VirtualTable {
    fn has_column(&self, column: &str) -> Option<bool> {
        self.columns.as_ref().map(|c| c.contains(column))
    }
}

/// Simulated database state used to validate a plan.
#[derive(Debug, Clone, Default)]
pub struct VirtualSchema {
    tables: HashMap<String, VirtualTable>,
}

impl VirtualSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables known to exist, columns unknown.
    pub fn from_existing<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables
                .into_iter()
                .map(|t| (t.into(), VirtualTable::default()))
                .collect(),
        }
    }

    /// Record the inspected columns of an existing table.
    pub fn with_columns<I, S>(&mut self, table: &str, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables.insert(
            table.to_string(),
            VirtualTable {
                columns: Some(columns.into_iter().map(Into::into).collect()),
            },
        );
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn require_table(&self, step: &ChangeStep) -> Result<&VirtualTable, PlanError> {
        self.tables
            .get(&step.table)
            .ok_or_else(|| PlanError::TableNotFound {
                change: step.to_string(),
                table: step.table.clone(),
            })
    }

    fn require_column(&self, step: &ChangeStep, column: &str) -> Result<(), PlanError> {
        match self.require_table(step)?.has_column(column) {
            Some(false) => Err(PlanError::ColumnNotFound {
                change: step.to_string(),
                table: step.table.clone(),
                column: column.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Apply a step to the virtual schema, validating preconditions.
    pub fn apply(&mut self, step: &ChangeStep) -> Result<(), PlanError> {
        match &step.change {
            Change::CreateTable(def) => {
                if self.table_exists(&def.name) {
                    return Err(PlanError::TableAlreadyExists {
                        change: step.to_string(),
                        table: def.name.clone(),
                    });
                }
                self.tables.insert(
                    def.name.clone(),
                    VirtualTable {
                        columns: Some(def.columns.iter().map(|c| c.name.clone()).collect()),
                    },
                );
            }

            Change::AddColumn(col) => {
                if self.require_table(step)?.has_column(&col.name) == Some(true) {
                    return Err(PlanError::ColumnAlreadyExists {
                        change: step.to_string(),
                        table: step.table.clone(),
                        column: col.name.clone(),
                    });
                }
                if let Some(columns) = self
                    .tables
                    .get_mut(&step.table)
                    .and_then(|t| t.columns.as_mut())
                {
                    columns.insert(col.name.clone());
                }
            }

            Change::AddIndex { columns, .. } | Change::AddUnique { columns, .. } => {
                for column in columns {
                    self.require_column(step, column)?;
                }
            }

            Change::AddForeignKey(fk) => {
                self.require_column(step, &fk.column)?;
                let Some(target) = self.tables.get(&fk.target_table) else {
                    return Err(PlanError::ForeignKeyTargetNotFound {
                        change: step.to_string(),
                        source_table: step.table.clone(),
                        target_table: fk.target_table.clone(),
                    });
                };
                if target.has_column(&fk.target_column) == Some(false) {
                    return Err(PlanError::ColumnNotFound {
                        change: step.to_string(),
                        table: fk.target_table.clone(),
                        column: fk.target_column.clone(),
                    });
                }
            }

            Change::DropForeignKey { .. }
            | Change::DropUnique { .. }
            | Change::DropIndex { .. } => {
                self.require_table(step)?;
            }

            Change::DropColumn(name) => {
                self.require_column(step, name)?;
                if let Some(columns) = self
                    .tables
                    .get_mut(&step.table)
                    .and_then(|t| t.columns.as_mut())
                {
                    columns.remove(name);
                }
            }
        }

        Ok(())
    }
}

/// An ordered set of change steps.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<ChangeStep>,
}

impl Plan {
    /// Order steps by phase. The sort is stable, so steps of one table keep
    /// the order they were planned in.
    pub fn new(mut steps: Vec<ChangeStep>) -> Self {
        steps.sort_by_key(|s| s.phase);
        Self { steps }
    }

    pub fn steps(&self) -> &[ChangeStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Steps of one phase, grouped by table in first-seen order.
    pub fn by_table(&self, phase: Phase) -> IndexMap<&str, Vec<&ChangeStep>> {
        let mut groups: IndexMap<&str, Vec<&ChangeStep>> = IndexMap::new();
        for step in self.steps.iter().filter(|s| s.phase == phase) {
            groups.entry(step.table.as_str()).or_default().push(step);
        }
        groups
    }

    /// Simulate the whole plan against `schema`.
    pub fn validate(&self, mut schema: VirtualSchema) -> Result<(), PlanError> {
        for step in &self.steps {
            schema.apply(step)?;
        }
        Ok(())
    }
}
