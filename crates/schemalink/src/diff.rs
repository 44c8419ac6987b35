//! Structure diffing: compare a declared entity with the live table.
//!
//! Additive changes and drops are planned as [`Change`]s. In-place alterations
//! (type, nullability, unsignedness, enum values, primary key) are never
//! applied; they are reported as [`Drift`] and need a manual migration. So is
//! a missing NOT NULL column without a default, which existing rows could not
//! satisfy.

use std::collections::HashSet;
use std::fmt;

use schemalink_model::Entity;
use schemalink_sql::{index_name, unique_name};

use crate::ddl::{ColumnDef, ForeignKeyDef, TableDef};
use crate::structure::{ForeignKeyStructure, Structure};
use crate::transform::TableMetadata;
use crate::types::{ColumnType, TypeMap};
use crate::{Change, Error, Result};

/// A difference that is deliberately left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftKind {
    Type {
        declared: ColumnType,
        actual: ColumnType,
    },
    Nullability {
        declared: bool,
        actual: bool,
    },
    Unsigned {
        declared: bool,
        actual: bool,
    },
    EnumValues {
        declared: Vec<String>,
        actual: Vec<String>,
    },
    PrimaryKey {
        declared: Vec<String>,
        actual: Vec<String>,
    },
    /// Declared NOT NULL without a default, absent from the table.
    MissingColumn,
}

/// Declared and physical structure disagree on something that is not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub table: String,
    /// `None` for table-level drift (primary key).
    pub column: Option<String>,
    pub kind: DriftKind,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{}.{}: ", self.table, column)?,
            None => write!(f, "{}: ", self.table)?,
        }
        match &self.kind {
            DriftKind::Type { declared, actual } => {
                write!(f, "type is {}, declared {}", actual, declared)
            }
            DriftKind::Nullability { declared, actual } => {
                let word = |nullable: bool| if nullable { "NULL" } else { "NOT NULL" };
                write!(f, "is {}, declared {}", word(*actual), word(*declared))
            }
            DriftKind::Unsigned { declared, .. } => {
                let word = if *declared { "unsigned" } else { "signed" };
                write!(f, "signedness differs, declared {}", word)
            }
            DriftKind::EnumValues { declared, actual } => write!(
                f,
                "values are [{}], declared [{}]",
                actual.join(", "),
                declared.join(", ")
            ),
            DriftKind::PrimaryKey { declared, actual } => write!(
                f,
                "primary key is ({}), declared ({})",
                actual.join(", "),
                declared.join(", ")
            ),
            DriftKind::MissingColumn => {
                write!(f, "missing, NOT NULL without a default cannot be added")
            }
        }
    }
}

/// Changes for a single table.
#[derive(Debug, Clone, Default)]
pub struct TableDiff {
    pub table: String,
    pub changes: Vec<Change>,
    pub drift: Vec<Drift>,
}

impl TableDiff {
    /// True when the table needs no DDL. Drift does not count.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

fn foreign_key_def<'a>(
    entity: &Entity,
    fk: &ForeignKeyStructure,
    type_map: &TypeMap,
    lookup: &impl Fn(&str) -> Option<&'a Entity>,
) -> Result<ForeignKeyDef> {
    let target = lookup(&fk.target).ok_or_else(|| {
        Error::invalid(
            &entity.reference,
            format!("foreign key target [{}] is not associated", fk.target),
        )
    })?;
    let remote = target.get_field(&fk.remote_field).ok_or_else(|| {
        Error::invalid(
            &entity.reference,
            format!("unknown field '{}' of [{}]", fk.remote_field, fk.target),
        )
    })?;

    Ok(ForeignKeyDef {
        name: schemalink_sql::foreign_key_name(type_map.dialect(), &entity.table_name, &fk.column),
        column: fk.column.clone(),
        target_table: target.table_name.clone(),
        target_column: remote.column_name.clone(),
    })
}

/// Changes that create `entity`'s table from nothing.
///
/// `declared` is the structure of the resolved entity. Foreign keys only name
/// their target; the foreign phase runs after every table exists.
pub fn create_changes<'a>(
    entity: &Entity,
    declared: &Structure,
    type_map: &TypeMap,
    lookup: impl Fn(&str) -> Option<&'a Entity>,
) -> Result<Vec<Change>> {
    let dialect = type_map.dialect();
    let table = &entity.table_name;

    let columns = entity
        .fields
        .iter()
        .map(|f| ColumnDef::from_field(f, type_map, true))
        .collect::<Result<Vec<_>>>()?;
    let mut changes = vec![Change::CreateTable(TableDef {
        name: table.clone(),
        columns,
    })];

    for column in &declared.indexes {
        let columns = vec![column.clone()];
        changes.push(Change::AddIndex {
            name: index_name(dialect, table, &columns),
            columns,
        });
    }

    for columns in &declared.uniques {
        changes.push(Change::AddUnique {
            name: unique_name(dialect, table, columns),
            columns: columns.clone(),
        });
    }

    for fk in &declared.foreign_keys {
        changes.push(Change::AddForeignKey(foreign_key_def(
            entity, fk, type_map, &lookup,
        )?));
    }

    Ok(changes)
}

/// Compare the declared structure of `entity` with the live table.
///
/// `actual` is the structure of the reverse-derived entity and `metadata` the
/// introspected table it came from; constraint names for drops are taken from
/// it. Within each phase the order is: drop foreign keys before adding them,
/// drop uniques and indexes before dropping columns. Constraints on a column
/// reported as missing are left out.
pub fn diff_table<'a>(
    entity: &Entity,
    declared: &Structure,
    actual: &Structure,
    metadata: &TableMetadata,
    type_map: &TypeMap,
    lookup: impl Fn(&str) -> Option<&'a Entity>,
) -> Result<TableDiff> {
    let dialect = type_map.dialect();
    let table = entity.table_name.clone();
    let mut changes = Vec::new();
    let mut drift = Vec::new();

    // Columns to add
    let mut missing = HashSet::new();
    for name in declared.columns.keys() {
        if actual.columns.contains_key(name) {
            continue;
        }
        let field = entity.field_by_column(name).ok_or_else(|| {
            Error::invalid(&entity.reference, format!("no field for column '{}'", name))
        })?;
        let column = ColumnDef::from_field(field, type_map, false)?;
        if !column.nullable && column.default.is_none() {
            missing.insert(name.as_str());
            drift.push(Drift {
                table: table.clone(),
                column: Some(name.clone()),
                kind: DriftKind::MissingColumn,
            });
            continue;
        }
        changes.push(Change::AddColumn(column));
    }

    // Columns in both - report what we won't touch
    for (name, want) in &declared.columns {
        let Some(have) = actual.columns.get(name) else {
            continue;
        };
        let column = Some(name.clone());
        let mut report = |kind| {
            drift.push(Drift {
                table: table.clone(),
                column: column.clone(),
                kind,
            })
        };

        if want.column_type != have.column_type {
            report(DriftKind::Type {
                declared: want.column_type.clone(),
                actual: have.column_type.clone(),
            });
        }
        if want.nullable != have.nullable {
            report(DriftKind::Nullability {
                declared: want.nullable,
                actual: have.nullable,
            });
        }
        if want.unsigned != have.unsigned {
            report(DriftKind::Unsigned {
                declared: want.unsigned,
                actual: have.unsigned,
            });
        }
        if want.check_values != have.check_values {
            report(DriftKind::EnumValues {
                declared: want.check_values.clone(),
                actual: have.check_values.clone(),
            });
        }
    }

    if declared.primary_key != actual.primary_key {
        drift.push(Drift {
            table: table.clone(),
            column: None,
            kind: DriftKind::PrimaryKey {
                declared: declared.primary_key.clone(),
                actual: actual.primary_key.clone(),
            },
        });
    }

    // Uniques
    for columns in declared.uniques.difference(&actual.uniques) {
        if columns.iter().any(|c| missing.contains(c.as_str())) {
            continue;
        }
        changes.push(Change::AddUnique {
            name: unique_name(dialect, &table, columns),
            columns: columns.clone(),
        });
    }
    for columns in actual.uniques.difference(&declared.uniques) {
        let existing = metadata.uniques.iter().find(|u| {
            let mut sorted = u.columns.clone();
            sorted.sort();
            &sorted == columns
        });
        if let Some(existing) = existing {
            changes.push(Change::DropUnique {
                name: existing.name.clone(),
                columns: existing.columns.clone(),
            });
        }
    }

    // Indexes: the ones backing a foreign key stay
    for column in declared.indexes.difference(&actual.indexes) {
        if missing.contains(column.as_str()) {
            continue;
        }
        let columns = vec![column.clone()];
        changes.push(Change::AddIndex {
            name: index_name(dialect, &table, &columns),
            columns,
        });
    }
    let referencing: HashSet<&str> = declared
        .foreign_keys
        .iter()
        .map(|fk| fk.column.as_str())
        .collect();
    for index in &metadata.indexes {
        let [column] = index.columns.as_slice() else {
            continue;
        };
        if declared.indexes.contains(column) || referencing.contains(column.as_str()) {
            continue;
        }
        changes.push(Change::DropIndex {
            name: index.name.clone(),
            columns: index.columns.clone(),
        });
    }

    // Foreign keys: detach first
    for fk in actual.foreign_keys.difference(&declared.foreign_keys) {
        if let Some(existing) = metadata.foreign_keys.iter().find(|f| f.column == fk.column) {
            changes.push(Change::DropForeignKey {
                name: existing.name.clone(),
                column: existing.column.clone(),
            });
        }
    }
    for fk in declared.foreign_keys.difference(&actual.foreign_keys) {
        if missing.contains(fk.column.as_str()) {
            continue;
        }
        changes.push(Change::AddForeignKey(foreign_key_def(
            entity, fk, type_map, &lookup,
        )?));
    }

    // Columns to drop
    for name in actual.columns.keys() {
        if !declared.columns.contains_key(name) {
            changes.push(Change::DropColumn(name.clone()));
        }
    }

    Ok(TableDiff {
        table,
        changes,
        drift,
    })
}
