//! Canonical, comparison-ready projection of an entity.
//!
//! Two entities are structurally equal iff their [`Structure`]s are equal.
//! Everything is kept in sorted collections so declaration order never
//! matters. Default values are not part of a structure; of the secondary
//! indexes only the single-column ones declared by INDEX tags are.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::types::ColumnType;

/// One column of a [`Structure`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnStructure {
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unsigned: bool,
    /// Permitted values enforced by a CHECK constraint (PostgreSQL enum fallback).
    pub check_values: Vec<String>,
}

/// A foreign key from a local column to a field of another entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForeignKeyStructure {
    /// Local column name.
    pub column: String,
    /// Reference of the target entity.
    pub target: String,
    /// Reference of the target field.
    pub remote_field: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Structure {
    pub table: String,
    pub columns: BTreeMap<String, ColumnStructure>,
    /// Primary key columns, sorted.
    pub primary_key: Vec<String>,
    /// Each unique constraint as a sorted column list.
    pub uniques: BTreeSet<Vec<String>>,
    /// Columns carrying a plain single-column index.
    pub indexes: BTreeSet<String>,
    pub foreign_keys: BTreeSet<ForeignKeyStructure>,
}

impl Structure {
    /// Stable short hash of the structure, used to correlate log lines.
    pub fn fingerprint(&self) -> String {
        let mut canonical = String::new();
        let _ = writeln!(canonical, "table {}", self.table);
        for (name, column) in &self.columns {
            let _ = writeln!(
                canonical,
                "column {} {} null={} unsigned={} check={}",
                name,
                column.column_type,
                column.nullable,
                column.unsigned,
                column.check_values.join("|")
            );
        }
        let _ = writeln!(canonical, "pk {}", self.primary_key.join(","));
        for unique in &self.uniques {
            let _ = writeln!(canonical, "unique {}", unique.join(","));
        }
        for column in &self.indexes {
            let _ = writeln!(canonical, "index {}", column);
        }
        for fk in &self.foreign_keys {
            let _ = writeln!(canonical, "fk {} {}.{}", fk.column, fk.target, fk.remote_field);
        }

        let hex = blake3::hash(canonical.as_bytes()).to_hex().to_string();
        hex[..12].to_string()
    }
}
