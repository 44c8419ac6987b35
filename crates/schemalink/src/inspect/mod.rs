//! Live database introspection.
//!
//! An [`Inspector`] reads the physical structure of the connected database:
//! tables, columns, foreign keys, unique constraints, secondary indexes and
//! enum value sets.
//! Each dialect answers with its own catalog queries.

use std::future::Future;
use std::pin::Pin;

use crate::Result;

mod mysql;
mod postgres;

pub use mysql::MySqlInspector;
pub use postgres::PostgresInspector;

/// Boxed future returned by the object-safe driver traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An introspected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Dialect type string (`format_type` on PostgreSQL, `COLUMN_TYPE` on MySQL).
    pub data_type: String,
    pub nullable: bool,
    pub is_primary: bool,
    /// Default expression as rendered by the engine.
    pub default: Option<String>,
}

/// An introspected single-column foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    /// Constraint name.
    pub name: String,
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

/// A unique constraint, grouped by constraint name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueInfo {
    pub name: String,
    pub columns: Vec<String>,
}

/// A plain secondary index: not unique, not primary, columns only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
}

/// Permitted values of an enum-like column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumColumn {
    pub column: String,
    pub values: Vec<String>,
}

/// Reads the live structure of a database.
pub trait Inspector: Send + Sync {
    /// Base tables in the current schema / database.
    fn tables(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    fn columns<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<ColumnInfo>>>;

    fn foreign_keys<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<ForeignKeyInfo>>>;

    fn uniques<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<UniqueInfo>>>;

    /// Secondary indexes the engine did not create on its own.
    fn indexes<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<IndexInfo>>>;

    /// Enum value sets of the given columns. Columns without one are omitted.
    fn enumerators<'a>(
        &'a self,
        table: &'a str,
        columns: &'a [ColumnInfo],
    ) -> BoxFuture<'a, Result<Vec<EnumColumn>>>;
}

/// Group `(constraint, column)` rows into [`UniqueInfo`]s, keeping first-seen order.
pub(crate) fn group_uniques(rows: impl IntoIterator<Item = (String, String)>) -> Vec<UniqueInfo> {
    let mut uniques: Vec<UniqueInfo> = Vec::new();
    for (name, column) in rows {
        match uniques.iter_mut().find(|u| u.name == name) {
            Some(unique) => unique.columns.push(column),
            None => uniques.push(UniqueInfo {
                name,
                columns: vec![column],
            }),
        }
    }
    uniques
}

/// Same grouping for `(index, column)` rows.
pub(crate) fn group_indexes(rows: impl IntoIterator<Item = (String, String)>) -> Vec<IndexInfo> {
    group_uniques(rows)
        .into_iter()
        .map(|u| IndexInfo {
            name: u.name,
            columns: u.columns,
        })
        .collect()
}

/// Parse a MySQL `enum('a','b')` column type into its values.
pub fn parse_mysql_enum(column_type: &str) -> Option<Vec<String>> {
    let trimmed = column_type.trim();
    if !trimmed.to_ascii_lowercase().starts_with("enum(") {
        return None;
    }
    Some(schemalink_sql::string_literals(trimmed))
}

/// Extract the permitted values from a PostgreSQL CHECK definition.
///
/// Only `IN (...)` style checks qualify. PostgreSQL renders them as
/// `= ANY (ARRAY[...])`, or as a plain equality when the list has one value.
pub fn parse_check_values(definition: &str) -> Option<Vec<String>> {
    let values = schemalink_sql::string_literals(definition);
    let in_list = definition.contains("ANY (ARRAY[");
    let single = values.len() == 1 && is_single_equality(definition);
    ((in_list || single) && !values.is_empty()).then_some(values)
}

/// `CHECK ((column = 'value'::type))`
fn is_single_equality(definition: &str) -> bool {
    let Some(body) = definition
        .trim()
        .strip_prefix("CHECK ((")
        .and_then(|b| b.strip_suffix("))"))
    else {
        return false;
    };
    let Some((column, value)) = body.split_once(" = ") else {
        return false;
    };
    let plain_column = column.starts_with('"') || !column.contains(' ');
    plain_column && value.starts_with('\'') && !value.contains(" AND ") && !value.contains(" OR ")
}
