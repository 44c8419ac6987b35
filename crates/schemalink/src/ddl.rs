//! Structural changes and their DDL.
//!
//! A [`Change`] is dialect-neutral; [`Change::to_sql`] renders it for one
//! engine. Tables (and PostgreSQL indexes) are always created with
//! `IF NOT EXISTS` so a retried pass never fails on an object an earlier,
//! interrupted pass already created.

use schemalink_model::{DefaultValue, Field, FieldType, Length};
use schemalink_sql::{Dialect, quote_list};

use crate::Result;
use crate::plan::Phase;
use crate::types::{ColumnType, TypeMap};

/// How the database fills a column when no value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoGenerate {
    /// Identity / auto-increment integer.
    Increment,
    /// Random UUID.
    Uuid,
}

/// Column definition used by `CREATE TABLE` and `ADD COLUMN`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unsigned: bool,
    /// MySQL integer display width.
    pub display_width: Option<u32>,
    pub primary: bool,
    pub auto: Option<AutoGenerate>,
    pub default: Option<DefaultValue>,
    /// Values enforced by a CHECK constraint (PostgreSQL enum fallback).
    pub check_values: Vec<String>,
}

impl ColumnDef {
    /// Build the definition of `field`.
    ///
    /// `with_key` is false when adding a column to an existing table: primary
    /// key changes are never applied to live tables, so the column is added as
    /// a plain one.
    pub fn from_field(field: &Field, type_map: &TypeMap, with_key: bool) -> Result<Self> {
        let dialect = type_map.dialect();
        let column_type = type_map.resolve(field)?;

        let auto = match field.field_type {
            _ if !with_key || !field.is_auto_generated() => None,
            FieldType::Uuid => Some(AutoGenerate::Uuid),
            _ => Some(AutoGenerate::Increment),
        };

        let display_width = match (dialect, field.field_type, field.type_params.length) {
            (Dialect::MySql, FieldType::Integer, Some(Length::Fixed(n))) => Some(n),
            _ => None,
        };

        let check_values = if dialect == Dialect::Postgres && column_type == ColumnType::Text {
            field.type_params.values.clone()
        } else {
            Vec::new()
        };

        Ok(Self {
            name: field.column_name.clone(),
            nullable: field.is_nullable() && !field.is_primary(),
            unsigned: dialect == Dialect::MySql && field.type_params.unsigned && field.is_number(),
            display_width,
            primary: with_key && field.is_primary(),
            auto,
            default: field.default_value.clone(),
            check_values,
            column_type,
        })
    }

    /// Render the column definition.
    ///
    /// `inline_key` adds `PRIMARY KEY` to the column itself (single-column keys).
    pub fn to_sql(&self, table: &str, dialect: Dialect, inline_key: bool) -> String {
        let mut def = format!("{} ", dialect.quote(&self.name));

        match (self.display_width, &self.column_type) {
            (Some(width), ColumnType::Integer) => def.push_str(&format!("int({})", width)),
            _ => def.push_str(&self.column_type.to_sql(dialect)),
        }
        if self.unsigned {
            def.push_str(" unsigned");
        }

        if !self.nullable && !(self.primary && inline_key) {
            def.push_str(" NOT NULL");
        }

        match self.auto {
            Some(AutoGenerate::Increment) if dialect == Dialect::Postgres => {
                def.push_str(" GENERATED BY DEFAULT AS IDENTITY")
            }
            Some(AutoGenerate::Increment) => def.push_str(" AUTO_INCREMENT"),
            Some(AutoGenerate::Uuid) if dialect == Dialect::Postgres => {
                def.push_str(" DEFAULT gen_random_uuid()")
            }
            Some(AutoGenerate::Uuid) => def.push_str(" DEFAULT (uuid())"),
            None => {
                if let Some(default) = &self.default {
                    let value = default_sql(default, dialect);
                    // MySQL only accepts expression defaults on text, blob and json columns
                    if dialect == Dialect::MySql && self.column_type.is_blob_like() {
                        def.push_str(&format!(" DEFAULT ({})", value));
                    } else {
                        def.push_str(&format!(" DEFAULT {}", value));
                    }
                }
            }
        }

        if self.primary && inline_key {
            def.push_str(" PRIMARY KEY");
        }

        if !self.check_values.is_empty() {
            let values: Vec<_> = self.check_values.iter().map(|v| dialect.literal(v)).collect();
            def.push_str(&format!(
                " CONSTRAINT {} CHECK ({} IN ({}))",
                dialect.quote(&schemalink_sql::check_name(dialect, table, &self.name)),
                dialect.quote(&self.name),
                values.join(", ")
            ));
        }

        def
    }
}

/// Render a typed default value as a SQL literal.
pub fn default_sql(value: &DefaultValue, dialect: Dialect) -> String {
    match value {
        DefaultValue::Null => "NULL".into(),
        DefaultValue::Bool(b) => match (dialect, b) {
            (Dialect::Postgres, true) => "true".into(),
            (Dialect::Postgres, false) => "false".into(),
            (Dialect::MySql, true) => "1".into(),
            (Dialect::MySql, false) => "0".into(),
        },
        DefaultValue::Int(n) => n.to_string(),
        DefaultValue::Float(n) => n.to_string(),
        DefaultValue::Text(s) | DefaultValue::Json(s) => dialect.literal(s),
    }
}

/// A table to create.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Generate the `CREATE TABLE` statement.
    ///
    /// Foreign keys are not included; they are added in the foreign phase once
    /// every table exists.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let pk_columns: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.primary)
            .map(|c| c.name.as_str())
            .collect();
        let inline_key = pk_columns.len() == 1;

        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.to_sql(&self.name, dialect, inline_key)))
            .collect();

        if pk_columns.len() > 1 {
            parts.push(format!("    PRIMARY KEY ({})", quote_list(dialect, &pk_columns)));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
            dialect.quote(&self.name),
            parts.join(",\n")
        )
    }
}

/// A foreign key to add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub name: String,
    pub column: String,
    pub target_table: String,
    pub target_column: String,
}

/// A single structural change to one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    CreateTable(TableDef),
    AddColumn(ColumnDef),
    AddIndex { name: String, columns: Vec<String> },
    AddUnique { name: String, columns: Vec<String> },
    AddForeignKey(ForeignKeyDef),
    DropForeignKey { name: String, column: String },
    DropUnique { name: String, columns: Vec<String> },
    DropIndex { name: String, columns: Vec<String> },
    DropColumn(String),
}

impl Change {
    /// The phase this change runs in.
    pub fn phase(&self) -> Phase {
        match self {
            Change::CreateTable(_) | Change::AddColumn(_) => Phase::Create,
            Change::AddIndex { .. } | Change::AddUnique { .. } => Phase::Constraint,
            Change::AddForeignKey(_) | Change::DropForeignKey { .. } => Phase::Foreign,
            Change::DropUnique { .. } | Change::DropIndex { .. } | Change::DropColumn(_) => {
                Phase::Drop
            }
        }
    }

    /// Generate the SQL statement for this change on `table`.
    pub fn to_sql(&self, table: &str, dialect: Dialect) -> String {
        let t = dialect.quote(table);
        match self {
            Change::CreateTable(def) => def.to_sql(dialect),
            Change::AddColumn(col) => {
                format!("ALTER TABLE {} ADD COLUMN {};", t, col.to_sql(table, dialect, false))
            }
            // MySQL has no IF NOT EXISTS for indexes
            Change::AddIndex { name, columns } => format!(
                "CREATE INDEX {}{} ON {} ({});",
                if dialect == Dialect::Postgres { "IF NOT EXISTS " } else { "" },
                dialect.quote(name),
                t,
                quote_list(dialect, columns)
            ),
            Change::AddUnique { name, columns } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({});",
                t,
                dialect.quote(name),
                quote_list(dialect, columns)
            ),
            Change::AddForeignKey(fk) => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({});",
                t,
                dialect.quote(&fk.name),
                dialect.quote(&fk.column),
                dialect.quote(&fk.target_table),
                dialect.quote(&fk.target_column)
            ),
            Change::DropForeignKey { name, .. } => match dialect {
                Dialect::Postgres => {
                    format!("ALTER TABLE {} DROP CONSTRAINT {};", t, dialect.quote(name))
                }
                Dialect::MySql => {
                    format!("ALTER TABLE {} DROP FOREIGN KEY {};", t, dialect.quote(name))
                }
            },
            Change::DropUnique { name, .. } => match dialect {
                Dialect::Postgres => {
                    format!("ALTER TABLE {} DROP CONSTRAINT {};", t, dialect.quote(name))
                }
                Dialect::MySql => format!("ALTER TABLE {} DROP INDEX {};", t, dialect.quote(name)),
            },
            Change::DropIndex { name, .. } => match dialect {
                Dialect::Postgres => format!("DROP INDEX IF EXISTS {};", dialect.quote(name)),
                Dialect::MySql => format!("ALTER TABLE {} DROP INDEX {};", t, dialect.quote(name)),
            },
            Change::DropColumn(name) => {
                format!("ALTER TABLE {} DROP COLUMN {};", t, dialect.quote(name))
            }
        }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::CreateTable(def) => write!(f, "+ table {}", def.name),
            Change::AddColumn(col) => {
                let nullable = if col.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", col.name, col.column_type, nullable)
            }
            Change::AddIndex { name, columns } => {
                write!(f, "+ INDEX {} ({})", name, columns.join(", "))
            }
            Change::AddUnique { name, columns } => {
                write!(f, "+ UNIQUE {} ({})", name, columns.join(", "))
            }
            Change::AddForeignKey(fk) => write!(
                f,
                "+ FOREIGN KEY ({}) -> {}.{}",
                fk.column, fk.target_table, fk.target_column
            ),
            Change::DropForeignKey { name, column } => {
                write!(f, "- FOREIGN KEY {} ({})", name, column)
            }
            Change::DropUnique { name, columns } => {
                write!(f, "- UNIQUE {} ({})", name, columns.join(", "))
            }
            Change::DropIndex { name, columns } => {
                write!(f, "- INDEX {} ({})", name, columns.join(", "))
            }
            Change::DropColumn(name) => write!(f, "- {}", name),
        }
    }
}

#[cfg(test)]
mod tests;
