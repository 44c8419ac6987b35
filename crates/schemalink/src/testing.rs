//! In-memory driver for synchronizer and connection tests.

use std::future::ready;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use schemalink_sql::Dialect;

use crate::ddl::{Change, ColumnDef};
use crate::driver::{Driver, Executor};
use crate::error::BackendError;
use crate::inspect::{
    BoxFuture, ColumnInfo, EnumColumn, ForeignKeyInfo, IndexInfo, Inspector, UniqueInfo,
};
use crate::plan::ChangeStep;
use crate::types::ColumnType;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub uniques: Vec<UniqueInfo>,
    pub indexes: Vec<IndexInfo>,
    pub checks: Vec<EnumColumn>,
}

/// Applies change steps to an in-memory catalog and answers introspection
/// from it, the way a real engine would.
pub struct MemoryDriver {
    dialect: Dialect,
    tables: Mutex<IndexMap<String, MemoryTable>>,
    executed: Mutex<Vec<ChangeStep>>,
    fail_on: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl MemoryDriver {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: Mutex::new(IndexMap::new()),
            executed: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Make every statement against `table` fail.
    pub fn fail_on(&self, table: &str) {
        *self.fail_on.lock().unwrap() = Some(table.to_string());
    }

    pub fn heal(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    pub fn insert_table(&self, name: &str, table: MemoryTable) {
        self.tables.lock().unwrap().insert(name.to_string(), table);
    }

    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    pub fn executed(&self) -> Vec<ChangeStep> {
        self.executed.lock().unwrap().clone()
    }

    pub fn clear_executed(&self) {
        self.executed.lock().unwrap().clear();
    }

    fn column_info(&self, col: &ColumnDef) -> ColumnInfo {
        let mut data_type = match (col.display_width, &col.column_type) {
            (Some(width), ColumnType::Integer) => format!("int({})", width),
            (_, ty) => ty.to_sql(self.dialect),
        };
        if col.unsigned {
            data_type.push_str(" unsigned");
        }
        ColumnInfo {
            name: col.name.clone(),
            data_type,
            nullable: col.nullable,
            is_primary: col.primary,
            default: None,
        }
    }

    fn apply(&self, step: &ChangeStep) -> std::result::Result<(), BackendError> {
        if self.fail_on.lock().unwrap().as_deref() == Some(step.table.as_str()) {
            return Err(BackendError::Other(format!("injected failure on {}", step.table)));
        }

        let mut tables = self.tables.lock().unwrap();
        if let Change::CreateTable(def) = &step.change {
            if !tables.contains_key(&def.name) {
                let table = MemoryTable {
                    columns: def.columns.iter().map(|c| self.column_info(c)).collect(),
                    checks: def
                        .columns
                        .iter()
                        .filter(|c| !c.check_values.is_empty())
                        .map(|c| EnumColumn {
                            column: c.name.clone(),
                            values: c.check_values.clone(),
                        })
                        .collect(),
                    ..MemoryTable::default()
                };
                tables.insert(def.name.clone(), table);
            }
            return Ok(());
        }

        let table = tables
            .get_mut(&step.table)
            .ok_or_else(|| BackendError::Other(format!("table {} does not exist", step.table)))?;

        match &step.change {
            Change::CreateTable(_) => {}
            Change::AddIndex { name, columns } => {
                if !table.indexes.iter().any(|i| &i.name == name) {
                    table.indexes.push(IndexInfo {
                        name: name.clone(),
                        columns: columns.clone(),
                    });
                }
            }
            Change::AddColumn(col) => {
                table.columns.push(self.column_info(col));
                if !col.check_values.is_empty() {
                    table.checks.push(EnumColumn {
                        column: col.name.clone(),
                        values: col.check_values.clone(),
                    });
                }
            }
            Change::AddUnique { name, columns } => table.uniques.push(UniqueInfo {
                name: name.clone(),
                columns: columns.clone(),
            }),
            Change::AddForeignKey(fk) => table.foreign_keys.push(ForeignKeyInfo {
                name: fk.name.clone(),
                column: fk.column.clone(),
                foreign_table: fk.target_table.clone(),
                foreign_column: fk.target_column.clone(),
            }),
            Change::DropForeignKey { name, .. } => table.foreign_keys.retain(|f| &f.name != name),
            Change::DropUnique { name, .. } => table.uniques.retain(|u| &u.name != name),
            Change::DropIndex { name, .. } => table.indexes.retain(|i| &i.name != name),
            Change::DropColumn(name) => {
                table.columns.retain(|c| &c.name != name);
                table.checks.retain(|c| &c.column != name);
                table.uniques.retain(|u| !u.columns.contains(name));
                table.indexes.retain(|i| !i.columns.contains(name));
                table.foreign_keys.retain(|f| &f.column != name);
            }
        }
        Ok(())
    }

    fn get<T>(&self, name: &str, f: impl FnOnce(&MemoryTable) -> T) -> Result<T> {
        self.tables
            .lock()
            .unwrap()
            .get(name)
            .map(f)
            .ok_or_else(|| Error::Introspection {
                table: name.to_string(),
                source: BackendError::Other("no such table".into()),
            })
    }
}

impl Inspector for MemoryDriver {
    fn tables(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        let names = self.tables.lock().unwrap().keys().cloned().collect();
        Box::pin(ready(Ok(names)))
    }

    fn columns<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<ColumnInfo>>> {
        Box::pin(ready(self.get(table, |t| t.columns.clone())))
    }

    fn foreign_keys<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<ForeignKeyInfo>>> {
        Box::pin(ready(self.get(table, |t| t.foreign_keys.clone())))
    }

    fn uniques<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<UniqueInfo>>> {
        Box::pin(ready(self.get(table, |t| t.uniques.clone())))
    }

    fn indexes<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Vec<IndexInfo>>> {
        Box::pin(ready(self.get(table, |t| t.indexes.clone())))
    }

    fn enumerators<'a>(
        &'a self,
        table: &'a str,
        _columns: &'a [ColumnInfo],
    ) -> BoxFuture<'a, Result<Vec<EnumColumn>>> {
        Box::pin(ready(self.get(table, |t| t.checks.clone())))
    }
}

impl Executor for MemoryDriver {
    fn execute<'a>(
        &'a self,
        step: &'a ChangeStep,
    ) -> BoxFuture<'a, std::result::Result<(), BackendError>> {
        let result = self.apply(step);
        if result.is_ok() {
            self.executed.lock().unwrap().push(step.clone());
        }
        Box::pin(ready(result))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.closed.store(true, Ordering::SeqCst);
        Box::pin(ready(()))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Driver for MemoryDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn inspector(&self) -> &dyn Inspector {
        self
    }
}
