//! Schema synchronization for PostgreSQL and MySQL.
//!
//! Entities (see [`schemalink_model`]) describe tables declaratively. A
//! [`Connection`] keeps a registry of the entities associated with one
//! database and reconciles the live schema with them:
//!
//! ```ignore
//! let link = Connection::open(&LinkConfig::from_env("main")?).await?;
//! let report = link.associate(&entities).await?;
//! for drift in &report.drift {
//!     eprintln!("manual migration required: {drift}");
//! }
//! ```
//!
//! A pass only ever adds tables, columns and constraints, or drops columns
//! and constraints that are no longer declared. Type, nullability and
//! primary key changes on existing columns are reported as [`Drift`].
//!
//! # Phases
//!
//! DDL runs in six global phases: backup, copy, create, constraint, foreign,
//! drop. Every table exists before any foreign key is added, and foreign keys
//! are detached before columns are dropped, so entities may reference each
//! other in cycles.

pub mod catalog;
pub mod config;
mod connection;
pub mod ddl;
mod diff;
pub mod driver;
mod error;
mod events;
mod graph;
pub mod inspect;
mod links;
pub mod model;
pub mod plan;
pub mod structure;
mod sync;
mod traced;
pub mod transform;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::EntityCatalog;
pub use config::{LinkConfig, SyncOptions};
pub use connection::{Association, Connection};
pub use ddl::Change;
pub use diff::{Drift, DriftKind, TableDiff};
pub use driver::{Driver, Executor};
pub use error::{BackendError, Error, Result};
pub use events::LinkEvent;
pub use graph::DependencyGraph;
pub use links::LinkManager;
pub use model::Model;
pub use plan::{ChangeStep, Phase, PlanError};
pub use structure::Structure;
pub use sync::{SyncContext, SyncReport, Synchronizer};
pub use traced::{TracedMySqlPool, TracedPool};

pub use schemalink_sql::Dialect;
