use schemalink_sql::Dialect;
use thiserror::Error;

use crate::plan::{Phase, PlanError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by a database driver.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("mysql error: {0}")]
    MySql(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("entity [{reference}] is not associated with the [{database}] database")]
    NotAssociated { database: String, reference: String },

    #[error("failed to inspect table '{table}': {source}")]
    Introspection {
        table: String,
        #[source]
        source: BackendError,
    },

    #[error("column '{table}.{column}' has type '{data_type}' which has no logical mapping")]
    UnknownColumnType {
        table: String,
        column: String,
        data_type: String,
    },

    #[error("{phase} phase failed on '{table}': {source}\n  sql: {sql}")]
    Ddl {
        phase: Phase,
        table: String,
        sql: String,
        #[source]
        source: BackendError,
    },

    #[error("{what} is not supported on {dialect}")]
    Unsupported { dialect: Dialect, what: String },

    #[error("invalid entity [{reference}]: {reason}")]
    InvalidEntity { reference: String, reason: String },

    #[error("invalid plan: {0}")]
    Plan(#[from] PlanError),

    #[error("synchronization cancelled")]
    Cancelled,

    #[error("synchronization deadline exceeded")]
    DeadlineExceeded,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to connect to [{database}]: {source}")]
    Connect {
        database: String,
        #[source]
        source: BackendError,
    },

    #[error("no link named [{0}]")]
    LinkNotFound(String),
}

impl Error {
    pub(crate) fn invalid(reference: &str, reason: impl Into<String>) -> Self {
        Error::InvalidEntity {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}
