//! Database access: the transaction contract consumed by environments, the
//! bundled SQLite implementation and connection configuration.

pub mod config;
pub mod result;
pub mod sqlite;

use std::sync::Arc;

use crate::core::{OrmError, Result, Value};
use crate::dialect::{self, Adapter};

pub use config::DatabaseConfig;
pub use result::QueryResult;
pub use sqlite::{SqliteDatabase, SqliteTransaction};

/// One open database transaction. Statements use `?` placeholders already
/// rebound for the dialect.
pub trait Transaction: Send {
    /// Run a statement returning rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Run a statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// A database able to open transactions.
pub trait Database: Send + Sync {
    fn driver(&self) -> &str;

    fn begin(&self) -> Result<Box<dyn Transaction>>;

    fn adapter(&self) -> Result<Arc<dyn Adapter>> {
        dialect::adapter_for(self.driver())
    }
}

/// Open the database described by `config`.
pub fn open(config: &DatabaseConfig) -> Result<Arc<dyn Database>> {
    config.validate()?;
    match config.driver.as_str() {
        "sqlite" | "sqlite3" => {
            let db = if config.is_memory() {
                SqliteDatabase::memory()?
            } else {
                SqliteDatabase::open(&config.database)?
            };
            Ok(Arc::new(db))
        }
        other => Err(OrmError::Config(format!(
            "No bundled driver for '{}'; implement `Database` for your client and pair it with `dialect::adapter_for(\"{}\")`",
            other, other
        ))),
    }
}
