//! Environments: one database transaction, its record cache and the calling
//! user and context.

pub mod cache;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use crate::connection::{Database, QueryResult, Transaction};
use crate::core::{FieldMap, OrmError, Result, Value};
use crate::dialect::Adapter;
use crate::models::Registry;
use crate::query::Statement;
use crate::records::RecordCollection;

pub use cache::Cache;

/// Values passed down to every method called in an environment.
pub type Context = FieldMap;

/// State shared by an environment and the environments derived from it with
/// [`Environment::with_context`] or [`Environment::with_uid`].
struct Session {
    registry: Arc<Registry>,
    adapter: Arc<dyn Adapter>,
    transaction: Mutex<Option<Box<dyn Transaction>>>,
    cache: Mutex<Cache>,
    queries: AtomicUsize,
}

/// A business transaction.
///
/// Dropping the last environment of a transaction that was neither committed
/// nor rolled back rolls it back.
pub struct Environment {
    session: Arc<Session>,
    uid: i64,
    context: Context,
}

impl Environment {
    /// Open a transaction on `db` for user `uid`.
    pub fn new(registry: Arc<Registry>, db: &dyn Database, uid: i64) -> Result<Arc<Self>> {
        let adapter = db.adapter()?;
        let transaction = db.begin()?;
        Ok(Arc::new(Self {
            session: Arc::new(Session {
                registry,
                adapter,
                transaction: Mutex::new(Some(transaction)),
                cache: Mutex::new(Cache::new()),
                queries: AtomicUsize::new(0),
            }),
            uid,
            context: Context::new(),
        }))
    }

    /// Open a transaction against the process-wide registry.
    pub fn global(db: &dyn Database, uid: i64) -> Result<Arc<Self>> {
        Self::new(Registry::global()?, db, uid)
    }

    pub fn registry(&self) -> &Registry {
        &self.session.registry
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.session.adapter.as_ref()
    }

    pub fn uid(&self) -> i64 {
        self.uid
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// Same transaction and cache, with `key` set in the context.
    pub fn with_context(&self, key: &str, value: impl Into<Value>) -> Arc<Self> {
        let mut context = self.context.clone();
        context.insert(key.to_string(), value.into());
        Arc::new(Self {
            session: Arc::clone(&self.session),
            uid: self.uid,
            context,
        })
    }

    /// Same transaction and cache, acting as another user.
    pub fn with_uid(&self, uid: i64) -> Arc<Self> {
        Arc::new(Self {
            session: Arc::clone(&self.session),
            uid,
            context: self.context.clone(),
        })
    }

    /// Empty collection of `model`.
    pub fn pool(self: &Arc<Self>, model: &str) -> Result<RecordCollection> {
        let model = self.registry().model(model)?;
        if model.is_mixin() {
            return Err(OrmError::UnsupportedOperation(format!(
                "Mixin '{}' cannot be queried",
                model.name()
            )));
        }
        Ok(RecordCollection::new(Arc::clone(self), Arc::clone(model)))
    }

    pub(crate) fn cache(&self) -> Result<MutexGuard<'_, Cache>> {
        Ok(self.session.cache.lock()?)
    }

    /// Drop every cached value.
    pub fn invalidate_cache(&self) -> Result<()> {
        self.cache()?.clear();
        Ok(())
    }

    /// Number of statements run in this transaction.
    pub fn query_count(&self) -> usize {
        self.session.queries.load(Ordering::Relaxed)
    }

    fn run<T>(
        &self,
        statement: &Statement,
        f: impl FnOnce(&mut dyn Transaction, &str, &[Value]) -> Result<T>,
    ) -> Result<T> {
        let sql = self.adapter().rebind(&statement.sql);
        debug!("{} {:?}", sql, statement.params);
        self.session.queries.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.session.transaction.lock()?;
        let transaction = guard.as_mut().ok_or(OrmError::TransactionClosed)?;
        f(transaction.as_mut(), &sql, &statement.params)
    }

    /// Run a statement returning rows.
    pub fn query(&self, statement: &Statement) -> Result<QueryResult> {
        self.run(statement, |tx, sql, params| tx.query(sql, params))
    }

    /// Run a statement, returning the number of affected rows.
    pub fn execute(&self, statement: &Statement) -> Result<u64> {
        self.run(statement, |tx, sql, params| tx.execute(sql, params))
    }

    fn close(&self) -> Result<Box<dyn Transaction>> {
        self.cache()?.clear();
        self.session
            .transaction
            .lock()?
            .take()
            .ok_or(OrmError::TransactionClosed)
    }

    /// Commit the transaction. Further statements fail.
    pub fn commit(&self) -> Result<()> {
        debug!("Committing environment of user {}", self.uid);
        self.close()?.commit()
    }

    pub fn rollback(&self) -> Result<()> {
        debug!("Rolling back environment of user {}", self.uid);
        self.close()?.rollback()
    }

    pub fn is_closed(&self) -> bool {
        self.session
            .transaction
            .lock()
            .map(|tx| tx.is_none())
            .unwrap_or(true)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("uid", &self.uid)
            .field("context", &self.context)
            .field("driver", &self.session.adapter.driver())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteDatabase;
    use crate::models::RegistryBuilder;

    #[test]
    fn test_context_is_shared_per_derived_env() {
        let db = SqliteDatabase::memory().unwrap();
        let registry = RegistryBuilder::new().bootstrap(&db).unwrap();
        let env = Environment::new(registry, &db, 1).unwrap();
        let derived = env.with_context("lang", "fr");

        assert_eq!(derived.context_value("lang"), Some(&Value::from("fr")));
        assert!(env.context_value("lang").is_none());

        derived.cache().unwrap().set("User", 1, "name", Value::from("Ann"));
        assert_eq!(env.cache().unwrap().len(), 1);
        assert_eq!(derived.with_uid(7).uid(), 7);
    }

    #[test]
    fn test_statements_after_commit_fail() {
        let db = SqliteDatabase::memory().unwrap();
        let registry = RegistryBuilder::new().bootstrap(&db).unwrap();
        let env = Environment::new(registry, &db, 1).unwrap();
        let statement = Statement {
            sql: "SELECT 1".into(),
            params: Vec::new(),
        };
        assert_eq!(env.query(&statement).unwrap().scalar(), Some(&Value::Integer(1)));
        assert_eq!(env.query_count(), 1);

        env.commit().unwrap();
        assert!(env.is_closed());
        assert!(matches!(env.query(&statement), Err(OrmError::TransactionClosed)));
        assert!(matches!(env.commit(), Err(OrmError::TransactionClosed)));
    }
}
