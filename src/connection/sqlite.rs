use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};

use crate::core::value::{DATE_FORMAT, DATETIME_FORMAT};
use crate::core::{OrmError, Result, Value};

use super::{Database, QueryResult, Transaction};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

enum Source {
    /// One shared connection; a single transaction may be open at a time.
    Memory {
        conn: Arc<Mutex<Connection>>,
        busy: Arc<AtomicBool>,
    },
    /// A fresh connection per transaction.
    File(PathBuf),
}

/// SQLite database, in memory or backed by a file.
///
/// In-memory databases live on a single connection, so environments over
/// them must be used one after the other: `begin` fails while another
/// transaction is still open.
pub struct SqliteDatabase {
    source: Source,
}

impl SqliteDatabase {
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        Ok(Self {
            source: Source::Memory {
                conn: Arc::new(Mutex::new(conn)),
                busy: Arc::new(AtomicBool::new(false)),
            },
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Fail early on unreachable paths.
        configure(&Connection::open(&path)?)?;
        Ok(Self {
            source: Source::File(path),
        })
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA case_sensitive_like = ON;")?;
    Ok(())
}

impl Database for SqliteDatabase {
    fn driver(&self) -> &str {
        "sqlite"
    }

    fn begin(&self) -> Result<Box<dyn Transaction>> {
        let handle = match &self.source {
            Source::Memory { conn, busy } => {
                if busy.swap(true, Ordering::SeqCst) {
                    return Err(OrmError::Database(
                        "In-memory database already has an open transaction".into(),
                    ));
                }
                Handle::Shared {
                    conn: Arc::clone(conn),
                    busy: Arc::clone(busy),
                }
            }
            Source::File(path) => {
                let conn = Connection::open(path)?;
                configure(&conn)?;
                Handle::Owned(conn)
            }
        };
        let mut tx = SqliteTransaction {
            handle,
            state: TransactionState::Active,
        };
        if let Err(e) = tx.with_connection(|conn| Ok(conn.execute_batch("BEGIN")?)) {
            tx.release();
            return Err(e);
        }
        log::debug!("BEGIN");
        Ok(Box::new(tx))
    }
}

enum Handle {
    Shared {
        conn: Arc<Mutex<Connection>>,
        busy: Arc<AtomicBool>,
    },
    Owned(Connection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Active,
    Closed,
}

pub struct SqliteTransaction {
    handle: Handle,
    state: TransactionState,
}

impl SqliteTransaction {
    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if self.state == TransactionState::Closed {
            return Err(OrmError::TransactionClosed);
        }
        match &self.handle {
            Handle::Shared { conn, .. } => {
                let guard = conn.lock()?;
                f(&guard)
            }
            Handle::Owned(conn) => f(conn),
        }
    }

    fn finish(&mut self, statement: &str) -> Result<()> {
        let outcome = self.with_connection(|conn| Ok(conn.execute_batch(statement)?));
        self.release();
        log::debug!("{}", statement);
        outcome
    }

    fn release(&mut self) {
        self.state = TransactionState::Closed;
        if let Handle::Shared { busy, .. } = &self.handle {
            busy.store(false, Ordering::SeqCst);
        }
    }
}

impl Transaction for SqliteTransaction {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let params = params.iter().map(to_sql).collect::<Result<Vec<_>>>()?;
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let width = columns.len();
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(from_sql(row.get_ref(i)?));
                }
                out.push(values);
            }
            Ok(QueryResult::new(columns, out))
        })
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let params = params.iter().map(to_sql).collect::<Result<Vec<_>>>()?;
        self.with_connection(|conn| {
            let affected = conn.execute(sql, params_from_iter(params.iter()))?;
            Ok(affected as u64)
        })
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.finish("COMMIT")
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            if let Err(e) = self.finish("ROLLBACK") {
                log::warn!("Rollback of abandoned transaction failed: {}", e);
            }
        }
    }
}

fn to_sql(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Date(d) => SqlValue::Text(d.format(DATE_FORMAT).to_string()),
        Value::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()),
        Value::Binary(bytes) => SqlValue::Blob(bytes.clone()),
        Value::Records(rs) => match rs.resolved_ids() {
            Some([]) => SqlValue::Null,
            Some([id]) => SqlValue::Integer(*id),
            _ => {
                return Err(OrmError::TypeMismatch(
                    "Only a single resolved record can be bound as a parameter".into(),
                ));
            }
        },
        other => {
            return Err(OrmError::TypeMismatch(format!(
                "Cannot bind a {} as a parameter",
                other.type_name()
            )));
        }
    })
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Binary(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_lifecycle() {
        let db = SqliteDatabase::memory().unwrap();
        let mut tx = db.begin().unwrap();
        tx.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
        let inserted = tx
            .execute("INSERT INTO t (name) VALUES (?), (?)", &[Value::from("a"), Value::from("b")])
            .unwrap();
        assert_eq!(inserted, 2);
        tx.commit().unwrap();

        let mut tx = db.begin().unwrap();
        let result = tx.query("SELECT id, name FROM t ORDER BY id", &[]).unwrap();
        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.rows[1], vec![Value::Integer(2), Value::from("b")]);
        tx.rollback().unwrap();
    }

    #[test]
    fn test_rollback_discards_changes() {
        let db = SqliteDatabase::memory().unwrap();
        let mut tx = db.begin().unwrap();
        tx.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[]).unwrap();
        tx.commit().unwrap();

        let mut tx = db.begin().unwrap();
        tx.execute("INSERT INTO t (id) VALUES (1)", &[]).unwrap();
        drop(tx);

        let mut tx = db.begin().unwrap();
        let result = tx.query("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(result.scalar(), Some(&Value::Integer(0)));
    }

    #[test]
    fn test_single_transaction_on_memory_database() {
        let db = SqliteDatabase::memory().unwrap();
        let first = db.begin().unwrap();
        assert!(matches!(db.begin(), Err(OrmError::Database(_))));
        first.commit().unwrap();
        assert!(db.begin().is_ok());
    }

    #[test]
    fn test_value_binding() {
        let db = SqliteDatabase::memory().unwrap();
        let mut tx = db.begin().unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let result = tx
            .query("SELECT ?, ?, ?", &[Value::Boolean(true), Value::Date(date), Value::Null])
            .unwrap();
        assert_eq!(
            result.rows[0],
            vec![Value::Integer(1), Value::from("2024-02-29"), Value::Null]
        );
        assert!(tx.query("SELECT ?", &[Value::List(vec![])]).is_err());
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteDatabase::open(dir.path().join("app.db")).unwrap();
        let mut tx = db.begin().unwrap();
        tx.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[]).unwrap();
        tx.commit().unwrap();

        let mut a = db.begin().unwrap();
        assert!(a.query("SELECT * FROM t", &[]).unwrap().is_empty());
        a.rollback().unwrap();
    }
}
