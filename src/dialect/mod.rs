//! SQL dialect adapters: quoting, type names, operator spelling and schema
//! introspection. Nothing outside this module hard-codes dialect details.

pub mod postgres;
pub mod sqlite;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use crate::condition::Operator;
use crate::connection::Transaction;
use crate::core::{OrmError, Result};
use crate::models::{Field, FieldType, ID_FIELD, RelationTable};

pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

/// Column as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
}

/// Contract between the query builder / schema sync and one SQL dialect.
pub trait Adapter: Send + Sync + fmt::Debug {
    /// Driver name the adapter is registered under.
    fn driver(&self) -> &'static str;

    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Rewrite `?` placeholders into the dialect's placeholder syntax.
    fn rebind(&self, sql: &str) -> String {
        sql.to_string()
    }

    /// SQL spelling of a binary operator.
    fn operator_sql(&self, op: Operator) -> Result<&'static str> {
        Ok(match op {
            Operator::Equals | Operator::EqualsOrUnset => "=",
            Operator::NotEquals => "!=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Lower => "<",
            Operator::LowerOrEqual => "<=",
            Operator::LikePattern | Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILikePattern | Operator::ILike => "ILIKE",
            Operator::NotILike => "NOT ILIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::ChildOf => {
                return Err(OrmError::UnsupportedOperation(
                    "child_of has no binary operator form".into(),
                ));
            }
        })
    }

    /// Pattern comparison of `column` against one placeholder.
    fn pattern_sql(&self, column: &str, op: Operator) -> Result<String> {
        Ok(format!("{} {} ?", column, self.operator_sql(op)?))
    }

    /// Wildcard wrapping for pattern operators.
    fn wrap_pattern(&self, op: Operator, pattern: &str) -> String {
        if op.wraps_wildcards() {
            format!("%{}%", pattern)
        } else {
            pattern.to_string()
        }
    }

    /// `LIMIT`/`OFFSET` suffix; zero means unset.
    fn limit_sql(&self, limit: usize, offset: usize) -> String {
        let mut sql = String::new();
        if limit > 0 {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if offset > 0 {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    /// Column type of a stored field.
    fn type_name(&self, field: &Field) -> String;

    fn primary_key_sql(&self) -> &'static str;

    fn is_not_null(&self, field: &Field) -> bool {
        field.name() != ID_FIELD && (field.is_required() || field.field_type() == FieldType::Boolean)
    }

    /// Literal of the zero value used as default for NOT NULL columns.
    fn default_sql(&self, field: &Field) -> Option<&'static str> {
        match field.field_type() {
            FieldType::Boolean => Some("FALSE"),
            FieldType::Char | FieldType::Text | FieldType::Selection => Some("''"),
            FieldType::Integer | FieldType::Float => Some("0"),
            _ => None,
        }
    }

    /// Type, nullability and default of a column. `NOT NULL` is left out
    /// when no zero default exists and the column is added to a live table.
    fn column_sql(&self, field: &Field, adding: bool) -> String {
        if field.name() == ID_FIELD {
            return self.primary_key_sql().to_string();
        }
        let mut sql = self.type_name(field);
        if self.is_not_null(field) {
            match self.default_sql(field) {
                Some(default) => sql.push_str(&format!(" NOT NULL DEFAULT {}", default)),
                None if !adding => sql.push_str(" NOT NULL"),
                None => {}
            }
        }
        sql
    }

    /// Whether a live column matches the declaration.
    fn column_matches(&self, field: &Field, column: &ColumnInfo) -> bool {
        self.type_name(field).eq_ignore_ascii_case(&column.sql_type)
            && self.is_not_null(field) == column.not_null
    }

    fn create_table_sql(&self, table: &str, fields: &[&Field]) -> String {
        let columns: Vec<String> = fields
            .iter()
            .map(|f| format!("{} {}", self.quote(f.column()), self.column_sql(f, false)))
            .collect();
        format!("CREATE TABLE {} ({})", self.quote(table), columns.join(", "))
    }

    fn add_column_sql(&self, table: &str, field: &Field) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.quote(table),
            self.quote(field.column()),
            self.column_sql(field, true)
        )
    }

    /// Statements changing a column in place, `None` when the dialect cannot.
    fn alter_column_sql(&self, table: &str, field: &Field) -> Option<Vec<String>>;

    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote(table),
            self.quote(column)
        )
    }

    fn index_name(&self, table: &str, column: &str) -> String {
        format!("{}_{}_index", table, column)
    }

    fn create_index_sql(&self, table: &str, column: &str, unique: bool) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.quote(&self.index_name(table, column)),
            self.quote(table),
            self.quote(column)
        )
    }

    fn drop_index_sql(&self, name: &str) -> String {
        format!("DROP INDEX IF EXISTS {}", self.quote(name))
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(table))
    }

    /// Link table of a many-to-many field, cascading on both sides.
    fn create_relation_table_sql(
        &self,
        relation: &RelationTable,
        own_table: &str,
        target_table: &str,
    ) -> String {
        let fk = |column: &str, table: &str| {
            format!(
                "{} INTEGER NOT NULL REFERENCES {}({}) ON DELETE CASCADE",
                self.quote(column),
                self.quote(table),
                self.quote(ID_FIELD)
            )
        };
        format!(
            "CREATE TABLE {} ({}, {}, UNIQUE ({}, {}))",
            self.quote(&relation.table),
            fk(&relation.own_column, own_table),
            fk(&relation.target_column, target_table),
            self.quote(&relation.own_column),
            self.quote(&relation.target_column)
        )
    }

    fn tables(&self, tx: &mut dyn Transaction) -> Result<Vec<String>>;

    fn columns(&self, tx: &mut dyn Transaction, table: &str) -> Result<Vec<ColumnInfo>>;

    fn indexes(&self, tx: &mut dyn Transaction, table: &str) -> Result<Vec<String>>;
}

/// Adapters by driver name.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        log::debug!("Registered SQL adapter: {}", adapter.driver());
        self.adapters.insert(adapter.driver().to_string(), adapter);
    }

    pub fn with_default_adapters() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SqliteAdapter));
        registry.register(Arc::new(PostgresAdapter));
        registry
    }

    pub fn find(&self, driver: &str) -> Option<Arc<dyn Adapter>> {
        let driver = match driver {
            "postgresql" | "pg" => "postgres",
            "sqlite3" => "sqlite",
            other => other,
        };
        self.adapters.get(driver).cloned()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_default_adapters()
    }
}

lazy_static! {
    static ref ADAPTERS: RwLock<AdapterRegistry> = RwLock::new(AdapterRegistry::with_default_adapters());
}

/// Adapter registered for `driver`.
pub fn adapter_for(driver: &str) -> Result<Arc<dyn Adapter>> {
    ADAPTERS
        .read()?
        .find(driver)
        .ok_or_else(|| OrmError::Config(format!("No SQL adapter registered for driver '{}'", driver)))
}

/// Register an adapter, replacing any adapter with the same driver name.
pub fn register_adapter(adapter: Arc<dyn Adapter>) -> Result<()> {
    ADAPTERS.write()?.register(adapter);
    Ok(())
}
