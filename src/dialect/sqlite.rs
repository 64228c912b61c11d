use crate::condition::Operator;
use crate::connection::Transaction;
use crate::core::{Result, Value};
use crate::models::{Field, FieldType};

use super::{Adapter, ColumnInfo};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteAdapter;

impl Adapter for SqliteAdapter {
    fn driver(&self) -> &'static str {
        "sqlite"
    }

    /// SQLite has no ILIKE: both sides are lowered instead.
    fn pattern_sql(&self, column: &str, op: Operator) -> Result<String> {
        Ok(match op {
            Operator::ILike | Operator::ILikePattern => format!("LOWER({}) LIKE LOWER(?)", column),
            Operator::NotILike => format!("LOWER({}) NOT LIKE LOWER(?)", column),
            other => format!("{} {} ?", column, self.operator_sql(other)?),
        })
    }

    /// OFFSET is only valid after a LIMIT; -1 means no limit.
    fn limit_sql(&self, limit: usize, offset: usize) -> String {
        match (limit, offset) {
            (0, 0) => String::new(),
            (0, offset) => format!(" LIMIT -1 OFFSET {}", offset),
            (limit, 0) => format!(" LIMIT {}", limit),
            (limit, offset) => format!(" LIMIT {} OFFSET {}", limit, offset),
        }
    }

    fn type_name(&self, field: &Field) -> String {
        match field.field_type() {
            FieldType::Boolean => "BOOLEAN".into(),
            FieldType::Char | FieldType::Selection => match field.size() {
                Some(size) => format!("VARCHAR({})", size),
                None => "VARCHAR".into(),
            },
            FieldType::Text => "TEXT".into(),
            FieldType::Integer | FieldType::Many2One | FieldType::One2One => "INTEGER".into(),
            FieldType::Float => "REAL".into(),
            FieldType::Date => "DATE".into(),
            FieldType::DateTime => "DATETIME".into(),
            FieldType::Binary => "BLOB".into(),
            FieldType::One2Many | FieldType::Many2Many | FieldType::Rev2One => String::new(),
        }
    }

    fn primary_key_sql(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }

    fn alter_column_sql(&self, _table: &str, _field: &Field) -> Option<Vec<String>> {
        None
    }

    fn tables(&self, tx: &mut dyn Transaction) -> Result<Vec<String>> {
        let result = tx.query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )?;
        Ok(result.column_strings(0))
    }

    fn columns(&self, tx: &mut dyn Transaction, table: &str) -> Result<Vec<ColumnInfo>> {
        // cid, name, type, notnull, dflt_value, pk
        let result = tx.query(&format!("PRAGMA table_info({})", self.quote(table)), &[])?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let name = row.get(1)?.as_str()?.to_string();
                let sql_type = row.get(2).and_then(Value::as_str).unwrap_or_default().to_string();
                let not_null = row.get(3).and_then(Value::as_i64).unwrap_or(0) != 0;
                Some(ColumnInfo {
                    name,
                    sql_type,
                    not_null,
                })
            })
            .collect())
    }

    fn indexes(&self, tx: &mut dyn Transaction, table: &str) -> Result<Vec<String>> {
        let result = tx.query(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ? ORDER BY name",
            &[Value::from(table)],
        )?;
        Ok(result.column_strings(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldSpec;

    #[test]
    fn test_ilike_is_lowered() {
        assert_eq!(
            SqliteAdapter.pattern_sql("\"user\".\"name\"", Operator::ILike).unwrap(),
            "LOWER(\"user\".\"name\") LIKE LOWER(?)"
        );
        assert_eq!(
            SqliteAdapter.pattern_sql("\"user\".\"name\"", Operator::NotLike).unwrap(),
            "\"user\".\"name\" NOT LIKE ?"
        );
    }

    #[test]
    fn test_type_names() {
        assert_eq!(SqliteAdapter.type_name(&FieldSpec::char("Code").size(8).field), "VARCHAR(8)");
        assert_eq!(SqliteAdapter.type_name(&FieldSpec::float("Amount").field), "REAL");
        assert_eq!(SqliteAdapter.type_name(&FieldSpec::many2one("User", "User").field), "INTEGER");
    }
}
