use crate::connection::Transaction;
use crate::core::{Result, Value};
use crate::models::{Field, FieldType};

use super::{Adapter, ColumnInfo};

/// PostgreSQL dialect. Pair it with a [`crate::connection::Database`]
/// implementation backed by a PostgreSQL client.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresAdapter;

impl Adapter for PostgresAdapter {
    fn driver(&self) -> &'static str {
        "postgres"
    }

    /// `?` -> `$1, $2, ...`, leaving quoted text untouched.
    fn rebind(&self, sql: &str) -> String {
        let mut out = String::with_capacity(sql.len() + 8);
        let mut index = 0;
        let mut quote: Option<char> = None;
        for c in sql.chars() {
            match (quote, c) {
                (None, '\'' | '"') => {
                    quote = Some(c);
                    out.push(c);
                }
                (Some(q), c) if c == q => {
                    quote = None;
                    out.push(c);
                }
                (None, '?') => {
                    index += 1;
                    out.push_str(&format!("${}", index));
                }
                _ => out.push(c),
            }
        }
        out
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
            FieldType::Float => "DOUBLE PRECISION".into(),
            FieldType::Date => "DATE".into(),
            FieldType::DateTime => "TIMESTAMP WITHOUT TIME ZONE".into(),
            FieldType::Binary => "BYTEA".into(),
            FieldType::One2Many | FieldType::Many2Many | FieldType::Rev2One => String::new(),
        }
    }

    fn primary_key_sql(&self) -> &'static str {
        "SERIAL PRIMARY KEY"
    }

    /// information_schema reports `character varying` without its length.
    fn column_matches(&self, field: &Field, column: &ColumnInfo) -> bool {
        let declared = self.type_name(field).to_lowercase();
        let declared = if declared.starts_with("varchar") {
            "character varying".to_string()
        } else {
            declared
        };
        declared == column.sql_type.to_lowercase() && self.is_not_null(field) == column.not_null
    }

    fn alter_column_sql(&self, table: &str, field: &Field) -> Option<Vec<String>> {
        let table = self.quote(table);
        let column = self.quote(field.column());
        let type_name = self.type_name(field);
        let mut statements = vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
            table, column, type_name, column, type_name
        )];
        if self.is_not_null(field) {
            if let Some(default) = self.default_sql(field) {
                statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                    table, column, default
                ));
            }
            statements.push(format!("ALTER TABLE {} ALTER COLUMN {} SET NOT NULL", table, column));
        } else {
            statements.push(format!("ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL", table, column));
        }
        Some(statements)
    }

    fn tables(&self, tx: &mut dyn Transaction) -> Result<Vec<String>> {
        let result = tx.query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' ORDER BY table_name",
            &[],
        )?;
        Ok(result.column_strings(0))
    }

    fn columns(&self, tx: &mut dyn Transaction, table: &str) -> Result<Vec<ColumnInfo>> {
        let sql = self.rebind(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = ?",
        );
        let result = tx.query(&sql, &[Value::from(table)])?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                Some(ColumnInfo {
                    name: row.first()?.as_str()?.to_string(),
                    sql_type: row.get(1)?.as_str()?.to_string(),
                    not_null: row.get(2)?.as_str()? == "NO",
                })
            })
            .collect())
    }

    fn indexes(&self, tx: &mut dyn Transaction, table: &str) -> Result<Vec<String>> {
        let sql = self.rebind(
            "SELECT indexname FROM pg_indexes WHERE schemaname = current_schema() AND tablename = ?",
        );
        let result = tx.query(&sql, &[Value::from(table)])?;
        Ok(result.column_strings(0))
    }
}
