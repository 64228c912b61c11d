use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};

use crate::connection::{Database, Transaction};
use crate::core::Result;
use crate::dialect::{Adapter, ColumnInfo};
use crate::models::{Field, FieldType, ID_FIELD, ModelDecl, ModelKind};

/// Bring the database schema in line with the declarations, in one
/// transaction.
pub(super) fn sync(decls: &BTreeMap<String, ModelDecl>, db: &dyn Database) -> Result<()> {
    let adapter = db.adapter()?;
    let mut tx = db.begin()?;
    match sync_in(decls, adapter.as_ref(), tx.as_mut()) {
        Ok(()) => tx.commit(),
        Err(e) => {
            if let Err(rollback) = tx.rollback() {
                warn!("Rollback of schema synchronization failed: {}", rollback);
            }
            Err(e)
        }
    }
}

fn exec(tx: &mut dyn Transaction, sql: &str) -> Result<()> {
    info!("{}", sql);
    tx.execute(sql, &[])?;
    Ok(())
}

fn sync_in(decls: &BTreeMap<String, ModelDecl>, adapter: &dyn Adapter, tx: &mut dyn Transaction) -> Result<()> {
    let existing: BTreeSet<String> = adapter.tables(tx)?.into_iter().collect();
    let mut known: BTreeSet<String> = BTreeSet::new();

    for decl in decls.values() {
        match decl.kind {
            ModelKind::Mixin => continue,
            ModelKind::Manual => {
                known.insert(decl.table.clone());
                continue;
            }
            ModelKind::Regular => {}
        }
        known.insert(decl.table.clone());
        let fields: Vec<&Field> = decl.fields.stored().into_iter().map(|f| f.as_ref()).collect();
        if existing.contains(&decl.table) {
            sync_columns(adapter, tx, &decl.table, &fields)?;
        } else {
            exec(tx, &adapter.create_table_sql(&decl.table, &fields))?;
        }
        sync_indexes(adapter, tx, &decl.table, &fields)?;
    }

    for decl in decls.values() {
        if decl.kind == ModelKind::Mixin {
            continue;
        }
        for field in decl.fields.iter() {
            if field.field_type() != FieldType::Many2Many {
                continue;
            }
            let (Some(relation), Some(target)) = (field.relation(), field.target()) else {
                continue;
            };
            if !known.insert(relation.table.clone()) || existing.contains(&relation.table) {
                continue;
            }
            let target_table = decls.get(target).map(|t| t.table.as_str()).unwrap_or(target);
            exec(tx, &adapter.create_relation_table_sql(relation, &decl.table, target_table))?;
        }
    }

    for table in existing.difference(&known) {
        exec(tx, &adapter.drop_table_sql(table))?;
    }
    Ok(())
}

fn sync_columns(adapter: &dyn Adapter, tx: &mut dyn Transaction, table: &str, fields: &[&Field]) -> Result<()> {
    let columns: Vec<ColumnInfo> = adapter.columns(tx, table)?;
    for field in fields {
        if field.name() == ID_FIELD {
            continue;
        }
        match columns.iter().find(|c| c.name == field.column()) {
            None => exec(tx, &adapter.add_column_sql(table, field))?,
            Some(column) if !adapter.column_matches(field, column) => {
                match adapter.alter_column_sql(table, field) {
                    Some(statements) => {
                        for sql in statements {
                            exec(tx, &sql)?;
                        }
                    }
                    None => warn!(
                        "Column {}.{} is {} but {} is declared; the {} adapter cannot alter it",
                        table,
                        column.name,
                        column.sql_type,
                        adapter.column_sql(field, false),
                        adapter.driver()
                    ),
                }
            }
            Some(_) => {}
        }
    }

    let indexes = adapter.indexes(tx, table)?;
    for column in &columns {
        let declared = column.name == ID_FIELD || fields.iter().any(|f| f.column() == column.name);
        if declared {
            continue;
        }
        let index = adapter.index_name(table, &column.name);
        if indexes.contains(&index) {
            exec(tx, &adapter.drop_index_sql(&index))?;
        }
        exec(tx, &adapter.drop_column_sql(table, &column.name))?;
    }
    Ok(())
}

fn sync_indexes(adapter: &dyn Adapter, tx: &mut dyn Transaction, table: &str, fields: &[&Field]) -> Result<()> {
    let indexes = adapter.indexes(tx, table)?;
    for field in fields {
        if field.name() == ID_FIELD {
            continue;
        }
        let name = adapter.index_name(table, field.column());
        let wanted = field.is_indexed() || field.is_unique();
        let present = indexes.contains(&name);
        if wanted && !present {
            exec(tx, &adapter.create_index_sql(table, field.column(), field.is_unique()))?;
        } else if !wanted && present {
            exec(tx, &adapter.drop_index_sql(&name))?;
        }
    }
    Ok(())
}
