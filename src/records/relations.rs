use crate::condition::{Condition, Operator};
use crate::core::{FieldMap, OrmError, Result, Value};
use crate::models::{Field, FieldType, ID_FIELD, RelationTable};
use crate::query::SqlBuilder;

use super::RecordCollection;

fn relation_of(field: &Field) -> Result<&RelationTable> {
    field.relation().ok_or_else(|| {
        OrmError::InvalidDeclaration(format!(
            "Many2many field '{}.{}' has no relation table",
            field.model(),
            field.name()
        ))
    })
}

fn reverse_of(field: &Field) -> Result<&str> {
    field.reverse().ok_or_else(|| {
        OrmError::InvalidDeclaration(format!(
            "Field '{}.{}' has no reverse field",
            field.model(),
            field.name()
        ))
    })
}

fn target_of(field: &Field) -> Result<&str> {
    field.target().ok_or_else(|| {
        OrmError::InvalidDeclaration(format!(
            "Field '{}.{}' has no target model",
            field.model(),
            field.name()
        ))
    })
}

/// Records linked to a single `record` through a one2many, rev2one or
/// many2many field.
pub(crate) fn read(record: &RecordCollection, field: &Field) -> Result<RecordCollection> {
    let target = record.pool(target_of(field)?)?;
    let ids = record.ids()?;
    let Some(&id) = ids.first() else {
        return Ok(target.browse(&[]));
    };
    match field.field_type() {
        FieldType::One2Many | FieldType::Rev2One => target
            .filter(Condition::leaf(reverse_of(field)?, Operator::Equals, id))
            .fetch(),
        FieldType::Many2Many => {
            let relation = relation_of(field)?;
            let statement = SqlBuilder::relation_targets(record.env().adapter(), relation, id);
            let linked = record.env().query(&statement)?.column_ids(0);
            if linked.is_empty() {
                return Ok(target.browse(&[]));
            }
            target
                .filter(Condition::leaf(ID_FIELD, Operator::In, linked))
                .fetch()
        }
        other => Err(OrmError::TypeMismatch(format!(
            "Field '{}' of type {} is not a reverse relation",
            field.name(),
            other
        ))),
    }
}

/// Replace the records linked to `rs` through an x2many or rev2one field.
pub(crate) fn write(rs: &RecordCollection, field: &Field, value: Value) -> Result<()> {
    let linked = value.to_ids()?;
    match field.field_type() {
        FieldType::Many2Many => {
            let relation = relation_of(field)?;
            let adapter = rs.env().adapter();
            for id in rs.ids()? {
                rs.env().execute(&SqlBuilder::unlink_relation(adapter, relation, id))?;
                let mut seen = Vec::with_capacity(linked.len());
                for target_id in &linked {
                    if seen.contains(target_id) {
                        continue;
                    }
                    seen.push(*target_id);
                    rs.env()
                        .execute(&SqlBuilder::link_relation(adapter, relation, id, *target_id))?;
                }
            }
            Ok(())
        }
        FieldType::One2Many | FieldType::Rev2One => {
            let record = rs.ensure_one()?;
            let reverse = reverse_of(field)?;
            let current = read(&record, field)?;
            let wanted = current.browse(&linked);

            let mut unset = FieldMap::new();
            unset.insert(reverse.to_string(), Value::Null);
            current.subtract(&wanted)?.update_raw(unset, &[])?;

            let mut link = FieldMap::new();
            link.insert(reverse.to_string(), Value::Records(record));
            wanted.subtract(&current)?.update_raw(link, &[])
        }
        other => Err(OrmError::TypeMismatch(format!(
            "Field '{}' of type {} is not written through links",
            field.name(),
            other
        ))),
    }
}
