use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::condition::{Condition, Operator};
use crate::core::{FieldMap, Result, Value};
use crate::models::Field;
use crate::query::SqlBuilder;

use super::RecordCollection;

const MAX_RECOMPUTE_DEPTH: usize = 16;

/// Stored computed field of some records, waiting to be recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pending {
    pub model: String,
    pub field: String,
    pub ids: Vec<i64>,
}

/// Fresh value of a computed or related field on a single record.
pub(crate) fn evaluate(record: &RecordCollection, field: &Field) -> Result<Value> {
    if let Some(method) = field.compute() {
        let values: FieldMap = record.call_typed(method, Vec::new())?;
        let value = values.get(field.name()).or_else(|| values.get(field.column()));
        return Ok(value.cloned().unwrap_or(Value::Null));
    }
    match field.related() {
        Some(path) => record.get_path(path),
        None => Ok(Value::Null),
    }
}

/// Stored computed fields depending on `fields` of `rs`, with the records
/// holding them.
pub(crate) fn dependents(rs: &RecordCollection, fields: &[String]) -> Result<Vec<Pending>> {
    let ids = rs.ids()?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let registry = rs.env().registry();
    let mut pending: BTreeMap<(String, String), Vec<i64>> = BTreeMap::new();
    for name in fields {
        for trigger in registry.triggers(rs.model_name(), name) {
            let targets = match &trigger.path {
                None if trigger.model == rs.model_name() => ids.clone(),
                None => continue,
                Some(path) => rs
                    .pool(&trigger.model)?
                    .filter(Condition::leaf(path, Operator::In, ids.clone()))
                    .ids()?,
            };
            let entry = pending
                .entry((trigger.model.clone(), trigger.field.clone()))
                .or_default();
            for id in targets {
                if !entry.contains(&id) {
                    entry.push(id);
                }
            }
        }
    }
    Ok(pending
        .into_iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|((model, field), ids)| Pending { model, field, ids })
        .collect())
}

/// Merge two pending lists, uniting the ids of the same computed field.
pub(crate) fn merge(mut left: Vec<Pending>, right: Vec<Pending>) -> Vec<Pending> {
    for item in right {
        match left
            .iter_mut()
            .find(|p| p.model == item.model && p.field == item.field)
        {
            Some(existing) => {
                for id in item.ids {
                    if !existing.ids.contains(&id) {
                        existing.ids.push(id);
                    }
                }
            }
            None => left.push(item),
        }
    }
    left
}

/// Recompute and persist pending fields, then whatever depends on them.
pub(crate) fn recompute(rs: &RecordCollection, pending: Vec<Pending>) -> Result<()> {
    recompute_at(rs, pending, 0)
}

fn recompute_at(rs: &RecordCollection, pending: Vec<Pending>, depth: usize) -> Result<()> {
    if depth > MAX_RECOMPUTE_DEPTH {
        warn!(
            "Stopped recomputing stored fields after {} levels: {:?}",
            MAX_RECOMPUTE_DEPTH, pending
        );
        return Ok(());
    }
    let env = rs.env();
    for Pending { model, field, ids } in pending {
        let records = rs.pool(&model)?.browse(&ids);
        let field = Arc::clone(records.model().field(&field)?);
        debug!("Recomputing {}.{} on {:?}", model, field.name(), ids);
        for record in records.records()? {
            let Some(&id) = record.resolved_ids().and_then(<[i64]>::first) else {
                continue;
            };
            let value = field.encode(evaluate(&record, &field)?)?;
            let statement = SqlBuilder::update(
                env.adapter(),
                record.model(),
                &[(field.column().to_string(), value.clone())],
                &[id],
            );
            env.execute(&statement)?;
            let decoded = field.decode(value)?;
            env.cache()?.set(&model, id, field.column(), decoded);

            let next = dependents(&record, &[field.name().to_string()])?;
            recompute_at(rs, next, depth + 1)?;
        }
    }
    Ok(())
}

/// Names of the stored computed and stored related fields of `rs`'s model.
pub(crate) fn stored_computed(rs: &RecordCollection) -> Vec<String> {
    rs.model()
        .fields()
        .iter()
        .filter(|f| f.is_stored_computed())
        .map(|f| f.name().to_string())
        .collect()
}
