use std::sync::Arc;

use chrono::{NaiveDateTime, SubsecRound, Utc};
use log::{debug, error};

use crate::core::{FieldMap, OrmError, Result, Value};
use crate::models::{Field, ID_FIELD};
use crate::query::SqlBuilder;

use super::compute::{self, Pending};
use super::{RecordCollection, relations};

pub(crate) const CREATE_DATE: &str = "CreateDate";
pub(crate) const WRITE_DATE: &str = "WriteDate";

fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}

/// Field values of a create or update, split by how they are persisted.
struct Payload {
    /// Encoded column values.
    columns: Vec<(String, Value)>,
    /// Decoded values of the same columns, for the cache.
    cached: Vec<(String, Value)>,
    /// x2many and rev2one values, written through links.
    links: Vec<(Arc<Field>, Value)>,
    /// Names of every field written.
    changed: Vec<String>,
}

impl RecordCollection {
    fn payload(&self, data: FieldMap) -> Result<Payload> {
        let mut payload = Payload {
            columns: Vec::new(),
            cached: Vec::new(),
            links: Vec::new(),
            changed: Vec::new(),
        };
        for (key, value) in data {
            let field = Arc::clone(self.model.field(&key)?);
            if field.name() == ID_FIELD {
                continue;
            }
            if field.field_type().is_non_stored_relation() && !field.is_related() && !field.is_computed() {
                payload.changed.push(field.name().to_string());
                payload.links.push((field, value));
                continue;
            }
            if !field.is_stored() || field.is_stored_computed() {
                debug!("Ignoring value of derived field {}.{}", self.model.name(), field.name());
                continue;
            }
            if payload.columns.iter().any(|(c, _)| c == field.column()) {
                continue;
            }
            let encoded = field.encode(value)?;
            payload.cached.push((field.column().to_string(), field.decode(encoded.clone())?));
            payload.columns.push((field.column().to_string(), encoded));
            payload.changed.push(field.name().to_string());
        }
        Ok(payload)
    }

    fn fill_defaults(&self, data: &mut FieldMap) {
        for field in self.model.fields().iter() {
            if data.contains_key(field.name()) || data.contains_key(field.column()) {
                continue;
            }
            if let Some(default) = field.default_fn() {
                data.insert(field.name().to_string(), default(&*self.env));
            }
        }
    }

    fn check_required(&self, columns: &[(String, Value)]) -> Result<()> {
        for field in self.model.fields().stored() {
            if field.name() == ID_FIELD || !field.is_required() || field.is_stored_computed() {
                continue;
            }
            let present = columns
                .iter()
                .any(|(column, value)| column == field.column() && !value.is_null());
            if !present {
                return Err(OrmError::ConstraintViolation(format!(
                    "Field '{}.{}' is required",
                    self.model.name(),
                    field.name()
                )));
            }
        }
        Ok(())
    }

    /// Insert one record without going through the `create` method.
    ///
    /// Ids and non-stored fields of `data` are ignored; stored computed
    /// fields of the new record and of records depending on it are
    /// recomputed afterwards.
    pub fn create_raw(&self, data: FieldMap) -> Result<RecordCollection> {
        let mut data = data;
        self.fill_defaults(&mut data);
        let stamp = Value::DateTime(now());
        for name in [CREATE_DATE, WRITE_DATE] {
            if self.model.fields().contains(name) {
                data.insert(name.to_string(), stamp.clone());
            }
        }

        let payload = self.payload(data)?;
        self.check_required(&payload.columns)?;

        let statement = SqlBuilder::insert(self.env.adapter(), &self.model, &payload.columns);
        let result = self.env.query(&statement)?;
        let id = result
            .scalar()
            .and_then(Value::as_i64)
            .ok_or_else(|| OrmError::Database(format!("INSERT into '{}' returned no id", self.model.table())))?;
        debug!("Created {}({})", self.model.name(), id);

        let created = self.browse(&[id]);
        {
            let mut cache = self.env.cache()?;
            for (column, value) in payload.cached {
                cache.set(self.model.name(), id, &column, value);
            }
        }
        for (field, value) in payload.links {
            relations::write(&created, &field, value)?;
        }

        let own = Pending {
            model: self.model.name().to_string(),
            field: String::new(),
            ids: vec![id],
        };
        let mut pending: Vec<Pending> = compute::stored_computed(&created)
            .into_iter()
            .map(|field| Pending { field, ..own.clone() })
            .collect();
        pending = compute::merge(pending, compute::dependents(&created, &payload.changed)?);
        compute::recompute(&created, pending)?;
        Ok(created)
    }

    /// Drop the cached values of `ids` before running `f`, so that a failing
    /// write never leaves stale values behind.
    pub(crate) fn with_invalidation<T>(&self, ids: &[i64], f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        {
            let mut cache = self.env.cache()?;
            for id in ids {
                cache.invalidate_record(self.model.name(), *id);
            }
        }
        f(self)
    }

    /// Update every record without going through the `write` method.
    /// Fields named in `unset` are set to null.
    pub fn update_raw(&self, data: FieldMap, unset: &[&str]) -> Result<()> {
        let ids = self.ids()?;
        if ids.is_empty() {
            return Ok(());
        }
        let records = self.browse(&ids);
        let mut data = data;
        for name in unset {
            data.insert(name.to_string(), Value::Null);
        }
        if self.model.fields().contains(WRITE_DATE) && !data.contains_key(WRITE_DATE) {
            data.insert(WRITE_DATE.to_string(), Value::DateTime(now()));
        }

        let payload = self.payload(data)?;
        let before = compute::dependents(&records, &payload.changed)?;
        records.with_invalidation(&ids, |rs| {
            if !payload.columns.is_empty() {
                let statement = SqlBuilder::update(rs.env.adapter(), &rs.model, &payload.columns, &ids);
                rs.env.execute(&statement)?;
            }
            for (field, value) in &payload.links {
                relations::write(rs, field, value.clone())?;
            }
            Ok(())
        })?;
        {
            let mut cache = self.env.cache()?;
            for id in &ids {
                for (column, value) in &payload.cached {
                    cache.set(self.model.name(), *id, column, value.clone());
                }
            }
        }

        let after = compute::dependents(&records, &payload.changed)?;
        compute::recompute(&records, compute::merge(before, after))
    }

    /// Delete every record without going through the `unlink` method.
    /// Foreign keys pointing to the deleted records are reset to null.
    pub fn delete_raw(&self) -> Result<u64> {
        let ids = self.ids()?;
        if ids.is_empty() {
            return Ok(0);
        }
        let records = self.browse(&ids);
        let fields: Vec<String> = self.model.fields().names().map(str::to_string).collect();
        let pending = compute::dependents(&records, &fields)?;

        let deleted = records.with_invalidation(&ids, |rs| {
            rs.clear_references(&ids)?;
            rs.env
                .execute(&SqlBuilder::delete(rs.env.adapter(), &rs.model, &ids))
        })?;
        debug!("Deleted {} record(s) of {}", deleted, self.model.name());

        let pending: Vec<Pending> = pending
            .into_iter()
            .map(|mut p| {
                if p.model == self.model.name() {
                    p.ids.retain(|id| !ids.contains(id));
                }
                p
            })
            .filter(|p| !p.ids.is_empty())
            .collect();
        compute::recompute(&records, pending)?;
        Ok(deleted)
    }

    /// Null out many2one and one2one columns referencing `ids`.
    fn clear_references(&self, ids: &[i64]) -> Result<()> {
        let adapter = self.env.adapter();
        for model in self.env.registry().models() {
            if model.is_mixin() {
                continue;
            }
            let mut touched = false;
            for field in model.fields().iter() {
                if !field.field_type().is_fk() || !field.is_stored() || field.target() != Some(self.model.name()) {
                    continue;
                }
                let statement = SqlBuilder::clear_references(adapter, model, field, ids);
                if self.env.execute(&statement)? > 0 {
                    touched = true;
                }
            }
            if touched {
                self.env.cache()?.invalidate_model(model.name());
            }
        }
        Ok(())
    }

    /// Write a single field on every record: one round trip per call.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let ids = self.ids()?;
        if ids.is_empty() {
            error!("Cannot set '{}' on an empty {} collection", name, self.model.name());
            return Err(OrmError::EmptyRecordCollection(format!("set {}", name)));
        }
        let mut data = FieldMap::new();
        data.insert(name.to_string(), value.into());
        self.browse(&ids).write(data).map(|_| ())
    }
}
