use std::sync::Arc;

use crate::condition::{Condition, Operator};
use crate::core::{FieldMap, Result, Value};
use crate::models::{Field, ID_FIELD};
use crate::query::Query;

use super::{RecordCollection, compute, dedup, relations};

impl RecordCollection {
    /// Resolve the collection to ids.
    ///
    /// A resolved collection, or one without any condition, is returned as
    /// is: an empty filter never selects the whole table.
    pub fn fetch(&self) -> Result<RecordCollection> {
        if self.ids.is_some() || !self.query.selects_records() {
            return Ok(self.clone());
        }
        let statement = self.builder().select_ids(&self.query)?;
        let result = self.env.query(&statement)?;
        Ok(self.with_ids(dedup(result.column_ids(0))))
    }

    /// Ids of the records, resolving the collection if needed.
    pub fn ids(&self) -> Result<Vec<i64>> {
        match &self.ids {
            Some(ids) => Ok(ids.clone()),
            None => Ok(self.fetch()?.ids.unwrap_or_default()),
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.ids()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of matching records, counted by the database.
    pub fn search_count(&self) -> Result<usize> {
        if let Some(ids) = &self.ids {
            return Ok(ids.len());
        }
        if !self.query.selects_records() {
            return Ok(0);
        }
        let statement = self.builder().count(&self.query)?;
        let result = self.env.query(&statement)?;
        Ok(result.scalar().and_then(Value::as_i64).unwrap_or(0) as usize)
    }

    /// Query selecting this collection's records in its ordering.
    fn load_query(&self) -> Query {
        match &self.ids {
            Some(ids) => {
                let mut query = Query::with_condition(Condition::leaf(ID_FIELD, Operator::In, ids.clone()));
                query.order = self.query.order.clone();
                query
            }
            None => self.query.clone(),
        }
    }

    /// Loadable paths for `fields`: stored paths only, each dotted path
    /// preceded by the foreign keys it goes through.
    fn load_paths(&self, fields: &[&str]) -> Result<Vec<String>> {
        if fields.is_empty() {
            return Ok(self
                .model
                .fields()
                .stored()
                .into_iter()
                .filter(|f| f.name() != ID_FIELD)
                .map(|f| f.name().to_string())
                .collect());
        }

        let registry = self.env.registry();
        let mut paths: Vec<String> = Vec::new();
        'paths: for path in fields {
            let segments: Vec<&str> = path.split('.').collect();
            let mut prefixes = Vec::with_capacity(segments.len());
            for depth in 1..=segments.len() {
                let prefix = segments[..depth].join(".");
                let (_, field) = registry.field_path(&self.model, &prefix)?;
                if !field.is_stored() {
                    continue 'paths;
                }
                prefixes.push(prefix);
            }
            for prefix in prefixes {
                if prefix != ID_FIELD && !paths.contains(&prefix) {
                    paths.push(prefix);
                }
            }
        }
        Ok(paths)
    }

    /// Read `fields` (all stored fields when empty) of every record into the
    /// cache and rebind the collection to the ids returned.
    pub fn load(&self, fields: &[&str]) -> Result<RecordCollection> {
        if self.ids.as_ref().is_some_and(Vec::is_empty)
            || (self.ids.is_none() && !self.query.selects_records())
        {
            return Ok(self.clone());
        }
        let paths = self.load_paths(fields)?;
        let query = self.load_query();
        let (statement, loaded) = self.builder().select(&query, &paths)?;
        let result = self.env.query(&statement)?;

        let mut ids = Vec::with_capacity(result.row_count());
        for row in &result.rows {
            let Some(id) = row.first().and_then(Value::as_i64) else {
                continue;
            };
            let mut values = FieldMap::new();
            for ((path, field), value) in paths.iter().zip(&loaded).zip(row.iter().skip(1)) {
                values.insert(path.clone(), field.decode(value.clone())?);
            }
            self.env
                .cache()?
                .add_row(self.env.registry(), &self.model, id, &values)?;
            ids.push(id);
        }
        Ok(self.with_ids(dedup(ids)))
    }

    /// Value read by `get` on an empty collection.
    fn zero_value(&self, field: &Field) -> Result<Value> {
        match (field.field_type().is_relation(), field.target()) {
            (true, Some(target)) => Ok(Value::Records(self.pool(target)?.browse(&[]))),
            _ => Ok(field.field_type().zero_value()),
        }
    }

    /// Relation values as collections of the target model.
    pub(crate) fn materialize(&self, field: &Field, raw: Value) -> Result<Value> {
        match (field.field_type().is_relation(), field.target(), raw) {
            (_, _, raw @ Value::Records(_)) => Ok(raw),
            (true, Some(target), raw) => {
                let ids = raw.to_ids()?;
                Ok(Value::Records(self.pool(target)?.browse(&ids)))
            }
            (_, _, raw) => Ok(raw),
        }
    }

    /// Value of `name` on the first record. `name` may be a dotted path.
    pub fn get(&self, name: &str) -> Result<Value> {
        if name.contains('.') {
            return self.get_path(name);
        }
        let field = Arc::clone(self.model.field(name)?);
        let ids = self.ids()?;
        let Some(&id) = ids.first() else {
            return self.zero_value(&field);
        };
        let record = self.browse(&[id]);

        if field.is_computed() && !field.is_stored() {
            let value = compute::evaluate(&record, &field)?;
            return self.materialize(&field, value);
        }
        if let (Some(related), false) = (field.related(), field.is_stored()) {
            return record.get_path(related);
        }
        if field.field_type().is_non_stored_relation() {
            return relations::read(&record, &field).map(Value::Records);
        }

        let cached = self.env.cache()?.get(self.model.name(), id, field.column()).cloned();
        let raw = match cached {
            Some(value) => value,
            None => {
                self.browse(&ids).load(&[])?;
                let loaded = self.env.cache()?.get(self.model.name(), id, field.column()).cloned();
                loaded.unwrap_or(Value::Null)
            }
        };
        self.materialize(&field, raw)
    }

    /// Value at the end of a dotted path, read hop by hop through the cache.
    pub fn get_path(&self, path: &str) -> Result<Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let Some(rest) = rest else {
            return self.get(head);
        };

        if let Some(&id) = self.ids()?.first() {
            let registry = self.env.registry();
            let cached = self.env.cache()?.get_path(registry, &self.model, id, path)?;
            if let Some(raw) = cached {
                let (_, field) = registry.field_path(&self.model, path)?;
                return self.materialize(&field, raw);
            }
        }

        match self.get(head)? {
            Value::Records(next) => next.get_path(rest),
            _ => {
                let (_, field) = self.env.registry().field_path(&self.model, path)?;
                Ok(field.field_type().zero_value())
            }
        }
    }

    /// Typed [`RecordCollection::get`].
    pub fn get_typed<R: crate::methods::MethodArg>(&self, name: &str) -> Result<R> {
        R::from_value(self.get(name)?)
    }
}
