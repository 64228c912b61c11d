use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{FieldMap, Result, Value};
use crate::models::{Model, Registry};

/// Field values of loaded records, keyed by `(model, id)` then by column.
///
/// Entries never outlive the environment that filled them.
#[derive(Debug, Default)]
pub struct Cache {
    records: HashMap<(String, i64), FieldMap>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, model: &str, id: i64, column: &str, value: Value) {
        self.records
            .entry((model.to_string(), id))
            .or_default()
            .insert(column.to_string(), value);
    }

    /// Store one loaded row. Keys of `row` are field paths of `model`; the
    /// value of a dotted path `A.B` is stored on the record referenced by
    /// `A`, whose id must be present in the same row.
    pub fn add_row(&mut self, registry: &Registry, model: &Arc<Model>, id: i64, row: &FieldMap) -> Result<()> {
        for (path, value) in row {
            let (owner, owner_id, name) = match path.rsplit_once('.') {
                None => (Arc::clone(model), id, path.as_str()),
                Some((prefix, name)) => {
                    let Some(owner_id) = row.get(prefix).and_then(Value::as_i64) else {
                        continue;
                    };
                    let (_, prefix_field) = registry.field_path(model, prefix)?;
                    let Some(target) = prefix_field.target() else {
                        continue;
                    };
                    (Arc::clone(registry.model(target)?), owner_id, name)
                }
            };
            let field = owner.field(name)?;
            self.set(owner.name(), owner_id, field.column(), value.clone());
        }
        Ok(())
    }

    pub fn get(&self, model: &str, id: i64, column: &str) -> Option<&Value> {
        self.records.get(&(model.to_string(), id))?.get(column)
    }

    pub fn record(&self, model: &str, id: i64) -> Option<&FieldMap> {
        self.records.get(&(model.to_string(), id))
    }

    /// Value at the end of a dotted path, following cached foreign keys.
    /// `None` as soon as one hop is not cached; the zero value of the last
    /// field when a foreign key on the way is unset.
    pub fn get_path(&self, registry: &Registry, model: &Model, id: i64, path: &str) -> Result<Option<Value>> {
        let mut current_model = model.name().to_string();
        let mut current_id = id;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let owner = registry.model(&current_model)?;
            let field = owner.field(segment)?;
            if !field.is_stored() {
                return Ok(None);
            }
            let Some(value) = self.get(&current_model, current_id, field.column()) else {
                return Ok(None);
            };
            if segments.peek().is_none() {
                return Ok(Some(value.clone()));
            }
            let (Some(target), true) = (field.target(), field.field_type().is_fk()) else {
                return Ok(None);
            };
            match value.as_i64() {
                Some(next) => {
                    current_model = target.to_string();
                    current_id = next;
                }
                None => {
                    let (_, last) = registry.field_path(model, path)?;
                    return Ok(Some(last.field_type().zero_value()));
                }
            }
        }
        Ok(None)
    }

    pub fn invalidate_record(&mut self, model: &str, id: i64) {
        self.records.remove(&(model.to_string(), id));
    }

    pub fn invalidate_model(&mut self, model: &str) {
        self.records.retain(|(name, _), _| name != model);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
