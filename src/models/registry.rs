use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use crate::core::{OrmError, Result};

use super::field::Field;
use super::model::Model;

lazy_static! {
    static ref GLOBAL_REGISTRY: RwLock<Option<Arc<Registry>>> = RwLock::new(None);
}

/// A stored computed field to refresh when `(model, field)` changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeTrigger {
    /// Model owning the computed field.
    pub model: String,
    /// The computed field itself.
    pub field: String,
    /// Path from the dependent model to the changed records, `None` when the
    /// change happened on the dependent records themselves.
    pub path: Option<String>,
}

/// Frozen catalogue of models. Immutable and freely shared across threads.
#[derive(Debug)]
pub struct Registry {
    models: HashMap<String, Arc<Model>>,
    triggers: HashMap<(String, String), Vec<ComputeTrigger>>,
}

impl Registry {
    pub(crate) fn new(
        models: HashMap<String, Arc<Model>>,
        triggers: HashMap<(String, String), Vec<ComputeTrigger>>,
    ) -> Self {
        Self { models, triggers }
    }

    pub fn model(&self, name: &str) -> Result<&Arc<Model>> {
        self.models
            .get(name)
            .ok_or_else(|| OrmError::ModelNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Models sorted by name.
    pub fn models(&self) -> Vec<&Arc<Model>> {
        let mut models: Vec<&Arc<Model>> = self.models.values().collect();
        models.sort_by(|a, b| a.name().cmp(b.name()));
        models
    }

    /// Model owning the last field of a dotted `path` starting at `model`,
    /// and that field.
    pub fn field_path(&self, model: &Model, path: &str) -> Result<(Arc<Model>, Arc<Field>)> {
        let mut owner = self.model(model.name())?;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let field = owner.field(segment)?;
            if segments.peek().is_none() {
                return Ok((Arc::clone(owner), Arc::clone(field)));
            }
            let target = field.target().ok_or_else(|| {
                OrmError::InvalidCondition(format!(
                    "Field '{}.{}' in path '{}' is not a relation",
                    owner.name(),
                    segment,
                    path
                ))
            })?;
            owner = self.model(target)?;
        }
        Err(OrmError::InvalidCondition("Empty field path".into()))
    }

    /// Computed fields depending on `field` of `model`.
    pub fn triggers(&self, model: &str, field: &str) -> &[ComputeTrigger] {
        self.triggers
            .get(&(model.to_string(), field.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Install `registry` as the process-wide registry. Only one registry can
    /// ever be installed.
    pub fn install(registry: Arc<Registry>) -> Result<()> {
        let mut global = GLOBAL_REGISTRY.write()?;
        if global.is_some() {
            return Err(OrmError::AlreadyBootstrapped);
        }
        *global = Some(registry);
        Ok(())
    }

    /// The process-wide registry installed by [`Registry::install`].
    pub fn global() -> Result<Arc<Registry>> {
        GLOBAL_REGISTRY
            .read()?
            .clone()
            .ok_or_else(|| OrmError::InvalidDeclaration("No registry has been bootstrapped".into()))
    }
}
