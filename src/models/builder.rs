use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bootstrap;
use crate::common;
use crate::connection::Database;
use crate::core::{OrmError, Result};
use crate::methods::{Layer, MethodArg, MethodArgs, MethodDecl, Signature, normalize};
use crate::records::RecordCollection;

use super::field::{FieldSpec, ID_FIELD};
use super::model::{ModelDecl, ModelKind};
use super::registry::Registry;

/// Open registry used during the declaration phase. Consumed by
/// [`RegistryBuilder::bootstrap`], which produces the frozen [`Registry`].
#[derive(Debug)]
pub struct RegistryBuilder {
    pub(crate) models: BTreeMap<String, ModelDecl>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Create a builder holding the always-applied common mixins.
    pub fn new() -> Self {
        let models = common::mixin_declarations()
            .into_iter()
            .map(|decl| (decl.name.clone(), decl))
            .collect();
        Self { models }
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub(crate) fn decl(&self, model: &str) -> Result<&ModelDecl> {
        self.models
            .get(model)
            .ok_or_else(|| OrmError::ModelNotFound(model.to_string()))
    }

    fn decl_mut(&mut self, model: &str) -> Result<&mut ModelDecl> {
        self.models
            .get_mut(model)
            .ok_or_else(|| OrmError::ModelNotFound(model.to_string()))
    }

    /// Register an empty model.
    pub fn declare_model(&mut self, name: &str, kind: ModelKind) -> Result<ModelHandle<'_>> {
        if name.is_empty() || name.contains('.') {
            return Err(OrmError::InvalidDeclaration(format!(
                "Invalid model name '{}'",
                name
            )));
        }
        if self.models.contains_key(name) {
            return Err(OrmError::DuplicateModel(name.to_string()));
        }
        self.models.insert(name.to_string(), ModelDecl::new(name, kind));
        Ok(ModelHandle {
            builder: self,
            name: name.to_string(),
        })
    }

    pub fn declare_mixin(&mut self, name: &str) -> Result<ModelHandle<'_>> {
        self.declare_model(name, ModelKind::Mixin)
    }

    /// Handle on an already declared model, for chained extensions.
    pub fn model(&mut self, name: &str) -> Result<ModelHandle<'_>> {
        self.decl(name)?;
        Ok(ModelHandle {
            builder: self,
            name: name.to_string(),
        })
    }

    /// Add fields to a model, replacing same-named declarations.
    pub fn extend_model<I>(&mut self, model: &str, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = FieldSpec>,
    {
        let decl = self.decl_mut(model)?;
        for spec in fields {
            if spec.name() == ID_FIELD {
                return Err(OrmError::InvalidDeclaration(format!(
                    "Field '{}' is reserved on model '{}'",
                    ID_FIELD, model
                )));
            }
            let mut field = spec.field;
            field.model = decl.name.clone();
            decl.fields.insert(field);
        }
        Ok(())
    }

    /// Replace an existing field, declared on the model itself or on one of
    /// its mixins, with a declaration of the same category.
    pub fn override_field(&mut self, model: &str, spec: FieldSpec) -> Result<()> {
        let name = spec.name().to_string();
        let existing = match self.decl(model)?.fields.get(&name) {
            Some(field) => Some(field.clone()),
            None => self
                .mixin_chain(model)
                .unwrap_or_default()
                .iter()
                .rev()
                .find_map(|mixin| self.models.get(mixin)?.fields.get(&name).cloned()),
        };
        let existing = existing.ok_or_else(|| OrmError::FieldNotFound(name.clone(), model.to_string()))?;

        if existing.field_type().category() != spec.field_type().category() {
            return Err(OrmError::IncompatibleOverride {
                model: model.to_string(),
                field: name,
                reason: format!(
                    "{} cannot replace {}",
                    spec.field_type(),
                    existing.field_type()
                ),
            });
        }

        let mut spec = spec;
        if !spec.explicit_column {
            spec.field.column = existing.column().to_string();
        }
        self.extend_model(model, [spec])
    }

    /// Append mixins to a model. They apply in the given order, above the
    /// mixins already declared.
    pub fn add_mixins(&mut self, model: &str, mixins: &[&str]) -> Result<()> {
        let decl = self.decl_mut(model)?;
        for mixin in mixins {
            if *mixin == model {
                return Err(OrmError::InvalidDeclaration(format!(
                    "Model '{}' cannot mix itself in",
                    model
                )));
            }
            if !decl.mixins.iter().any(|m| m == mixin) {
                decl.mixins.push(mixin.to_string());
            }
        }
        Ok(())
    }

    /// Default ordering, e.g. `&["Name", "id desc"]`.
    pub fn set_order(&mut self, model: &str, order: &[&str]) -> Result<()> {
        self.decl_mut(model)?.order = order.iter().map(|o| o.to_string()).collect();
        Ok(())
    }

    /// Field used by `child_of` conditions targeting this model.
    pub fn set_parent_field(&mut self, model: &str, field: &str) -> Result<()> {
        self.decl_mut(model)?.parent_field = field.to_string();
        Ok(())
    }

    pub fn set_table(&mut self, model: &str, table: &str) -> Result<()> {
        self.decl_mut(model)?.table = table.to_string();
        Ok(())
    }

    /// Establish the base layer of a method.
    pub fn create_method<A, R, F>(&mut self, model: &str, method: &str, f: F) -> Result<()>
    where
        A: MethodArgs,
        R: MethodArg,
        F: Fn(&RecordCollection, A) -> Result<R> + Send + Sync + 'static,
    {
        let signature = Signature::of::<A, R>();
        if self.decl(model)?.methods.contains_key(method) {
            return Err(OrmError::DuplicateMethod {
                model: model.to_string(),
                method: method.to_string(),
            });
        }
        if let Some(inherited) = self.inherited_signature(model, method) {
            check_signature(model, method, &inherited, &signature)?;
        }

        let decl = self.decl_mut(model)?;
        let layer = Layer::new(&decl.name, normalize(f));
        decl.methods.insert(
            method.to_string(),
            MethodDecl {
                signature,
                layers: vec![layer],
            },
        );
        Ok(())
    }

    /// Push a new top layer on a method declared on the model or on one of
    /// its mixins.
    pub fn extend_method<A, R, F>(&mut self, model: &str, method: &str, f: F) -> Result<()>
    where
        A: MethodArgs,
        R: MethodArg,
        F: Fn(&RecordCollection, A) -> Result<R> + Send + Sync + 'static,
    {
        let signature = Signature::of::<A, R>();
        let expected = match self.decl(model)?.methods.get(method) {
            Some(existing) => existing.signature.clone(),
            None => self
                .inherited_signature(model, method)
                .ok_or_else(|| OrmError::MethodNotFound {
                    model: model.to_string(),
                    method: method.to_string(),
                })?,
        };
        check_signature(model, method, &expected, &signature)?;

        let decl = self.decl_mut(model)?;
        let layer = Layer::new(&decl.name, normalize(f));
        decl.methods
            .entry(method.to_string())
            .or_insert_with(|| MethodDecl {
                signature: expected,
                layers: Vec::new(),
            })
            .layers
            .push(layer);
        Ok(())
    }

    fn inherited_signature(&self, model: &str, method: &str) -> Option<Signature> {
        self.mixin_chain(model)
            .unwrap_or_default()
            .iter()
            .rev()
            .find_map(|mixin| {
                self.models
                    .get(mixin)
                    .and_then(|decl| decl.methods.get(method))
                    .map(|decl| decl.signature.clone())
            })
    }

    /// Flattened mixins of a model, bottom of the stack first: the common
    /// mixins for its kind, then declared mixins (each preceded by its own).
    pub(crate) fn mixin_chain(&self, model: &str) -> Result<Vec<String>> {
        let decl = self.decl(model)?;
        let mut chain: Vec<String> = common::mixins_for(decl.kind)
            .iter()
            .map(|m| m.to_string())
            .collect();
        let mut visiting = vec![model.to_string()];
        self.collect_mixins(decl, &mut chain, &mut visiting)?;
        Ok(chain)
    }

    fn collect_mixins(
        &self,
        decl: &ModelDecl,
        chain: &mut Vec<String>,
        visiting: &mut Vec<String>,
    ) -> Result<()> {
        for name in &decl.mixins {
            if visiting.contains(name) {
                return Err(OrmError::InvalidDeclaration(format!(
                    "Mixin cycle through '{}'",
                    name
                )));
            }
            let mixin = self.decl(name)?;
            if mixin.kind != ModelKind::Mixin {
                return Err(OrmError::InvalidDeclaration(format!(
                    "Model '{}' mixes in '{}', which is not a mixin",
                    decl.name, name
                )));
            }
            visiting.push(name.clone());
            self.collect_mixins(mixin, chain, visiting)?;
            visiting.pop();
            if !chain.contains(name) {
                chain.push(name.clone());
            }
        }
        Ok(())
    }

    /// Freeze the declarations and synchronize the database schema.
    pub fn bootstrap(self, db: &dyn Database) -> Result<Arc<Registry>> {
        bootstrap::run(self, Some(db)).map(Arc::new)
    }

    /// Freeze the declarations without touching any database.
    pub fn bootstrap_offline(self) -> Result<Arc<Registry>> {
        bootstrap::run(self, None).map(Arc::new)
    }

    /// Bootstrap and install the result as the process-wide registry.
    pub fn bootstrap_global(self, db: &dyn Database) -> Result<Arc<Registry>> {
        let registry = self.bootstrap(db)?;
        Registry::install(Arc::clone(&registry))?;
        Ok(registry)
    }
}

pub(crate) fn check_signature(model: &str, method: &str, expected: &Signature, found: &Signature) -> Result<()> {
    if expected == found {
        return Ok(());
    }
    Err(OrmError::SignatureMismatch {
        model: model.to_string(),
        method: method.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    })
}

/// Chainable view on one model of a [`RegistryBuilder`].
pub struct ModelHandle<'a> {
    builder: &'a mut RegistryBuilder,
    name: String,
}

impl ModelHandle<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields<I>(self, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = FieldSpec>,
    {
        self.builder.extend_model(&self.name, fields)?;
        Ok(self)
    }

    pub fn override_field(self, spec: FieldSpec) -> Result<Self> {
        self.builder.override_field(&self.name, spec)?;
        Ok(self)
    }

    pub fn mixins(self, mixins: &[&str]) -> Result<Self> {
        self.builder.add_mixins(&self.name, mixins)?;
        Ok(self)
    }

    pub fn order(self, order: &[&str]) -> Result<Self> {
        self.builder.set_order(&self.name, order)?;
        Ok(self)
    }

    pub fn parent_field(self, field: &str) -> Result<Self> {
        self.builder.set_parent_field(&self.name, field)?;
        Ok(self)
    }

    pub fn table(self, table: &str) -> Result<Self> {
        self.builder.set_table(&self.name, table)?;
        Ok(self)
    }

    pub fn method<A, R, F>(self, method: &str, f: F) -> Result<Self>
    where
        A: MethodArgs,
        R: MethodArg,
        F: Fn(&RecordCollection, A) -> Result<R> + Send + Sync + 'static,
    {
        self.builder.create_method(&self.name, method, f)?;
        Ok(self)
    }

    pub fn extend<A, R, F>(self, method: &str, f: F) -> Result<Self>
    where
        A: MethodArgs,
        R: MethodArg,
        F: Fn(&RecordCollection, A) -> Result<R> + Send + Sync + 'static,
    {
        self.builder.extend_method(&self.name, method, f)?;
        Ok(self)
    }
}
