use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::core::{OrmError, Result, snake_case};
use crate::methods::{MethodDecl, MethodStack};

use super::field::{Field, FieldCollection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Table-backed model managed by schema sync.
    Regular,
    /// Bundle of fields and methods merged into other models. Never queried.
    Mixin,
    /// Table-backed model whose table is not managed by schema sync.
    Manual,
}

/// Default parent field used by `child_of` conditions.
pub const DEFAULT_PARENT_FIELD: &str = "Parent";

/// Open, mutable model declaration held by the registry builder.
#[derive(Clone, Debug)]
pub(crate) struct ModelDecl {
    pub(crate) name: String,
    pub(crate) kind: ModelKind,
    pub(crate) table: String,
    pub(crate) fields: FieldCollection,
    pub(crate) methods: BTreeMap<String, MethodDecl>,
    pub(crate) mixins: Vec<String>,
    pub(crate) order: Vec<String>,
    pub(crate) parent_field: String,
}

impl ModelDecl {
    pub(crate) fn new(name: &str, kind: ModelKind) -> Self {
        let mut fields = FieldCollection::new();
        if kind != ModelKind::Mixin {
            let mut id = Field::primary_key();
            id.model = name.to_string();
            fields.insert(id);
        }
        Self {
            name: name.to_string(),
            kind,
            table: snake_case(name),
            fields,
            methods: BTreeMap::new(),
            mixins: Vec::new(),
            order: vec!["id".to_string()],
            parent_field: DEFAULT_PARENT_FIELD.to_string(),
        }
    }
}

/// A frozen model: fields and composed method stacks.
#[derive(Debug)]
pub struct Model {
    pub(crate) name: String,
    pub(crate) kind: ModelKind,
    pub(crate) table: String,
    pub(crate) fields: FieldCollection,
    pub(crate) methods: HashMap<String, MethodStack>,
    pub(crate) mixins: Vec<String>,
    pub(crate) order: Vec<String>,
    pub(crate) parent_field: String,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn is_mixin(&self) -> bool {
        self.kind == ModelKind::Mixin
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &FieldCollection {
        &self.fields
    }

    /// Lookup a field by name or column.
    pub fn field(&self, name: &str) -> Result<&Arc<Field>> {
        self.fields
            .get(name)
            .ok_or_else(|| OrmError::FieldNotFound(name.to_string(), self.name.clone()))
    }

    pub fn method(&self, name: &str) -> Result<&MethodStack> {
        self.methods.get(name).ok_or_else(|| OrmError::MethodNotFound {
            model: self.name.clone(),
            method: name.to_string(),
        })
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Mixins applied to this model, bottom of the stack first.
    pub fn mixins(&self) -> &[String] {
        &self.mixins
    }

    pub fn default_order(&self) -> &[String] {
        &self.order
    }

    pub fn parent_field(&self) -> &str {
        &self.parent_field
    }
}
