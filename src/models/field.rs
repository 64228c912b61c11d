use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use crate::core::value::{DATETIME_FORMAT, DATE_FORMAT};
use crate::core::{OrmError, Result, Value, snake_case};
use crate::environment::Environment;

/// Name of the primary key present on every model.
pub const ID_FIELD: &str = "id";

pub type DefaultFn = Arc<dyn Fn(&Environment) -> Value + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Boolean,
    Char,
    Text,
    Integer,
    Float,
    Date,
    DateTime,
    Selection,
    Binary,
    Many2One,
    One2Many,
    Many2Many,
    One2One,
    Rev2One,
}

/// Groups of field types an override may swap between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    Simple,
    String,
    Float,
    ForeignKey,
    Reverse,
    Many2Many,
}

impl FieldType {
    pub fn category(self) -> FieldCategory {
        match self {
            Self::Boolean | Self::Integer | Self::Date | Self::DateTime | Self::Binary => {
                FieldCategory::Simple
            }
            Self::Char | Self::Text | Self::Selection => FieldCategory::String,
            Self::Float => FieldCategory::Float,
            Self::Many2One | Self::One2One => FieldCategory::ForeignKey,
            Self::One2Many | Self::Rev2One => FieldCategory::Reverse,
            Self::Many2Many => FieldCategory::Many2Many,
        }
    }

    pub fn is_relation(self) -> bool {
        matches!(
            self,
            Self::Many2One | Self::One2Many | Self::Many2Many | Self::One2One | Self::Rev2One
        )
    }

    /// Relation stored as a foreign key column on this model's table.
    pub fn is_fk(self) -> bool {
        matches!(self, Self::Many2One | Self::One2One)
    }

    pub fn is_reverse(self) -> bool {
        matches!(self, Self::One2Many | Self::Rev2One)
    }

    pub fn is_x2many(self) -> bool {
        matches!(self, Self::One2Many | Self::Many2Many)
    }

    pub fn is_non_stored_relation(self) -> bool {
        matches!(self, Self::One2Many | Self::Many2Many | Self::Rev2One)
    }

    /// Value returned by reads on an empty collection.
    pub fn zero_value(self) -> Value {
        match self {
            Self::Boolean => Value::Boolean(false),
            Self::Char | Self::Text | Self::Selection => Value::Text(String::new()),
            Self::Integer => Value::Integer(0),
            Self::Float => Value::Float(0.0),
            Self::Binary => Value::Binary(Vec::new()),
            Self::One2Many | Self::Many2Many => Value::List(Vec::new()),
            Self::Date | Self::DateTime | Self::Many2One | Self::One2One | Self::Rev2One => {
                Value::Null
            }
        }
    }

    fn column_suffix(self) -> &'static str {
        match self {
            Self::Many2One | Self::One2One => "_id",
            Self::One2Many | Self::Many2Many => "_ids",
            _ => "",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Char => "char",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Selection => "selection",
            Self::Binary => "binary",
            Self::Many2One => "many2one",
            Self::One2Many => "one2many",
            Self::Many2Many => "many2many",
            Self::One2One => "one2one",
            Self::Rev2One => "rev2one",
        };
        write!(f, "{}", name)
    }
}

/// Link table backing a many-to-many field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTable {
    pub table: String,
    pub own_column: String,
    pub target_column: String,
}

/// Metadata of one field of one model.
#[derive(Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) column: String,
    pub(crate) field_type: FieldType,
    pub(crate) model: String,
    pub(crate) label: String,
    pub(crate) target: Option<String>,
    pub(crate) reverse: Option<String>,
    pub(crate) relation: Option<RelationTable>,
    pub(crate) compute: Option<String>,
    pub(crate) stored: bool,
    pub(crate) depends: Vec<String>,
    pub(crate) related: Option<String>,
    pub(crate) embed: bool,
    pub(crate) required: bool,
    pub(crate) index: bool,
    pub(crate) unique: bool,
    pub(crate) no_copy: bool,
    pub(crate) size: Option<usize>,
    pub(crate) selection: Vec<(String, String)>,
    pub(crate) default: Option<DefaultFn>,
}

impl Field {
    pub(crate) fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            column: format!("{}{}", snake_case(name), field_type.column_suffix()),
            field_type,
            model: String::new(),
            label: name.to_string(),
            target: None,
            reverse: None,
            relation: None,
            compute: None,
            stored: false,
            depends: Vec::new(),
            related: None,
            embed: false,
            required: false,
            index: false,
            unique: false,
            no_copy: false,
            size: None,
            selection: Vec::new(),
            default: None,
        }
    }

    pub(crate) fn primary_key() -> Self {
        let mut field = Self::new(ID_FIELD, FieldType::Integer);
        field.required = true;
        field.no_copy = true;
        field
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Name of the model owning this field.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn reverse(&self) -> Option<&str> {
        self.reverse.as_deref()
    }

    pub fn relation(&self) -> Option<&RelationTable> {
        self.relation.as_ref()
    }

    pub fn compute(&self) -> Option<&str> {
        self.compute.as_deref()
    }

    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    pub fn related(&self) -> Option<&str> {
        self.related.as_deref()
    }

    pub fn is_embed(&self) -> bool {
        self.embed
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_indexed(&self) -> bool {
        self.index
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_no_copy(&self) -> bool {
        self.no_copy
    }

    pub fn size(&self) -> Option<usize> {
        self.size
    }

    pub fn selection(&self) -> &[(String, String)] {
        &self.selection
    }

    pub fn default_fn(&self) -> Option<&DefaultFn> {
        self.default.as_ref()
    }

    pub fn is_computed(&self) -> bool {
        self.compute.is_some()
    }

    pub fn is_related(&self) -> bool {
        self.related.is_some()
    }

    /// Stored iff it is neither a reverse/many-to-many relation nor a
    /// non-stored computed or related field.
    pub fn is_stored(&self) -> bool {
        if self.field_type.is_non_stored_relation() {
            return false;
        }
        if (self.compute.is_some() || self.related.is_some()) && !self.stored {
            return false;
        }
        true
    }

    /// Stored field whose value is derived from other fields.
    pub fn is_stored_computed(&self) -> bool {
        self.is_stored() && (self.compute.is_some() || self.related.is_some())
    }

    /// Convert a raw driver value into this field's value shape.
    pub fn decode(&self, value: Value) -> Result<Value> {
        match (self.field_type, value) {
            (FieldType::Boolean, Value::Null) => Ok(Value::Boolean(false)),
            (_, Value::Null) => Ok(Value::Null),
            (FieldType::Boolean, Value::Integer(i)) => Ok(Value::Boolean(i != 0)),
            (FieldType::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (FieldType::Date, Value::Text(s)) => NaiveDate::parse_from_str(&s, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| OrmError::TypeMismatch(format!("Invalid date '{}': {}", s, e))),
            (FieldType::DateTime, Value::Text(s)) => parse_datetime(&s).map(Value::DateTime),
            (_, other) => Ok(other),
        }
    }

    /// Convert a caller-supplied value into the value stored in the column.
    pub fn encode(&self, value: Value) -> Result<Value> {
        match (self.field_type, value) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldType::Many2One | FieldType::One2One, Value::Records(rs)) => {
                let ids = rs.ids()?;
                match ids.as_slice() {
                    [] => Ok(Value::Null),
                    [id] => Ok(Value::Integer(*id)),
                    _ => Err(OrmError::TypeMismatch(format!(
                        "Field '{}' expects a single record, got {}",
                        self.name,
                        ids.len()
                    ))),
                }
            }
            (FieldType::Many2One | FieldType::One2One, Value::Boolean(false)) => Ok(Value::Null),
            (FieldType::Selection, Value::Text(s)) => {
                if !self.selection.is_empty() && !self.selection.iter().any(|(key, _)| *key == s) {
                    return Err(OrmError::ConstraintViolation(format!(
                        "'{}' is not a valid value for selection field '{}.{}'",
                        s, self.model, self.name
                    )));
                }
                Ok(Value::Text(s))
            }
            (FieldType::Date, Value::Text(s)) => self.decode(Value::Text(s)),
            (FieldType::DateTime, Value::Text(s)) => self.decode(Value::Text(s)),
            (FieldType::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (FieldType::Char, Value::Text(s)) => {
                if let Some(size) = self.size {
                    if s.chars().count() > size {
                        return Err(OrmError::ConstraintViolation(format!(
                            "Value of '{}.{}' exceeds {} characters",
                            self.model, self.name, size
                        )));
                    }
                }
                Ok(Value::Text(s))
            }
            (_, value @ (Value::List(_) | Value::Map(_) | Value::Records(_))) => {
                Err(OrmError::TypeMismatch(format!(
                    "Field '{}' of type {} cannot store a {}",
                    self.name,
                    self.field_type,
                    value.type_name()
                )))
            }
            (_, other) => Ok(other),
        }
    }
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| OrmError::TypeMismatch(format!("Invalid datetime '{}': {}", s, e)))
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("type", &self.field_type)
            .field("model", &self.model)
            .field("target", &self.target)
            .field("compute", &self.compute)
            .field("stored", &self.stored)
            .field("related", &self.related)
            .finish_non_exhaustive()
    }
}

/// Declaration of a field, built with one of the typed constructors and
/// refined with chained options.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub(crate) field: Field,
    pub(crate) explicit_column: bool,
}

impl FieldSpec {
    fn of(name: &str, field_type: FieldType) -> Self {
        Self {
            field: Field::new(name, field_type),
            explicit_column: false,
        }
    }

    fn relational(name: &str, field_type: FieldType, target: &str) -> Self {
        let mut spec = Self::of(name, field_type);
        spec.field.target = Some(target.to_string());
        spec
    }

    pub fn boolean(name: &str) -> Self {
        Self::of(name, FieldType::Boolean)
    }

    pub fn integer(name: &str) -> Self {
        Self::of(name, FieldType::Integer)
    }

    pub fn date(name: &str) -> Self {
        Self::of(name, FieldType::Date)
    }

    pub fn datetime(name: &str) -> Self {
        Self::of(name, FieldType::DateTime)
    }

    pub fn binary(name: &str) -> Self {
        Self::of(name, FieldType::Binary)
    }

    pub fn char(name: &str) -> Self {
        Self::of(name, FieldType::Char)
    }

    pub fn text(name: &str) -> Self {
        Self::of(name, FieldType::Text)
    }

    pub fn selection(name: &str, values: &[(&str, &str)]) -> Self {
        let mut spec = Self::of(name, FieldType::Selection);
        spec.field.selection = values
            .iter()
            .map(|(key, label)| (key.to_string(), label.to_string()))
            .collect();
        spec
    }

    pub fn float(name: &str) -> Self {
        Self::of(name, FieldType::Float)
    }

    pub fn many2one(name: &str, target: &str) -> Self {
        Self::relational(name, FieldType::Many2One, target)
    }

    pub fn one2one(name: &str, target: &str) -> Self {
        let mut spec = Self::relational(name, FieldType::One2One, target);
        spec.field.unique = true;
        spec
    }

    /// `reverse` is the many-to-one field on `target` pointing back here.
    pub fn one2many(name: &str, target: &str, reverse: &str) -> Self {
        let mut spec = Self::relational(name, FieldType::One2Many, target);
        spec.field.reverse = Some(reverse.to_string());
        spec
    }

    /// `reverse` is the one-to-one field on `target` pointing back here.
    pub fn rev2one(name: &str, target: &str, reverse: &str) -> Self {
        let mut spec = Self::relational(name, FieldType::Rev2One, target);
        spec.field.reverse = Some(reverse.to_string());
        spec
    }

    pub fn many2many(name: &str, target: &str) -> Self {
        Self::relational(name, FieldType::Many2Many, target)
    }

    /// Field aliasing the value at the end of a dotted path. Its type is
    /// synchronized from the path target during bootstrap.
    pub fn related(name: &str, path: &str) -> Self {
        let mut spec = Self::of(name, FieldType::Char);
        spec.field.related = Some(path.to_string());
        spec
    }

    pub fn column(mut self, column: &str) -> Self {
        self.field.column = column.to_string();
        self.explicit_column = true;
        self
    }

    pub fn string(mut self, label: &str) -> Self {
        self.field.label = label.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.field.required = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.field.index = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.field.unique = true;
        self
    }

    pub fn no_copy(mut self) -> Self {
        self.field.no_copy = true;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.field.size = Some(size);
        self
    }

    pub fn embed(mut self) -> Self {
        self.field.embed = true;
        self
    }

    /// Compute the value with the named method (signature `() -> Map`).
    pub fn compute(mut self, method: &str) -> Self {
        self.field.compute = Some(method.to_string());
        self
    }

    /// Persist a computed or related value.
    pub fn stored(mut self) -> Self {
        self.field.stored = true;
        self
    }

    pub fn depends(mut self, paths: &[&str]) -> Self {
        self.field.depends = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn default<F>(mut self, f: F) -> Self
    where
        F: Fn(&Environment) -> Value + Send + Sync + 'static,
    {
        self.field.default = Some(Arc::new(f));
        self
    }

    pub fn default_value(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default(move |_| value.clone())
    }

    pub fn relation_table(mut self, table: &str, own_column: &str, target_column: &str) -> Self {
        self.field.relation = Some(RelationTable {
            table: table.to_string(),
            own_column: own_column.to_string(),
            target_column: target_column.to_string(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field.field_type
    }
}

/// Fields of one model, looked up by declared name or by storage column.
#[derive(Clone, Debug, Default)]
pub struct FieldCollection {
    by_name: BTreeMap<String, Arc<Field>>,
    by_column: HashMap<String, String>,
}

impl FieldCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, field: Field) {
        if let Some(previous) = self.by_name.get(&field.name) {
            if self.by_column.get(&previous.column) == Some(&previous.name) {
                self.by_column.remove(&previous.column);
            }
        }
        self.by_column
            .entry(field.column.clone())
            .or_insert_with(|| field.name.clone());
        self.by_name.insert(field.name.clone(), Arc::new(field));
    }

    /// Lookup by declared name first, then by column name.
    pub fn get(&self, name_or_column: &str) -> Option<&Arc<Field>> {
        self.by_name.get(name_or_column).or_else(|| {
            self.by_column
                .get(name_or_column)
                .and_then(|name| self.by_name.get(name))
        })
    }

    pub fn contains(&self, name_or_column: &str) -> bool {
        self.get(name_or_column).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Field>> {
        self.by_name.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Stored fields, `id` first then by name.
    pub fn stored(&self) -> Vec<&Arc<Field>> {
        let mut fields: Vec<&Arc<Field>> = self.iter().filter(|f| f.is_stored()).collect();
        fields.sort_by(|a, b| (a.name != ID_FIELD, &a.name).cmp(&(b.name != ID_FIELD, &b.name)));
        fields
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub(crate) fn update<F>(&mut self, name: &str, f: F)
    where
        F: FnOnce(&mut Field),
    {
        if let Some(existing) = self.by_name.get(name) {
            let mut field = (**existing).clone();
            f(&mut field);
            self.insert(field);
        }
    }
}
