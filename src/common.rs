//! Mixins applied to every model: CRUD as overridable methods, record
//! naming and audit timestamps.

use crate::core::{FieldMap, Result, Value};
use crate::methods::{Layer, MethodArg, MethodArgs, MethodDecl, Signature, normalize};
use crate::models::{FieldSpec, ModelDecl, ModelKind};
use crate::records::RecordCollection;

/// Applied to every table-backed model, at the bottom of every stack.
pub const COMMON_MIXIN: &str = "CommonMixin";
/// Applied to regular models, above [`COMMON_MIXIN`].
pub const BASE_MIXIN: &str = "BaseMixin";

pub const NAME_FIELD: &str = "Name";
pub const DISPLAY_NAME_FIELD: &str = "DisplayName";

/// Mixins applied to models of `kind`, bottom first.
pub fn mixins_for(kind: ModelKind) -> &'static [&'static str] {
    match kind {
        ModelKind::Regular => &[COMMON_MIXIN, BASE_MIXIN],
        ModelKind::Manual => &[COMMON_MIXIN],
        ModelKind::Mixin => &[],
    }
}

fn add_method<A, R, F>(decl: &mut ModelDecl, name: &str, f: F)
where
    A: MethodArgs,
    R: MethodArg,
    F: Fn(&RecordCollection, A) -> Result<R> + Send + Sync + 'static,
{
    decl.methods.insert(
        name.to_string(),
        MethodDecl {
            signature: Signature::of::<A, R>(),
            layers: vec![Layer::new(&decl.name, normalize(f))],
        },
    );
}

fn add_field(decl: &mut ModelDecl, spec: FieldSpec) {
    let mut field = spec.field;
    field.model = decl.name.clone();
    decl.fields.insert(field);
}

/// Values of `record` carried over to a copy.
fn copy_data(record: &RecordCollection) -> Result<FieldMap> {
    let mut data = FieldMap::new();
    for field in record.model().fields().iter() {
        let derived = field.is_computed() || field.is_related();
        if field.is_no_copy() || derived || field.field_type().is_reverse() {
            continue;
        }
        if !field.is_stored() && !field.field_type().is_x2many() {
            continue;
        }
        data.insert(field.name().to_string(), record.get(field.name())?);
    }
    Ok(data)
}

/// Name of a record: its `Name` field when the model has one, otherwise
/// `Model,id`.
fn default_name(rs: &RecordCollection) -> Result<String> {
    let record = rs.ensure_one()?;
    if record.model().fields().contains(NAME_FIELD) {
        return match record.get(NAME_FIELD)? {
            Value::Text(name) => Ok(name),
            Value::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        };
    }
    let id = record.ids()?.first().copied().unwrap_or_default();
    Ok(format!("{},{}", record.model_name(), id))
}

fn common_mixin() -> ModelDecl {
    let mut decl = ModelDecl::new(COMMON_MIXIN, ModelKind::Mixin);
    add_method(&mut decl, "create", |rs: &RecordCollection, (data,): (FieldMap,)| {
        rs.create_raw(data)
    });
    add_method(&mut decl, "write", |rs: &RecordCollection, (data,): (FieldMap,)| {
        rs.update_raw(data, &[]).map(|_| true)
    });
    add_method(&mut decl, "unlink", |rs: &RecordCollection, _: ()| {
        rs.delete_raw().map(|count| count as i64)
    });
    add_method(&mut decl, "copy", |rs: &RecordCollection, (overrides,): (FieldMap,)| {
        let record = rs.ensure_one()?;
        let mut data = copy_data(&record)?;
        data.extend(overrides);
        record.browse(&[]).create(data)
    });
    add_method(&mut decl, "name_get", |rs: &RecordCollection, _: ()| default_name(rs));
    decl
}

fn base_mixin() -> ModelDecl {
    let mut decl = ModelDecl::new(BASE_MIXIN, ModelKind::Mixin);
    add_field(&mut decl, FieldSpec::datetime("CreateDate").no_copy());
    add_field(&mut decl, FieldSpec::datetime("WriteDate").no_copy());
    add_field(
        &mut decl,
        FieldSpec::char(DISPLAY_NAME_FIELD).compute("compute_display_name"),
    );
    add_method(&mut decl, "compute_display_name", |rs: &RecordCollection, _: ()| {
        let mut values = FieldMap::new();
        values.insert(DISPLAY_NAME_FIELD.to_string(), Value::Text(rs.name_get()?));
        Ok(values)
    });
    decl
}

/// Declarations of the common mixins, seeded into every registry builder.
pub(crate) fn mixin_declarations() -> Vec<ModelDecl> {
    vec![common_mixin(), base_mixin()]
}
