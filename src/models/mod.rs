//! Model and field declarations, the open registry builder and the frozen
//! registry it produces.

pub mod builder;
pub mod field;
pub mod model;
pub mod registry;

pub use builder::{ModelHandle, RegistryBuilder};
pub use field::{
    DefaultFn, Field, FieldCategory, FieldCollection, FieldSpec, FieldType, ID_FIELD, RelationTable,
};
pub use model::{DEFAULT_PARENT_FIELD, Model, ModelKind};
pub(crate) use model::ModelDecl;
pub use registry::{ComputeTrigger, Registry};
