// ============================================================================
// stackorm Library
// ============================================================================

//! Layered model registry and lazy record collections over SQL databases.
//!
//! Models are declared and extended on a [`RegistryBuilder`] by any number of
//! modules: fields are added or overridden, methods get new layers that can
//! call the layer beneath them, and mixins bring in shared fields and
//! methods. [`RegistryBuilder::bootstrap`] freezes the declarations into a
//! [`Registry`] and synchronizes the database schema. Records are then read
//! and written through [`RecordCollection`] handles obtained from an
//! [`Environment`].
//!
//! ```
//! use stackorm::{Condition, Environment, FieldSpec, ModelKind, Operator, RecordCollection,
//!     RegistryBuilder, SqliteDatabase, Value, field_map};
//!
//! # fn main() -> stackorm::Result<()> {
//! let db = SqliteDatabase::memory()?;
//! let mut builder = RegistryBuilder::new();
//! builder
//!     .declare_model("User", ModelKind::Regular)?
//!     .fields([FieldSpec::char("Name")])?
//!     .method("greet", |_rs: &RecordCollection, _: ()| Ok("Hi".to_string()))?
//!     .extend("greet", |rs: &RecordCollection, _: ()| {
//!         let base: String = rs.super_typed(Vec::new())?;
//!         Ok(format!("{}!", base))
//!     })?;
//! let registry = builder.bootstrap(&db)?;
//!
//! let env = Environment::new(registry, &db, 1)?;
//! let users = env.pool("User")?;
//! let ann = users.create(field_map! { "Name" => "Ann" })?;
//! assert_eq!(ann.get("Name")?, Value::from("Ann"));
//! assert_eq!(users.search(Condition::leaf("Name", Operator::Equals, "Ann")).ids()?, ann.ids()?);
//! assert_eq!(ann.call_typed::<String>("greet", Vec::new())?, "Hi!");
//! env.commit()?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod models;
pub mod methods;
mod bootstrap;
pub mod condition;
pub mod query;
pub mod dialect;
pub mod connection;
pub mod environment;
pub mod records;
pub mod common;

pub use core::{FieldMap, OrmError, Result, Value};
pub use models::{Field, FieldSpec, FieldType, Model, ModelKind, Registry, RegistryBuilder};
pub use methods::{Signature, Variadic};
pub use condition::{Condition, Domain, Operator};
pub use query::{Query, SqlBuilder, Statement};
pub use dialect::{Adapter, adapter_for, register_adapter};
pub use connection::{Database, DatabaseConfig, QueryResult, SqliteDatabase, Transaction};
pub use environment::{Context, Environment};
pub use records::{GroupAggregateRow, RecordCollection};
