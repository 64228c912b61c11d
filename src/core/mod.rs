pub mod error;
pub mod types;
pub mod value;

pub use error::{OrmError, Result};
pub use types::{FieldMap, Row, snake_case};
pub use value::Value;
