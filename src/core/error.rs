use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrmError {
    // ------------------------------------------------------------------
    // Declaration errors
    // ------------------------------------------------------------------
    #[error("Model '{0}' already exists")]
    DuplicateModel(String),

    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    #[error("Method '{method}' already exists on model '{model}'")]
    DuplicateMethod { model: String, method: String },

    #[error("Method '{method}' not found on model '{model}'")]
    MethodNotFound { model: String, method: String },

    #[error("Signature mismatch for '{model}.{method}': expected {expected}, found {found}")]
    SignatureMismatch {
        model: String,
        method: String,
        expected: String,
        found: String,
    },

    #[error("Field '{0}' not found in model '{1}'")]
    FieldNotFound(String, String),

    #[error("Cannot override field '{field}' of model '{model}': {reason}")]
    IncompatibleOverride {
        model: String,
        field: String,
        reason: String,
    },

    #[error("Field '{model}.{field}' references unknown model '{target}'")]
    UnknownRelationTarget {
        model: String,
        field: String,
        target: String,
    },

    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(String),

    #[error("Registry has already been bootstrapped")]
    AlreadyBootstrapped,

    // ------------------------------------------------------------------
    // Runtime call errors
    // ------------------------------------------------------------------
    #[error("Super called with an empty call stack")]
    EmptyCallStack,

    #[error("Operation '{0}' requires a non-empty record collection")]
    EmptyRecordCollection(String),

    #[error("Expected a single record of '{model}', got {count}")]
    ExpectedSingleton { model: String, count: usize },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Transaction is already closed")]
    TransactionClosed,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    // ------------------------------------------------------------------
    // Database errors
    // ------------------------------------------------------------------
    #[error("Database error: {0}")]
    Database(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OrmError>;

impl<T> From<std::sync::PoisonError<T>> for OrmError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<rusqlite::Error> for OrmError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidDomain(err.to_string())
    }
}
