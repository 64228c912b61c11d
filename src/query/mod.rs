//! Query parameters accumulated by record collections and their translation
//! to parameterized SQL.

pub mod builder;
mod joins;

use crate::condition::Condition;

pub use builder::{SqlBuilder, Statement};

/// Filtering, ordering and paging state of a record collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub(crate) condition: Condition,
    pub(crate) limit: usize,
    pub(crate) offset: usize,
    pub(crate) order: Vec<String>,
    pub(crate) group: Vec<String>,
    pub(crate) distinct: bool,
    /// Select every record even with an empty condition.
    pub(crate) fetch_all: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(condition: Condition) -> Self {
        Self {
            condition,
            ..Self::default()
        }
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn group(&self) -> &[String] {
        &self.group
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Whether running this query can return anything.
    pub fn selects_records(&self) -> bool {
        self.fetch_all || !self.condition.is_empty()
    }
}
