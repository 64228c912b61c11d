//! Record collections: immutable handles over rows of one model.
//!
//! Shaping a collection (`filter`, `limit`, `order_by`, ...) is pure and
//! never touches the database. Operations needing ids resolve the collection
//! with one query; reads go through the environment cache.

mod compute;
mod fetch;
mod group;
mod relations;
mod write;

use std::fmt;
use std::sync::Arc;

use im::Vector;

use crate::condition::{Condition, Operator};
use crate::core::{FieldMap, OrmError, Result, Value};
use crate::environment::Environment;
use crate::methods::{CallFrame, MethodArg};
use crate::models::{ID_FIELD, Model};
use crate::query::{Query, SqlBuilder};

pub use group::GroupAggregateRow;

/// Zero or more records of one model plus accumulated query state.
#[derive(Clone)]
pub struct RecordCollection {
    env: Arc<Environment>,
    model: Arc<Model>,
    query: Query,
    ids: Option<Vec<i64>>,
    stack: Vector<CallFrame>,
}

/// `AND` of two conditions without wrapping either when the other is empty.
fn conjoin(left: &Condition, right: Condition) -> Condition {
    match (left.is_empty(), right.is_empty()) {
        (true, _) => right,
        (_, true) => left.clone(),
        _ => left.and_cond(right),
    }
}

fn dedup(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut out: Vec<i64> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

impl RecordCollection {
    pub(crate) fn new(env: Arc<Environment>, model: Arc<Model>) -> Self {
        Self {
            env,
            model,
            query: Query::new(),
            ids: None,
            stack: Vector::new(),
        }
    }

    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Ids of a resolved collection, `None` while unresolved.
    pub fn resolved_ids(&self) -> Option<&[i64]> {
        self.ids.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.ids.is_some()
    }

    /// Empty collection of another model in the same environment.
    pub fn pool(&self, model: &str) -> Result<RecordCollection> {
        self.env.pool(model)
    }

    /// Collection of the same model bound to `ids`.
    pub fn browse(&self, ids: &[i64]) -> Self {
        Self {
            env: Arc::clone(&self.env),
            model: Arc::clone(&self.model),
            query: Query::new(),
            ids: Some(dedup(ids.iter().copied())),
            stack: self.stack.clone(),
        }
    }

    fn with_ids(&self, ids: Vec<i64>) -> Self {
        let mut rs = self.clone();
        rs.ids = Some(ids);
        rs
    }

    /// Unresolved copy whose condition selects the current ids.
    fn unresolved(&self) -> Self {
        let mut rs = self.clone();
        if let Some(ids) = rs.ids.take() {
            // The ids already reflect the old paging.
            rs.query.condition = Condition::leaf(ID_FIELD, Operator::In, ids);
            rs.query.offset = 0;
            rs.query.limit = 0;
        }
        rs
    }

    pub fn filter(&self, condition: Condition) -> Self {
        let mut rs = self.unresolved();
        rs.query.condition = conjoin(&rs.query.condition, condition);
        rs
    }

    /// Alias of [`RecordCollection::filter`].
    pub fn search(&self, condition: Condition) -> Self {
        self.filter(condition)
    }

    /// Every record of the model, plus `condition` when not empty.
    pub fn search_all(&self) -> Self {
        let mut rs = self.unresolved();
        rs.query.fetch_all = true;
        rs
    }

    /// Keep the records not matching `condition`.
    pub fn exclude(&self, condition: Condition) -> Self {
        if condition.is_empty() {
            return self.clone();
        }
        let mut rs = self.unresolved();
        rs.query.condition = conjoin(&rs.query.condition, Condition::new().and_not_cond(condition));
        rs
    }

    pub fn limit(&self, limit: usize) -> Self {
        let mut rs = self.unresolved();
        rs.query.limit = limit;
        rs
    }

    pub fn offset(&self, offset: usize) -> Self {
        let mut rs = self.unresolved();
        rs.query.offset = offset;
        rs
    }

    /// Order by field paths, each optionally followed by `asc` or `desc`.
    pub fn order_by(&self, order: &[&str]) -> Self {
        let mut rs = self.unresolved();
        rs.query.order = order.iter().map(|o| o.to_string()).collect();
        rs
    }

    pub fn group_by(&self, fields: &[&str]) -> Self {
        let mut rs = self.unresolved();
        rs.query.group = fields.iter().map(|f| f.to_string()).collect();
        rs
    }

    pub fn distinct(&self) -> Self {
        let mut rs = self.unresolved();
        rs.query.distinct = true;
        rs
    }

    pub(crate) fn builder(&self) -> SqlBuilder<'_> {
        SqlBuilder::new(self.env.registry(), self.env.adapter(), &self.model)
    }

    // ------------------------------------------------------------------
    // Method calls
    // ------------------------------------------------------------------

    pub(crate) fn push_frame(&self, frame: CallFrame) -> Self {
        let mut rs = self.clone();
        rs.stack.push_back(frame);
        rs
    }

    /// Frames of the method layers currently executing on this handle.
    pub fn call_stack(&self) -> Vec<&CallFrame> {
        self.stack.iter().collect()
    }

    /// Call the top layer of `method` with this collection as receiver.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let stack = self.model.method(method)?;
        stack.signature().check_arity(&args)?;
        let top = stack.top().ok_or_else(|| OrmError::MethodNotFound {
            model: self.model.name().to_string(),
            method: method.to_string(),
        })?;
        top.invoke(stack.shared_name(), self, args)
    }

    pub fn call_typed<R: MethodArg>(&self, method: &str, args: Vec<Value>) -> Result<R> {
        R::from_value(self.call(method, args)?)
    }

    /// Call the layer beneath the one currently executing. Returns `Null`
    /// from the bottom layer.
    pub fn super_call(&self, args: Vec<Value>) -> Result<Value> {
        let frame = self.stack.last().ok_or(OrmError::EmptyCallStack)?;
        match frame.node.next() {
            Some(next) => next.invoke(&frame.method, self, args),
            None => Ok(Value::Null),
        }
    }

    pub fn super_typed<R: MethodArg>(&self, args: Vec<Value>) -> Result<R> {
        R::from_value(self.super_call(args)?)
    }

    // ------------------------------------------------------------------
    // CRUD through the overridable methods
    // ------------------------------------------------------------------

    /// Insert one record through the `create` method.
    pub fn create(&self, data: FieldMap) -> Result<RecordCollection> {
        self.call_typed("create", vec![Value::Map(data)])
    }

    pub fn write(&self, data: FieldMap) -> Result<bool> {
        self.call_typed("write", vec![Value::Map(data)])
    }

    /// Delete the records through the `unlink` method; returns the number of
    /// deleted rows.
    pub fn unlink(&self) -> Result<i64> {
        self.call_typed("unlink", Vec::new())
    }

    /// Duplicate a single record, applying `overrides` to the copy.
    pub fn copy(&self, overrides: FieldMap) -> Result<RecordCollection> {
        self.call_typed("copy", vec![Value::Map(overrides)])
    }

    pub fn name_get(&self) -> Result<String> {
        self.call_typed("name_get", Vec::new())
    }

    // ------------------------------------------------------------------
    // Set operations
    // ------------------------------------------------------------------

    /// One single-record collection per id.
    pub fn records(&self) -> Result<Vec<RecordCollection>> {
        Ok(self.ids()?.into_iter().map(|id| self.browse(&[id])).collect())
    }

    pub fn ensure_one(&self) -> Result<RecordCollection> {
        let ids = self.ids()?;
        if ids.len() != 1 {
            return Err(OrmError::ExpectedSingleton {
                model: self.model.name().to_string(),
                count: ids.len(),
            });
        }
        Ok(self.browse(&ids))
    }

    fn check_same_model(&self, other: &RecordCollection) -> Result<()> {
        if self.model.name() != other.model.name() {
            return Err(OrmError::TypeMismatch(format!(
                "Cannot combine records of '{}' and '{}'",
                self.model.name(),
                other.model.name()
            )));
        }
        Ok(())
    }

    /// Records of either collection, in order of first appearance.
    pub fn union(&self, other: &RecordCollection) -> Result<RecordCollection> {
        self.check_same_model(other)?;
        let ids = self.ids()?.into_iter().chain(other.ids()?);
        Ok(self.browse(&dedup(ids)))
    }

    /// Records of this collection not in `other`.
    pub fn subtract(&self, other: &RecordCollection) -> Result<RecordCollection> {
        self.check_same_model(other)?;
        let removed = other.ids()?;
        let ids: Vec<i64> = self.ids()?.into_iter().filter(|id| !removed.contains(id)).collect();
        Ok(self.browse(&ids))
    }

    /// Same records in an environment with `key` set in the context.
    pub fn with_context(&self, key: &str, value: impl Into<Value>) -> RecordCollection {
        self.with_env(self.env.with_context(key, value))
    }

    pub fn with_env(&self, env: Arc<Environment>) -> RecordCollection {
        let mut rs = self.clone();
        rs.env = env;
        rs
    }
}

impl PartialEq for RecordCollection {
    fn eq(&self, other: &Self) -> bool {
        self.model.name() == other.model.name()
            && self.ids == other.ids
            && (self.ids.is_some() || self.query == other.query)
    }
}

impl fmt::Debug for RecordCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ids {
            Some(ids) => {
                let ids: Vec<String> = ids.iter().map(i64::to_string).collect();
                write!(f, "{}({})", self.model.name(), ids.join(", "))
            }
            None => write!(f, "{}(<unresolved>)", self.model.name()),
        }
    }
}
