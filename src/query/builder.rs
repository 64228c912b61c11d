use std::sync::Arc;

use crate::condition::{Condition, Operator, Predicate, TermKind};
use crate::core::{OrmError, Result, Value};
use crate::dialect::Adapter;
use crate::models::{Field, FieldType, ID_FIELD, Model, Registry, RelationTable};

use super::Query;
use super::joins::{Join, JoinSet};

const MAX_PATH_DEPTH: usize = 16;

/// SQL text with its positional parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// A field path resolved to a column expression.
struct Resolved<'a> {
    expr: String,
    field: Arc<Field>,
    model: &'a Model,
}

/// Translates conditions and query parameters on one model into SQL.
///
/// Placeholders are emitted as `?`; the environment rebinds them for the
/// dialect before execution.
pub struct SqlBuilder<'a> {
    registry: &'a Registry,
    adapter: &'a dyn Adapter,
    model: &'a Model,
    joins: JoinSet,
    params: Vec<Value>,
    distinct: bool,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(registry: &'a Registry, adapter: &'a dyn Adapter, model: &'a Model) -> Self {
        Self {
            registry,
            adapter,
            model,
            joins: JoinSet::default(),
            params: Vec::new(),
            distinct: false,
        }
    }

    fn quote(&self, ident: &str) -> String {
        self.adapter.quote(ident)
    }

    fn column(&self, alias: &str, column: &str) -> String {
        format!("{}.{}", self.quote(alias), self.quote(column))
    }

    fn resolve(&mut self, path: &str) -> Result<Resolved<'a>> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        let model = self.model;
        self.resolve_from(model, model.table().to_string(), &segments, 0)
    }

    fn resolve_from(
        &mut self,
        model: &'a Model,
        alias: String,
        segments: &[String],
        depth: usize,
    ) -> Result<Resolved<'a>> {
        if depth > MAX_PATH_DEPTH {
            return Err(OrmError::InvalidCondition(format!(
                "Field path '{}' is too deep",
                segments.join(".")
            )));
        }
        let (name, rest) = segments
            .split_first()
            .ok_or_else(|| OrmError::InvalidCondition("Empty field path".into()))?;
        let field = Arc::clone(model.field(name)?);

        if let (Some(related), false) = (field.related(), field.is_stored()) {
            let mut expanded: Vec<String> = related.split('.').map(str::to_string).collect();
            expanded.extend(rest.iter().cloned());
            return self.resolve_from(model, alias, &expanded, depth + 1);
        }

        if rest.is_empty() && !field.field_type().is_non_stored_relation() {
            if !field.is_stored() {
                return Err(OrmError::InvalidCondition(format!(
                    "Field '{}.{}' is not stored",
                    model.name(),
                    name
                )));
            }
            return Ok(Resolved {
                expr: self.column(&alias, field.column()),
                field,
                model,
            });
        }

        let target = self.target_of(model, &field)?;
        let next = self.join(&alias, &field, target)?;
        if rest.is_empty() {
            return Ok(Resolved {
                expr: self.column(&next, ID_FIELD),
                field,
                model: target,
            });
        }
        self.resolve_from(target, next, rest, depth + 1)
    }

    fn target_of(&self, model: &Model, field: &Field) -> Result<&'a Model> {
        let registry = self.registry;
        match (field.field_type().is_relation(), field.target()) {
            (true, Some(target)) => registry.model(target).map(|m| &**m),
            _ => Err(OrmError::InvalidCondition(format!(
                "Field '{}.{}' is not a relation",
                model.name(),
                field.name()
            ))),
        }
    }

    /// Join `target` through `field` from the table aliased `alias`; returns
    /// the alias of the joined table.
    fn join(&mut self, alias: &str, field: &Field, target: &Model) -> Result<String> {
        let next = format!("{}__{}", alias, field.column());
        let on = match field.field_type() {
            FieldType::Many2One | FieldType::One2One => format!(
                "{} = {}",
                self.column(&next, ID_FIELD),
                self.column(alias, field.column())
            ),
            FieldType::One2Many | FieldType::Rev2One => {
                let reverse = field.reverse().ok_or_else(|| {
                    OrmError::InvalidDeclaration(format!("Field '{}' has no reverse field", field.name()))
                })?;
                let reverse = target.field(reverse)?;
                if field.field_type() == FieldType::One2Many {
                    self.distinct = true;
                }
                format!(
                    "{} = {}",
                    self.column(&next, reverse.column()),
                    self.column(alias, ID_FIELD)
                )
            }
            FieldType::Many2Many => {
                let relation = field.relation().ok_or_else(|| {
                    OrmError::InvalidDeclaration(format!("Field '{}' has no relation table", field.name()))
                })?;
                let link = format!("{}__rel", next);
                let link_on = format!(
                    "{} = {}",
                    self.column(&link, &relation.own_column),
                    self.column(alias, ID_FIELD)
                );
                self.joins.add(Join {
                    table: relation.table.clone(),
                    alias: link.clone(),
                    on: link_on,
                });
                self.distinct = true;
                format!(
                    "{} = {}",
                    self.column(&next, ID_FIELD),
                    self.column(&link, &relation.target_column)
                )
            }
            other => {
                return Err(OrmError::InvalidCondition(format!(
                    "Cannot traverse {} field '{}'",
                    other,
                    field.name()
                )));
            }
        };
        self.joins.add(Join {
            table: target.table().to_string(),
            alias: next.clone(),
            on,
        });
        Ok(next)
    }

    /// WHERE clause body of `condition`, collecting its parameters.
    pub fn where_clause(&mut self, condition: &Condition) -> Result<String> {
        let mut sql = String::new();
        for term in condition.terms() {
            let body = match &term.kind {
                TermKind::Leaf(predicate) => self.predicate(predicate)?,
                TermKind::Sub(sub) => {
                    if sub.is_empty() {
                        continue;
                    }
                    format!("({})", self.where_clause(sub)?)
                }
            };
            if !sql.is_empty() {
                sql.push(' ');
                sql.push_str(term.connector.as_sql());
                sql.push(' ');
            }
            if term.negate {
                sql.push_str(&format!("NOT ({})", body));
            } else {
                sql.push_str(&body);
            }
        }
        Ok(sql)
    }

    fn predicate(&mut self, predicate: &Predicate) -> Result<String> {
        let resolved = self.resolve(&predicate.path)?;
        let column = resolved.expr.clone();
        let field = Arc::clone(&resolved.field);
        let op = predicate.operator;

        match op {
            Operator::In | Operator::NotIn => {
                let items = match &predicate.value {
                    Value::List(items) => items
                        .iter()
                        .map(|item| self.list_param(&field, item))
                        .collect::<Result<Vec<_>>>()?
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>(),
                    Value::Records(rs) => rs.ids()?.into_iter().map(Value::Integer).collect(),
                    other => {
                        return Err(OrmError::InvalidCondition(format!(
                            "Operator '{}' on '{}' requires a list, got {}",
                            op,
                            predicate.path,
                            other.type_name()
                        )));
                    }
                };
                if items.is_empty() {
                    return Ok(if op == Operator::In { "1 = 0" } else { "1 = 1" }.to_string());
                }
                let placeholders = vec!["?"; items.len()].join(", ");
                self.params.extend(items);
                Ok(format!("{} {} ({})", column, self.adapter.operator_sql(op)?, placeholders))
            }
            Operator::EqualsOrUnset if predicate.value.is_falsy() => Ok("1 = 1".to_string()),
            Operator::Equals | Operator::EqualsOrUnset | Operator::NotEquals => {
                let value = self.param(&field, &predicate.value)?;
                match (op, value.is_null()) {
                    (Operator::NotEquals, true) => Ok(format!("{} IS NOT NULL", column)),
                    (_, true) => Ok(format!("{} IS NULL", column)),
                    (Operator::NotEquals, false) => {
                        self.params.push(value);
                        Ok(format!("({} != ? OR {} IS NULL)", column, column))
                    }
                    (_, false) => {
                        self.params.push(value);
                        Ok(format!("{} = ?", column))
                    }
                }
            }
            Operator::ChildOf => self.child_of(&resolved, &predicate.value),
            op if op.is_pattern() => {
                let pattern = match &predicate.value {
                    Value::Text(s) => s.clone(),
                    other => other.to_string(),
                };
                self.params.push(Value::Text(self.adapter.wrap_pattern(op, &pattern)));
                self.adapter.pattern_sql(&column, op)
            }
            _ => {
                let value = self.param(&field, &predicate.value)?;
                if value.is_null() {
                    return Err(OrmError::InvalidCondition(format!(
                        "Cannot compare '{}' {} NULL",
                        predicate.path, op
                    )));
                }
                self.params.push(value);
                Ok(format!("{} {} ?", column, self.adapter.operator_sql(op)?))
            }
        }
    }

    fn is_reference(field: &Field) -> bool {
        field.field_type().is_relation() || field.name() == ID_FIELD
    }

    /// Parameter compared with `field`: records become ids, text becomes a
    /// date for date fields.
    fn param(&self, field: &Field, value: &Value) -> Result<Value> {
        if Self::is_reference(field) {
            return match value {
                Value::Boolean(false) | Value::Null => Ok(Value::Null),
                Value::Integer(_) => Ok(value.clone()),
                other => match other.to_ids()?.as_slice() {
                    [] => Ok(Value::Null),
                    [id] => Ok(Value::Integer(*id)),
                    ids => Err(OrmError::InvalidCondition(format!(
                        "Expected a single record for '{}', got {}",
                        field.name(),
                        ids.len()
                    ))),
                },
            };
        }
        match (field.field_type(), value) {
            (FieldType::Date | FieldType::DateTime, Value::Text(_)) => field.decode(value.clone()),
            _ => Ok(value.clone()),
        }
    }

    fn list_param(&self, field: &Field, value: &Value) -> Result<Vec<Value>> {
        if Self::is_reference(field) {
            return Ok(value.to_ids()?.into_iter().map(Value::Integer).collect());
        }
        Ok(vec![self.param(field, value)?])
    }

    /// Records whose value is one of the given records or any of their
    /// descendants through the hierarchy's parent field.
    fn child_of(&mut self, resolved: &Resolved<'a>, value: &Value) -> Result<String> {
        let hierarchy = if resolved.field.field_type().is_relation() {
            self.target_of(resolved.model, &resolved.field)?
        } else if resolved.field.name() == ID_FIELD {
            resolved.model
        } else {
            return Err(OrmError::InvalidCondition(format!(
                "child_of requires a relation, got '{}'",
                resolved.field.name()
            )));
        };
        let parent = hierarchy.field(hierarchy.parent_field())?;
        if parent.target() != Some(hierarchy.name()) {
            return Err(OrmError::InvalidCondition(format!(
                "Model '{}' has no parent field '{}' pointing to itself",
                hierarchy.name(),
                hierarchy.parent_field()
            )));
        }

        let ids = value.to_ids()?;
        if ids.is_empty() {
            return Ok("1 = 0".to_string());
        }
        let table = self.quote(hierarchy.table());
        let id = self.quote(ID_FIELD);
        let placeholders = vec!["?"; ids.len()].join(", ");
        self.params.extend(ids.into_iter().map(Value::Integer));
        Ok(format!(
            "{} IN (WITH RECURSIVE child_of_tree(id) AS (SELECT {id} FROM {t} WHERE {id} IN ({ph}) \
             UNION SELECT {t}.{id} FROM {t} JOIN child_of_tree ON {t}.{pc} = child_of_tree.id) \
             SELECT id FROM child_of_tree)",
            resolved.expr,
            id = id,
            t = table,
            ph = placeholders,
            pc = self.quote(parent.column()),
        ))
    }

    fn order_by(&mut self, order: &[String]) -> Result<Vec<(String, &'static str)>> {
        let mut out = Vec::with_capacity(order.len());
        for spec in order {
            let mut parts = spec.split_whitespace();
            let path = parts
                .next()
                .ok_or_else(|| OrmError::InvalidCondition("Empty order clause".into()))?;
            let direction = match parts.next().map(str::to_lowercase).as_deref() {
                None | Some("asc") => "ASC",
                Some("desc") => "DESC",
                Some(other) => {
                    return Err(OrmError::InvalidCondition(format!(
                        "Invalid order direction '{}'",
                        other
                    )));
                }
            };
            out.push((self.resolve(path)?.expr, direction));
        }
        Ok(out)
    }

    fn from_clause(&self) -> String {
        format!(
            "{}{}",
            self.quote(self.model.table()),
            self.joins.render(self.adapter)
        )
    }

    /// Assemble a SELECT over `select` expressions with the query's filter.
    fn compose(&mut self, mut select: Vec<String>, query: &Query, ordered: bool) -> Result<String> {
        let filter = self.where_clause(&query.condition)?;
        let order = if ordered {
            let order = if query.order.is_empty() {
                self.model.default_order().to_vec()
            } else {
                query.order.clone()
            };
            self.order_by(&order)?
        } else {
            Vec::new()
        };

        let distinct = self.distinct || query.distinct;
        if distinct {
            for (expr, _) in &order {
                if !select.contains(expr) {
                    select.push(expr.clone());
                }
            }
        }

        let mut sql = format!(
            "SELECT {}{} FROM {}",
            if distinct { "DISTINCT " } else { "" },
            select.join(", "),
            self.from_clause()
        );
        if !filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }
        if !order.is_empty() {
            let order: Vec<String> = order.iter().map(|(e, d)| format!("{} {}", e, d)).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        sql.push_str(&self.adapter.limit_sql(query.limit, query.offset));
        Ok(sql)
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }

    /// WHERE clause of `condition` alone, without joins.
    pub fn condition_sql(mut self, condition: &Condition) -> Result<Statement> {
        let sql = self.where_clause(condition)?;
        Ok(self.finish(sql))
    }

    /// Ordered ids of the records matching `query`.
    pub fn select_ids(mut self, query: &Query) -> Result<Statement> {
        let id = self.column(self.model.table(), ID_FIELD);
        let sql = self.compose(vec![id], query, true)?;
        Ok(self.finish(sql))
    }

    /// `id` followed by one column per path; returns the field each path
    /// resolved to.
    pub fn select(mut self, query: &Query, paths: &[String]) -> Result<(Statement, Vec<Arc<Field>>)> {
        let mut select = vec![self.column(self.model.table(), ID_FIELD)];
        let mut fields = Vec::with_capacity(paths.len());
        for path in paths {
            let resolved = self.resolve(path)?;
            select.push(resolved.expr);
            fields.push(resolved.field);
        }
        let sql = self.compose(select, query, true)?;
        Ok((self.finish(sql), fields))
    }

    pub fn count(mut self, query: &Query) -> Result<Statement> {
        let id = self.column(self.model.table(), ID_FIELD);
        let inner = self.compose(vec![id], query, false)?;
        Ok(self.finish(format!("SELECT COUNT(*) FROM ({}) AS count_query", inner)))
    }

    /// One row per distinct value of `groups`: the group values, the record
    /// count and the sum of each aggregated field.
    pub fn group_by(
        mut self,
        query: &Query,
        groups: &[String],
        aggregates: &[String],
    ) -> Result<(Statement, Vec<Arc<Field>>, Vec<Arc<Field>>)> {
        let mut select = Vec::new();
        let mut group_exprs = Vec::new();
        let mut group_fields = Vec::new();
        for path in groups {
            let resolved = self.resolve(path)?;
            group_exprs.push(resolved.expr.clone());
            select.push(resolved.expr);
            group_fields.push(resolved.field);
        }
        select.push("COUNT(1)".to_string());

        let mut aggregate_fields = Vec::new();
        for path in aggregates {
            let resolved = self.resolve(path)?;
            if matches!(resolved.field.field_type(), FieldType::Integer | FieldType::Float) {
                select.push(format!("SUM({})", resolved.expr));
                aggregate_fields.push(resolved.field);
            }
        }

        let filter = self.where_clause(&query.condition)?;
        let mut sql = format!("SELECT {} FROM {}", select.join(", "), self.from_clause());
        if !filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }
        if !group_exprs.is_empty() {
            sql.push_str(&format!(" GROUP BY {0} ORDER BY {0}", group_exprs.join(", ")));
        }
        sql.push_str(&self.adapter.limit_sql(query.limit, query.offset));
        Ok((self.finish(sql), group_fields, aggregate_fields))
    }

    pub fn insert(adapter: &dyn Adapter, model: &Model, values: &[(String, Value)]) -> Statement {
        let table = adapter.quote(model.table());
        let returning = adapter.quote(ID_FIELD);
        if values.is_empty() {
            return Statement {
                sql: format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning),
                params: Vec::new(),
            };
        }
        let columns: Vec<String> = values.iter().map(|(c, _)| adapter.quote(c)).collect();
        let placeholders = vec!["?"; values.len()].join(", ");
        Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                table,
                columns.join(", "),
                placeholders,
                returning
            ),
            params: values.iter().map(|(_, v)| v.clone()).collect(),
        }
    }

    pub fn update(adapter: &dyn Adapter, model: &Model, values: &[(String, Value)], ids: &[i64]) -> Statement {
        let assignments: Vec<String> = values
            .iter()
            .map(|(c, _)| format!("{} = ?", adapter.quote(c)))
            .collect();
        let mut params: Vec<Value> = values.iter().map(|(_, v)| v.clone()).collect();
        params.extend(ids.iter().copied().map(Value::Integer));
        Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE {} IN ({})",
                adapter.quote(model.table()),
                assignments.join(", "),
                adapter.quote(ID_FIELD),
                vec!["?"; ids.len()].join(", ")
            ),
            params,
        }
    }

    pub fn delete(adapter: &dyn Adapter, model: &Model, ids: &[i64]) -> Statement {
        Statement {
            sql: format!(
                "DELETE FROM {} WHERE {} IN ({})",
                adapter.quote(model.table()),
                adapter.quote(ID_FIELD),
                vec!["?"; ids.len()].join(", ")
            ),
            params: ids.iter().copied().map(Value::Integer).collect(),
        }
    }

    /// Reset `field` of `model` wherever it points to one of `ids`.
    pub fn clear_references(adapter: &dyn Adapter, model: &Model, field: &Field, ids: &[i64]) -> Statement {
        let column = adapter.quote(field.column());
        Statement {
            sql: format!(
                "UPDATE {} SET {} = NULL WHERE {} IN ({})",
                adapter.quote(model.table()),
                column,
                column,
                vec!["?"; ids.len()].join(", ")
            ),
            params: ids.iter().copied().map(Value::Integer).collect(),
        }
    }

    /// Target ids linked to `id` in a many2many relation table.
    pub fn relation_targets(adapter: &dyn Adapter, relation: &RelationTable, id: i64) -> Statement {
        Statement {
            sql: format!(
                "SELECT {} FROM {} WHERE {} = ?",
                adapter.quote(&relation.target_column),
                adapter.quote(&relation.table),
                adapter.quote(&relation.own_column)
            ),
            params: vec![Value::Integer(id)],
        }
    }

    pub fn unlink_relation(adapter: &dyn Adapter, relation: &RelationTable, id: i64) -> Statement {
        Statement {
            sql: format!(
                "DELETE FROM {} WHERE {} = ?",
                adapter.quote(&relation.table),
                adapter.quote(&relation.own_column)
            ),
            params: vec![Value::Integer(id)],
        }
    }

    pub fn link_relation(adapter: &dyn Adapter, relation: &RelationTable, id: i64, target: i64) -> Statement {
        Statement {
            sql: format!(
                "INSERT INTO {} ({}, {}) VALUES (?, ?)",
                adapter.quote(&relation.table),
                adapter.quote(&relation.own_column),
                adapter.quote(&relation.target_column)
            ),
            params: vec![Value::Integer(id), Value::Integer(target)],
        }
    }
}
