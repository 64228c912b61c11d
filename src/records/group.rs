use crate::condition::{Condition, Operator};
use crate::core::{FieldMap, OrmError, Result, Value};
use crate::models::{FieldType, ID_FIELD};

use super::{RecordCollection, conjoin};

/// One group returned by [`RecordCollection::aggregates`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAggregateRow {
    /// Group values keyed by group path, then sums keyed by field name.
    pub values: FieldMap,
    /// Number of records in the group.
    pub count: usize,
    /// Condition selecting the records of the group.
    pub condition: Condition,
}

impl RecordCollection {
    /// Group the records by the paths set with
    /// [`RecordCollection::group_by`] and sum the numeric `fields` (all
    /// numeric stored fields when empty).
    pub fn aggregates(&self, fields: &[&str]) -> Result<Vec<GroupAggregateRow>> {
        let base = self.filter(Condition::new());
        if !base.query.selects_records() && !base.query.group.is_empty() {
            // Grouping without a filter covers the whole table.
            return base.search_all().aggregates(fields);
        }
        if !base.query.selects_records() {
            return Ok(Vec::new());
        }

        let groups = base.query.group.clone();
        let aggregated: Vec<String> = if fields.is_empty() {
            self.model
                .fields()
                .stored()
                .into_iter()
                .filter(|f| {
                    f.name() != ID_FIELD
                        && matches!(f.field_type(), FieldType::Integer | FieldType::Float)
                        && !groups.iter().any(|g| g == f.name())
                })
                .map(|f| f.name().to_string())
                .collect()
        } else {
            fields.iter().map(|f| f.to_string()).collect()
        };

        let (statement, group_fields, sum_fields) = base.builder().group_by(&base.query, &groups, &aggregated)?;
        let result = self.env.query(&statement)?;

        let mut rows = Vec::with_capacity(result.row_count());
        for row in &result.rows {
            let mut values = FieldMap::new();
            let mut condition = base.query.condition.clone();
            for (index, (path, field)) in groups.iter().zip(&group_fields).enumerate() {
                let raw = field.decode(row.get(index).cloned().unwrap_or(Value::Null))?;
                let group_condition = Condition::leaf(path, Operator::Equals, raw.clone());
                condition = conjoin(&condition, group_condition);
                values.insert(path.clone(), self.materialize(field, raw)?);
            }
            let count = row
                .get(groups.len())
                .and_then(Value::as_i64)
                .ok_or_else(|| OrmError::Database("GROUP BY query returned no count".into()))?;
            for (offset, field) in sum_fields.iter().enumerate() {
                let sum = row.get(groups.len() + 1 + offset).cloned().unwrap_or(Value::Null);
                let sum = match (field.field_type(), sum) {
                    (FieldType::Float, Value::Integer(i)) => Value::Float(i as f64),
                    (_, Value::Null) => field.field_type().zero_value(),
                    (_, other) => other,
                };
                values.insert(field.name().to_string(), sum);
            }
            rows.push(GroupAggregateRow {
                values,
                count: count as usize,
                condition,
            });
        }
        Ok(rows)
    }
}
