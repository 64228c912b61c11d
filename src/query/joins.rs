use crate::dialect::Adapter;

/// One `LEFT JOIN` of a path traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Join {
    pub table: String,
    pub alias: String,
    pub on: String,
}

/// Joins of one statement, deduplicated by alias so repeated sub-paths share
/// the same join.
#[derive(Debug, Default)]
pub(crate) struct JoinSet {
    joins: Vec<Join>,
}

impl JoinSet {
    pub fn add(&mut self, join: Join) {
        if !self.joins.iter().any(|j| j.alias == join.alias) {
            self.joins.push(join);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn render(&self, adapter: &dyn Adapter) -> String {
        self.joins
            .iter()
            .map(|j| {
                format!(
                    " LEFT JOIN {} AS {} ON {}",
                    adapter.quote(&j.table),
                    adapter.quote(&j.alias),
                    j.on
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteAdapter;

    #[test]
    fn test_joins_are_deduplicated() {
        let mut joins = JoinSet::default();
        let join = Join {
            table: "profile".into(),
            alias: "user__profile_id".into(),
            on: "\"user__profile_id\".\"id\" = \"user\".\"profile_id\"".into(),
        };
        joins.add(join.clone());
        joins.add(join);
        assert_eq!(joins.len(), 1);
        assert_eq!(
            joins.render(&SqliteAdapter),
            " LEFT JOIN \"profile\" AS \"user__profile_id\" ON \"user__profile_id\".\"id\" = \"user\".\"profile_id\""
        );
    }
}
