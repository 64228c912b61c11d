//! Boolean filter expressions over field paths.
//!
//! A [`Condition`] is an ordered list of terms backed by a persistent vector:
//! every builder method returns a new condition sharing structure with the
//! receiver, which is never modified.

pub mod domain;
pub mod operator;

use std::collections::BTreeSet;

use im::Vector;

use crate::core::Value;

pub use domain::{Domain, DomainItem};
pub use operator::Operator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// `(path, operator, value)` leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub path: String,
    pub operator: Operator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermKind {
    Leaf(Predicate),
    Sub(Condition),
}

/// One term and how it combines with the terms before it.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub connector: Connector,
    pub negate: bool,
    pub kind: TermKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    terms: Vector<Term>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-leaf condition.
    pub fn leaf(path: &str, operator: Operator, value: impl Into<Value>) -> Self {
        Self::new().and(path, operator, value)
    }

    fn push(&self, connector: Connector, negate: bool, kind: TermKind) -> Self {
        let mut terms = self.terms.clone();
        terms.push_back(Term {
            connector,
            negate,
            kind,
        });
        Self { terms }
    }

    fn push_leaf(
        &self,
        connector: Connector,
        negate: bool,
        path: &str,
        operator: Operator,
        value: Value,
    ) -> Self {
        self.push(
            connector,
            negate,
            TermKind::Leaf(Predicate {
                path: path.to_string(),
                operator,
                value,
            }),
        )
    }

    fn push_sub(&self, connector: Connector, negate: bool, sub: Condition) -> Self {
        if sub.is_empty() {
            return self.clone();
        }
        self.push(connector, negate, TermKind::Sub(sub))
    }

    pub fn and(&self, path: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push_leaf(Connector::And, false, path, operator, value.into())
    }

    pub fn and_not(&self, path: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push_leaf(Connector::And, true, path, operator, value.into())
    }

    pub fn or(&self, path: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push_leaf(Connector::Or, false, path, operator, value.into())
    }

    pub fn or_not(&self, path: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push_leaf(Connector::Or, true, path, operator, value.into())
    }

    /// Append `sub` as a parenthesized group. Empty groups are ignored.
    pub fn and_cond(&self, sub: Condition) -> Self {
        self.push_sub(Connector::And, false, sub)
    }

    pub fn and_not_cond(&self, sub: Condition) -> Self {
        self.push_sub(Connector::And, true, sub)
    }

    pub fn or_cond(&self, sub: Condition) -> Self {
        self.push_sub(Connector::Or, false, sub)
    }

    pub fn or_not_cond(&self, sub: Condition) -> Self {
        self.push_sub(Connector::Or, true, sub)
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter()
    }

    /// Every field path referenced by a leaf, including nested groups.
    pub fn paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths(&self, paths: &mut BTreeSet<String>) {
        for term in &self.terms {
            match &term.kind {
                TermKind::Leaf(p) => {
                    paths.insert(p.path.clone());
                }
                TermKind::Sub(sub) => sub.collect_paths(paths),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_never_mutates_receiver() {
        let base = Condition::new().and("Name", Operator::Equals, "Ann");
        let snapshot = base.clone();

        let wider = base.or("Name", Operator::Equals, "Bob");
        let narrower = base.and("Age", Operator::Greater, 18i64);

        assert_eq!(base, snapshot);
        assert_eq!(base.len(), 1);
        assert_eq!(wider.len(), 2);
        assert_eq!(narrower.len(), 2);
        assert_ne!(wider, narrower);
    }

    #[test]
    fn test_empty_groups_are_dropped() {
        let cond = Condition::new()
            .and("Name", Operator::Equals, "Ann")
            .and_cond(Condition::new());
        assert_eq!(cond.len(), 1);
        assert!(Condition::new().is_empty());
    }

    #[test]
    fn test_paths_include_nested_groups() {
        let cond = Condition::new()
            .and("Name", Operator::Like, "a")
            .or_cond(Condition::leaf("Profile.Age", Operator::Lower, 10i64));
        let paths: Vec<String> = cond.paths().into_iter().collect();
        assert_eq!(paths, vec!["Name".to_string(), "Profile.Age".to_string()]);
    }

    #[test]
    fn test_negation_flags() {
        let cond = Condition::new()
            .and_not("Active", Operator::Equals, true)
            .or_not_cond(Condition::leaf("Age", Operator::In, vec![1i64, 2]));
        let terms: Vec<&Term> = cond.terms().collect();
        assert!(terms[0].negate);
        assert_eq!(terms[1].connector, Connector::Or);
        assert!(matches!(terms[1].kind, TermKind::Sub(_)));
    }
}
