//! Raw domain wire format: a flat prefix-notation list mixing `"&"`, `"|"`
//! and `"!"` with `[field, operator, value]` leaves.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::core::{OrmError, Result, Value};

use super::{Condition, Connector, Operator, Predicate, Term, TermKind};

#[derive(Debug, Clone, PartialEq)]
pub enum DomainItem {
    And,
    Or,
    Not,
    Leaf(Predicate),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Domain(pub Vec<DomainItem>);

/// Expression tree read from the prefix list.
enum Node {
    Leaf(Predicate),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

impl Domain {
    pub fn parse(text: &str) -> Result<Self> {
        let json: JsonValue = serde_json::from_str(text)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &JsonValue) -> Result<Self> {
        let items = json
            .as_array()
            .ok_or_else(|| OrmError::InvalidDomain(format!("expected a list, got {}", json)))?;
        items.iter().map(parse_item).collect::<Result<Vec<_>>>().map(Domain)
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(
            self.0
                .iter()
                .map(|item| match item {
                    DomainItem::And => JsonValue::from("&"),
                    DomainItem::Or => JsonValue::from("|"),
                    DomainItem::Not => JsonValue::from("!"),
                    DomainItem::Leaf(p) => JsonValue::Array(vec![
                        JsonValue::from(p.path.as_str()),
                        JsonValue::from(p.operator.as_str()),
                        p.value.to_json(),
                    ]),
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build the equivalent condition. Top-level expressions are ANDed.
    pub fn to_condition(&self) -> Result<Condition> {
        let mut pos = 0;
        let mut condition = Condition::new();
        while pos < self.0.len() {
            let node = self.parse_node(&mut pos)?;
            condition = if condition.is_empty() {
                node_to_condition(node)
            } else if condition.terms().any(|t| t.connector == Connector::Or) {
                append(Condition::new().and_cond(condition), Connector::And, false, node)
            } else {
                append(condition, Connector::And, false, node)
            };
        }
        Ok(condition)
    }

    fn parse_node(&self, pos: &mut usize) -> Result<Node> {
        let item = self
            .0
            .get(*pos)
            .ok_or_else(|| OrmError::InvalidDomain("operator is missing an operand".into()))?;
        *pos += 1;
        Ok(match item {
            DomainItem::Leaf(p) => Node::Leaf(p.clone()),
            DomainItem::Not => Node::Not(Box::new(self.parse_node(pos)?)),
            DomainItem::And => {
                let left = self.parse_node(pos)?;
                Node::And(Box::new(left), Box::new(self.parse_node(pos)?))
            }
            DomainItem::Or => {
                let left = self.parse_node(pos)?;
                Node::Or(Box::new(left), Box::new(self.parse_node(pos)?))
            }
        })
    }
}

fn parse_item(json: &JsonValue) -> Result<DomainItem> {
    match json {
        JsonValue::String(op) => match op.as_str() {
            "&" => Ok(DomainItem::And),
            "|" => Ok(DomainItem::Or),
            "!" => Ok(DomainItem::Not),
            other => Err(OrmError::InvalidDomain(format!("unknown prefix operator '{}'", other))),
        },
        JsonValue::Array(leaf) if leaf.len() == 3 => {
            let path = leaf[0]
                .as_str()
                .ok_or_else(|| OrmError::InvalidDomain(format!("invalid field path {}", leaf[0])))?;
            let operator: Operator = leaf[1]
                .as_str()
                .ok_or_else(|| OrmError::InvalidDomain(format!("invalid operator {}", leaf[1])))?
                .parse()?;
            let value = Value::from_json(&leaf[2])?;
            if operator.is_multi() && !matches!(value, Value::List(_)) {
                return Err(OrmError::InvalidDomain(format!(
                    "operator '{}' on '{}' requires a list",
                    operator, path
                )));
            }
            Ok(DomainItem::Leaf(Predicate {
                path: path.to_string(),
                operator,
                value,
            }))
        }
        other => Err(OrmError::InvalidDomain(format!("invalid domain item {}", other))),
    }
}

/// Append `node` to `condition`: leaves are inlined, compound expressions
/// become groups.
fn append(condition: Condition, connector: Connector, negate: bool, node: Node) -> Condition {
    match node {
        Node::Leaf(p) => condition.push(connector, negate, TermKind::Leaf(p)),
        Node::Not(inner) => append(condition, connector, !negate, *inner),
        compound => condition.push_sub(connector, negate, node_to_condition(compound)),
    }
}

fn node_to_condition(node: Node) -> Condition {
    match node {
        Node::And(left, right) => {
            let condition = append(Condition::new(), Connector::And, false, *left);
            append(condition, Connector::And, false, *right)
        }
        Node::Or(left, right) => {
            let condition = append(Condition::new(), Connector::And, false, *left);
            append(condition, Connector::Or, false, *right)
        }
        other => append(Condition::new(), Connector::And, false, other),
    }
}

impl Condition {
    pub fn from_domain(domain: &Domain) -> Result<Self> {
        domain.to_condition()
    }

    /// Serialize as a single prefix expression: OR-groups of AND-chains,
    /// following SQL precedence of the flat term list.
    pub fn to_domain(&self) -> Domain {
        let mut groups: Vec<Vec<Vec<DomainItem>>> = Vec::new();
        for (index, term) in self.terms().enumerate() {
            let items = term_items(term);
            if items.is_empty() {
                continue;
            }
            match groups.last_mut() {
                Some(group) if index > 0 && term.connector == Connector::And => group.push(items),
                _ => groups.push(vec![items]),
            }
        }

        let mut out = Vec::new();
        for _ in 1..groups.len() {
            out.push(DomainItem::Or);
        }
        for group in groups {
            for _ in 1..group.len() {
                out.push(DomainItem::And);
            }
            for items in group {
                out.extend(items);
            }
        }
        Domain(out)
    }
}

fn term_items(term: &Term) -> Vec<DomainItem> {
    let mut items = Vec::new();
    let body = match &term.kind {
        TermKind::Leaf(p) => vec![DomainItem::Leaf(p.clone())],
        TermKind::Sub(sub) => sub.to_domain().0,
    };
    if body.is_empty() {
        return items;
    }
    if term.negate {
        items.push(DomainItem::Not);
    }
    items.extend(body);
    items
}

impl Serialize for Domain {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Domain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = JsonValue::deserialize(deserializer)?;
        Domain::from_json(&json).map_err(D::Error::custom)
    }
}
