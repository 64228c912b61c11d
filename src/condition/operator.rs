use std::fmt;
use std::str::FromStr;

use crate::core::OrmError;

/// Comparison operator of a condition leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    /// `=?`: equality, or always true when the value is unset.
    EqualsOrUnset,
    Greater,
    GreaterOrEqual,
    Lower,
    LowerOrEqual,
    /// `=like`: pattern match without wildcard wrapping.
    LikePattern,
    /// `=ilike`: case-insensitive pattern match without wildcard wrapping.
    ILikePattern,
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
    ChildOf,
}

impl Operator {
    pub const ALL: [Operator; 16] = [
        Self::Equals,
        Self::NotEquals,
        Self::EqualsOrUnset,
        Self::Greater,
        Self::GreaterOrEqual,
        Self::Lower,
        Self::LowerOrEqual,
        Self::LikePattern,
        Self::ILikePattern,
        Self::Like,
        Self::NotLike,
        Self::ILike,
        Self::NotILike,
        Self::In,
        Self::NotIn,
        Self::ChildOf,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::EqualsOrUnset => "=?",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Lower => "<",
            Self::LowerOrEqual => "<=",
            Self::LikePattern => "=like",
            Self::ILikePattern => "=ilike",
            Self::Like => "like",
            Self::NotLike => "not like",
            Self::ILike => "ilike",
            Self::NotILike => "not ilike",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::ChildOf => "child_of",
        }
    }

    pub fn is_pattern(self) -> bool {
        matches!(
            self,
            Self::LikePattern
                | Self::ILikePattern
                | Self::Like
                | Self::NotLike
                | Self::ILike
                | Self::NotILike
        )
    }

    /// Pattern operators whose value is wrapped in `%...%`.
    pub fn wraps_wildcards(self) -> bool {
        matches!(self, Self::Like | Self::NotLike | Self::ILike | Self::NotILike)
    }

    pub fn is_case_insensitive(self) -> bool {
        matches!(self, Self::ILikePattern | Self::ILike | Self::NotILike)
    }

    /// Operators taking a list of values.
    pub fn is_multi(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| OrmError::InvalidCondition(format!("Unknown operator '{}'", s)))
    }
}
