//! `ExpressionKind` and `AggregateFunction` (spec.md §3).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionKind {
    Direct,
    Computed,
    Function,
    Case,
    Aggregation,
    Window,
}

impl ExpressionKind {
    /// Precedence used to merge `ExpressionKind`s across UNION branches:
    /// `Case > Function > Computed > Direct`.
    fn rank(self) -> u8 {
        match self {
            ExpressionKind::Case => 3,
            ExpressionKind::Function => 2,
            ExpressionKind::Computed => 1,
            ExpressionKind::Direct => 0,
            // Aggregation/Window never appear in UNION branch merging (they
            // are handled by the aggregation path, which does not merge
            // across branches column-by-column in the same way), but give
            // them a defined rank so `max` stays total.
            ExpressionKind::Aggregation => 4,
            ExpressionKind::Window => 5,
        }
    }

    pub fn merge_precedence(self, other: ExpressionKind) -> ExpressionKind {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunction {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFunction {
    /// Matches a SQL function name (case-insensitive) to an aggregate
    /// function, if it is one of the five the spec supports.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => Some(Self::Sum),
            "AVG" => Some(Self::Avg),
            "MIN" => Some(Self::Min),
            "MAX" => Some(Self::Max),
            "COUNT" => Some(Self::Count),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Count => "COUNT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_precedence_prefers_case() {
        assert_eq!(
            ExpressionKind::Direct.merge_precedence(ExpressionKind::Case),
            ExpressionKind::Case
        );
        assert_eq!(
            ExpressionKind::Function.merge_precedence(ExpressionKind::Computed),
            ExpressionKind::Function
        );
    }

    #[test]
    fn aggregate_function_from_name_is_case_insensitive() {
        assert_eq!(AggregateFunction::from_name("sum"), Some(AggregateFunction::Sum));
        assert_eq!(AggregateFunction::from_name("Avg"), Some(AggregateFunction::Avg));
        assert_eq!(AggregateFunction::from_name("LENGTH"), None);
    }
}
