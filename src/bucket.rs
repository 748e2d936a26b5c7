//! Bucket pipeline and merge operators.
//!
//! Contributions to one dimension are combined by bucket type, never by
//! arrival order. Buckets are applied in a fixed pipeline:
//!
//! ```text
//! FLAT → MULT → POST_ADD → OVERRIDE → EXPONENTIAL → LOGARITHMIC → CONDITIONAL
//! ```
//!
//! The running value starts at `0`. Within a bucket, contributions are
//! visited by descending priority (stable for equal priorities).
//!
//! A dimension whose merge rule disables the pipeline is folded with an
//! [`Operator`] instead.

use crate::contribution::Contribution;
use crate::error::StatError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Combination strategy tag carried by a contribution.
///
/// The declaration order is the pipeline order, so `Ord` on `Bucket`
/// sorts buckets the way they are applied.
///
/// # Examples
///
/// ```rust
/// use actorstat::Bucket;
///
/// assert!(Bucket::Flat < Bucket::Mult);
/// assert!(Bucket::PostAdd < Bucket::Override);
/// assert_eq!("POST_ADD".parse::<Bucket>().unwrap(), Bucket::PostAdd);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bucket {
    /// Summed into the running value.
    Flat,
    /// Multiplies the running value by each value.
    Mult,
    /// Summed after multiplication.
    PostAdd,
    /// The highest-priority value replaces the running value.
    Override,
    /// Scales the running value by `1 + value`.
    Exponential,
    /// Scales the running value by `1 + value / 100`.
    Logarithmic,
    /// Summed. Conditions are evaluated by the contributor.
    Conditional,
}

impl Bucket {
    /// Every bucket, in pipeline order.
    pub const ALL: [Bucket; 7] = [
        Bucket::Flat,
        Bucket::Mult,
        Bucket::PostAdd,
        Bucket::Override,
        Bucket::Exponential,
        Bucket::Logarithmic,
        Bucket::Conditional,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Flat => "FLAT",
            Bucket::Mult => "MULT",
            Bucket::PostAdd => "POST_ADD",
            Bucket::Override => "OVERRIDE",
            Bucket::Exponential => "EXPONENTIAL",
            Bucket::Logarithmic => "LOGARITHMIC",
            Bucket::Conditional => "CONDITIONAL",
        }
    }

    /// Apply this bucket's values to the running result.
    ///
    /// `values` must already be in descending priority order; `Override`
    /// takes the first one and discards the rest.
    pub fn apply(self, running: f64, values: &[f64]) -> f64 {
        match self {
            Bucket::Flat | Bucket::PostAdd | Bucket::Conditional => {
                running + values.iter().sum::<f64>()
            }
            Bucket::Mult => values.iter().fold(running, |acc, v| acc * v),
            Bucket::Override => values.first().copied().unwrap_or(running),
            Bucket::Exponential => values.iter().fold(running, |acc, v| acc * (1.0 + v)),
            Bucket::Logarithmic => values
                .iter()
                .fold(running, |acc, v| acc * (1.0 + v / 100.0)),
        }
    }
}

impl FromStr for Bucket {
    type Err = StatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bucket::ALL
            .into_iter()
            .find(|bucket| bucket.as_str() == s)
            .ok_or_else(|| StatError::unknown("bucket", s))
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combine one dimension's contributions through the bucket pipeline.
///
/// # Examples
///
/// ```rust
/// use actorstat::{combine_contributions, Bucket, Contribution};
///
/// let contributions = vec![
///     Contribution::new("gear", "atk", Bucket::PostAdd, 5.0),
///     Contribution::new("gear", "atk", Bucket::Mult, 2.0),
///     Contribution::new("gear", "atk", Bucket::Flat, 10.0),
/// ];
/// // (0 + 10) * 2 + 5
/// assert_eq!(combine_contributions(&contributions), 25.0);
/// ```
pub fn combine_contributions(contributions: &[Contribution]) -> f64 {
    let mut sorted: Vec<&Contribution> = contributions.iter().collect();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut grouped: BTreeMap<Bucket, Vec<f64>> = BTreeMap::new();
    for contribution in sorted {
        grouped
            .entry(contribution.bucket)
            .or_default()
            .push(contribution.value);
    }

    grouped
        .into_iter()
        .fold(0.0, |running, (bucket, values)| bucket.apply(running, &values))
}

/// Operator used when a merge rule bypasses the bucket pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Sum,
    Max,
    Min,
    /// Arithmetic mean of all values.
    Average,
    Multiply,
    /// Tightest bound. For scalar values this is the minimum.
    Intersect,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Sum,
        Operator::Max,
        Operator::Min,
        Operator::Average,
        Operator::Multiply,
        Operator::Intersect,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Sum => "SUM",
            Operator::Max => "MAX",
            Operator::Min => "MIN",
            Operator::Average => "AVERAGE",
            Operator::Multiply => "MULTIPLY",
            Operator::Intersect => "INTERSECT",
        }
    }

    /// `true` if the result does not depend on value order.
    pub fn is_commutative(self) -> bool {
        !matches!(self, Operator::Intersect | Operator::Average)
    }

    /// Fold values with this operator. An empty slice yields `0`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use actorstat::Operator;
    ///
    /// let values = [4.0, 1.0, 7.0];
    /// assert_eq!(Operator::Sum.combine(&values), 12.0);
    /// assert_eq!(Operator::Max.combine(&values), 7.0);
    /// assert_eq!(Operator::Average.combine(&values), 4.0);
    /// assert_eq!(Operator::Multiply.combine(&values), 28.0);
    /// assert_eq!(Operator::Min.combine(&[]), 0.0);
    /// ```
    pub fn combine(self, values: &[f64]) -> f64 {
        let Some((&first, rest)) = values.split_first() else {
            return 0.0;
        };
        match self {
            Operator::Sum => values.iter().sum(),
            Operator::Max => rest.iter().fold(first, |acc, &v| acc.max(v)),
            Operator::Min | Operator::Intersect => rest.iter().fold(first, |acc, &v| acc.min(v)),
            Operator::Average => values.iter().sum::<f64>() / values.len() as f64,
            Operator::Multiply => values.iter().product(),
        }
    }
}

impl FromStr for Operator {
    type Err = StatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| StatError::unknown("operator", s))
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contrib(bucket: Bucket, value: f64, priority: i64) -> Contribution {
        Contribution::new("test", "hp", bucket, value).with_priority(priority)
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(combine_contributions(&[]), 0.0);
    }

    #[test]
    fn test_bucket_order_independent_of_input_order() {
        let a = vec![
            contrib(Bucket::Flat, 10.0, 0),
            contrib(Bucket::Mult, 2.0, 0),
            contrib(Bucket::PostAdd, 5.0, 0),
        ];
        let b = vec![
            contrib(Bucket::PostAdd, 5.0, 0),
            contrib(Bucket::Flat, 10.0, 0),
            contrib(Bucket::Mult, 2.0, 0),
        ];
        assert_eq!(combine_contributions(&a), 25.0);
        assert_eq!(combine_contributions(&b), 25.0);
    }

    #[test]
    fn test_override_takes_highest_priority() {
        let contributions = vec![
            contrib(Bucket::Flat, 10.0, 0),
            contrib(Bucket::Override, 1.0, 1),
            contrib(Bucket::Override, 999.0, 5),
        ];
        assert_eq!(combine_contributions(&contributions), 999.0);
    }

    #[test]
    fn test_override_then_later_buckets() {
        let contributions = vec![
            contrib(Bucket::Flat, 10.0, 0),
            contrib(Bucket::Override, 100.0, 0),
            contrib(Bucket::Exponential, 0.5, 0),
            contrib(Bucket::Conditional, 3.0, 0),
        ];
        // 100 * 1.5 + 3
        assert_eq!(combine_contributions(&contributions), 153.0);
    }

    #[test]
    fn test_logarithmic_is_percentage() {
        let contributions = vec![
            contrib(Bucket::Flat, 200.0, 0),
            contrib(Bucket::Logarithmic, 50.0, 0),
        ];
        assert_eq!(combine_contributions(&contributions), 300.0);
    }

    #[test]
    fn test_mult_without_flat_is_zero() {
        let contributions = vec![contrib(Bucket::Mult, 3.0, 0)];
        assert_eq!(combine_contributions(&contributions), 0.0);
    }

    #[test]
    fn test_override_tie_keeps_first() {
        let contributions = vec![
            contrib(Bucket::Override, 7.0, 2),
            contrib(Bucket::Override, 8.0, 2),
        ];
        assert_eq!(combine_contributions(&contributions), 7.0);
    }

    #[test]
    fn test_operator_intersect_is_min() {
        assert_eq!(Operator::Intersect.combine(&[5.0, 2.0, 9.0]), 2.0);
        assert!(!Operator::Intersect.is_commutative());
        assert!(Operator::Sum.is_commutative());
    }

    #[test]
    fn test_unknown_strings_rejected() {
        assert!("flat".parse::<Bucket>().is_err());
        assert!("POWER".parse::<Operator>().is_err());
        assert_eq!("MULTIPLY".parse::<Operator>().unwrap(), Operator::Multiply);
        assert_eq!(serde_json::to_string(&Bucket::PostAdd).unwrap(), "\"POST_ADD\"");
    }
}
