use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// Comparison operators permitted in pushdown-able predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=` (also `<>`)
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl CompareOp {
    /// SQL spelling of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }

    /// Whether an ordering between operands satisfies the operator.
    pub fn matches(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::NotEq => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::LtEq => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::GtEq => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `column op literal` — the only predicate shape that travels into
/// readers as a pushdown hint. Richer expressions stay in the residual
/// Filter above the scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplePredicate {
    /// Column the predicate constrains.
    pub column: String,
    /// Comparison operator.
    pub op: CompareOp,
    /// Literal operand.
    pub value: Value,
}

impl SimplePredicate {
    /// Creates a predicate.
    pub fn new(column: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    /// Evaluates against a single column value.
    ///
    /// NULL never matches, regardless of operator; incomparable types
    /// surface as a type error.
    pub fn eval(&self, actual: &Value) -> Result<bool> {
        match actual.compare(&self.value)? {
            Some(ord) => Ok(self.op.matches(ord)),
            None => Ok(false),
        }
    }

    /// Evaluates against a row; a missing column behaves as NULL.
    pub fn matches_row(&self, row: &Row) -> Result<bool> {
        match row.get(&self.column) {
            Some(v) => self.eval(v),
            None => Ok(false),
        }
    }

    /// Conservative min/max overlap test for statistics-based pruning.
    ///
    /// Returns `false` only when no value in `[min, max]` can satisfy the
    /// predicate; unknown or incomparable statistics keep the candidate.
    pub fn may_match_range(&self, min: &Value, max: &Value) -> bool {
        let cmp_min = match min.compare(&self.value) {
            Ok(Some(o)) => o,
            _ => return true,
        };
        let cmp_max = match max.compare(&self.value) {
            Ok(Some(o)) => o,
            _ => return true,
        };
        match self.op {
            CompareOp::Gt => cmp_max == Ordering::Greater,
            CompareOp::GtEq => cmp_max != Ordering::Less,
            CompareOp::Lt => cmp_min == Ordering::Less,
            CompareOp::LtEq => cmp_min != Ordering::Greater,
            CompareOp::Eq => cmp_min != Ordering::Greater && cmp_max != Ordering::Less,
            CompareOp::NotEq => {
                !(cmp_min == Ordering::Equal && cmp_max == Ordering::Equal)
            }
        }
    }
}

impl fmt::Display for SimplePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.column, self.op, self.value)
    }
}

/// Conjunction check: every predicate must hold for the row.
pub fn all_match(predicates: &[SimplePredicate], row: &Row) -> Result<bool> {
    for p in predicates {
        if !p.matches_row(row)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(op: CompareOp, v: i64) -> SimplePredicate {
        SimplePredicate::new("age", op, Value::Integer(v))
    }

    #[test]
    fn null_never_matches() {
        for op in [
            CompareOp::Eq,
            CompareOp::NotEq,
            CompareOp::Lt,
            CompareOp::LtEq,
            CompareOp::Gt,
            CompareOp::GtEq,
        ] {
            assert!(!pred(op, 5).eval(&Value::Null).unwrap(), "{op}");
        }
    }

    #[test]
    fn range_overlap_logic() {
        // rows span [10, 20]
        let (min, max) = (Value::Integer(10), Value::Integer(20));
        assert!(!pred(CompareOp::Gt, 20).may_match_range(&min, &max));
        assert!(pred(CompareOp::Gt, 19).may_match_range(&min, &max));
        assert!(!pred(CompareOp::Lt, 10).may_match_range(&min, &max));
        assert!(pred(CompareOp::LtEq, 10).may_match_range(&min, &max));
        assert!(!pred(CompareOp::Eq, 9).may_match_range(&min, &max));
        assert!(pred(CompareOp::Eq, 15).may_match_range(&min, &max));
        // single-valued group excluded only by its own value
        let single = Value::Integer(7);
        assert!(!pred(CompareOp::NotEq, 7).may_match_range(&single, &single));
        assert!(pred(CompareOp::NotEq, 8).may_match_range(&single, &single));
    }

    #[test]
    fn incomparable_stats_are_kept() {
        let p = SimplePredicate::new("age", CompareOp::Gt, Value::Str("x".into()));
        assert!(p.may_match_range(&Value::Integer(1), &Value::Integer(2)));
    }

    #[test]
    fn missing_column_behaves_as_null() {
        let row = Row::from_pairs(vec![("other".into(), Value::Integer(1))]);
        assert!(!pred(CompareOp::Eq, 1).matches_row(&row).unwrap());
    }
}
