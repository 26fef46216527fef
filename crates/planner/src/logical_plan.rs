use fsq_common::{Schema, SimplePredicate};
use fsq_sql::ast::{AggregateCall, Expr, JoinKind};
use serde::{Deserialize, Serialize};

/// Pushdown hints attached to a [`LogicalPlan::Scan`].
///
/// Hints are declarative: the reader honors what it can and reports what
/// it consumed; anything declined is re-applied by the scan operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanHints {
    /// Columns the scan must produce; `None` means all.
    pub required_columns: Option<Vec<String>>,
    /// Simple predicates the reader may enforce during decoding.
    pub pushdown_filters: Vec<SimplePredicate>,
    /// Upper bound on rows the scan may emit.
    pub row_cap: Option<usize>,
    /// Predicates over partition columns, consumed exactly by pruning.
    pub partition_filters: Vec<SimplePredicate>,
}

/// One ORDER BY key in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSortKey {
    /// Column to sort by (unqualified).
    pub column: String,
    /// Ascending unless false. NULLs order last either way.
    pub ascending: bool,
}

/// An immutable tree of logical operators.
///
/// Constructed by the SQL frontend, rewritten by the optimizer, consumed
/// once by the executor. Every node has a computable output schema (see
/// [`crate::analyzer::output_schema`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalPlan {
    /// Leaf scan over one resolved source.
    Scan {
        /// Locator string as written in the query (fragment included).
        source: String,
        /// Alias this source binds to in the query.
        binding: String,
        /// Reader-provided schema (partition columns included).
        schema: Schema,
        /// Virtual partition columns, synthesized at the scan layer.
        partition_columns: Vec<String>,
        /// Optimizer hints.
        hints: ScanHints,
    },
    /// Residual row filter.
    Filter {
        predicate: Expr,
        input: Box<LogicalPlan>,
    },
    /// Projection with output names.
    Project {
        exprs: Vec<(Expr, String)>,
        input: Box<LogicalPlan>,
    },
    /// Hash aggregation; empty `group_keys` means one global group.
    Aggregate {
        group_keys: Vec<String>,
        aggregates: Vec<(AggregateCall, String)>,
        input: Box<LogicalPlan>,
    },
    /// Blocking sort.
    Sort {
        keys: Vec<PlanSortKey>,
        input: Box<LogicalPlan>,
    },
    /// Row-count cap.
    Limit {
        n: usize,
        input: Box<LogicalPlan>,
    },
    /// Hash join; `on` is the equi-key list `(left_col, right_col)`,
    /// empty for the comma cross-join form.
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        on: Vec<(String, String)>,
        kind: JoinKind,
    },
}

impl LogicalPlan {
    /// Visits every scan node.
    pub fn for_each_scan<'a>(&'a self, f: &mut impl FnMut(&'a LogicalPlan)) {
        match self {
            s @ LogicalPlan::Scan { .. } => f(s),
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. } => input.for_each_scan(f),
            LogicalPlan::Join { left, right, .. } => {
                left.for_each_scan(f);
                right.for_each_scan(f);
            }
        }
    }
}

/// Splits an expression into its AND-conjuncts.
pub fn split_conjuncts(e: Expr) -> Vec<Expr> {
    match e {
        Expr::And(a, b) => {
            let mut v = split_conjuncts(*a);
            v.extend(split_conjuncts(*b));
            v
        }
        other => vec![other],
    }
}

/// Rebuilds an AND-chain from conjuncts; `None` when empty.
pub fn combine_conjuncts(mut v: Vec<Expr>) -> Option<Expr> {
    if v.is_empty() {
        return None;
    }
    let first = v.remove(0);
    Some(
        v.into_iter()
            .fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e))),
    )
}

/// Extracts the `column op literal` shape from a conjunct, literal on
/// either side (the operator flips when the column is on the right).
pub fn as_simple_predicate(e: &Expr) -> Option<fsq_common::SimplePredicate> {
    use fsq_common::CompareOp;
    use fsq_sql::ast::BinaryOp;
    let Expr::Binary { left, op, right } = e else {
        return None;
    };
    let BinaryOp::Compare(cmp) = op else {
        return None;
    };
    match (left.as_ref(), right.as_ref()) {
        (Expr::Column(c), Expr::Literal(v)) => {
            Some(fsq_common::SimplePredicate::new(c.name.clone(), *cmp, v.clone()))
        }
        (Expr::Literal(v), Expr::Column(c)) => {
            let flipped = match cmp {
                CompareOp::Lt => CompareOp::Gt,
                CompareOp::LtEq => CompareOp::GtEq,
                CompareOp::Gt => CompareOp::Lt,
                CompareOp::GtEq => CompareOp::LtEq,
                other => *other,
            };
            Some(fsq_common::SimplePredicate::new(c.name.clone(), flipped, v.clone()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsq_common::{CompareOp, Value};
    use fsq_sql::ast::{BinaryOp, ColumnRef};

    fn col(name: &str) -> Expr {
        Expr::Column(ColumnRef::bare(name))
    }

    fn lit(v: i64) -> Expr {
        Expr::Literal(Value::Integer(v))
    }

    #[test]
    fn conjunct_split_and_combine_round_trip() {
        let a = Expr::Binary {
            left: Box::new(col("x")),
            op: BinaryOp::Compare(CompareOp::Eq),
            right: Box::new(lit(1)),
        };
        let b = Expr::IsNull(Box::new(col("y")));
        let joined = Expr::And(Box::new(a.clone()), Box::new(b.clone()));
        let parts = split_conjuncts(joined.clone());
        assert_eq!(parts, vec![a, b]);
        assert_eq!(combine_conjuncts(parts), Some(joined));
        assert_eq!(combine_conjuncts(vec![]), None);
    }

    #[test]
    fn literal_on_left_flips_operator() {
        let e = Expr::Binary {
            left: Box::new(lit(25)),
            op: BinaryOp::Compare(CompareOp::Lt),
            right: Box::new(col("age")),
        };
        let p = as_simple_predicate(&e).unwrap();
        assert_eq!(p.column, "age");
        assert_eq!(p.op, CompareOp::Gt);
    }

    #[test]
    fn column_to_column_comparison_is_not_simple() {
        let e = Expr::Binary {
            left: Box::new(col("a")),
            op: BinaryOp::Compare(CompareOp::Eq),
            right: Box::new(col("b")),
        };
        assert!(as_simple_predicate(&e).is_none());
    }
}
