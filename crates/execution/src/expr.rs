//! Runtime expression evaluation over rows: arithmetic with numeric
//! promotion, comparisons, and three-valued boolean logic.

use fsq_common::{FsqError, Result, Row, Value};
use fsq_sql::ast::{BinaryOp, Expr};

/// Evaluates an expression to a value. A missing column reads as NULL
/// (name resolution already happened at plan time).
pub fn eval(expr: &Expr, row: &Row) -> Result<Value> {
    match expr {
        Expr::Column(c) => Ok(row.get(&c.name).cloned().unwrap_or(Value::Null)),
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Binary { left, op, right } => {
            let l = eval(left, row)?;
            let r = eval(right, row)?;
            match op {
                BinaryOp::Compare(cmp) => match l.compare(&r)? {
                    Some(ord) => Ok(Value::Bool(cmp.matches(ord))),
                    None => Ok(Value::Null),
                },
                BinaryOp::Arith(ar) => l.arith(*ar, &r),
            }
        }
        Expr::And(_, _) | Expr::Or(_, _) | Expr::Not(_) => {
            Ok(match eval_predicate(expr, row)? {
                Some(b) => Value::Bool(b),
                None => Value::Null,
            })
        }
        Expr::IsNull(e) => Ok(Value::Bool(eval(e, row)?.is_null())),
        Expr::IsNotNull(e) => Ok(Value::Bool(!eval(e, row)?.is_null())),
        Expr::Aggregate(call) => Err(FsqError::Schema(format!(
            "{} was not computed before projection",
            call.canonical_name()
        ))),
    }
}

/// Three-valued predicate evaluation: `None` is SQL unknown, which
/// filter contexts treat as false.
pub fn eval_predicate(expr: &Expr, row: &Row) -> Result<Option<bool>> {
    match expr {
        Expr::And(a, b) => {
            let l = eval_predicate(a, row)?;
            let r = eval_predicate(b, row)?;
            Ok(match (l, r) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            })
        }
        Expr::Or(a, b) => {
            let l = eval_predicate(a, row)?;
            let r = eval_predicate(b, row)?;
            Ok(match (l, r) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            })
        }
        Expr::Not(e) => Ok(eval_predicate(e, row)?.map(|b| !b)),
        other => match eval(other, row)? {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(b)),
            v => Err(FsqError::type_mismatch(
                "filter",
                v.data_type(),
                fsq_common::DataType::Boolean,
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsq_common::{ArithOp, CompareOp};
    use fsq_sql::ast::ColumnRef;

    fn col(name: &str) -> Expr {
        Expr::Column(ColumnRef::bare(name))
    }

    fn lit(v: Value) -> Expr {
        Expr::Literal(v)
    }

    fn row() -> Row {
        Row::from_pairs(vec![
            ("a".into(), Value::Integer(10)),
            ("b".into(), Value::Float(2.5)),
            ("n".into(), Value::Null),
        ])
    }

    #[test]
    fn arithmetic_promotes() {
        let e = Expr::Binary {
            left: Box::new(col("a")),
            op: BinaryOp::Arith(ArithOp::Mul),
            right: Box::new(col("b")),
        };
        assert_eq!(eval(&e, &row()).unwrap(), Value::Float(25.0));
    }

    #[test]
    fn null_comparison_is_unknown_and_filters_false() {
        let e = Expr::Binary {
            left: Box::new(col("n")),
            op: BinaryOp::Compare(CompareOp::Eq),
            right: Box::new(lit(Value::Integer(1))),
        };
        assert_eq!(eval(&e, &row()).unwrap(), Value::Null);
        assert_eq!(eval_predicate(&e, &row()).unwrap(), None);
    }

    #[test]
    fn three_valued_and_or() {
        let truth = Expr::Binary {
            left: Box::new(col("a")),
            op: BinaryOp::Compare(CompareOp::Gt),
            right: Box::new(lit(Value::Integer(1))),
        };
        let null_cmp = Expr::Binary {
            left: Box::new(col("n")),
            op: BinaryOp::Compare(CompareOp::Gt),
            right: Box::new(lit(Value::Integer(1))),
        };
        // true AND unknown = unknown
        let e = Expr::And(Box::new(truth.clone()), Box::new(null_cmp.clone()));
        assert_eq!(eval_predicate(&e, &row()).unwrap(), None);
        // true OR unknown = true
        let e = Expr::Or(Box::new(truth), Box::new(null_cmp.clone()));
        assert_eq!(eval_predicate(&e, &row()).unwrap(), Some(true));
        // NOT unknown = unknown
        let e = Expr::Not(Box::new(null_cmp));
        assert_eq!(eval_predicate(&e, &row()).unwrap(), None);
    }

    #[test]
    fn is_null_on_missing_and_null_columns() {
        assert_eq!(
            eval(&Expr::IsNull(Box::new(col("n"))), &row()).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval(&Expr::IsNull(Box::new(col("missing"))), &row()).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn incompatible_runtime_types_error() {
        let e = Expr::Binary {
            left: Box::new(lit(Value::Str("x".into()))),
            op: BinaryOp::Compare(CompareOp::Lt),
            right: Box::new(lit(Value::Integer(1))),
        };
        assert!(matches!(eval(&e, &row()), Err(FsqError::Type { .. })));
    }
}
