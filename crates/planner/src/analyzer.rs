//! Name resolution, plan-time type checks, and output-schema computation.

use fsq_common::{DataType, Field, FsqError, Result, Schema};
use fsq_sql::ast::{AggregateArg, AggregateCall, AggregateFunc, BinaryOp, Expr};

use crate::logical_plan::LogicalPlan;

/// Provides schemas for resolved sources, keyed by query binding.
pub trait SchemaProvider {
    /// Schema of the source bound to `binding` (partition columns included).
    fn source_schema(&self, binding: &str) -> Result<Schema>;

    /// Virtual partition columns of the source, if any.
    fn partition_columns(&self, _binding: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Computes the stable output schema of a plan node.
pub fn output_schema(plan: &LogicalPlan) -> Result<Schema> {
    match plan {
        LogicalPlan::Scan { schema, hints, .. } => match &hints.required_columns {
            Some(cols) => schema.project(cols),
            None => Ok(schema.clone()),
        },
        LogicalPlan::Filter { input, .. }
        | LogicalPlan::Sort { input, .. }
        | LogicalPlan::Limit { input, .. } => output_schema(input),
        LogicalPlan::Project { exprs, input } => {
            let child = output_schema(input)?;
            let mut fields = Vec::with_capacity(exprs.len());
            for (e, name) in exprs {
                fields.push(Field::new(name.clone(), expr_type(e, &child)?));
            }
            Ok(Schema::new(fields))
        }
        LogicalPlan::Aggregate {
            group_keys,
            aggregates,
            input,
        } => {
            let child = output_schema(input)?;
            let mut fields = Vec::new();
            for k in group_keys {
                let dt = child
                    .data_type(k)
                    .ok_or_else(|| unknown_column(k, &child))?;
                fields.push(Field::new(k.clone(), dt));
            }
            for (call, name) in aggregates {
                fields.push(Field::new(name.clone(), aggregate_type(call, &child)?));
            }
            Ok(Schema::new(fields))
        }
        LogicalPlan::Join { left, right, .. } => {
            Ok(output_schema(left)?.merge(&output_schema(right)?))
        }
    }
}

/// Result type of an aggregate call under a given input schema.
pub fn aggregate_type(call: &AggregateCall, input: &Schema) -> Result<DataType> {
    let arg_type = match &call.arg {
        AggregateArg::Star => None,
        AggregateArg::Column(c) => Some(
            input
                .data_type(&c.name)
                .ok_or_else(|| unknown_column(&c.name, input))?,
        ),
    };
    Ok(match call.func {
        AggregateFunc::Count => DataType::Integer,
        AggregateFunc::Sum => numeric_arg(call, arg_type)?,
        AggregateFunc::Avg => match numeric_arg(call, arg_type)? {
            DataType::Decimal => DataType::Decimal,
            _ => DataType::Float,
        },
        AggregateFunc::Min | AggregateFunc::Max => {
            arg_type.unwrap_or(DataType::Null)
        }
    })
}

fn numeric_arg(call: &AggregateCall, arg_type: Option<DataType>) -> Result<DataType> {
    match arg_type {
        Some(t) if t.is_numeric() || t == DataType::Null => Ok(t),
        Some(t) => Err(FsqError::Schema(format!(
            "{} requires a numeric argument, got {t}",
            call.canonical_name()
        ))),
        None => Err(FsqError::Schema(format!(
            "{} requires a column argument",
            call.canonical_name()
        ))),
    }
}

/// Static type of an expression; surfaces [`FsqError::Schema`] for unknown
/// columns and comparisons over types known to be incomparable.
pub fn expr_type(expr: &Expr, schema: &Schema) -> Result<DataType> {
    match expr {
        Expr::Column(c) => schema
            .data_type(&c.name)
            .ok_or_else(|| unknown_column(&c.name, schema)),
        Expr::Literal(v) => Ok(v.data_type()),
        Expr::Binary { left, op, right } => {
            let lt = expr_type(left, schema)?;
            let rt = expr_type(right, schema)?;
            match op {
                BinaryOp::Compare(cmp) => {
                    if !lt.is_comparable(rt) {
                        return Err(FsqError::Schema(format!(
                            "cannot compare {lt} with {rt} in `{left} {cmp} {right}`"
                        )));
                    }
                    Ok(DataType::Boolean)
                }
                BinaryOp::Arith(ar) => {
                    let numeric_ok = |t: DataType| t.is_numeric() || t == DataType::Null;
                    if !numeric_ok(lt) || !numeric_ok(rt) {
                        return Err(FsqError::Schema(format!(
                            "arithmetic `{ar}` needs numeric operands, got {lt} and {rt}",
                            ar = ar.as_str()
                        )));
                    }
                    Ok(lt.promote(rt))
                }
            }
        }
        Expr::And(a, b) | Expr::Or(a, b) => {
            expr_type(a, schema)?;
            expr_type(b, schema)?;
            Ok(DataType::Boolean)
        }
        Expr::Not(e) => {
            expr_type(e, schema)?;
            Ok(DataType::Boolean)
        }
        Expr::IsNull(e) | Expr::IsNotNull(e) => {
            expr_type(e, schema)?;
            Ok(DataType::Boolean)
        }
        Expr::Aggregate(call) => aggregate_type(call, schema),
    }
}

/// Walks the plan and verifies every expression against its input schema.
/// Parser and planner errors must surface before any row is yielded.
pub fn validate(plan: &LogicalPlan) -> Result<()> {
    match plan {
        LogicalPlan::Scan { .. } => Ok(()),
        LogicalPlan::Filter { predicate, input } => {
            validate(input)?;
            let schema = output_schema(input)?;
            expr_type(predicate, &schema)?;
            Ok(())
        }
        LogicalPlan::Project { exprs, input } => {
            validate(input)?;
            let schema = output_schema(input)?;
            for (e, _) in exprs {
                expr_type(e, &schema)?;
            }
            Ok(())
        }
        LogicalPlan::Aggregate { input, .. } => {
            validate(input)?;
            // Group keys and aggregate args are checked by output_schema.
            output_schema(plan).map(|_| ())
        }
        LogicalPlan::Sort { keys, input } => {
            validate(input)?;
            let schema = output_schema(input)?;
            for k in keys {
                if !schema.contains(&k.column) {
                    return Err(unknown_column(&k.column, &schema));
                }
            }
            Ok(())
        }
        LogicalPlan::Limit { input, .. } => validate(input),
        LogicalPlan::Join {
            left, right, on, ..
        } => {
            validate(left)?;
            validate(right)?;
            let ls = output_schema(left)?;
            let rs = output_schema(right)?;
            for (lk, rk) in on {
                let lt = ls.data_type(lk).ok_or_else(|| unknown_column(lk, &ls))?;
                let rt = rs.data_type(rk).ok_or_else(|| unknown_column(rk, &rs))?;
                if !lt.is_comparable(rt) {
                    return Err(FsqError::Schema(format!(
                        "join keys `{lk}` ({lt}) and `{rk}` ({rt}) are not comparable"
                    )));
                }
            }
            Ok(())
        }
    }
}

fn unknown_column(name: &str, schema: &Schema) -> FsqError {
    FsqError::Schema(format!(
        "column '{}' not found; available: {}",
        name,
        schema.names().join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_plan::ScanHints;
    use fsq_common::Value;
    use fsq_sql::ast::ColumnRef;

    fn scan(fields: Vec<Field>) -> LogicalPlan {
        LogicalPlan::Scan {
            source: "t.csv".into(),
            binding: "t".into(),
            schema: Schema::new(fields),
            partition_columns: vec![],
            hints: ScanHints::default(),
        }
    }

    #[test]
    fn filter_over_unknown_column_fails_at_plan_time() {
        let plan = LogicalPlan::Filter {
            predicate: Expr::Binary {
                left: Box::new(Expr::Column(ColumnRef::bare("missing"))),
                op: BinaryOp::Compare(fsq_common::CompareOp::Eq),
                right: Box::new(Expr::Literal(Value::Integer(1))),
            },
            input: Box::new(scan(vec![Field::new("a", DataType::Integer)])),
        };
        let err = validate(&plan).unwrap_err();
        assert!(matches!(err, FsqError::Schema(_)), "{err}");
    }

    #[test]
    fn incomparable_comparison_is_a_schema_error() {
        let plan = LogicalPlan::Filter {
            predicate: Expr::Binary {
                left: Box::new(Expr::Column(ColumnRef::bare("name"))),
                op: BinaryOp::Compare(fsq_common::CompareOp::Gt),
                right: Box::new(Expr::Literal(Value::Integer(1))),
            },
            input: Box::new(scan(vec![Field::new("name", DataType::String)])),
        };
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn aggregate_schema_lists_group_keys_then_aggs() {
        use fsq_sql::ast::{AggregateArg, AggregateCall, AggregateFunc};
        let plan = LogicalPlan::Aggregate {
            group_keys: vec!["k".into()],
            aggregates: vec![(
                AggregateCall {
                    func: AggregateFunc::Avg,
                    arg: AggregateArg::Column(ColumnRef::bare("v")),
                },
                "AVG(v)".into(),
            )],
            input: Box::new(scan(vec![
                Field::new("k", DataType::String),
                Field::new("v", DataType::Integer),
            ])),
        };
        let schema = output_schema(&plan).unwrap();
        assert_eq!(schema.names(), vec!["k", "AVG(v)"]);
        assert_eq!(schema.data_type("AVG(v)"), Some(DataType::Float));
    }

    #[test]
    fn projected_scan_narrows_schema() {
        let mut s = scan(vec![
            Field::new("a", DataType::Integer),
            Field::new("b", DataType::String),
        ]);
        if let LogicalPlan::Scan { hints, .. } = &mut s {
            hints.required_columns = Some(vec!["b".into()]);
        }
        assert_eq!(output_schema(&s).unwrap().names(), vec!["b"]);
    }
}
