//! Lowers a parsed [`SelectStatement`] into a [`LogicalPlan`].
//!
//! Operator stacking, bottom-up: Scan → Join* → Filter → Aggregate →
//! Sort → Project → Limit. Qualified column references are validated
//! against the FROM/JOIN aliases and stripped, so the runtime works with
//! unqualified names throughout.

use std::collections::HashMap;

use fsq_common::{FsqError, Result, Schema};
use fsq_sql::ast::{
    AggregateCall, ColumnRef, Expr, JoinKind, SelectItem, SelectStatement, SourceRef,
};

use crate::analyzer::{output_schema, SchemaProvider};
use crate::logical_plan::{split_conjuncts, LogicalPlan, PlanSortKey, ScanHints};

/// Lowers a statement against resolved source schemas.
pub fn lower(stmt: &SelectStatement, provider: &dyn SchemaProvider) -> Result<LogicalPlan> {
    let mut bindings: Vec<String> = vec![stmt.from.binding().to_string()];
    for j in &stmt.joins {
        bindings.push(j.source.binding().to_string());
    }

    let mut plan = scan_for(&stmt.from, provider)?;

    for join in &stmt.joins {
        let right = scan_for(&join.source, provider)?;
        let left_schema = output_schema(&plan)?;
        let right_schema = output_schema(&right)?;
        let (kind, on) = match join.kind {
            JoinKind::Cross => (JoinKind::Inner, Vec::new()),
            kind => {
                let on_expr = join.on.as_ref().ok_or_else(|| {
                    FsqError::UnsupportedJoinCondition("JOIN requires an ON clause".to_string())
                })?;
                let on_expr = strip_qualifiers(on_expr.clone(), &bindings)?;
                (kind, equi_keys(on_expr, &left_schema, &right_schema)?)
            }
        };
        plan = LogicalPlan::Join {
            left: Box::new(plan),
            right: Box::new(right),
            on,
            kind,
        };
    }

    if let Some(selection) = &stmt.selection {
        let predicate = strip_qualifiers(selection.clone(), &bindings)?;
        if !collect_aggregate_calls(&predicate).is_empty() {
            return Err(FsqError::Schema(
                "aggregate calls are not allowed in WHERE".to_string(),
            ));
        }
        plan = LogicalPlan::Filter {
            predicate,
            input: Box::new(plan),
        };
    }

    let mut agg_names: HashMap<String, String> = HashMap::new();
    if stmt.is_aggregate() {
        plan = lower_aggregate(stmt, plan, &bindings, &mut agg_names)?;
    }

    if !stmt.order_by.is_empty() {
        let mut keys = Vec::with_capacity(stmt.order_by.len());
        for k in &stmt.order_by {
            let col = strip_column(&k.column, &bindings)?;
            keys.push(PlanSortKey {
                column: col,
                ascending: k.ascending,
            });
        }
        plan = LogicalPlan::Sort {
            keys,
            input: Box::new(plan),
        };
    }

    plan = lower_projection(stmt, plan, &bindings, &agg_names)?;

    if let Some(n) = stmt.limit {
        plan = LogicalPlan::Limit {
            n,
            input: Box::new(plan),
        };
    }

    Ok(plan)
}

fn scan_for(source: &SourceRef, provider: &dyn SchemaProvider) -> Result<LogicalPlan> {
    let binding = source.binding().to_string();
    let schema = provider.source_schema(&binding)?;
    Ok(LogicalPlan::Scan {
        source: source.locator.clone(),
        binding: binding.clone(),
        schema,
        partition_columns: provider.partition_columns(&binding),
        hints: ScanHints::default(),
    })
}

fn lower_aggregate(
    stmt: &SelectStatement,
    input: LogicalPlan,
    bindings: &[String],
    agg_names: &mut HashMap<String, String>,
) -> Result<LogicalPlan> {
    let mut group_keys = Vec::with_capacity(stmt.group_by.len());
    for g in &stmt.group_by {
        group_keys.push(strip_column(g, bindings)?);
    }

    let mut aggregates: Vec<(AggregateCall, String)> = Vec::new();
    let mut push = |call: AggregateCall, name: String, names: &mut HashMap<String, String>| {
        names.insert(call.canonical_name(), name.clone());
        if !aggregates.iter().any(|(_, n)| *n == name) {
            aggregates.push((call, name));
        }
    };

    for item in &stmt.projection {
        match item {
            SelectItem::Wildcard => {
                return Err(FsqError::Schema(
                    "SELECT * cannot be combined with GROUP BY or aggregates".to_string(),
                ))
            }
            SelectItem::Expr { expr, alias } => {
                let expr = strip_qualifiers(expr.clone(), bindings)?;
                match &expr {
                    Expr::Aggregate(call) => {
                        let name = alias.clone().unwrap_or_else(|| call.canonical_name());
                        push(call.clone(), name, agg_names);
                    }
                    Expr::Column(c) => {
                        if !group_keys.contains(&c.name) {
                            return Err(FsqError::Schema(format!(
                                "column '{}' must appear in GROUP BY or an aggregate",
                                c.name
                            )));
                        }
                    }
                    other => {
                        let inner = collect_aggregate_calls(other);
                        if inner.is_empty() {
                            return Err(FsqError::Schema(format!(
                                "expression `{other}` must aggregate or group its columns"
                            )));
                        }
                        for call in inner {
                            let name = call.canonical_name();
                            push(call.clone(), name, agg_names);
                        }
                    }
                }
            }
        }
    }

    Ok(LogicalPlan::Aggregate {
        group_keys,
        aggregates,
        input: Box::new(input),
    })
}

fn lower_projection(
    stmt: &SelectStatement,
    input: LogicalPlan,
    bindings: &[String],
    agg_names: &HashMap<String, String>,
) -> Result<LogicalPlan> {
    let child_schema = output_schema(&input)?;
    let mut exprs: Vec<(Expr, String)> = Vec::new();
    for item in &stmt.projection {
        match item {
            SelectItem::Wildcard => {
                for f in child_schema.fields() {
                    exprs.push((
                        Expr::Column(ColumnRef::bare(f.name.clone())),
                        f.name.clone(),
                    ));
                }
            }
            SelectItem::Expr { expr, alias } => {
                let stripped = strip_qualifiers(expr.clone(), bindings)?;
                let rewritten = replace_aggregates(stripped, agg_names);
                let name = match (alias, &rewritten) {
                    (Some(a), _) => a.clone(),
                    (None, Expr::Column(c)) => c.name.clone(),
                    (None, e) => e.to_string(),
                };
                exprs.push((rewritten, name));
            }
        }
    }
    Ok(LogicalPlan::Project {
        exprs,
        input: Box::new(input),
    })
}

/// Rewrites aggregate subexpressions into references to the columns the
/// Aggregate operator already produced.
fn replace_aggregates(expr: Expr, agg_names: &HashMap<String, String>) -> Expr {
    match expr {
        Expr::Aggregate(call) => {
            let canonical = call.canonical_name();
            let name = agg_names.get(&canonical).cloned().unwrap_or(canonical);
            Expr::Column(ColumnRef::bare(name))
        }
        Expr::Binary { left, op, right } => Expr::Binary {
            left: Box::new(replace_aggregates(*left, agg_names)),
            op,
            right: Box::new(replace_aggregates(*right, agg_names)),
        },
        Expr::And(a, b) => Expr::And(
            Box::new(replace_aggregates(*a, agg_names)),
            Box::new(replace_aggregates(*b, agg_names)),
        ),
        Expr::Or(a, b) => Expr::Or(
            Box::new(replace_aggregates(*a, agg_names)),
            Box::new(replace_aggregates(*b, agg_names)),
        ),
        Expr::Not(e) => Expr::Not(Box::new(replace_aggregates(*e, agg_names))),
        Expr::IsNull(e) => Expr::IsNull(Box::new(replace_aggregates(*e, agg_names))),
        Expr::IsNotNull(e) => Expr::IsNotNull(Box::new(replace_aggregates(*e, agg_names))),
        other => other,
    }
}

fn collect_aggregate_calls(expr: &Expr) -> Vec<&AggregateCall> {
    let mut out = Vec::new();
    fn walk<'a>(e: &'a Expr, out: &mut Vec<&'a AggregateCall>) {
        match e {
            Expr::Aggregate(c) => out.push(c),
            Expr::Binary { left, right, .. } => {
                walk(left, out);
                walk(right, out);
            }
            Expr::And(a, b) | Expr::Or(a, b) => {
                walk(a, out);
                walk(b, out);
            }
            Expr::Not(x) | Expr::IsNull(x) | Expr::IsNotNull(x) => walk(x, out),
            Expr::Column(_) | Expr::Literal(_) => {}
        }
    }
    walk(expr, &mut out);
    out
}

/// Strips a qualifier that names a FROM/JOIN binding. A dotted prefix
/// that is not a binding stays part of the column name — XML readers
/// flatten nested elements into dot-joined columns like `address.city`.
fn strip_column(c: &ColumnRef, bindings: &[String]) -> Result<String> {
    Ok(match &c.qualifier {
        Some(q) if bindings.iter().any(|b| b == q) => c.name.clone(),
        Some(q) => format!("{q}.{}", c.name),
        None => c.name.clone(),
    })
}

fn strip_qualifiers(expr: Expr, bindings: &[String]) -> Result<Expr> {
    Ok(match expr {
        Expr::Column(c) => Expr::Column(ColumnRef::bare(strip_column(&c, bindings)?)),
        Expr::Binary { left, op, right } => Expr::Binary {
            left: Box::new(strip_qualifiers(*left, bindings)?),
            op,
            right: Box::new(strip_qualifiers(*right, bindings)?),
        },
        Expr::And(a, b) => Expr::And(
            Box::new(strip_qualifiers(*a, bindings)?),
            Box::new(strip_qualifiers(*b, bindings)?),
        ),
        Expr::Or(a, b) => Expr::Or(
            Box::new(strip_qualifiers(*a, bindings)?),
            Box::new(strip_qualifiers(*b, bindings)?),
        ),
        Expr::Not(e) => Expr::Not(Box::new(strip_qualifiers(*e, bindings)?)),
        Expr::IsNull(e) => Expr::IsNull(Box::new(strip_qualifiers(*e, bindings)?)),
        Expr::IsNotNull(e) => Expr::IsNotNull(Box::new(strip_qualifiers(*e, bindings)?)),
        Expr::Aggregate(mut call) => {
            if let fsq_sql::ast::AggregateArg::Column(c) = &call.arg {
                call.arg =
                    fsq_sql::ast::AggregateArg::Column(ColumnRef::bare(strip_column(c, bindings)?));
            }
            Expr::Aggregate(call)
        }
        lit @ Expr::Literal(_) => lit,
    })
}

/// Extracts equi-join key pairs from an ON expression. Every conjunct
/// must be `col = col` with one side per input; anything else is an
/// [`FsqError::UnsupportedJoinCondition`].
fn equi_keys(on: Expr, left: &Schema, right: &Schema) -> Result<Vec<(String, String)>> {
    use fsq_common::CompareOp;
    use fsq_sql::ast::BinaryOp;
    let mut keys = Vec::new();
    for conjunct in split_conjuncts(on) {
        let Expr::Binary {
            left: l,
            op: BinaryOp::Compare(CompareOp::Eq),
            right: r,
        } = &conjunct
        else {
            return Err(FsqError::UnsupportedJoinCondition(format!(
                "hash join supports only equality conditions, got `{conjunct}`"
            )));
        };
        let (Expr::Column(a), Expr::Column(b)) = (l.as_ref(), r.as_ref()) else {
            return Err(FsqError::UnsupportedJoinCondition(format!(
                "join condition must compare two columns, got `{conjunct}`"
            )));
        };
        let pair = if left.contains(&a.name) && right.contains(&b.name) {
            (a.name.clone(), b.name.clone())
        } else if left.contains(&b.name) && right.contains(&a.name) {
            (b.name.clone(), a.name.clone())
        } else {
            return Err(FsqError::Schema(format!(
                "join keys `{}` and `{}` do not resolve to opposite sides",
                a.name, b.name
            )));
        };
        keys.push(pair);
    }
    if keys.is_empty() {
        return Err(FsqError::UnsupportedJoinCondition(
            "join requires at least one equality condition".to_string(),
        ));
    }
    Ok(keys)
}
