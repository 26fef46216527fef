//! The optimizer pipeline: partition pruning → predicate pushdown →
//! column pruning → limit pushdown, in that fixed order. Every rule is
//! idempotent and records an audit entry whether or not it fired.

use std::collections::HashSet;

use fsq_common::{OptimizerToggles, SimplePredicate};
use fsq_sql::ast::{Expr, JoinKind};
use tracing::debug;

use crate::logical_plan::{
    as_simple_predicate, combine_conjuncts, split_conjuncts, LogicalPlan,
};

/// One audit record: `(rule_name, applied, reason_or_effect)`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AuditEntry {
    /// Stable rule name.
    pub rule: &'static str,
    /// Whether the rule changed the plan.
    pub applied: bool,
    /// Effect description when applied, reason otherwise.
    pub detail: String,
}

impl AuditEntry {
    fn applied(rule: &'static str, detail: impl Into<String>) -> Self {
        Self {
            rule,
            applied: true,
            detail: detail.into(),
        }
    }

    fn skipped(rule: &'static str, detail: impl Into<String>) -> Self {
        Self {
            rule,
            applied: false,
            detail: detail.into(),
        }
    }
}

/// Pipelined plan rewriter.
#[derive(Debug, Default)]
pub struct Optimizer {
    toggles: OptimizerToggles,
}

impl Optimizer {
    pub fn new(toggles: OptimizerToggles) -> Self {
        Self { toggles }
    }

    /// Runs all rules in order, returning the rewritten plan and the
    /// collected audit trail.
    pub fn optimize(&self, plan: LogicalPlan) -> (LogicalPlan, Vec<AuditEntry>) {
        let mut plan = plan;
        let mut audit = Vec::with_capacity(4);

        if self.toggles.partition_pruning {
            let (rewritten, entry) = partition_pruning(plan);
            plan = rewritten;
            debug!(rule = entry.rule, applied = entry.applied, detail = %entry.detail, "optimizer rule");
            audit.push(entry);
        } else {
            audit.push(AuditEntry::skipped("partition_pruning", "skipped (disabled)"));
        }

        if self.toggles.predicate_pushdown {
            let (rewritten, entry) = predicate_pushdown(plan);
            plan = rewritten;
            debug!(rule = entry.rule, applied = entry.applied, detail = %entry.detail, "optimizer rule");
            audit.push(entry);
        } else {
            audit.push(AuditEntry::skipped("predicate_pushdown", "skipped (disabled)"));
        }

        if self.toggles.column_pruning {
            let entry = column_pruning(&mut plan);
            debug!(rule = entry.rule, applied = entry.applied, detail = %entry.detail, "optimizer rule");
            audit.push(entry);
        } else {
            audit.push(AuditEntry::skipped("column_pruning", "skipped (disabled)"));
        }

        if self.toggles.limit_pushdown {
            let entry = limit_pushdown(&mut plan);
            debug!(rule = entry.rule, applied = entry.applied, detail = %entry.detail, "optimizer rule");
            audit.push(entry);
        } else {
            audit.push(AuditEntry::skipped("limit_pushdown", "skipped (disabled)"));
        }

        (plan, audit)
    }
}

// -----------------------------
// 1) Partition pruning
// -----------------------------

fn partition_pruning(plan: LogicalPlan) -> (LogicalPlan, AuditEntry) {
    const RULE: &str = "partition_pruning";
    let mut has_partitions = false;
    plan.for_each_scan(&mut |s| {
        if let LogicalPlan::Scan { partition_columns, .. } = s {
            has_partitions |= !partition_columns.is_empty();
        }
    });
    if !has_partitions {
        return (plan, AuditEntry::skipped(RULE, "skipped (no partitions)"));
    }

    let mut consumed = 0;
    let plan = strip_filter_conjuncts(plan, &mut sink_partition_filter, &mut consumed);
    let entry = if consumed == 0 {
        AuditEntry::skipped(RULE, "not applicable (no partition predicates)")
    } else {
        AuditEntry::applied(RULE, format!("applied ({consumed} partition filter(s))"))
    };
    (plan, entry)
}

/// Partition pruning is exact, so the predicate is consumed; it may only
/// sink to a scan that uniquely owns the partition column, and never
/// through an outer join.
fn sink_partition_filter(plan: &mut LogicalPlan, pred: &SimplePredicate) -> bool {
    match plan {
        LogicalPlan::Scan {
            partition_columns,
            schema,
            hints,
            ..
        } => {
            if !partition_columns.iter().any(|c| c == &pred.column) {
                return false;
            }
            // Pruning is exact only when the comparison is well-typed.
            let comparable = schema
                .data_type(&pred.column)
                .map(|t| t.is_comparable(pred.value.data_type()))
                .unwrap_or(false);
            if !comparable {
                return false;
            }
            hints.partition_filters.push(pred.clone());
            true
        }
        LogicalPlan::Join {
            left, right, kind, ..
        } => {
            if *kind != JoinKind::Inner {
                return false;
            }
            let in_left = owns_partition_column(left, &pred.column);
            let in_right = owns_partition_column(right, &pred.column);
            match (in_left, in_right) {
                (true, false) => sink_partition_filter(left, pred),
                (false, true) => sink_partition_filter(right, pred),
                _ => false,
            }
        }
        LogicalPlan::Filter { input, .. } | LogicalPlan::Limit { input, .. } => {
            sink_partition_filter(input, pred)
        }
        _ => false,
    }
}

fn owns_partition_column(plan: &LogicalPlan, column: &str) -> bool {
    let mut found = false;
    plan.for_each_scan(&mut |s| {
        if let LogicalPlan::Scan { partition_columns, .. } = s {
            found |= partition_columns.iter().any(|c| c == column);
        }
    });
    found
}

// -----------------------------
// 2) Predicate pushdown
// -----------------------------

fn predicate_pushdown(plan: LogicalPlan) -> (LogicalPlan, AuditEntry) {
    const RULE: &str = "predicate_pushdown";
    let mut consumed = 0;
    let plan = strip_filter_conjuncts(plan, &mut sink_pushdown_filter, &mut consumed);
    let entry = if consumed == 0 {
        AuditEntry::skipped(RULE, "not applicable (no pushable conjuncts)")
    } else {
        let noun = if consumed == 1 { "conjunct" } else { "conjuncts" };
        AuditEntry::applied(RULE, format!("applied ({consumed} {noun})"))
    };
    (plan, entry)
}

/// A predicate is pushed only when exactly one scan owns its column and
/// the literal is comparable with the column type. Outer joins only
/// accept pushes into their preserved side; predicates over joined
/// results never move.
fn sink_pushdown_filter(plan: &mut LogicalPlan, pred: &SimplePredicate) -> bool {
    match plan {
        LogicalPlan::Scan { schema, hints, .. } => {
            let Some(col_type) = schema.data_type(&pred.column) else {
                return false;
            };
            if !col_type.is_comparable(pred.value.data_type()) {
                return false;
            }
            hints.pushdown_filters.push(pred.clone());
            true
        }
        LogicalPlan::Join {
            left, right, kind, ..
        } => {
            let in_left = scan_owns_column(left, &pred.column);
            let in_right = scan_owns_column(right, &pred.column);
            match (*kind, in_left, in_right) {
                (JoinKind::Inner, true, false) => sink_pushdown_filter(left, pred),
                (JoinKind::Inner, false, true) => sink_pushdown_filter(right, pred),
                // Outer joins keep their null-extended side intact.
                (JoinKind::Left, true, false) => sink_pushdown_filter(left, pred),
                (JoinKind::Right, false, true) => sink_pushdown_filter(right, pred),
                _ => false,
            }
        }
        LogicalPlan::Filter { input, .. } | LogicalPlan::Limit { input, .. } => {
            sink_pushdown_filter(input, pred)
        }
        _ => false,
    }
}

fn scan_owns_column(plan: &LogicalPlan, column: &str) -> bool {
    let mut found = false;
    plan.for_each_scan(&mut |s| {
        if let LogicalPlan::Scan { schema, .. } = s {
            found |= schema.contains(column);
        }
    });
    found
}

/// Shared walk for the two sinking rules: visits every Filter node,
/// offers each simple-predicate conjunct to `sink`, removes consumed
/// conjuncts, and splices out Filter nodes that end up empty.
fn strip_filter_conjuncts(
    plan: LogicalPlan,
    sink: &mut impl FnMut(&mut LogicalPlan, &SimplePredicate) -> bool,
    consumed: &mut usize,
) -> LogicalPlan {
    match plan {
        LogicalPlan::Filter { predicate, input } => {
            let mut input = Box::new(strip_filter_conjuncts(*input, sink, consumed));
            let conjuncts = split_conjuncts(predicate);
            let mut kept: Vec<Expr> = Vec::with_capacity(conjuncts.len());
            for c in conjuncts {
                match as_simple_predicate(&c) {
                    Some(p) if sink(&mut input, &p) => *consumed += 1,
                    _ => kept.push(c),
                }
            }
            match combine_conjuncts(kept) {
                Some(residual) => LogicalPlan::Filter {
                    predicate: residual,
                    input,
                },
                None => *input,
            }
        }
        LogicalPlan::Project { exprs, input } => LogicalPlan::Project {
            exprs,
            input: Box::new(strip_filter_conjuncts(*input, sink, consumed)),
        },
        LogicalPlan::Aggregate {
            group_keys,
            aggregates,
            input,
        } => LogicalPlan::Aggregate {
            group_keys,
            aggregates,
            input: Box::new(strip_filter_conjuncts(*input, sink, consumed)),
        },
        LogicalPlan::Sort { keys, input } => LogicalPlan::Sort {
            keys,
            input: Box::new(strip_filter_conjuncts(*input, sink, consumed)),
        },
        LogicalPlan::Limit { n, input } => LogicalPlan::Limit {
            n,
            input: Box::new(strip_filter_conjuncts(*input, sink, consumed)),
        },
        LogicalPlan::Join {
            left,
            right,
            on,
            kind,
        } => LogicalPlan::Join {
            left: Box::new(strip_filter_conjuncts(*left, sink, consumed)),
            right: Box::new(strip_filter_conjuncts(*right, sink, consumed)),
            on,
            kind,
        },
        s @ LogicalPlan::Scan { .. } => s,
    }
}

// -----------------------------
// 3) Column pruning
// -----------------------------

fn column_pruning(plan: &mut LogicalPlan) -> AuditEntry {
    const RULE: &str = "column_pruning";
    prune_columns(plan, None);

    let (mut kept, mut total) = (0usize, 0usize);
    let mut narrowed = false;
    plan.for_each_scan(&mut |s| {
        if let LogicalPlan::Scan { schema, hints, .. } = s {
            total += schema.len();
            match &hints.required_columns {
                Some(cols) => {
                    kept += cols.len();
                    narrowed |= cols.len() < schema.len();
                }
                None => kept += schema.len(),
            }
        }
    });
    if narrowed {
        AuditEntry::applied(RULE, format!("applied ({kept} of {total} columns)"))
    } else {
        AuditEntry::skipped(RULE, "not applicable (all columns required)")
    }
}

/// Upward-union column requirements pushed to each scan. `None` means
/// "everything" and survives until a Project or Aggregate narrows it.
fn prune_columns(plan: &mut LogicalPlan, required: Option<HashSet<String>>) {
    match plan {
        LogicalPlan::Project { exprs, input } => {
            let mut req = HashSet::new();
            for (e, _) in exprs.iter() {
                collect_expr_columns(e, &mut req);
            }
            prune_columns(input, Some(req));
        }
        LogicalPlan::Aggregate {
            group_keys,
            aggregates,
            input,
        } => {
            let mut req: HashSet<String> = group_keys.iter().cloned().collect();
            for (call, _) in aggregates.iter() {
                if let fsq_sql::ast::AggregateArg::Column(c) = &call.arg {
                    req.insert(c.name.clone());
                }
            }
            prune_columns(input, Some(req));
        }
        LogicalPlan::Filter { predicate, input } => {
            let req = required.map(|mut r| {
                collect_expr_columns(predicate, &mut r);
                r
            });
            prune_columns(input, req);
        }
        LogicalPlan::Sort { keys, input } => {
            let req = required.map(|mut r| {
                r.extend(keys.iter().map(|k| k.column.clone()));
                r
            });
            prune_columns(input, req);
        }
        LogicalPlan::Limit { input, .. } => prune_columns(input, required),
        LogicalPlan::Join {
            left, right, on, ..
        } => {
            let mut req_left: HashSet<String> = on.iter().map(|(l, _)| l.clone()).collect();
            let mut req_right: HashSet<String> = on.iter().map(|(_, r)| r.clone()).collect();
            match required {
                Some(req) => {
                    for c in req {
                        let in_left = scan_owns_column(left, &c);
                        let in_right = scan_owns_column(right, &c);
                        // Ambiguous names stay on both sides.
                        if in_left {
                            req_left.insert(c.clone());
                        }
                        if in_right {
                            req_right.insert(c);
                        }
                    }
                    prune_columns(left, Some(req_left));
                    prune_columns(right, Some(req_right));
                }
                None => {
                    prune_columns(left, None);
                    prune_columns(right, None);
                }
            }
        }
        LogicalPlan::Scan { schema, hints, .. } => {
            let Some(req) = required else {
                return;
            };
            // Pushed-down filters still need their columns decoded.
            let mut req = req;
            for p in &hints.pushdown_filters {
                req.insert(p.column.clone());
            }
            let ordered: Vec<String> = schema
                .names()
                .into_iter()
                .filter(|n| req.contains(*n))
                .map(|n| n.to_string())
                .collect();
            if ordered.len() < schema.len() {
                hints.required_columns = Some(ordered);
            }
        }
    }
}

fn collect_expr_columns(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::Column(c) => {
            out.insert(c.name.clone());
        }
        Expr::Binary { left, right, .. } => {
            collect_expr_columns(left, out);
            collect_expr_columns(right, out);
        }
        Expr::And(a, b) | Expr::Or(a, b) => {
            collect_expr_columns(a, out);
            collect_expr_columns(b, out);
        }
        Expr::Not(e) | Expr::IsNull(e) | Expr::IsNotNull(e) => collect_expr_columns(e, out),
        Expr::Aggregate(call) => {
            if let fsq_sql::ast::AggregateArg::Column(c) = &call.arg {
                out.insert(c.name.clone());
            }
        }
        Expr::Literal(_) => {}
    }
}

// -----------------------------
// 4) Limit pushdown
// -----------------------------

fn limit_pushdown(plan: &mut LogicalPlan) -> AuditEntry {
    const RULE: &str = "limit_pushdown";
    let LogicalPlan::Limit { n, input } = plan else {
        return AuditEntry::skipped(RULE, "not applicable (no limit)");
    };
    let n = *n;
    if let Some(scan) = linear_scan_target(input) {
        if let LogicalPlan::Scan { hints, .. } = scan {
            hints.row_cap = Some(match hints.row_cap {
                Some(existing) => existing.min(n),
                None => n,
            });
            return AuditEntry::applied(RULE, format!("applied (n={n})"));
        }
    }
    AuditEntry::skipped(RULE, "not applicable (blocking operator above scan)")
}

/// The scan under a pipeline of Projects, if nothing blocking (sort,
/// aggregate, join) or row-dropping (residual filter) sits in between.
fn linear_scan_target(plan: &mut LogicalPlan) -> Option<&mut LogicalPlan> {
    match plan {
        s @ LogicalPlan::Scan { .. } => Some(s),
        LogicalPlan::Project { input, .. } | LogicalPlan::Limit { input, .. } => {
            linear_scan_target(input)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_plan::ScanHints;
    use fsq_common::{CompareOp, DataType, Field, Schema, Value};
    use fsq_sql::ast::{BinaryOp, ColumnRef};

    fn scan(name: &str, fields: Vec<Field>, partitions: Vec<&str>) -> LogicalPlan {
        LogicalPlan::Scan {
            source: name.to_string(),
            binding: name.to_string(),
            schema: Schema::new(fields),
            partition_columns: partitions.into_iter().map(String::from).collect(),
            hints: ScanHints::default(),
        }
    }

    fn cmp(col: &str, op: CompareOp, v: Value) -> Expr {
        Expr::Binary {
            left: Box::new(Expr::Column(ColumnRef::bare(col))),
            op: BinaryOp::Compare(op),
            right: Box::new(Expr::Literal(v)),
        }
    }

    fn project_all(cols: &[&str], input: LogicalPlan) -> LogicalPlan {
        LogicalPlan::Project {
            exprs: cols
                .iter()
                .map(|c| (Expr::Column(ColumnRef::bare(*c)), c.to_string()))
                .collect(),
            input: Box::new(input),
        }
    }

    #[test]
    fn pushes_simple_conjunct_and_drops_empty_filter() {
        let plan = project_all(
            &["name"],
            LogicalPlan::Filter {
                predicate: cmp("age", CompareOp::Gt, Value::Integer(25)),
                input: Box::new(scan(
                    "e.csv",
                    vec![
                        Field::new("name", DataType::String),
                        Field::new("age", DataType::Integer),
                    ],
                    vec![],
                )),
            },
        );
        let (plan, entry) = predicate_pushdown(plan);
        assert!(entry.applied);
        let LogicalPlan::Project { input, .. } = &plan else {
            panic!("root should stay a Project");
        };
        let LogicalPlan::Scan { hints, .. } = input.as_ref() else {
            panic!("empty filter should be spliced out, got {input:?}");
        };
        assert_eq!(hints.pushdown_filters.len(), 1);
        assert_eq!(hints.pushdown_filters[0].column, "age");
    }

    #[test]
    fn or_expressions_stay_in_residual_filter() {
        let pred = Expr::Or(
            Box::new(cmp("a", CompareOp::Eq, Value::Integer(1))),
            Box::new(cmp("b", CompareOp::Eq, Value::Integer(2))),
        );
        let plan = LogicalPlan::Filter {
            predicate: pred.clone(),
            input: Box::new(scan(
                "t",
                vec![
                    Field::new("a", DataType::Integer),
                    Field::new("b", DataType::Integer),
                ],
                vec![],
            )),
        };
        let (plan, entry) = predicate_pushdown(plan);
        assert!(!entry.applied);
        assert!(matches!(plan, LogicalPlan::Filter { .. }));
    }

    #[test]
    fn incomparable_literal_is_not_pushed() {
        let plan = LogicalPlan::Filter {
            predicate: cmp("name", CompareOp::Eq, Value::Integer(3)),
            input: Box::new(scan("t", vec![Field::new("name", DataType::String)], vec![])),
        };
        let (_, entry) = predicate_pushdown(plan);
        assert!(!entry.applied);
    }

    #[test]
    fn partition_predicates_are_consumed_exactly() {
        let plan = LogicalPlan::Filter {
            predicate: Expr::And(
                Box::new(cmp("year", CompareOp::Eq, Value::Integer(2024))),
                Box::new(cmp("v", CompareOp::Gt, Value::Integer(0))),
            ),
            input: Box::new(scan(
                "ds",
                vec![
                    Field::new("v", DataType::Integer),
                    Field::new("year", DataType::Integer),
                ],
                vec!["year"],
            )),
        };
        let (plan, entry) = partition_pruning(plan);
        assert!(entry.applied, "{entry:?}");
        // Residual filter keeps only the non-partition conjunct.
        let LogicalPlan::Filter { predicate, input } = &plan else {
            panic!("expected residual filter");
        };
        assert_eq!(split_conjuncts(predicate.clone()).len(), 1);
        let LogicalPlan::Scan { hints, .. } = input.as_ref() else {
            panic!("expected scan");
        };
        assert_eq!(hints.partition_filters.len(), 1);
        assert_eq!(hints.partition_filters[0].column, "year");
    }

    #[test]
    fn column_pruning_attaches_ordered_required_set() {
        let mut plan = project_all(
            &["name"],
            LogicalPlan::Filter {
                predicate: cmp("age", CompareOp::GtEq, Value::Integer(25)),
                input: Box::new(scan(
                    "e.csv",
                    vec![
                        Field::new("id", DataType::Integer),
                        Field::new("name", DataType::String),
                        Field::new("age", DataType::Integer),
                        Field::new("city", DataType::String),
                    ],
                    vec![],
                )),
            },
        );
        let entry = column_pruning(&mut plan);
        assert!(entry.applied);
        assert!(entry.detail.contains("2 of 4"), "{}", entry.detail);
        let LogicalPlan::Project { input, .. } = &plan else { panic!() };
        let LogicalPlan::Filter { input, .. } = input.as_ref() else { panic!() };
        let LogicalPlan::Scan { hints, .. } = input.as_ref() else { panic!() };
        // Scan-schema order, not usage order.
        assert_eq!(
            hints.required_columns.as_deref(),
            Some(&["name".to_string(), "age".to_string()][..])
        );
    }

    #[test]
    fn limit_pushdown_caps_plain_pipelines_only() {
        let base = scan("t", vec![Field::new("a", DataType::Integer)], vec![]);
        let mut plain = LogicalPlan::Limit {
            n: 3,
            input: Box::new(project_all(&["a"], base.clone())),
        };
        assert!(limit_pushdown(&mut plain).applied);
        let LogicalPlan::Limit { input, .. } = &plain else { panic!() };
        let LogicalPlan::Project { input, .. } = input.as_ref() else { panic!() };
        let LogicalPlan::Scan { hints, .. } = input.as_ref() else { panic!() };
        assert_eq!(hints.row_cap, Some(3));

        let mut sorted = LogicalPlan::Limit {
            n: 3,
            input: Box::new(LogicalPlan::Sort {
                keys: vec![crate::logical_plan::PlanSortKey {
                    column: "a".into(),
                    ascending: true,
                }],
                input: Box::new(base),
            }),
        };
        let entry = limit_pushdown(&mut sorted);
        assert!(!entry.applied);
    }

    #[test]
    fn rules_are_idempotent() {
        let plan = LogicalPlan::Limit {
            n: 5,
            input: Box::new(project_all(
                &["name"],
                LogicalPlan::Filter {
                    predicate: Expr::And(
                        Box::new(cmp("age", CompareOp::Gt, Value::Integer(25))),
                        Box::new(Expr::IsNull(Box::new(Expr::Column(ColumnRef::bare("name"))))),
                    ),
                    input: Box::new(scan(
                        "e.csv",
                        vec![
                            Field::new("name", DataType::String),
                            Field::new("age", DataType::Integer),
                        ],
                        vec![],
                    )),
                },
            )),
        };
        let (plan, _) = predicate_pushdown(plan);
        let snapshot = plan.clone();
        let (mut plan, _) = predicate_pushdown(plan);
        assert_eq!(snapshot, plan);
        column_pruning(&mut plan);
        let snapshot2 = plan.clone();
        column_pruning(&mut plan);
        assert_eq!(snapshot2, plan);
    }

    #[test]
    fn outer_join_null_side_is_protected() {
        let left = scan("u", vec![Field::new("id", DataType::Integer)], vec![]);
        let right = scan(
            "o",
            vec![
                Field::new("uid", DataType::Integer),
                Field::new("amt", DataType::Integer),
            ],
            vec![],
        );
        let plan = LogicalPlan::Filter {
            predicate: cmp("amt", CompareOp::Gt, Value::Integer(10)),
            input: Box::new(LogicalPlan::Join {
                left: Box::new(left),
                right: Box::new(right),
                on: vec![("id".into(), "uid".into())],
                kind: JoinKind::Left,
            }),
        };
        let (_, entry) = predicate_pushdown(plan);
        // Pushing `amt > 10` below a LEFT join would drop null-extended rows.
        assert!(!entry.applied, "{entry:?}");
    }
}
