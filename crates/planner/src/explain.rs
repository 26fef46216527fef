//! Deterministic, human-readable plan rendering.

use fsq_sql::ast::JoinKind;

use crate::logical_plan::LogicalPlan;
use crate::optimizer::AuditEntry;

/// Renders the operator nesting plus the optimizer audit trail:
///
/// ```text
/// Limit(10)
///   Filter(age > 25)
///     Scan(data.csv) columns=[name,age] pushdown_filters=[age>25] row_cap=10
/// Optimizations:
///   predicate_pushdown: applied (1 conjunct)
/// ```
pub fn explain(plan: &LogicalPlan, audit: &[AuditEntry]) -> String {
    let mut out = String::new();
    fmt_plan(plan, 0, &mut out);
    if !audit.is_empty() {
        out.push_str("Optimizations:\n");
        let width = audit.iter().map(|a| a.rule.len()).max().unwrap_or(0) + 1;
        for a in audit {
            let label = format!("{}:", a.rule);
            out.push_str(&format!("  {label:<width$} {}\n", detail_text(a)));
        }
    }
    out
}

fn detail_text(a: &AuditEntry) -> String {
    // Applied details already read "applied (...)"; give skips the same shape.
    if a.applied || a.detail.starts_with("skipped") || a.detail.starts_with("not applicable") {
        a.detail.clone()
    } else {
        format!("skipped ({})", a.detail)
    }
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        LogicalPlan::Scan { source, hints, .. } => {
            out.push_str(&format!("{pad}Scan({source})"));
            if let Some(cols) = &hints.required_columns {
                out.push_str(&format!(" columns=[{}]", cols.join(",")));
            }
            if !hints.pushdown_filters.is_empty() {
                let filters: Vec<String> =
                    hints.pushdown_filters.iter().map(|p| p.to_string()).collect();
                out.push_str(&format!(" pushdown_filters=[{}]", filters.join(",")));
            }
            if !hints.partition_filters.is_empty() {
                let filters: Vec<String> =
                    hints.partition_filters.iter().map(|p| p.to_string()).collect();
                out.push_str(&format!(" partition_filters=[{}]", filters.join(",")));
            }
            if let Some(cap) = hints.row_cap {
                out.push_str(&format!(" row_cap={cap}"));
            }
            out.push('\n');
        }
        LogicalPlan::Filter { predicate, input } => {
            out.push_str(&format!("{pad}Filter({predicate})\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Project { exprs, input } => {
            let cols: Vec<String> = exprs
                .iter()
                .map(|(e, name)| {
                    let rendered = e.to_string();
                    if &rendered == name {
                        rendered
                    } else {
                        format!("{rendered} AS {name}")
                    }
                })
                .collect();
            out.push_str(&format!("{pad}Project({})\n", cols.join(", ")));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Aggregate {
            group_keys,
            aggregates,
            input,
        } => {
            let aggs: Vec<String> = aggregates
                .iter()
                .map(|(call, name)| {
                    let canonical = call.canonical_name();
                    if &canonical == name {
                        canonical
                    } else {
                        format!("{canonical} AS {name}")
                    }
                })
                .collect();
            out.push_str(&format!(
                "{pad}Aggregate(group=[{}] aggs=[{}])\n",
                group_keys.join(","),
                aggs.join(", ")
            ));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Sort { keys, input } => {
            let rendered: Vec<String> = keys
                .iter()
                .map(|k| {
                    format!("{} {}", k.column, if k.ascending { "ASC" } else { "DESC" })
                })
                .collect();
            out.push_str(&format!("{pad}Sort({})\n", rendered.join(", ")));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Limit { n, input } => {
            out.push_str(&format!("{pad}Limit({n})\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Join {
            left,
            right,
            on,
            kind,
        } => {
            let keys: Vec<String> = on.iter().map(|(l, r)| format!("{l} = {r}")).collect();
            let kind = match kind {
                JoinKind::Cross => "CROSS".to_string(),
                other => other.as_str().to_string(),
            };
            if keys.is_empty() {
                out.push_str(&format!("{pad}Join({kind})\n"));
            } else {
                out.push_str(&format!("{pad}Join({kind}, {})\n", keys.join(" AND ")));
            }
            fmt_plan(left, indent + 1, out);
            fmt_plan(right, indent + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_plan::ScanHints;
    use fsq_common::{CompareOp, DataType, Field, Schema, SimplePredicate, Value};

    #[test]
    fn renders_nesting_and_audit_alignment() {
        let plan = LogicalPlan::Limit {
            n: 10,
            input: Box::new(LogicalPlan::Scan {
                source: "data.csv".into(),
                binding: "data.csv".into(),
                schema: Schema::new(vec![
                    Field::new("name", DataType::String),
                    Field::new("age", DataType::Integer),
                ]),
                partition_columns: vec![],
                hints: ScanHints {
                    required_columns: Some(vec!["name".into(), "age".into()]),
                    pushdown_filters: vec![SimplePredicate::new(
                        "age",
                        CompareOp::Gt,
                        Value::Integer(25),
                    )],
                    row_cap: Some(10),
                    partition_filters: vec![],
                },
            }),
        };
        let audit = vec![
            AuditEntry {
                rule: "partition_pruning",
                applied: false,
                detail: "skipped (no partitions)".into(),
            },
            AuditEntry {
                rule: "predicate_pushdown",
                applied: true,
                detail: "applied (1 conjunct)".into(),
            },
        ];
        let text = explain(&plan, &audit);
        assert!(text.starts_with("Limit(10)\n"), "{text}");
        assert!(
            text.contains("  Scan(data.csv) columns=[name,age] pushdown_filters=[age>25] row_cap=10\n"),
            "{text}"
        );
        assert!(text.contains("Optimizations:\n"), "{text}");
        assert!(text.contains("predicate_pushdown: applied (1 conjunct)"), "{text}");
        // Deterministic output: same input, same text.
        assert_eq!(text, explain(&plan, &audit));
    }
}
