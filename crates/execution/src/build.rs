//! Lowers an optimized logical plan into an operator tree, binding one
//! opened reader to each scan and applying the scan hints.

use fsq_common::{FsqError, Result};
use fsq_planner::{output_schema, LogicalPlan};
use fsq_readers::Reader;

use crate::aggregate::AggregateOp;
use crate::filter::FilterOp;
use crate::join::HashJoinOp;
use crate::limit::LimitOp;
use crate::operator::BoxedOperator;
use crate::project::ProjectOp;
use crate::scan::ScanOp;
use crate::sort::SortOp;

/// Readers opened by the caller, keyed by scan binding, in plan order.
/// Each entry is consumed by exactly one scan; the same path opened
/// twice arrives as two entries.
pub type BoundReaders = Vec<(String, Box<dyn Reader>)>;

/// Builds the operator tree for an optimized plan.
pub fn build(plan: &LogicalPlan, readers: &mut BoundReaders) -> Result<BoxedOperator> {
    match plan {
        LogicalPlan::Scan {
            binding, hints, ..
        } => {
            let idx = readers
                .iter()
                .position(|(b, _)| b == binding)
                .ok_or_else(|| {
                    FsqError::Schema(format!("no reader bound for source '{binding}'"))
                })?;
            let (_, mut reader) = readers.remove(idx);

            if let Some(cols) = &hints.required_columns {
                reader.set_required_columns(cols);
            }
            if !hints.partition_filters.is_empty() {
                reader.set_partition_filters(hints.partition_filters.clone());
            }
            let accepted = reader.set_pushdown_filters(hints.pushdown_filters.clone());
            let residual: Vec<_> = hints
                .pushdown_filters
                .iter()
                .filter(|p| !accepted.contains(p))
                .cloned()
                .collect();
            if let Some(cap) = hints.row_cap {
                // The reader-side cap counts its own emissions; it is only
                // safe when the reader enforces every pushed filter itself.
                if residual.is_empty() {
                    reader.set_row_cap(cap);
                }
            }
            Ok(Box::new(ScanOp::new(reader, residual, hints.row_cap)))
        }
        LogicalPlan::Filter { predicate, input } => Ok(Box::new(FilterOp::new(
            build(input, readers)?,
            predicate.clone(),
        ))),
        LogicalPlan::Project { exprs, input } => Ok(Box::new(ProjectOp::new(
            build(input, readers)?,
            exprs.clone(),
        ))),
        LogicalPlan::Aggregate {
            group_keys,
            aggregates,
            input,
        } => Ok(Box::new(AggregateOp::new(
            build(input, readers)?,
            group_keys.clone(),
            aggregates.clone(),
        ))),
        LogicalPlan::Sort { keys, input } => Ok(Box::new(SortOp::new(
            build(input, readers)?,
            keys.clone(),
        ))),
        LogicalPlan::Limit { n, input } => Ok(Box::new(LimitOp::new(build(input, readers)?, *n))),
        LogicalPlan::Join {
            left,
            right,
            on,
            kind,
        } => {
            let left_columns = output_schema(left)?
                .names()
                .into_iter()
                .map(String::from)
                .collect();
            let right_columns = output_schema(right)?
                .names()
                .into_iter()
                .map(String::from)
                .collect();
            let left_op = build(left, readers)?;
            let right_op = build(right, readers)?;
            Ok(Box::new(HashJoinOp::new(
                left_op,
                right_op,
                on.clone(),
                *kind,
                left_columns,
                right_columns,
            )))
        }
    }
}
