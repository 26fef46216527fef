//! Logical planning stack for FSQ queries.
//!
//! Architecture role:
//! - lowers the SQL AST into logical plans
//! - analyzes plans (name/type resolution, output schemas)
//! - rewrites plans through the optimizer pipeline with an audit trail
//! - renders deterministic explain text
//!
//! Key modules:
//! - [`logical_plan`]
//! - [`sql_frontend`]
//! - [`analyzer`]
//! - [`optimizer`]
//! - [`explain`]

pub mod analyzer;
pub mod explain;
pub mod logical_plan;
pub mod optimizer;
pub mod sql_frontend;

pub use analyzer::{aggregate_type, expr_type, output_schema, validate, SchemaProvider};
pub use explain::explain;
pub use logical_plan::{
    as_simple_predicate, combine_conjuncts, split_conjuncts, LogicalPlan, PlanSortKey, ScanHints,
};
pub use optimizer::{AuditEntry, Optimizer};
pub use sql_frontend::lower;
