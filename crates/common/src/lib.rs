#![deny(missing_docs)]

//! Shared configuration, error taxonomy, and the value/type system for FSQ crates.
//!
//! Architecture role:
//! - defines engine configuration passed across layers
//! - provides the common [`FsqError`] / [`Result`] contracts
//! - hosts the ten-type value union, schemas, rows, and the
//!   simple-predicate algebra that travels into readers as pushdown hints
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`types`] / [`value`]
//! - [`schema`] / [`row`]
//! - [`predicate`]
//! - [`warnings`] / [`metrics`]

/// Shared engine configuration types.
pub mod config;
/// Shared error taxonomy.
pub mod error;
/// Scan-side observability counters.
pub mod metrics;
/// Simple-predicate algebra for pushdown hints.
pub mod predicate;
/// Row representation.
pub mod row;
/// Schema representation and merging.
pub mod schema;
/// Data types, promotion lattice, and string inference.
pub mod types;
/// Typed value union.
pub mod value;
/// Recoverable-warning side channel.
pub mod warnings;

pub use config::{EngineConfig, FetchSettings, OptimizerToggles};
pub use error::{FsqError, Result};
pub use metrics::ScanMetrics;
pub use predicate::{all_match, CompareOp, SimplePredicate};
pub use row::Row;
pub use schema::{Field, Schema};
pub use types::{
    coerce_string, infer_common_type, infer_type_from_string, infer_value_from_string,
    is_null_token, DataType, NULL_TOKENS,
};
pub use value::{ArithOp, Value, ValueKey};
pub use warnings::{Warning, Warnings};
