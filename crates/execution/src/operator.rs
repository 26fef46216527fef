//! The pull-based operator contract.

use fsq_common::{Result, Row};

/// A Volcano-model operator: one row per `next()` call.
///
/// Lifecycle: `open()` once (blocking operators drain their children
/// here), `next()` until it returns `Ok(None)`, `close()` on normal end
/// and on early termination alike. `close()` must release held
/// resources and tolerate being called before `next()` signaled end.
/// No concurrent `next()` calls happen on the same operator.
pub trait Operator {
    /// Stable operator name for logging.
    fn name(&self) -> &'static str;

    /// One-time initialization; may fully drain children.
    fn open(&mut self) -> Result<()>;

    /// The next row, or `Ok(None)` at end of stream. Errors are
    /// terminal for the query.
    fn next(&mut self) -> Result<Option<Row>>;

    /// Releases resources, recursively closing children.
    fn close(&mut self);
}

/// The standard boxed operator handle.
pub type BoxedOperator = Box<dyn Operator>;
