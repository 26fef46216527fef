//! Lazy query result: a pull iterator over rows plus the schema,
//! explain text, warning side-channel, and scan metrics.

use fsq_common::{Result, Row, ScanMetrics, Schema, Warning, Warnings};
use fsq_execution::BoxedOperator;
use fsq_planner::{explain, AuditEntry, LogicalPlan};

/// Result handle for one query.
///
/// Iteration is lazy; abandoning it closes the operator tree (and every
/// reader under it) exactly once, on drop.
pub struct QueryResult {
    root: Option<BoxedOperator>,
    opened: bool,
    done: bool,
    schema: Schema,
    plan: LogicalPlan,
    audit: Vec<AuditEntry>,
    warnings: Warnings,
    metrics: ScanMetrics,
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("opened", &self.opened)
            .field("done", &self.done)
            .field("schema", &self.schema)
            .field("plan", &self.plan)
            .field("audit", &self.audit)
            .field("warnings", &self.warnings)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl QueryResult {
    pub(crate) fn new(
        root: BoxedOperator,
        schema: Schema,
        plan: LogicalPlan,
        audit: Vec<AuditEntry>,
        warnings: Warnings,
        metrics: ScanMetrics,
    ) -> Self {
        Self {
            root: Some(root),
            opened: false,
            done: false,
            schema,
            plan,
            audit,
            warnings,
            metrics,
        }
    }

    /// Output schema of the query.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Materializes every remaining row.
    pub fn to_list(&mut self) -> Result<Vec<Row>> {
        self.collect()
    }

    /// Deterministic text rendering of the optimized plan and the
    /// optimizer audit trail.
    pub fn explain(&self) -> String {
        explain(&self.plan, &self.audit)
    }

    /// Recoverable reader warnings recorded so far (malformed rows,
    /// skipped lines). Populated during iteration.
    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.snapshot()
    }

    /// Reader-side counters for this query (rows read, files pruned...).
    pub fn scan_metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    fn close(&mut self) {
        if let Some(mut root) = self.root.take() {
            root.close();
        }
        self.done = true;
    }
}

impl Iterator for QueryResult {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let root = self.root.as_mut()?;
        if !self.opened {
            self.opened = true;
            if let Err(e) = root.open() {
                self.close();
                return Some(Err(e));
            }
        }
        match root.next() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.close();
                None
            }
            // Executor errors are terminal; resources are still released.
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}

impl Drop for QueryResult {
    fn drop(&mut self) {
        self.close();
    }
}
