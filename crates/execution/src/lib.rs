//! Pull-based ("Volcano") operator runtime for FSQ.
//!
//! Architecture role:
//! - defines the `open`/`next`/`close` operator contract
//! - implements scan, filter, project, aggregate, sort, limit, and hash
//!   join operators plus the runtime expression evaluator
//! - lowers optimized logical plans into operator trees bound to readers
//!
//! Scheduling is single-threaded cooperative: one query, one pull
//! pipeline, no concurrent `next()` calls.
//!
//! Key modules:
//! - [`operator`] / [`build`]
//! - [`expr`]
//! - operators: [`scan`], [`filter`], [`project`], [`aggregate`],
//!   [`sort`], [`limit`], [`join`]

pub mod aggregate;
pub mod build;
pub mod expr;
pub mod filter;
pub mod join;
pub mod limit;
pub mod operator;
pub mod project;
pub mod scan;
pub mod sort;

pub use build::{build, BoundReaders};
pub use expr::{eval, eval_predicate};
pub use operator::{BoxedOperator, Operator};

#[cfg(test)]
pub(crate) mod test_support {
    use fsq_common::{Result, Row};

    use crate::operator::Operator;

    /// In-memory operator for unit tests.
    pub struct VecOperator {
        rows: Vec<Row>,
        pos: usize,
    }

    impl VecOperator {
        pub fn new(rows: Vec<Row>) -> Self {
            Self { rows, pos: 0 }
        }
    }

    impl Operator for VecOperator {
        fn name(&self) -> &'static str {
            "Vec"
        }

        fn open(&mut self) -> Result<()> {
            Ok(())
        }

        fn next(&mut self) -> Result<Option<Row>> {
            if self.pos >= self.rows.len() {
                return Ok(None);
            }
            let row = self.rows[self.pos].clone();
            self.pos += 1;
            Ok(Some(row))
        }

        fn close(&mut self) {}
    }
}
