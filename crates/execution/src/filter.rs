//! Residual row filter. NULL predicate results are false here.

use fsq_common::{Result, Row};
use fsq_sql::ast::Expr;

use crate::expr::eval_predicate;
use crate::operator::{BoxedOperator, Operator};

pub struct FilterOp {
    child: BoxedOperator,
    predicate: Expr,
}

impl FilterOp {
    pub fn new(child: BoxedOperator, predicate: Expr) -> Self {
        Self { child, predicate }
    }
}

impl Operator for FilterOp {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn open(&mut self) -> Result<()> {
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        while let Some(row) = self.child.next()? {
            if eval_predicate(&self.predicate, &row)? == Some(true) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.child.close();
    }
}
