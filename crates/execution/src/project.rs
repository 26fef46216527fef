//! Projection: evaluates each output expression and builds a fresh row
//! under the aliased names. Input order is preserved.

use fsq_common::{Result, Row};
use fsq_sql::ast::Expr;

use crate::expr::eval;
use crate::operator::{BoxedOperator, Operator};

pub struct ProjectOp {
    child: BoxedOperator,
    exprs: Vec<(Expr, String)>,
}

impl ProjectOp {
    pub fn new(child: BoxedOperator, exprs: Vec<(Expr, String)>) -> Self {
        Self { child, exprs }
    }
}

impl Operator for ProjectOp {
    fn name(&self) -> &'static str {
        "Project"
    }

    fn open(&mut self) -> Result<()> {
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        let Some(row) = self.child.next()? else {
            return Ok(None);
        };
        let mut out = Row::new();
        for (expr, name) in &self.exprs {
            out.push(name.clone(), eval(expr, &row)?);
        }
        Ok(Some(out))
    }

    fn close(&mut self) {
        self.child.close();
    }
}
