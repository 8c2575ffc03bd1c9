//! Filter operator: record passes only when the predicate evaluates
//! to a true boolean (Null and non-boolean results filter out).

use crate::arithmetic::{self, ExprNode};
use crate::error::QueryResult;
use crate::execution::ops::{BoxedOperator, OpContext, Operator};
use crate::value::Record;

#[derive(Debug)]
pub struct Filter {
    child: BoxedOperator,
    predicate: ExprNode,
}

impl Filter {
    pub fn new(child: BoxedOperator, predicate: ExprNode) -> Self {
        Filter { child, predicate }
    }
}

impl Operator for Filter {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        loop {
            let Some(record) = self.child.consume(ctx)? else {
                return Ok(None);
            };
            let verdict = arithmetic::evaluate(&self.predicate, &record, ctx.graph())?;
            if verdict.is_true() {
                return Ok(Some(record));
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.child.reset()
    }
}
