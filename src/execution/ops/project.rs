//! Projection: evaluates the projection expressions of a RETURN or
//! WITH into a fresh record. Each expression writes to its assigned
//! output slot; hidden ORDER BY keys land in trailing slots past the
//! next segment's aliases.

use crate::arithmetic::{self, ExprNode};
use crate::error::QueryResult;
use crate::execution::ops::{BoxedOperator, OpContext, Operator};
use crate::value::Record;

#[derive(Debug)]
pub struct Project {
    child: BoxedOperator,
    exprs: Vec<ExprNode>,
    /// output slot per expression
    slots: Vec<usize>,
    out_width: usize,
}

impl Project {
    pub fn new(
        child: BoxedOperator,
        exprs: Vec<ExprNode>,
        slots: Vec<usize>,
        out_width: usize,
    ) -> Self {
        debug_assert_eq!(exprs.len(), slots.len());
        Project {
            child,
            exprs,
            slots,
            out_width,
        }
    }
}

impl Operator for Project {
    fn name(&self) -> &'static str {
        "Project"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        let Some(record) = self.child.consume(ctx)? else {
            return Ok(None);
        };
        let mut out = Record::new(self.out_width);
        for (expr, slot) in self.exprs.iter().zip(self.slots.iter()) {
            out.set(*slot, arithmetic::evaluate(expr, &record, ctx.graph())?);
        }
        Ok(Some(out))
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.child.reset()
    }
}
