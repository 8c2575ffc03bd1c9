//! Combining operators: CartesianProduct and Optional.
//!
//! Both children of a cartesian product share the segment's record
//! layout with disjoint slots; the right child replays fully for each
//! left record, so output order is (outer, inner).
//!
//! Optional is apply-shaped: for every upstream record it injects the
//! record into its sub-plan through an [`super::Argument`] leaf and
//! replays the sub-plan; if nothing matches, the upstream record
//! passes through with the optional slots left Null.

use crate::error::QueryResult;
use crate::execution::ops::{ArgumentSlot, BoxedOperator, OpContext, Operator};
use crate::value::Record;

#[derive(Debug)]
pub struct CartesianProduct {
    left: BoxedOperator,
    right: BoxedOperator,
    /// slots the right child binds, merged into the left record
    right_slots: Vec<usize>,
    current_left: Option<Record>,
    eof: bool,
}

impl CartesianProduct {
    pub fn new(left: BoxedOperator, right: BoxedOperator, right_slots: Vec<usize>) -> Self {
        CartesianProduct {
            left,
            right,
            right_slots,
            current_left: None,
            eof: false,
        }
    }
}

impl Operator for CartesianProduct {
    fn name(&self) -> &'static str {
        "CartesianProduct"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.left.open(ctx)?;
        self.right.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        loop {
            if self.eof {
                return Ok(None);
            }
            ctx.timeout.check()?;
            let left = match &self.current_left {
                Some(record) => record.clone(),
                None => match self.left.consume(ctx)? {
                    Some(record) => {
                        self.current_left = Some(record.clone());
                        record
                    }
                    None => {
                        self.eof = true;
                        return Ok(None);
                    }
                },
            };
            match self.right.consume(ctx)? {
                Some(right_record) => {
                    let mut out = left;
                    for slot in &self.right_slots {
                        out.set(*slot, right_record.get(*slot).clone());
                    }
                    return Ok(Some(out));
                }
                None => {
                    // inner exhausted: advance the outer, replay inner
                    self.current_left = None;
                    self.right.reset()?;
                }
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.current_left = None;
        self.eof = false;
        self.left.reset()?;
        self.right.reset()
    }
}

#[derive(Debug)]
pub struct Optional {
    /// None when the optional match opens the query
    upstream: Option<BoxedOperator>,
    /// sub-plan matching the optional pattern; leafed by an Argument
    /// when upstream exists
    subtree: BoxedOperator,
    argument: Option<ArgumentSlot>,
    width: usize,
    /// upstream record currently being expanded
    current: Option<Record>,
    matched_current: bool,
    /// leaf mode bookkeeping
    emitted_any: bool,
    eof: bool,
}

impl Optional {
    pub fn new(
        upstream: Option<BoxedOperator>,
        subtree: BoxedOperator,
        argument: Option<ArgumentSlot>,
        width: usize,
    ) -> Self {
        Optional {
            upstream,
            subtree,
            argument,
            width,
            current: None,
            matched_current: false,
            emitted_any: false,
            eof: false,
        }
    }
}

impl Operator for Optional {
    fn name(&self) -> &'static str {
        "Optional"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        if let Some(upstream) = &mut self.upstream {
            upstream.open(ctx)?;
        }
        self.subtree.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        if self.eof {
            return Ok(None);
        }
        let Some(upstream) = &mut self.upstream else {
            // leading OPTIONAL MATCH: stream the sub-plan, or emit a
            // single all-Null record when it matches nothing
            return match self.subtree.consume(ctx)? {
                Some(record) => {
                    self.emitted_any = true;
                    Ok(Some(record))
                }
                None => {
                    self.eof = true;
                    if self.emitted_any {
                        Ok(None)
                    } else {
                        self.emitted_any = true;
                        Ok(Some(Record::new(self.width)))
                    }
                }
            };
        };

        loop {
            ctx.timeout.check()?;
            if self.current.is_none() {
                match upstream.consume(ctx)? {
                    Some(record) => {
                        if let Some(arg) = &self.argument {
                            *arg.borrow_mut() = Some(record.clone());
                        }
                        self.subtree.reset()?;
                        self.current = Some(record);
                        self.matched_current = false;
                    }
                    None => {
                        self.eof = true;
                        return Ok(None);
                    }
                }
            }
            match self.subtree.consume(ctx)? {
                Some(record) => {
                    self.matched_current = true;
                    return Ok(Some(record));
                }
                None => {
                    let unmatched = !self.matched_current;
                    let current = self.current.take();
                    if unmatched {
                        // pass the upstream record through, optional
                        // slots stay Null
                        return Ok(current);
                    }
                }
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.current = None;
        self.matched_current = false;
        self.emitted_any = false;
        self.eof = false;
        if let Some(upstream) = &mut self.upstream {
            upstream.reset()?;
        }
        self.subtree.reset()
    }
}
