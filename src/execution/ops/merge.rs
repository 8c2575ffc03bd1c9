//! MERGE: match the pattern, or create it whole.
//!
//! For each upstream record (or once, standalone) the match sub-plan
//! replays; when it produces nothing the pattern is created in one
//! piece and the record with the created bindings flows on. The
//! all-or-nothing rule means a partially matching pattern still
//! creates every element.

use crate::error::QueryResult;
use crate::execution::ops::{ArgumentSlot, BoxedOperator, OpContext, Operator, PatternSpec};
use crate::value::Record;

#[derive(Debug)]
pub struct MergeOp {
    upstream: Option<BoxedOperator>,
    /// sub-plan matching the full pattern, Argument-leafed when an
    /// upstream exists
    match_subtree: BoxedOperator,
    argument: Option<ArgumentSlot>,
    /// creation recipe used when the match comes up empty
    pattern: PatternSpec,
    width: usize,
    current: Option<Record>,
    matched_current: bool,
    /// standalone bookkeeping
    leaf_done: bool,
    leaf_matched: bool,
    eof: bool,
}

impl MergeOp {
    pub fn new(
        upstream: Option<BoxedOperator>,
        match_subtree: BoxedOperator,
        argument: Option<ArgumentSlot>,
        pattern: PatternSpec,
        width: usize,
    ) -> Self {
        MergeOp {
            upstream,
            match_subtree,
            argument,
            pattern,
            width,
            current: None,
            matched_current: false,
            leaf_done: false,
            leaf_matched: false,
            eof: false,
        }
    }

}

impl Operator for MergeOp {
    fn name(&self) -> &'static str {
        "Merge"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        if let Some(upstream) = &mut self.upstream {
            upstream.open(ctx)?;
        }
        self.match_subtree.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        if self.eof {
            return Ok(None);
        }
        let Some(upstream) = &mut self.upstream else {
            // standalone MERGE: stream matches, or create once
            match self.match_subtree.consume(ctx)? {
                Some(record) => {
                    self.leaf_matched = true;
                    return Ok(Some(record));
                }
                None => {
                    self.eof = true;
                    if self.leaf_matched || self.leaf_done {
                        return Ok(None);
                    }
                    self.leaf_done = true;
                    let mut record = Record::new(self.width);
                    self.pattern.apply(ctx, &mut record)?;
                    return Ok(Some(record));
                }
            }
        };

        loop {
            ctx.timeout.check()?;
            if self.current.is_none() {
                match upstream.consume(ctx)? {
                    Some(record) => {
                        if let Some(arg) = &self.argument {
                            *arg.borrow_mut() = Some(record.clone());
                        }
                        self.match_subtree.reset()?;
                        self.current = Some(record);
                        self.matched_current = false;
                    }
                    None => {
                        self.eof = true;
                        return Ok(None);
                    }
                }
            }
            match self.match_subtree.consume(ctx)? {
                Some(record) => {
                    self.matched_current = true;
                    return Ok(Some(record));
                }
                None => {
                    let unmatched = !self.matched_current;
                    let current = self.current.take();
                    if unmatched {
                        if let Some(mut record) = current {
                            self.pattern.apply(ctx, &mut record)?;
                            return Ok(Some(record));
                        }
                    }
                }
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.current = None;
        self.matched_current = false;
        self.leaf_done = false;
        self.leaf_matched = false;
        self.eof = false;
        if let Some(upstream) = &mut self.upstream {
            upstream.reset()?;
        }
        self.match_subtree.reset()
    }
}
