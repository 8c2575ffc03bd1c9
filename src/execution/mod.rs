//! # Query Execution
//!
//! The pull engine: operator implementations ([`ops`]), the plan
//! builder and runner ([`plan`]), and cooperative cancellation
//! ([`timeout`]). One query runs to completion on one worker; the
//! only suspension-like boundary is an operator returning a record to
//! its parent.

pub mod ops;
pub mod plan;
pub mod timeout;

pub use plan::ExecutionPlan;
pub use timeout::{CancelHandle, QueryTimeout};
