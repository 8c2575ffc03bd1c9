//! Query cancellation.
//!
//! An atomic flag plus an optional deadline, shared between the
//! running query and whoever might cancel it. Long-running operators
//! check at consume boundaries; a failed check surfaces as
//! `QueryError::Cancelled` and tears the plan down like any other
//! runtime error.

use crate::error::{QueryError, QueryResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation controller carried by every query
#[derive(Debug, Clone)]
pub struct QueryTimeout {
    cancelled: Arc<AtomicBool>,
    start_time: Instant,
    deadline: Option<Duration>,
}

impl QueryTimeout {
    pub fn new(deadline: Option<Duration>) -> Self {
        QueryTimeout {
            cancelled: Arc::new(AtomicBool::new(false)),
            start_time: Instant::now(),
            deadline,
        }
    }

    /// No deadline; cancellable only through a handle
    pub fn unbounded() -> Self {
        QueryTimeout::new(None)
    }

    /// Cheap check called between records; Err aborts the query
    pub fn check(&self) -> QueryResult<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(QueryError::Cancelled {
                elapsed_ms: self.elapsed().as_millis() as u64,
            });
        }
        if let Some(deadline) = self.deadline {
            if self.start_time.elapsed() > deadline {
                self.cancelled.store(true, Ordering::Relaxed);
                return Err(QueryError::Cancelled {
                    elapsed_ms: self.elapsed().as_millis() as u64,
                });
            }
        }
        Ok(())
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Handle for cancelling from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

impl Default for QueryTimeout {
    fn default() -> Self {
        QueryTimeout::new(Some(Duration::from_secs(60)))
    }
}

/// Cancels the associated query from anywhere
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_unbounded_never_times_out() {
        let t = QueryTimeout::unbounded();
        assert!(t.check().is_ok());
    }

    #[test]
    fn test_explicit_cancel() {
        let t = QueryTimeout::unbounded();
        t.cancel();
        assert!(matches!(t.check(), Err(QueryError::Cancelled { .. })));
    }

    #[test]
    fn test_cancel_through_handle() {
        let t = QueryTimeout::unbounded();
        let handle = t.cancel_handle();
        handle.cancel();
        assert!(t.is_cancelled());
    }

    #[test]
    fn test_deadline_exceeded() {
        let t = QueryTimeout::new(Some(Duration::from_millis(5)));
        thread::sleep(Duration::from_millis(20));
        assert!(matches!(t.check(), Err(QueryError::Cancelled { .. })));
    }
}
