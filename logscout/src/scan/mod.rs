pub mod aggregate;
pub mod scheduler;
pub mod worker;

pub use aggregate::AggregateStats;
pub use scheduler::ParallelScheduler;
pub use worker::ScanWorker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the caller and every worker.
///
/// Workers check it before each line and before each remote attempt; files that were
/// never started are reported as cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
