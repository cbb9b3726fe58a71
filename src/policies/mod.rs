//! Load-balancing policies.
//!
//! A policy orders an already-filtered candidate list; the pool dispatches
//! to the first reservable worker in that order, and failover walks the
//! rest. Policies are cheap, synchronous, and hold only their own state.

mod least_busy;
mod random;
mod round_robin;

use std::sync::Arc;

pub use least_busy::LeastBusyPolicy;
pub use random::RandomPolicy;
pub use round_robin::RoundRobinPolicy;

use crate::{config::Strategy, core::Worker};

pub trait Policy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Reorder `candidates` (already filtered to supporting workers, in
    /// configured order) into dispatch preference order.
    fn order(&self, candidates: Vec<Arc<Worker>>) -> Vec<Arc<Worker>>;
}

/// Instantiate the configured strategy.
pub fn from_strategy(strategy: Strategy) -> Arc<dyn Policy> {
    match strategy {
        Strategy::LeastBusy => Arc::new(LeastBusyPolicy::new()),
        Strategy::RoundRobin => Arc::new(RoundRobinPolicy::new()),
        Strategy::Random => Arc::new(RandomPolicy::new()),
    }
}
