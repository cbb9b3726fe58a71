//! Least-busy policy: ascending busy counter, configured order on ties.

use std::sync::Arc;

use super::Policy;
use crate::core::Worker;

#[derive(Debug, Default)]
pub struct LeastBusyPolicy;

impl LeastBusyPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Policy for LeastBusyPolicy {
    fn name(&self) -> &'static str {
        "least_busy"
    }

    fn order(&self, mut candidates: Vec<Arc<Worker>>) -> Vec<Arc<Worker>> {
        // Stable sort keeps configured order within equal busy counts.
        candidates.sort_by_key(|w| w.busy());
        candidates
    }
}
