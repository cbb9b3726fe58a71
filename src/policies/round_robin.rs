//! Round-robin policy: rotate a monotone per-pool index over the candidate
//! list so every candidate takes its turn at the head.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::Policy;
use crate::core::Worker;

#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    counter: AtomicUsize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn order(&self, mut candidates: Vec<Arc<Worker>>) -> Vec<Arc<Worker>> {
        if candidates.is_empty() {
            return candidates;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.rotate_left(index);
        candidates
    }
}
