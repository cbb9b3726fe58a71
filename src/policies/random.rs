//! Random policy: uniform shuffle of the candidate list.

use std::sync::Arc;

use rand::seq::SliceRandom;

use super::Policy;
use crate::core::Worker;

#[derive(Debug, Default)]
pub struct RandomPolicy;

impl RandomPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn order(&self, mut candidates: Vec<Arc<Worker>>) -> Vec<Arc<Worker>> {
        candidates.shuffle(&mut rand::rng());
        candidates
    }
}
