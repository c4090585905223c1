//! Uniform random load balancing strategy.

use rand::Rng;

use crate::load_balancer::LoadBalancer;

/// Picks a candidate uniformly at random on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomBalancer;

impl LoadBalancer for RandomBalancer {
    fn select_backend<'a>(&self, candidates: &'a [String]) -> Option<&'a str> {
        match candidates.len() {
            0 => None,
            1 => Some(candidates[0].as_str()),
            len => {
                let index = rand::thread_rng().gen_range(0..len);
                Some(candidates[index].as_str())
            }
        }
    }
}
