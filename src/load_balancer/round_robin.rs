//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::LoadBalancer;

/// Round-robin selector.
/// Stores an internal counter to rotate through backends.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn select_backend<'a>(&self, candidates: &'a [String]) -> Option<&'a str> {
        match candidates.len() {
            0 => None,
            // A single candidate does not advance the rotation.
            1 => Some(candidates[0].as_str()),
            len => {
                let index = self.counter.fetch_add(1, Ordering::Relaxed) % len;
                Some(candidates[index].as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn urls(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let backends = urls(&["http://a", "http://b", "http://c"]);

        let picks: Vec<&str> = (0..6).filter_map(|_| lb.select_backend(&backends)).collect();
        assert_eq!(
            picks,
            vec!["http://a", "http://b", "http://c", "http://a", "http://b", "http://c"]
        );
    }

    #[test]
    fn test_empty_and_singleton() {
        let lb = RoundRobin::new();
        assert_eq!(lb.select_backend(&[]), None);

        let single = urls(&["http://only"]);
        for _ in 0..5 {
            assert_eq!(lb.select_backend(&single), Some("http://only"));
        }

        // Singleton picks left the counter untouched.
        let pair = urls(&["http://a", "http://b"]);
        assert_eq!(lb.select_backend(&pair), Some("http://a"));
    }

    #[test]
    fn test_concurrent_selection_is_even() {
        let lb = Arc::new(RoundRobin::new());
        let backends = Arc::new(urls(&["http://a", "http://b", "http://c", "http://d"]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lb = lb.clone();
                let backends = backends.clone();
                std::thread::spawn(move || {
                    let mut counts: HashMap<String, usize> = HashMap::new();
                    for _ in 0..1000 {
                        let pick = lb.select_backend(&backends).unwrap();
                        *counts.entry(pick.to_string()).or_default() += 1;
                    }
                    counts
                })
            })
            .collect();

        let mut totals: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for (backend, count) in handle.join().unwrap() {
                *totals.entry(backend).or_default() += count;
            }
        }

        // 8000 picks over 4 backends with no lost counter updates.
        for backend in backends.iter() {
            assert_eq!(totals[backend], 2000);
        }
    }
}
