//! Retry backoff: `retry_count -> delay`, monotonically non-decreasing,
//! jittered, bounded (SPEC_FULL.md §4.4 public contract).

use std::time::Duration;

use rand::Rng;

const MAX_BACKOFF_SECS: u64 = 30;

/// `2^retry_count` seconds capped at `MAX_BACKOFF_SECS`, plus up to 20%
/// jitter so a burst of simultaneously-failing jobs doesn't retry in
/// lockstep.
pub fn backoff(retry_count: u32) -> Duration {
    let base = 2u64.saturating_pow(retry_count.min(5)).min(MAX_BACKOFF_SECS);
    let jitter_ms = rand::thread_rng().gen_range(0..=(base * 200));
    Duration::from_millis(base * 1000 + jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_bounded() {
        for n in 0..20 {
            assert!(backoff(n) <= Duration::from_secs(MAX_BACKOFF_SECS + 6));
        }
    }

    #[test]
    fn backoff_is_non_decreasing_in_expectation() {
        // jitter means individual samples can cross, but the base term
        // never decreases as retry_count grows.
        let base = |n: u32| 2u64.saturating_pow(n.min(5)).min(MAX_BACKOFF_SECS);
        for n in 0..10 {
            assert!(base(n + 1) >= base(n));
        }
    }
}
