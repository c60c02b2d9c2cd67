use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter: doubling from a small base, ±20%
/// jitter, using the `rand` 0.8 API already pinned for the stash codec.
/// Capped at the 5 s auto-start ceiling `poll_until_ready` enforces.
pub fn backoff(attempt: u32) -> Duration {
    let base_ms = 50u64.saturating_mul(1u64 << attempt.min(10));
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    let delay_ms = (base_ms as f64 * jitter) as u64;
    Duration::from_millis(delay_ms).min(Duration::from_secs(5))
}
