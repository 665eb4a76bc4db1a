//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Calculate the delay after failed attempt `attempt` (1-indexed).
///
/// The delay is `min(base * 2^(attempt-1), max)`, perturbed by up to
/// `±jitter` of that capped value and floored at zero.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration, jitter: f64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u32.saturating_pow(attempt - 1);
    let capped_delay = base.saturating_mul(exponential_base).min(max);

    if jitter <= 0.0 || capped_delay.is_zero() {
        return capped_delay;
    }

    let spread = rand::thread_rng().gen_range(-jitter..=jitter);
    let jittered = capped_delay.as_secs_f64() * (1.0 + spread);
    Duration::try_from_secs_f64(jittered.max(0.0)).unwrap_or(Duration::MAX)
}
