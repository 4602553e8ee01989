//! Reconnect backoff.

use std::time::Duration;

/// Delay before reconnect attempt `attempt` (0-based).
///
/// `min(base * 2^attempt + jitter(attempt), cap)`. The jitter is a pure
/// function of the attempt number and strictly below `base`, so delays are
/// strictly increasing until they reach the cap.
pub fn backoff_delay(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let exponent = attempt.min(63);
    let scaled = base_ms.saturating_mul(1u64 << exponent);
    let delay = scaled.saturating_add(jitter_ms(attempt, base_ms));
    Duration::from_millis(delay.min(cap_ms))
}

/// Deterministic jitter in `[0, base / 4]`.
pub fn jitter_ms(attempt: u32, base_ms: u64) -> u64 {
    let span = base_ms / 4 + 1;
    mix(u64::from(attempt)) % span
}

// splitmix64 finalizer
fn mix(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
