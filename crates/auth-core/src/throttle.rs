//! Brute-force mitigation

use std::time::Duration;

use rand::Rng;

/// Pick a uniformly random delay in `[0, max_delay)`.
pub fn random_delay(max_delay: Duration) -> Duration {
    let max_ms = max_delay.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

/// Wait a random amount of time before answering a failed authentication.
///
/// Only the calling task is suspended; the runtime keeps serving other requests.
pub async fn mitigate_brute_force(max_delay: Duration) {
    let delay = random_delay(max_delay);
    tracing::debug!(delay_ms = delay.as_millis() as u64, "Delaying failed authentication");
    tokio::time::sleep(delay).await;
}
