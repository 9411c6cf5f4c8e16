//! Retry backoff schedule (`spec.md` §4.7): "attempt N uses delay D(N)":
//! `N ∈ [1,20)` → `startingRecoveryDelayMs`, `N ∈ [20,40)` → 1s, `N ≥ 40` →
//! 10s.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub fn retry_delay(attempt: u32, starting_recovery_delay: Duration) -> Duration {
    if attempt < 20 {
        starting_recovery_delay
    } else if attempt < 40 {
        Duration::from_secs(1)
    } else {
        Duration::from_secs(10)
    }
}

/// Sleeps for `delay`, returning early with `false` if `cancel` fires
/// first. `spec.md` §4.7: "Retries check for close on every sleep tick;
/// close-during-sleep returns immediately."
pub async fn sleep_cancelable(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        () = cancel.cancelled() => false,
    }
}
