//! Bounded-retry wrapper around [`crate::PrepRecoveryHandle`]
//! (`spec.md` §4.8: "Timeout = 8s default, bounded retries").

use std::time::Duration;

use tokio::time::Instant;

use crate::client::PrepRecoveryHandle;
use crate::error::{Error, Result};
use crate::wire::PrepRecoveryRequest;

/// Delay between prep-recovery retries while the leader hasn't yet
/// observed our BUFFERING state.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Sends prep-recovery to `leader`, retrying up to `max_attempts` times
/// or until `timeout` elapses, whichever comes first. Returns `Ok(true)`
/// only if the leader reports `success: true`; `spec.md` §4.8: "Without
/// a successful prep, recovery does NOT proceed to fetching from that
/// leader."
pub async fn prep_recovery_with_retry(
    leader: &dyn PrepRecoveryHandle,
    request: &PrepRecoveryRequest,
    timeout: Duration,
    max_attempts: u32,
) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    let mut attempt = 0;
    let mut last_err = None;

    while attempt < max_attempts {
        attempt += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, leader.prep_recovery(request)).await {
            Ok(Ok(resp)) if resp.success => return Ok(true),
            Ok(Ok(_)) => {
                tracing::debug!(attempt, "leader has not yet observed our buffering state");
            }
            Ok(Err(err)) => {
                tracing::warn!(attempt, %err, "prep-recovery request failed");
                last_err = Some(err);
            }
            Err(_elapsed) => break,
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || attempt >= max_attempts {
            break;
        }
        tokio::time::sleep(RETRY_DELAY.min(remaining)).await;
    }

    match last_err {
        Some(err) => Err(err),
        None => Err(Error::TimedOut { attempts: attempt }),
    }
}
