/// Time helpers shared by the state resolver and the verifier.
///
/// Timestamps are whole seconds since the unix epoch, the unit used by
/// published state records and by query proofs.
///
///  ```rust
/// use idstate::utils::time::{now, elapsed_since};
///
/// let issued = now();
/// assert_eq!(elapsed_since(issued + 10, issued), 0);
///  ```
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current timestamp in seconds since the epoch.
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Seconds elapsed between `then` and `now`, zero when `then` lies in the future.
pub fn elapsed_since(then: u64, now: u64) -> u64 {
    now.saturating_sub(then)
}

/// True when more than `window` has passed between `then` and `now`.
pub fn exceeds(then: u64, now: u64, window: Duration) -> bool {
    elapsed_since(then, now) > window.as_secs()
}
