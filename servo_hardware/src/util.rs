use std::time::{Duration, Instant};

use crate::error::Result;

/// Retry a fallible bus transaction until it succeeds or the deadline passes.
///
/// The last error is returned when the deadline expires after at least one
/// failed attempt; a zero timeout still makes exactly one attempt.
pub fn retry_until_deadline<T>(
    mut attempt: impl FnMut() -> Result<T>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<T> {
    let deadline = Instant::now() + timeout;
    let mut tries = 0u32;
    loop {
        tries += 1;
        match attempt() {
            Ok(v) => return Ok(v),
            Err(e) if Instant::now() >= deadline => {
                tracing::debug!(tries, error = %e, "bus retry deadline reached");
                return Err(e);
            }
            Err(_) => std::thread::sleep(poll_interval),
        }
    }
}
