//! Wait for an editor to finish writing a file before it is processed.

use std::path::Path;
use std::time::Duration;

/// Size checks after the initial delay before giving up on stability.
pub const MAX_SETTLE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// Two consecutive reads agreed on the size.
    Stable,
    /// Still changing after every attempt; processed anyway.
    Unstable,
    /// The file disappeared while waiting.
    Gone,
}

/// Sleep `delay`, then compare the file size across reads one `delay` apart.
pub async fn wait_until_stable(path: &Path, delay: Duration) -> Settled {
    settle_with(|| std::fs::metadata(path).ok().map(|m| m.len()), delay).await
}

/// [`wait_until_stable`] over an arbitrary size source.
pub async fn settle_with<F>(mut measure: F, delay: Duration) -> Settled
where
    F: FnMut() -> Option<u64>,
{
    tokio::time::sleep(delay).await;
    let mut last = measure();

    for _ in 0..MAX_SETTLE_ATTEMPTS {
        tokio::time::sleep(delay).await;
        let current = measure();
        match (last, current) {
            (_, None) => return Settled::Gone,
            (Some(before), Some(after)) if before == after => return Settled::Stable,
            _ => last = current,
        }
    }
    Settled::Unstable
}
