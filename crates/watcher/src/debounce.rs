//! Burst coalescing
//!
//! Editors and build tools usually touch a file several times in a row. A
//! burst is every event that arrives before the channel stays quiet for one
//! full window; it is reported once.

use std::time::Duration;
use tokio::sync::mpsc;

/// Quiet period that closes a burst
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

pub struct Debouncer<T> {
    rx: mpsc::UnboundedReceiver<T>,
    window: Duration,
}

impl<T> Debouncer<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>, window: Duration) -> Self {
        Self { rx, window }
    }

    /// Wait for the next burst and return how many events it merged
    ///
    /// Returns `None` once every sender is gone and nothing is pending.
    pub async fn next_burst(&mut self) -> Option<usize> {
        self.rx.recv().await?;
        let mut merged = 1;

        loop {
            match tokio::time::timeout(self.window, self.rx.recv()).await {
                Ok(Some(_)) => merged += 1,
                // Closed or quiet: the burst is over either way.
                Ok(None) | Err(_) => return Some(merged),
            }
        }
    }
}
