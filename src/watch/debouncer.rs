//! Pure debouncer: buffers raw events in arrival order and releases the
//! batch after a quiet window. No business logic and no global state
//! access; reduction and classification happen on the released batch.

use std::time::{Duration, Instant};

use super::events::FsEvent;

/// Quiet window after the last event before a batch is released.
/// Coalesces editor save bursts into one decision per path.
pub const DEBOUNCE_MS: u64 = 50;

pub struct Debouncer {
    queue: Vec<FsEvent>,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            last_event: None,
        }
    }

    /// Buffer one event; restarts the quiet window.
    pub fn push(&mut self, event: FsEvent) {
        self.queue.push(event);
        self.last_event = Some(Instant::now());
    }

    pub fn is_ready(&self) -> bool {
        match self.last_event {
            Some(last) => {
                !self.queue.is_empty() && last.elapsed() >= Duration::from_millis(DEBOUNCE_MS)
            }
            None => false,
        }
    }

    /// Take the buffered batch if the quiet window elapsed.
    pub fn take_if_ready(&mut self) -> Option<Vec<FsEvent>> {
        if !self.is_ready() {
            return None;
        }
        self.last_event = None;
        Some(std::mem::take(&mut self.queue))
    }

    /// Precise sleep duration until the next possible ready time.
    pub fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(1);
        };

        Duration::from_millis(DEBOUNCE_MS)
            .saturating_sub(last_event.elapsed())
            .max(Duration::from_millis(1))
    }
}
