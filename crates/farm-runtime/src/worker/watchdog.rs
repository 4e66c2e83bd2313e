use std::time::Duration;

use tokio::time::Instant;

/// Tracks how long the supervisor has been silent.
///
/// Silence is measured from the worker's start until the first supervisor heartbeat, and from
/// the latest heartbeat afterwards.
#[derive(Clone, Copy, Debug)]
pub struct LivenessClock {
    window: Duration,
    last_seen: Instant,
}

impl LivenessClock {
    pub fn new(window: Duration, started: Instant) -> Self {
        Self {
            window,
            last_seen: started,
        }
    }

    pub fn touch(&mut self, at: Instant) {
        if at > self.last_seen {
            self.last_seen = at;
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) >= self.window
    }

    #[inline]
    pub fn window(&self) -> Duration {
        self.window
    }
}
