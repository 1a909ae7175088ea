//! Queue-position countdown emitted while a session waits for assignment.

/// Wait-queue countdown for a single queued session. Positions only ever
/// decrease; the estimated wait is derived from the current position.
#[derive(Clone, Debug)]
pub struct WaitQueue {
    position: u32,
    wait_per_position_secs: u64,
}

impl WaitQueue {
    pub fn new(initial_position: u32) -> Self {
        Self {
            position: initial_position,
            wait_per_position_secs: 15,
        }
    }

    pub fn with_wait_per_position(mut self, secs: u64) -> Self {
        self.wait_per_position_secs = secs;
        self
    }

    /// Current position and estimated wait in seconds.
    pub fn status(&self) -> (u32, u64) {
        (
            self.position,
            u64::from(self.position) * self.wait_per_position_secs,
        )
    }

    /// Advance one step toward the front. Saturates at zero.
    pub fn advance(&mut self) {
        self.position = self.position.saturating_sub(1);
    }

    /// True when the session is next to be assigned.
    pub fn is_front(&self) -> bool {
        self.position == 0
    }
}
