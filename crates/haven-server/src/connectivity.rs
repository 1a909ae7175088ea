//! Connectivity state shared between the RPC surface and the store spool.
//!
//! The spool watches the same channel: flipping offline makes it buffer
//! writes, flipping back online triggers replay.

use tokio::sync::watch;

/// Tracks whether the backing store is reachable.
pub struct Connectivity {
    online: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new(online: watch::Sender<bool>) -> Self {
        Self { online }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Flip the connectivity state. Returns `true` if the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                tracing::info!("connectivity restored");
            } else {
                tracing::warn!("connectivity lost, store writes will spool");
            }
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
}
