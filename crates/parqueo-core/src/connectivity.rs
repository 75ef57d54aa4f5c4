//! Connectivity monitor.
//!
//! Mirrors the platform's online/offline indicator. There is no reachability
//! probing: a platform that reports online while the remote store is down
//! still reads as online here, and remote calls then fail as remote errors.

use tokio::sync::watch;

/// Shared online/offline signal. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct Connectivity {
    sender: watch::Sender<bool>,
}

impl Connectivity {
    /// Start from the platform's indicator at startup
    pub fn new(initially_online: bool) -> Self {
        let (sender, _receiver) = watch::channel(initially_online);
        Self { sender }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Apply a platform transition event. Returns whether the state changed.
    pub fn report(&self, online: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "Connectivity changed");
        }
        changed
    }

    /// Change notifications; the receiver starts at the current state
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}
