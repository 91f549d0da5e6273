//! Network reachability as seen by the host.

use tokio::sync::watch;
use tracing::info;

/// Source of online/offline state.
pub trait Connectivity: Send + Sync {
    /// True while the remote is believed reachable.
    fn is_online(&self) -> bool;

    /// A receiver that sees every change of [`Connectivity::is_online`].
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity driven by the host's own online/offline events.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with an initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    /// Reports the current state. Returns true if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "connectivity changed");
        }
        changed
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
