//! Host-supplied network availability signal.

use log::info;
use tokio::sync::watch;

/// Connectivity flag shared by the host and the scheduler.
///
/// The host flips it from its platform connectivity callbacks; sync passes
/// only start while it reads `true`.
#[derive(Debug)]
pub struct NetworkMonitor {
    available: watch::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(initially_available: bool) -> Self {
        let (available, _) = watch::channel(initially_available);
        Self { available }
    }

    pub fn set_available(&self, available: bool) {
        let previous = self.available.send_replace(available);
        if previous != available {
            info!(
                "event=network_changed module=sync status=ok available={}",
                available
            );
        }
    }

    pub fn is_available(&self) -> bool {
        *self.available.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.available.subscribe()
    }

    /// Resolves once the network is reported available.
    pub async fn wait_until_available(&self) {
        let mut receiver = self.available.subscribe();
        while !*receiver.borrow_and_update() {
            // The sender lives in `self`, so the channel cannot close here.
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
