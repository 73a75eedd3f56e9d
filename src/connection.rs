use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::daemon::Dialer;
use crate::error::{Error, Result};

/// Dial budget for user commands and polling.
pub const DEFAULT_FAIL_TIMEOUT: Duration = Duration::from_secs(3);
/// Dial budget where a quick answer matters more than patience.
pub const FAIL_FAST_TIMEOUT: Duration = Duration::from_secs(1);

/// Owns the one cached client to the daemon.
///
/// The client is created on first use and handed out without any freshness
/// check. It is only replaced after a call on it fails with a channel-level
/// error (see [`ConnectionManager::note_failure`]).
pub struct ConnectionManager<D: Dialer> {
    dialer: D,
    client: Mutex<Option<Arc<D::Client>>>,
}

impl<D: Dialer> ConnectionManager<D> {
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            client: Mutex::new(None),
        }
    }

    pub async fn get_client(&self, timeout: Duration) -> Result<Arc<D::Client>> {
        // Held across the dial so concurrent callers share one attempt.
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        debug!("Dialing daemon at {}", self.dialer.addr());
        let client = Arc::new(self.dialer.dial(timeout).await?);
        info!("Connected to daemon at {}", self.dialer.addr());
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Drops the cached client if `err` shows its channel is gone. A client
    /// that was already replaced by someone else is left alone.
    pub async fn note_failure(&self, client: &Arc<D::Client>, err: &Error) {
        if !err.is_channel_broken() {
            return;
        }
        let mut slot = self.client.lock().await;
        if slot.as_ref().is_some_and(|cached| Arc::ptr_eq(cached, client)) {
            warn!("Daemon channel broken ({}), will re-dial on next use", err);
            *slot = None;
        }
    }

    #[cfg(test)]
    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }
}
