//! The daemon session: status polling, user commands and the tray state they
//! feed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::watch;

use crate::backoff::{self, RetryPolicy};
use crate::connection::{ConnectionManager, DEFAULT_FAIL_TIMEOUT, FAIL_FAST_TIMEOUT};
use crate::daemon::{ConnectionStatus, DaemonApi, Dialer, LoginRequest, StatusSnapshot};
use crate::desktop::Desktop;
use crate::error::Result;
use crate::login;
use crate::projector::{self, Projection, TrayView, UiEffect};
use crate::settings::ClientSettings;
use crate::update::UpdateNotifier;

pub const DEFAULT_DOWNLOAD_URL: &str = "https://github.com/netbirdio/netbird/releases/latest";

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    /// `None` leaves the SSO confirmation unbounded.
    pub sso_timeout: Option<Duration>,
    pub download_url: String,
    /// Shown as the GUI version; not compared against releases.
    pub ui_version: String,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            sso_timeout: None,
            download_url: DEFAULT_DOWNLOAD_URL.into(),
            ui_version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// How a connect or disconnect ended when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The daemon RPC was issued.
    Applied,
    /// The daemon was already in the requested state; no RPC was issued.
    AlreadyInState,
}

struct SessionState {
    status: ConnectionStatus,
    daemon_version: String,
    updates: UpdateNotifier,
    view: TrayView,
}

pub struct Supervisor<D: Dialer, U: Desktop> {
    connection: ConnectionManager<D>,
    desktop: U,
    options: SupervisorOptions,
    // status, version, update flag and rendered view change together
    state: Mutex<SessionState>,
    settings: Mutex<ClientSettings>,
    view_tx: watch::Sender<TrayView>,
}

impl<D: Dialer, U: Desktop> Supervisor<D, U> {
    pub fn new(dialer: D, desktop: U, options: SupervisorOptions) -> Self {
        let view = TrayView::new(&options.ui_version);
        let (view_tx, _) = watch::channel(view.clone());
        Self {
            connection: ConnectionManager::new(dialer),
            desktop,
            state: Mutex::new(SessionState {
                status: ConnectionStatus::Disconnected,
                daemon_version: String::new(),
                updates: UpdateNotifier::new(),
                view,
            }),
            options,
            settings: Mutex::new(ClientSettings::default()),
            view_tx,
        }
    }

    pub fn desktop(&self) -> &U {
        &self.desktop
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn subscribe(&self) -> watch::Receiver<TrayView> {
        self.view_tx.subscribe()
    }

    pub fn view(&self) -> TrayView {
        self.lock_state().view.clone()
    }

    pub fn settings(&self) -> ClientSettings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Passes `res` through, dropping the cached client if it broke.
    async fn track<T>(&self, client: &Arc<D::Client>, res: Result<T>) -> Result<T> {
        if let Err(e) = &res {
            self.connection.note_failure(client, e).await;
        }
        res
    }

    /// Polls forever. Failures are logged and the next cycle tries again.
    pub async fn run_poller(&self) {
        if let Err(e) = self.refresh_config().await {
            error!("get config settings from server: {}", e);
        }
        loop {
            if let Err(e) = self.poll_status().await {
                error!("error while updating status: {}", e);
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    /// One poll attempt, retried within the configured backoff envelope.
    pub async fn poll_status(&self) -> Result<()> {
        let this = self;
        let resp = backoff::retry(&self.options.retry, move || async move {
            let client = this.connection.get_client(DEFAULT_FAIL_TIMEOUT).await?;
            this.track(&client, client.status().await).await
        })
        .await?;

        let effects = self.apply_snapshot(&resp.snapshot());
        if !effects.is_empty() {
            debug!("Status {:?}, daemon {}", resp.status, resp.daemon_version);
        }
        Ok(())
    }

    fn apply_snapshot(&self, snapshot: &StatusSnapshot) -> Vec<UiEffect> {
        let mut state = self.lock_state();

        let update_available = if snapshot.daemon_version != state.daemon_version {
            state.updates.observe_daemon_version(&snapshot.daemon_version)
        } else {
            state.updates.is_available()
        };

        let effects = projector::project(&Projection {
            status: snapshot.status,
            previous_status: state.status,
            version: &snapshot.daemon_version,
            previous_version: &state.daemon_version,
            update_available,
        });

        state.status = snapshot.status;
        state.daemon_version.clone_from(&snapshot.daemon_version);
        self.publish(&mut state, &effects);
        effects
    }

    fn publish(&self, state: &mut SessionState, effects: &[UiEffect]) {
        if effects.is_empty() {
            return;
        }
        state.view.apply(effects);
        self.view_tx.send_replace(state.view.clone());
    }

    /// Feeds a published release into the update notifier.
    pub fn set_latest_release(&self, version: &str) {
        let mut state = self.lock_state();
        if state.updates.set_latest_release(version) {
            info!("Release {} is available", version);
            self.publish(&mut state, &projector::project_update_available());
        }
    }

    pub fn set_settings_enabled(&self, enabled: bool) {
        let mut state = self.lock_state();
        self.publish(&mut state, &[UiEffect::SetSettingsEnabled(enabled)]);
    }

    /// Re-reads management and admin URLs from the daemon.
    pub async fn refresh_config(&self) -> Result<()> {
        let client = self.connection.get_client(FAIL_FAST_TIMEOUT).await?;
        let config = self.track(&client, client.get_config().await).await?;
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) =
            ClientSettings::from_config(&config);
        Ok(())
    }

    /// Logs in (with SSO if the daemon asks for it), then brings the
    /// connection up unless it already is.
    pub async fn connect(&self) -> Result<CommandOutcome> {
        let client = self.connection.get_client(DEFAULT_FAIL_TIMEOUT).await?;

        let res = login::login(
            &*client,
            &self.desktop,
            &LoginRequest::keep_config(),
            self.options.sso_timeout,
        )
        .await;
        self.track(&client, res).await?;

        let status = self.track(&client, client.status().await).await?;
        if ConnectionStatus::from_daemon(&status.status).is_connected() {
            warn!("already connected");
            return Ok(CommandOutcome::AlreadyInState);
        }

        self.track(&client, client.up().await)
            .await
            .inspect_err(|e| error!("up service: {}", e))?;
        Ok(CommandOutcome::Applied)
    }

    pub async fn disconnect(&self) -> Result<CommandOutcome> {
        let client = self.connection.get_client(DEFAULT_FAIL_TIMEOUT).await?;

        let status = self.track(&client, client.status().await).await?;
        if !ConnectionStatus::from_daemon(&status.status).is_connected() {
            warn!("already down");
            return Ok(CommandOutcome::AlreadyInState);
        }

        self.track(&client, client.down().await)
            .await
            .inspect_err(|e| error!("down service: {}", e))?;
        Ok(CommandOutcome::Applied)
    }
}
