use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::daemon::Dialer;
use crate::desktop::Desktop;
use crate::error::{ErrorKind, Result};
use crate::supervisor::{CommandOutcome, Supervisor};

/// Everything a click in the tray can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEvent {
    OpenAdminPanel,
    Connect,
    Disconnect,
    OpenSettings,
    Quit,
    OpenUpdateLink,
}

/// Marks one kind of command as running. Cleared when the guard drops.
#[derive(Clone, Default)]
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn try_begin(&self) -> Option<InFlightGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(self.0.clone()))
    }
}

struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Dispatcher<D: Dialer, U: Desktop> {
    supervisor: Arc<Supervisor<D, U>>,
    connecting: InFlight,
    disconnecting: InFlight,
    settings: InFlight,
}

impl<D: Dialer, U: Desktop> Dispatcher<D, U> {
    pub fn new(supervisor: Arc<Supervisor<D, U>>) -> Self {
        Self {
            supervisor,
            connecting: InFlight::default(),
            disconnecting: InFlight::default(),
            settings: InFlight::default(),
        }
    }

    /// Handles events until `Quit` or until every sender is gone.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<MenuEvent>) {
        while let Some(event) = events.recv().await {
            if self.handle(event).is_break() {
                break;
            }
        }
    }

    /// Reacts to one event. Long-running work is spawned and its handle
    /// returned so callers can wait on it.
    pub fn handle(&self, event: MenuEvent) -> ControlFlow<(), Option<JoinHandle<()>>> {
        debug!("Menu event {:?}", event);
        let task = match event {
            MenuEvent::Quit => {
                info!("Quit requested");
                return ControlFlow::Break(());
            }
            MenuEvent::OpenAdminPanel => {
                let url = self.supervisor.settings().admin_url;
                self.open(&url);
                None
            }
            MenuEvent::OpenUpdateLink => {
                let url = self.supervisor.options().download_url.clone();
                self.open(&url);
                None
            }
            MenuEvent::Connect => {
                self.spawn_command(&self.connecting, "connect", |sup| async move {
                    sup.connect().await
                })
            }
            MenuEvent::Disconnect => {
                self.spawn_command(&self.disconnecting, "disconnect", |sup| async move {
                    sup.disconnect().await
                })
            }
            MenuEvent::OpenSettings => self.spawn_settings(),
        };
        ControlFlow::Continue(task)
    }

    fn open(&self, url: &str) {
        if let Err(e) = self.supervisor.desktop().open_url(url) {
            error!("{:#}", e);
        }
    }

    fn spawn_command<F, Fut>(
        &self,
        flag: &InFlight,
        name: &'static str,
        command: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Arc<Supervisor<D, U>>) -> Fut,
        Fut: Future<Output = Result<CommandOutcome>> + Send + 'static,
    {
        let Some(guard) = flag.try_begin() else {
            debug!("{} already in progress, ignoring click", name);
            return None;
        };
        let sup = self.supervisor.clone();
        let command = command(sup.clone());
        Some(tokio::spawn(async move {
            let _guard = guard;
            match command.await {
                Ok(outcome) => debug!("{} finished: {:?}", name, outcome),
                Err(e) => {
                    error!("{} failed: {}", name, e);
                    let summary = match e.kind() {
                        ErrorKind::Dial => "NetBird daemon is not running".to_string(),
                        _ => format!("NetBird {} failed", name),
                    };
                    sup.desktop().notify_failure(&summary, &e);
                }
            }
        }))
    }

    fn spawn_settings(&self) -> Option<JoinHandle<()>> {
        let Some(guard) = self.settings.try_begin() else {
            debug!("settings already open, ignoring click");
            return None;
        };
        self.supervisor.set_settings_enabled(false);

        let sup = self.supervisor.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            match sup.desktop().run_settings().await {
                Ok(output) if !output.trim().is_empty() => {
                    info!("settings: {}", output.trim())
                }
                Ok(_) => {}
                Err(e) => error!("running settings: {:#}", e),
            }
            sup.set_settings_enabled(true);
            if let Err(e) = sup.refresh_config().await {
                error!("get config settings from server: {}", e);
            }
        }))
    }
}
