//! In-process stand-ins for the daemon and the desktop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use crate::daemon::{
    ConfigResponse, DaemonApi, Dialer, LoginRequest, LoginResponse, StatusResponse,
};
use crate::desktop::Desktop;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn incr(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub status: usize,
    pub login: usize,
    pub wait_sso_login: usize,
    pub up: usize,
    pub down: usize,
    pub get_config: usize,
}

#[derive(Default)]
struct DaemonState {
    status: String,
    daemon_version: String,
    config: ConfigResponse,
    sso: Option<(String, String)>,
    sso_codes: Vec<String>,
    login_requests: Vec<LoginRequest>,
    calls: Calls,
    fail_status: usize,
    break_channel: usize,
    fail_login: Option<String>,
    fail_sso_wait: Option<String>,
    hang_sso_wait: bool,
    yield_on_calls: bool,
    login_gate: Option<Arc<Notify>>,
}

fn daemon_error(message: &str) -> Error {
    Error::Daemon {
        code: 2,
        message: message.to_string(),
    }
}

/// Scripted daemon. Clones share state, so a test keeps one handle while the
/// code under test holds another. `Up` and `Down` flip the reported status.
#[derive(Clone, Default)]
pub struct MockDaemon {
    state: Arc<Mutex<DaemonState>>,
}

impl MockDaemon {
    fn lock(&self) -> MutexGuard<'_, DaemonState> {
        self.state.lock().unwrap()
    }

    pub fn set_status(&self, status: &str, daemon_version: &str) {
        let mut s = self.lock();
        s.status = status.into();
        s.daemon_version = daemon_version.into();
    }

    pub fn set_config(&self, config: ConfigResponse) {
        self.lock().config = config;
    }

    /// The next `n` status calls fail with a daemon error.
    pub fn fail_status(&self, n: usize) {
        self.lock().fail_status = n;
    }

    /// The next call fails as if the stream had been closed.
    pub fn break_channel_once(&self) {
        self.lock().break_channel = 1;
    }

    pub fn fail_login(&self, message: &str) {
        self.lock().fail_login = Some(message.into());
    }

    pub fn require_sso(&self, verification_uri: &str, user_code: &str) {
        self.lock().sso = Some((verification_uri.into(), user_code.into()));
    }

    pub fn fail_sso_wait(&self, message: &str) {
        self.lock().fail_sso_wait = Some(message.into());
    }

    /// WaitSSOLogin never confirms; it only returns once its timeout runs out.
    pub fn hang_sso_wait(&self) {
        self.lock().hang_sso_wait = true;
    }

    /// Every call yields to the scheduler before it takes effect.
    pub fn yield_on_calls(&self) {
        self.lock().yield_on_calls = true;
    }

    /// Logins block until the returned handle is notified.
    pub fn hold_logins(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().login_gate = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls
    }

    pub fn sso_codes(&self) -> Vec<String> {
        self.lock().sso_codes.clone()
    }

    pub fn login_requests(&self) -> Vec<LoginRequest> {
        self.lock().login_requests.clone()
    }

    async fn pause(&self) {
        let yield_now = self.lock().yield_on_calls;
        if yield_now {
            tokio::task::yield_now().await;
        }
    }

    fn take_broken(&self) -> bool {
        let mut s = self.lock();
        if s.break_channel > 0 {
            s.break_channel -= 1;
            return true;
        }
        false
    }
}

impl DaemonApi for MockDaemon {
    async fn status(&self) -> Result<StatusResponse> {
        self.pause().await;
        if self.take_broken() {
            return Err(Error::Closed);
        }
        let mut s = self.lock();
        s.calls.status += 1;
        if s.fail_status > 0 {
            s.fail_status -= 1;
            return Err(daemon_error("daemon is not ready"));
        }
        Ok(StatusResponse {
            status: s.status.clone(),
            daemon_version: s.daemon_version.clone(),
        })
    }

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        self.pause().await;
        let gate = self.lock().login_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut s = self.lock();
        s.calls.login += 1;
        s.login_requests.push(request.clone());
        if let Some(message) = &s.fail_login {
            return Err(daemon_error(message));
        }
        Ok(match &s.sso {
            Some((uri, code)) => LoginResponse {
                needs_sso_login: true,
                user_code: code.clone(),
                verification_uri: uri.clone(),
                verification_uri_complete: uri.clone(),
            },
            None => LoginResponse::default(),
        })
    }

    async fn wait_sso_login(&self, user_code: &str, timeout: Option<Duration>) -> Result<()> {
        self.pause().await;
        let hang = {
            let mut s = self.lock();
            s.calls.wait_sso_login += 1;
            s.sso_codes.push(user_code.to_string());
            if let Some(message) = &s.fail_sso_wait {
                return Err(daemon_error(message));
            }
            s.hang_sso_wait
        };
        if !hang {
            return Ok(());
        }

        let never = std::future::pending::<()>();
        match timeout {
            Some(t) => {
                let _ = tokio::time::timeout(t, never).await;
            }
            None => never.await,
        }
        Err(Error::Timeout {
            method: "WaitSSOLogin",
        })
    }

    async fn up(&self) -> Result<()> {
        self.pause().await;
        let mut s = self.lock();
        s.calls.up += 1;
        s.status = "Connected".into();
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        self.pause().await;
        let mut s = self.lock();
        s.calls.down += 1;
        s.status = "Idle".into();
        Ok(())
    }

    async fn get_config(&self) -> Result<ConfigResponse> {
        self.pause().await;
        let mut s = self.lock();
        s.calls.get_config += 1;
        Ok(s.config.clone())
    }
}

/// Hands out clones of one [`MockDaemon`] and counts dials.
pub struct MockDialer {
    daemon: MockDaemon,
    pub dials: Counter,
    failures: Arc<AtomicUsize>,
}

impl MockDialer {
    pub fn new(daemon: MockDaemon) -> Self {
        Self {
            daemon,
            dials: Counter::default(),
            failures: Arc::default(),
        }
    }

    pub fn fail_next_dials(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

impl Dialer for MockDialer {
    type Client = MockDaemon;

    async fn dial(&self, _timeout: Duration) -> Result<MockDaemon> {
        self.dials.incr();
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::Dial {
                addr: self.addr(),
                reason: "connection refused".into(),
            });
        }
        Ok(self.daemon.clone())
    }

    fn addr(&self) -> String {
        "unix:///tmp/netbird-mock.sock".into()
    }
}

#[derive(Default)]
struct DesktopState {
    opened: Vec<String>,
    notifications: Vec<String>,
    fail_open_url: bool,
    settings_runs: usize,
    settings_failure: Option<String>,
    settings_gate: Option<Arc<Notify>>,
}

#[derive(Clone, Default)]
pub struct MockDesktop {
    state: Arc<Mutex<DesktopState>>,
}

impl MockDesktop {
    fn lock(&self) -> MutexGuard<'_, DesktopState> {
        self.state.lock().unwrap()
    }

    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.lock().notifications.clone()
    }

    pub fn settings_runs(&self) -> usize {
        self.lock().settings_runs
    }

    pub fn fail_open_url(&self) {
        self.lock().fail_open_url = true;
    }

    pub fn fail_settings(&self, message: &str) {
        self.lock().settings_failure = Some(message.into());
    }

    /// Settings runs block until the returned handle is notified.
    pub fn hold_settings(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().settings_gate = Some(gate.clone());
        gate
    }
}

impl Desktop for MockDesktop {
    fn open_url(&self, url: &str) -> anyhow::Result<()> {
        let mut s = self.lock();
        if s.fail_open_url {
            anyhow::bail!("no browser available");
        }
        s.opened.push(url.to_string());
        Ok(())
    }

    fn notify_failure(&self, summary: &str, err: &dyn std::fmt::Display) {
        self.lock().notifications.push(format!("{}: {}", summary, err));
    }

    async fn run_settings(&self) -> anyhow::Result<String> {
        let gate = {
            let mut s = self.lock();
            s.settings_runs += 1;
            s.settings_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.lock().settings_failure.clone() {
            Some(message) => anyhow::bail!(message),
            None => Ok("Settings unchanged\n".into()),
        }
    }
}
