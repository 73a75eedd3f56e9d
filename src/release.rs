//! Background lookup of the latest published NetBird release.

use std::time::Duration;

use log::{debug, warn};

use crate::daemon::Dialer;
use crate::desktop::Desktop;
use crate::error::{Error, Result};
use crate::supervisor::Supervisor;
use crate::update::Version;

/// Plain-text endpoint holding the version of the newest release.
pub const DEFAULT_RELEASE_URL: &str = "https://pkgs.netbird.io/releases/latest/version";
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30 * 60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ReleaseChecker {
    http: reqwest::Client,
    url: String,
}

impl ReleaseChecker {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// Fetches the newest release version.
    pub async fn fetch_latest(&self) -> Result<String> {
        let resp = self.http.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(self.failed(format!("HTTP {}", status.as_u16())));
        }

        let body = resp.text().await?;
        let version = body.trim();
        if Version::parse(version).is_none() {
            return Err(self.failed(format!("not a version: {:?}", version)));
        }
        Ok(version.to_string())
    }

    fn failed(&self, reason: String) -> Error {
        Error::Release {
            url: self.url.clone(),
            reason,
        }
    }

    /// One lookup, fed into the supervisor's update notifier.
    pub async fn check<D: Dialer, U: Desktop>(&self, supervisor: &Supervisor<D, U>) -> Result<()> {
        let version = self.fetch_latest().await?;
        debug!("Latest release is {}", version);
        supervisor.set_latest_release(&version);
        Ok(())
    }

    /// Checks now and then every `interval`, forever. Failures only log.
    pub async fn run<D: Dialer, U: Desktop>(&self, supervisor: &Supervisor<D, U>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.check(supervisor).await {
                warn!("checking for a new release: {}", e);
            }
        }
    }
}
