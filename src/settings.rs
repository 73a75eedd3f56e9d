//! The settings flow: show the daemon's configuration and, when asked to,
//! log in again with changed values.

use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};
use log::info;

use crate::connection::{ConnectionManager, FAIL_FAST_TIMEOUT};
use crate::daemon::{ConfigResponse, DaemonApi, Dialer, LoginRequest};
use crate::desktop::Desktop;
use crate::error::{Error, Result};
use crate::login;

pub const DEFAULT_MANAGEMENT_URL: &str = "https://api.wiretrustee.com:33073";
pub const DEFAULT_ADMIN_URL: &str = "https://app.netbird.io";

/// What the daemon shows instead of a configured pre-shared key.
pub const PRE_SHARED_KEY_MASK: &str = "**********";

const WG_KEY_LEN: usize = 32;

/// Client-side copy of the daemon's connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub management_url: String,
    pub admin_url: String,
    pub pre_shared_key: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            management_url: DEFAULT_MANAGEMENT_URL.into(),
            admin_url: DEFAULT_ADMIN_URL.into(),
            pre_shared_key: String::new(),
        }
    }
}

impl ClientSettings {
    /// Empty URLs in the daemon's answer fall back to the defaults.
    pub fn from_config(config: &ConfigResponse) -> Self {
        let or_default = |value: &str, default: &str| {
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };
        Self {
            management_url: or_default(&config.management_url, DEFAULT_MANAGEMENT_URL),
            admin_url: or_default(&config.admin_url, DEFAULT_ADMIN_URL),
            pre_shared_key: config.pre_shared_key.clone(),
        }
    }

    fn with_overrides(&self, overrides: &SettingsOverrides) -> Self {
        Self {
            management_url: overrides
                .management_url
                .clone()
                .unwrap_or_else(|| self.management_url.clone()),
            admin_url: overrides
                .admin_url
                .clone()
                .unwrap_or_else(|| self.admin_url.clone()),
            pre_shared_key: overrides
                .pre_shared_key
                .clone()
                .unwrap_or_else(|| self.pre_shared_key.clone()),
        }
    }
}

/// Values given on the command line in settings mode.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub management_url: Option<String>,
    pub admin_url: Option<String>,
    pub pre_shared_key: Option<String>,
}

impl SettingsOverrides {
    pub fn is_empty(&self) -> bool {
        self.management_url.is_none() && self.admin_url.is_none() && self.pre_shared_key.is_none()
    }
}

/// Accepts an empty key, the mask, or a base64 WireGuard key.
pub fn validate_pre_shared_key(key: &str) -> Result<()> {
    if key.is_empty() || key == PRE_SHARED_KEY_MASK {
        return Ok(());
    }
    match STANDARD.decode(key) {
        Ok(bytes) if bytes.len() == WG_KEY_LEN => Ok(()),
        Ok(bytes) => Err(Error::InvalidPreSharedKey(format!(
            "expected {} bytes, got {}",
            WG_KEY_LEN,
            bytes.len()
        ))),
        Err(e) => Err(Error::InvalidPreSharedKey(e.to_string())),
    }
}

fn masked(key: &str) -> &str {
    if key.is_empty() {
        ""
    } else {
        PRE_SHARED_KEY_MASK
    }
}

pub async fn run<D, U, W>(
    connection: &ConnectionManager<D>,
    desktop: &U,
    overrides: &SettingsOverrides,
    sso_timeout: Option<Duration>,
    out: &mut W,
) -> anyhow::Result<()>
where
    D: Dialer,
    U: Desktop,
    W: Write,
{
    let client = connection
        .get_client(FAIL_FAST_TIMEOUT)
        .await
        .context("get daemon client")?;
    let config = client
        .get_config()
        .await
        .context("get config settings from server")?;
    let current = ClientSettings::from_config(&config);

    writeln!(out, "Management URL: {}", current.management_url)?;
    writeln!(out, "Admin URL:      {}", current.admin_url)?;
    writeln!(out, "Pre-shared Key: {}", masked(&current.pre_shared_key))?;
    writeln!(out, "Config File:    {}", config.config_file)?;
    writeln!(out, "Log File:       {}", config.log_file)?;

    if overrides.is_empty() {
        return Ok(());
    }

    if let Some(key) = &overrides.pre_shared_key {
        validate_pre_shared_key(key)?;
    }

    let requested = current.with_overrides(overrides);
    if requested == current {
        writeln!(out, "Settings unchanged")?;
        return Ok(());
    }

    info!(
        "Applying settings: management {} admin {}",
        requested.management_url, requested.admin_url
    );
    let request = LoginRequest {
        management_url: Some(requested.management_url),
        admin_url: Some(requested.admin_url),
        pre_shared_key: Some(requested.pre_shared_key),
        ..LoginRequest::keep_config()
    };
    login::login(&*client, desktop, &request, sso_timeout)
        .await
        .context("login with new settings")?;
    client.up().await.context("up service")?;

    writeln!(out, "Settings applied")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDaemon, MockDesktop, MockDialer};

    const VALID_KEY: &str = "aGVsbG8gd2lyZWd1YXJkIGtleSAzMiBieXRlcyEhISE=";

    fn configured_daemon() -> MockDaemon {
        let daemon = MockDaemon::default();
        daemon.set_config(ConfigResponse {
            management_url: "https://mgmt.example:443".into(),
            admin_url: "https://admin.example".into(),
            pre_shared_key: PRE_SHARED_KEY_MASK.into(),
            config_file: "/etc/netbird/config.json".into(),
            log_file: "/var/log/netbird/client.log".into(),
        });
        daemon
    }

    async fn run_with(
        daemon: &MockDaemon,
        overrides: SettingsOverrides,
    ) -> (anyhow::Result<()>, String) {
        let connection = ConnectionManager::new(MockDialer::new(daemon.clone()));
        let mut out = Vec::new();
        let res = run(&connection, &MockDesktop::default(), &overrides, None, &mut out).await;
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn accepts_known_pre_shared_key_forms() {
        assert_eq!(STANDARD.decode(VALID_KEY).unwrap().len(), 32);
        validate_pre_shared_key("").unwrap();
        validate_pre_shared_key(PRE_SHARED_KEY_MASK).unwrap();
        validate_pre_shared_key(VALID_KEY).unwrap();
    }

    #[test]
    fn rejects_malformed_pre_shared_keys() {
        for key in ["not base64!", "c2hvcnQ=", "*********"] {
            let err = validate_pre_shared_key(key).unwrap_err();
            assert!(matches!(err, Error::InvalidPreSharedKey(_)), "{key}");
        }
    }

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let settings = ClientSettings::from_config(&ConfigResponse::default());
        assert_eq!(settings, ClientSettings::default());
    }

    #[tokio::test]
    async fn prints_current_config_with_masked_key() {
        let daemon = configured_daemon();

        let (res, out) = run_with(&daemon, SettingsOverrides::default()).await;

        res.unwrap();
        assert!(out.contains("https://mgmt.example:443"));
        assert!(out.contains("/etc/netbird/config.json"));
        assert!(out.contains(PRE_SHARED_KEY_MASK));
        assert_eq!(daemon.calls().login, 0);
    }

    #[tokio::test]
    async fn unchanged_values_do_not_log_in() {
        let daemon = configured_daemon();
        let overrides = SettingsOverrides {
            management_url: Some("https://mgmt.example:443".into()),
            ..Default::default()
        };

        let (res, out) = run_with(&daemon, overrides).await;

        res.unwrap();
        assert!(out.contains("Settings unchanged"));
        assert_eq!(daemon.calls().login, 0);
        assert_eq!(daemon.calls().up, 0);
    }

    #[tokio::test]
    async fn changed_url_logs_in_and_brings_up() {
        let daemon = configured_daemon();
        let overrides = SettingsOverrides {
            management_url: Some("https://other.example:443".into()),
            ..Default::default()
        };

        let (res, out) = run_with(&daemon, overrides).await;

        res.unwrap();
        assert!(out.contains("Settings applied"));
        let requests = daemon.login_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].management_url.as_deref(),
            Some("https://other.example:443")
        );
        assert_eq!(requests[0].admin_url.as_deref(), Some("https://admin.example"));
        assert_eq!(
            requests[0].pre_shared_key.as_deref(),
            Some(PRE_SHARED_KEY_MASK)
        );
        assert_eq!(daemon.calls().up, 1);
    }

    #[tokio::test]
    async fn invalid_key_is_rejected_before_login() {
        let daemon = configured_daemon();
        let overrides = SettingsOverrides {
            pre_shared_key: Some("garbage".into()),
            ..Default::default()
        };

        let (res, _) = run_with(&daemon, overrides).await;

        let err = res.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidPreSharedKey(_))
        ));
        assert_eq!(daemon.calls().login, 0);
    }
}
