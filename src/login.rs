//! Two-phase login: a direct `Login` call, followed by an SSO wait when the
//! daemon asks the user to confirm in a browser.

use std::time::Duration;

use log::{error, info};

use crate::daemon::{DaemonApi, LoginRequest};
use crate::desktop::Desktop;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The daemon accepted the login without user interaction.
    Direct,
    /// The user confirmed through the identity provider.
    Interactive,
}

/// The interactive step the daemon asked for. Lives for one login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginHandshake {
    pub verification_uri: String,
    pub user_code: String,
}

/// Logs in, driving the SSO step when needed.
///
/// `sso_timeout` of `None` waits on the identity provider for as long as the
/// daemon keeps the call open. Nothing is retried.
pub async fn login<C, U>(
    client: &C,
    desktop: &U,
    request: &LoginRequest,
    sso_timeout: Option<Duration>,
) -> Result<LoginOutcome>
where
    C: DaemonApi,
    U: Desktop,
{
    let resp = client.login(request).await.inspect_err(|e| {
        error!("login to management URL with: {}", e);
    })?;

    if !resp.needs_sso_login {
        return Ok(LoginOutcome::Direct);
    }

    let handshake = LoginHandshake {
        verification_uri: resp.verification_uri_complete,
        user_code: resp.user_code,
    };
    info!("SSO login required, opening {}", handshake.verification_uri);

    desktop
        .open_url(&handshake.verification_uri)
        .map_err(|e| Error::OpenUrl {
            url: handshake.verification_uri.clone(),
            reason: format!("{:#}", e),
        })
        .inspect_err(|e| error!("opening the verification uri in the browser failed: {}", e))?;

    client
        .wait_sso_login(&handshake.user_code, sso_timeout)
        .await
        .inspect_err(|e| error!("waiting sso login failed with: {}", e))?;

    info!("SSO login confirmed");
    Ok(LoginOutcome::Interactive)
}
