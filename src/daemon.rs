use std::{fmt, future::Future, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rpc::RpcChannel;

/// Per-call limit for everything except the SSO wait.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(3);

pub const DEFAULT_DAEMON_ADDR: &str = "unix:///var/run/netbird.sock";

const STATUS_CONNECTED: &str = "Connected";

/// Where the daemon listens: `unix://<path>` or `tcp://<host:port>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonAddr {
    Unix(PathBuf),
    Tcp(String),
}

impl FromStr for DaemonAddr {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(format!("missing socket path in {:?}", s));
            }
            Ok(DaemonAddr::Unix(PathBuf::from(path)))
        } else if let Some(host) = s.strip_prefix("tcp://") {
            if host.is_empty() {
                return Err(format!("missing host in {:?}", s));
            }
            Ok(DaemonAddr::Tcp(host.to_string()))
        } else if s.contains("://") {
            Err(format!("unsupported scheme in {:?}, expected unix:// or tcp://", s))
        } else {
            Ok(DaemonAddr::Tcp(s.to_string()))
        }
    }
}

impl fmt::Display for DaemonAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonAddr::Unix(path) => write!(f, "unix://{}", path.display()),
            DaemonAddr::Tcp(host) => write!(f, "tcp://{}", host),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

impl ConnectionStatus {
    /// The daemon reports several intermediate states; only "Connected" counts.
    pub fn from_daemon(status: &str) -> Self {
        if status == STATUS_CONNECTED {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub daemon_version: String,
}

impl StatusResponse {
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: ConnectionStatus::from_daemon(&self.status),
            daemon_version: self.daemon_version.clone(),
        }
    }
}

/// What one poll observed. Superseded by the next poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: ConnectionStatus,
    pub daemon_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_url: Option<String>,
    #[serde(rename = "adminURL", skip_serializing_if = "Option::is_none")]
    pub admin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_shared_key: Option<String>,
    pub is_linux_desktop_client: bool,
}

impl LoginRequest {
    /// A login that keeps whatever the daemon already has configured.
    pub fn keep_config() -> Self {
        Self {
            is_linux_desktop_client: cfg!(target_os = "linux"),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(rename = "needsSSOLogin", default)]
    pub needs_sso_login: bool,
    #[serde(default)]
    pub user_code: String,
    #[serde(rename = "verificationURI", default)]
    pub verification_uri: String,
    #[serde(rename = "verificationURIComplete", default)]
    pub verification_uri_complete: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitSsoLoginRequest {
    pub user_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    #[serde(default)]
    pub management_url: String,
    #[serde(rename = "adminURL", default)]
    pub admin_url: String,
    #[serde(default)]
    pub pre_shared_key: String,
    #[serde(default)]
    pub config_file: String,
    #[serde(default)]
    pub log_file: String,
}

/// The RPC surface the tray consumes from the daemon.
pub trait DaemonApi: Send + Sync + 'static {
    fn status(&self) -> impl Future<Output = Result<StatusResponse>> + Send;

    fn login(&self, request: &LoginRequest) -> impl Future<Output = Result<LoginResponse>> + Send;

    /// Blocks until the identity provider confirms `user_code`, or until
    /// `timeout` if one is given.
    fn wait_sso_login(
        &self,
        user_code: &str,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn up(&self) -> impl Future<Output = Result<()>> + Send;

    fn down(&self) -> impl Future<Output = Result<()>> + Send;

    fn get_config(&self) -> impl Future<Output = Result<ConfigResponse>> + Send;
}

/// Produces fresh clients; the connection manager decides when to call it.
pub trait Dialer: Send + Sync + 'static {
    type Client: DaemonApi;

    fn dial(&self, timeout: Duration) -> impl Future<Output = Result<Self::Client>> + Send;

    fn addr(&self) -> String;
}

pub struct RpcDialer {
    addr: DaemonAddr,
}

impl RpcDialer {
    pub fn new(addr: DaemonAddr) -> Self {
        Self { addr }
    }
}

impl Dialer for RpcDialer {
    type Client = DaemonClient;

    async fn dial(&self, timeout: Duration) -> Result<DaemonClient> {
        let channel = RpcChannel::connect(&self.addr, timeout).await?;
        Ok(DaemonClient { channel })
    }

    fn addr(&self) -> String {
        self.addr.to_string()
    }
}

pub struct DaemonClient {
    channel: RpcChannel,
}

impl DaemonApi for DaemonClient {
    async fn status(&self) -> Result<StatusResponse> {
        self.channel.call("Status", &Empty {}, Some(CALL_TIMEOUT)).await
    }

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        self.channel.call("Login", request, Some(CALL_TIMEOUT)).await
    }

    async fn wait_sso_login(&self, user_code: &str, timeout: Option<Duration>) -> Result<()> {
        let request = WaitSsoLoginRequest {
            user_code: user_code.to_string(),
        };
        let _: Empty = self.channel.call("WaitSSOLogin", &request, timeout).await?;
        Ok(())
    }

    async fn up(&self) -> Result<()> {
        let _: Empty = self.channel.call("Up", &Empty {}, Some(CALL_TIMEOUT)).await?;
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        let _: Empty = self.channel.call("Down", &Empty {}, Some(CALL_TIMEOUT)).await?;
        Ok(())
    }

    async fn get_config(&self) -> Result<ConfigResponse> {
        self.channel.call("GetConfig", &Empty {}, Some(CALL_TIMEOUT)).await
    }
}
