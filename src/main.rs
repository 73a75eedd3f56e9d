use std::{process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use ksni::TrayMethods;
use log::{error, info, warn};
use tokio::sync::mpsc;

use connection::ConnectionManager;
use daemon::{DaemonAddr, RpcDialer, DEFAULT_DAEMON_ADDR};
use desktop::SystemDesktop;
use dispatcher::Dispatcher;
use release::{ReleaseChecker, DEFAULT_CHECK_INTERVAL, DEFAULT_RELEASE_URL};
use settings::SettingsOverrides;
use supervisor::{Supervisor, SupervisorOptions, DEFAULT_DOWNLOAD_URL};
use tray::NetbirdTray;

mod backoff;
mod connection;
mod daemon;
mod desktop;
mod dispatcher;
mod error;
mod icons;
mod login;
mod pidfile;
mod projector;
mod release;
mod rpc;
mod settings;
mod supervisor;
#[cfg(test)]
mod testing;
mod tray;
mod update;
mod xdg;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Daemon service address to serve CLI requests [unix|tcp]://[path|host:port]
    #[arg(long, default_value = DEFAULT_DAEMON_ADDR)]
    daemon_addr: DaemonAddr,

    /// Show the daemon settings. Change them by adding --management-url,
    /// --admin-url or --pre-shared-key; the tray's Settings entry only shows them
    #[arg(long)]
    settings: bool,

    /// Management service URL (settings mode)
    #[arg(long, requires = "settings")]
    management_url: Option<String>,

    /// Admin panel URL (settings mode)
    #[arg(long, requires = "settings")]
    admin_url: Option<String>,

    /// WireGuard pre-shared key (settings mode)
    #[arg(long, requires = "settings")]
    pre_shared_key: Option<String>,

    /// Install icons, a desktop entry and autostart for the current user
    #[arg(long, conflicts_with = "settings")]
    install: bool,

    /// Refresh period in seconds
    #[arg(long, default_value = "2")]
    refresh_period: u64,

    /// Give up on SSO confirmation after this many seconds
    #[arg(long)]
    sso_timeout: Option<u64>,

    /// Latest published release. Replaces the periodic release check
    #[arg(long)]
    latest_version: Option<String>,

    /// Where to look up the latest release version
    #[arg(long, default_value = DEFAULT_RELEASE_URL)]
    release_url: String,

    /// Seconds between release checks, 0 disables them
    #[arg(long, default_value_t = DEFAULT_CHECK_INTERVAL.as_secs())]
    release_check_interval: u64,

    /// Where "Download latest version" points to
    #[arg(long, default_value = DEFAULT_DOWNLOAD_URL)]
    download_url: String,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,
}

impl Args {
    fn sso_timeout(&self) -> Option<Duration> {
        self.sso_timeout.map(Duration::from_secs)
    }

    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            management_url: self.management_url.clone(),
            admin_url: self.admin_url.clone(),
            pre_shared_key: self.pre_shared_key.clone(),
        }
    }
}

async fn run_settings(args: &Args) -> anyhow::Result<()> {
    let connection = ConnectionManager::new(RpcDialer::new(args.daemon_addr.clone()));
    let desktop = SystemDesktop::new(args.daemon_addr.clone());
    settings::run(
        &connection,
        &desktop,
        &args.overrides(),
        args.sso_timeout(),
        &mut std::io::stdout(),
    )
    .await
}

async fn run_tray(args: Args) -> anyhow::Result<()> {
    pidfile::check_pid_file(&pidfile::default_path())?;

    let icon_dir = icons::extract_theme()
        .inspect_err(|e| warn!("Falling back to the system icon theme: {:#}", e))
        .ok();

    let options = SupervisorOptions {
        poll_interval: Duration::from_secs(args.refresh_period),
        sso_timeout: args.sso_timeout(),
        download_url: args.download_url.clone(),
        ..SupervisorOptions::default()
    };
    let supervisor = Arc::new(Supervisor::new(
        RpcDialer::new(args.daemon_addr.clone()),
        SystemDesktop::new(args.daemon_addr.clone()),
        options,
    ));
    let release_checker = match &args.latest_version {
        Some(version) => {
            supervisor.set_latest_release(version);
            None
        }
        None if args.release_check_interval == 0 => None,
        None => Some(ReleaseChecker::new(args.release_url.clone())?),
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let tray = NetbirdTray::new(supervisor.view(), icon_dir, events_tx);
    let handle = tray
        .spawn()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to register the tray icon: {:?}", e))?;
    info!("Tray registered, daemon at {}", args.daemon_addr);

    tokio::spawn(tray::render(handle, supervisor.subscribe()));
    let poller = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run_poller().await })
    };
    let release_check = release_checker.map(|checker| {
        let supervisor = supervisor.clone();
        let interval = Duration::from_secs(args.release_check_interval);
        tokio::spawn(async move { checker.run(&supervisor, interval).await })
    });

    Dispatcher::new(supervisor).run(events_rx).await;
    poller.abort();
    if let Some(task) = release_check {
        task.abort();
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .parse_default_env()
        .init();

    let res = if args.install {
        icons::local_install().context("Local install failed")
    } else if args.settings {
        run_settings(&args).await
    } else {
        run_tray(args).await
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn settings_help_names_the_override_flags() {
        let cmd = Args::command();
        let settings = cmd
            .get_arguments()
            .find(|a| a.get_id() == "settings")
            .unwrap();
        let help = settings.get_help().unwrap().to_string();
        assert!(help.contains("--management-url"), "{help}");
    }

    #[test]
    fn overrides_require_settings_mode() {
        let res = Args::try_parse_from(["netbird-systray", "--management-url", "https://m.example"]);
        assert!(res.is_err());

        let args = Args::try_parse_from([
            "netbird-systray",
            "--settings",
            "--management-url",
            "https://m.example",
        ])
        .unwrap();
        assert_eq!(
            args.overrides().management_url.as_deref(),
            Some("https://m.example")
        );
    }

    #[test]
    fn release_checks_are_on_by_default() {
        let args = Args::try_parse_from(["netbird-systray"]).unwrap();
        assert_eq!(args.release_check_interval, 30 * 60);
        assert_eq!(args.release_url, DEFAULT_RELEASE_URL);
        assert!(args.latest_version.is_none());
    }
}
