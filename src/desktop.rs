use std::{future::Future, thread};

use anyhow::{bail, Context};
use log::debug;
use notify_rust::Notification;

use crate::daemon::DaemonAddr;

/// Side effects that leave the process: URLs, notifications, child windows.
pub trait Desktop: Send + Sync + 'static {
    fn open_url(&self, url: &str) -> anyhow::Result<()>;

    fn notify_failure(&self, summary: &str, err: &dyn std::fmt::Display);

    /// Runs the settings flow to completion and returns what it printed.
    fn run_settings(&self) -> impl Future<Output = anyhow::Result<String>> + Send;
}

pub struct SystemDesktop {
    daemon_addr: DaemonAddr,
}

impl SystemDesktop {
    pub fn new(daemon_addr: DaemonAddr) -> Self {
        Self { daemon_addr }
    }
}

impl Desktop for SystemDesktop {
    fn open_url(&self, url: &str) -> anyhow::Result<()> {
        debug!("Opening {}", url);
        open::that_detached(url).with_context(|| format!("Failed to open {}", url))
    }

    fn notify_failure(&self, summary: &str, err: &dyn std::fmt::Display) {
        let summary = summary.to_string();
        let body = err.to_string();
        thread::spawn(move || {
            let _ = Notification::new()
                .summary(&summary)
                .body(&body)
                .icon("network-error")
                .show();
        });
    }

    async fn run_settings(&self) -> anyhow::Result<String> {
        let exe = std::env::current_exe().context("Failed to get current executable path")?;
        let mut command = tokio::process::Command::new(&exe);
        command
            .arg("--settings")
            .arg("--daemon-addr")
            .arg(self.daemon_addr.to_string());

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed executing command {:?}", command))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            bail!("settings exited with {}: {}", output.status, text.trim());
        }
        Ok(text)
    }
}
