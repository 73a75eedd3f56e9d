//! Single-instance guard for the tray.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use log::debug;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

const PID_FILE_NAME: &str = "netbird-systray.pid";

pub fn default_path() -> PathBuf {
    std::env::temp_dir().join(PID_FILE_NAME)
}

/// Fails if `path` names a live process other than this one, otherwise
/// claims the file for the current process.
pub fn check_pid_file(path: &Path) -> anyhow::Result<()> {
    let own = std::process::id();

    if let Ok(contents) = fs::read_to_string(path) {
        match contents.trim().parse::<i32>() {
            Ok(pid) if pid > 0 && pid as u32 != own && is_alive(pid) => {
                bail!("process already exists: {}", pid);
            }
            Ok(pid) => debug!("Stale PID file for {}, taking it over", pid),
            Err(_) => debug!("Unreadable PID file {:?}, overwriting", path),
        }
    }

    fs::write(path, own.to_string())
        .with_context(|| format!("Failed to write PID file: {:?}", path))
}

/// Signal 0 probes for existence without delivering anything.
fn is_alive(pid: i32) -> bool {
    matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}
