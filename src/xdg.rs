use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Context;

fn base_dir(var: &str, home_relative: &str) -> anyhow::Result<PathBuf> {
    if let Some(dir) = std::env::var_os(var).filter(|os_str| !os_str.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home: OsString = std::env::var_os("HOME")
        .with_context(|| format!("Neither {} nor HOME is set", var))?;
    Ok(PathBuf::from(home).join(home_relative))
}

/// $XDG_CONFIG_HOME or $HOME/.config
pub fn config_home() -> anyhow::Result<PathBuf> {
    base_dir("XDG_CONFIG_HOME", ".config")
}

/// $XDG_DATA_HOME or $HOME/.local/share
pub fn data_home() -> anyhow::Result<PathBuf> {
    base_dir("XDG_DATA_HOME", ".local/share")
}

/// Application data directory, created if missing.
pub fn app_data_dir(app_name: &str) -> anyhow::Result<PathBuf> {
    let app_dir = data_home()?.join(app_name);

    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)
            .with_context(|| format!("Failed to create directory: {:?}", app_dir))?;
    }

    Ok(app_dir)
}
