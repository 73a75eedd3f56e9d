//! Bundled tray icons and desktop integration files.

use std::{
    fs::File,
    io::Write,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::{debug, info, warn};
use rust_embed::Embed;

use crate::xdg;

pub const APP_NAME: &str = "netbird-systray";

#[derive(Embed)]
#[folder = "icons/"]
struct Icons;

/// Writes the bundled icons where the tray host can find them and returns
/// the directory to use as the icon theme path.
pub fn extract_theme() -> anyhow::Result<PathBuf> {
    let dir = xdg::app_data_dir(APP_NAME)?.join("icons");
    write_icons(&dir)?;
    Ok(dir)
}

/// Installs icons, a desktop entry and an autostart link for the current user.
pub fn local_install() -> anyhow::Result<()> {
    let data_home = xdg::data_home()?;

    let icons = data_home.join("icons/hicolor/scalable/apps");
    let count = write_icons(&icons)?;
    info!("Installed {} icons into {:?}", count, icons);
    refresh_icon_cache();

    let exe = std::env::current_exe().context("Failed to get current executable path")?;
    let desktop_file = write_desktop_entry(&data_home.join("applications"), &exe)?;
    info!("Installed desktop file: {:?}", desktop_file);

    let autostart_dir = xdg::config_home()?.join("autostart");
    let autostart_file = link_autostart(&autostart_dir, &desktop_file)?;
    info!("Installed autostart symlink: {:?}", autostart_file);

    Ok(())
}

fn write_icons(dir: &Path) -> anyhow::Result<usize> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {:?}", dir))?;

    let mut count = 0;
    for name in Icons::iter() {
        let relpath = PathBuf::from(name.as_ref());
        let (Some(file_name), Some(_)) = (relpath.file_name(), relpath.extension()) else {
            continue;
        };
        let Some(icon) = Icons::get(&name) else {
            continue;
        };
        let path = dir.join(file_name);
        std::fs::write(&path, icon.data)
            .with_context(|| format!("Failed to write icon to: {:?}", path))?;
        debug!("Wrote icon {:?}", path);
        count += 1;
    }
    Ok(count)
}

fn refresh_icon_cache() {
    match std::process::Command::new("xdg-icon-resource")
        .arg("forceupdate")
        .output()
    {
        Ok(output) if output.status.success() => info!("Icon cache updated"),
        Ok(_) => warn!("Failed to update icon cache"),
        Err(_) => warn!("Failed to run xdg-icon-resource"),
    }
}

fn write_desktop_entry(applications: &Path, exe: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(applications)
        .with_context(|| format!("Failed to create directory: {:?}", applications))?;

    let desktop_file = applications.join(format!("{}.desktop", APP_NAME));
    let mut file = File::create(&desktop_file)
        .with_context(|| format!("Failed to create desktop file: {:?}", desktop_file))?;

    file.write_all(
        br#"[Desktop Entry]
Type=Application
Name=NetBird
Comment=NetBird VPN indicator (using StatusNotifierItem)
Exec="#,
    )?;
    file.write_all(exe.as_os_str().as_bytes())?;
    file.write_all(
        br#"
Icon=netbird-systray-disconnected
Terminal=false
Categories=Network;Utility;
StartupNotify=false
"#,
    )?;

    Ok(desktop_file)
}

fn link_autostart(autostart_dir: &Path, desktop_file: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(autostart_dir)
        .with_context(|| format!("Failed to create directory: {:?}", autostart_dir))?;

    let autostart_file = autostart_dir.join(format!("{}.desktop", APP_NAME));
    if autostart_file.symlink_metadata().is_ok() {
        std::fs::remove_file(&autostart_file)
            .with_context(|| format!("Failed to replace {:?}", autostart_file))?;
    }
    std::os::unix::fs::symlink(desktop_file, &autostart_file)
        .with_context(|| format!("Failed to create symlink: {:?}", autostart_file))?;

    Ok(autostart_file)
}
