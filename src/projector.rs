//! Maps daemon observations onto tray affordances.
//!
//! [`project`] is pure: it only says what has to change. [`TrayView`] holds
//! the rendered state and is the one place effects are applied.

use crate::daemon::ConnectionStatus;

pub const APP_TITLE: &str = "NetBird";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Connected,
    Disconnected,
    Update,
    UpdateCloud,
}

impl Icon {
    pub fn for_status(status: ConnectionStatus) -> Self {
        match status {
            ConnectionStatus::Connected => Icon::Connected,
            ConnectionStatus::Disconnected => Icon::Disconnected,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Icon::Connected => "netbird-systray-connected",
            Icon::Disconnected => "netbird-systray-disconnected",
            Icon::Update => "netbird-systray-update",
            Icon::UpdateCloud => "netbird-systray-update-cloud",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    SetIcon(Icon),
    SetTooltip(String),
    SetStatusTitle(String),
    SetConnectEnabled(bool),
    SetDisconnectEnabled(bool),
    SetSettingsEnabled(bool),
    SetAboutIcon(Icon),
    SetDaemonVersion(String),
    SetUpdateVisible(bool),
}

/// Current and previous observation, plus the update flag after this poll.
#[derive(Debug, Clone)]
pub struct Projection<'a> {
    pub status: ConnectionStatus,
    pub previous_status: ConnectionStatus,
    pub version: &'a str,
    pub previous_version: &'a str,
    pub update_available: bool,
}

pub fn project(p: &Projection<'_>) -> Vec<UiEffect> {
    let mut effects = Vec::new();

    if p.status != p.previous_status {
        let (title, connected) = match p.status {
            ConnectionStatus::Connected => ("Connected", true),
            ConnectionStatus::Disconnected => ("Disconnected", false),
        };
        if !p.update_available {
            effects.push(UiEffect::SetIcon(Icon::for_status(p.status)));
            effects.push(UiEffect::SetAboutIcon(Icon::for_status(p.status)));
        }
        effects.push(UiEffect::SetTooltip(format!("{} ({})", APP_TITLE, title)));
        effects.push(UiEffect::SetStatusTitle(title.into()));
        effects.push(UiEffect::SetConnectEnabled(!connected));
        effects.push(UiEffect::SetDisconnectEnabled(connected));
    }

    if p.version != p.previous_version {
        effects.push(UiEffect::SetUpdateVisible(p.update_available));
        if p.update_available {
            effects.push(UiEffect::SetIcon(Icon::Update));
            effects.push(UiEffect::SetAboutIcon(Icon::UpdateCloud));
        } else {
            effects.push(UiEffect::SetIcon(Icon::for_status(p.status)));
            effects.push(UiEffect::SetAboutIcon(Icon::for_status(p.status)));
        }
        effects.push(UiEffect::SetDaemonVersion(normalized_version(p.version)));
    }

    effects
}

/// Effects for a release that became known outside of a status poll.
pub fn project_update_available() -> Vec<UiEffect> {
    vec![
        UiEffect::SetUpdateVisible(true),
        UiEffect::SetAboutIcon(Icon::UpdateCloud),
        UiEffect::SetIcon(Icon::Update),
    ]
}

pub fn normalized_version(version: &str) -> String {
    if version.starts_with(|c: char| c.is_ascii_digit()) {
        format!("v{}", version)
    } else {
        version.to_string()
    }
}

/// Everything the tray shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayView {
    pub icon: Icon,
    pub tooltip: String,
    pub status_title: String,
    pub connect_enabled: bool,
    pub disconnect_enabled: bool,
    pub settings_enabled: bool,
    pub about_icon: Icon,
    pub ui_version: String,
    pub daemon_version: Option<String>,
    pub update_visible: bool,
}

impl TrayView {
    pub fn new(ui_version: &str) -> Self {
        Self {
            icon: Icon::Disconnected,
            tooltip: APP_TITLE.into(),
            status_title: "Disconnected".into(),
            connect_enabled: true,
            disconnect_enabled: false,
            settings_enabled: true,
            about_icon: Icon::Disconnected,
            ui_version: normalized_version(ui_version),
            daemon_version: None,
            update_visible: false,
        }
    }

    pub fn apply(&mut self, effects: &[UiEffect]) {
        for effect in effects {
            match effect {
                UiEffect::SetIcon(icon) => self.icon = *icon,
                UiEffect::SetTooltip(t) => self.tooltip = t.clone(),
                UiEffect::SetStatusTitle(t) => self.status_title = t.clone(),
                UiEffect::SetConnectEnabled(on) => self.connect_enabled = *on,
                UiEffect::SetDisconnectEnabled(on) => self.disconnect_enabled = *on,
                UiEffect::SetSettingsEnabled(on) => self.settings_enabled = *on,
                UiEffect::SetAboutIcon(icon) => self.about_icon = *icon,
                UiEffect::SetDaemonVersion(v) => self.daemon_version = Some(v.clone()),
                UiEffect::SetUpdateVisible(on) => self.update_visible = *on,
            }
        }
    }
}
