use std::path::PathBuf;

use ksni::{
    menu::{Disposition, MenuItem, StandardItem, SubMenu},
    ToolTip, Tray,
};
use log::{debug, warn};
use tokio::sync::{mpsc, watch};

use crate::dispatcher::MenuEvent;
use crate::icons::APP_NAME;
use crate::projector::TrayView;

/// The StatusNotifierItem. It only renders the published view; clicks are
/// forwarded to the dispatcher as [`MenuEvent`]s.
pub struct NetbirdTray {
    view: TrayView,
    icon_dir: Option<PathBuf>,
    events: mpsc::UnboundedSender<MenuEvent>,
}

impl NetbirdTray {
    pub fn new(
        view: TrayView,
        icon_dir: Option<PathBuf>,
        events: mpsc::UnboundedSender<MenuEvent>,
    ) -> Self {
        Self {
            view,
            icon_dir,
            events,
        }
    }

    fn send(&self, event: MenuEvent) {
        if self.events.send(event).is_err() {
            warn!("Dispatcher is gone, dropping {:?}", event);
        }
    }
}

fn item(label: &str, enabled: bool, event: MenuEvent) -> MenuItem<NetbirdTray> {
    StandardItem {
        label: label.into(),
        enabled,
        activate: Box::new(move |this: &mut NetbirdTray| this.send(event)),
        ..Default::default()
    }
    .into()
}

fn label(text: String) -> MenuItem<NetbirdTray> {
    StandardItem {
        label: text,
        enabled: false,
        ..Default::default()
    }
    .into()
}

impl Tray for NetbirdTray {
    const MENU_ON_ACTIVATE: bool = true;

    fn id(&self) -> String {
        APP_NAME.into()
    }

    fn title(&self) -> String {
        self.view.tooltip.clone()
    }

    fn icon_theme_path(&self) -> String {
        self.icon_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default()
    }

    fn icon_name(&self) -> String {
        self.view.icon.name().into()
    }

    fn tool_tip(&self) -> ToolTip {
        ToolTip {
            title: self.view.tooltip.clone(),
            description: self.view.status_title.clone(),
            icon_name: String::new(),
            icon_pixmap: Vec::new(),
        }
    }

    fn menu(&self) -> Vec<MenuItem<Self>> {
        let view = &self.view;

        let mut about = vec![label(format!("GUI: {}", view.ui_version))];
        if let Some(daemon) = &view.daemon_version {
            about.push(label(format!("Daemon: {}", daemon)));
        }
        about.push(
            StandardItem {
                label: "Download latest version".into(),
                visible: view.update_visible,
                disposition: Disposition::Informative,
                activate: Box::new(|this: &mut Self| this.send(MenuEvent::OpenUpdateLink)),
                ..Default::default()
            }
            .into(),
        );

        vec![
            label(view.status_title.clone()),
            MenuItem::Separator,
            item("Connect", view.connect_enabled, MenuEvent::Connect),
            item("Disconnect", view.disconnect_enabled, MenuEvent::Disconnect),
            MenuItem::Separator,
            item("Admin Panel", true, MenuEvent::OpenAdminPanel),
            item("Settings", view.settings_enabled, MenuEvent::OpenSettings),
            MenuItem::Separator,
            SubMenu {
                label: "About".into(),
                icon_name: view.about_icon.name().into(),
                submenu: about,
                ..Default::default()
            }
            .into(),
            MenuItem::Separator,
            StandardItem {
                label: "Quit".into(),
                icon_name: "application-exit".into(),
                activate: Box::new(|this: &mut Self| this.send(MenuEvent::Quit)),
                ..Default::default()
            }
            .into(),
        ]
    }
}

/// Pushes every published view into the running tray.
pub async fn render(handle: ksni::Handle<NetbirdTray>, mut views: watch::Receiver<TrayView>) {
    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        debug!("Rendering {:?}", view.status_title);
        if handle
            .update(move |tray: &mut NetbirdTray| tray.view = view)
            .await
            .is_none()
        {
            warn!("Tray service has shut down");
            break;
        }
    }
}
