/*!
 * User-facing settings and their change notification.
 *
 * Settings are read once at startup (from `Config`) and then replaced whenever
 * the configuration surface pushes a "settings changed" notification. Readers
 * always take a fresh snapshot, so an update applies to the next event.
 */

use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Settings that can change while the pipeline is running
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Language translations are produced in
    pub target_language: String,
    /// Whether detected content is translated without user action
    pub auto_translate_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_language: "zh".to_string(),
            auto_translate_enabled: true,
        }
    }
}

/// Shared, observable settings cell
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    sender: watch::Sender<Settings>,
}

impl SettingsHandle {
    pub fn new(initial: Settings) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Current settings
    pub fn snapshot(&self) -> Settings {
        self.sender.borrow().clone()
    }

    /// Apply a "settings changed" notification
    pub fn update(&self, settings: Settings) {
        info!(
            "Settings updated: target={}, auto_translate={}",
            settings.target_language, settings.auto_translate_enabled
        );
        self.sender.send_replace(settings);
    }

    /// Receiver that wakes on every update
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.sender.subscribe()
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
