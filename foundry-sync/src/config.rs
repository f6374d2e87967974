//! Auto-sync configuration.
//!
//! [`SyncTimings`] holds the engine's tuning constants. [`AutoSyncConfig`] is
//! the live, user-editable state (enabled flag, namespace, selection) that the
//! rest of the application mutates while cycles are running.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Quiet period after the last edit before a cycle runs.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);

/// Delays before each retry of a failed save.
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 5] = [500, 2_000, 5_000, 10_000, 20_000];

/// How long after a successful sync the remote conflict check is skipped.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(60);

/// Timing constants for the auto-sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncTimings {
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Retry backoff schedule in milliseconds.
    pub retry_delays_ms: Vec<u64>,
    /// Freshness window in milliseconds.
    pub freshness_window_ms: u64,
}

impl SyncTimings {
    /// Returns the debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Returns the retry backoff schedule.
    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    /// Returns the freshness window.
    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }

    /// Sets the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    /// Sets the retry backoff schedule.
    pub fn with_retry_delays(mut self, delays: &[Duration]) -> Self {
        self.retry_delays_ms = delays.iter().map(|d| d.as_millis() as u64).collect();
        self
    }

    /// Sets the freshness window.
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window_ms = window.as_millis() as u64;
        self
    }
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            retry_delays_ms: DEFAULT_RETRY_DELAYS_MS.to_vec(),
            freshness_window_ms: DEFAULT_FRESHNESS_WINDOW.as_millis() as u64,
        }
    }
}

/// Serializable view of [`AutoSyncConfig`], used to persist user settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoSyncSettings {
    /// Whether auto-sync is switched on.
    pub enabled: bool,
    /// Remote namespace (folder) factories are written to.
    pub namespace: String,
    /// Factories selected for auto-sync, in save order.
    pub selected_entities: Vec<String>,
}

#[derive(Debug, Default)]
struct ConfigState {
    settings: AutoSyncSettings,
    suspended: bool,
    global_error: Option<String>,
}

/// Live auto-sync settings shared between the UI and the engine.
#[derive(Debug, Default)]
pub struct AutoSyncConfig {
    state: RwLock<ConfigState>,
}

impl AutoSyncConfig {
    /// Creates a disabled configuration with no namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from persisted settings.
    pub fn from_settings(settings: AutoSyncSettings) -> Self {
        Self {
            state: RwLock::new(ConfigState {
                settings,
                ..Default::default()
            }),
        }
    }

    /// Returns a copy of the persisted settings.
    pub async fn settings(&self) -> AutoSyncSettings {
        self.state.read().await.settings.clone()
    }

    /// Returns whether auto-sync is enabled.
    pub async fn enabled(&self) -> bool {
        self.state.read().await.settings.enabled
    }

    /// Switches auto-sync on or off.
    pub async fn set_enabled(&self, enabled: bool) {
        debug!("Auto-sync enabled: {}", enabled);
        self.state.write().await.settings.enabled = enabled;
    }

    /// Returns the remote namespace; empty when none is chosen.
    pub async fn namespace(&self) -> String {
        self.state.read().await.settings.namespace.clone()
    }

    /// Sets the remote namespace.
    pub async fn set_namespace(&self, namespace: impl Into<String>) {
        self.state.write().await.settings.namespace = namespace.into();
    }

    /// Returns the selected factories in save order.
    pub async fn selected_entities(&self) -> Vec<String> {
        self.state.read().await.settings.selected_entities.clone()
    }

    /// Replaces the selection.
    pub async fn set_selected_entities(&self, names: Vec<String>) {
        self.state.write().await.settings.selected_entities = names;
    }

    /// Returns whether `name` is selected.
    pub async fn is_selected(&self, name: &str) -> bool {
        self.state
            .read()
            .await
            .settings
            .selected_entities
            .iter()
            .any(|n| n == name)
    }

    /// Appends `name` to the selection if absent.
    pub async fn select(&self, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.state.write().await;
        if !state.settings.selected_entities.contains(&name) {
            state.settings.selected_entities.push(name);
        }
    }

    /// Removes `name` from the selection.
    pub async fn deselect(&self, name: &str) {
        self.state
            .write()
            .await
            .settings
            .selected_entities
            .retain(|n| n != name);
    }

    /// Returns whether auto-sync is temporarily suspended.
    pub async fn is_suspended(&self) -> bool {
        self.state.read().await.suspended
    }

    /// Pauses auto-sync without touching the user's enabled setting, e.g.
    /// while a restore overwrites local factories.
    pub async fn suspend(&self) {
        self.state.write().await.suspended = true;
    }

    /// Lifts a previous [`suspend`](Self::suspend).
    pub async fn resume(&self) {
        self.state.write().await.suspended = false;
    }

    /// Publishes a user-visible sync error.
    pub async fn set_global_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("Sync error: {}", message);
        self.state.write().await.global_error = Some(message);
    }

    /// Returns the current user-visible sync error.
    pub async fn global_error(&self) -> Option<String> {
        self.state.read().await.global_error.clone()
    }

    /// Dismisses the user-visible sync error.
    pub async fn clear_global_error(&self) {
        self.state.write().await.global_error = None;
    }
}
