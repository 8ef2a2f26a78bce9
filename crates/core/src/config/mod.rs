use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{FrameError, Result};

/// Top-level configuration snapshot for the frame server.
///
/// The configuration is loaded once and passed by value into the components
/// that need it; applying a new configuration happens through explicit
/// `apply_config` calls rather than ambient global state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameConfig {
    #[serde(default)]
    pub carousel: CarouselConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

impl FrameConfig {
    /// Parses a configuration snapshot from its JSON representation.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| FrameError::msg(format!("invalid configuration: {err}")))
    }
}

/// Configuration specific to the carousel scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarouselConfig {
    /// Default rotation interval in whole minutes. Clamped to at least one.
    #[serde(default = "default_minutes")]
    pub minutes: u64,
    /// Whether the carousel should start rotating as soon as the server boots.
    #[serde(default)]
    pub autostart: bool,
}

impl Default for CarouselConfig {
    fn default() -> Self {
        Self {
            minutes: default_minutes(),
            autostart: false,
        }
    }
}

impl CarouselConfig {
    /// Returns the configured rotation interval as a duration.
    ///
    /// Saturates rather than overflowing, so an absurdly large `minutes`
    /// value degrades to "effectively never" instead of wrapping.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.minutes.max(1).saturating_mul(60))
    }
}

/// Default render parameters for dashboard previews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_layout")]
    pub layout: String,
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            layout: default_layout(),
            theme: default_theme(),
        }
    }
}

fn default_minutes() -> u64 {
    5
}

fn default_layout() -> String {
    "default".to_string()
}

fn default_theme() -> String {
    "ink".to_string()
}
