//! Picture frame configuration management

use crate::scheduler::{SchedulerTiming, SlideState};
use crate::usb::WorkerSettings;
use anyhow::{Context, Result, anyhow};
use protocol::{DISPLAY_HEIGHT, DISPLAY_WIDTH};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    #[serde(default)]
    pub frame: FrameSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Slides in display order
    #[serde(default, rename = "screen")]
    pub screens: Vec<ScreenConfig>,
}

/// Device and output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSettings {
    #[serde(default = "FrameSettings::default_width")]
    pub width: u32,
    #[serde(default = "FrameSettings::default_height")]
    pub height: u32,
    #[serde(default = "FrameSettings::default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "FrameSettings::default_log_level")]
    pub log_level: String,
    /// Timeout for control and bulk transfers
    #[serde(default = "FrameSettings::default_transfer_timeout")]
    pub transfer_timeout_ms: u64,
    /// Rediscovery interval when the platform has no hotplug support
    #[serde(default = "FrameSettings::default_rescan_interval")]
    pub rescan_interval_secs: u64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            width: Self::default_width(),
            height: Self::default_height(),
            jpeg_quality: Self::default_jpeg_quality(),
            log_level: Self::default_log_level(),
            transfer_timeout_ms: Self::default_transfer_timeout(),
            rescan_interval_secs: Self::default_rescan_interval(),
        }
    }
}

impl FrameSettings {
    fn default_width() -> u32 {
        DISPLAY_WIDTH
    }

    fn default_height() -> u32 {
        DISPLAY_HEIGHT
    }

    fn default_jpeg_quality() -> u8 {
        90
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_transfer_timeout() -> u64 {
        5000
    }

    fn default_rescan_interval() -> u64 {
        5
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            transfer_timeout: Duration::from_millis(self.transfer_timeout_ms),
            rescan_interval: Duration::from_secs(self.rescan_interval_secs),
        }
    }
}

/// Cadence of the render and show activities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Delay between render ticks
    #[serde(default = "SchedulerSettings::default_render_tick")]
    pub render_tick_ms: u64,
    /// Show delay while the frame is unavailable
    #[serde(default = "SchedulerSettings::default_unavailable_backoff")]
    pub unavailable_backoff_ms: u64,
    /// Show delay while the current slide has no image
    #[serde(default = "SchedulerSettings::default_retry_tick")]
    pub retry_tick_ms: u64,
    /// Show ticks a slide without image may hold the cursor
    #[serde(default = "SchedulerSettings::default_show_retries")]
    pub show_retries: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            render_tick_ms: Self::default_render_tick(),
            unavailable_backoff_ms: Self::default_unavailable_backoff(),
            retry_tick_ms: Self::default_retry_tick(),
            show_retries: Self::default_show_retries(),
        }
    }
}

impl SchedulerSettings {
    fn default_render_tick() -> u64 {
        1000
    }

    fn default_unavailable_backoff() -> u64 {
        5000
    }

    fn default_retry_tick() -> u64 {
        1000
    }

    fn default_show_retries() -> u32 {
        3
    }

    pub fn timing(&self) -> SchedulerTiming {
        SchedulerTiming {
            render_tick: Duration::from_millis(self.render_tick_ms),
            unavailable_backoff: Duration::from_millis(self.unavailable_backoff_ms),
            retry_tick: Duration::from_millis(self.retry_tick_ms),
            show_retries: self.show_retries,
        }
    }
}

/// Kind of image source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScreenType {
    /// Still image from a file or an http(s) URL
    #[default]
    Image,
    /// Capture of a web page
    Html,
}

/// One configured image source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenConfig {
    #[serde(rename = "type", default)]
    pub kind: ScreenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Local path, may contain template placeholders and `~`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Minimum age of the cached image before it is rendered again
    #[serde(default = "ScreenConfig::default_refresh_seconds")]
    pub refresh_seconds: u64,
    /// Dwell time on the frame
    #[serde(default = "ScreenConfig::default_show_seconds")]
    pub show_seconds: u64,
    /// CSS selector to capture instead of the whole page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_element: Option<String>,
}

impl ScreenConfig {
    fn default_refresh_seconds() -> u64 {
        60
    }

    fn default_show_seconds() -> u64 {
        10
    }

    /// Image screen reading a local file
    pub fn image_file(location: impl Into<String>) -> Self {
        Self {
            kind: ScreenType::Image,
            url: None,
            location: Some(location.into()),
            refresh_seconds: Self::default_refresh_seconds(),
            show_seconds: Self::default_show_seconds(),
            dom_element: None,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame: FrameSettings::default(),
            scheduler: SchedulerSettings::default(),
            screens: vec![ScreenConfig::image_file("~/Pictures/photoframe.jpg")],
        }
    }
}

impl FrameConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-photoframe/config.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: FrameConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-photoframe").join("config.toml")
        } else {
            PathBuf::from(".config/usb-photoframe/config.toml")
        }
    }

    /// Fresh scheduling state for every configured screen
    pub fn slides(&self) -> Vec<SlideState> {
        self.screens
            .iter()
            .map(|screen| {
                SlideState::new(
                    Duration::from_secs(screen.refresh_seconds),
                    Duration::from_secs(screen.show_seconds),
                    self.scheduler.show_retries,
                )
            })
            .collect()
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.frame.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.frame.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(anyhow!(
                "Invalid display size {}x{}",
                self.frame.width,
                self.frame.height
            ));
        }

        if !(1..=100).contains(&self.frame.jpeg_quality) {
            return Err(anyhow!(
                "Invalid jpeg_quality {}, must be 1-100",
                self.frame.jpeg_quality
            ));
        }

        if self.scheduler.show_retries == 0 {
            return Err(anyhow!("show_retries must be at least 1"));
        }

        if self.screens.is_empty() {
            return Err(anyhow!("At least one [[screen]] must be configured"));
        }

        for (index, screen) in self.screens.iter().enumerate() {
            Self::validate_screen(index, screen)?;
        }

        Ok(())
    }

    fn validate_screen(index: usize, screen: &ScreenConfig) -> Result<()> {
        match screen.kind {
            ScreenType::Image if screen.url.is_none() && screen.location.is_none() => Err(anyhow!(
                "Screen {}: 'url' or 'location' is needed for image-type",
                index
            )),
            ScreenType::Html if screen.url.is_none() => Err(anyhow!(
                "Screen {}: 'url' is needed for html-type",
                index
            )),
            _ => Ok(()),
        }
    }
}
