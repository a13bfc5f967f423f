//! Configuration management for segue-player
//!
//! One TOML bootstrap file, every field defaulted. Command-line flags
//! override the port and producer URL after the file is loaded.
//!
//! ```toml
//! port = 5750
//! producer_url = "http://localhost:8000"
//!
//! [logging]
//! level = "info"
//!
//! [playback]
//! prefetch_threshold_secs = 60.0
//! overlap_window_ms = 200
//!
//! [media]
//! autoplay = "require_gesture"
//! ```

use crate::error::{Error, Result};
use crate::playback::{PrefetchThreshold, RetryPolicy};
use segue_common::time::secs_to_duration;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SEGUE_CONFIG";

/// Directory name under the user config dir
pub const APP_NAME: &str = "segue";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// HTTP server port
    pub port: u16,

    /// Base URL relative locators are resolved against
    pub producer_url: String,

    pub logging: LoggingConfig,
    pub playback: PlaybackSettings,
    pub media: MediaSettings,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            port: 5750,
            producer_url: "http://localhost:8000".to_string(),
            logging: LoggingConfig::default(),
            playback: PlaybackSettings::default(),
            media: MediaSettings::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    pub level: String,
}

impl LoggingConfig {
    /// `EnvFilter` directives applying `level` to the player and its libraries
    pub fn filter_directives(&self) -> String {
        let level = self.level.trim();
        format!("segue_player={level},segue_common={level},tower_http={level}")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Scheduling parameters of the playback controller
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Remaining time at which the next segment starts loading
    pub prefetch_threshold_secs: f64,

    /// When set, prefetch at this fraction of the segment duration instead
    pub prefetch_fraction: Option<f64>,

    /// Remaining time at which the preloaded segment is started
    pub overlap_window_ms: u64,

    /// Upcoming segments below which the producer is asked for more
    pub min_queue: usize,

    /// Failures after which a segment is abandoned
    pub max_retries: u32,

    /// Delay before retrying a failed segment
    pub retry_backoff_ms: u64,

    /// Minimum spacing of replenishment signals
    pub replenish_cooldown_secs: f64,

    /// Ceiling on waiting for a segment to become ready
    pub load_timeout_secs: f64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            prefetch_threshold_secs: 60.0,
            prefetch_fraction: None,
            overlap_window_ms: 200,
            min_queue: 2,
            max_retries: 2,
            retry_backoff_ms: 1000,
            replenish_cooldown_secs: 10.0,
            load_timeout_secs: 15.0,
        }
    }
}

/// Whether the media backend may start audio without a user gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutoplayPolicy {
    #[default]
    Allowed,
    RequireGesture,
}

/// Media backend parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    /// Size of the initial range read used to probe a segment
    pub probe_bytes: u64,

    /// Interval between position ticks of a playing segment
    pub position_interval_ms: u64,

    pub autoplay: AutoplayPolicy,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            probe_bytes: 256 * 1024,
            position_interval_ms: 50,
            autoplay: AutoplayPolicy::Allowed,
        }
    }
}

/// Controller parameters with units resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub prefetch: PrefetchThreshold,
    pub overlap_window: Duration,
    pub min_queue: usize,
    pub retry: RetryPolicy,
    pub replenish_cooldown: Duration,
    pub load_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            prefetch: PrefetchThreshold::Fixed(Duration::from_secs(60)),
            overlap_window: Duration::from_millis(200),
            min_queue: 2,
            retry: RetryPolicy::default(),
            replenish_cooldown: Duration::from_secs(10),
            load_timeout: Duration::from_secs(15),
        }
    }
}

impl PlaybackSettings {
    /// Validate and convert to controller parameters
    pub fn to_controller_config(&self) -> Result<ControllerConfig> {
        if self.overlap_window_ms == 0 {
            return Err(Error::Config("overlap_window_ms must be positive".to_string()));
        }
        if self.min_queue == 0 {
            return Err(Error::Config("min_queue must be at least 1".to_string()));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".to_string()));
        }
        if !(self.load_timeout_secs.is_finite() && self.load_timeout_secs > 0.0) {
            return Err(Error::Config(format!(
                "load_timeout_secs must be positive, got {}",
                self.load_timeout_secs
            )));
        }
        if !(self.replenish_cooldown_secs.is_finite() && self.replenish_cooldown_secs >= 0.0) {
            return Err(Error::Config(format!(
                "replenish_cooldown_secs must not be negative, got {}",
                self.replenish_cooldown_secs
            )));
        }

        let prefetch = match self.prefetch_fraction {
            Some(fraction) if fraction > 0.0 && fraction <= 1.0 => {
                PrefetchThreshold::Fraction(fraction)
            }
            Some(fraction) => {
                return Err(Error::Config(format!(
                    "prefetch_fraction must be in (0, 1], got {}",
                    fraction
                )))
            }
            None => PrefetchThreshold::Fixed(secs_to_duration(self.prefetch_threshold_secs)),
        };

        Ok(ControllerConfig {
            prefetch,
            overlap_window: Duration::from_millis(self.overlap_window_ms),
            min_queue: self.min_queue,
            retry: RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_backoff_ms)),
            replenish_cooldown: secs_to_duration(self.replenish_cooldown_secs),
            load_timeout: secs_to_duration(self.load_timeout_secs),
        })
    }
}

impl PlayerConfig {
    /// Load configuration, following the common resolution order
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = segue_common::config::resolve_config_path(cli_path, CONFIG_ENV_VAR, APP_NAME);
        let config: PlayerConfig = segue_common::config::load_toml_or_default(path.as_deref())?;
        // Fail at startup, not on the first segment
        config.playback.to_controller_config()?;
        Ok(config)
    }
}
