//! Viewer settings loaded from a TOML file.
//!
//! Every field has a default, so a missing file or a partial file is fine.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::SpeedTier;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/listing";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listing: ListingSettings,
    pub playback: PlaybackSettings,
    pub sources: Vec<SourceLayers>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSettings {
    pub endpoint: String,
    /// Added to the server's refresh timestamp before polling again.
    pub refresh_pad_ms: u64,
    /// Lower bound on the wait between two successful refreshes.
    pub min_refresh_delay_ms: u64,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Attempts per refresh for retryable HTTP failures.
    pub attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub slow_period_ms: u64,
    pub medium_period_ms: u64,
    pub fast_period_ms: u64,
    pub initial_tier: SpeedTier,
    pub initial_zoom: i32,
}

/// Static background and overlay images for one radar source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLayers {
    pub name: String,
    pub background: String,
    pub overlay: String,
}

impl SourceLayers {
    fn for_product(code: &str) -> Self {
        Self {
            name: code.to_string(),
            background: format!("res/{code}.background.png"),
            overlay: format!("res/{code}.locations.png"),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listing: ListingSettings::default(),
            playback: PlaybackSettings::default(),
            sources: ["IDR042", "IDR043", "IDR044"]
                .into_iter()
                .map(SourceLayers::for_product)
                .collect(),
        }
    }
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            refresh_pad_ms: 5_000,
            min_refresh_delay_ms: 1_000,
            retry_initial_ms: 2_000,
            retry_max_ms: 60_000,
            connect_timeout_ms: 3_000,
            read_timeout_ms: 5_000,
            attempts: 2,
        }
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            slow_period_ms: 500,
            medium_period_ms: 200,
            fast_period_ms: 80,
            initial_tier: SpeedTier::Medium,
            initial_zoom: 2,
        }
    }
}

impl PlaybackSettings {
    pub fn period(&self, tier: SpeedTier) -> Duration {
        let ms = match tier {
            SpeedTier::Slow => self.slow_period_ms,
            SpeedTier::Medium => self.medium_period_ms,
            SpeedTier::Fast => self.fast_period_ms,
        };
        Duration::from_millis(ms)
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let playback = &self.playback;
        let periods = [
            playback.slow_period_ms,
            playback.medium_period_ms,
            playback.fast_period_ms,
        ];
        if periods.contains(&0) {
            return Err(ConfigError::Invalid(
                "playback periods must be greater than zero".to_string(),
            ));
        }

        let listing = &self.listing;
        if listing.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("listing endpoint is empty".to_string()));
        }
        if listing.retry_initial_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry_initial_ms must be greater than zero".to_string(),
            ));
        }
        if listing.retry_max_ms < listing.retry_initial_ms {
            return Err(ConfigError::Invalid(format!(
                "retry_max_ms ({}) is smaller than retry_initial_ms ({})",
                listing.retry_max_ms, listing.retry_initial_ms
            )));
        }
        Ok(())
    }
}
