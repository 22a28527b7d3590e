//! Configuration loading and parsing.
//!
//! Every field has a default, so an empty file (or none at all) is a valid configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::sequencer::Policy;

/// Written to the default location on first run.
pub const DEFAULT_CONFIG: &str = r#"[library]
index_paths = ["~/Music"]
database_path = "~/.cadence/library.sqlite"

[playback]
# queue_only | album_shuffle | artist_shuffle | track_shuffle
policy = "album_shuffle"
volume = 1.0
seek_step_secs = 1.0
fade_secs = 0.5
# device = "usb"
buffer_seconds = 2.0

[system]
log_file = "~/.cadence/cadence.log"
log_level = "info"

[appearance]
progress_fill = "="
progress_empty = " "
"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub library: LibraryConfig,
    pub playback: PlaybackConfig,
    pub system: SystemConfig,
    pub appearance: AppearanceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryConfig {
    /// Roots indexed at startup.
    pub index_paths: Vec<PathBuf>,
    pub database_path: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            index_paths: vec![PathBuf::from("~/Music")],
            database_path: PathBuf::from("~/.cadence/library.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaybackConfig {
    pub policy: Policy,
    /// Initial volume, clamped to `[0, 1]` when applied.
    pub volume: f32,
    pub seek_step_secs: f64,
    pub fade_secs: f64,
    /// Output device substring; the host default when unset.
    pub device: Option<String>,
    pub buffer_seconds: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            policy: Policy::AlbumShuffle,
            volume: 1.0,
            seek_step_secs: 1.0,
            fade_secs: 0.5,
            device: None,
            buffer_seconds: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    pub log_file: PathBuf,
    /// `tracing` filter directive; `RUST_LOG` wins when set.
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("~/.cadence/cadence.log"),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppearanceConfig {
    pub progress_fill: String,
    pub progress_empty: String,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            progress_fill: "=".to_string(),
            progress_empty: " ".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut cfg = toml::from_str::<Config>(raw)?;
        cfg.expand_paths();
        Ok(cfg)
    }

    /// Load `path`, or the default location (creating it from [`DEFAULT_CONFIG`] if missing).
    pub fn load_or_init(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let path = default_config_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create config dir {:?}", parent))?;
            }
            std::fs::write(&path, DEFAULT_CONFIG)
                .with_context(|| format!("write default config {:?}", path))?;
        }
        Self::load(&path)
    }

    fn expand_paths(&mut self) {
        for root in &mut self.library.index_paths {
            *root = expand_tilde(root);
        }
        self.library.database_path = expand_tilde(&self.library.database_path);
        self.system.log_file = expand_tilde(&self.system.log_file);
    }
}

pub fn default_config_path() -> PathBuf {
    expand_tilde(Path::new("~/.cadence/config.toml"))
}

/// Replace a leading `~` with the home directory. Other paths are returned unchanged.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
