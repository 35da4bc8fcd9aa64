use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::info;
use serde::{Deserialize, Serialize};

use crate::broadcast::ListenerId;
use crate::error::{Result, SpeakerError};

/// Per-speaker settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SpeakerConfig {
    pub volume: f32,
    pub spatial: bool,
    pub position: [f32; 3],
    #[serde(rename = "loop")]
    pub looping: bool,
    pub shuffle: bool,
    pub continue_after_finish: bool,
    pub should_play: bool,
    pub allow_url: bool,
    pub clear_on_finish: bool,
    /// If not empty, frames only go to these listeners.
    pub broadcast_to: Vec<ListenerId>,
    pub allowed_extensions: Vec<String>,
    pub failure_delay_ms: u64,
    pub ring_capacity: usize,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        SpeakerConfig {
            volume: 1.0,
            spatial: false,
            position: [0.0; 3],
            looping: false,
            shuffle: false,
            continue_after_finish: true,
            should_play: true,
            allow_url: false,
            clear_on_finish: false,
            broadcast_to: vec![],
            allowed_extensions: vec!["ogg".into()],
            failure_delay_ms: 1000,
            ring_capacity: 48000,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PeerConfig {
    pub id: ListenerId,
    pub addr: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub bind: String,
    pub tick_ms: u64,
    pub listeners: Vec<PeerConfig>,
    pub playlist: Vec<String>,
    pub speaker: SpeakerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind: "0.0.0.0:0".into(),
            tick_ms: 20,
            listeners: vec![],
            playlist: vec![],
            speaker: SpeakerConfig::default(),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "speakercast", "speakercast")
        .ok_or_else(|| SpeakerError::Config("no home directory for config".into()))?;
    Ok(proj_dirs.config_dir().join("config.json"))
}

pub fn load_from(path: &Path) -> Result<AppConfig> {
    let file = File::open(path)?;
    let config: AppConfig = serde_json::from_reader(file)?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Loads `path`, writing the defaults there first if it does not exist.
pub fn load_or_create(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        return load_from(path);
    }
    info!("creating and saving default config at {}", path.display());
    let config = AppConfig::default();
    save_config(&config, path)?;
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, config)?;
    Ok(())
}
