use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::game::{GameCode, GameSettings};

/// Defaults remembered between runs. Command-line flags take precedence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub round_count: usize,
    pub time_limit_ms: u64,
    pub nback_level: u32,
    pub rotation_round: u32,
    pub rps_round: u32,
    pub pressing_round: u32,
    /// 0 ramps the mouse count up over the session.
    pub chase_difficulty: u32,
    pub real_mode: bool,
    pub db_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            round_count: 10,
            time_limit_ms: 3000,
            nback_level: 1,
            rotation_round: 1,
            rps_round: 1,
            pressing_round: 1,
            chase_difficulty: 0,
            real_mode: false,
            db_path: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn level_for(&self, game: GameCode) -> u32 {
        match game {
            GameCode::NBack => self.nback_level,
            GameCode::ShapeRotation => self.rotation_round,
            GameCode::Rps => self.rps_round,
            GameCode::NumberPressing => self.pressing_round,
            GameCode::CatChaser => self.chase_difficulty,
            GameCode::CountComparison => GameCode::CountComparison.default_level(),
        }
    }

    pub fn set_level(&mut self, game: GameCode, level: u32) {
        let slot = match game {
            GameCode::NBack => &mut self.nback_level,
            GameCode::ShapeRotation => &mut self.rotation_round,
            GameCode::Rps => &mut self.rps_round,
            GameCode::NumberPressing => &mut self.pressing_round,
            GameCode::CatChaser => &mut self.chase_difficulty,
            // single level, nothing to remember
            GameCode::CountComparison => return,
        };
        *slot = level;
    }

    pub fn settings_for(&self, game: GameCode) -> GameSettings {
        GameSettings {
            round_count: self.round_count,
            time_limit_ms: self.time_limit_ms,
            level: self.level_for(game),
            real_mode: self.real_mode,
            ..GameSettings::default()
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "cogtrial") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("cogtrial_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// Missing or unreadable files fall back to defaults.
    fn load(&self) -> Config {
        fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Config>(&bytes).ok())
            .unwrap_or_default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
