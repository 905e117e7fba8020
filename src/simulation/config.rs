//! Run configuration loaded from a `config.toml` next to the scene file.

use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// Seed of every random model in the scene.
    #[serde(default)]
    pub seed: u64,
    /// Simulated time after which no event is processed. Absent means run until idle.
    pub stop_time_us: Option<u64>,
    /// Log level of this crate: off, error, warn, info, debug or trace.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Write every gain and path-loss trace record to stdout as a JSON line.
    #[serde(default)]
    pub trace_output: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            stop_time_us: None,
            log_level: default_log_level(),
            trace_output: false,
        }
    }
}

impl RunConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Returns
    /// * `Ok(RunConfig)` if the file was successfully loaded and parsed
    /// * `Err(String)` with a descriptive error message otherwise
    pub fn load(config_path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(config_path).map_err(|e| format!("Failed to read config file: {}", e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// Replaces the scene filename with "config.toml" in the same directory.
    pub fn config_path_from_scene(scene_path: &str) -> PathBuf {
        let scene = Path::new(scene_path);
        scene.parent().unwrap_or(Path::new(".")).join("config.toml")
    }

    /// `log_level` as a filter; unknown names fall back to `Info`.
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}
