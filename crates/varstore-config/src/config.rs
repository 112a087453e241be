/// Application configuration: load, save, sanitize, and data dir resolution.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "VARSTORE_DATA_DIR";

/// Default tracing filter when none is configured.
const DEFAULT_LOG_FILTER: &str = "info";

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the database. Empty = platform default.
    pub data_dir: String,
    /// Whether variables and history are stored on disk.
    /// When false everything lives in memory and is lost on exit.
    pub persist: bool,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            persist: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    /// Returns the config file path: exe directory + `varstore.json`.
    pub fn config_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.join("varstore.json")))
            .unwrap_or_else(|| PathBuf::from("varstore.json"))
    }

    /// Loads config from `path`, creating a default file if it doesn't exist.
    ///
    /// Falls back to defaults on any error (unreadable file, parse error,
    /// etc.) and returns the problem alongside, so the caller can report it
    /// once logging is up.
    pub fn load_or_create(path: &Path) -> (Self, Option<String>) {
        if path.exists() {
            let problem = match std::fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                    Ok(mut config) => {
                        config.sanitize();
                        return (config, None);
                    }
                    Err(e) => format!("Failed to parse config at {}: {e}", path.display()),
                },
                Err(e) => format!("Failed to read config at {}: {e}", path.display()),
            };
            // Return defaults on error (don't overwrite broken file)
            (Self::default(), Some(problem))
        } else {
            let config = Self::default();
            let problem = config.save(path).err().map(|e| {
                format!("Failed to create default config at {}: {e}", path.display())
            });
            (config, problem)
        }
    }

    /// Saves config to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Resets blank fields to their defaults.
    pub fn sanitize(&mut self) {
        self.data_dir = self.data_dir.trim().to_string();
        if self.log_filter.trim().is_empty() {
            self.log_filter = DEFAULT_LOG_FILTER.to_string();
        }
    }

    /// Effective data directory for this config.
    ///
    /// Resolution order:
    /// 1. `VARSTORE_DATA_DIR` environment variable
    /// 2. `data_dir` from the config file (if non-empty)
    /// 3. Platform local data directory + `varstore`
    /// 4. `.data/` directory next to the executable
    pub fn resolve_data_dir(&self) -> PathBuf {
        let env_dir = std::env::var(DATA_DIR_ENV).ok();
        resolve_data_dir(env_dir.as_deref(), &self.data_dir)
    }
}

/// Picks the data directory from an env override and a configured value.
pub fn resolve_data_dir(env_dir: Option<&str>, configured: &str) -> PathBuf {
    if let Some(dir) = env_dir.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    if !configured.is_empty() {
        return PathBuf::from(configured);
    }
    if let Some(dir) = dirs::data_local_dir() {
        return dir.join("varstore");
    }
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    exe.parent().unwrap_or(Path::new(".")).join(".data")
}
