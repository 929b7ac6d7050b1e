//! Application-level configuration loading for the coordination core.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BUZZCONTROL_BACK_CONFIG_PATH";

/// Upper bound on simultaneously connected buzzer devices.
const DEFAULT_MAX_BUZZERS: usize = 10;
/// Grace period before an unidentified transport is closed with code 4001.
const DEFAULT_IDENTIFICATION_TIMEOUT_SECS: u64 = 30;
/// Period of the liveness sweep over connected peers.
const DEFAULT_HEARTBEAT_PERIOD_SECS: u64 = 30;
/// Simultaneity window during which concurrent buzzes are collected.
const DEFAULT_BUZZ_WINDOW_MS: u64 = 200;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Maximum number of buzzer devices admitted into the registry.
    pub max_buzzers: usize,
    /// Directory holding the question/jingle catalog files.
    pub data_dir: PathBuf,
    /// Root directory jingle audio files are served from.
    pub jingle_root: PathBuf,
    /// Append-only file where answer results are recorded.
    pub results_path: PathBuf,
    /// Deadline for the first identification frame.
    pub identification_timeout: Duration,
    /// Interval between liveness sweeps.
    pub heartbeat_period: Duration,
    /// Buzz arbitration window.
    pub buzz_window: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    max_buzzers: Option<usize>,
    data_dir: Option<PathBuf>,
    jingle_root: Option<PathBuf>,
    results_path: Option<PathBuf>,
    identification_timeout_secs: Option<u64>,
    heartbeat_period_secs: Option<u64>,
    buzz_window_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let data_dir = raw.data_dir.unwrap_or_else(|| PathBuf::from("data"));
        let jingle_root = raw.jingle_root.unwrap_or_else(|| data_dir.join("jingles"));
        let results_path = raw
            .results_path
            .unwrap_or_else(|| data_dir.join("results.jsonl"));
        Self {
            max_buzzers: raw.max_buzzers.unwrap_or(DEFAULT_MAX_BUZZERS),
            data_dir,
            jingle_root,
            results_path,
            identification_timeout: Duration::from_secs(
                raw.identification_timeout_secs
                    .unwrap_or(DEFAULT_IDENTIFICATION_TIMEOUT_SECS),
            ),
            heartbeat_period: Duration::from_secs(
                raw.heartbeat_period_secs
                    .unwrap_or(DEFAULT_HEARTBEAT_PERIOD_SECS),
            ),
            buzz_window: Duration::from_millis(
                raw.buzz_window_ms.unwrap_or(DEFAULT_BUZZ_WINDOW_MS),
            ),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
