use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::store::StorePreference;

/// Retry policy parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum consecutive failed chunk attempts before giving up. Omit for no limit.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Base delay in seconds for exponential backoff (e.g. 1.5 = 1500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Random spread applied to each delay, as a fraction (0.2 = +/-20%).
    #[serde(default)]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(12),
            base_delay_secs: 1.5,
            max_delay_secs: 60,
            jitter: 0.2,
        }
    }
}

/// Network conditions and admission defaults (optional `[network]` section).
///
/// On a desktop there is no browser connection API, so the values here are
/// what the engine assumes unless the host feeds live values through
/// [`crate::admission::SharedNetwork`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Effective connection type: "slow-2g", "2g", "3g" or "4g".
    #[serde(default)]
    pub effective_type: Option<String>,
    /// Downlink estimate in Mbit/s.
    #[serde(default)]
    pub downlink_mbps: Option<f64>,
    /// Whether the user asked to save data.
    #[serde(default)]
    pub save_data: bool,
    /// Allow transfers on 2g/3g class connections.
    #[serde(default)]
    pub allow_on_cellular: bool,
    /// Refuse to start while `save_data` is set.
    #[serde(default = "default_true")]
    pub respect_save_data: bool,
    /// Refuse to start below this downlink estimate.
    #[serde(default)]
    pub min_downlink_mbps: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            effective_type: None,
            downlink_mbps: None,
            save_data: false,
            allow_on_cellular: false,
            respect_save_data: true,
            min_downlink_mbps: Some(2.0),
        }
    }
}

/// Global configuration loaded from `~/.config/idlefetch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Maximum number of prefetch tasks the manager runs at once.
    pub max_concurrent: usize,
    /// Required idle gap before each chunk, in milliseconds.
    pub min_idle_ms: u64,
    /// Poll interval while waiting for the idle gap.
    pub idle_poll_ms: u64,
    /// Foreground activity this recent aborts an in-flight chunk.
    pub activity_abort_ms: u64,
    /// Pause between consecutive chunks.
    pub chunk_delay_ms: u64,
    /// Delay before the manager refills a slot freed by a finished task.
    pub cooldown_ms: u64,
    /// Delay before the manager admits work queued by `add`.
    pub admission_delay_ms: u64,
    /// Delay before retrying a start the admission policy deferred.
    pub admission_retry_ms: u64,
    /// Resume automatically once idle after an activity-triggered pause.
    #[serde(default = "default_true")]
    pub auto_resume: bool,
    /// Fixed chunk size in bytes (None = adaptive from downlink).
    #[serde(default)]
    pub chunk_size: Option<u64>,
    /// Root directory for durable chunk storage (None = XDG data dir).
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    /// Preferred storage backend.
    #[serde(default)]
    pub store: StorePreference,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            min_idle_ms: 3000,
            idle_poll_ms: 250,
            activity_abort_ms: 500,
            chunk_delay_ms: 30,
            cooldown_ms: 1000,
            admission_delay_ms: 100,
            admission_retry_ms: 5000,
            auto_resume: true,
            chunk_size: None,
            storage_dir: None,
            store: StorePreference::default(),
            retry: None,
            network: NetworkConfig::default(),
        }
    }
}

impl PrefetchConfig {
    /// Storage root from config, or `~/.local/share/idlefetch`.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        match &self.storage_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let xdg_dirs = xdg::BaseDirectories::with_prefix("idlefetch")?;
                Ok(xdg_dirs.get_data_home())
            }
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("idlefetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<PrefetchConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: PrefetchConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PrefetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PrefetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = PrefetchConfig::default();
        assert_eq!(cfg.max_concurrent, 2);
        assert_eq!(cfg.min_idle_ms, 3000);
        assert_eq!(cfg.activity_abort_ms, 500);
        assert_eq!(cfg.store, StorePreference::Streaming);
        assert!(cfg.network.respect_save_data);
        assert!(!cfg.network.allow_on_cellular);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = PrefetchConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: PrefetchConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_concurrent, cfg.max_concurrent);
        assert_eq!(parsed.min_idle_ms, cfg.min_idle_ms);
        assert_eq!(parsed.cooldown_ms, cfg.cooldown_ms);
        assert_eq!(parsed.network.min_downlink_mbps, Some(2.0));
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            max_concurrent = 4
            min_idle_ms = 1000
            idle_poll_ms = 100
            activity_abort_ms = 250
            chunk_delay_ms = 0
            cooldown_ms = 500
            admission_delay_ms = 10
            admission_retry_ms = 2000
            store = "fragments"
            chunk_size = 262144
            storage_dir = "/var/cache/idlefetch"

            [network]
            effective_type = "3g"
            allow_on_cellular = true
        "#;
        let cfg: PrefetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_concurrent, 4);
        assert_eq!(cfg.store, StorePreference::Fragments);
        assert_eq!(cfg.chunk_size, Some(262_144));
        assert!(cfg.auto_resume);
        assert_eq!(cfg.network.effective_type.as_deref(), Some("3g"));
        assert!(cfg.network.allow_on_cellular);
        assert!(cfg.network.respect_save_data);
        assert!(cfg.retry.is_none());
        assert_eq!(
            cfg.storage_dir().unwrap(),
            PathBuf::from("/var/cache/idlefetch")
        );
    }

    #[test]
    fn config_toml_retry_section() {
        let toml = r#"
            max_concurrent = 2
            min_idle_ms = 3000
            idle_poll_ms = 250
            activity_abort_ms = 500
            chunk_delay_ms = 30
            cooldown_ms = 1000
            admission_delay_ms = 100
            admission_retry_ms = 5000

            [retry]
            base_delay_secs = 0.5
            max_delay_secs = 15
        "#;
        let cfg: PrefetchConfig = toml::from_str(toml).unwrap();
        let retry = cfg.retry.as_ref().unwrap();
        assert!(retry.max_attempts.is_none());
        assert!((retry.base_delay_secs - 0.5).abs() < 1e-9);
        assert_eq!(retry.max_delay_secs, 15);
        assert_eq!(retry.jitter, 0.0);
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = PrefetchConfig {
            max_concurrent: 7,
            ..PrefetchConfig::default()
        };
        fs::write(&path, toml::to_string_pretty(&cfg).unwrap()).unwrap();
        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.max_concurrent, 7);
    }
}
