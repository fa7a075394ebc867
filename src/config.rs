use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::system::platform::AccessorOptions;
use crate::system::sampler::SamplerConfig;
use crate::system::sort::SortKey;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub sampler: SamplerSection,
    pub filesystems: FilesystemsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub refresh_rate_ms: u64,
    pub default_sort: String,
    pub sort_descending: bool,
    pub show_kernel_threads: bool,
    pub show_threads: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            refresh_rate_ms: 2000,
            default_sort: "cpu".to_string(),
            sort_descending: true,
            show_kernel_threads: false,
            show_threads: false,
        }
    }
}

impl GeneralConfig {
    pub fn sort_key(&self) -> SortKey {
        SortKey::from_str_config(&self.default_sort)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_rate_ms.max(1))
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SamplerSection {
    pub interval_ms: u64,
    pub join_timeout_ms: u64,
    pub feedback_capacity: usize,
}

impl Default for SamplerSection {
    fn default() -> Self {
        SamplerSection {
            interval_ms: 500,
            join_timeout_ms: 500,
            feedback_capacity: 8,
        }
    }
}

impl SamplerSection {
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(self.interval_ms.max(1)),
            feedback_capacity: self.feedback_capacity.max(1),
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilesystemsConfig {
    /// Keep `nodev` mounts that still report capacity.
    pub include_pseudo: bool,
}

impl Config {
    pub fn accessor_options(&self) -> AccessorOptions {
        AccessorOptions {
            include_pseudo_filesystems: self.filesystems.include_pseudo,
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("procsight").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "invalid config, using defaults");
                Config::default()
            }
        },
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "config not readable, using defaults");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.general.refresh_rate_ms, 2000);
        assert_eq!(config.general.sort_key(), SortKey::Cpu);
        assert!(config.general.sort_descending);
        assert!(!config.general.show_kernel_threads);
        assert_eq!(config.sampler.interval_ms, 500);
        assert_eq!(config.sampler.join_timeout(), Duration::from_millis(500));
        assert!(!config.filesystems.include_pseudo);
    }

    #[test]
    fn parse_partial_toml() {
        let toml_str = r#"
[general]
refresh_rate_ms = 750
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.refresh_rate_ms, 750);
        assert_eq!(config.general.default_sort, "cpu");
        assert_eq!(config.sampler.feedback_capacity, 8);
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
[general]
refresh_rate_ms = 1000
default_sort = "rss"
sort_descending = false
show_kernel_threads = true
show_threads = true

[sampler]
interval_ms = 250
join_timeout_ms = 900
feedback_capacity = 2

[filesystems]
include_pseudo = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.sort_key(), SortKey::ResidentMemory);
        assert!(!config.general.sort_descending);
        assert!(config.general.show_threads);
        let sampler = config.sampler.sampler_config();
        assert_eq!(sampler.interval, Duration::from_millis(250));
        assert_eq!(sampler.feedback_capacity, 2);
        assert!(config.accessor_options().include_pseudo_filesystems);
    }

    #[test]
    fn zero_values_are_clamped() {
        let config: Config = toml::from_str("[sampler]\ninterval_ms = 0\nfeedback_capacity = 0\n").unwrap();
        let sampler = config.sampler.sampler_config();
        assert_eq!(sampler.interval, Duration::from_millis(1));
        assert_eq!(sampler.feedback_capacity, 1);
    }

    #[test]
    fn missing_file_returns_default() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.toml"));
        assert_eq!(config.general.refresh_rate_ms, 2000);
    }

    #[test]
    fn invalid_toml_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml {{{{").unwrap();
        let config = load_config_from_path(&path);
        assert_eq!(config.general.refresh_rate_ms, 2000);
    }
}
