//! Settings persisted at `~/.orp/config.yaml`.
//!
//! Every value has a default, so a missing file (or a file that only sets a
//! few keys) is valid. As with the rest of the crate, every function has an
//! `_at(home)` form used by tests and a convenience form that derives the
//! home directory.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const SETTINGS_FILE: &str = "config.yaml";

/// Local resolution daemon endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 7888,
            timeout_ms: 5_000,
        }
    }
}

impl DaemonSettings {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Candidate ports tried, in order, when the daemon cannot answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    pub host: String,
    pub ports: Vec<u16>,
    pub timeout_ms: u64,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            ports: vec![8080, 8081, 8082, 3000, 5000],
            timeout_ms: 2_000,
        }
    }
}

impl FallbackSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Never zero; `tokio::time::interval` panics on a zero period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Network-layer gateway the browser is pointed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub listen: SocketAddr,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 7889)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSettings {
    /// How long an inline error annotation stays on the page.
    pub error_display_ms: u64,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            error_display_ms: 5_000,
        }
    }
}

impl PageSettings {
    pub fn error_display(&self) -> Duration {
        Duration::from_millis(self.error_display_ms)
    }
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub daemon: DaemonSettings,
    pub fallback: FallbackSettings,
    pub cache: CacheSettings,
    pub gateway: GatewaySettings,
    pub page: PageSettings,
}

/// `<home>/.orp`
pub fn orp_root(home: &Path) -> PathBuf {
    home.join(".orp")
}

/// `<home>/.orp/config.yaml`
pub fn settings_path_at(home: &Path) -> PathBuf {
    orp_root(home).join(SETTINGS_FILE)
}

/// Load settings, falling back to defaults when the file is absent.
pub fn load_at(home: &Path) -> Result<Settings, ConfigError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, ConfigError> {
    load_at(&home()?)
}

/// Write settings atomically (`config.yaml.tmp` then rename).
pub fn save_at(home: &Path, settings: &Settings) -> Result<PathBuf, ConfigError> {
    let root = orp_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        set_dir_permissions(&root)?;
    }
    let path = settings_path_at(home);
    let tmp_path = path.with_file_name(format!("{SETTINGS_FILE}.tmp"));

    let yaml = serde_yaml::to_string(settings)?;
    std::fs::write(&tmp_path, yaml)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(path)
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<PathBuf, ConfigError> {
    save_at(&home()?, settings)
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_resolver_constants() {
        let settings = Settings::default();
        assert_eq!(settings.daemon.base_url(), "http://localhost:7888");
        assert_eq!(settings.fallback.ports, vec![8080, 8081, 8082, 3000, 5000]);
        assert_eq!(settings.cache.ttl(), Duration::from_secs(300));
        assert_eq!(settings.cache.sweep_interval(), Duration::from_secs(60));
        assert_eq!(settings.page.error_display(), Duration::from_secs(5));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().expect("home");
        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let home = TempDir::new().expect("home");
        let root = orp_root(home.path());
        std::fs::create_dir_all(&root).expect("mkdir");
        std::fs::write(
            root.join(SETTINGS_FILE),
            "daemon:\n  port: 9999\nfallback:\n  ports: [4000]\n",
        )
        .expect("write");

        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings.daemon.port, 9999);
        assert_eq!(settings.daemon.host, "localhost");
        assert_eq!(settings.fallback.ports, vec![4000]);
        assert_eq!(settings.cache, CacheSettings::default());
    }

    #[test]
    fn zero_sweep_interval_is_clamped() {
        let cache = CacheSettings {
            ttl_secs: 1,
            sweep_interval_secs: 0,
        };
        assert_eq!(cache.sweep_interval(), Duration::from_secs(1));
    }
}
