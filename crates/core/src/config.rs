//! Config file parsing for `~/.config/readshelf/config.toml`.
//!
//! Every section is optional; anything unset falls back to the defaults the
//! service was designed around (30 s downloads, 5 redirects, 1 hour scratch age).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::security::ArchiveLimits;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scratch: ScratchConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchConfig {
    /// Directory for downloaded archives. Defaults to `<tmp>/reading-book-epub`.
    pub dir: Option<String>,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_max_age_secs() -> u64 {
    60 * 60
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl ScratchConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("reading-book-epub"))
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_head_timeout_secs")]
    pub head_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_head_timeout_secs() -> u64 {
    10
}
fn default_max_redirects() -> usize {
    5
}
fn default_user_agent() -> String {
    "Reading-Book-API/1.0".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            head_timeout_secs: default_head_timeout_secs(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_image_root")]
    pub image_root: String,
    #[serde(default = "default_link_root")]
    pub link_root: String,
}

fn default_image_root() -> String {
    "/images/".to_string()
}
fn default_link_root() -> String {
    "/links/".to_string()
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            image_root: default_image_root(),
            link_root: default_link_root(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_file_count: Option<u64>,
    pub max_resource_size_mb: Option<u64>,
}

impl SecurityConfig {
    /// Build archive limits. Uses defaults for any unset values.
    pub fn limits(&self) -> ArchiveLimits {
        let mut limits = ArchiveLimits::default();
        if let Some(n) = self.max_file_count {
            limits.max_file_count = n;
        }
        if let Some(mb) = self.max_resource_size_mb {
            limits.max_entry_size_bytes = mb.saturating_mul(1024).saturating_mul(1024);
        }
        limits
    }
}

/// Return the default config file path.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("readshelf");
        p.push("config.toml");
        p
    })
}

/// Load config from the default path.
pub fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => AppConfig::default(),
    }
}

/// Load config from `path`. A missing file yields defaults; an unparsable one
/// is logged and also yields defaults.
pub fn load_config_from(path: &Path) -> AppConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return AppConfig::default(),
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.fetch.timeout_secs, 30);
        assert_eq!(cfg.fetch.head_timeout_secs, 10);
        assert_eq!(cfg.fetch.max_redirects, 5);
        assert_eq!(cfg.fetch.user_agent, "Reading-Book-API/1.0");
        assert_eq!(cfg.scratch.max_age(), Duration::from_secs(3600));
        assert!(cfg.scratch.dir().ends_with("reading-book-epub"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[fetch]\ntimeout_secs = 5\n\n[security]\nmax_resource_size_mb = 1\n",
        )
        .unwrap();

        let cfg = load_config_from(&path);
        assert_eq!(cfg.fetch.timeout_secs, 5);
        assert_eq!(cfg.fetch.max_redirects, 5);
        assert_eq!(cfg.render.image_root, "/images/");
        assert_eq!(cfg.security.limits().max_entry_size_bytes, 1024 * 1024);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "fetch = [not toml").unwrap();
        let cfg = load_config_from(&path);
        assert_eq!(cfg.fetch.timeout_secs, 30);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_config_from(Path::new("/nonexistent/readshelf.toml"));
        assert_eq!(cfg.scratch.max_age_secs, 3600);
    }
}
