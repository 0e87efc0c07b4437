//! Server configuration (bind address, scratch directory, sweep cadence).

use std::time::Duration;

use readshelf_core::config::{load_config, AppConfig};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host:port to bind (e.g. "127.0.0.1:3030" or "0.0.0.0:3030").
    pub bind: String,
    /// How often the janitor sweeps the scratch directory.
    pub sweep_interval: Duration,
    pub app: AppConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3030".to_string(),
            sweep_interval: Duration::from_secs(15 * 60),
            app: AppConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Config file first, then environment overrides:
    /// - `READSHELF_BIND`: host:port (default: 127.0.0.1:3030)
    /// - `READSHELF_SCRATCH_DIR`: where downloads land (default: `<tmp>/reading-book-epub`)
    /// - `READSHELF_SWEEP_INTERVAL_SECS`: janitor period (default: 900)
    pub fn from_env() -> Self {
        Self::with_overrides(load_config(), |key| std::env::var(key).ok())
    }

    /// Apply the `READSHELF_*` overrides found by `var` on top of `app`.
    pub fn with_overrides(app: AppConfig, var: impl Fn(&str) -> Option<String>) -> Self {
        let mut c = Self {
            app,
            ..Self::default()
        };
        if let Some(b) = var("READSHELF_BIND") {
            c.bind = b;
        }
        if let Some(dir) = var("READSHELF_SCRATCH_DIR") {
            c.app.scratch.dir = Some(dir);
        }
        if let Some(secs) = var("READSHELF_SWEEP_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(n) if n > 0 => c.sweep_interval = Duration::from_secs(n),
                _ => tracing::warn!("Ignoring invalid READSHELF_SWEEP_INTERVAL_SECS={}", secs),
            }
        }
        c
    }

    pub fn bind_addr(&self) -> &str {
        &self.bind
    }
}
