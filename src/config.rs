//! Runtime configuration for sixhop-accel.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All tuning knobs (concurrency bound, debounce/timeout durations, cache
//! partition names, precache manifest) live here.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "sixhop-accel", about = "Prefetching cache proxy for the Wiki SixHop game")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Upstream game server base URL (overrides the config file).
    #[arg(long)]
    pub upstream: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Prefetch controller tuning.
    pub prefetch: PrefetchConfig,

    /// Cache worker partitions and policies.
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            prefetch: PrefetchConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Base URL of the upstream game server.
    pub upstream: String,

    /// Timeout for proxied upstream requests, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            upstream: "http://localhost:5000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Prefetch controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Maximum number of prefetch fetches in flight at once.
    pub max_concurrent: usize,

    /// Hover debounce delay in milliseconds.
    pub hover_debounce_ms: u64,

    /// Per-prefetch fetch timeout in milliseconds.
    pub fetch_timeout_ms: u64,

    /// Spacing delay between queue-driven prefetch starts, in milliseconds.
    pub queue_spacing_ms: u64,

    /// How many visible links to prefetch eagerly on page load.
    pub eager_prefetch_limit: usize,

    /// Path of the lightweight game-data endpoint.
    pub data_endpoint: String,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            hover_debounce_ms: 50,
            fetch_timeout_ms: 2000,
            queue_spacing_ms: 100,
            eager_prefetch_limit: 5,
            data_endpoint: "/game_data".to_string(),
        }
    }
}

impl PrefetchConfig {
    pub fn hover_debounce(&self) -> Duration {
        Duration::from_millis(self.hover_debounce_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn queue_spacing(&self) -> Duration {
        Duration::from_millis(self.queue_spacing_ms)
    }
}

/// Cache worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Name of the static-asset partition. Bump the suffix to migrate.
    pub static_partition: String,

    /// Name of the game-data API partition. Bump the suffix to migrate.
    pub api_partition: String,

    /// Path prefix identifying static assets.
    pub static_prefix: String,

    /// Exact path of the game-data API endpoint.
    pub api_path: String,

    /// Assets fetched into the static partition during install.
    pub precache_manifest: Vec<String>,

    /// Abort install on the first precache failure instead of caching
    /// whatever succeeds.
    pub require_full_precache: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            static_partition: "static-v1".to_string(),
            api_partition: "api-v1".to_string(),
            static_prefix: "/static/".to_string(),
            api_path: "/game_data".to_string(),
            precache_manifest: vec![
                "/".to_string(),
                "/static/css/styles.css".to_string(),
                "/static/js/scripts.js".to_string(),
                "https://cdn.jsdelivr.net/npm/canvas-confetti@1.9.2/dist/confetti.browser.min.js"
                    .to_string(),
                "https://fonts.googleapis.com/css2?family=Noto+Sans:wght@300;400;500;600;700&display=swap"
                    .to_string(),
            ],
            require_full_precache: false,
        }
    }
}

impl CacheConfig {
    /// Partition names that survive activation; everything else is purged.
    pub fn live_partitions(&self) -> [&str; 2] {
        [self.static_partition.as_str(), self.api_partition.as_str()]
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file is absent.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.prefetch.max_concurrent, 3);
        assert_eq!(cfg.prefetch.fetch_timeout_ms, 2000);
        assert_eq!(cfg.cache.static_partition, "static-v1");
        assert_eq!(cfg.cache.precache_manifest.len(), 5);
    }

    #[test]
    fn test_duration_helpers() {
        let cfg = PrefetchConfig::default();
        assert_eq!(cfg.hover_debounce(), Duration::from_millis(50));
        assert_eq!(cfg.queue_spacing(), Duration::from_millis(100));
    }

    #[test]
    fn test_live_partitions() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.live_partitions(), ["static-v1", "api-v1"]);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("sixhop-accel-no-such-config.json");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.server.listen, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_roundtrip() {
        let path = std::env::temp_dir().join("sixhop-accel-test-config.json");
        let mut cfg = Config::default();
        cfg.prefetch.max_concurrent = 5;
        std::fs::write(&path, serde_json::to_string(&cfg).unwrap()).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.prefetch.max_concurrent, 5);
        std::fs::remove_file(&path).ok();
    }
}
