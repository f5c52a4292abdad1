use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::ArtifactKind;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub derivative: DerivativeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory; each artifact kind gets its own namespace below it
    #[serde(default = "default_storage_root")]
    pub root: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_token_secret")]
    pub secret: String,
    #[serde(default = "default_token_expire")]
    pub expire_minutes: u64,
    /// Tolerated clock skew for tokens stamped slightly in the future
    #[serde(default = "default_token_skew")]
    pub skew_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DerivativeConfig {
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
    #[serde(default = "default_compressed_max")]
    pub compressed_max: u32,
    #[serde(default = "default_compressed_quality")]
    pub compressed_quality: u8,
    /// Concurrent decode/encode jobs; 0 means one per available CPU
    #[serde(default)]
    pub workers: usize,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_db_path() -> String {
    "data/photovault.db".to_string()
}

fn default_storage_root() -> String {
    "data/assets".to_string()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

pub(crate) fn default_token_secret() -> String {
    "photovault-insecure-secret-change-me".to_string()
}

fn default_token_expire() -> u64 {
    30
}

fn default_token_skew() -> u64 {
    60
}

fn default_thumbnail_size() -> u32 {
    250
}

fn default_thumbnail_quality() -> u8 {
    85
}

fn default_compressed_max() -> u32 {
    1200
}

fn default_compressed_quality() -> u8 {
    80
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: default_token_secret(),
            expire_minutes: default_token_expire(),
            skew_seconds: default_token_skew(),
        }
    }
}

impl Default for DerivativeConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: default_thumbnail_size(),
            thumbnail_quality: default_thumbnail_quality(),
            compressed_max: default_compressed_max(),
            compressed_quality: default_compressed_quality(),
            workers: 0,
        }
    }
}

impl DerivativeConfig {
    /// Effective worker pool size
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        config.ensure_token_secret()?;
        if config.admin.api_key.is_none() {
            tracing::warn!("No admin API key configured; admin routes are unprotected");
        }
        tracing::info!(
            "Derivative policy: thumbnail={}px q{}, compressed<={}px q{}, workers={}",
            config.derivative.thumbnail_size,
            config.derivative.thumbnail_quality,
            config.derivative.compressed_max,
            config.derivative.compressed_quality,
            config.derivative.worker_count()
        );
        Ok(config)
    }

    /// Replace the built-in signing secret with a persisted random one
    fn ensure_token_secret(&mut self) -> anyhow::Result<()> {
        if self.token.secret == default_token_secret() || self.token.secret.is_empty() {
            let secret_path = Path::new("data/.token_secret");

            if secret_path.exists() {
                let secret = fs::read_to_string(secret_path)?;
                self.token.secret = secret.trim().to_string();
                tracing::info!("Loaded persisted token secret from data/.token_secret");
            } else {
                let secret = uuid::Uuid::new_v4().to_string();

                if let Some(parent) = secret_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                fs::write(secret_path, &secret)?;
                self.token.secret = secret;
                tracing::info!("Generated and persisted new token secret to data/.token_secret");
            }
        }
        Ok(())
    }

    /// Load configuration from photovault.toml or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = [
            "photovault.toml",
            "config.toml",
            "data/photovault.toml",
            "data/config.toml",
        ];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: PV_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(val) = env::var("PV_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = env::var("PV_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }

        // Database overrides
        if let Ok(val) = env::var("PV_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // Storage overrides
        if let Ok(val) = env::var("PV_CONF_STORAGE_ROOT") {
            self.storage.root = val;
        }
        if let Ok(val) = env::var("PV_CONF_STORAGE_MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = val.parse() {
                self.storage.max_upload_bytes = bytes;
            }
        }

        // Token overrides
        if let Ok(val) = env::var("PV_CONF_TOKEN_SECRET") {
            self.token.secret = val;
        }
        if let Ok(val) = env::var("PV_CONF_TOKEN_EXPIRE_MINUTES") {
            if let Ok(minutes) = val.parse() {
                self.token.expire_minutes = minutes;
            }
        }
        if let Ok(val) = env::var("PV_CONF_TOKEN_SKEW_SECONDS") {
            if let Ok(seconds) = val.parse() {
                self.token.skew_seconds = seconds;
            }
        }

        // Admin overrides
        if let Ok(val) = env::var("PV_CONF_ADMIN_API_KEY") {
            if !val.trim().is_empty() {
                self.admin.api_key = Some(val);
            }
        }

        // Derivative overrides
        if let Ok(val) = env::var("PV_CONF_DERIVATIVE_THUMBNAIL_SIZE") {
            if let Ok(v) = val.parse() {
                self.derivative.thumbnail_size = v;
            }
        }
        if let Ok(val) = env::var("PV_CONF_DERIVATIVE_THUMBNAIL_QUALITY") {
            if let Ok(v) = val.parse() {
                self.derivative.thumbnail_quality = v;
            }
        }
        if let Ok(val) = env::var("PV_CONF_DERIVATIVE_COMPRESSED_MAX") {
            if let Ok(v) = val.parse() {
                self.derivative.compressed_max = v;
            }
        }
        if let Ok(val) = env::var("PV_CONF_DERIVATIVE_COMPRESSED_QUALITY") {
            if let Ok(v) = val.parse() {
                self.derivative.compressed_quality = v;
            }
        }
        if let Ok(val) = env::var("PV_CONF_DERIVATIVE_WORKERS") {
            if let Ok(v) = val.parse() {
                self.derivative.workers = v;
            }
        }
    }

    /// Directory backing one artifact namespace
    pub fn namespace_dir(&self, kind: ArtifactKind) -> PathBuf {
        PathBuf::from(&self.storage.root).join(kind.namespace())
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        for kind in ArtifactKind::ALL {
            fs::create_dir_all(self.namespace_dir(kind))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let config = Config::default();
        assert_eq!(config.token.expire_minutes, 30);
        assert_eq!(config.derivative.thumbnail_size, 250);
        assert_eq!(config.derivative.thumbnail_quality, 85);
        assert_eq!(config.derivative.compressed_max, 1200);
        assert_eq!(config.derivative.compressed_quality, 80);
        assert!(config.admin.api_key.is_none());
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
            [token]
            expire_minutes = 5

            [derivative]
            thumbnail_size = 128
            workers = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.token.expire_minutes, 5);
        assert_eq!(config.token.secret, default_token_secret());
        assert_eq!(config.derivative.thumbnail_size, 128);
        assert_eq!(config.derivative.compressed_max, 1200);
        assert_eq!(config.derivative.worker_count(), 3);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn worker_count_falls_back_to_cpu_count() {
        let config = DerivativeConfig::default();
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn namespaces_are_parallel_under_root() {
        let mut config = Config::default();
        config.storage.root = "/srv/assets".to_string();
        assert_eq!(
            config.namespace_dir(ArtifactKind::Thumbnail),
            PathBuf::from("/srv/assets/thumbnail")
        );
        assert_eq!(
            config.namespace_dir(ArtifactKind::Original),
            PathBuf::from("/srv/assets/original")
        );
    }
}
