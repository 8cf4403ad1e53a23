use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::CountScope;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub expansion: ExpansionConfig,
    #[serde(default)]
    pub bulk_seed: BulkSeedConfig,
}

/// Crawl run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    pub db_path: PathBuf,
    /// Identifier (DID) to start Phase 1 from. Defaults to the logged-in account.
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Stop Phase 1 after this many users have been expanded in one run.
    #[serde(default)]
    pub phase1_max_users: Option<usize>,
    /// Stop Phase 2 after this many users have been expanded in one run.
    #[serde(default)]
    pub phase2_max_users: Option<usize>,
}

/// Remote directory (XRPC service) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_service_url")]
    pub service_url: String,
    #[serde(default = "default_handle_env")]
    pub handle_env: String,
    #[serde(default = "default_app_password_env")]
    pub app_password_env: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            handle_env: default_handle_env(),
            app_password_env: default_app_password_env(),
            page_limit: default_page_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Pacing and retry policy for directory calls
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// Phase 2 admission configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExpansionConfig {
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,
    #[serde(default)]
    pub count_scope: CountScope,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            min_connections: default_min_connections(),
            count_scope: CountScope::default(),
        }
    }
}

/// Optional one-shot import of a precomputed member list before Phase 1
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkSeedConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_url() -> String {
    "https://bsky.social".to_string()
}

fn default_handle_env() -> String {
    "BLUESKY_HANDLE".to_string()
}

fn default_app_password_env() -> String {
    "BLUESKY_APP_PASSWORD".to_string()
}

fn default_page_limit() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_min_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    1000
}

fn default_max_retries() -> usize {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_min_connections() -> usize {
    3
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in GRAPHCRAWL_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("GRAPHCRAWL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_path(&config_path)
    }

    /// Load and validate configuration from an explicit path
    pub fn from_path(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.expansion.min_connections == 0 {
            anyhow::bail!(
                "expansion.min_connections must be at least 1 (0 would admit every known user)"
            );
        }

        if self.rate_limit.min_delay_ms > self.rate_limit.max_delay_ms {
            anyhow::bail!("rate_limit.min_delay_ms must not exceed rate_limit.max_delay_ms");
        }

        if self.directory.page_limit == 0 || self.directory.page_limit > 100 {
            anyhow::bail!("directory.page_limit must be between 1 and 100");
        }

        url::Url::parse(&self.directory.service_url).with_context(|| {
            format!("directory.service_url is not a valid URL: {}", self.directory.service_url)
        })?;

        if self.bulk_seed.enabled {
            match &self.bulk_seed.path {
                Some(path) if path.is_file() => {}
                Some(path) => anyhow::bail!("bulk_seed.path does not exist: {}", path.display()),
                None => anyhow::bail!("bulk_seed.enabled is set but bulk_seed.path is missing"),
            }
        }

        Ok(())
    }

    /// Read the login credentials named by `directory.handle_env` / `directory.app_password_env`.
    ///
    /// Only the crawl commands need these; `import` and `stats` work offline.
    pub fn credentials(&self) -> Result<(String, String)> {
        let handle = std::env::var(&self.directory.handle_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                self.directory.handle_env
            )
        })?;
        let password = std::env::var(&self.directory.app_password_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                self.directory.app_password_env
            )
        })?;
        Ok((handle, password))
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.crawler.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const MINIMAL: &str = r#"
[crawler]
db_path = "./graph.db"
"#;

    fn write_config(temp_dir: &TempDir, content: &str) -> PathBuf {
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_applied() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, MINIMAL);
        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.crawler.log_level, "info");
        assert!(config.crawler.seed.is_none());
        assert_eq!(config.directory.service_url, "https://bsky.social");
        assert_eq!(config.directory.page_limit, 100);
        assert_eq!(config.rate_limit.min_delay(), Duration::from_millis(500));
        assert_eq!(config.rate_limit.max_delay(), Duration::from_millis(1000));
        assert_eq!(config.expansion.min_connections, 3);
        assert_eq!(config.expansion.count_scope, CountScope::Graph);
        assert!(!config.bulk_seed.enabled);
    }

    #[test]
    fn test_full_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[crawler]
db_path = "./graph.db"
seed = "did:plc:seed"
log_level = "debug"
phase1_max_users = 50
phase2_max_users = 100

[rate_limit]
min_delay_ms = 600
max_delay_ms = 900
max_retries = 5

[expansion]
min_connections = 4
count_scope = "mutual_core"
"#,
        );
        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.crawler.seed.as_deref(), Some("did:plc:seed"));
        assert_eq!(config.crawler.phase1_max_users, Some(50));
        assert_eq!(config.crawler.phase2_max_users, Some(100));
        assert_eq!(config.rate_limit.max_retries, 5);
        assert_eq!(config.expansion.min_connections, 4);
        assert_eq!(config.expansion.count_scope, CountScope::MutualCore);
    }

    #[test]
    fn test_zero_min_connections_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[crawler]
db_path = "./graph.db"

[expansion]
min_connections = 0
"#,
        );
        let err = Config::from_path(&path).unwrap_err();
        assert!(err.to_string().contains("min_connections"));
    }

    #[test]
    fn test_inverted_delay_bounds_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[crawler]
db_path = "./graph.db"

[rate_limit]
min_delay_ms = 1500
max_delay_ms = 1000
"#,
        );
        assert!(Config::from_path(&path).is_err());
    }

    #[test]
    fn test_bulk_seed_requires_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[crawler]
db_path = "./graph.db"

[bulk_seed]
enabled = true
path = "/definitely/not/here.txt"
"#,
        );
        let err = Config::from_path(&path).unwrap_err();
        assert!(err.to_string().contains("bulk_seed.path"));
    }

    #[test]
    fn test_credentials_from_env() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[crawler]
db_path = "./graph.db"

[directory]
handle_env = "GRAPHCRAWL_TEST_HANDLE"
app_password_env = "GRAPHCRAWL_TEST_PASSWORD"
"#,
        );
        let config = Config::from_path(&path).unwrap();

        std::env::remove_var("GRAPHCRAWL_TEST_PASSWORD");
        std::env::set_var("GRAPHCRAWL_TEST_HANDLE", "someone.example");
        let err = config.credentials().unwrap_err();
        assert!(err.to_string().contains("GRAPHCRAWL_TEST_PASSWORD"));

        std::env::set_var("GRAPHCRAWL_TEST_PASSWORD", "app-pass");
        let (handle, password) = config.credentials().unwrap();
        assert_eq!(handle, "someone.example");
        assert_eq!(password, "app-pass");

        std::env::remove_var("GRAPHCRAWL_TEST_HANDLE");
        std::env::remove_var("GRAPHCRAWL_TEST_PASSWORD");
    }

    #[test]
    fn test_config_load_from_env_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, MINIMAL);
        let original = std::env::var("GRAPHCRAWL_CONFIG").ok();
        std::env::set_var("GRAPHCRAWL_CONFIG", path.to_str().unwrap());
        let config = Config::load();
        assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
        std::env::remove_var("GRAPHCRAWL_CONFIG");
        if let Some(v) = original {
            std::env::set_var("GRAPHCRAWL_CONFIG", v);
        }
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("GRAPHCRAWL_CONFIG").ok();
        std::env::set_var("GRAPHCRAWL_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("GRAPHCRAWL_CONFIG");
        if let Some(v) = original {
            std::env::set_var("GRAPHCRAWL_CONFIG", v);
        }
    }
}
