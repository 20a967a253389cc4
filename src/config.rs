//! Configuration loader and validator for the marketplace server.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::cart::Pricing;

/// Longest accepted `auth.token_ttl_seconds`: one year.
pub const MAX_TOKEN_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub auth: Auth,
    pub shop: Shop,
    pub catalog: Catalog,
    #[serde(default)]
    pub notify: Notify,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Built SPA directory; served with an `index.html` fallback when set.
    #[serde(default)]
    pub static_dir: Option<String>,
    #[serde(default)]
    pub cors_allow_any: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Auth {
    pub jwt_secret: String,
    pub token_ttl_seconds: u64,
}

/// Money settings. All amounts are whole units of `currency`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shop {
    #[serde(default = "default_currency")]
    pub currency: String,
    pub shipping_fee: i64,
    pub free_shipping_threshold: i64,
    pub max_line_quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    pub page_size: u32,
    pub max_page_size: u32,
    pub recommendation_limit: usize,
}

/// Order event delivery. Without `webhook_url` events are only logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notify {
    #[serde(default)]
    pub webhook_url: Option<String>,
    pub poll_interval_ms: u64,
    pub max_backoff_seconds: u64,
}

impl Default for Notify {
    fn default() -> Self {
        Self {
            webhook_url: None,
            poll_interval_ms: 1000,
            max_backoff_seconds: 300,
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".into()
}

fn default_currency() -> String {
    "IQD".into()
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/mutanabbi.db", self.app.data_dir))
    }

    pub fn pricing(&self) -> Pricing {
        Pricing {
            shipping_fee: self.shop.shipping_fee,
            free_shipping_threshold: self.shop.free_shipping_threshold,
            max_line_quantity: self.shop.max_line_quantity,
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }

    if cfg.auth.jwt_secret.trim().len() < 16 {
        return Err(ConfigError::Invalid(
            "auth.jwt_secret must be at least 16 characters",
        ));
    }
    if cfg.auth.token_ttl_seconds == 0 || cfg.auth.token_ttl_seconds > MAX_TOKEN_TTL_SECONDS {
        return Err(ConfigError::Invalid(
            "auth.token_ttl_seconds must be between 1 and one year",
        ));
    }

    if cfg.shop.shipping_fee < 0 {
        return Err(ConfigError::Invalid("shop.shipping_fee must be >= 0"));
    }
    if cfg.shop.free_shipping_threshold < 0 {
        return Err(ConfigError::Invalid(
            "shop.free_shipping_threshold must be >= 0",
        ));
    }
    if cfg.shop.max_line_quantity == 0 {
        return Err(ConfigError::Invalid("shop.max_line_quantity must be > 0"));
    }

    if cfg.catalog.page_size == 0 {
        return Err(ConfigError::Invalid("catalog.page_size must be > 0"));
    }
    if cfg.catalog.page_size > cfg.catalog.max_page_size {
        return Err(ConfigError::Invalid(
            "catalog.page_size must not exceed catalog.max_page_size",
        ));
    }

    if cfg.notify.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("notify.poll_interval_ms must be > 0"));
    }
    if let Some(url) = cfg.notify.webhook_url.as_deref() {
        if reqwest::Url::parse(url).is_err() {
            return Err(ConfigError::Invalid("notify.webhook_url must be a valid URL"));
        }
    }

    Ok(())
}

/// Example YAML printed by `mutanabbi-admin print-example-config`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  bind_addr: "0.0.0.0:3000"
  static_dir: "./web/dist"
  cors_allow_any: true

auth:
  jwt_secret: "CHANGE_ME_TO_A_LONG_RANDOM_SECRET"
  token_ttl_seconds: 86400

shop:
  currency: "IQD"
  shipping_fee: 5000
  free_shipping_threshold: 50000
  max_line_quantity: 20

catalog:
  page_size: 20
  max_page_size: 100
  recommendation_limit: 6

notify:
  webhook_url: "https://hooks.example.com/mutanabbi/orders"
  poll_interval_ms: 1000
  max_backoff_seconds: 300
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    fn invalid_msg(cfg: &Config) -> &'static str {
        match validate(cfg).unwrap_err() {
            ConfigError::Invalid(msg) => msg,
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        assert_eq!(cfg.shop.currency, "IQD");
        assert_eq!(cfg.app.static_dir.as_deref(), Some("./web/dist"));
    }

    #[test]
    fn notify_section_is_optional() {
        let trimmed = example().split("notify:").next().unwrap();
        let cfg: Config = serde_yaml::from_str(trimmed).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.notify, Notify::default());
    }

    #[test]
    fn short_jwt_secret_rejected() {
        let mut cfg = example_cfg();
        cfg.auth.jwt_secret = "short".into();
        assert!(invalid_msg(&cfg).contains("auth.jwt_secret"));
    }

    #[test]
    fn token_ttl_bounds() {
        let mut cfg = example_cfg();
        cfg.auth.token_ttl_seconds = 0;
        assert!(invalid_msg(&cfg).contains("token_ttl_seconds"));

        let mut cfg = example_cfg();
        cfg.auth.token_ttl_seconds = u64::MAX;
        assert!(invalid_msg(&cfg).contains("token_ttl_seconds"));

        let mut cfg = example_cfg();
        cfg.auth.token_ttl_seconds = MAX_TOKEN_TTL_SECONDS;
        validate(&cfg).unwrap();
    }

    #[test]
    fn page_size_bounds() {
        let mut cfg = example_cfg();
        cfg.catalog.page_size = 0;
        assert!(invalid_msg(&cfg).contains("catalog.page_size"));

        let mut cfg = example_cfg();
        cfg.catalog.page_size = 500;
        assert!(invalid_msg(&cfg).contains("max_page_size"));
    }

    #[test]
    fn shop_amounts_validated() {
        let mut cfg = example_cfg();
        cfg.shop.shipping_fee = -1;
        assert!(invalid_msg(&cfg).contains("shipping_fee"));

        let mut cfg = example_cfg();
        cfg.shop.max_line_quantity = 0;
        assert!(invalid_msg(&cfg).contains("max_line_quantity"));
    }

    #[test]
    fn bad_webhook_url_rejected() {
        let mut cfg = example_cfg();
        cfg.notify.webhook_url = Some("not a url".into());
        assert!(invalid_msg(&cfg).contains("webhook_url"));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_cfg();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.catalog.recommendation_limit, 6);
        assert_eq!(cfg.pricing().shipping_fee, 5000);
    }
}
