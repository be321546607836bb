use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::DEFAULT_BASE_URL;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub search: SearchConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_api_url")]
  pub url: String,
  /// Per-request timeout; no timeout when unset
  pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
      timeout_secs: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Lifetime of cached lists. `null` keeps entries forever.
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: Option<u64>,
  /// SQLite file; defaults to the user data directory
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: default_ttl_secs(),
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
    }
  }
}

fn default_api_url() -> String {
  DEFAULT_BASE_URL.to_string()
}

fn default_ttl_secs() -> Option<u64> {
  Some(300)
}

fn default_debounce_ms() -> u64 {
  500
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./stockroom.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/stockroom/config.yaml
  ///
  /// Without any file the defaults are used. `STOCKROOM_API_URL` overrides
  /// the configured API url.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.with_api_url(std::env::var("STOCKROOM_API_URL").ok()))
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("stockroom.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("stockroom").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Replace the API url when `url` is set and non-blank.
  pub fn with_api_url(mut self, url: Option<String>) -> Self {
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
      self.api.url = url;
    }
    self
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.api.timeout_secs.map(Duration::from_secs)
  }

  pub fn cache_ttl(&self) -> Option<Duration> {
    self.cache.ttl_secs.map(Duration::from_secs)
  }

  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.search.debounce_ms)
  }

  /// Get the login password from the environment.
  ///
  /// Checks STOCKROOM_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("STOCKROOM_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set the STOCKROOM_PASSWORD environment variable."))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_when_keys_missing() {
    let config = Config::parse("title: North depot\n").unwrap();
    assert_eq!(config.api.url, DEFAULT_BASE_URL);
    assert_eq!(config.cache_ttl(), Some(Duration::from_secs(300)));
    assert_eq!(config.debounce(), Duration::from_millis(500));
    assert_eq!(config.timeout(), None);
    assert_eq!(config.title.as_deref(), Some("North depot"));
  }

  #[test]
  fn test_null_ttl_never_expires() {
    let config = Config::parse("cache:\n  ttl_secs: null\n").unwrap();
    assert_eq!(config.cache_ttl(), None);
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
api:
  url: https://stock.example.com/
  timeout_secs: 15
cache:
  ttl_secs: 60
  path: /tmp/stockroom.db
search:
  debounce_ms: 250
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.api.url, "https://stock.example.com/");
    assert_eq!(config.timeout(), Some(Duration::from_secs(15)));
    assert_eq!(config.cache_ttl(), Some(Duration::from_secs(60)));
    assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/stockroom.db")));
    assert_eq!(config.debounce(), Duration::from_millis(250));
  }

  #[test]
  fn test_empty_file_is_defaults() {
    let config = Config::parse("  \n").unwrap();
    assert_eq!(config.api.url, DEFAULT_BASE_URL);
  }

  #[test]
  fn test_api_url_override() {
    let config = Config::default().with_api_url(Some("http://10.0.0.5:5000".to_string()));
    assert_eq!(config.api.url, "http://10.0.0.5:5000");

    let config = Config::default().with_api_url(Some("  ".to_string()));
    assert_eq!(config.api.url, DEFAULT_BASE_URL);
  }

  #[test]
  fn test_load_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stockroom.yaml");
    std::fs::write(&path, "search:\n  debounce_ms: 0\n").unwrap();
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.debounce(), Duration::ZERO);

    assert!(Config::load(Some(&dir.path().join("missing.yaml"))).is_err());
  }
}
