use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;

/// Shell assets the site needs to render offline. Local files only.
const DEFAULT_MANIFEST: &[&str] = &["/", "/index.html", "/styles.css", "/script.js", "/404.html"];

const DEFAULT_ASSET_EXTENSIONS: &[&str] = &["css", "js", "png", "jpg", "jpeg", "svg", "webp"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the cached site is served from (e.g. "https://example.com")
  pub origin: String,
  /// Version tag embedded in partition names ("v1" -> static-v1, runtime-v1)
  pub version: String,
  /// URLs that must be in the static partition after install
  pub manifest: Vec<String>,
  /// Page served to offline navigations with no stored copy
  pub offline_page: String,
  /// Path extensions served cache-first
  #[serde(deserialize_with = "deserialize_lowercase_list")]
  pub asset_extensions: Vec<String>,
  /// Cross-origin hosts whose assets are treated like same-origin assets
  #[serde(deserialize_with = "deserialize_lowercase_list")]
  pub allowed_hosts: Vec<String>,
  /// Background-sync tags the worker answers
  pub sync_tags: Vec<String>,
  pub notification: NotificationConfig,
  pub network: NetworkConfig,
  /// Cache database location (default: $XDG_DATA_HOME/shellcache/cache.db)
  pub cache_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub icon: String,
  pub badge: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub user_agent: String,
  /// Per-request timeout; unset means the cache imposes none
  pub timeout_secs: Option<u64>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      version: "v1".to_string(),
      manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
      offline_page: "/404.html".to_string(),
      asset_extensions: DEFAULT_ASSET_EXTENSIONS
        .iter()
        .map(|s| s.to_string())
        .collect(),
      allowed_hosts: Vec::new(),
      sync_tags: vec!["contact-form".to_string()],
      notification: NotificationConfig::default(),
      network: NetworkConfig::default(),
      cache_path: None,
    }
  }
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      icon: "/images/logo.png".to_string(),
      badge: None,
    }
  }
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      user_agent: concat!("shellcache/", env!("CARGO_PKG_VERSION")).to_string(),
      timeout_secs: None,
    }
  }
}

fn deserialize_lowercase_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(
    v.into_iter()
      .map(|s| s.trim_start_matches('.').to_lowercase())
      .collect(),
  )
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellcache/config.yaml
  ///
  /// With no file found, the built-in defaults are used.
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
      None => Self::default(),
    };

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shellcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shellcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Check the settings the worker cannot run without.
  pub fn validate(&self) -> Result<()> {
    let origin = self.origin_url()?;

    if self.version.trim().is_empty() {
      return Err(eyre!("version must not be empty"));
    }
    if self.version.contains(char::is_whitespace) {
      return Err(eyre!("version '{}' must not contain whitespace", self.version));
    }

    let mut seen = BTreeSet::new();
    for entry in &self.manifest {
      let url = origin
        .join(entry)
        .map_err(|e| eyre!("Invalid manifest entry '{}': {}", entry, e))?;
      if !seen.insert(url.to_string()) {
        return Err(eyre!("Duplicate manifest entry '{}'", entry));
      }
    }

    let offline = origin
      .join(&self.offline_page)
      .map_err(|e| eyre!("Invalid offline page '{}': {}", self.offline_page, e))?;
    if !seen.contains(offline.as_str()) {
      return Err(eyre!(
        "Offline page '{}' must be listed in the manifest",
        self.offline_page
      ));
    }

    Ok(())
  }

  /// The configured origin as an absolute http(s) URL.
  pub fn origin_url(&self) -> Result<Url> {
    let url =
      Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(eyre!("Origin '{}' must be http or https", self.origin));
    }
    Ok(url)
  }

  /// Resolved cache database path.
  pub fn cache_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.cache_path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("shellcache").join("cache.db"))
  }
}
