use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::settings::{self, Settings};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub site: SiteConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub dev: DevConfig,
  /// Where the store and log files live (default: $XDG_DATA_HOME/wsync)
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
  /// Base URL of the site, e.g. https://school.example.org
  pub url: String,
  /// Identifier queued operations are bound to
  pub id: String,
  /// Web service token. Prefer the WSYNC_TOKEN environment variable.
  pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Maximum age of cached call results, in seconds
  #[serde(default = "default_ttl")]
  pub ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: default_ttl(),
    }
  }
}

fn default_ttl() -> u64 {
  settings::DEFAULT_CACHE_TTL_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Replay queued operations when connectivity returns
  #[serde(default = "default_true")]
  pub enabled: bool,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self { enabled: true }
  }
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevConfig {
  /// Pretend the device has no network
  #[serde(default)]
  pub offline: bool,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./wsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/wsync/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/wsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("wsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("wsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Get the web service token.
  ///
  /// Checks WSYNC_TOKEN first, then `site.token` from the file.
  pub fn token(&self) -> Result<String> {
    std::env::var("WSYNC_TOKEN")
      .ok()
      .or_else(|| self.site.token.clone())
      .filter(|t| !t.is_empty())
      .ok_or_else(|| eyre!("Web service token not found. Set WSYNC_TOKEN or site.token."))
  }

  /// Directory holding the store and logs.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("wsync"))
  }

  /// Write the file configuration into the runtime settings.
  ///
  /// Site and cache values always follow the file. The sync and offline
  /// switches are only seeded, so toggles made at runtime survive a restart.
  pub fn apply_to(&self, settings: &Settings) -> Result<()> {
    let token = self.token()?;
    settings.set(settings::CURRENT_TOKEN, token)?;
    settings.set(settings::CURRENT_SITE_URL, self.site.url.clone())?;
    settings.set(settings::CURRENT_SITE_ID, self.site.id.clone())?;
    settings.set(settings::CACHE_TTL_SECS, self.cache.ttl_secs)?;

    if settings.get(settings::SYNC_WS_ON)?.is_none() {
      settings.set(settings::SYNC_WS_ON, self.sync.enabled)?;
    }
    if settings.get(settings::DEV_OFFLINE)?.is_none() {
      settings.set(settings::DEV_OFFLINE, self.dev.offline)?;
    }
    Ok(())
  }
}
