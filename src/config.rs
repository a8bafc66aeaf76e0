use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::engine::classify::RouteRules;
use crate::engine::EngineConfig;
use crate::store::SqliteStore;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL of the application server; manifest entries and warm paths
  /// resolve against it.
  pub origin: String,
  /// Application name, used for the generation name and notification
  /// defaults.
  #[serde(default = "default_app_name")]
  pub app_name: String,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub routes: RouteRules,
  #[serde(default)]
  pub offline: OfflineConfig,
  #[serde(default)]
  pub network: NetworkConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  /// Override the database directory (defaults to the platform data dir).
  #[serde(default)]
  pub data_dir: Option<PathBuf>,
}

fn default_app_name() -> String {
  "Outpost".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Version string naming the cache generation.
  pub version: String,
  /// Critical-asset paths fetched at install time.
  pub manifest: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "v1.0.0".to_string(),
      manifest: vec!["/".to_string(), "/offline.html".to_string()],
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
  /// Path of the pre-cached page served to offline navigations.
  pub page: String,
  /// Message carried in the structured 503 body.
  pub message: String,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      page: "/offline.html".to_string(),
      message: "आप ऑफ़लाइन हैं। कृपया इंटरनेट कनेक्शन जांचें। \
                You are offline. Please check your internet connection."
        .to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  /// Upper bound on any single request, in seconds.
  pub timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self { timeout_secs: 20 }
  }
}

impl NetworkConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Sync tag that triggers a pending-action drain.
  pub tag: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "sync-pending-actions".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./outpost.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/outpost/config.yaml
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
        "No configuration file found. Create one at ~/.config/outpost/config.yaml\n\
                 At minimum it must set `origin`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("outpost.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("outpost").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Resolve the raw file into what the engine consumes.
  pub fn engine_config(&self) -> Result<EngineConfig> {
    let origin =
      Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))?;

    let manifest = self
      .cache
      .manifest
      .iter()
      .map(|path| {
        origin
          .join(path)
          .map_err(|e| eyre!("Invalid manifest entry {}: {}", path, e))
      })
      .collect::<Result<Vec<_>>>()?;

    let offline_page = origin
      .join(&self.offline.page)
      .map_err(|e| eyre!("Invalid offline page {}: {}", self.offline.page, e))?;

    Ok(EngineConfig {
      generation: format!("{}-{}", self.app_name.to_lowercase(), self.cache.version),
      manifest,
      rules: self.routes.clone(),
      offline_page,
      offline_message: self.offline.message.clone(),
      sync_tag: self.sync.tag.clone(),
      app_name: self.app_name.clone(),
      origin,
    })
  }

  /// Database path shared by the cache store and the action queue.
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.data_dir {
      Some(dir) => Ok(dir.join("outpost.db")),
      None => Ok(SqliteStore::default_path()?),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn minimal_config_gets_full_defaults() {
    let config: Config = serde_yaml::from_str("origin: https://app.example.org").unwrap();

    assert_eq!(config.app_name, "Outpost");
    assert_eq!(config.cache.version, "v1.0.0");
    assert_eq!(config.routes.network_first, vec!["/api/".to_string()]);
    assert_eq!(config.sync.tag, "sync-pending-actions");
    assert_eq!(config.network.timeout(), Duration::from_secs(20));
  }

  #[test]
  fn engine_config_resolves_paths_against_the_origin() {
    let config: Config = serde_yaml::from_str(
      "origin: https://app.example.org\n\
       app_name: Fieldkit\n\
       cache:\n  version: v2.3.0\n  manifest: [\"/\", \"/static/app.js\"]\n",
    )
    .unwrap();

    let engine_config = config.engine_config().unwrap();
    assert_eq!(engine_config.generation, "fieldkit-v2.3.0");
    assert_eq!(
      engine_config.manifest[1].as_str(),
      "https://app.example.org/static/app.js"
    );
    assert_eq!(
      engine_config.offline_page.as_str(),
      "https://app.example.org/offline.html"
    );
  }

  #[test]
  fn an_unparseable_origin_is_rejected() {
    let config: Config = serde_yaml::from_str("origin: not a url").unwrap();
    assert!(config.engine_config().is_err());
  }
}
