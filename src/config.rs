//! Configuration for ccscout.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CCSCOUT_HOME, CCSCOUT_DATABASE, provider keys, ...)
//! 2. Config file (.ccscout/config.yaml)
//! 3. Defaults (~/.ccscout)
//!
//! Config file discovery:
//! - Searches current directory and parents for .ccscout/config.yaml
//! - Paths in the config file are relative to the .ccscout/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::license::LicenseTable;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".ccscout";
const CONFIG_FILE: &str = "config.yaml";
const DATABASE_FILE: &str = "cache.db";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub fanout: Option<FanoutConfig>,
    #[serde(default)]
    pub batch: Option<BatchConfig>,
    #[serde(default)]
    pub license: Option<LicenseTable>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .ccscout/)
    pub home: Option<String>,
    /// SQLite cache file (relative to .ccscout/)
    pub database: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub memory_ttl_seconds: Option<u64>,
    pub persistent_ttl_seconds: Option<u64>,
    /// Set to false to run with the memory tier only
    pub persistent: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FanoutConfig {
    pub source_timeout_seconds: Option<u64>,
    pub per_source_limit: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub max_batch_size: Option<usize>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// SQLite file backing the durable tier
    pub database: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub cache: CacheSettings,
    pub fanout: FanoutSettings,
    pub batch: BatchSettings,
    pub license: LicenseTable,
    /// Never serialized; see `ProviderKeys::configured`
    #[serde(skip)]
    pub providers: ProviderKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheSettings {
    pub memory_ttl_seconds: u64,
    pub persistent_ttl_seconds: u64,
    pub persistent: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memory_ttl_seconds: 30 * 60,
            persistent_ttl_seconds: 6 * 60 * 60,
            persistent: true,
        }
    }
}

impl CacheSettings {
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_seconds)
    }

    pub fn persistent_ttl(&self) -> Duration {
        Duration::from_secs(self.persistent_ttl_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanoutSettings {
    pub source_timeout_seconds: u64,
    pub per_source_limit: usize,
    pub per_page: usize,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            source_timeout_seconds: 15,
            per_source_limit: 30,
            per_page: 30,
        }
    }
}

impl FanoutSettings {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSettings {
    pub max_batch_size: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { max_batch_size: 50 }
    }
}

/// Provider credentials, read from the environment only
#[derive(Clone, Default)]
pub struct ProviderKeys {
    pub youtube: Option<String>,
    pub pexels: Option<String>,
    pub pixabay: Option<String>,
    pub unsplash: Option<String>,
}

impl ProviderKeys {
    fn from_env(env: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            youtube: env("YOUTUBE_API_KEY"),
            pexels: env("PEXELS_API_KEY"),
            pixabay: env("PIXABAY_API_KEY"),
            unsplash: env("UNSPLASH_API_KEY"),
        }
    }

    /// Names of providers with a key set
    pub fn configured(&self) -> Vec<&'static str> {
        [
            ("youtube", &self.youtube),
            ("pexels", &self.pexels),
            ("pixabay", &self.pixabay),
            ("unsplash", &self.unsplash),
        ]
        .into_iter()
        .filter(|(_, key)| key.is_some())
        .map(|(name, _)| name)
        .collect()
    }
}

impl std::fmt::Debug for ProviderKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderKeys")
            .field("configured", &self.configured())
            .finish()
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Non-empty environment variable
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Merge file settings, env overrides and defaults
fn resolve(
    config_path: Option<PathBuf>,
    file: ConfigFile,
    default_home: PathBuf,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    // Paths in the file are relative to .ccscout/
    let config_dir = config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let from_file = |value: &Option<String>| -> Option<PathBuf> {
        match (&config_dir, value) {
            (Some(dir), Some(path)) => Some(resolve_path(dir, path)),
            _ => None,
        }
    };

    let home = env("CCSCOUT_HOME")
        .map(PathBuf::from)
        .or_else(|| from_file(&file.paths.home))
        .unwrap_or(default_home);

    let database = env("CCSCOUT_DATABASE")
        .map(PathBuf::from)
        .or_else(|| from_file(&file.paths.database))
        .unwrap_or_else(|| home.join(DATABASE_FILE));

    let parse_u64 = |name: &str| -> Result<Option<u64>> {
        env(name)
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{} must be a whole number of seconds", name))
            })
            .transpose()
    };

    let defaults = CacheSettings::default();
    let cache_file = file.cache.as_ref();
    let cache = CacheSettings {
        memory_ttl_seconds: parse_u64("CCSCOUT_MEMORY_TTL")?
            .or(cache_file.and_then(|c| c.memory_ttl_seconds))
            .unwrap_or(defaults.memory_ttl_seconds),
        persistent_ttl_seconds: parse_u64("CCSCOUT_PERSISTENT_TTL")?
            .or(cache_file.and_then(|c| c.persistent_ttl_seconds))
            .unwrap_or(defaults.persistent_ttl_seconds),
        persistent: cache_file
            .and_then(|c| c.persistent)
            .unwrap_or(defaults.persistent),
    };

    let defaults = FanoutSettings::default();
    let fanout_file = file.fanout.as_ref();
    let fanout = FanoutSettings {
        source_timeout_seconds: parse_u64("CCSCOUT_SOURCE_TIMEOUT")?
            .or(fanout_file.and_then(|f| f.source_timeout_seconds))
            .unwrap_or(defaults.source_timeout_seconds),
        per_source_limit: fanout_file
            .and_then(|f| f.per_source_limit)
            .unwrap_or(defaults.per_source_limit)
            .max(1),
        per_page: fanout_file
            .and_then(|f| f.per_page)
            .unwrap_or(defaults.per_page)
            .max(1),
    };

    let batch = BatchSettings {
        max_batch_size: file
            .batch
            .as_ref()
            .and_then(|b| b.max_batch_size)
            .unwrap_or(BatchSettings::default().max_batch_size)
            .max(1),
    };

    Ok(ResolvedConfig {
        home,
        database,
        config_file: config_path,
        cache,
        fanout,
        batch,
        license: file.license.unwrap_or_default(),
        providers: ProviderKeys::from_env(&env),
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let config_path = find_config_file();
    let file = match &config_path {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve(config_path, file, default_home, env_var)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_file() {
        let home = PathBuf::from("/home/test/.ccscout");
        let config = resolve(None, ConfigFile::default(), home.clone(), env_from(&[])).unwrap();

        assert_eq!(config.home, home);
        assert_eq!(config.database, home.join("cache.db"));
        assert_eq!(config.cache.memory_ttl_seconds, 1800);
        assert_eq!(config.cache.persistent_ttl_seconds, 21600);
        assert_eq!(config.fanout.source_timeout(), Duration::from_secs(15));
        assert_eq!(config.fanout.per_source_limit, 30);
        assert_eq!(config.batch.max_batch_size, 50);
        assert_eq!(config.license, LicenseTable::default());
        assert!(config.providers.configured().is_empty());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".ccscout");
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  database: ./search.db
cache:
  memory_ttl_seconds: 60
fanout:
  source_timeout_seconds: 5
  per_page: 10
batch:
  max_batch_size: 25
license:
  always_open_sources: [openstax, pexels]
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version.as_deref(), Some("1.0"));

        let config = resolve(
            Some(config_path),
            parsed,
            PathBuf::from("/unused"),
            env_from(&[]),
        )
        .unwrap();
        assert_eq!(config.database, config_dir.join("search.db"));
        assert_eq!(config.cache.memory_ttl_seconds, 60);
        assert_eq!(config.cache.persistent_ttl_seconds, 21600);
        assert_eq!(config.fanout.source_timeout_seconds, 5);
        assert_eq!(config.fanout.per_page, 10);
        assert_eq!(config.batch.max_batch_size, 25);
        assert_eq!(config.license.always_open_sources, vec!["openstax", "pexels"]);
        // Unlisted tables keep their defaults
        assert_eq!(
            config.license.permissive_markers,
            LicenseTable::default().permissive_markers
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let file = ConfigFile {
            cache: Some(CacheConfig {
                memory_ttl_seconds: Some(60),
                persistent_ttl_seconds: None,
                persistent: Some(false),
            }),
            ..Default::default()
        };
        let env = env_from(&[
            ("CCSCOUT_HOME", "/srv/ccscout"),
            ("CCSCOUT_MEMORY_TTL", "120"),
            ("PEXELS_API_KEY", "abc"),
        ]);

        let config = resolve(None, file, PathBuf::from("/unused"), env).unwrap();
        assert_eq!(config.home, PathBuf::from("/srv/ccscout"));
        assert_eq!(config.database, PathBuf::from("/srv/ccscout/cache.db"));
        assert_eq!(config.cache.memory_ttl(), Duration::from_secs(120));
        assert!(!config.cache.persistent);
        assert_eq!(config.providers.configured(), vec!["pexels"]);
        assert!(!format!("{:?}", config.providers).contains("abc"));
    }

    #[test]
    fn test_invalid_env_number() {
        let env = env_from(&[("CCSCOUT_SOURCE_TIMEOUT", "soon")]);
        let err = resolve(None, ConfigFile::default(), PathBuf::from("/x"), env).unwrap_err();
        assert!(err.to_string().contains("CCSCOUT_SOURCE_TIMEOUT"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project/.ccscout");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/.ccscout/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
