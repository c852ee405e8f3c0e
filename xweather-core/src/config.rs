use anyhow::{Context, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt, fs,
    path::PathBuf,
    sync::{LazyLock, RwLock},
    time::Duration,
};

use crate::model::Credentials;

pub const DEFAULT_ENDPOINT: &str = "https://data.api.xweather.com/";
pub const DEFAULT_CACHE_EXPIRES_IN: u64 = 600;

/// Which HTTP stack the client talks through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Adapter {
    /// reqwest with its default protocol negotiation.
    #[default]
    Default,
    /// reqwest restricted to HTTP/1.1.
    Http1,
}

impl Adapter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Adapter::Default => "default",
            Adapter::Http1 => "http1",
        }
    }

    pub const fn all() -> &'static [Adapter] {
        &[Adapter::Default, Adapter::Http1]
    }
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Adapter {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "default" | "reqwest" => Ok(Adapter::Default),
            "http1" => Ok(Adapter::Http1),
            _ => Err(anyhow!("Unknown adapter '{value}'. Supported adapters: default, http1.")),
        }
    }
}

impl TryFrom<String> for Adapter {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Adapter::try_from(value.as_str())
    }
}

impl From<Adapter> for String {
    fn from(value: Adapter) -> Self {
        value.as_str().to_string()
    }
}

/// Client settings. Plain data: nothing here is validated until a connection is built.
///
/// Example TOML:
/// ```toml
/// endpoint = "https://data.api.xweather.com/"
/// client_id = "..."
/// client_secret = "..."
/// cache = true
/// cache_expires_in = 600
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub endpoint: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub adapter: Adapter,
    /// Enables the read-through cache when a cache store is also available.
    pub cache: bool,
    /// Seconds a cached response stays valid.
    pub cache_expires_in: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client_id: None,
            client_secret: None,
            adapter: Adapter::default(),
            cache: false,
            cache_expires_in: DEFAULT_CACHE_EXPIRES_IN,
        }
    }
}

impl Configuration {
    pub fn credentials(&self) -> Credentials {
        Credentials { client_id: self.client_id.clone(), client_secret: self.client_secret.clone() }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_expires_in)
    }

    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Path to the config file.
    pub fn config_file_path() -> anyhow::Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "xweather", "xweather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

static GLOBAL: LazyLock<RwLock<Configuration>> =
    LazyLock::new(|| RwLock::new(Configuration::default()));

/// Snapshot of the process-wide configuration, created with defaults on first access.
pub fn configuration() -> Configuration {
    GLOBAL.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Mutate the process-wide configuration in place.
///
/// Call before the first query through [`crate::Client::global`]; the global client
/// takes its snapshot once and never looks again.
pub fn configure<F>(f: F)
where
    F: FnOnce(&mut Configuration),
{
    let mut config = GLOBAL.write().unwrap_or_else(|e| e.into_inner());
    f(&mut config);
}
