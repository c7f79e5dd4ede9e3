//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tern_ai::{Provider, ResourceCandidate, Tier, models};
use tern_session::ControllerConfig;
use tern_session::throttle::DEFAULT_THROTTLE_INTERVAL;

/// Configuration for tern
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default provider
    pub provider: Option<String>,
    /// Resource each conversation starts on
    pub resource: Option<String>,
    /// Progress update interval in milliseconds
    pub throttle_ms: Option<u64>,
    /// Log filter used when RUST_LOG is unset
    pub log_filter: Option<String>,
    /// Directory holding per-conversation usage files
    pub usage_dir: Option<String>,
    /// Fallback candidates, replacing the built-in catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceEntry>,
}

/// A configured resource; the tier is inferred from the id when omitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
}

impl ResourceEntry {
    fn candidate(&self) -> ResourceCandidate {
        match self.tier {
            Some(tier) => ResourceCandidate::new(self.id.as_str(), tier),
            None => ResourceCandidate::inferred(self.id.as_str()),
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tern")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TERN_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a specific path, falling back to defaults
    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            provider: Some(Provider::Gemini.name().to_string()),
            resource: None,
            throttle_ms: Some(DEFAULT_THROTTLE_INTERVAL.as_millis() as u64),
            log_filter: Some("tern=info".to_string()),
            usage_dir: None,
            resources: Vec::new(),
        };

        default_config.save()?;
        Ok(path)
    }

    /// Directory for usage files
    pub fn usage_dir(&self) -> PathBuf {
        match &self.usage_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tern")
                .join("usage"),
        }
    }

    /// Build the controller configuration.
    ///
    /// `provider` and `resource` come from the command line and take
    /// precedence over the file.
    pub fn controller_config(
        &self,
        provider: Option<&str>,
        resource: Option<&str>,
    ) -> anyhow::Result<ControllerConfig> {
        let provider = match provider.or(self.provider.as_deref()) {
            Some(name) => Provider::parse(name)?,
            None => Provider::Gemini,
        };

        let resources: Vec<ResourceCandidate> = if self.resources.is_empty() {
            models::get_resources(provider)
        } else {
            self.resources.iter().map(ResourceEntry::candidate).collect()
        };

        let start = match resource.or(self.resource.as_deref()) {
            Some(id) => resources
                .iter()
                .find(|c| c.id.as_str() == id)
                .cloned()
                .unwrap_or_else(|| models::resolve(provider, id)),
            None => resources
                .iter()
                .max_by(|a, b| a.tier.score().cmp(&b.tier.score()).then_with(|| b.id.cmp(&a.id)))
                .cloned()
                .ok_or_else(|| tern_session::Error::NoResource(provider.name().to_string()))?,
        };

        let throttle = self
            .throttle_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_THROTTLE_INTERVAL);

        Ok(ControllerConfig {
            provider,
            resource: start,
            resources,
            throttle_interval: throttle,
        })
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# tern configuration file
# Place at ~/.config/tern/config.toml (Linux/Mac) or %APPDATA%\tern\config.toml (Windows)

# Default provider (gemini, anthropic, openai, custom)
provider = "gemini"

# Resource each conversation starts on (defaults to the highest tier)
# resource = "gemini-2.5-pro"

# Progress update interval in milliseconds
throttle_ms = 50

# Log filter used when RUST_LOG is unset
log_filter = "tern=info"

# Where per-conversation usage is stored
# usage_dir = "~/.local/share/tern/usage"

# Fallback candidates (replaces the built-in list for the provider)
# [[resources]]
# id = "my-model-pro"
# tier = "pro"
#
# [[resources]]
# id = "my-model-lite"
"#
}
