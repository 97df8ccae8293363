//! Configuration management for `BeastMode`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use agent_core::{Credential, DEFAULT_BASE_URL, ModelId, OpenAiExecutor, SamplingParams, TaskExecutor};

use crate::core::keychain;
use crate::core::offline::ControllerConfig;
use crate::core::state::Settings;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Proxy server configuration.
    pub api: ApiConfig,

    /// Task execution configuration.
    pub runner: RunnerConfig,

    /// Offline cache configuration.
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from the default paths.
    ///
    /// Loads global config first, then merges project-local config if present.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let project = Self::project_config_path().ok();
        Self::load_from(&Self::config_path()?, project.as_deref())
    }

    /// Load configuration from explicit paths. Missing files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or parsed.
    pub fn load_from(global: &Path, project: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = if global.exists() {
            let contents = std::fs::read_to_string(global)?;
            toml::from_str(&contents)?
        } else {
            Self::default()
        };

        if let Some(project) = project {
            if project.exists() {
                let contents = std::fs::read_to_string(project)?;
                let project_config: Self = toml::from_str(&contents)?;
                config.merge(project_config);
                tracing::debug!(path = %project.display(), "merged project config");
            }
        }

        Ok(config)
    }

    /// Get the project-local configuration file path.
    ///
    /// Looks for `.beastmode/config.toml` in the current directory.
    pub fn project_config_path() -> anyhow::Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(cwd.join(".beastmode").join("config.toml"))
    }

    /// Merge another config into this one (project overrides global).
    ///
    /// Only values that differ from the defaults override.
    fn merge(&mut self, other: Self) {
        let api = ApiConfig::default();
        if other.api.host != api.host {
            self.api.host = other.api.host;
        }
        if other.api.port != api.port {
            self.api.port = other.api.port;
        }
        if other.api.token.is_some() {
            self.api.token = other.api.token;
        }

        let runner = RunnerConfig::default();
        if other.runner.base_url != runner.base_url {
            self.runner.base_url = other.runner.base_url;
        }
        if other.runner.api_key_env != runner.api_key_env {
            self.runner.api_key_env = other.runner.api_key_env;
        }
        if other.runner.default_model != runner.default_model {
            self.runner.default_model = other.runner.default_model;
        }
        if other.runner.max_tokens != runner.max_tokens {
            self.runner.max_tokens = other.runner.max_tokens;
        }
        if (other.runner.temperature - runner.temperature).abs() > f32::EPSILON {
            self.runner.temperature = other.runner.temperature;
        }
        if other.runner.timeout_secs != runner.timeout_secs {
            self.runner.timeout_secs = other.runner.timeout_secs;
        }

        let cache = CacheConfig::default();
        if other.cache.generation != cache.generation {
            self.cache.generation = other.cache.generation;
        }
        if other.cache.origin != cache.origin {
            self.cache.origin = other.cache.origin;
        }
        if other.cache.manifest != cache.manifest {
            self.cache.manifest = other.cache.manifest;
        }
        if other.cache.offline_path != cache.offline_path {
            self.cache.offline_path = other.cache.offline_path;
        }
        if other.cache.api_prefix != cache.api_prefix {
            self.cache.api_prefix = other.cache.api_prefix;
        }
        if other.cache.placeholder_icon != cache.placeholder_icon {
            self.cache.placeholder_icon = other.cache.placeholder_icon;
        }
    }

    /// Get the configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the config directory path (`~/.config/beastmode/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config_home).join("beastmode"));
        }

        if cfg!(target_os = "macos") {
            if let Ok(home) = std::env::var("HOME") {
                return Ok(PathBuf::from(home).join(".config").join("beastmode"));
            }
        }

        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

        Ok(base.config_dir().join("beastmode"))
    }

    /// Get the data directory path (`~/.local/share/beastmode/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn data_dir() -> anyhow::Result<PathBuf> {
        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine data directory"))?;

        Ok(base.data_dir().join("beastmode"))
    }
}

/// Proxy server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to bind to.
    pub port: u16,

    /// Bearer token for the control routes (optional).
    /// Can also be set via `BEASTMODE_API_TOKEN` environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7890,
            token: None,
        }
    }
}

impl ApiConfig {
    /// Get the API token, preferring env var over config file.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        std::env::var("BEASTMODE_API_TOKEN")
            .ok()
            .or_else(|| self.token.clone())
    }

    /// Generate a new random API token.
    #[must_use]
    pub fn generate_token() -> String {
        use rand::Rng;
        let mut rng = rand::rng();
        let bytes: [u8; 32] = rng.random();
        format!("bm_{}", hex::encode(bytes))
    }
}

/// Task execution configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// `OpenRouter`-compatible Chat Completions endpoint.
    pub base_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Model used when settings do not name one.
    pub default_model: ModelId,

    /// Completion token limit per task.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// HTTP client timeout per task, in seconds.
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let params = SamplingParams::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            default_model: ModelId::default(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            timeout_secs: 120,
        }
    }
}

/// First credential found, in priority order.
fn first_credential(
    env_value: Option<String>,
    keychain: impl FnOnce() -> Option<Credential>,
    stored: Option<Credential>,
) -> Option<Credential> {
    env_value
        .and_then(Credential::new)
        .or_else(keychain)
        .or(stored)
}

impl RunnerConfig {
    /// Create the task executor.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn create_executor(&self) -> anyhow::Result<Arc<dyn TaskExecutor>> {
        let executor = OpenAiExecutor::with_config(
            Some(self.base_url.clone()),
            SamplingParams {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
            Some(Duration::from_secs(self.timeout_secs)),
        )?;
        Ok(Arc::new(executor))
    }

    /// Resolve the API key.
    ///
    /// Checks the configured environment variable, then the OS keychain,
    /// then the key stored in settings.
    #[must_use]
    pub fn resolve_credential(&self, settings: &Settings) -> Option<Credential> {
        first_credential(
            std::env::var(&self.api_key_env).ok(),
            keychain::load_credential,
            settings.credential(),
        )
    }
}

/// Offline cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Tag of the cache generation to install.
    pub generation: String,

    /// Upstream application origin.
    pub origin: String,

    /// Paths cached at install.
    pub manifest: Vec<String>,

    /// Cached page served when a navigation fails.
    pub offline_path: String,

    /// Path fragment that marks API calls.
    pub api_prefix: String,

    /// Cached image served when an image request fails.
    pub placeholder_icon: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation: "beastmode-v1.0.0".to_string(),
            origin: "http://127.0.0.1:3000".to_string(),
            manifest: [
                "/",
                "/manifest.json",
                "/favicon.ico",
                "/icons/icon-192x192.png",
                "/icons/icon-512x512.png",
                "/offline",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            offline_path: "/offline".to_string(),
            api_prefix: "/api/".to_string(),
            placeholder_icon: "/icons/icon-192x192.png".to_string(),
        }
    }
}

impl CacheConfig {
    /// Build the controller settings.
    ///
    /// # Errors
    ///
    /// Returns error if the origin is not an absolute URL.
    pub fn controller_config(&self) -> anyhow::Result<ControllerConfig> {
        let origin = Url::parse(&self.origin)
            .map_err(|e| anyhow::anyhow!("invalid cache origin '{}': {e}", self.origin))?;
        if self.generation.trim().is_empty() {
            anyhow::bail!("cache generation tag must not be empty");
        }

        Ok(ControllerConfig {
            generation: self.generation.clone(),
            origin,
            manifest: self.manifest.clone(),
            offline_path: self.offline_path.clone(),
            api_prefix: self.api_prefix.clone(),
            placeholder_icon: self.placeholder_icon.clone(),
        })
    }
}
