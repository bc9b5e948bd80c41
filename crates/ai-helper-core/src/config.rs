use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::provider::Provider;

/// Instruction sent with text submitted from a page selection.
pub const DEFAULT_SELECTION_PROMPT: &str = "\
You are an expert in aptitude, coding, and technical Q&A. For any question I provide, first identify the category (aptitude, coding, or technical). Do not mention the category. No preamble. Then answer it accurately and clearly, providing:
For aptitude: Firstly write the correct option number and its correct answer, then a step-by-step solution with the final answer.
For coding: a commentless Python solution with explanation and sample input/output.
For technical Q&A: a concise, short correct answer in very simple human language. Do not use punctuation marks unnecessarily, answer as if speaking and use very simple English.
";

/// Instruction sent with chat panel messages.
pub const DEFAULT_CHAT_PROMPT: &str = "You are an expert assistant. Help the user naturally.";

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// On-disk settings. Every field is optional; [`Settings::resolve`] fills the
/// gaps from the environment and the provider defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub selection_prompt: Option<String>,
    pub chat_prompt: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::default().as_str().to_string()),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn provider(&self) -> Result<Provider, ConfigError> {
        match &self.provider {
            None => Ok(Provider::default()),
            Some(name) => {
                Provider::from_str(name).ok_or_else(|| ConfigError::UnknownProvider(name.clone()))
            }
        }
    }

    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;

        Ok(config_dir.join("ai-helper").join("config.json"))
    }
}

/// Settings resolved once at startup and handed to the client and session.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    pub selection_prompt: String,
    pub chat_prompt: String,
}

impl Settings {
    /// Resolve settings, letting environment variables override the file.
    pub fn resolve(config: &Config) -> Result<Self, ConfigError> {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    pub fn resolve_with(
        config: &Config,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let provider = config.provider()?;

        let api_key = env(provider.api_key_env())
            .or_else(|| config.api_key.clone())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey {
                provider: provider.display_name(),
                env_var: provider.api_key_env(),
            })?;
        validate_api_key(provider, &api_key)?;

        let model = env("AI_HELPER_MODEL")
            .or_else(|| config.model.clone())
            .unwrap_or_else(|| provider.default_model().to_string());

        let endpoint = env("AI_HELPER_ENDPOINT")
            .or_else(|| config.endpoint.clone())
            .unwrap_or_else(|| provider.endpoint().to_string());

        Ok(Self {
            provider,
            api_key,
            model,
            endpoint,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            selection_prompt: config
                .selection_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SELECTION_PROMPT.to_string()),
            chat_prompt: config
                .chat_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_CHAT_PROMPT.to_string()),
        })
    }
}

/// Format check only; whether the key is accepted is up to the endpoint.
pub fn validate_api_key(provider: Provider, key: &str) -> Result<(), ConfigError> {
    if key.starts_with(provider.api_key_prefix()) {
        Ok(())
    } else {
        Err(ConfigError::InvalidApiKey {
            provider: provider.display_name(),
            prefix: provider.api_key_prefix(),
        })
    }
}
