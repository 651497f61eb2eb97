//! Layered configuration: defaults, git config, environment, CLI flags.

use std::env;

use git2::ErrorCode;
use tracing::debug;

use crate::commit::prompt::{default_prompt, default_system};
use crate::error::ConfigError;
use crate::llm::payload::GenerationParams;

/// Section holding every option, e.g. `commit-message-generator.llm.model`.
pub const CONFIG_SECTION: &str = "commit-message-generator.llm";

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV_VAR: &str = "GIT_COMMITX_API_KEY";

pub const DEFAULT_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek-v3";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_PROTOCOL: &str = "openai";

/// Language for built-in prompts and fallback messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    /// `LANG` values starting with `zh` select Chinese.
    pub fn from_lang(lang: Option<&str>) -> Self {
        match lang {
            Some(l) if l.to_ascii_lowercase().starts_with("zh") => Locale::Zh,
            _ => Locale::En,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lang(env::var("LANG").ok().as_deref())
    }
}

/// Full key name for `option`.
pub fn config_key(option: &str) -> String {
    format!("{}.{}", CONFIG_SECTION, option)
}

/// Per-invocation overrides, usually from command-line flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub url: Option<String>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub system: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub protocol: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
}

/// Settings for one synthesis session.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub api_url: String,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    /// Protocol used when the URL host is not a known backend.
    pub protocol: String,
    pub prompt_template: String,
    pub system_prompt: String,
    pub api_key: Option<String>,
    pub locale: Locale,
}

impl LlmConfig {
    pub fn defaults(locale: Locale) -> Self {
        Self {
            api_url: DEFAULT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
            protocol: DEFAULT_PROTOCOL.to_string(),
            prompt_template: default_prompt(locale).to_string(),
            system_prompt: default_system(locale).to_string(),
            api_key: None,
            locale,
        }
    }

    /// Defaults overlaid with whatever `config` sets.
    pub fn from_git_config(config: &git2::Config, locale: Locale) -> Result<Self, ConfigError> {
        let mut llm = Self::defaults(locale);

        if let Some(v) = read_string(config, "url")? {
            llm.api_url = v;
        }
        if let Some(v) = read_string(config, "model")? {
            llm.model = v;
        }
        if let Some(v) = read_string(config, "prompt")? {
            llm.prompt_template = v;
        }
        if let Some(v) = read_string(config, "system")? {
            llm.system_prompt = v;
        }
        if let Some(v) = read_string(config, "protocol")? {
            llm.protocol = v;
        }
        if let Some(v) = read_string(config, "api-key")? {
            llm.api_key = Some(v);
        }
        if let Some(v) = read_string(config, "temperature")? {
            llm.temperature = parse_value(&v, "temperature", "a number")?;
        }
        if let Some(v) = read_string(config, "top-p")? {
            llm.top_p = parse_value(&v, "top-p", "a number")?;
        }
        if let Some(v) = read_string(config, "max-tokens")? {
            llm.max_tokens = parse_value(&v, "max-tokens", "a positive integer")?;
        }

        Ok(llm)
    }

    /// Take the API key from the environment if set.
    pub fn apply_env(&mut self) {
        if let Ok(key) = env::var(API_KEY_ENV_VAR)
            && !key.trim().is_empty()
        {
            debug!("Using API key from {}", API_KEY_ENV_VAR);
            self.api_key = Some(key);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = &overrides.url {
            self.api_url = v.clone();
        }
        if let Some(v) = &overrides.model {
            self.model = v.clone();
        }
        if let Some(v) = &overrides.prompt {
            self.prompt_template = v.clone();
        }
        if let Some(v) = &overrides.system {
            self.system_prompt = v.clone();
        }
        if let Some(v) = &overrides.protocol {
            self.protocol = v.clone();
        }
        if let Some(v) = &overrides.api_key {
            self.api_key = Some(v.clone());
        }
        if let Some(v) = overrides.temperature {
            self.temperature = v;
        }
        if let Some(v) = overrides.top_p {
            self.top_p = v;
        }
        if let Some(v) = overrides.max_tokens {
            self.max_tokens = v;
        }
    }

    /// Load every layer in precedence order.
    pub fn load(
        config: &git2::Config,
        overrides: &ConfigOverrides,
        locale: Locale,
    ) -> Result<Self, ConfigError> {
        let mut llm = Self::from_git_config(config, locale)?;
        llm.apply_env();
        llm.apply_overrides(overrides);
        Ok(llm)
    }

    /// The API key, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Protocol hint, if non-blank.
    pub fn protocol(&self) -> Option<&str> {
        Some(self.protocol.trim()).filter(|p| !p.is_empty())
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            system_prompt: self.system_prompt.clone(),
        }
    }
}

fn read_string(config: &git2::Config, option: &str) -> Result<Option<String>, ConfigError> {
    let key = config_key(option);
    match config.get_string(&key) {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read { key, source }),
    }
}

fn parse_value<T: std::str::FromStr>(
    value: &str,
    option: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: config_key(option),
        value: value.to_string(),
        expected,
    })
}

/// Open the user's global git config for writing.
pub fn open_global_config() -> Result<git2::Config, ConfigError> {
    git2::Config::open_default()
        .and_then(|mut c| c.open_global())
        .map_err(ConfigError::Open)
}

/// Store `api_key` in `config`.
pub fn save_api_key(config: &mut git2::Config, api_key: &str) -> Result<(), ConfigError> {
    let key = config_key("api-key");
    config
        .set_str(&key, api_key.trim())
        .map_err(|source| ConfigError::Save { key, source })
}
