use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::clean::MarkupFormat;

pub const DEFAULT_CONFIG_FILENAME: &str = "osrs_simplified.toml";
pub const DEFAULT_API_URL: &str = "https://oldschool.runescape.wiki/api.php";
pub const DEFAULT_USER_AGENT: &str = "osrs-simplified/0.1";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_DATABASE_PATH: &str = "osrs_simplified.db";
pub const DEFAULT_LLM_MODEL: &str = "gpt-5-mini";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub markup_format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct LlmSection {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct StorageSection {
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cors_allow_origin: Option<String>,
}

/// Fully resolved settings: env > config file > defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub wiki_api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub markup_format: MarkupFormat,
    pub database_path: PathBuf,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_base_url: String,
    pub host: String,
    pub port: u16,
    pub cors_allow_origin: String,
}

impl ServiceConfig {
    pub fn resolve(&self) -> Result<Settings> {
        self.resolve_with_lookup(|key| env::var(key).ok())
    }

    pub fn resolve_with_lookup<F>(&self, lookup_env: F) -> Result<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_value = |key: &str| {
            lookup_env(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let timeout_ms = match env_value("WIKI_HTTP_TIMEOUT_MS") {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("invalid WIKI_HTTP_TIMEOUT_MS: {value}"))?,
            None => self.wiki.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        };
        let markup_format = match env_value("WIKI_MARKUP_FORMAT")
            .or_else(|| self.wiki.markup_format.clone())
        {
            Some(value) => MarkupFormat::parse(&value)?,
            None => MarkupFormat::default(),
        };
        let database_url = env_value("DATABASE_URL")
            .or_else(|| self.storage.database_url.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());
        let port = match env_value("OSRS_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("invalid OSRS_PORT: {value}"))?,
            None => self.server.port.unwrap_or(DEFAULT_PORT),
        };

        Ok(Settings {
            wiki_api_url: env_value("WIKI_API_URL")
                .or_else(|| self.wiki.api_url.clone())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            user_agent: env_value("WIKI_USER_AGENT")
                .or_else(|| self.wiki.user_agent.clone())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            timeout_ms,
            markup_format,
            database_path: database_path_from_url(&database_url),
            llm_api_key: env_value("OPENAI_API_KEY").or_else(|| self.llm.api_key.clone()),
            llm_model: env_value("OPENAI_MODEL")
                .or_else(|| self.llm.model.clone())
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_base_url: env_value("OPENAI_BASE_URL")
                .or_else(|| self.llm.base_url.clone())
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            host: env_value("OSRS_HOST")
                .or_else(|| self.server.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            cors_allow_origin: env_value("CORS_ALLOW_ORIGIN")
                .or_else(|| self.server.cors_allow_origin.clone())
                .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string()),
        })
    }
}

/// Load and parse a ServiceConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ServiceConfig> {
    if !config_path.exists() {
        return Ok(ServiceConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ServiceConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Accepts a bare path or a `sqlite:` URL (`sqlite://data/app.db`, `sqlite:///abs/app.db`).
pub fn database_path_from_url(url: &str) -> PathBuf {
    let trimmed = url.trim();
    let stripped = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    PathBuf::from(stripped)
}
