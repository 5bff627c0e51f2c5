use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::auth::{DEFAULT_PASSWORD_COST, MAX_PASSWORD_COST, MIN_PASSWORD_COST};
use crate::index::is_valid_uid;

pub const INDEX_API_KEY_ENV: &str = "PORTAL_INDEX_API_KEY";
pub const TOKEN_SECRET_ENV: &str = "PORTAL_TOKEN_SECRET";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub suggestions: SuggestionsConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    #[serde(default = "default_task_poll_ms")]
    pub task_poll_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            host: default_host(),
            api_key: None,
            name: default_index_name(),
            timeout_secs: default_timeout_secs(),
            task_timeout_ms: default_task_timeout_ms(),
            task_poll_ms: default_task_poll_ms(),
        }
    }
}

impl IndexConfig {
    /// The configured key, else `PORTAL_INDEX_API_KEY` from the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(INDEX_API_KEY_ENV).ok())
            .filter(|k| !k.is_empty())
    }
}

fn default_backend() -> String {
    "meilisearch".to_string()
}
fn default_host() -> String {
    "http://localhost:7700".to_string()
}
fn default_index_name() -> String {
    "internal_sites".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_task_timeout_ms() -> u64 {
    5000
}
fn default_task_poll_ms() -> u64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_search_limit() -> usize {
    10
}
fn default_max_limit() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SuggestionsConfig {
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_suggestion_limit")]
    pub limit: usize,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            limit: default_suggestion_limit(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_min_chars() -> usize {
    2
}
fn default_suggestion_limit() -> usize {
    8
}
fn default_debounce_ms() -> u64 {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_days")]
    pub default_days: u32,
    #[serde(default = "default_report_limit")]
    pub default_limit: u32,
    #[serde(default = "default_export_days")]
    pub export_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            default_days: default_days(),
            default_limit: default_report_limit(),
            export_days: default_export_days(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}
fn default_days() -> u32 {
    7
}
fn default_report_limit() -> u32 {
    10
}
fn default_export_days() -> u32 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default)]
    pub token_secret: Option<String>,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
    /// bcrypt work factor for stored passwords.
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl_hours: default_token_ttl_hours(),
            password_cost: default_password_cost(),
        }
    }
}

impl AuthConfig {
    /// The configured secret, else `PORTAL_TOKEN_SECRET` from the environment.
    pub fn resolved_secret(&self) -> Option<String> {
        self.token_secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var(TOKEN_SECRET_ENV).ok())
            .filter(|s| !s.is_empty())
    }
}

fn default_token_ttl_hours() -> u64 {
    24
}

fn default_password_cost() -> u32 {
    DEFAULT_PASSWORD_COST
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_results_page")]
    pub results_page: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
            results_page: default_results_page(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_results_page() -> String {
    "/search".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate index
    match config.index.backend.as_str() {
        "meilisearch" | "memory" => {}
        other => anyhow::bail!(
            "Unknown index backend: '{}'. Must be meilisearch or memory.",
            other
        ),
    }
    if config.index.name.trim().is_empty() {
        anyhow::bail!("index.name must not be empty");
    }
    if !is_valid_uid(&config.index.name) {
        anyhow::bail!(
            "index.name '{}' is not a valid index uid (1-400 of a-z, A-Z, 0-9, '-', '_')",
            config.index.name
        );
    }
    if config.index.task_timeout_ms == 0 {
        anyhow::bail!("index.task_timeout_ms must be > 0");
    }
    if config.index.task_poll_ms == 0 {
        anyhow::bail!("index.task_poll_ms must be > 0");
    }

    // Validate search
    if config.search.default_limit < 1 {
        anyhow::bail!("search.default_limit must be >= 1");
    }
    if config.search.default_limit > config.search.max_limit {
        anyhow::bail!("search.default_limit must be <= search.max_limit");
    }

    // Validate suggestions
    if config.suggestions.min_chars < 2 {
        anyhow::bail!("suggestions.min_chars must be >= 2");
    }
    if config.suggestions.limit < 1 {
        anyhow::bail!("suggestions.limit must be >= 1");
    }

    // Validate analytics
    if config.analytics.queue_capacity < 1 {
        anyhow::bail!("analytics.queue_capacity must be >= 1");
    }
    if config.analytics.default_days < 1 || config.analytics.export_days < 1 {
        anyhow::bail!("analytics.default_days and analytics.export_days must be >= 1");
    }

    // Validate auth
    if !(MIN_PASSWORD_COST..=MAX_PASSWORD_COST).contains(&config.auth.password_cost) {
        anyhow::bail!(
            "auth.password_cost must be between {} and {}",
            MIN_PASSWORD_COST,
            MAX_PASSWORD_COST
        );
    }

    if !config.server.results_page.starts_with('/') {
        anyhow::bail!("server.results_page must be an absolute path");
    }

    Ok(())
}
