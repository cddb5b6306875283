use crate::cli::SettingsArgs;
use crate::error::GatewayError;
use crate::gateway::GatewaySettings;
use crate::generator::openrouter::{DEFAULT_BASE_URL, OpenRouterSettings};
use crate::masking;
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATABASE: &str = "main.db";
pub const DEFAULT_MAX_ROWS: usize = 500;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_LLM_TIMEOUT_MS: u64 = 15000;
pub const DEFAULT_PROVIDER: &str = "openrouter";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.1;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub enabled: bool,
    pub database: PathBuf,
    pub max_rows: usize,
    pub query_timeout_ms: u64,
    pub llm_timeout_ms: u64,
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub referer: Option<String>,
    pub app_title: Option<String>,
    pub temperature: f64,
    pub verbose: bool,
    pub show_secrets: bool,
}

impl AppConfig {
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            enabled: self.enabled,
            provider: self.provider.clone(),
            max_rows: self.max_rows,
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            llm_timeout: Duration::from_millis(self.llm_timeout_ms),
            verbose: self.verbose,
        }
    }

    /// Settings for the plan generator. Fails when no API key was resolved.
    pub fn generator_settings(&self) -> Result<OpenRouterSettings, GatewayError> {
        let api_key = self.api_key.clone().ok_or_else(|| GatewayError::Config {
            message: "no api key configured: use --api-key, api_key_env or SQLGATE_API_KEY"
                .to_string(),
        })?;
        Ok(OpenRouterSettings {
            base_url: self.base_url.clone(),
            api_key,
            model: self.model.clone(),
            temperature: self.temperature,
            referer: self.referer.clone(),
            app_title: self.app_title.clone(),
            timeout: Duration::from_millis(self.llm_timeout_ms),
        })
    }

    /// One line per setting, secrets masked unless `show_secrets` is set.
    pub fn describe(&self) -> Vec<String> {
        vec![
            format!("enabled: {}", self.enabled),
            format!("database: {}", self.database.display()),
            format!("max_rows: {}", self.max_rows),
            format!("query_timeout_ms: {}", self.query_timeout_ms),
            format!("llm_timeout_ms: {}", self.llm_timeout_ms),
            format!("provider: {}", self.provider),
            format!("base_url: {}", self.base_url),
            format!("model: {}", self.model),
            format!(
                "api_key: {}",
                masking::format_optional_secret(self.api_key.as_ref(), self.show_secrets)
            ),
            format!("temperature: {}", self.temperature),
        ]
    }
}

// --- TOML config file structs ---

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    defaults: TomlDefaults,
    #[serde(default)]
    profiles: HashMap<String, TomlProfile>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDefaults {
    enabled: Option<bool>,
    database: Option<PathBuf>,
    max_rows: Option<i64>,
    query_timeout_ms: Option<u64>,
    llm_timeout_ms: Option<u64>,
    temperature: Option<f64>,
    verbose: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
struct TomlProfile {
    database: Option<PathBuf>,
    max_rows: Option<i64>,
    query_timeout_ms: Option<u64>,
    llm_timeout_ms: Option<u64>,
    provider: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    api_key_env: Option<String>,
    referer: Option<String>,
    app_title: Option<String>,
    temperature: Option<f64>,
}

/// Config path resolution result. Explicit paths must exist.
struct ResolvedConfigPath {
    path: PathBuf,
    explicit: bool,
}

/// Resolve the config file path: --config flag > env var > platform default.
fn resolve_config_path(cli_config: Option<&PathBuf>) -> Option<ResolvedConfigPath> {
    if let Some(path) = cli_config {
        return Some(ResolvedConfigPath { path: path.clone(), explicit: true });
    }
    if let Ok(path) = std::env::var("SQLGATE_CONFIG") {
        return Some(ResolvedConfigPath { path: PathBuf::from(path), explicit: true });
    }
    ProjectDirs::from("", "", "sqlgate").map(|dirs| ResolvedConfigPath {
        path: dirs.config_dir().join("config.toml"),
        explicit: false,
    })
}

fn load_toml_config(resolved: Option<&ResolvedConfigPath>) -> Result<TomlConfig, GatewayError> {
    let resolved = match resolved {
        Some(r) => r,
        None => return Ok(TomlConfig::default()),
    };

    if !resolved.path.exists() {
        if resolved.explicit {
            return Err(GatewayError::Config {
                message: format!("config file not found: {}", resolved.path.display()),
            });
        }
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&resolved.path).map_err(|e| GatewayError::Config {
        message: format!("cannot read config file {}: {}", resolved.path.display(), e),
    })?;

    toml::from_str(&content).map_err(|e| GatewayError::Config {
        message: format!("invalid config file {}: {}", resolved.path.display(), e),
    })
}

/// Resolve a secret from direct value, env indirection, or env var.
fn resolve_secret(
    direct: Option<&str>,
    env_key: Option<&str>,
    fallback_env: &str,
) -> Option<SecretString> {
    if let Some(val) = direct
        && !val.is_empty()
    {
        return Some(SecretString::from(val.to_string()));
    }
    if let Some(key) = env_key
        && let Ok(val) = std::env::var(key)
        && !val.is_empty()
    {
        return Some(SecretString::from(val));
    }
    if let Ok(val) = std::env::var(fallback_env)
        && !val.is_empty()
    {
        return Some(SecretString::from(val));
    }
    None
}

/// Non-positive row caps fall back to the default.
fn normalize_max_rows(value: i64) -> usize {
    if value <= 0 {
        DEFAULT_MAX_ROWS
    } else {
        usize::try_from(value).unwrap_or(DEFAULT_MAX_ROWS)
    }
}

/// Below 0 becomes 0; above 1 becomes the default.
pub fn clamp_temperature(value: f64) -> f64 {
    if value.is_nan() || value > 1.0 {
        DEFAULT_TEMPERATURE
    } else if value < 0.0 {
        0.0
    } else {
        value
    }
}

/// Build AppConfig from the shared settings flags.
///
/// Precedence: CLI/env > profile > `[defaults]` > built-in.
pub fn load(
    args: &SettingsArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<AppConfig, GatewayError> {
    let resolved_path = resolve_config_path(config_path);
    let toml_config = load_toml_config(resolved_path.as_ref())?;
    let defaults = &toml_config.defaults;

    let profile = args
        .profile
        .as_ref()
        .map(|name| {
            toml_config.profiles.get(name).cloned().ok_or_else(|| GatewayError::Config {
                message: format!("profile '{}' not found in config file", name),
            })
        })
        .transpose()?
        .unwrap_or_default();

    // enabled: env > config defaults > true
    let enabled = match std::env::var("SQLGATE_ENABLED") {
        Ok(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"),
        Err(_) => defaults.enabled.unwrap_or(true),
    };

    let database = args
        .database
        .clone()
        .or(profile.database.clone())
        .or(defaults.database.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));

    let max_rows = normalize_max_rows(
        args.max_rows
            .or(profile.max_rows)
            .or(defaults.max_rows)
            .unwrap_or(DEFAULT_MAX_ROWS as i64),
    );

    let query_timeout_ms = args
        .query_timeout_ms
        .or(profile.query_timeout_ms)
        .or(defaults.query_timeout_ms)
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_QUERY_TIMEOUT_MS);

    let llm_timeout_ms = args
        .llm_timeout_ms
        .or(profile.llm_timeout_ms)
        .or(defaults.llm_timeout_ms)
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_LLM_TIMEOUT_MS);

    let provider = args
        .provider
        .as_deref()
        .or(profile.provider.as_deref())
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

    let base_url = args
        .base_url
        .as_deref()
        .or(profile.base_url.as_deref())
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let model = args
        .model
        .as_deref()
        .or(profile.model.as_deref())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let api_key = resolve_secret(
        args.api_key.as_deref(),
        profile.api_key_env.as_deref(),
        "SQLGATE_API_KEY",
    )
    .or_else(|| {
        profile
            .api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .map(|k| SecretString::from(k.clone()))
    });

    let referer = args.referer.clone().or(profile.referer.clone());
    let app_title = args.app_title.clone().or(profile.app_title.clone());

    let temperature = clamp_temperature(
        args.temperature
            .or(profile.temperature)
            .or(defaults.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE),
    );

    // verbose: CLI/ENV OR TOML default
    let verbose = verbose || defaults.verbose.unwrap_or(false);

    Ok(AppConfig {
        enabled,
        database,
        max_rows,
        query_timeout_ms,
        llm_timeout_ms,
        provider,
        base_url,
        model,
        api_key,
        referer,
        app_title,
        temperature,
        verbose,
        show_secrets,
    })
}
