//! Application configuration
//!
//! Two TOML files: `app.toml` with page settings and one table per
//! database, and `secrets.toml` with the shared password and per-database
//! API credentials.

use crate::assistant::DEFAULT_BASE_URL;
use crate::transcript::{CitationFormat, ReducerOptions, UsagePlacement};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_APP_CONFIG: &str = ".streamlit/app.toml";
const DEFAULT_SECRETS: &str = ".streamlit/secrets.toml";
const DEFAULT_PORT: u16 = 8501;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("No databases configured")]
    NoDatabases,
    #[error("Password gating is enabled but [global].password is not set")]
    MissingPassword,
    #[error("Unknown database: {0}")]
    UnknownDatabase(String),
    #[error("No credentials configured for database: {0}")]
    MissingCredentials(String),
}

/// How assistant replies reach the browser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingMode {
    /// Forward every reducer update as it happens
    #[default]
    Incremental,
    /// Send only the finished turn
    Buffered,
}

/// Page-wide settings from the `[app]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub title: String,
    pub require_password: bool,
    pub streaming: StreamingMode,
    pub citation_format: CitationFormat,
    pub usage_placement: UsagePlacement,
    /// Sessions untouched this long are dropped
    pub session_idle_minutes: u64,
}

impl AppSettings {
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_minutes.saturating_mul(60))
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            title: "Assistant Chat".to_string(),
            require_password: false,
            streaming: StreamingMode::default(),
            citation_format: CitationFormat::default(),
            usage_placement: UsagePlacement::default(),
            session_idle_minutes: 60,
        }
    }
}

/// Per-database page settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub subtitle: String,
    /// Placeholder of the chat input
    pub prompt: String,
    /// Prepended to every prompt before it is sent to the assistant
    #[serde(default)]
    pub pre_prompt: String,
    #[serde(default)]
    pub welcome: Option<String>,
    #[serde(default = "default_new_chat")]
    pub new_chat: String,
    #[serde(default)]
    pub print_usage: bool,
}

fn default_new_chat() -> String {
    "New chat".to_string()
}

impl DatabaseConfig {
    /// Text actually sent to the assistant for a prompt
    pub fn message_for(&self, prompt: &str) -> String {
        format!("{}{prompt}", self.pre_prompt)
    }
}

/// Credentials for one database's assistant
#[derive(Clone, Deserialize)]
pub struct DatabaseCredentials {
    #[serde(rename = "OPENAI_API_KEY", alias = "openai_api_key")]
    pub api_key: String,
    #[serde(rename = "ASSISTANT_ID", alias = "assistant_id")]
    pub assistant_id: String,
}

impl std::fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("api_key", &"<redacted>")
            .field("assistant_id", &self.assistant_id)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct AppFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    databases: BTreeMap<String, DatabaseConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalSecrets {
    #[serde(default)]
    password: Option<String>,
}

/// Fully loaded configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppSettings,
    pub databases: BTreeMap<String, DatabaseConfig>,
    pub credentials: BTreeMap<String, DatabaseCredentials>,
    pub password: Option<String>,
    pub port: u16,
    pub api_base_url: String,
}

impl Config {
    /// Load from the paths and port given by the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_path =
            std::env::var("CHAT_APP_CONFIG").unwrap_or_else(|_| DEFAULT_APP_CONFIG.to_string());
        let secrets_path =
            std::env::var("CHAT_SECRETS").unwrap_or_else(|_| DEFAULT_SECRETS.to_string());

        let mut config = Self::load(Path::new(&app_path), Path::new(&secrets_path))?;
        config.port = std::env::var("CHAT_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        config.api_base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(config)
    }

    /// Load and validate both files; a missing secrets file counts as empty
    pub fn load(app_path: &Path, secrets_path: &Path) -> Result<Self, ConfigError> {
        let app_text = read(app_path)?;
        let app_file: AppFile = toml::from_str(&app_text).map_err(|source| ConfigError::Parse {
            path: app_path.to_path_buf(),
            source,
        })?;

        let (password, credentials) = if secrets_path.exists() {
            let text = read(secrets_path)?;
            parse_secrets(&text).map_err(|source| ConfigError::Parse {
                path: secrets_path.to_path_buf(),
                source,
            })?
        } else {
            tracing::warn!(path = %secrets_path.display(), "Secrets file not found");
            (None, BTreeMap::new())
        };

        let config = Self {
            app: app_file.app,
            databases: app_file.databases,
            credentials,
            password,
            port: DEFAULT_PORT,
            api_base_url: DEFAULT_BASE_URL.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.databases.is_empty() {
            return Err(ConfigError::NoDatabases);
        }
        if self.app.require_password && self.password.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingPassword);
        }
        Ok(())
    }

    pub fn database(&self, name: &str) -> Result<&DatabaseConfig, ConfigError> {
        self.databases
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDatabase(name.to_string()))
    }

    pub fn database_names(&self) -> Vec<&str> {
        self.databases.keys().map(String::as_str).collect()
    }

    /// Reducer settings for a database
    pub fn reducer_options(&self, database: &DatabaseConfig) -> ReducerOptions {
        ReducerOptions {
            print_usage: database.print_usage,
            citation_format: self.app.citation_format,
            usage_placement: self.app.usage_placement,
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

type Secrets = (Option<String>, BTreeMap<String, DatabaseCredentials>);

/// Split `[global]` from the per-database credential tables
fn parse_secrets(text: &str) -> Result<Secrets, toml::de::Error> {
    let mut table: toml::Table = toml::from_str(text)?;

    let global: GlobalSecrets = match table.remove("global") {
        Some(value) => value.try_into()?,
        None => GlobalSecrets::default(),
    };

    let mut credentials = BTreeMap::new();
    for (name, value) in table {
        if !value.is_table() {
            continue;
        }
        match value.try_into::<DatabaseCredentials>() {
            Ok(creds) => {
                credentials.insert(name, creds);
            }
            Err(e) => {
                tracing::warn!(section = %name, error = %e, "Skipping secrets section");
            }
        }
    }

    Ok((global.password, credentials))
}
