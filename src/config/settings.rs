//! TOML-based configuration for Tabula.
//!
//! Supports a config file (tabula.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [api]
//! base_url = "https://api.huvrdata.app"
//! client_id = "${HUVR_CLIENT_ID}"
//! client_secret = "${HUVR_CLIENT_SECRET}"
//! timeout_seconds = 30
//! token_refresh_buffer_minutes = 5
//!
//! [aggregation]
//! max_concurrency = 5
//!
//! [export]
//! output_dir = "./exports"
//! link_related_data = true
//!
//! [media]
//! timeout_seconds = 300
//! max_concurrency = 4
//!
//! [logging]
//! filter = "tabula=info"
//!
//! [[relationships]]
//! source = "Measurement"
//! target = "User"
//! source_key = "MeasuredBy"
//! description = "User who took the measurement"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::{CatalogBuilder, EntityType, RelationshipCatalog, RelationshipDefinition};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// REST backend connection.
    pub api: ApiSettings,

    /// Snapshot aggregation.
    pub aggregation: AggregationSettings,

    /// Export defaults.
    pub export: ExportSettings,

    /// Media file downloads.
    pub media: MediaSettings,

    /// Saved template storage.
    pub templates: TemplateSettings,

    /// Log output.
    pub logging: LoggingSettings,

    /// Relationships appended after the built-in table.
    pub relationships: Vec<RelationshipSettings>,
}

/// REST backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL of the backend.
    pub base_url: String,

    /// OAuth client id (supports ${ENV_VAR} expansion).
    pub client_id: String,

    /// OAuth client secret (supports ${ENV_VAR} expansion).
    pub client_secret: String,

    /// Per-request timeout.
    pub timeout_seconds: u64,

    /// Refresh the access token this long before it expires.
    pub token_refresh_buffer_minutes: u64,

    /// Records requested per page.
    pub page_size: usize,

    /// Stop following `next` links after this many pages.
    pub max_pages: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.huvrdata.app".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout_seconds: 30,
            token_refresh_buffer_minutes: 5,
            page_size: 100,
            max_pages: 1000,
        }
    }
}

impl ApiSettings {
    /// Get the client id with environment variables expanded.
    pub fn resolved_client_id(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.client_id)
    }

    /// Get the client secret with environment variables expanded.
    pub fn resolved_client_secret(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.client_secret)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.token_refresh_buffer_minutes * 60)
    }

    /// Check the settings are usable for a live connection.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidConfig("api.base_url is required".into()));
        }
        if self.resolved_client_id()?.trim().is_empty() {
            return Err(SettingsError::InvalidConfig("api.client_id is required".into()));
        }
        if self.resolved_client_secret()?.trim().is_empty() {
            return Err(SettingsError::InvalidConfig("api.client_secret is required".into()));
        }
        if self.timeout_seconds == 0 {
            return Err(SettingsError::InvalidConfig(
                "api.timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.token_refresh_buffer_minutes > 60 {
            return Err(SettingsError::InvalidConfig(
                "api.token_refresh_buffer_minutes must be between 0 and 60".into(),
            ));
        }
        if self.page_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "api.page_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Aggregation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationSettings {
    /// Snapshot assemblies allowed in flight at once.
    pub max_concurrency: usize,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self { max_concurrency: 5 }
    }
}

/// Export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Directory written files land in.
    pub output_dir: PathBuf,

    /// Default for multi-sheet requests that do not say.
    pub link_related_data: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            link_related_data: true,
        }
    }
}

/// Media download configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MediaSettings {
    /// Per-file timeout.
    pub timeout_seconds: u64,

    /// Files downloaded at once.
    pub max_concurrency: usize,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            max_concurrency: 4,
        }
    }
}

impl MediaSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Template store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateSettings {
    /// JSON file holding saved templates.
    pub path: Option<String>,
}

impl TemplateSettings {
    /// The store location: the configured path (env-expanded), else
    /// `<data_dir>/tabula/templates.json`, else `./templates.json`.
    pub fn resolved_path(&self) -> Result<PathBuf, SettingsError> {
        if let Some(path) = &self.path {
            return Ok(PathBuf::from(expand_env_vars(path)?));
        }
        Ok(dirs::data_dir()
            .map(|dir| dir.join("tabula").join("templates.json"))
            .unwrap_or_else(|| PathBuf::from("templates.json")))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive, used when RUST_LOG is unset.
    pub filter: Option<String>,
}

/// An extra relationship catalog entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelationshipSettings {
    pub source: String,
    pub target: String,
    pub source_key: String,
    #[serde(default = "default_target_key")]
    pub target_key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub collection: bool,
}

fn default_target_key() -> String {
    "Id".to_string()
}

impl RelationshipSettings {
    fn to_definition(&self) -> Result<(EntityType, RelationshipDefinition), SettingsError> {
        let fields = [
            ("source", &self.source),
            ("target", &self.target),
            ("source_key", &self.source_key),
            ("target_key", &self.target_key),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(SettingsError::InvalidConfig(format!(
                "relationship {} -> {} has an empty {}",
                self.source, self.target, name
            )));
        }

        let target = EntityType::new(&self.target);
        let definition = if self.collection {
            RelationshipDefinition::many(target, &self.source_key, &self.target_key, &self.description)
        } else {
            RelationshipDefinition::one(target, &self.source_key, &self.target_key, &self.description)
        };
        Ok((EntityType::new(&self.source), definition))
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TABULA_CONFIG`
    /// 2. `./tabula.toml`
    /// 3. `~/.config/tabula/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("TABULA_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("tabula.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tabula").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Checks that hold regardless of whether the backend is used.
    ///
    /// Credentials are only checked by [`ApiSettings::validate`], so offline
    /// runs work without them.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.aggregation.max_concurrency == 0 {
            return Err(SettingsError::InvalidConfig(
                "aggregation.max_concurrency must be at least 1".into(),
            ));
        }
        if self.media.max_concurrency == 0 || self.media.timeout_seconds == 0 {
            return Err(SettingsError::InvalidConfig(
                "media.max_concurrency and media.timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.api.token_refresh_buffer_minutes > 60 {
            return Err(SettingsError::InvalidConfig(
                "api.token_refresh_buffer_minutes must be between 0 and 60".into(),
            ));
        }
        for rel in &self.relationships {
            rel.to_definition()?;
        }
        Ok(())
    }

    /// The built-in relationship table plus configured extras.
    pub fn catalog(&self) -> Result<RelationshipCatalog, SettingsError> {
        let mut builder = CatalogBuilder::standard();
        for rel in &self.relationships {
            let (source, definition) = rel.to_definition()?;
            builder = builder.relate(source, definition);
        }
        Ok(builder.build())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            chars.by_ref().take_while(|&ch| ch != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                name.push(ch);
                chars.next();
            }
            if name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
