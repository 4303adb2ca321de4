//! Configuration module for Tabula.
//!
//! Handles backend credentials, environment variables, and settings.

mod settings;

pub use settings::{
    expand_env_vars, AggregationSettings, ApiSettings, ExportSettings, LoggingSettings, MediaSettings,
    RelationshipSettings, Settings, SettingsError, TemplateSettings,
};
