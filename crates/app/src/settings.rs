//! Handles settings for the application. Configuration is written in
//! `settings.toml` and can be overridden with `RENDICONTO__<SECTION>__<KEY>`
//! environment variables.
//!
//! See `settings.example.toml` for the configuration.
use std::{path::Path, time::Duration};

use config::{Config, ConfigError, Environment, File};
use engine::{EngineError, ExportSettings};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub url: String,
    /// `0` disables the timeout.
    pub query_timeout_secs: u64,
    /// Apply the metadata schema on start-up.
    pub migrate: bool,
}

impl Database {
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }
}

#[derive(Debug, Deserialize)]
pub struct Export {
    pub organization: String,
    pub currency_symbol: String,
    pub date_format: String,
    pub date_only_format: String,
    pub timezone: String,
    pub include_totals: bool,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub export: Export,
}

impl Settings {
    /// Loads `path` (optional unless `required`) on top of the defaults.
    pub fn new(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("app.level", "info")?
            .set_default("database.url", "sqlite:./rendiconto.db?mode=rwc")?
            .set_default("database.query_timeout_secs", 30)?
            .set_default("database.migrate", false)?
            .set_default("export.organization", "")?
            .set_default("export.currency_symbol", "$")?
            .set_default("export.date_format", "%d/%m/%Y %H:%M")?
            .set_default("export.date_only_format", "%d/%m/%Y")?
            .set_default("export.timezone", "UTC")?
            .set_default("export.include_totals", false)?
            .add_source(File::from(path).required(required))
            .add_source(
                Environment::with_prefix("RENDICONTO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn export_settings(&self) -> Result<ExportSettings, EngineError> {
        ExportSettings {
            organization: self.export.organization.clone(),
            currency_symbol: self.export.currency_symbol.clone(),
            include_totals: self.export.include_totals,
            ..ExportSettings::default()
        }
        .with_timezone(&self.export.timezone)?
        .with_date_format(&self.export.date_format)?
        .with_date_only_format(&self.export.date_only_format)
    }
}
