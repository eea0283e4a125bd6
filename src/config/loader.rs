//! Configuration loader

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

use super::types::{AppConfig, RiskBracket};
use crate::common::errors::{BotError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. `BINANCE_API_KEY` / `BINANCE_API_SECRET`
/// 2. Environment variables (prefixed with APP__)
/// 3. Configuration file (TOML or JSON, by extension)
/// 4. Default values
///
/// When `risk.table_path` is set, its brackets replace `risk.brackets`.
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    // Try to load from .env file
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| BotError::Configuration(e.to_string()))?;

    let mut app: AppConfig = config
        .try_deserialize()
        .map_err(|e| BotError::Configuration(e.to_string()))?;

    if let Ok(key) = std::env::var("BINANCE_API_KEY") {
        app.binance.api_key = Some(key);
    }
    if let Ok(secret) = std::env::var("BINANCE_API_SECRET") {
        app.binance.api_secret = Some(secret);
    }

    if let Some(path) = app.risk.table_path.clone() {
        app.risk.brackets = load_risk_table(&path)?;
    }

    Ok(app)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RiskTableFile {
    Wrapped { brackets: Vec<RiskBracket> },
    Bare(Vec<RiskBracket>),
}

/// Load a JSON risk table, either `{"brackets": [...]}` or a bare array
pub fn load_risk_table(path: &str) -> Result<Vec<RiskBracket>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| BotError::Configuration(format!("cannot read risk table {}: {}", path, e)))?;
    parse_risk_table(&raw)
}

pub fn parse_risk_table(raw: &str) -> Result<Vec<RiskBracket>> {
    let table: RiskTableFile = serde_json::from_str(raw)
        .map_err(|e| BotError::Configuration(format!("invalid risk table: {}", e)))?;
    Ok(match table {
        RiskTableFile::Wrapped { brackets } => brackets,
        RiskTableFile::Bare(brackets) => brackets,
    })
}
