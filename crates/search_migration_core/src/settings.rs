//! Invocation settings resolved from environment-style key lookups.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::MigrationConfig;
use crate::endpoint::Endpoint;
use crate::error::ConfigurationError;

pub const ENDPOINT_VAR: &str = "OPENSEARCH_DOMAIN_ENDPOINT";
pub const REGION_VAR: &str = "AWS_REGION";
pub const SERVICE_VAR: &str = "SERVICE";
pub const ENABLED_VAR: &str = "MIGRATION_ENABLED";
pub const LOCATIONS_VAR: &str = "MIGRATION_LOCATIONS";
pub const HISTORY_INDEX_VAR: &str = "MIGRATION_HISTORY_INDEX";
pub const VALIDATE_VAR: &str = "MIGRATION_VALIDATE_ON_MIGRATE";
pub const OUT_OF_ORDER_VAR: &str = "MIGRATION_OUT_OF_ORDER";
pub const PLACEHOLDERS_VAR: &str = "MIGRATION_PLACEHOLDERS";
pub const SCRIPTS_ROOT_VAR: &str = "MIGRATION_SCRIPTS_ROOT";
pub const LAMBDA_TASK_ROOT_VAR: &str = "LAMBDA_TASK_ROOT";

pub const DEFAULT_SIGNING_SERVICE: &str = "es";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Raw endpoint; parsed by the runner so a missing value surfaces as a
    /// configuration failure of the run itself.
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub service: String,
    pub scripts_root: PathBuf,
    pub migration: MigrationConfig,
}

impl RunnerSettings {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let defaults = MigrationConfig::default();
        let migration = MigrationConfig {
            enabled: parse_flag(ENABLED_VAR, value(ENABLED_VAR), defaults.enabled)?,
            locations: value(LOCATIONS_VAR)
                .map(|raw| parse_list(&raw))
                .unwrap_or(defaults.locations),
            history_index: value(HISTORY_INDEX_VAR).unwrap_or(defaults.history_index),
            validate_on_migrate: parse_flag(
                VALIDATE_VAR,
                value(VALIDATE_VAR),
                defaults.validate_on_migrate,
            )?,
            out_of_order: parse_flag(
                OUT_OF_ORDER_VAR,
                value(OUT_OF_ORDER_VAR),
                defaults.out_of_order,
            )?,
            placeholders: match value(PLACEHOLDERS_VAR) {
                Some(raw) => parse_placeholders(&raw)?,
                None => defaults.placeholders,
            },
        };

        if migration.locations.is_empty() {
            return Err(ConfigurationError::InvalidSetting {
                key: LOCATIONS_VAR.to_string(),
                reason: "at least one location is required".to_string(),
            });
        }

        let scripts_root = value(SCRIPTS_ROOT_VAR)
            .or_else(|| value(LAMBDA_TASK_ROOT_VAR))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            endpoint: value(ENDPOINT_VAR),
            region: value(REGION_VAR),
            service: value(SERVICE_VAR).unwrap_or_else(|| DEFAULT_SIGNING_SERVICE.to_string()),
            scripts_root,
            migration,
        })
    }

    pub fn resolve_endpoint(&self) -> Result<Endpoint, ConfigurationError> {
        let raw = self
            .endpoint
            .as_deref()
            .ok_or(ConfigurationError::MissingEndpoint)?;
        Endpoint::parse(raw)
    }

    /// Configured region, else the region embedded in a managed-domain host.
    pub fn resolve_region(&self, endpoint: &Endpoint) -> Result<String, ConfigurationError> {
        self.region
            .clone()
            .or_else(|| endpoint.inferred_region().map(str::to_string))
            .ok_or_else(|| ConfigurationError::MissingRegion {
                host: endpoint.host().to_string(),
            })
    }
}

fn parse_flag(key: &str, raw: Option<String>, default: bool) -> Result<bool, ConfigurationError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigurationError::InvalidSetting {
            key: key.to_string(),
            reason: format!("'{raw}' is not a boolean"),
        }),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_placeholders(raw: &str) -> Result<BTreeMap<String, String>, ConfigurationError> {
    let mut placeholders = BTreeMap::new();
    for pair in parse_list(raw) {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(ConfigurationError::InvalidSetting {
                key: PLACEHOLDERS_VAR.to_string(),
                reason: format!("'{pair}' must look like name=value"),
            });
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigurationError::InvalidSetting {
                key: PLACEHOLDERS_VAR.to_string(),
                reason: "placeholder names cannot be empty".to_string(),
            });
        }
        placeholders.insert(name.to_string(), value.trim().to_string());
    }
    Ok(placeholders)
}
