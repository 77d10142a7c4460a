use std::collections::BTreeMap;

pub const DEFAULT_HISTORY_INDEX: &str = "opensearch_changelog";
pub const DEFAULT_LOCATIONS: [&str; 2] = [
    "classpath:opensearch_migration/base",
    "classpath:opensearch_migration/dev",
];

/// Settings for one migration session. Constructed per invocation and not
/// mutated while the session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub enabled: bool,
    pub locations: Vec<String>,
    pub history_index: String,
    pub validate_on_migrate: bool,
    pub out_of_order: bool,
    pub placeholders: BTreeMap<String, String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            locations: DEFAULT_LOCATIONS.iter().map(|value| value.to_string()).collect(),
            history_index: DEFAULT_HISTORY_INDEX.to_string(),
            validate_on_migrate: false,
            out_of_order: true,
            placeholders: BTreeMap::from([("env".to_string(), "dev".to_string())]),
        }
    }
}
