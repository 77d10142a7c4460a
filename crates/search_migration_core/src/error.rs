use std::path::PathBuf;

/// Settings, endpoint, region or credentials could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("OPENSEARCH_DOMAIN_ENDPOINT must be configured")]
    MissingEndpoint,

    #[error("invalid search endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("AWS_REGION must be configured (could not infer a region from '{host}')")]
    MissingRegion { host: String },

    #[error("no AWS credentials could be resolved: {0}")]
    MissingCredentials(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}

/// Failure of the transport underneath a migration session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("failed to sign request: {0}")]
    Signing(String),

    #[error("failed to build request: {0}")]
    Request(String),

    #[error("request to search cluster failed: {0}")]
    Http(String),
}

/// Any failure reported by a migration session.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to read script location '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid migration script '{script}': {message}")]
    Script { script: String, message: String },

    #[error("duplicate migration version {version} in '{first}' and '{second}'")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },

    #[error("history index '{index}': {message}")]
    History { index: String, message: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("script '{script}' failed with status {status}: {body}")]
    ScriptFailed {
        script: String,
        status: u16,
        body: String,
    },
}
