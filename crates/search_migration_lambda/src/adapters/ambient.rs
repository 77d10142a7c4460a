//! Region and credentials supplied by the Lambda execution environment.

use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use search_migration_core::log::log_error;
use serde_json::json;

const COMPONENT: &str = "ambient_aws";

#[derive(Debug, Clone, Default)]
pub struct AmbientAws {
    pub region: Option<String>,
    /// `None` when the chain produced nothing; callers report it as a
    /// configuration failure.
    pub credentials: Option<Credentials>,
}

impl AmbientAws {
    /// Resolve the SDK default chains. This may reach IMDS, the ECS
    /// credentials endpoint or STS.
    pub async fn load() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let credentials = match config.credentials_provider() {
            Some(provider) => match provider.provide_credentials().await {
                Ok(credentials) => Some(credentials),
                Err(error) => {
                    log_error(
                        COMPONENT,
                        "credentials_unavailable",
                        json!({ "error": error.to_string() }),
                    );
                    None
                }
            },
            None => None,
        };

        Self {
            region: config.region().map(|region| region.to_string()),
            credentials,
        }
    }
}
