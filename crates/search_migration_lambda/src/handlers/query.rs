use std::fmt::Display;
use std::future::Future;

use search_migration_core::endpoint::Endpoint;
use search_migration_core::error::ConfigurationError;
use search_migration_core::log::{log_error, log_info};
use search_migration_core::settings::RunnerSettings;
use search_migration_core::transport::{Method, SearchRequest, SearchTransport};
use serde_json::{json, Value};

use crate::adapters::ambient::AmbientAws;
use crate::adapters::signing::RequestSigner;

pub const INDEX_TEMPLATE_PATTERN: &str = "cicd*";
pub const NO_TEMPLATES_MESSAGE: &str = "No index patterns created by Terraform or Evolution";

const COMPONENT: &str = "query_handler";

/// Resolve endpoint, region and credentials for a template query. The
/// endpoint is validated before `load_ambient` is awaited.
pub async fn prepare_query<L, Fut>(
    settings: RunnerSettings,
    load_ambient: L,
) -> Result<(Endpoint, RequestSigner), ConfigurationError>
where
    L: FnOnce() -> Fut,
    Fut: Future<Output = AmbientAws>,
{
    let endpoint = settings.resolve_endpoint()?;
    let ambient = load_ambient().await;

    let region = match settings.resolve_region(&endpoint) {
        Ok(region) => region,
        Err(error) => ambient.region.ok_or(error)?,
    };
    let credentials = ambient.credentials.ok_or_else(|| {
        ConfigurationError::MissingCredentials("credential chain returned nothing".to_string())
    })?;

    Ok((endpoint, RequestSigner::new(settings.service, region, credentials)))
}

/// Fetch the index templates created by the migration pipeline.
///
/// Never fails: any transport, status or decoding problem collapses into
/// [`NO_TEMPLATES_MESSAGE`].
pub fn fetch_index_templates(transport: &dyn SearchTransport) -> Value {
    let request = SearchRequest::new(
        Method::Get,
        format!("/_index_template/{INDEX_TEMPLATE_PATTERN}"),
    );

    let response = match transport.send(&request) {
        Ok(response) => response,
        Err(error) => return fallback_on_error("request_failed", &error),
    };

    if !response.is_success() {
        return fallback(
            "unexpected_status",
            json!({ "status": response.status, "body": response.body }),
        );
    }

    match serde_json::from_str::<Value>(&response.body) {
        Ok(templates) => {
            log_info(
                COMPONENT,
                "templates_fetched",
                json!({
                    "endpoint": transport.endpoint().base_url(),
                    "count": templates
                        .get("index_templates")
                        .and_then(Value::as_array)
                        .map(Vec::len),
                }),
            );
            templates
        }
        Err(error) => fallback_on_error("malformed_response", &error),
    }
}

/// Log `error` under `event` and answer with [`NO_TEMPLATES_MESSAGE`].
pub fn fallback_on_error(event: &str, error: &dyn Display) -> Value {
    fallback(event, json!({ "error": error.to_string() }))
}

fn fallback(event: &str, details: Value) -> Value {
    log_error(COMPONENT, event, details);
    Value::String(NO_TEMPLATES_MESSAGE.to_string())
}
