use std::time::Duration;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use search_migration_lambda::adapters::ambient::AmbientAws;
use search_migration_lambda::adapters::search_client::SignedSearchClient;
use search_migration_lambda::handlers::query::{
    fallback_on_error, fetch_index_templates, prepare_query,
};
use search_migration_lambda::runtime::settings::RunnerSettings;
use serde_json::Value;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

async fn handle_request(_event: LambdaEvent<Value>) -> Result<Value, Error> {
    let target = match RunnerSettings::from_env() {
        Ok(settings) => prepare_query(settings, AmbientAws::load).await,
        Err(error) => Err(error),
    };
    let (endpoint, signer) = match target {
        Ok(target) => target,
        Err(error) => return Ok(fallback_on_error("configuration_failed", &error)),
    };

    tokio::task::spawn_blocking(move || {
        match SignedSearchClient::new(endpoint, signer, Some(REQUEST_TIMEOUT)) {
            Ok(client) => fetch_index_templates(&client),
            Err(error) => fallback_on_error("client_unavailable", &error),
        }
    })
    .await
    .map_err(|error| Error::from(format!("query task did not complete: {error}")))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
