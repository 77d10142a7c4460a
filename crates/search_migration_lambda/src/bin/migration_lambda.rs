use lambda_runtime::{service_fn, Error, LambdaEvent};
use search_migration_lambda::adapters::ambient::AmbientAws;
use search_migration_lambda::handlers::migrate::prepare_runner;
use search_migration_lambda::runtime::settings::RunnerSettings;
use serde_json::Value;

async fn handle_request(_event: LambdaEvent<Value>) -> Result<(), Error> {
    let settings = RunnerSettings::from_env().map_err(Error::from)?;
    let runner = prepare_runner(settings, AmbientAws::load)
        .await
        .map_err(Error::from)?;

    tokio::task::spawn_blocking(move || runner.run())
        .await
        .map_err(|error| Error::from(format!("migration task did not complete: {error}")))?
        .map(|_| ())
        .map_err(Error::from)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
