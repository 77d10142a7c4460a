use std::future::Future;
use std::time::Instant;

use aws_credential_types::Credentials;
use search_migration_core::error::{ConfigurationError, MigrationError};
use search_migration_core::log::{log_error, log_info};
use search_migration_core::session::{
    EvolutionSessionFactory, MigrationReport, SessionFactory,
};
use search_migration_core::settings::RunnerSettings;
use serde_json::json;

use crate::adapters::ambient::AmbientAws;
use crate::adapters::search_client::SignedSearchClient;
use crate::adapters::signing::RequestSigner;

const COMPONENT: &str = "migration_runner";

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("migration failed: {0}")]
    Migration(#[from] MigrationError),
}

/// One migration attempt against one cluster. Settings and credentials are
/// supplied by the caller; nothing is read from the process environment.
pub struct MigrationRunner<F: SessionFactory> {
    settings: RunnerSettings,
    credentials: Option<Credentials>,
    factory: F,
}

impl MigrationRunner<EvolutionSessionFactory> {
    /// Runner backed by the `.http` script session rooted at the configured
    /// scripts directory.
    pub fn with_evolution_session(
        settings: RunnerSettings,
        credentials: Option<Credentials>,
    ) -> Self {
        let factory = EvolutionSessionFactory::new(settings.scripts_root.clone());
        Self::new(settings, credentials, factory)
    }
}

/// Build the runner for one invocation. The endpoint is validated before
/// `load_ambient` is awaited, so a misconfigured function fails without
/// touching the network.
///
/// The ambient region is used only when neither `AWS_REGION` nor the endpoint
/// host names one.
pub async fn prepare_runner<L, Fut>(
    mut settings: RunnerSettings,
    load_ambient: L,
) -> Result<MigrationRunner<EvolutionSessionFactory>, ConfigurationError>
where
    L: FnOnce() -> Fut,
    Fut: Future<Output = AmbientAws>,
{
    let endpoint = match settings.resolve_endpoint() {
        Ok(endpoint) => endpoint,
        Err(error) => {
            log_error(COMPONENT, "run_failed", json!({ "error": error.to_string() }));
            return Err(error);
        }
    };

    let ambient = load_ambient().await;
    if settings.region.is_none() && endpoint.inferred_region().is_none() {
        settings.region = ambient.region;
    }
    Ok(MigrationRunner::with_evolution_session(
        settings,
        ambient.credentials,
    ))
}

impl<F: SessionFactory> MigrationRunner<F> {
    pub fn new(settings: RunnerSettings, credentials: Option<Credentials>, factory: F) -> Self {
        Self {
            settings,
            credentials,
            factory,
        }
    }

    pub fn run(&self) -> Result<MigrationReport, RunError> {
        let started_at = Instant::now();
        match self.run_session() {
            Ok(report) => {
                log_info(
                    COMPONENT,
                    "run_completed",
                    json!({
                        "applied": report.applied.clone(),
                        "skipped": report.skipped.clone(),
                        "already_applied": report.already_applied,
                        "duration_ms": started_at.elapsed().as_millis(),
                    }),
                );
                Ok(report)
            }
            Err(error) => {
                log_error(
                    COMPONENT,
                    "run_failed",
                    json!({
                        "error": error.to_string(),
                        "duration_ms": started_at.elapsed().as_millis(),
                    }),
                );
                Err(error)
            }
        }
    }

    fn run_session(&self) -> Result<MigrationReport, RunError> {
        let endpoint = self.settings.resolve_endpoint()?;
        let region = self.settings.resolve_region(&endpoint)?;
        let credentials = self.credentials.clone().ok_or_else(|| {
            ConfigurationError::MissingCredentials("credential chain returned nothing".to_string())
        })?;

        log_info(
            COMPONENT,
            "run_started",
            json!({
                "endpoint": endpoint.base_url(),
                "region": region,
                "service": self.settings.service,
                "history_index": self.settings.migration.history_index,
                "locations": self.settings.migration.locations,
            }),
        );

        let signer = RequestSigner::new(self.settings.service.clone(), region, credentials);
        let client =
            SignedSearchClient::new(endpoint, signer, None).map_err(MigrationError::from)?;

        let mut session = self
            .factory
            .configure(self.settings.migration.clone(), Box::new(client))?;
        Ok(session.run()?)
    }
}
