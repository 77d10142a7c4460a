use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;

use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::history::{HistoryEntry, HistoryIndex};
use crate::log::{log_error, log_info};
use crate::plan::plan_migration;
use crate::scripts::{discover_scripts, MigrationScript};
use crate::transport::SearchTransport;

const COMPONENT: &str = "migration_session";

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub enabled: bool,
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    pub already_applied: usize,
}

impl MigrationReport {
    pub fn disabled() -> Self {
        Self::default()
    }
}

pub trait MigrationSession {
    fn run(&mut self) -> Result<MigrationReport, MigrationError>;
}

/// Builds a session for one invocation from its configuration and an
/// authenticated transport.
pub trait SessionFactory {
    fn configure(
        &self,
        config: MigrationConfig,
        transport: Box<dyn SearchTransport + Send>,
    ) -> Result<Box<dyn MigrationSession + Send>, MigrationError>;
}

/// Versioned `.http` script runner tracking applied versions in a history
/// index.
pub struct EvolutionSession {
    config: MigrationConfig,
    scripts_root: PathBuf,
    transport: Box<dyn SearchTransport + Send>,
}

impl EvolutionSession {
    pub fn new(
        config: MigrationConfig,
        scripts_root: impl Into<PathBuf>,
        transport: Box<dyn SearchTransport + Send>,
    ) -> Self {
        Self {
            config,
            scripts_root: scripts_root.into(),
            transport,
        }
    }

    fn execute(
        &self,
        history: &HistoryIndex<'_>,
        script: &MigrationScript,
    ) -> Result<(), MigrationError> {
        let request = script.to_request(&self.config.placeholders)?;
        let started_at = Instant::now();
        let outcome = self.transport.send(&request);
        let elapsed_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);

        let failure = match outcome {
            Ok(response) if response.is_success() => None,
            Ok(response) => Some(MigrationError::ScriptFailed {
                script: script.file_name.clone(),
                status: response.status,
                body: response.body,
            }),
            Err(error) => Some(MigrationError::Transport(error)),
        };

        let entry = HistoryEntry {
            version: script.version.to_string(),
            description: script.description.clone(),
            script: script.file_name.clone(),
            checksum: script.checksum.clone(),
            execution_timestamp: chrono::Utc::now().to_rfc3339(),
            execution_runtime_in_millis: elapsed_ms,
            success: failure.is_none(),
        };

        match failure {
            None => {
                history.record(&entry)?;
                log_info(
                    COMPONENT,
                    "script_applied",
                    json!({
                        "version": entry.version,
                        "script": entry.script,
                        "duration_ms": elapsed_ms,
                    }),
                );
                Ok(())
            }
            Some(error) => {
                log_error(
                    COMPONENT,
                    "script_failed",
                    json!({
                        "version": entry.version,
                        "script": entry.script,
                        "error": error.to_string(),
                    }),
                );
                // the original failure outranks a failure to record it
                if let Err(record_error) = history.record(&entry) {
                    log_error(
                        COMPONENT,
                        "history_record_failed",
                        json!({ "script": entry.script, "error": record_error.to_string() }),
                    );
                }
                Err(error)
            }
        }
    }
}

impl MigrationSession for EvolutionSession {
    fn run(&mut self) -> Result<MigrationReport, MigrationError> {
        if !self.config.enabled {
            log_info(COMPONENT, "session_disabled", json!({}));
            return Ok(MigrationReport::disabled());
        }

        let scripts = discover_scripts(&self.config.locations, &self.scripts_root)?;
        let history = HistoryIndex::new(&self.config.history_index, self.transport.as_ref());
        history.ensure_exists()?;
        let applied = history.applied_versions()?;

        let plan = plan_migration(
            &scripts,
            &applied,
            self.config.out_of_order,
            self.config.validate_on_migrate,
        )?;

        for script in &plan.skipped {
            log_info(
                COMPONENT,
                "script_skipped",
                json!({
                    "version": script.version.to_string(),
                    "script": script.file_name,
                    "reason": "version is below the latest applied version and out_of_order is disabled",
                }),
            );
        }

        let mut report = MigrationReport {
            enabled: true,
            applied: Vec::with_capacity(plan.pending.len()),
            skipped: plan
                .skipped
                .iter()
                .map(|script| script.version.to_string())
                .collect(),
            already_applied: plan.already_applied,
        };

        for script in plan.pending {
            self.execute(&history, script)?;
            report.applied.push(script.version.to_string());
        }

        Ok(report)
    }
}

#[derive(Debug, Clone)]
pub struct EvolutionSessionFactory {
    scripts_root: PathBuf,
}

impl EvolutionSessionFactory {
    pub fn new(scripts_root: impl Into<PathBuf>) -> Self {
        Self {
            scripts_root: scripts_root.into(),
        }
    }
}

impl SessionFactory for EvolutionSessionFactory {
    fn configure(
        &self,
        config: MigrationConfig,
        transport: Box<dyn SearchTransport + Send>,
    ) -> Result<Box<dyn MigrationSession + Send>, MigrationError> {
        Ok(Box::new(EvolutionSession::new(
            config,
            self.scripts_root.clone(),
            transport,
        )))
    }
}
