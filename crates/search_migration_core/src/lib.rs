//! Search-cluster migration primitives.
//!
//! This crate owns the migration session (script discovery, ordering, history
//! tracking) and the settings/endpoint model. It intentionally excludes AWS
//! SDK, request signing and Lambda runtime concerns; those live in
//! `search_migration_lambda` behind the [`transport::SearchTransport`] seam.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod history;
pub mod log;
pub mod plan;
pub mod scripts;
pub mod session;
pub mod settings;
pub mod transport;
