//! AWS-oriented adapters and handlers for search-cluster migrations.
//!
//! This crate owns runtime integration details (Lambda handlers, SigV4 request
//! signing, the blocking HTTP client) and exposes the migration primitives of
//! `search_migration_core` through a single runtime module boundary.

pub mod adapters;
pub mod handlers;

pub mod runtime {
    pub use search_migration_core::*;
}
