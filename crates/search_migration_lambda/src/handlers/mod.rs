pub mod migrate;
pub mod query;
