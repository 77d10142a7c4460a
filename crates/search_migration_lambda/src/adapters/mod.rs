pub mod ambient;
pub mod search_client;
pub mod signing;
