pub mod api;
pub mod config;
pub mod mcp;
pub mod models;
pub mod subscriptions;
pub mod utils;
