//! `PostgreSQL` adapters for tool configuration and catalog persistence.

mod models;
mod repository;
mod schema;

pub use repository::{PostgresToolRepository, ToolPgPool};
