//! Database models and repositories for the job core.
//!
//! Repositories are stateless structs with static async methods taking
//! a `&PgPool`; all coordination happens through conditional SQL
//! updates, never through in-process locks.

pub mod models;
pub mod repositories;

/// Shared connection pool type.
pub type DbPool = sqlx::PgPool;

/// Connect to Postgres with a bounded pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
