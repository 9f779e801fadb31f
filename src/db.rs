use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

use crate::config::AppConfig;

/// Errors surfaced by the repository layer.
#[derive(Debug, Error)]
pub enum RepoError {
    /// A unique constraint rejected the write (lost a race or duplicate input).
    #[error("duplicate {0}")]
    Conflict(&'static str),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("connect to database")?;
    Ok(db)
}

pub async fn migrate(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")?;
    Ok(())
}

/// Map a unique violation on one of `constraints` to [`RepoError::Conflict`].
pub(crate) fn map_unique(err: sqlx::Error, constraints: &[(&str, &'static str)]) -> RepoError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let hit = db_err.constraint().and_then(|name| {
                constraints
                    .iter()
                    .find(|(constraint, _)| *constraint == name)
                    .map(|(_, field)| *field)
            });
            return RepoError::Conflict(hit.unwrap_or("record"));
        }
    }
    RepoError::Database(err)
}
