//! Postgres-backed repository and queue implementations.

mod articles;
mod jobs;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    query,
    postgres::{PgPool, PgPoolOptions},
};

/// One pool per process, shared by every repository and the job queue.
#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
    worker_id: Arc<str>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        let worker_id = format!("pressroom-{}", uuid::Uuid::new_v4());
        Self {
            pool: Arc::new(pool),
            worker_id: Arc::from(worker_id),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Identity recorded in `jobs.lock_by` for jobs this process claims.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
