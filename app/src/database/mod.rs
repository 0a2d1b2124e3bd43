use crate::concurrency::ConflictError;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use url::Url;

pub use migrations::run_migrations;
pub use seeder::seed_development_data;

mod migrations;
mod seeder;

pub type Database = sqlx::Pool<sqlx::Postgres>;
pub type Transaction = sqlx::Transaction<'static, sqlx::Postgres>;

/// Postgres error codes that mean "another unit of work got there first". These are safe to
/// retry because every settlement re-checks its idempotency key after taking its locks.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Conflict(#[from] ConflictError),
    #[error("storage failure: {0}")]
    Sqlx(#[source] sqlx::Error),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        let code = match &e {
            sqlx::Error::Database(db_error) => db_error.code().map(|code| code.into_owned()),
            _ => None,
        };
        match code.as_deref() {
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | UNIQUE_VIOLATION | LOCK_NOT_AVAILABLE) => {
                log::info!("classifying store error as a conflict: {}", e);
                Error::Conflict(ConflictError)
            }
            _ => Error::Sqlx(e),
        }
    }
}

pub async fn connect(url: &Url, max_connections: u32) -> Result<Database, Error> {
    Ok(PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url.as_str())
        .await?)
}

pub(crate) async fn begin(db: &Database) -> Result<Transaction, Error> {
    Ok(db.begin().await?)
}

pub(crate) async fn commit(data_tx: Transaction) -> Result<(), Error> {
    Ok(data_tx.commit().await?)
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CountRow {
    pub count: i64,
}

#[derive(Debug, sqlx::FromRow, Default)]
pub(crate) struct SumRow<T> {
    pub sum: T,
}
