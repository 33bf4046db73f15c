use sqlx::PgPool;

use crate::app_error::AppError;

pub mod billing_record;
pub mod event_log;
pub mod plan;
pub mod subscription;
pub mod user;

/// Postgres-backed implementation of every billing repository.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let code = match &err {
            sqlx::Error::RowNotFound => return AppError::NotFound,
            sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
            _ => None,
        };

        match code.as_deref() {
            Some(UNIQUE_VIOLATION) => {
                AppError::InvalidInput("Stripe object is already bound to another record".into())
            }
            Some(FOREIGN_KEY_VIOLATION) => {
                AppError::InvalidInput("Billing row references an unknown user or plan".into())
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}
