use crate::{adapters::persistence::PostgresPersistence, infra::db::init_db};

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod setup;
pub mod stripe_client;
pub mod stripe_signature;

pub async fn postgres_persistence(
    database_url: &str,
) -> Result<PostgresPersistence, error::InfraError> {
    let pool = init_db(database_url).await?;
    Ok(PostgresPersistence::new(pool))
}
