use std::sync::Arc;

use log::info;

use crate::config::Settings;

pub mod models;
pub mod postgres;

pub use postgres::PostgresClient;

/// The single Persistence implementation: a pooled PostgreSQL connection,
/// migrated to the `indexer` schema on startup.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    pub async fn new(settings: Arc<Settings>) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(settings.postgres.clone()).await?;
        postgres.migrate().await?;
        info!("Persistence ready (PostgreSQL, schema `indexer`)");

        Ok(Self {
            postgres: Arc::new(postgres),
        })
    }
}
