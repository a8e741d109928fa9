use crate::error::CliError;
use async_trait::async_trait;
use connectors::sql::postgres::adapter::PgAdapter;
use engine_config::settings::redact_url;
use tracing::{error, info};

/// Trait for "pinging" a data source
#[async_trait]
pub trait ConnectionPinger {
    /// Attempts to ping; returns Err if unreachable
    async fn ping(&self) -> Result<(), CliError>;
}

pub struct PostgresConnectionPinger {
    pub conn_str: String,
}

#[async_trait]
impl ConnectionPinger for PostgresConnectionPinger {
    async fn ping(&self) -> Result<(), CliError> {
        let target = redact_url(&self.conn_str);
        info!("Pinging Postgres at '{}'", target);

        let adapter = PgAdapter::connect(&self.conn_str).await.map_err(|e| {
            error!("Postgres connection to '{}' failed: {}", target, e);
            e
        })?;

        adapter.ping().await.map_err(|e| {
            error!("Postgres ping query on '{}' failed: {}", target, e);
            e
        })?;

        info!("Postgres at '{}' is reachable", target);
        Ok(())
    }
}
