//! PostgreSQL statement execution

use crate::core::environment::ConnectionDescriptor;
use crate::database::{SqlExecutor, SqlFailure};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection, Executor};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Executes statements with the simple query protocol, so statements that
/// cannot run inside a transaction (`CREATE DATABASE`) work.
pub struct PgSqlExecutor {
    timeout: Duration,
}

impl PgSqlExecutor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn options(connection: &ConnectionDescriptor) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&connection.host)
            .port(connection.port)
            .username(&connection.user)
            .password(&connection.password);
        match &connection.database {
            Some(database) => options.database(database),
            None => options,
        }
    }

    async fn connect(&self, connection: &ConnectionDescriptor) -> Result<PgConnection, SqlFailure> {
        let failure = |message: String| SqlFailure {
            statement: None,
            message,
        };

        timeout(self.timeout, Self::options(connection).connect())
            .await
            .map_err(|_| failure(format!("timed out connecting to {}", connection)))?
            .map_err(|e| failure(format!("failed to connect to {}: {}", connection, e)))
    }
}

#[async_trait]
impl SqlExecutor for PgSqlExecutor {
    async fn execute(
        &self,
        connection: &ConnectionDescriptor,
        statements: &[String],
    ) -> Result<(), SqlFailure> {
        let mut conn = self.connect(connection).await?;

        for (index, statement) in statements.iter().enumerate() {
            debug!("Executing statement {} on {}", index + 1, connection);

            let failure = |message: String| SqlFailure {
                statement: Some(index + 1),
                message,
            };

            timeout(self.timeout, (&mut conn).execute(sqlx::raw_sql(statement)))
                .await
                .map_err(|_| failure(format!("timed out after {} seconds", self.timeout.as_secs())))?
                .map_err(|e| failure(e.to_string()))?;
        }

        if let Err(e) = conn.close().await {
            debug!("Error closing connection to {}: {}", connection, e);
        }
        Ok(())
    }
}
