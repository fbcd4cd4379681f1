//! Database bootstrap: ordered SQL scripts against an environment connection

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod statements;

#[cfg(feature = "postgres")]
pub use postgres::PgSqlExecutor;
pub use statements::split_statements;

use crate::core::environment::ConnectionDescriptor;
use crate::core::error::{PipelineError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Why a batch of statements stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFailure {
    /// 1-based index of the failing statement; `None` when the failure
    /// happened before any statement ran (e.g. connecting)
    pub statement: Option<usize>,
    pub message: String,
}

/// Executes statements over a single connection, in order, stopping at the
/// first failure
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(
        &self,
        connection: &ConnectionDescriptor,
        statements: &[String],
    ) -> std::result::Result<(), SqlFailure>;
}

/// Runs SQL script files in order. There is no rollback: statements that
/// succeeded before a failure stay applied.
pub struct DatabaseBootstrapper {
    executor: Arc<dyn SqlExecutor>,
    base_dir: PathBuf,
}

impl DatabaseBootstrapper {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            executor,
            base_dir: PathBuf::from("."),
        }
    }

    /// Directory that relative script paths are read from
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Run each script; returns the total number of statements executed
    pub async fn run(&self, scripts: &[String], connection: &ConnectionDescriptor) -> Result<usize> {
        let mut executed = 0;

        for script in scripts {
            let path = self.base_dir.join(script);
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| PipelineError::io(format!("Failed to read SQL script {}", path.display()), e))?;

            let statements = split_statements(&content);
            info!(
                "Running {} ({} statement(s)) against {}",
                script,
                statements.len(),
                connection
            );

            self.executor
                .execute(connection, &statements)
                .await
                .map_err(|failure| PipelineError::SqlScriptFailed {
                    script: script.clone(),
                    statement: failure.statement,
                    message: failure.message,
                })?;

            executed += statements.len();
        }

        Ok(executed)
    }
}

/// Stand-in used when the crate is built without a database driver
#[derive(Debug, Default)]
pub struct UnsupportedSqlExecutor;

#[async_trait]
impl SqlExecutor for UnsupportedSqlExecutor {
    async fn execute(
        &self,
        _connection: &ConnectionDescriptor,
        _statements: &[String],
    ) -> std::result::Result<(), SqlFailure> {
        Err(SqlFailure {
            statement: None,
            message: "relpipe was built without the postgres feature".to_string(),
        })
    }
}
