use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// One result row: column name to JSON value, in result column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_MAX_ROWS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QueryBackendError {
    message: String,
}

impl QueryBackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum QueryRunnerError {
    #[error("query backend failed: {0}")]
    Backend(#[source] QueryBackendError),
}

impl QueryRunnerError {
    /// Message reported by the backend, without the wrapper prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Backend(error) => error.message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRows {
    pub rows: Vec<Row>,
    /// The row cap was reached and the stream was cancelled.
    pub truncated: bool,
    pub elapsed: Duration,
}

#[async_trait]
pub trait QueryRowStream: Send {
    async fn next_row(&mut self) -> Result<Option<Row>, QueryBackendError>;

    async fn cancel(&mut self) -> Result<(), QueryBackendError> {
        Ok(())
    }
}

#[async_trait]
pub trait QueryBackend: Send + Sync {
    type Stream: QueryRowStream + Send;

    async fn start_query(&self, sql: &str) -> Result<Self::Stream, QueryBackendError>;
}

#[derive(Debug)]
pub struct QueryRunner<B: QueryBackend> {
    backend: B,
    max_rows: usize,
}

impl<B: QueryBackend> QueryRunner<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    #[must_use]
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    #[must_use]
    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Collects at most `max_rows` rows of one statement.
    pub async fn fetch_rows(&self, sql: &str) -> Result<FetchedRows, QueryRunnerError> {
        self.fetch_rows_capped(sql, self.max_rows).await
    }

    /// Collects at most `max_rows` rows, ignoring the runner's own cap.
    pub async fn fetch_rows_capped(
        &self,
        sql: &str,
        max_rows: usize,
    ) -> Result<FetchedRows, QueryRunnerError> {
        let max_rows = max_rows.max(1);
        let started_at = Instant::now();
        let mut stream = self
            .backend
            .start_query(sql)
            .await
            .map_err(QueryRunnerError::Backend)?;

        let mut rows = Vec::new();
        while rows.len() < max_rows {
            let maybe_row = stream.next_row().await.map_err(QueryRunnerError::Backend)?;
            let Some(row) = maybe_row else {
                return Ok(FetchedRows {
                    rows,
                    truncated: false,
                    elapsed: started_at.elapsed(),
                });
            };
            rows.push(row);
        }

        debug!(max_rows, "row cap reached, cancelling stream");
        stream.cancel().await.map_err(QueryRunnerError::Backend)?;

        Ok(FetchedRows {
            rows,
            truncated: true,
            elapsed: started_at.elapsed(),
        })
    }
}
