//! Connection abstraction for batch execution.
//!
//! A batch only needs two capabilities from the driver: executing a
//! multi-statement text (writes) and running one query returning typed rows
//! (reads). The trait is implemented for `tokio_postgres::Client`, for
//! `tokio_postgres::Transaction` (so batches compose with surrounding
//! transactions), and for a pooled client behind the `pool` feature.

use tokio_postgres::Row;

use crate::error::{BatchError, BatchResult};

/// The driver capabilities consumed by [`Batch::run`](crate::Batch::run).
pub trait Connection: Send + Sync {
    /// Execute statement text without reading rows back.
    ///
    /// The text may contain several `"; "`-joined statements, so
    /// implementations must use the simple query protocol (the extended
    /// protocol rejects multi-statement strings).
    fn exec(&self, sql: &str) -> impl std::future::Future<Output = BatchResult<()>> + Send;

    /// Run one statement and return all result rows.
    fn query(&self, sql: &str) -> impl std::future::Future<Output = BatchResult<Vec<Row>>> + Send;
}

impl Connection for tokio_postgres::Client {
    async fn exec(&self, sql: &str) -> BatchResult<()> {
        self.batch_execute(sql).await.map_err(BatchError::from)
    }

    async fn query(&self, sql: &str) -> BatchResult<Vec<Row>> {
        tokio_postgres::Client::query(self, sql, &[])
            .await
            .map_err(BatchError::from)
    }
}

impl Connection for tokio_postgres::Transaction<'_> {
    async fn exec(&self, sql: &str) -> BatchResult<()> {
        self.batch_execute(sql).await.map_err(BatchError::from)
    }

    async fn query(&self, sql: &str) -> BatchResult<Vec<Row>> {
        tokio_postgres::Transaction::query(self, sql, &[])
            .await
            .map_err(BatchError::from)
    }
}

/// Wrapper for `deadpool_postgres::Client` to implement [`Connection`].
#[cfg(feature = "pool")]
pub struct PoolClient(deadpool_postgres::Client);

#[cfg(feature = "pool")]
impl PoolClient {
    pub fn new(client: deadpool_postgres::Client) -> Self {
        Self(client)
    }

    pub fn inner(&self) -> &deadpool_postgres::Client {
        &self.0
    }

    pub fn into_inner(self) -> deadpool_postgres::Client {
        self.0
    }
}

#[cfg(feature = "pool")]
impl std::ops::Deref for PoolClient {
    type Target = deadpool_postgres::Client;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(feature = "pool")]
impl Connection for PoolClient {
    async fn exec(&self, sql: &str) -> BatchResult<()> {
        self.0.batch_execute(sql).await.map_err(BatchError::from)
    }

    async fn query(&self, sql: &str) -> BatchResult<Vec<Row>> {
        self.0.query(sql, &[]).await.map_err(BatchError::from)
    }
}
