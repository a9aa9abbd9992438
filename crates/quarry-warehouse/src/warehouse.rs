//! Raw warehouse operations, one credential per call.

use async_trait::async_trait;
use quarry_auth::Credential;

use crate::error::WarehouseError;
use crate::schema::{QueryJobConfig, QueryResult, TableId, TableSchema};

/// Unscoped warehouse API. Implementations do no allow-list filtering and
/// never retry.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Dataset IDs in the project, in API order. `max_results` limits the
    /// call to a single page.
    async fn list_datasets(
        &self,
        credential: &Credential,
        max_results: Option<u32>,
    ) -> Result<Vec<String>, WarehouseError>;

    /// Table IDs in a dataset, in API order.
    async fn list_tables(
        &self,
        credential: &Credential,
        dataset: &str,
    ) -> Result<Vec<String>, WarehouseError>;

    async fn get_table(
        &self,
        credential: &Credential,
        table: &TableId,
    ) -> Result<TableSchema, WarehouseError>;

    /// Run a query job to completion and collect its rows.
    async fn run_query(
        &self,
        credential: &Credential,
        sql: &str,
        job: &QueryJobConfig,
    ) -> Result<QueryResult, WarehouseError>;
}
