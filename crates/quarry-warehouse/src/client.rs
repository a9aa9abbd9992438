//! Scoped warehouse operations on top of the active credential source.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use quarry_auth::{AuthError, Credential, CredentialSource};
use quarry_scope::DatasetScope;

use crate::error::WarehouseError;
use crate::schema::{
    QueryJobConfig, QueryResult, SkippedDataset, TableId, TableListing, TableRef, TableSchema,
};
use crate::warehouse::Warehouse;

/// The operation surface the tools call.
///
/// Every call acquires a credential first. A 401 from the warehouse
/// invalidates that credential and surfaces as an auth error; nothing is
/// retried here.
#[derive(Clone)]
pub struct WarehouseClient {
    warehouse: Arc<dyn Warehouse>,
    credentials: Arc<dyn CredentialSource>,
    scope: DatasetScope,
    query_defaults: QueryJobConfig,
}

impl WarehouseClient {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        credentials: Arc<dyn CredentialSource>,
        scope: DatasetScope,
    ) -> Self {
        Self {
            warehouse,
            credentials,
            scope,
            query_defaults: QueryJobConfig::default(),
        }
    }

    /// Defaults applied to each query job (timeout, row cap, byte limit).
    pub fn with_query_defaults(mut self, defaults: QueryJobConfig) -> Self {
        self.query_defaults = defaults;
        self
    }

    pub fn scope(&self) -> &DatasetScope {
        &self.scope
    }

    pub fn query_defaults(&self) -> &QueryJobConfig {
        &self.query_defaults
    }

    async fn credential(&self) -> Result<Credential, WarehouseError> {
        Ok(self.credentials.acquire().await?)
    }

    /// Turn a warehouse 401 into an auth error after invalidating the credential.
    async fn checked<T>(
        &self,
        credential: &Credential,
        result: Result<T, WarehouseError>,
    ) -> Result<T, WarehouseError> {
        match result {
            Err(WarehouseError::Unauthorized(message)) => {
                self.credentials.invalidate(credential).await;
                Err(WarehouseError::Auth(AuthError::NotAuthenticated(format!(
                    "BigQuery rejected the access token ({message})"
                ))))
            }
            other => other,
        }
    }

    /// Tables in every visible dataset.
    ///
    /// A dataset whose tables cannot be listed is recorded in `skipped`
    /// and the rest of the listing is still returned.
    #[instrument(skip(self))]
    pub async fn list_tables(&self) -> Result<TableListing, WarehouseError> {
        let credential = self.credential().await?;

        let result = self.warehouse.list_datasets(&credential, None).await;
        let datasets = self.checked(&credential, result).await?;
        let visible = self.scope.filter_datasets(datasets);

        let mut listing = TableListing::default();
        for dataset in visible {
            let result = self.warehouse.list_tables(&credential, &dataset).await;
            match self.checked(&credential, result).await {
                Ok(tables) => listing
                    .tables
                    .extend(tables.into_iter().map(|t| TableRef::new(&dataset, t))),
                Err(e @ WarehouseError::Auth(_)) => return Err(e),
                Err(e) => {
                    warn!(dataset = %dataset, error = %e, "Skipping dataset");
                    listing.skipped.push(SkippedDataset {
                        dataset,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            tables = listing.tables.len(),
            skipped = listing.skipped.len(),
            "Listed tables"
        );
        Ok(listing)
    }

    /// Column schema of one table. Tables outside the allow-list, or in
    /// another project while the list is set, are reported as not found.
    #[instrument(skip(self), fields(table = %table))]
    pub async fn describe_table(&self, table: &TableId) -> Result<TableSchema, WarehouseError> {
        if self
            .scope
            .check_in(table.project.as_deref(), &table.dataset)
            .is_err()
        {
            return Err(WarehouseError::NotFound(format!("table {table} not found")));
        }

        let credential = self.credential().await?;
        let result = self.warehouse.get_table(&credential, table).await;
        self.checked(&credential, result).await
    }

    /// Run a query job and return its rows.
    ///
    /// Queries are treated as read-only by convention; the warehouse does
    /// the parsing. References to datasets outside the allow-list are
    /// refused before the job is submitted.
    #[instrument(skip(self, sql, job), fields(dry_run = job.dry_run, params = job.params.len()))]
    pub async fn execute_query(
        &self,
        sql: &str,
        job: QueryJobConfig,
    ) -> Result<QueryResult, WarehouseError> {
        self.scope
            .check_query(sql)
            .map_err(|e| WarehouseError::PermissionDenied(e.to_string()))?;

        let credential = self.credential().await?;
        let result = self.warehouse.run_query(&credential, sql, &job).await;
        self.checked(&credential, result).await
    }

    /// Cheap connectivity check: list at most one dataset.
    #[instrument(skip(self))]
    pub async fn probe(&self) -> Result<(), WarehouseError> {
        let credential = self.credential().await?;
        let result = self.warehouse.list_datasets(&credential, Some(1)).await;
        self.checked(&credential, result).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use quarry_auth::SourceKind;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeWarehouse {
        datasets: Vec<(String, Result<Vec<String>, u16>)>,
        calls: Mutex<Vec<String>>,
        reject_token: bool,
    }

    impl FakeWarehouse {
        fn with(datasets: &[(&str, &[&str])]) -> Self {
            Self {
                datasets: datasets
                    .iter()
                    .map(|(d, ts)| {
                        (d.to_string(), Ok(ts.iter().map(|t| t.to_string()).collect()))
                    })
                    .collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<(), WarehouseError> {
            self.calls.lock().unwrap().push(call);
            if self.reject_token {
                return Err(WarehouseError::Unauthorized("Invalid Credentials".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Warehouse for FakeWarehouse {
        async fn list_datasets(
            &self,
            _credential: &Credential,
            _max_results: Option<u32>,
        ) -> Result<Vec<String>, WarehouseError> {
            self.record("list_datasets".to_string())?;
            Ok(self.datasets.iter().map(|(d, _)| d.clone()).collect())
        }

        async fn list_tables(
            &self,
            _credential: &Credential,
            dataset: &str,
        ) -> Result<Vec<String>, WarehouseError> {
            self.record(format!("list_tables:{dataset}"))?;
            let tables: HashMap<_, _> = self.datasets.iter().cloned().collect();
            match tables.get(dataset) {
                Some(Ok(tables)) => Ok(tables.clone()),
                Some(Err(_)) => Err(WarehouseError::PermissionDenied("Access Denied".to_string())),
                None => Err(WarehouseError::NotFound(dataset.to_string())),
            }
        }

        async fn get_table(
            &self,
            _credential: &Credential,
            table: &TableId,
        ) -> Result<TableSchema, WarehouseError> {
            self.record(format!("get_table:{table}"))?;
            Err(WarehouseError::NotFound(format!("Not found: Table {table}")))
        }

        async fn run_query(
            &self,
            _credential: &Credential,
            sql: &str,
            _job: &QueryJobConfig,
        ) -> Result<QueryResult, WarehouseError> {
            self.record(format!("run_query:{sql}"))?;
            Ok(QueryResult::default())
        }
    }

    #[derive(Default)]
    struct CountingSource {
        invalidations: AtomicUsize,
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn acquire(&self) -> Result<Credential, AuthError> {
            Ok(Credential::new("token", None))
        }

        async fn invalidate(&self, _credential: &Credential) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }

        fn kind(&self) -> SourceKind {
            SourceKind::ServiceAccount
        }
    }

    fn client(warehouse: Arc<FakeWarehouse>, scope: DatasetScope) -> WarehouseClient {
        WarehouseClient::new(warehouse, Arc::new(CountingSource::default()), scope)
    }

    #[tokio::test]
    async fn test_list_tables_respects_allow_list() {
        let warehouse = Arc::new(FakeWarehouse::with(&[
            ("sales", &["orders", "customers"]),
            ("hr", &["employees"]),
        ]));
        let client = client(warehouse.clone(), DatasetScope::new(["sales"]));

        let listing = client.list_tables().await.unwrap();
        assert_eq!(
            listing.tables,
            vec![
                TableRef::new("sales", "orders"),
                TableRef::new("sales", "customers")
            ]
        );
        assert!(!warehouse.calls().contains(&"list_tables:hr".to_string()));
    }

    #[tokio::test]
    async fn test_list_tables_unrestricted_keeps_order() {
        let warehouse = Arc::new(FakeWarehouse::with(&[("b", &["t2"]), ("a", &["t1"])]));
        let listing = client(warehouse, DatasetScope::unrestricted())
            .list_tables()
            .await
            .unwrap();
        assert_eq!(
            listing.tables,
            vec![TableRef::new("b", "t2"), TableRef::new("a", "t1")]
        );
    }

    #[tokio::test]
    async fn test_list_tables_skips_failing_dataset() {
        let mut warehouse = FakeWarehouse::with(&[("sales", &["orders"])]);
        warehouse.datasets.insert(0, ("locked".to_string(), Err(403)));
        let listing = client(Arc::new(warehouse), DatasetScope::unrestricted())
            .list_tables()
            .await
            .unwrap();

        assert_eq!(listing.tables, vec![TableRef::new("sales", "orders")]);
        assert_eq!(listing.skipped.len(), 1);
        assert_eq!(listing.skipped[0].dataset, "locked");
    }

    #[tokio::test]
    async fn test_describe_out_of_scope_is_not_found_without_call() {
        let warehouse = Arc::new(FakeWarehouse::with(&[("hr", &["employees"])]));
        let client = client(warehouse.clone(), DatasetScope::new(["sales"]));

        let err = client
            .describe_table(&TableId::new("hr", "employees"))
            .await
            .unwrap_err();
        assert!(matches!(err, WarehouseError::NotFound(_)));
        assert!(warehouse.calls().is_empty());
    }

    #[tokio::test]
    async fn test_describe_other_project_is_not_found_without_call() {
        let warehouse = Arc::new(FakeWarehouse::with(&[("sales", &["orders"])]));
        let scope = DatasetScope::new(["sales"]).with_project("home");
        let client = client(warehouse.clone(), scope);

        let foreign = TableId::parse("elsewhere.sales.orders").unwrap();
        let err = client.describe_table(&foreign).await.unwrap_err();
        assert!(matches!(err, WarehouseError::NotFound(_)));
        assert!(warehouse.calls().is_empty());
    }

    #[tokio::test]
    async fn test_describe_missing_table_is_not_found() {
        let warehouse = Arc::new(FakeWarehouse::with(&[("sales", &[])]));
        let err = client(warehouse, DatasetScope::new(["sales"]))
            .describe_table(&TableId::new("sales", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, WarehouseError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_query_out_of_scope_refused_before_submission() {
        let warehouse = Arc::new(FakeWarehouse::default());
        let client = client(warehouse.clone(), DatasetScope::new(["sales"]));

        let err = client
            .execute_query("SELECT * FROM hr.employees", QueryJobConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WarehouseError::PermissionDenied(_)));
        assert!(warehouse.calls().is_empty());

        client
            .execute_query("SELECT * FROM sales.orders", QueryJobConfig::default())
            .await
            .unwrap();
        assert_eq!(warehouse.calls(), vec!["run_query:SELECT * FROM sales.orders"]);
    }

    #[tokio::test]
    async fn test_rejected_token_invalidates_credential() {
        let warehouse = Arc::new(FakeWarehouse {
            reject_token: true,
            ..Default::default()
        });
        let source = Arc::new(CountingSource::default());
        let client = WarehouseClient::new(warehouse, source.clone(), DatasetScope::unrestricted());

        let err = client.probe().await.unwrap_err();
        assert!(matches!(err, WarehouseError::Auth(_)));
        assert_eq!(source.invalidations.load(Ordering::SeqCst), 1);
    }
}
