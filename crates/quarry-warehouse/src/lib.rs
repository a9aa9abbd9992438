//! # quarry-warehouse
//!
//! BigQuery access for Quarry.
//!
//! - [`Warehouse`]: raw API calls, implemented by [`BigQueryRest`]
//! - [`WarehouseClient`]: credential handling and dataset scoping on top
//!
//! Rows come back as ordered column-to-value maps, decoded from BigQuery's
//! `f`/`v` wire format into typed JSON.

pub mod bigquery;
pub mod client;
pub mod decode;
pub mod error;
pub mod schema;
pub mod warehouse;

pub use bigquery::BigQueryRest;
pub use client::WarehouseClient;
pub use error::WarehouseError;
pub use schema::{
    ColumnSchema, QueryJobConfig, QueryParameter, QueryResult, Row, SkippedDataset, TableId,
    TableListing, TableRef, TableSchema,
};
pub use warehouse::Warehouse;
