//! Error types for the scope crate.

use thiserror::Error;

/// A reference fell outside the configured dataset allow-list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScopeError {
    /// A dataset that is not in the allow-list.
    #[error("dataset '{dataset}' is not in the allowed dataset list")]
    DatasetNotAllowed { dataset: String },

    /// A name qualified by a project other than the configured one.
    #[error("project '{project}' is outside the configured project")]
    ProjectNotAllowed { project: String },

    /// A project- or region-wide view that would expose every dataset.
    #[error("'{relation}' spans datasets outside the allowed list")]
    ProjectWideReference { relation: String },

    /// SQL built at run time cannot be checked before it runs.
    #[error("dynamic SQL (EXECUTE IMMEDIATE) is not allowed when datasets are restricted")]
    DynamicSql,

    /// The query text could not be read far enough to check it.
    #[error("query could not be tokenized, so its dataset references cannot be checked")]
    Unreadable,
}
