//! Dataset allow-list enforcement for Quarry.
//!
//! A [`DatasetScope`] decides which datasets are visible to listing and
//! describe operations, and checks submitted SQL for references to
//! datasets outside the list before anything reaches the warehouse.

pub mod analyzer;
pub mod error;
pub mod scope;

pub use analyzer::{Qualifier, References, SqlAnalyzer, qualifier_of};
pub use error::ScopeError;
pub use scope::DatasetScope;
