//! Dataset allow-list.

use crate::analyzer::{Qualifier, SqlAnalyzer, qualifier_of};
use crate::error::ScopeError;

/// The set of datasets the server may touch.
///
/// An empty allow-list means every dataset in every project is visible.
/// Otherwise only the listed datasets of the configured project are, and
/// names qualified by any other project are refused. Comparisons are
/// case-sensitive, matching BigQuery IDs.
#[derive(Debug, Clone, Default)]
pub struct DatasetScope {
    allowed: Vec<String>,
    project: Option<String>,
    analyzer: SqlAnalyzer,
}

impl DatasetScope {
    /// Build a scope from configured dataset IDs, dropping blanks and
    /// duplicates while keeping the configured order.
    pub fn new<I, S>(datasets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed: Vec<String> = Vec::new();
        for dataset in datasets {
            let dataset = dataset.as_ref().trim();
            if !dataset.is_empty() && !allowed.iter().any(|d| d == dataset) {
                allowed.push(dataset.to_string());
            }
        }
        Self {
            allowed,
            project: None,
            analyzer: SqlAnalyzer::new(),
        }
    }

    /// The project unqualified and dataset-qualified names resolve to.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// A scope that admits every dataset.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Configured dataset IDs, in configuration order.
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Whether a dataset is inside the scope.
    pub fn is_visible(&self, dataset: &str) -> bool {
        self.is_unrestricted() || self.allowed.iter().any(|d| d == dataset)
    }

    /// Keep only the visible datasets.
    pub fn filter_datasets<I, S>(&self, datasets: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        datasets
            .into_iter()
            .map(Into::into)
            .filter(|d| self.is_visible(d))
            .collect()
    }

    /// Reject a dataset outside the scope.
    pub fn check(&self, dataset: &str) -> Result<(), ScopeError> {
        if self.is_visible(dataset) {
            Ok(())
        } else {
            Err(ScopeError::DatasetNotAllowed {
                dataset: dataset.to_string(),
            })
        }
    }

    /// Reject a dataset, or a project other than the configured one.
    /// `project` is `None` for names without a project qualifier.
    pub fn check_in(&self, project: Option<&str>, dataset: &str) -> Result<(), ScopeError> {
        if self.is_unrestricted() {
            return Ok(());
        }
        if let Some(project) = project {
            if self.project.as_deref() != Some(project) {
                return Err(ScopeError::ProjectNotAllowed {
                    project: project.to_string(),
                });
            }
        }
        self.check(dataset)
    }

    /// Reject SQL that names a dataset outside the scope.
    ///
    /// Tables, `CALL` targets and dataset-qualified functions are all
    /// checked. Unqualified names pass, since they can only resolve to CTEs,
    /// builtins or the job's default dataset. With a restricted scope, SQL
    /// that cannot be tokenized and dynamic SQL are refused outright.
    pub fn check_query(&self, sql: &str) -> Result<(), ScopeError> {
        if self.is_unrestricted() {
            return Ok(());
        }

        let Some(references) = self.analyzer.references(sql) else {
            tracing::warn!("Could not tokenize query, refusing it");
            return Err(ScopeError::Unreadable);
        };
        if references.dynamic_sql {
            return Err(ScopeError::DynamicSql);
        }

        for name in references.names() {
            match qualifier_of(name) {
                Qualifier::None => {}
                Qualifier::Dataset { project, dataset } => {
                    self.check_in(project.as_deref(), &dataset)?
                }
                Qualifier::ProjectWide => {
                    return Err(ScopeError::ProjectWideReference {
                        relation: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
