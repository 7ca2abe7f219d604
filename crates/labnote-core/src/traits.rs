//! Ports between the export pipeline and its collaborators.
//!
//! The pipeline only talks to storage through [`LabStore`] and to the user
//! through [`Prompter`]; concrete engines and frontends live elsewhere.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::*;

// =============================================================================
// STORAGE PORT
// =============================================================================

/// Storage surface used by validation, the wizard and the upsert executor.
///
/// Every id list returned by a query is sorted ascending. Update methods
/// return the number of rows the statement matched; callers insert when it is
/// zero.
#[async_trait]
pub trait LabStore: Send + Sync {
    /// Candidate site ids with no row in storage.
    async fn missing_site_ids(&self, candidates: &[i64]) -> Result<Vec<i64>>;

    /// Candidate ids of `kind` that exist but belong (transitively) to an
    /// animal other than `animal_id`.
    async fn foreign_owned_ids(
        &self,
        kind: EntityKind,
        animal_id: &str,
        candidates: &[i64],
    ) -> Result<Vec<i64>>;

    /// Distinct project labels already used by sites.
    async fn distinct_projects(&self) -> Result<Vec<String>>;

    /// Distinct location labels already used by sites.
    async fn distinct_locations(&self) -> Result<Vec<String>>;

    async fn update_site(&self, site: &NewSite) -> Result<u64>;
    async fn insert_site(&self, site: &NewSite) -> Result<()>;

    async fn update_experiment(&self, row: &ExperimentRow) -> Result<u64>;
    async fn insert_experiment(&self, row: &ExperimentRow) -> Result<()>;

    async fn update_stack(&self, row: &StackRow) -> Result<u64>;
    async fn insert_stack(&self, row: &StackRow) -> Result<()>;

    /// Principal investigators, sorted.
    async fn list_pis(&self) -> Result<Vec<String>>;

    /// Animals, optionally restricted to one PI, sorted by id.
    async fn list_animals(&self, pi: Option<&str>) -> Result<Vec<Animal>>;
}

// =============================================================================
// USER INTERACTION PORT
// =============================================================================

/// What the user did with a wizard step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Submit(T),
    Back,
    Cancel,
}

/// Raw values typed into the new-site form. Checked by the wizard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInput {
    pub project: String,
    pub location: String,
    pub depth: String,
}

impl SiteInput {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        depth: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            location: location.into(),
            depth: depth.into(),
        }
    }
}

/// Context shown on a new-site step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitePrompt {
    pub site_id: i64,
    pub animal_id: String,
    /// 1-based index among the new sites.
    pub step: usize,
    pub total: usize,
    pub projects: Vec<String>,
    pub locations: Vec<String>,
    /// Field-level error from the previous attempt, if any.
    pub error: Option<String>,
}

/// Context shown on the final confirmation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishPrompt {
    pub animal_id: String,
    pub record_count: usize,
    pub sites_created: Vec<i64>,
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Frontend driving the reconciliation wizard, one request per step.
#[async_trait]
pub trait Prompter: Send {
    async fn new_site(&mut self, prompt: &SitePrompt) -> Reply<SiteInput>;

    async fn confirm(&mut self, prompt: &FinishPrompt) -> Reply<()>;
}
