//! Reconciliation wizard.
//!
//! ```text
//! Validating ──pass, new sites──▶ NewSite(0) ─▶ … ─▶ NewSite(n-1) ─▶ Finish ─confirm─▶ Terminal
//!     │         └─pass, none───────────────────────────────────────▶ Finish
//!     └─fail──────────────────────────────────────────────────────────────────────────▶ Terminal
//! ```
//!
//! Every event is defined in every step: events that do not apply to the
//! current step leave it unchanged. `back` walks to the previous step and
//! cancels from the first one; `cancel` ends the wizard from anywhere.
//!
//! Sites are written as soon as their step is submitted and stay written if
//! the wizard is later cancelled. Experiments and stacks are only written on
//! confirmation in `Finish`.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{NewSite, Record, UpsertReport};
use crate::traits::{FinishPrompt, LabStore, Prompter, Reply, SiteInput, SitePrompt};
use crate::upsert::{upsert_batch, upsert_site};
use crate::validation::{validate_batch, Verdict};

/// Where the wizard currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardStep {
    Validating,
    /// Collecting project/location/depth for `new_sites[index]`.
    NewSite { index: usize },
    Finish,
    Terminal(Termination),
}

/// How the wizard ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Completed {
        report: UpsertReport,
        sites_created: Vec<i64>,
    },
    Cancelled,
    Failed(String),
}

impl Termination {
    /// `None` on success, otherwise the reason shown to the user.
    pub fn message(&self) -> Option<String> {
        match self {
            Termination::Completed { .. } => None,
            Termination::Cancelled => Some("Export cancelled".to_string()),
            Termination::Failed(reason) => Some(reason.clone()),
        }
    }
}

/// Field-level errors on a new-site step. The step is kept so the user can
/// correct the input and retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SiteInputError {
    #[error("Project is required")]
    MissingProject,

    #[error("Location is required")]
    MissingLocation,

    #[error("Depth must be an integer, got '{0}'")]
    InvalidDepth(String),

    #[error("Could not create site {site_id}: {message}")]
    Write { site_id: i64, message: String },

    #[error("No site is awaiting input")]
    NotAwaitingSite,
}

impl SiteInput {
    /// Check the form and build the site row.
    pub fn to_site(&self, site_id: i64, animal_id: &str) -> Result<NewSite, SiteInputError> {
        let project = self.project.trim();
        if project.is_empty() {
            return Err(SiteInputError::MissingProject);
        }
        let location = self.location.trim();
        if location.is_empty() {
            return Err(SiteInputError::MissingLocation);
        }
        let depth = match self.depth.trim() {
            "" => None,
            raw => Some(
                raw.parse::<i64>()
                    .map_err(|_| SiteInputError::InvalidDepth(raw.to_string()))?,
            ),
        };
        Ok(NewSite {
            id: site_id,
            animal_id: animal_id.to_string(),
            project: project.to_string(),
            location: location.to_string(),
            depth,
        })
    }
}

/// The step sequencer for one export.
#[derive(Debug)]
pub struct Wizard {
    animal_id: String,
    records: Vec<Record>,
    new_sites: Vec<i64>,
    sites_created: Vec<i64>,
    site_error: Option<String>,
    step: WizardStep,
}

impl Wizard {
    pub fn new(animal_id: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            animal_id: animal_id.into(),
            records,
            new_sites: Vec::new(),
            sites_created: Vec::new(),
            site_error: None,
            step: WizardStep::Validating,
        }
    }

    pub fn step(&self) -> &WizardStep {
        &self.step
    }

    pub fn animal_id(&self) -> &str {
        &self.animal_id
    }

    /// New sites found by validation, ascending.
    pub fn new_sites(&self) -> &[i64] {
        &self.new_sites
    }

    /// Sites written so far, in submission order.
    pub fn sites_created(&self) -> &[i64] {
        &self.sites_created
    }

    /// Site id the current `NewSite` step is collecting.
    pub fn current_site(&self) -> Option<i64> {
        match self.step {
            WizardStep::NewSite { index } => self.new_sites.get(index).copied(),
            _ => None,
        }
    }

    pub fn termination(&self) -> Option<&Termination> {
        match &self.step {
            WizardStep::Terminal(t) => Some(t),
            _ => None,
        }
    }

    /// `Validating` → `NewSite(0)` | `Finish` | `Terminal`.
    pub async fn validate(&mut self, store: &dyn LabStore) -> &WizardStep {
        if self.step != WizardStep::Validating {
            return &self.step;
        }

        let next = match validate_batch(store, &self.records, &self.animal_id).await {
            Ok(Verdict::Pass { new_sites, .. }) => {
                self.new_sites = new_sites;
                self.first_step()
            }
            Ok(Verdict::Fail(violations)) => WizardStep::Terminal(Termination::Failed(
                crate::error::Error::from(violations).to_string(),
            )),
            Err(e) => WizardStep::Terminal(Termination::Failed(e.to_string())),
        };
        self.transition(next);
        &self.step
    }

    /// Submit the form of the current `NewSite` step. On success the site is
    /// written and the wizard advances; on error it stays on the step.
    pub async fn submit_site(
        &mut self,
        store: &dyn LabStore,
        input: &SiteInput,
    ) -> Result<(), SiteInputError> {
        let WizardStep::NewSite { index } = self.step else {
            return Err(SiteInputError::NotAwaitingSite);
        };
        let Some(site_id) = self.new_sites.get(index).copied() else {
            return Err(SiteInputError::NotAwaitingSite);
        };

        let result = match input.to_site(site_id, &self.animal_id) {
            Ok(site) => upsert_site(store, &site)
                .await
                .map_err(|e| SiteInputError::Write {
                    site_id,
                    message: e.to_string(),
                }),
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                info!(
                    subsystem = "export",
                    component = "wizard",
                    op = "insert_site",
                    animal_id = %self.animal_id,
                    site_id,
                    ?outcome,
                    "Site written"
                );
                if !self.sites_created.contains(&site_id) {
                    self.sites_created.push(site_id);
                }
                self.site_error = None;
                let next = if index + 1 < self.new_sites.len() {
                    WizardStep::NewSite { index: index + 1 }
                } else {
                    WizardStep::Finish
                };
                self.transition(next);
                Ok(())
            }
            Err(e) => {
                warn!(
                    subsystem = "export",
                    component = "wizard",
                    site_id,
                    error = %e,
                    "Site step rejected"
                );
                self.site_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// `Finish` → `Terminal`: commit every experiment and stack.
    pub async fn confirm(&mut self, store: &dyn LabStore) -> &WizardStep {
        if self.step != WizardStep::Finish {
            return &self.step;
        }
        let termination = match upsert_batch(store, &self.records, &self.animal_id).await {
            Ok(report) => Termination::Completed {
                report,
                sites_created: self.sites_created.clone(),
            },
            Err(failure) => Termination::Failed(failure.to_string()),
        };
        self.transition(WizardStep::Terminal(termination));
        &self.step
    }

    /// Previous step, or cancellation from the first one.
    pub fn back(&mut self) {
        let next = match self.step {
            WizardStep::Validating => WizardStep::Terminal(Termination::Cancelled),
            WizardStep::NewSite { index: 0 } => WizardStep::Terminal(Termination::Cancelled),
            WizardStep::NewSite { index } => WizardStep::NewSite { index: index - 1 },
            WizardStep::Finish if self.new_sites.is_empty() => {
                WizardStep::Terminal(Termination::Cancelled)
            }
            WizardStep::Finish => WizardStep::NewSite {
                index: self.new_sites.len() - 1,
            },
            WizardStep::Terminal(_) => return,
        };
        self.site_error = None;
        self.transition(next);
    }

    /// Abandon the wizard. Sites already written stay written.
    pub fn cancel(&mut self) {
        if matches!(self.step, WizardStep::Terminal(_)) {
            return;
        }
        self.transition(WizardStep::Terminal(Termination::Cancelled));
    }

    /// Drive the wizard to a terminal step through `prompter`.
    pub async fn run(mut self, store: &dyn LabStore, prompter: &mut dyn Prompter) -> Termination {
        loop {
            match self.step.clone() {
                WizardStep::Validating => {
                    self.validate(store).await;
                }
                WizardStep::NewSite { index } => {
                    let prompt = self.site_prompt(store, index).await;
                    match prompter.new_site(&prompt).await {
                        Reply::Submit(input) => {
                            // A rejected submission comes back as `SitePrompt::error`.
                            let _ = self.submit_site(store, &input).await;
                        }
                        Reply::Back => self.back(),
                        Reply::Cancel => self.cancel(),
                    }
                }
                WizardStep::Finish => {
                    let prompt = FinishPrompt {
                        animal_id: self.animal_id.clone(),
                        record_count: self.records.iter().filter(|r| !r.is_blank()).count(),
                        sites_created: self.sites_created.clone(),
                    };
                    match prompter.confirm(&prompt).await {
                        Reply::Submit(()) => {
                            self.confirm(store).await;
                        }
                        Reply::Back => self.back(),
                        Reply::Cancel => self.cancel(),
                    }
                }
                WizardStep::Terminal(termination) => return termination,
            }
        }
    }

    async fn site_prompt(&self, store: &dyn LabStore, index: usize) -> SitePrompt {
        let projects = store.distinct_projects().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not load project list");
            Vec::new()
        });
        let locations = store.distinct_locations().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not load location list");
            Vec::new()
        });
        SitePrompt {
            site_id: self.new_sites[index],
            animal_id: self.animal_id.clone(),
            step: index + 1,
            total: self.new_sites.len(),
            projects,
            locations,
            error: self.site_error.clone(),
        }
    }

    fn first_step(&self) -> WizardStep {
        if self.new_sites.is_empty() {
            WizardStep::Finish
        } else {
            WizardStep::NewSite { index: 0 }
        }
    }

    fn transition(&mut self, next: WizardStep) {
        debug!(
            subsystem = "export",
            component = "wizard",
            from = ?self.step,
            to = ?next,
            "Wizard transition"
        );
        self.step = next;
    }
}
