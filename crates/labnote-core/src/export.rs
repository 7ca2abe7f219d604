//! The export pipeline: note text in, committed rows and a report out.
//!
//! ```text
//! text ─▶ table rows ─▶ records ─▶ validation ─▶ new-site steps ─▶ confirm ─▶ upsert
//! ```
//!
//! [`export_document`] is the boundary towards the host: it never returns an
//! error. Whatever goes wrong is folded into an [`ExportOutcome`] whose
//! [`message`](ExportOutcome::message) is shown to the user.

use std::time::Instant;

use tracing::{info, warn};

use crate::config::DateTimeFormats;
use crate::defaults;
use crate::document::front_matter_value;
use crate::error::{Error, Result};
use crate::models::{count_noun, Record, UpsertReport};
use crate::table::{append_table, extract_rows, find_table, migrate_table};
use crate::traits::{LabStore, NoticeLevel, Prompter};
use crate::validation::{validate_batch, Verdict};
use crate::wizard::{Termination, Wizard};

/// Inputs of one export.
#[derive(Debug, Clone, Copy)]
pub struct ExportRequest<'a> {
    /// Full text of the active note; `None` when no note is open.
    pub text: Option<&'a str>,
    /// Target animal. Falls back to the note's `animal` front-matter key.
    pub animal_id: Option<&'a str>,
    pub formats: &'a DateTimeFormats,
}

/// How an export ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed {
        animal_id: String,
        report: UpsertReport,
        sites_created: Vec<i64>,
    },
    /// Nothing to export; guidance for the user.
    NoData(String),
    /// The user backed out of the wizard.
    Cancelled,
    Failed(String),
}

impl ExportOutcome {
    /// `None` on success, otherwise the text to show.
    pub fn message(&self) -> Option<String> {
        match self {
            ExportOutcome::Completed { .. } => None,
            ExportOutcome::NoData(msg) => Some(msg.clone()),
            ExportOutcome::Cancelled => Some("Export cancelled".to_string()),
            ExportOutcome::Failed(msg) => Some(msg.clone()),
        }
    }

    /// Severity to show the outcome with. Cancellation is not an error.
    pub fn level(&self) -> NoticeLevel {
        match self {
            ExportOutcome::Failed(_) => NoticeLevel::Error,
            _ => NoticeLevel::Info,
        }
    }

    /// One-line summary for the user, success included.
    pub fn summary(&self) -> String {
        match self {
            ExportOutcome::Completed {
                report,
                sites_created,
                ..
            } => {
                if sites_created.is_empty() {
                    report.to_string()
                } else {
                    format!(
                        "Created {}. {}",
                        count_noun(sites_created.len() as u64, "site"),
                        report
                    )
                }
            }
            other => other.message().unwrap_or_default(),
        }
    }
}

/// Records of the recordings table, blank rows dropped.
///
/// A note that only has a legacy-header table is migrated in memory first.
/// Fails with [`Error::NoData`] when no row is left.
pub fn prepare_records(text: &str, formats: &DateTimeFormats) -> Result<Vec<Record>> {
    let rows = if find_table(text, &defaults::TABLE_HEADERS).is_some() {
        extract_rows(text, &defaults::TABLE_HEADERS)
    } else {
        match upgrade_table(text)? {
            Some(migrated) => extract_rows(&migrated, &defaults::TABLE_HEADERS),
            None => Vec::new(),
        }
    };

    let records: Vec<Record> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| Record::from_row(i + 1, row, formats))
        .filter(|r| !r.is_blank())
        .collect();

    if records.is_empty() {
        return Err(Error::NoData(format!(
            "No data to export: add rows to a table with columns {}",
            defaults::TABLE_HEADERS.join(" | ")
        )));
    }
    Ok(records)
}

/// Rewrite a legacy-header table with the current header. `Ok(None)` when
/// the note has no legacy table.
pub fn upgrade_table(text: &str) -> Result<Option<String>> {
    migrate_table(
        text,
        &defaults::LEGACY_TABLE_HEADERS,
        &defaults::TABLE_HEADERS,
    )
}

/// Append an empty recordings table. Refuses when the note already has one.
pub fn insert_table_template(text: &str) -> Result<String> {
    if find_table(text, &defaults::TABLE_HEADERS).is_some()
        || find_table(text, &defaults::LEGACY_TABLE_HEADERS).is_some()
    {
        return Err(Error::InvalidInput(
            "the note already contains a recordings table".to_string(),
        ));
    }
    Ok(append_table(text, &defaults::TABLE_HEADERS))
}

/// Target animal: the explicit choice, else the front-matter key.
pub fn resolve_animal(text: &str, explicit: Option<&str>) -> Result<String> {
    if let Some(id) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(id.to_string());
    }
    front_matter_value(text, defaults::FRONT_MATTER_ANIMAL)?.ok_or_else(|| {
        Error::InputAbsent(format!(
            "no animal selected; pass one or set `{}` in the note front matter",
            defaults::FRONT_MATTER_ANIMAL
        ))
    })
}

/// Extract and validate without writing anything.
pub async fn check_document(
    store: &dyn LabStore,
    request: ExportRequest<'_>,
) -> Result<(String, Verdict)> {
    let text = request
        .text
        .ok_or_else(|| Error::InputAbsent("no active note".to_string()))?;
    let animal_id = resolve_animal(text, request.animal_id)?;
    let records = prepare_records(text, request.formats)?;
    let verdict = validate_batch(store, &records, &animal_id).await?;
    Ok((animal_id, verdict))
}

/// Run the whole export, driving the wizard through `prompter`.
pub async fn export_document(
    store: &dyn LabStore,
    prompter: &mut dyn Prompter,
    request: ExportRequest<'_>,
) -> ExportOutcome {
    let start = Instant::now();
    let outcome = match run(store, prompter, request).await {
        Ok((animal_id, Termination::Completed {
            report,
            sites_created,
        })) => ExportOutcome::Completed {
            animal_id,
            report,
            sites_created,
        },
        Ok((_, Termination::Cancelled)) => ExportOutcome::Cancelled,
        Ok((_, Termination::Failed(reason))) => ExportOutcome::Failed(reason),
        Err(Error::NoData(msg)) => ExportOutcome::NoData(msg),
        Err(e) => ExportOutcome::Failed(e.to_string()),
    };

    match &outcome {
        ExportOutcome::Failed(reason) => warn!(
            subsystem = "export",
            op = "export",
            duration_ms = start.elapsed().as_millis() as u64,
            reason = %reason,
            "Export did not complete"
        ),
        other => info!(
            subsystem = "export",
            op = "export",
            duration_ms = start.elapsed().as_millis() as u64,
            outcome = %other.summary(),
            "Export finished"
        ),
    }
    outcome
}

async fn run(
    store: &dyn LabStore,
    prompter: &mut dyn Prompter,
    request: ExportRequest<'_>,
) -> Result<(String, Termination)> {
    let text = request
        .text
        .ok_or_else(|| Error::InputAbsent("no active note".to_string()))?;
    let animal_id = resolve_animal(text, request.animal_id)?;
    let records = prepare_records(text, request.formats)?;

    info!(
        subsystem = "export",
        op = "extract",
        animal_id = %animal_id,
        row_count = records.len(),
        "Records extracted"
    );

    let termination = Wizard::new(animal_id.clone(), records)
        .run(store, prompter)
        .await;
    Ok((animal_id, termination))
}
