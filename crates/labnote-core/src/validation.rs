//! Batch validation before any write.
//!
//! Validation runs in a fixed order:
//!
//! 1. Row gate: every record must coerce cleanly and be complete. A failing
//!    gate stops here, no query is issued.
//! 2. Distinct stack/experiment/site ids are collected.
//! 3. Site ids unknown to storage become the new sites for the wizard.
//! 4. Ids that exist but belong to another animal are conflicts.
//! 5. Every new site needs a row whose stack, experiment and site ids all
//!    equal the new site id.
//!
//! Violations from steps 4 and 5 are aggregated into a single verdict.

use std::fmt;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{EntityKind, IdentitySets, Record};
use crate::traits::LabStore;

/// Outcome of validating a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing blocks the export. `new_sites` (ascending) must be created
    /// before the batch is committed.
    Pass {
        new_sites: Vec<i64>,
        ids: IdentitySets,
    },
    /// The batch is rejected; nothing may be written.
    Fail(Violations),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass { .. })
    }
}

/// Human-readable violations, one per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("\n"))
    }
}

impl From<Violations> for Error {
    fn from(v: Violations) -> Self {
        Error::Validation(v.to_string())
    }
}

/// Row gate: invalid cells first, then incomplete rows. Pure, no storage.
pub fn check_rows(records: &[Record]) -> Violations {
    let mut violations = Violations::default();

    for record in records {
        let invalid = record.invalid_fields();
        if invalid.is_empty() {
            continue;
        }
        let detail: Vec<String> = invalid
            .iter()
            .map(|(field, raw)| format!("{} '{}'", field, raw))
            .collect();
        violations.push(format!(
            "Row {}: invalid {}",
            record.position(),
            detail.join(", ")
        ));
    }

    for record in records.iter().filter(|r| !r.is_invalid()) {
        let missing = record.missing_fields();
        if !missing.is_empty() {
            violations.push(format!(
                "Row {}: incomplete, missing {}",
                record.position(),
                missing.join(", ")
            ));
        }
    }

    violations
}

/// Run every validation step against storage.
///
/// Blank records are skipped. Storage errors propagate; they are not
/// violations.
pub async fn validate_batch(
    store: &dyn LabStore,
    records: &[Record],
    animal_id: &str,
) -> Result<Verdict> {
    let start = Instant::now();
    let records: Vec<Record> = records.iter().filter(|r| !r.is_blank()).cloned().collect();

    let gate = check_rows(&records);
    if !gate.is_empty() {
        warn!(
            subsystem = "export",
            component = "validation",
            op = "row_gate",
            animal_id,
            violation_count = gate.messages().len(),
            "Batch has invalid or incomplete rows"
        );
        return Ok(Verdict::Fail(gate));
    }

    let ids = IdentitySets::from_records(&records);
    let site_ids = ids.ids(EntityKind::Site);

    let new_sites = store.missing_site_ids(&site_ids).await?;
    debug!(
        subsystem = "export",
        component = "validation",
        op = "missing_sites",
        animal_id,
        new_site_count = new_sites.len(),
        "Queried missing sites"
    );

    let mut violations = Violations::default();
    for kind in EntityKind::ALL {
        let foreign = store
            .foreign_owned_ids(kind, animal_id, &ids.ids(kind))
            .await?;
        if !foreign.is_empty() {
            violations.push(format!(
                "{}: {} belong to a different animal than {}",
                kind.label(),
                join_ids(&foreign),
                animal_id
            ));
        }
    }

    for site_id in &new_sites {
        if !records.iter().any(|r| r.introduces_site(*site_id)) {
            violations.push(format!(
                "SiteID {0} is new, but no row has StackID, ExpID and SiteID all equal to {0}",
                site_id
            ));
        }
    }

    if !violations.is_empty() {
        warn!(
            subsystem = "export",
            component = "validation",
            op = "validate",
            animal_id,
            violation_count = violations.messages().len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch rejected"
        );
        return Ok(Verdict::Fail(violations));
    }

    info!(
        subsystem = "export",
        component = "validation",
        op = "validate",
        animal_id,
        row_count = records.len(),
        new_site_count = new_sites.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Batch validated"
    );
    Ok(Verdict::Pass { new_sites, ids })
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
