//! Idempotent update-then-insert of sites, experiments and stacks.
//!
//! Each row is written with an UPDATE keyed by its id; when the update
//! matches nothing the row is INSERTed. Rows are committed one by one, so a
//! failure part-way leaves earlier rows in place and the counters say how far
//! the batch got.

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::error::{Error, Result};
use crate::models::{ExperimentRow, NewSite, Record, StackRow, UpsertOutcome, UpsertReport};
use crate::traits::LabStore;

/// A batch upsert that stopped at a failing row.
#[derive(Debug, Error)]
#[error("{error} ({report} before the failure)")]
pub struct UpsertFailure {
    /// Counters of the rows committed before the failure.
    pub report: UpsertReport,
    #[source]
    pub error: Error,
}

pub async fn upsert_site(store: &dyn LabStore, site: &NewSite) -> Result<UpsertOutcome> {
    if store.update_site(site).await? > 0 {
        return Ok(UpsertOutcome::Updated);
    }
    store.insert_site(site).await?;
    Ok(UpsertOutcome::Inserted)
}

pub async fn upsert_experiment(store: &dyn LabStore, row: &ExperimentRow) -> Result<UpsertOutcome> {
    if store.update_experiment(row).await? > 0 {
        return Ok(UpsertOutcome::Updated);
    }
    store.insert_experiment(row).await?;
    Ok(UpsertOutcome::Inserted)
}

pub async fn upsert_stack(store: &dyn LabStore, row: &StackRow) -> Result<UpsertOutcome> {
    if store.update_stack(row).await? > 0 {
        return Ok(UpsertOutcome::Updated);
    }
    store.insert_stack(row).await?;
    Ok(UpsertOutcome::Inserted)
}

/// Commit the experiment and then the stack of every record, in batch order.
///
/// Blank records are skipped; any other incomplete record stops the batch.
pub async fn upsert_batch(
    store: &dyn LabStore,
    records: &[Record],
    animal_id: &str,
) -> std::result::Result<UpsertReport, UpsertFailure> {
    let start = Instant::now();
    let mut report = UpsertReport::default();

    for record in records.iter().filter(|r| !r.is_blank()) {
        if let Err(error) = upsert_record(store, record, &mut report).await {
            error!(
                subsystem = "export",
                component = "upsert",
                op = "upsert_batch",
                animal_id,
                position = record.position(),
                error = %error,
                "Upsert failed, aborting remaining rows"
            );
            return Err(UpsertFailure { report, error });
        }
    }

    info!(
        subsystem = "export",
        component = "upsert",
        op = "upsert_batch",
        animal_id,
        inserted_experiments = report.inserted_experiments,
        updated_experiments = report.updated_experiments,
        inserted_stacks = report.inserted_stacks,
        updated_stacks = report.updated_stacks,
        duration_ms = start.elapsed().as_millis() as u64,
        "Batch committed"
    );
    Ok(report)
}

async fn upsert_record(
    store: &dyn LabStore,
    record: &Record,
    report: &mut UpsertReport,
) -> Result<()> {
    let (Some(experiment), Some(stack)) = (record.experiment_row(), record.stack_row()) else {
        return Err(Error::InvalidInput(format!(
            "row {} is incomplete",
            record.position()
        )));
    };

    let outcome = upsert_experiment(store, &experiment)
        .await
        .map_err(|e| write_error("experiment", experiment.id, e))?;
    report.record_experiment(outcome);
    trace!(exp_id = experiment.id, ?outcome, "Experiment written");

    let outcome = upsert_stack(store, &stack)
        .await
        .map_err(|e| write_error("stack", stack.id, e))?;
    report.record_stack(outcome);
    debug!(
        position = record.position(),
        stack_id = stack.id,
        ?outcome,
        "Row written"
    );
    Ok(())
}

fn write_error(entity: &str, id: i64, e: Error) -> Error {
    match e {
        Error::Write(msg) => Error::Write(msg),
        other => Error::Write(format!("{} {}: {}", entity, id, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DateTimeFormats;
    use crate::memory::MemoryStore;
    use crate::models::RawFields;

    fn record(position: usize, time: &str, stack: i64, exp: i64, site: i64) -> Record {
        Record::parse(
            position,
            RawFields {
                date: "2024-03-05".to_string(),
                time: time.to_string(),
                stack_id: stack.to_string(),
                exp_id: exp.to_string(),
                site_id: site.to_string(),
                comment: "ok".to_string(),
                ..Default::default()
            },
            &DateTimeFormats::default(),
        )
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_animal("M001", None)
            .with_site(10, "M001", "P1", "L1", None)
    }

    #[tokio::test]
    async fn test_experiment_before_stack_in_batch_order() {
        let store = store();
        let records = vec![record(1, "10:00", 1, 1, 10), record(2, "11:00", 2, 1, 10)];
        let report = upsert_batch(&store, &records, "M001").await.unwrap();

        assert_eq!(
            store.writes(),
            vec![
                "update_experiment 1",
                "insert_experiment 1",
                "update_stack 1",
                "insert_stack 1",
                "update_experiment 1",
                "update_stack 2",
                "insert_stack 2",
            ]
        );
        assert_eq!(report.inserted_experiments, 1);
        assert_eq!(report.updated_experiments, 1);
        assert_eq!(report.inserted_stacks, 2);
        assert_eq!(report.updated_stacks, 0);
    }

    #[tokio::test]
    async fn test_second_run_only_updates() {
        let store = store();
        let records = vec![record(1, "10:00", 1, 1, 10), record(2, "11:00", 2, 2, 10)];
        upsert_batch(&store, &records, "M001").await.unwrap();
        let first_state = (store.stack(1), store.stack(2), store.experiment(2));

        let report = upsert_batch(&store, &records, "M001").await.unwrap();
        assert_eq!(report.inserted(), 0);
        assert_eq!(report.updated_experiments, 2);
        assert_eq!(report.updated_stacks, 2);
        assert_eq!((store.stack(1), store.stack(2), store.experiment(2)), first_state);
        assert_eq!(store.stack_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_prior_rows_and_counts() {
        let store = store().failing_stack(2);
        let records = vec![
            record(1, "10:00", 1, 1, 10),
            record(2, "11:00", 2, 1, 10),
            record(3, "12:00", 3, 1, 10),
        ];
        let failure = upsert_batch(&store, &records, "M001").await.unwrap_err();

        assert!(matches!(failure.error, Error::Write(_)));
        assert_eq!(failure.report.inserted_stacks, 1);
        assert_eq!(failure.report.updated_experiments, 1);
        assert!(store.stack(1).is_some());
        assert!(store.stack(3).is_none());
        assert!(failure.to_string().contains("inserted 1 stack,"));
    }

    #[tokio::test]
    async fn test_stack_row_carries_split_timestamp() {
        let store = store();
        upsert_batch(&store, &[record(1, "09:05", 4, 4, 10)], "M001")
            .await
            .unwrap();
        let stack = store.stack(4).unwrap();
        assert_eq!(stack.date, "2024-03-05");
        assert_eq!(stack.time, "09:05:00");
        assert_eq!(stack.comment.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_site_upsert_updates_existing() {
        let store = store();
        let site = NewSite {
            id: 10,
            animal_id: "M001".to_string(),
            project: "P9".to_string(),
            location: "L9".to_string(),
            depth: Some(120),
        };
        assert_eq!(upsert_site(&store, &site).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.site(10).unwrap().project, "P9");
    }
}
