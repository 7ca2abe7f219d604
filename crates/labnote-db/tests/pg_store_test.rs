//! PostgreSQL adapter tests.
//!
//! Run with a reachable database:
//! `DATABASE_URL=postgres://... cargo test -p labnote-db -- --ignored`

use labnote_core::upsert::{upsert_site, upsert_stack};
use labnote_core::{
    upsert_batch, validate_batch, DateTimeFormats, EntityKind, LabStore, NewSite, Record,
    StackRow, UpsertOutcome, Verdict,
};
use labnote_db::test_fixtures::TestDatabase;

async fn test_db() -> TestDatabase {
    dotenvy::dotenv().ok();
    TestDatabase::new()
        .await
        .expect("Failed to set up test database")
}

fn record(position: usize, date: &str, stack: &str, exp: &str, site: &str) -> Record {
    let row = [
        ("Date", date),
        ("Time", "10:30"),
        ("StackID", stack),
        ("ExpID", exp),
        ("SiteID", site),
        ("Paradigm", "oddball"),
        ("Comment", ""),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    Record::from_row(position, &row, &DateTimeFormats::default())
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_missing_site_ids_sorted() {
    let db = test_db().await;
    db.seed_animal("M001", None).await.unwrap();
    db.seed_chain("M001", 10, 1, 1).await.unwrap();

    let missing = db.store.missing_site_ids(&[30, 10, 20]).await.unwrap();
    assert_eq!(missing, vec![20, 30]);
    assert!(db.store.missing_site_ids(&[]).await.unwrap().is_empty());

    db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_foreign_owned_ids_follow_the_chain() {
    let db = test_db().await;
    db.seed_animal("M001", None).await.unwrap();
    db.seed_animal("M002", None).await.unwrap();
    db.seed_chain("M001", 10, 1, 1).await.unwrap();
    db.seed_chain("M002", 20, 2, 99).await.unwrap();

    let stacks = db
        .store
        .foreign_owned_ids(EntityKind::Stack, "M001", &[1, 99, 500])
        .await
        .unwrap();
    assert_eq!(stacks, vec![99]);

    let experiments = db
        .store
        .foreign_owned_ids(EntityKind::Experiment, "M002", &[1, 2])
        .await
        .unwrap();
    assert_eq!(experiments, vec![1]);

    let sites = db
        .store
        .foreign_owned_ids(EntityKind::Site, "M001", &[10])
        .await
        .unwrap();
    assert!(sites.is_empty());

    db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_site_upsert_registers_project() {
    let db = test_db().await;
    db.seed_animal("M001", None).await.unwrap();

    let mut site = NewSite {
        id: 40,
        animal_id: "M001".to_string(),
        project: "Auditory".to_string(),
        location: "A1".to_string(),
        depth: Some(350),
    };
    assert_eq!(
        upsert_site(&db.store, &site).await.unwrap(),
        UpsertOutcome::Inserted
    );

    site.depth = None;
    assert_eq!(
        upsert_site(&db.store, &site).await.unwrap(),
        UpsertOutcome::Updated
    );

    assert_eq!(db.store.distinct_projects().await.unwrap(), vec!["Auditory"]);
    assert_eq!(db.store.distinct_locations().await.unwrap(), vec!["A1"]);

    db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_stack_update_with_same_values_still_matches() {
    let db = test_db().await;
    db.seed_animal("M001", None).await.unwrap();
    db.seed_chain("M001", 10, 1, 1).await.unwrap();

    let row = StackRow {
        id: 1,
        exp_id: 1,
        date: "2024-01-01".to_string(),
        time: "09:00:00".to_string(),
        paradigm: None,
        comment: None,
    };
    assert_eq!(
        upsert_stack(&db.store, &row).await.unwrap(),
        UpsertOutcome::Updated
    );

    db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_batch_is_idempotent() {
    let db = test_db().await;
    db.seed_animal("M001", None).await.unwrap();
    db.seed_chain("M001", 10, 1, 1).await.unwrap();

    let records = vec![
        record(1, "2024-03-05", "2", "1", "10"),
        record(2, "2024-03-05", "3", "5", "10"),
    ];

    let verdict = validate_batch(&db.store, &records, "M001").await.unwrap();
    assert!(matches!(verdict, Verdict::Pass { ref new_sites, .. } if new_sites.is_empty()));

    let first = upsert_batch(&db.store, &records, "M001").await.unwrap();
    assert_eq!(first.inserted_experiments, 1);
    assert_eq!(first.updated_experiments, 1);
    assert_eq!(first.inserted_stacks, 2);

    let second = upsert_batch(&db.store, &records, "M001").await.unwrap();
    assert_eq!(second.inserted(), 0);
    assert_eq!(second.updated_stacks, 2);

    let (date, time): (String, String) = sqlx::query_as(
        "SELECT rec_date::text, to_char(rec_time, 'HH24:MI:SS') FROM stacks WHERE stack_id = 3",
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(date, "2024-03-05");
    assert_eq!(time, "10:30:00");

    db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_list_animals_filters_by_pi() {
    let db = test_db().await;
    db.seed_animal("M002", Some("Grace")).await.unwrap();
    db.seed_animal("M001", Some("Ada")).await.unwrap();
    db.seed_animal("M003", None).await.unwrap();

    assert_eq!(db.store.list_pis().await.unwrap(), vec!["Ada", "Grace"]);

    let all = db.store.list_animals(None).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["M001", "M002", "M003"]);

    let ada = db.store.list_animals(Some("Ada")).await.unwrap();
    assert_eq!(ada.len(), 1);
    assert_eq!(ada[0].id, "M001");
    assert_eq!(ada[0].pi.as_deref(), Some("Ada"));

    db.cleanup().await;
}
