//! PostgreSQL implementation of the storage port.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use labnote_core::{Animal, EntityKind, Error, ExperimentRow, LabStore, NewSite, Result, StackRow};

use crate::missing_from;

/// PostgreSQL-backed [`LabStore`].
#[derive(Clone)]
pub struct PgLabStore {
    pool: PgPool,
}

impl PgLabStore {
    /// Create a new PgLabStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the reference schema. Statements are idempotent.
    pub async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../schema/postgres.sql"))
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}

fn ownership_query(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Site => {
            "SELECT s.site_id FROM sites s \
             WHERE s.site_id = ANY($1) AND s.animal_id <> $2 \
             ORDER BY s.site_id"
        }
        EntityKind::Experiment => {
            "SELECT e.exp_id FROM experiments e \
             JOIN sites s ON s.site_id = e.site_id \
             WHERE e.exp_id = ANY($1) AND s.animal_id <> $2 \
             ORDER BY e.exp_id"
        }
        EntityKind::Stack => {
            "SELECT st.stack_id FROM stacks st \
             JOIN experiments e ON e.exp_id = st.exp_id \
             JOIN sites s ON s.site_id = e.site_id \
             WHERE st.stack_id = ANY($1) AND s.animal_id <> $2 \
             ORDER BY st.stack_id"
        }
    }
}

#[async_trait]
impl LabStore for PgLabStore {
    async fn missing_site_ids(&self, candidates: &[i64]) -> Result<Vec<i64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let existing: Vec<i64> =
            sqlx::query_scalar("SELECT site_id FROM sites WHERE site_id = ANY($1)")
                .bind(candidates)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
        let missing = missing_from(candidates, &existing);
        debug!(
            subsystem = "db",
            component = "postgres",
            op = "missing_site_ids",
            candidate_count = candidates.len(),
            result_count = missing.len(),
            "Checked site existence"
        );
        Ok(missing)
    }

    async fn foreign_owned_ids(
        &self,
        kind: EntityKind,
        animal_id: &str,
        candidates: &[i64],
    ) -> Result<Vec<i64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let foreign: Vec<i64> = sqlx::query_scalar(ownership_query(kind))
            .bind(candidates)
            .bind(animal_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        debug!(
            subsystem = "db",
            component = "postgres",
            op = "foreign_owned_ids",
            %kind,
            animal_id,
            result_count = foreign.len(),
            "Checked ownership"
        );
        Ok(foreign)
    }

    async fn distinct_projects(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM projects ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn distinct_locations(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT location FROM sites ORDER BY location")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn update_site(&self, site: &NewSite) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("INSERT INTO projects (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(&site.project)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let result = sqlx::query(
            "UPDATE sites SET animal_id = $2, project = $3, location = $4, depth = $5 \
             WHERE site_id = $1",
        )
        .bind(site.id)
        .bind(&site.animal_id)
        .bind(&site.project)
        .bind(&site.location)
        .bind(site.depth)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn insert_site(&self, site: &NewSite) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("INSERT INTO projects (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(&site.project)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO sites (site_id, animal_id, project, location, depth) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(site.id)
        .bind(&site.animal_id)
        .bind(&site.project)
        .bind(&site.location)
        .bind(site.depth)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn update_experiment(&self, row: &ExperimentRow) -> Result<u64> {
        let result = sqlx::query("UPDATE experiments SET site_id = $2 WHERE exp_id = $1")
            .bind(row.id)
            .bind(row.site_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn insert_experiment(&self, row: &ExperimentRow) -> Result<()> {
        sqlx::query("INSERT INTO experiments (exp_id, site_id) VALUES ($1, $2)")
            .bind(row.id)
            .bind(row.site_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_stack(&self, row: &StackRow) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE stacks SET exp_id = $2, rec_date = $3::date, rec_time = $4::time, \
             paradigm = $5, comment = $6 WHERE stack_id = $1",
        )
        .bind(row.id)
        .bind(row.exp_id)
        .bind(&row.date)
        .bind(&row.time)
        .bind(&row.paradigm)
        .bind(&row.comment)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn insert_stack(&self, row: &StackRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO stacks (stack_id, exp_id, rec_date, rec_time, paradigm, comment) \
             VALUES ($1, $2, $3::date, $4::time, $5, $6)",
        )
        .bind(row.id)
        .bind(row.exp_id)
        .bind(&row.date)
        .bind(&row.time)
        .bind(&row.paradigm)
        .bind(&row.comment)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_pis(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM pis ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn list_animals(&self, pi: Option<&str>) -> Result<Vec<Animal>> {
        let rows = sqlx::query(
            "SELECT animal_id, pi FROM animals \
             WHERE $1::text IS NULL OR pi = $1 \
             ORDER BY animal_id",
        )
        .bind(pi)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(Animal {
                    id: row.try_get("animal_id").map_err(Error::Database)?,
                    pi: row.try_get("pi").map_err(Error::Database)?,
                })
            })
            .collect()
    }
}
