//! MySQL / MariaDB implementation of the storage port.

use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use tracing::debug;

use labnote_core::{Animal, EntityKind, Error, ExperimentRow, LabStore, NewSite, Result, StackRow};

use crate::missing_from;

/// MySQL-backed [`LabStore`].
#[derive(Clone)]
pub struct MySqlLabStore {
    pool: MySqlPool,
}

impl MySqlLabStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Apply the reference schema.
    pub async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../schema/mysql.sql"))
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// MySQL reports changed rows, not matched rows. An UPDATE that writes
    /// identical values reports zero, so confirm with a lookup before the
    /// caller falls through to INSERT.
    async fn matched(&self, affected: u64, table: &str, key: &str, id: i64) -> Result<u64> {
        if affected > 0 {
            return Ok(affected);
        }
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE {key} = ?");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count as u64)
    }
}

/// `SELECT <id> ... WHERE <id> IN (...) AND s.animal_id <> ?` for one kind.
fn ownership_query<'a>(
    kind: EntityKind,
    animal_id: &'a str,
    candidates: &'a [i64],
) -> QueryBuilder<'a, MySql> {
    let (head, column) = match kind {
        EntityKind::Site => ("SELECT s.site_id FROM sites s WHERE ", "s.site_id"),
        EntityKind::Experiment => (
            "SELECT e.exp_id FROM experiments e \
             JOIN sites s ON s.site_id = e.site_id WHERE ",
            "e.exp_id",
        ),
        EntityKind::Stack => (
            "SELECT st.stack_id FROM stacks st \
             JOIN experiments e ON e.exp_id = st.exp_id \
             JOIN sites s ON s.site_id = e.site_id WHERE ",
            "st.stack_id",
        ),
    };

    let mut qb = QueryBuilder::new(head);
    qb.push(column).push(" IN (");
    let mut list = qb.separated(", ");
    for id in candidates {
        list.push_bind(*id);
    }
    list.push_unseparated(") AND s.animal_id <> ");
    qb.push_bind(animal_id);
    qb.push(" ORDER BY ").push(column);
    qb
}

#[async_trait]
impl LabStore for MySqlLabStore {
    async fn missing_site_ids(&self, candidates: &[i64]) -> Result<Vec<i64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<MySql> =
            QueryBuilder::new("SELECT site_id FROM sites WHERE site_id IN (");
        let mut list = qb.separated(", ");
        for id in candidates {
            list.push_bind(*id);
        }
        list.push_unseparated(")");

        let existing: Vec<i64> = qb
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        let missing = missing_from(candidates, &existing);
        debug!(
            subsystem = "db",
            component = "mysql",
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
        let mut qb = ownership_query(kind, animal_id, candidates);
        let foreign: Vec<i64> = qb
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        debug!(
            subsystem = "db",
            component = "mysql",
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

        sqlx::query("INSERT IGNORE INTO projects (name) VALUES (?)")
            .bind(&site.project)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let result = sqlx::query(
            "UPDATE sites SET animal_id = ?, project = ?, location = ?, depth = ? \
             WHERE site_id = ?",
        )
        .bind(&site.animal_id)
        .bind(&site.project)
        .bind(&site.location)
        .bind(site.depth)
        .bind(site.id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        self.matched(result.rows_affected(), "sites", "site_id", site.id)
            .await
    }

    async fn insert_site(&self, site: &NewSite) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("INSERT IGNORE INTO projects (name) VALUES (?)")
            .bind(&site.project)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO sites (site_id, animal_id, project, location, depth) \
             VALUES (?, ?, ?, ?, ?)",
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
        let result = sqlx::query("UPDATE experiments SET site_id = ? WHERE exp_id = ?")
            .bind(row.site_id)
            .bind(row.id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        self.matched(result.rows_affected(), "experiments", "exp_id", row.id)
            .await
    }

    async fn insert_experiment(&self, row: &ExperimentRow) -> Result<()> {
        sqlx::query("INSERT INTO experiments (exp_id, site_id) VALUES (?, ?)")
            .bind(row.id)
            .bind(row.site_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_stack(&self, row: &StackRow) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE stacks SET exp_id = ?, rec_date = ?, rec_time = ?, paradigm = ?, comment = ? \
             WHERE stack_id = ?",
        )
        .bind(row.exp_id)
        .bind(&row.date)
        .bind(&row.time)
        .bind(&row.paradigm)
        .bind(&row.comment)
        .bind(row.id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        self.matched(result.rows_affected(), "stacks", "stack_id", row.id)
            .await
    }

    async fn insert_stack(&self, row: &StackRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO stacks (stack_id, exp_id, rec_date, rec_time, paradigm, comment) \
             VALUES (?, ?, ?, ?, ?, ?)",
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
        let mut qb: QueryBuilder<MySql> = QueryBuilder::new("SELECT animal_id, pi FROM animals");
        if let Some(pi) = pi {
            qb.push(" WHERE pi = ").push_bind(pi);
        }
        qb.push(" ORDER BY animal_id");

        let rows = qb
            .build()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_query_stack_joins_to_sites() {
        let ids = [3, 4];
        let qb = ownership_query(EntityKind::Stack, "M001", &ids);
        let sql = qb.sql();
        assert!(sql.contains("JOIN experiments e ON e.exp_id = st.exp_id"));
        assert!(sql.contains("st.stack_id IN (?, ?) AND s.animal_id <> ?"));
        assert!(sql.ends_with("ORDER BY st.stack_id"));
    }

    #[test]
    fn test_ownership_query_site_has_no_join() {
        let ids = [10];
        let qb = ownership_query(EntityKind::Site, "M001", &ids);
        let sql = qb.sql();
        assert!(!sql.contains("JOIN"));
        assert!(sql.contains("s.site_id IN (?) AND s.animal_id <> ?"));
    }
}
