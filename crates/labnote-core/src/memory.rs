//! In-memory [`LabStore`] for tests and dry runs.
//!
//! Mirrors the relational ownership chain (stack → experiment → site →
//! animal) with ordered maps, records every call in order, and can be told to
//! fail specific writes.
//!
//! ```rust
//! use labnote_core::MemoryStore;
//!
//! let store = MemoryStore::new()
//!     .with_animal("M001", Some("Curie"))
//!     .with_site(10, "M001", "P1", "L1", None)
//!     .failing_site_inserts(1);
//! assert_eq!(store.site_count(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::models::{Animal, EntityKind, ExperimentRow, NewSite, StackRow};
use crate::traits::LabStore;

#[derive(Debug, Default)]
struct State {
    animals: BTreeMap<String, Option<String>>,
    sites: BTreeMap<i64, NewSite>,
    experiments: BTreeMap<i64, ExperimentRow>,
    stacks: BTreeMap<i64, StackRow>,
    failing_site_inserts: usize,
    failing_stacks: HashSet<i64>,
    calls: Vec<String>,
}

impl State {
    fn owner_of(&self, kind: EntityKind, id: i64) -> Option<&str> {
        let site_id = match kind {
            EntityKind::Site => id,
            EntityKind::Experiment => self.experiments.get(&id)?.site_id,
            EntityKind::Stack => {
                let exp_id = self.stacks.get(&id)?.exp_id;
                self.experiments.get(&exp_id)?.site_id
            }
        };
        self.sites.get(&site_id).map(|s| s.animal_id.as_str())
    }
}

/// Shared, cloneable in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_animal(self, id: &str, pi: Option<&str>) -> Self {
        self.state
            .lock()
            .animals
            .insert(id.to_string(), pi.map(str::to_string));
        self
    }

    pub fn with_site(
        self,
        id: i64,
        animal_id: &str,
        project: &str,
        location: &str,
        depth: Option<i64>,
    ) -> Self {
        self.state.lock().sites.insert(
            id,
            NewSite {
                id,
                animal_id: animal_id.to_string(),
                project: project.to_string(),
                location: location.to_string(),
                depth,
            },
        );
        self
    }

    pub fn with_experiment(self, id: i64, site_id: i64) -> Self {
        self.state
            .lock()
            .experiments
            .insert(id, ExperimentRow { id, site_id });
        self
    }

    pub fn with_stack(self, id: i64, exp_id: i64) -> Self {
        self.state.lock().stacks.insert(
            id,
            StackRow {
                id,
                exp_id,
                date: "2000-01-01".to_string(),
                time: "00:00:00".to_string(),
                paradigm: None,
                comment: None,
            },
        );
        self
    }

    /// Make the next `count` site inserts fail.
    pub fn failing_site_inserts(self, count: usize) -> Self {
        self.state.lock().failing_site_inserts = count;
        self
    }

    /// Make every write touching stack `id` fail.
    pub fn failing_stack(self, id: i64) -> Self {
        self.state.lock().failing_stacks.insert(id);
        self
    }

    /// Every port call so far, in order, e.g. `"insert_site 20"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Calls that wrote something.
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("insert_") || c.starts_with("update_"))
            .collect()
    }

    pub fn site(&self, id: i64) -> Option<NewSite> {
        self.state.lock().sites.get(&id).cloned()
    }

    pub fn experiment(&self, id: i64) -> Option<ExperimentRow> {
        self.state.lock().experiments.get(&id).cloned()
    }

    pub fn stack(&self, id: i64) -> Option<StackRow> {
        self.state.lock().stacks.get(&id).cloned()
    }

    pub fn site_count(&self) -> usize {
        self.state.lock().sites.len()
    }

    pub fn experiment_count(&self) -> usize {
        self.state.lock().experiments.len()
    }

    pub fn stack_count(&self) -> usize {
        self.state.lock().stacks.len()
    }

    fn log(&self, call: String) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl LabStore for MemoryStore {
    async fn missing_site_ids(&self, candidates: &[i64]) -> Result<Vec<i64>> {
        self.log("missing_site_ids".to_string());
        let state = self.state.lock();
        let missing: BTreeSet<i64> = candidates
            .iter()
            .copied()
            .filter(|id| !state.sites.contains_key(id))
            .collect();
        Ok(missing.into_iter().collect())
    }

    async fn foreign_owned_ids(
        &self,
        kind: EntityKind,
        animal_id: &str,
        candidates: &[i64],
    ) -> Result<Vec<i64>> {
        self.log(format!("foreign_owned_ids {}", kind));
        let state = self.state.lock();
        let foreign: BTreeSet<i64> = candidates
            .iter()
            .copied()
            .filter(|id| matches!(state.owner_of(kind, *id), Some(owner) if owner != animal_id))
            .collect();
        Ok(foreign.into_iter().collect())
    }

    async fn distinct_projects(&self) -> Result<Vec<String>> {
        self.log("distinct_projects".to_string());
        let state = self.state.lock();
        let projects: BTreeSet<String> = state.sites.values().map(|s| s.project.clone()).collect();
        Ok(projects.into_iter().collect())
    }

    async fn distinct_locations(&self) -> Result<Vec<String>> {
        self.log("distinct_locations".to_string());
        let state = self.state.lock();
        let locations: BTreeSet<String> =
            state.sites.values().map(|s| s.location.clone()).collect();
        Ok(locations.into_iter().collect())
    }

    async fn update_site(&self, site: &NewSite) -> Result<u64> {
        self.log(format!("update_site {}", site.id));
        let mut state = self.state.lock();
        match state.sites.get_mut(&site.id) {
            Some(existing) => {
                *existing = site.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_site(&self, site: &NewSite) -> Result<()> {
        self.log(format!("insert_site {}", site.id));
        let mut state = self.state.lock();
        if state.failing_site_inserts > 0 {
            state.failing_site_inserts -= 1;
            return Err(Error::Write(format!("site {}: injected failure", site.id)));
        }
        if !state.animals.contains_key(&site.animal_id) {
            return Err(Error::Write(format!(
                "site {}: unknown animal {}",
                site.id, site.animal_id
            )));
        }
        if state.sites.contains_key(&site.id) {
            return Err(Error::Write(format!("site {}: duplicate key", site.id)));
        }
        state.sites.insert(site.id, site.clone());
        Ok(())
    }

    async fn update_experiment(&self, row: &ExperimentRow) -> Result<u64> {
        self.log(format!("update_experiment {}", row.id));
        let mut state = self.state.lock();
        match state.experiments.get_mut(&row.id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_experiment(&self, row: &ExperimentRow) -> Result<()> {
        self.log(format!("insert_experiment {}", row.id));
        let mut state = self.state.lock();
        if !state.sites.contains_key(&row.site_id) {
            return Err(Error::Write(format!(
                "experiment {}: unknown site {}",
                row.id, row.site_id
            )));
        }
        if state.experiments.contains_key(&row.id) {
            return Err(Error::Write(format!("experiment {}: duplicate key", row.id)));
        }
        state.experiments.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_stack(&self, row: &StackRow) -> Result<u64> {
        self.log(format!("update_stack {}", row.id));
        let mut state = self.state.lock();
        if state.failing_stacks.contains(&row.id) {
            return Err(Error::Write(format!("stack {}: injected failure", row.id)));
        }
        match state.stacks.get_mut(&row.id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_stack(&self, row: &StackRow) -> Result<()> {
        self.log(format!("insert_stack {}", row.id));
        let mut state = self.state.lock();
        if state.failing_stacks.contains(&row.id) {
            return Err(Error::Write(format!("stack {}: injected failure", row.id)));
        }
        if !state.experiments.contains_key(&row.exp_id) {
            return Err(Error::Write(format!(
                "stack {}: unknown experiment {}",
                row.id, row.exp_id
            )));
        }
        if state.stacks.contains_key(&row.id) {
            return Err(Error::Write(format!("stack {}: duplicate key", row.id)));
        }
        state.stacks.insert(row.id, row.clone());
        Ok(())
    }

    async fn list_pis(&self) -> Result<Vec<String>> {
        self.log("list_pis".to_string());
        let state = self.state.lock();
        let pis: BTreeSet<String> = state.animals.values().flatten().cloned().collect();
        Ok(pis.into_iter().collect())
    }

    async fn list_animals(&self, pi: Option<&str>) -> Result<Vec<Animal>> {
        self.log("list_animals".to_string());
        let state = self.state.lock();
        Ok(state
            .animals
            .iter()
            .filter(|(_, animal_pi)| pi.is_none() || animal_pi.as_deref() == pi)
            .map(|(id, animal_pi)| Animal {
                id: id.clone(),
                pi: animal_pi.clone(),
            })
            .collect())
    }
}
