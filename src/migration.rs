//! Versioned data migrations over the key-value store.
//!
//! The current data version lives under [`VERSION_KEY`] (1 when absent).
//! [`MigrationRunner::run`] executes every step with a higher version in
//! ascending order and persists the new version after each success.
//!
//! A failing step halts the run; later steps never leapfrog it. Each failure
//! is recorded under [`FAILURES_KEY`] and once a step has failed
//! `max_attempts` times it is quarantined: later runs skip it and continue
//! with the steps above it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::store::KeyValueStore;

pub const VERSION_KEY: &str = "migration_version";
pub const FAILURES_KEY: &str = "migration_failures";
pub const INITIAL_VERSION: u32 = 1;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// One data migration.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    fn version(&self) -> u32;

    fn description(&self) -> &str;

    async fn up(&self, store: &dyn KeyValueStore) -> Result<()>;
}

/// Persisted record of a failing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationFailure {
    pub version: u32,
    pub description: String,
    pub attempts: u32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
    #[serde(default)]
    pub quarantined: bool,
}

/// Outcome of a single [`MigrationRunner::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub starting_version: u32,
    pub final_version: u32,
    pub applied: Vec<u32>,
    /// Quarantined steps passed over.
    pub skipped: Vec<u32>,
    /// The step that halted the run.
    pub failed: Option<MigrationFailure>,
    /// The runner itself could not read or write its bookkeeping.
    pub error: Option<String>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_none() && self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStatus {
    pub current_version: u32,
    pub pending: Vec<u32>,
    pub failures: Vec<MigrationFailure>,
    pub quarantined: Vec<u32>,
}

pub struct MigrationRunner {
    store: Arc<dyn KeyValueStore>,
    steps: Vec<Arc<dyn MigrationStep>>,
    max_attempts: u32,
}

impl MigrationRunner {
    /// Runner with no steps registered.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            steps: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Runner loaded with [`builtin_migrations`].
    pub fn with_builtin(store: Arc<dyn KeyValueStore>) -> Self {
        let mut runner = Self::new(store);
        for step in builtin_migrations() {
            runner = runner.with_step(step);
        }
        runner
    }

    pub fn with_step(mut self, step: Arc<dyn MigrationStep>) -> Self {
        self.steps.push(step);
        self.steps.sort_by_key(|s| s.version());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Run pending steps. Never fails; problems are logged and reported.
    pub async fn run(&self) -> MigrationReport {
        let mut report = MigrationReport::default();
        if let Err(e) = self.run_pending(&mut report).await {
            error!(error = %e, "Migration bookkeeping failed");
            report.error = Some(e.to_string());
        }
        report
    }

    async fn run_pending(&self, report: &mut MigrationReport) -> Result<()> {
        let current = self.current_version().await?;
        report.starting_version = current;
        report.final_version = current;

        let mut failures = self.failures().await?;
        let pending: Vec<_> = self.steps.iter().filter(|s| s.version() > current).collect();
        if pending.is_empty() {
            debug!(version = current, "No pending migrations");
            return Ok(());
        }
        info!(from = current, pending = pending.len(), "Running migrations");

        for step in pending {
            let version = step.version();
            if failures.iter().any(|f| f.version == version && f.quarantined) {
                warn!(version, "Skipping quarantined migration");
                report.skipped.push(version);
                continue;
            }

            match step.up(self.store.as_ref()).await {
                Ok(()) => {
                    self.store.set_json(VERSION_KEY, &version).await?;
                    if let Some(pos) = failures.iter().position(|f| f.version == version) {
                        failures.remove(pos);
                        self.store.set_json(FAILURES_KEY, &failures).await?;
                    }
                    info!(version, description = step.description(), "Applied migration");
                    report.applied.push(version);
                    report.final_version = version;
                }
                Err(e) => {
                    let failure = self.record_failure(&mut failures, step.as_ref(), &e.to_string());
                    self.store.set_json(FAILURES_KEY, &failures).await?;
                    error!(
                        version,
                        attempts = failure.attempts,
                        quarantined = failure.quarantined,
                        error = %e,
                        "Migration failed"
                    );
                    report.failed = Some(failure);
                    break;
                }
            }
        }
        Ok(())
    }

    fn record_failure(
        &self,
        failures: &mut Vec<MigrationFailure>,
        step: &dyn MigrationStep,
        message: &str,
    ) -> MigrationFailure {
        let version = step.version();
        let idx = match failures.iter().position(|f| f.version == version) {
            Some(idx) => idx,
            None => {
                failures.push(MigrationFailure {
                    version,
                    description: step.description().to_string(),
                    attempts: 0,
                    last_error: String::new(),
                    failed_at: Utc::now(),
                    quarantined: false,
                });
                failures.len() - 1
            }
        };
        let entry = &mut failures[idx];
        entry.attempts += 1;
        entry.last_error = message.to_string();
        entry.failed_at = Utc::now();
        entry.quarantined = entry.attempts >= self.max_attempts;
        entry.clone()
    }

    pub async fn current_version(&self) -> Result<u32> {
        Ok(self
            .store
            .get_json::<u32>(VERSION_KEY)
            .await?
            .unwrap_or(INITIAL_VERSION))
    }

    pub async fn failures(&self) -> Result<Vec<MigrationFailure>> {
        Ok(self
            .store
            .get_json::<Vec<MigrationFailure>>(FAILURES_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn status(&self) -> Result<MigrationStatus> {
        let current_version = self.current_version().await?;
        let failures = self.failures().await?;
        let quarantined: Vec<u32> = failures
            .iter()
            .filter(|f| f.quarantined)
            .map(|f| f.version)
            .collect();
        let pending = self
            .steps
            .iter()
            .map(|s| s.version())
            .filter(|v| *v > current_version && !quarantined.contains(v))
            .collect();
        Ok(MigrationStatus {
            current_version,
            pending,
            failures,
            quarantined,
        })
    }
}

/// The migrations shipped with the crate, in version order.
pub fn builtin_migrations() -> Vec<Arc<dyn MigrationStep>> {
    vec![
        Arc::new(BackfillPetTimestamps),
        Arc::new(MoveLegacyHealthRecords),
        Arc::new(DefaultMedicationActive),
    ]
}

/// Apply `f` to every object in the array under `key`, rewriting it if any
/// record changed. Returns the number of changed records.
async fn rewrite_records<F>(store: &dyn KeyValueStore, key: &str, mut f: F) -> Result<usize>
where
    F: FnMut(&mut Map<String, Value>) -> bool + Send,
{
    let Some(mut records) = store.get_json::<Vec<Value>>(key).await? else {
        return Ok(0);
    };
    let changed = records
        .iter_mut()
        .filter_map(Value::as_object_mut)
        .map(&mut f)
        .filter(|changed| *changed)
        .count();
    if changed > 0 {
        store.set_json(key, &records).await?;
    }
    Ok(changed)
}

/// v2: every pet gets `createdAt` and `updatedAt`.
struct BackfillPetTimestamps;

#[async_trait]
impl MigrationStep for BackfillPetTimestamps {
    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &str {
        "backfill pet timestamps"
    }

    async fn up(&self, store: &dyn KeyValueStore) -> Result<()> {
        let now = serde_json::to_value(Utc::now())?;
        let changed = rewrite_records(store, "pets", |pet| {
            let mut changed = false;
            if !pet.get("createdAt").is_some_and(Value::is_string) {
                pet.insert("createdAt".to_string(), now.clone());
                changed = true;
            }
            if !pet.get("updatedAt").is_some_and(Value::is_string) {
                let created = pet.get("createdAt").cloned().unwrap_or_else(|| now.clone());
                pet.insert("updatedAt".to_string(), created);
                changed = true;
            }
            changed
        })
        .await?;
        debug!(changed, "Backfilled pet timestamps");
        Ok(())
    }
}

/// v3: records under the old `health` key move into `health_records`.
struct MoveLegacyHealthRecords;

const LEGACY_HEALTH_KEY: &str = "health";

#[async_trait]
impl MigrationStep for MoveLegacyHealthRecords {
    fn version(&self) -> u32 {
        3
    }

    fn description(&self) -> &str {
        "move legacy health key into health_records"
    }

    async fn up(&self, store: &dyn KeyValueStore) -> Result<()> {
        let Some(legacy) = store.get_json::<Vec<Value>>(LEGACY_HEALTH_KEY).await? else {
            return Ok(());
        };
        let mut records = store
            .get_json::<Vec<Value>>("health_records")
            .await?
            .unwrap_or_default();

        let mut moved = 0;
        for record in legacy {
            let duplicate = record
                .get("id")
                .is_some_and(|id| records.iter().any(|r| r.get("id") == Some(id)));
            if !duplicate {
                records.push(record);
                moved += 1;
            }
        }
        store.set_json("health_records", &records).await?;
        store.remove_item(LEGACY_HEALTH_KEY).await?;
        debug!(moved, "Moved legacy health records");
        Ok(())
    }
}

/// v4: medications without an `active` flag become active.
struct DefaultMedicationActive;

#[async_trait]
impl MigrationStep for DefaultMedicationActive {
    fn version(&self) -> u32 {
        4
    }

    fn description(&self) -> &str {
        "default medication active flag"
    }

    async fn up(&self, store: &dyn KeyValueStore) -> Result<()> {
        let changed = rewrite_records(store, "medications", |med| {
            if med.get("active").is_some_and(Value::is_boolean) {
                return false;
            }
            med.insert("active".to_string(), Value::Bool(true));
            true
        })
        .await?;
        debug!(changed, "Defaulted medication active flags");
        Ok(())
    }
}
