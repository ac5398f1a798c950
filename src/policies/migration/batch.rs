use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::phase::PhaseConfig;
use crate::policies::audit::{AuditAction, AuditEntityType, AuditEntry, AuditRecorder};
use crate::policies::domain::{ClientId, LegacyPolicy};
use crate::policies::repository::{InstanceStore, LegacyStore, RepositoryError, TemplateStore};
use crate::policies::validation::ValidationEngine;

/// Upper bound on a single batch; a batch that overruns is marked failed
/// rather than retried.
const BATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A legacy row the run could not convert, with the rule failures that
/// disqualified it. Never fatal to the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub client_id: ClientId,
    pub policy_number: String,
    pub errors: BTreeMap<String, String>,
}

/// Pre-migration copy of a converted row, retained so the conversion can be
/// reverted while the retention window is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationSnapshot {
    pub record: LegacyPolicy,
    pub converted_on: NaiveDate,
    pub retain_until: NaiveDate,
}

/// Summary of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    pub migrated: usize,
    pub skipped: Vec<SkippedRecord>,
    pub batches: usize,
    pub cancelled: bool,
    pub watermark: Option<(ClientId, String)>,
}

/// Terminal migration failure. Per-record problems are reported through
/// [`MigrationReport::skipped`]; this error only occurs when the run must
/// halt.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("migration halted in batch {batch}: {source}")]
    Halted {
        batch: usize,
        watermark: Option<(ClientId, String)>,
        source: RepositoryError,
    },
    #[error("no retained snapshot for client {client} policy {policy_number}")]
    SnapshotMissing {
        client: String,
        policy_number: String,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Resumable batch conversion of legacy rows into the template shape.
///
/// The phase configuration is captured at construction and never re-read;
/// switching phases means starting a new run. Each batch stands alone: the
/// cancellation flag is checked before a batch starts and no transaction
/// spans batch boundaries, so partial progress survives a crash.
pub struct BatchMigrator<S, L, A> {
    store: Arc<S>,
    legacy: Arc<L>,
    audit: Arc<A>,
    config: PhaseConfig,
    engine: ValidationEngine,
    snapshots: Mutex<Vec<MigrationSnapshot>>,
    watermark: Mutex<Option<(ClientId, String)>>,
}

impl<S, L, A> BatchMigrator<S, L, A>
where
    S: TemplateStore + InstanceStore + 'static,
    L: LegacyStore + 'static,
    A: AuditRecorder + 'static,
{
    pub fn new(store: Arc<S>, legacy: Arc<L>, audit: Arc<A>, config: PhaseConfig) -> Self {
        let engine = ValidationEngine::new(config.validation);
        Self {
            store,
            legacy,
            audit,
            config,
            engine,
            snapshots: Mutex::new(Vec::new()),
            watermark: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    /// High-water mark of the last processed row, if a run has progressed.
    pub fn watermark(&self) -> Option<(ClientId, String)> {
        self.watermark.lock().ok().and_then(|mark| mark.clone())
    }

    /// Snapshots still inside their retention window as of `today`.
    pub fn retained_snapshots(&self, today: NaiveDate) -> Vec<MigrationSnapshot> {
        self.snapshots
            .lock()
            .map(|snapshots| {
                snapshots
                    .iter()
                    .filter(|snapshot| snapshot.retain_until >= today)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Entry point for scheduler-triggered runs: honors the phase's
    /// `enable_auto_migration` knob. Explicit operator runs call [`run`]
    /// directly.
    pub fn run_if_enabled(
        &self,
        actor: &str,
        cancel: &AtomicBool,
        today: NaiveDate,
    ) -> Result<Option<MigrationReport>, MigrationError> {
        if !self.config.batch.enable_auto_migration {
            return Ok(None);
        }
        self.run(actor, cancel, today).map(Some)
    }

    /// Convert all legacy rows past the current watermark, in batches.
    pub fn run(
        &self,
        actor: &str,
        cancel: &AtomicBool,
        today: NaiveDate,
    ) -> Result<MigrationReport, MigrationError> {
        let mut report = MigrationReport::default();
        self.prune_snapshots(today);

        let resume_after = self.watermark();
        let rows: Vec<LegacyPolicy> = self
            .legacy
            .list()?
            .into_iter()
            .filter(|row| match &resume_after {
                Some(mark) => row.watermark() > *mark,
                None => true,
            })
            .collect();

        let batch_size = self.config.batch.batch_size.max(1);
        for (batch_index, batch) in rows.chunks(batch_size).enumerate() {
            if cancel.load(Ordering::Acquire) {
                report.cancelled = true;
                break;
            }

            let started = Instant::now();
            let mut converted_in_batch = 0;

            for record in batch {
                if started.elapsed() > BATCH_TIMEOUT {
                    warn!(batch = batch_index, "batch overran its timeout, marking remainder failed");
                    report.skipped.push(SkippedRecord {
                        client_id: record.client_id.clone(),
                        policy_number: record.policy_number.clone(),
                        errors: BTreeMap::from([(
                            "batch".to_string(),
                            "batch timed out before this record was processed".to_string(),
                        )]),
                    });
                    continue;
                }

                match self.convert(record, today) {
                    Ok(ConversionOutcome::Converted) => {
                        report.migrated += 1;
                        converted_in_batch += 1;
                    }
                    Ok(ConversionOutcome::Skipped(skip)) => report.skipped.push(skip),
                    Err(error) => {
                        // Without rollback snapshots a store-level failure
                        // can leave a half-converted row we cannot revert;
                        // halt at the last good watermark.
                        if !self.config.batch.enable_rollback {
                            return Err(MigrationError::Halted {
                                batch: batch_index,
                                watermark: self.watermark(),
                                source: error,
                            });
                        }
                        report.skipped.push(SkippedRecord {
                            client_id: record.client_id.clone(),
                            policy_number: record.policy_number.clone(),
                            errors: BTreeMap::from([(
                                "store".to_string(),
                                error.to_string(),
                            )]),
                        });
                    }
                }

                if let Ok(mut mark) = self.watermark.lock() {
                    *mark = Some(record.watermark());
                }
            }

            report.batches += 1;
            self.record_batch(actor, batch_index, converted_in_batch, batch.len());
        }

        report.watermark = self.watermark();
        info!(
            migrated = report.migrated,
            skipped = report.skipped.len(),
            batches = report.batches,
            cancelled = report.cancelled,
            "migration run finished"
        );
        Ok(report)
    }

    /// Revert one conversion from its retained snapshot: restore the legacy
    /// row and remove the instance the conversion created. Shared templates
    /// are left in place.
    pub fn revert(
        &self,
        client: &ClientId,
        policy_number: &str,
        today: NaiveDate,
    ) -> Result<(), MigrationError> {
        let snapshot = self
            .retained_snapshots(today)
            .into_iter()
            .find(|snapshot| {
                snapshot.record.client_id == *client
                    && snapshot.record.policy_number.eq_ignore_ascii_case(policy_number)
            })
            .ok_or_else(|| MigrationError::SnapshotMissing {
                client: client.0.clone(),
                policy_number: policy_number.to_string(),
            })?;

        self.legacy.upsert(snapshot.record.clone())?;

        if let Some(template) = self.store.find_by_number(policy_number)? {
            let instance = self
                .store
                .list_for_template(&template.id)?
                .into_iter()
                .find(|instance| instance.client_id == *client);
            if let Some(instance) = instance {
                InstanceStore::delete(self.store.as_ref(), &instance.id)?;
            }
        }
        Ok(())
    }

    fn convert(
        &self,
        record: &LegacyPolicy,
        today: NaiveDate,
    ) -> Result<ConversionOutcome, RepositoryError> {
        let report = self.engine.validate_legacy(record);
        if !report.is_valid() {
            return Ok(ConversionOutcome::Skipped(SkippedRecord {
                client_id: record.client_id.clone(),
                policy_number: record.policy_number.clone(),
                errors: report.errors,
            }));
        }

        if !self.engine.config().allow_duplicates {
            if let Some(existing) = self.store.find_by_number(&record.policy_number)? {
                if existing.provider != record.provider
                    || existing.policy_type != record.policy_type
                {
                    return Ok(ConversionOutcome::Skipped(SkippedRecord {
                        client_id: record.client_id.clone(),
                        policy_number: record.policy_number.clone(),
                        errors: BTreeMap::from([(
                            "policy_number".to_string(),
                            "already registered with different template metadata".to_string(),
                        )]),
                    }));
                }
            }
        }

        super::gateway::write_templated(self.store.as_ref(), record, today)?;

        if self.config.batch.enable_rollback {
            let retain_until = today
                .checked_add_days(Days::new(u64::from(self.config.batch.backup_retention_days)))
                .unwrap_or(today);
            if let Ok(mut snapshots) = self.snapshots.lock() {
                snapshots.push(MigrationSnapshot {
                    record: record.clone(),
                    converted_on: today,
                    retain_until,
                });
            }
        }

        Ok(ConversionOutcome::Converted)
    }

    fn prune_snapshots(&self, today: NaiveDate) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.retain(|snapshot| snapshot.retain_until >= today);
        }
    }

    fn record_batch(&self, actor: &str, batch: usize, converted: usize, size: usize) {
        let entry = AuditEntry {
            actor_id: actor.to_string(),
            action: AuditAction::MigrationBatch,
            entity_type: AuditEntityType::LegacyPolicy,
            entity_id: format!("batch-{batch}"),
            client_id: None,
            description: format!("migration batch {batch} converted {converted} of {size} record(s)"),
            recorded_at: Utc::now(),
        };
        if let Err(error) = self.audit.record(entry) {
            warn!(%error, "failed to record migration batch audit entry");
        }
    }
}

enum ConversionOutcome {
    Converted,
    Skipped(SkippedRecord),
}
