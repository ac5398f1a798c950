use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;

use super::common::*;
use crate::policies::audit::{AuditAction, MemoryAuditLog};
use crate::policies::domain::{ClientId, PolicyStatus};
use crate::policies::migration::{
    select_gateway, BatchMigrator, MigrationError, MigrationPhase, PhaseConfig, PolicyRecord,
};
use crate::policies::repository::{
    InstanceStore, LegacyStore, MemoryLegacyStore, MemoryPolicyStore, TemplateStore,
};

fn client(id: &str) -> ClientId {
    ClientId(id.to_string())
}

#[test]
fn phase_defaults_match_the_rollout_plan() {
    let preparation = PhaseConfig::for_phase(MigrationPhase::Preparation);
    assert!(!preparation.use_template_system);
    assert!(!preparation.allow_fallback);
    assert!(preparation.validation.strict_mode);
    assert!(!preparation.validation.allow_duplicates);

    let migration = PhaseConfig::for_phase(MigrationPhase::Migration);
    assert!(migration.use_template_system);
    assert!(migration.allow_fallback);
    assert!(!migration.migrate_on_read);
    assert!(migration.validation.allow_duplicates);

    let transition = PhaseConfig::for_phase(MigrationPhase::Transition);
    assert!(transition.migrate_on_read);
    assert!(!transition.validation.strict_mode);
    assert!(transition.validation.validate_dates);
    assert!(transition.validation.validate_amounts);

    let complete = PhaseConfig::for_phase(MigrationPhase::Complete);
    assert!(complete.use_template_system);
    assert!(!complete.allow_fallback);
    assert!(!complete.batch.enable_rollback);
    assert!(complete.batch.backup_retention_days < migration.batch.backup_retention_days);
    assert!(complete.validation.strict_mode);
}

#[test]
fn preparation_phase_reads_and_writes_legacy_only() {
    let store = Arc::new(MemoryPolicyStore::new());
    let legacy = seeded_legacy(&[]);
    let config = PhaseConfig::for_phase(MigrationPhase::Preparation);
    let gateway = select_gateway(&config, store.clone(), legacy.clone());

    let record = legacy_record("c1", "LEG-001");
    gateway.write(&record, today()).expect("write succeeds");

    assert!(legacy
        .fetch(&client("c1"), "LEG-001")
        .expect("fetch")
        .is_some());
    assert!(store.find_by_number("LEG-001").expect("lookup").is_none());

    match gateway.fetch(&client("c1"), "LEG-001").expect("read") {
        Some(PolicyRecord::Legacy { record }) => {
            assert_eq!(record.policy_number, "LEG-001");
        }
        other => panic!("expected legacy record, got {other:?}"),
    }
}

#[test]
fn migration_phase_writes_both_shapes_and_falls_back() {
    let store = Arc::new(MemoryPolicyStore::new());
    let legacy = seeded_legacy(&[legacy_record("c2", "LEG-OLD")]);
    let config = PhaseConfig::for_phase(MigrationPhase::Migration);
    let gateway = select_gateway(&config, store.clone(), legacy.clone());

    gateway
        .write(&legacy_record("c1", "LEG-NEW"), today())
        .expect("write succeeds");
    assert!(store.find_by_number("LEG-NEW").expect("lookup").is_some());
    assert!(legacy
        .fetch(&client("c1"), "LEG-NEW")
        .expect("fetch")
        .is_some());

    // A template-shape miss falls back to the legacy table without copying.
    match gateway.fetch(&client("c2"), "LEG-OLD").expect("read") {
        Some(PolicyRecord::Legacy { .. }) => {}
        other => panic!("expected legacy fallback, got {other:?}"),
    }
    assert!(store.find_by_number("LEG-OLD").expect("lookup").is_none());
}

#[test]
fn transition_phase_migrates_on_read() {
    let store = Arc::new(MemoryPolicyStore::new());
    let legacy = seeded_legacy(&[legacy_record("c1", "LEG-LAZY")]);
    let config = PhaseConfig::for_phase(MigrationPhase::Transition);
    let gateway = select_gateway(&config, store.clone(), legacy.clone());

    // The first read is served from the legacy shape...
    match gateway.fetch(&client("c1"), "LEG-LAZY").expect("read") {
        Some(PolicyRecord::Legacy { .. }) => {}
        other => panic!("expected legacy read, got {other:?}"),
    }

    // ...and leaves a template-shape copy behind for the next one.
    let template = store
        .find_by_number("LEG-LAZY")
        .expect("lookup")
        .expect("copied template");
    assert_eq!(store.list_for_template(&template.id).expect("list").len(), 1);

    match gateway.fetch(&client("c1"), "LEG-LAZY").expect("read") {
        Some(PolicyRecord::Templated { instance, .. }) => {
            assert_eq!(instance.client_id, client("c1"));
        }
        other => panic!("expected templated read, got {other:?}"),
    }
}

#[test]
fn complete_phase_never_touches_legacy() {
    let store = Arc::new(MemoryPolicyStore::new());
    let legacy = seeded_legacy(&[legacy_record("c1", "LEG-GONE")]);
    let config = PhaseConfig::for_phase(MigrationPhase::Complete);
    let gateway = select_gateway(&config, store.clone(), legacy.clone());

    assert!(gateway
        .fetch(&client("c1"), "LEG-GONE")
        .expect("read")
        .is_none());

    gateway
        .write(&legacy_record("c1", "TPL-ONLY"), today())
        .expect("write succeeds");
    assert!(legacy
        .fetch(&client("c1"), "TPL-ONLY")
        .expect("fetch")
        .is_none());
    assert!(store.find_by_number("TPL-ONLY").expect("lookup").is_some());
}

fn migrator_for(
    phase: MigrationPhase,
    rows: &[crate::policies::domain::LegacyPolicy],
) -> (
    BatchMigrator<MemoryPolicyStore, MemoryLegacyStore, MemoryAuditLog>,
    Arc<MemoryPolicyStore>,
    Arc<MemoryLegacyStore>,
    Arc<MemoryAuditLog>,
) {
    let store = Arc::new(MemoryPolicyStore::new());
    let legacy = seeded_legacy(rows);
    let audit = Arc::new(MemoryAuditLog::new());
    let migrator = BatchMigrator::new(
        store.clone(),
        legacy.clone(),
        audit.clone(),
        PhaseConfig::for_phase(phase),
    );
    (migrator, store, legacy, audit)
}

#[test]
fn batch_run_converts_in_chunks_and_audits_each_batch() {
    let rows = [
        legacy_record("c1", "LEG-001"),
        legacy_record("c1", "LEG-002"),
        legacy_record("c2", "LEG-003"),
    ];
    let store = Arc::new(MemoryPolicyStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let mut config = PhaseConfig::for_phase(MigrationPhase::Migration);
    config.batch.batch_size = 2;
    let migrator = BatchMigrator::new(store.clone(), seeded_legacy(&rows), audit.clone(), config);

    let cancel = AtomicBool::new(false);
    let report = migrator.run("migrator", &cancel, today()).expect("run");

    assert_eq!(report.migrated, 3);
    assert!(report.skipped.is_empty());
    assert_eq!(report.batches, 2);
    assert!(!report.cancelled);
    assert_eq!(
        report.watermark,
        Some((client("c2"), "leg-003".to_string()))
    );

    for number in ["LEG-001", "LEG-002", "LEG-003"] {
        assert!(store.find_by_number(number).expect("lookup").is_some());
    }

    let batch_entries: Vec<_> = audit
        .entries()
        .into_iter()
        .filter(|entry| entry.action == AuditAction::MigrationBatch)
        .collect();
    assert_eq!(batch_entries.len(), 2);
}

#[test]
fn auto_migration_gate_respects_the_phase_knob() {
    let rows = [legacy_record("c1", "LEG-AUTO")];
    let (migrator, store, _, _) = migrator_for(MigrationPhase::Preparation, &rows);

    let cancel = AtomicBool::new(false);
    let gated = migrator
        .run_if_enabled("scheduler", &cancel, today())
        .expect("gate");
    assert!(gated.is_none());
    assert!(store.find_by_number("LEG-AUTO").expect("lookup").is_none());

    let (migrator, store, _, _) = migrator_for(MigrationPhase::Migration, &rows);
    let report = migrator
        .run_if_enabled("scheduler", &cancel, today())
        .expect("gate")
        .expect("auto migration enabled");
    assert_eq!(report.migrated, 1);
    assert!(store.find_by_number("LEG-AUTO").expect("lookup").is_some());
}

#[test]
fn invalid_rows_are_skipped_and_recorded() {
    let mut bad = legacy_record("c1", "LEG-BAD");
    bad.commission_amount = Decimal::from(5000);
    let rows = [bad, legacy_record("c2", "LEG-GOOD")];
    let (migrator, store, _, _) = migrator_for(MigrationPhase::Migration, &rows);

    let cancel = AtomicBool::new(false);
    let report = migrator.run("migrator", &cancel, today()).expect("run");

    assert_eq!(report.migrated, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].policy_number, "LEG-BAD");
    assert!(report.skipped[0].errors.contains_key("commission_amount"));
    assert!(store.find_by_number("LEG-GOOD").expect("lookup").is_some());
    assert!(store.find_by_number("LEG-BAD").expect("lookup").is_none());
}

#[test]
fn runs_resume_past_the_watermark() {
    let rows = [legacy_record("c1", "LEG-001")];
    let (migrator, store, legacy, _) = migrator_for(MigrationPhase::Migration, &rows);

    let cancel = AtomicBool::new(false);
    let first = migrator.run("migrator", &cancel, today()).expect("first run");
    assert_eq!(first.migrated, 1);

    legacy
        .upsert(legacy_record("c2", "LEG-002"))
        .expect("new row");
    let second = migrator.run("migrator", &cancel, today()).expect("second run");
    assert_eq!(second.migrated, 1);
    assert!(store.find_by_number("LEG-002").expect("lookup").is_some());

    // Nothing new: the run is a no-op.
    let third = migrator.run("migrator", &cancel, today()).expect("third run");
    assert_eq!(third.migrated, 0);
    assert_eq!(third.batches, 0);
}

#[test]
fn cancellation_is_checked_before_each_batch() {
    let rows = [
        legacy_record("c1", "LEG-001"),
        legacy_record("c2", "LEG-002"),
    ];
    let (migrator, store, _, _) = migrator_for(MigrationPhase::Migration, &rows);

    let cancel = AtomicBool::new(true);
    let report = migrator.run("migrator", &cancel, today()).expect("run");
    assert!(report.cancelled);
    assert_eq!(report.migrated, 0);
    assert!(store.find_by_number("LEG-001").expect("lookup").is_none());

    cancel.store(false, Ordering::Release);
    let resumed = migrator.run("migrator", &cancel, today()).expect("resume");
    assert_eq!(resumed.migrated, 2);
}

#[test]
fn rollback_snapshots_allow_reverting_a_conversion() {
    let rows = [legacy_record("c1", "LEG-BACK")];
    let (migrator, store, legacy, _) = migrator_for(MigrationPhase::Migration, &rows);

    let cancel = AtomicBool::new(false);
    migrator.run("migrator", &cancel, today()).expect("run");

    let snapshots = migrator.retained_snapshots(today());
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].record.policy_number, "LEG-BACK");

    let template = store
        .find_by_number("LEG-BACK")
        .expect("lookup")
        .expect("converted");
    assert_eq!(store.list_for_template(&template.id).expect("list").len(), 1);

    migrator
        .revert(&client("c1"), "LEG-BACK", today())
        .expect("revert succeeds");

    assert!(store.list_for_template(&template.id).expect("list").is_empty());
    assert!(legacy
        .fetch(&client("c1"), "LEG-BACK")
        .expect("fetch")
        .is_some());
}

#[test]
fn snapshots_expire_after_the_retention_window() {
    let rows = [legacy_record("c1", "LEG-TTL")];
    let (migrator, _, _, _) = migrator_for(MigrationPhase::Migration, &rows);

    let cancel = AtomicBool::new(false);
    migrator.run("migrator", &cancel, today()).expect("run");

    let retention = migrator.config().batch.backup_retention_days;
    let past_window = today()
        .checked_add_days(chrono::Days::new(u64::from(retention) + 1))
        .expect("date");
    assert!(migrator.retained_snapshots(past_window).is_empty());

    match migrator.revert(&client("c1"), "LEG-TTL", past_window) {
        Err(MigrationError::SnapshotMissing { .. }) => {}
        other => panic!("expected missing snapshot, got {other:?}"),
    }
}

#[test]
fn store_failure_without_rollback_halts_at_the_watermark() {
    let store = Arc::new(UnavailableStore);
    let legacy = seeded_legacy(&[legacy_record("c1", "LEG-HALT")]);
    let audit = Arc::new(MemoryAuditLog::new());
    let mut config = PhaseConfig::for_phase(MigrationPhase::Complete);
    config.batch.enable_rollback = false;
    let migrator = BatchMigrator::new(store, legacy, audit, config);

    let cancel = AtomicBool::new(false);
    match migrator.run("migrator", &cancel, today()) {
        Err(MigrationError::Halted { batch: 0, .. }) => {}
        other => panic!("expected halt, got {other:?}"),
    }
}

#[test]
fn status_and_terms_survive_conversion() {
    let mut row = legacy_record("c1", "LEG-TERMS");
    row.status = PolicyStatus::Cancelled;
    row.premium_amount = Decimal::from(1250);
    row.commission_amount = Decimal::from(125);
    let (migrator, store, _, _) = migrator_for(MigrationPhase::Migration, &[row.clone()]);

    let cancel = AtomicBool::new(false);
    migrator.run("migrator", &cancel, today()).expect("run");

    let template = store
        .find_by_number("LEG-TERMS")
        .expect("lookup")
        .expect("template");
    let instances = store.list_for_template(&template.id).expect("list");
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].status, PolicyStatus::Cancelled);
    assert_eq!(instances[0].premium_amount, Decimal::from(1250));
    assert_eq!(instances[0].start_date, row.start_date);
    assert_eq!(template.provider, "Prairie Mutual");
}
