use rust_decimal::Decimal;

use super::common::*;
use crate::policies::audit::AuditAction;
use crate::policies::domain::{
    ClientId, DisplayStatus, InstanceId, InstancePatch, PolicyStatus, TemplateId,
};
use crate::policies::repository::{InstanceStore, RepositoryError, TemplateStore};
use crate::policies::templates::PolicyServiceError;

#[test]
fn create_defaults_to_active_and_annotates_the_view() {
    let services = build_services();
    let template = services
        .templates
        .create("tester", &template_draft(), today())
        .expect("template");

    let view = services
        .instances
        .create(
            "tester",
            ClientId("c1".to_string()),
            template.id,
            &instance_draft(),
            today(),
        )
        .expect("instance");

    assert_eq!(view.instance.status, PolicyStatus::Active);
    assert_eq!(view.display_status, DisplayStatus::Active);
    assert_eq!(view.policy_number, "POL-2024-001");
    assert!(view.expiry_warning.is_none());
}

#[test]
fn create_requires_existing_template_and_client() {
    let services = build_services();

    match services.instances.create(
        "tester",
        ClientId("c1".to_string()),
        TemplateId::generate(),
        &instance_draft(),
        today(),
    ) {
        Err(PolicyServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected missing template, got {other:?}"),
    }

    let template = services
        .templates
        .create("tester", &template_draft(), today())
        .expect("template");
    match services.instances.create(
        "tester",
        ClientId("nobody".to_string()),
        template.id,
        &instance_draft(),
        today(),
    ) {
        Err(PolicyServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected missing client, got {other:?}"),
    }
}

#[test]
fn partial_update_rechecks_against_the_merged_record() {
    let services = build_services();
    let template = services
        .templates
        .create("tester", &template_draft(), today())
        .expect("template");

    let mut draft = instance_draft();
    draft.premium_amount = Decimal::from(1000);
    draft.commission_amount = Decimal::from(600);
    let view = services
        .instances
        .create("tester", ClientId("c1".to_string()), template.id, &draft, today())
        .expect("instance");

    // Lowering only the premium must trip over the stored commission.
    let patch = InstancePatch {
        premium_amount: Some(Decimal::from(500)),
        ..InstancePatch::default()
    };
    match services
        .instances
        .update("tester", view.instance.id, &patch, today())
    {
        Err(PolicyServiceError::Validation(report)) => {
            assert_eq!(
                report.errors.get("commission_amount").map(String::as_str),
                Some("Commission cannot be greater than premium amount")
            );
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    // The stored record is untouched by the failed update.
    let stored = InstanceStore::fetch(services.store.as_ref(), &view.instance.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.premium_amount, Decimal::from(1000));
}

#[test]
fn update_can_rederive_expiry_from_duration() {
    let services = build_services();
    let template = services
        .templates
        .create("tester", &template_draft(), today())
        .expect("template");
    let view = services
        .instances
        .create(
            "tester",
            ClientId("c1".to_string()),
            template.id,
            &instance_draft(),
            today(),
        )
        .expect("instance");

    let patch = InstancePatch {
        duration_months: Some(24),
        ..InstancePatch::default()
    };
    let updated = services
        .instances
        .update("tester", view.instance.id, &patch, today())
        .expect("update succeeds");
    assert_eq!(updated.instance.expiry_date, date(2026, 1, 1));
}

#[test]
fn status_transition_skips_date_validation() {
    let services = build_services();
    let template = services
        .templates
        .create("tester", &template_draft(), today())
        .expect("template");
    let view = services
        .instances
        .create(
            "tester",
            ClientId("c1".to_string()),
            template.id,
            &instance_draft(),
            today(),
        )
        .expect("instance");

    // Even far past the intake window the transition is accepted.
    let later = date(2027, 6, 1);
    let cancelled = services
        .instances
        .update_status("tester", view.instance.id, PolicyStatus::Cancelled, later)
        .expect("cancel succeeds");
    assert_eq!(cancelled.instance.status, PolicyStatus::Cancelled);
    assert_eq!(cancelled.display_status, DisplayStatus::Cancelled);

    let entries = services.audit.entries();
    let status_changes: Vec<_> = entries
        .iter()
        .filter(|entry| entry.action == AuditAction::StatusChanged)
        .collect();
    assert_eq!(status_changes.len(), 1);
    assert!(status_changes[0].description.contains("active -> cancelled"));
}

#[test]
fn delete_leaves_template_and_siblings() {
    let services = build_services();
    let template = services
        .templates
        .create("tester", &template_draft(), today())
        .expect("template");

    let first = services
        .instances
        .create(
            "tester",
            ClientId("c1".to_string()),
            template.id,
            &instance_draft(),
            today(),
        )
        .expect("first");
    let second = services
        .instances
        .create(
            "tester",
            ClientId("c2".to_string()),
            template.id,
            &instance_draft(),
            today(),
        )
        .expect("second");

    services
        .instances
        .delete("tester", first.instance.id)
        .expect("delete succeeds");

    assert!(TemplateStore::fetch(services.store.as_ref(), &template.id)
        .expect("fetch")
        .is_some());
    assert!(InstanceStore::fetch(services.store.as_ref(), &second.instance.id)
        .expect("fetch")
        .is_some());
    match services.instances.delete("tester", first.instance.id) {
        Err(PolicyServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected not found on second delete, got {other:?}"),
    }
}

#[test]
fn client_stats_use_display_status() {
    let services = build_services();
    let template = services
        .templates
        .create("tester", &template_draft(), today())
        .expect("template");
    let client = ClientId("c1".to_string());

    let mut live = instance_draft();
    live.premium_amount = Decimal::from(1000);
    live.commission_amount = Decimal::from(100);
    services
        .instances
        .create("tester", client.clone(), template.id, &live, today())
        .expect("live");

    // Lapsed but not yet swept: stored status still says active.
    let mut lapsed = instance_draft();
    lapsed.start_date = date(2023, 6, 1);
    lapsed.expiry_date = Some(date(2024, 1, 1));
    lapsed.premium_amount = Decimal::from(500);
    lapsed.commission_amount = Decimal::from(50);
    services
        .instances
        .create("tester", client.clone(), template.id, &lapsed, today())
        .expect("lapsed");

    let stats = services
        .instances
        .stats_for_client(&client, today())
        .expect("stats");
    assert_eq!(stats.total, 2);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.premium_total, Decimal::from(1500));
    assert_eq!(stats.commission_total, Decimal::from(150));
}

#[test]
fn sweep_is_idempotent_and_leaves_cancelled_alone() {
    let services = build_services();
    let template = services
        .templates
        .create("tester", &template_draft(), today())
        .expect("template");

    let mut lapsed = instance_draft();
    lapsed.start_date = date(2023, 6, 1);
    lapsed.expiry_date = Some(date(2024, 1, 1));
    let lapsed_view = services
        .instances
        .create("tester", ClientId("c1".to_string()), template.id, &lapsed, today())
        .expect("lapsed");

    let mut cancelled = lapsed.clone();
    cancelled.status = Some(PolicyStatus::Cancelled);
    let cancelled_view = services
        .instances
        .create("tester", ClientId("c2".to_string()), template.id, &cancelled, today())
        .expect("cancelled");

    let first = services.instances.sweep("scheduler", today()).expect("sweep");
    assert_eq!(first.updated, 1);

    let stored = InstanceStore::fetch(services.store.as_ref(), &lapsed_view.instance.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, PolicyStatus::Expired);

    let untouched = InstanceStore::fetch(services.store.as_ref(), &cancelled_view.instance.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(untouched.status, PolicyStatus::Cancelled);

    let second = services.instances.sweep("scheduler", today()).expect("sweep");
    assert_eq!(second.updated, 0);
}

#[test]
fn expiry_warnings_are_sorted_and_labelled() {
    let services = build_services();
    let template = services
        .templates
        .create("tester", &template_draft(), today())
        .expect("template");

    let mut soon = instance_draft();
    soon.expiry_date = Some(date(2024, 1, 25));
    services
        .instances
        .create("tester", ClientId("c1".to_string()), template.id, &soon, today())
        .expect("soon");

    let mut lapsed = instance_draft();
    lapsed.start_date = date(2023, 6, 1);
    lapsed.expiry_date = Some(date(2024, 1, 1));
    services
        .instances
        .create("tester", ClientId("c2".to_string()), template.id, &lapsed, today())
        .expect("lapsed");

    let warnings = services.instances.expiry_warnings(today()).expect("warnings");
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[0].expiry_date, date(2024, 1, 1));
    assert_eq!(warnings[0].message, "This policy has expired");
    assert_eq!(warnings[1].message, "Expires in 10 days");
    assert_eq!(warnings[1].days_remaining, 10);
}

#[test]
fn get_missing_instance_is_not_found() {
    let services = build_services();
    match services.instances.get(InstanceId::generate(), today()) {
        Err(PolicyServiceError::Repository(RepositoryError::NotFound)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}
