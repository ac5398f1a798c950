use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::policies::audit::MemoryAuditLog;
use crate::policies::domain::{
    ClientId, InstanceDraft, LegacyPolicy, PolicyStatus, PolicyType, TemplateDraft, TemplateId,
};
use crate::policies::instances::PolicyInstanceService;
use crate::policies::repository::{
    InstanceStore, MemoryClientDirectory, MemoryLegacyStore, MemoryPolicyStore, RepositoryError,
    TemplateStore,
};
use crate::policies::templates::PolicyTemplateService;
use crate::policies::validation::{ValidationConfig, ValidationEngine};

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn today() -> NaiveDate {
    date(2024, 1, 15)
}

pub(super) fn template_draft() -> TemplateDraft {
    TemplateDraft {
        policy_number: "POL-2024-001".to_string(),
        policy_type: PolicyType::Life,
        provider: "Acme Life".to_string(),
        description: Some("Whole life coverage".to_string()),
    }
}

pub(super) fn instance_draft() -> InstanceDraft {
    InstanceDraft {
        premium_amount: Decimal::from(1000),
        commission_amount: Decimal::from(100),
        start_date: date(2024, 1, 1),
        expiry_date: Some(date(2025, 1, 1)),
        duration_months: None,
        status: None,
    }
}

pub(super) fn legacy_record(client: &str, policy_number: &str) -> LegacyPolicy {
    LegacyPolicy {
        client_id: ClientId(client.to_string()),
        policy_number: policy_number.to_string(),
        policy_type: PolicyType::Auto,
        provider: "Prairie Mutual".to_string(),
        description: None,
        premium_amount: Decimal::from(800),
        commission_amount: Decimal::from(40),
        start_date: date(2023, 6, 1),
        expiry_date: date(2024, 6, 1),
        status: PolicyStatus::Active,
    }
}

pub(super) struct Services {
    pub store: Arc<MemoryPolicyStore>,
    pub audit: Arc<MemoryAuditLog>,
    pub templates: PolicyTemplateService<MemoryPolicyStore, MemoryAuditLog>,
    pub instances:
        PolicyInstanceService<MemoryPolicyStore, MemoryClientDirectory, MemoryAuditLog>,
}

pub(super) fn build_services() -> Services {
    build_services_with(ValidationConfig::strict())
}

pub(super) fn build_services_with(config: ValidationConfig) -> Services {
    let store = Arc::new(MemoryPolicyStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let clients = Arc::new(MemoryClientDirectory::with_clients(["c1", "c2", "c3"]));
    let engine = ValidationEngine::new(config);

    let templates = PolicyTemplateService::new(store.clone(), audit.clone(), engine.clone());
    let instances =
        PolicyInstanceService::new(store.clone(), clients.clone(), audit.clone(), engine);

    Services {
        store,
        audit,
        templates,
        instances,
    }
}

pub(super) fn seeded_legacy(records: &[LegacyPolicy]) -> Arc<MemoryLegacyStore> {
    let legacy = Arc::new(MemoryLegacyStore::new());
    for record in records {
        crate::policies::repository::LegacyStore::upsert(legacy.as_ref(), record.clone())
            .expect("seed legacy row");
    }
    legacy
}

/// Store double whose every operation fails, for halt-path tests.
pub(super) struct UnavailableStore;

impl TemplateStore for UnavailableStore {
    fn insert(
        &self,
        _template: crate::policies::domain::PolicyTemplate,
    ) -> Result<crate::policies::domain::PolicyTemplate, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _template: crate::policies::domain::PolicyTemplate,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(
        &self,
        _id: &TemplateId,
    ) -> Result<Option<crate::policies::domain::PolicyTemplate>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_number(
        &self,
        _policy_number: &str,
    ) -> Result<Option<crate::policies::domain::PolicyTemplate>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<crate::policies::domain::PolicyTemplate>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete_cascade(
        &self,
        _id: &TemplateId,
    ) -> Result<Vec<crate::policies::domain::InstanceId>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

impl InstanceStore for UnavailableStore {
    fn insert(
        &self,
        _instance: crate::policies::domain::PolicyInstance,
    ) -> Result<crate::policies::domain::PolicyInstance, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _instance: crate::policies::domain::PolicyInstance,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(
        &self,
        _id: &crate::policies::domain::InstanceId,
    ) -> Result<Option<crate::policies::domain::PolicyInstance>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: &crate::policies::domain::InstanceId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<crate::policies::domain::PolicyInstance>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_for_client(
        &self,
        _client: &ClientId,
    ) -> Result<Vec<crate::policies::domain::PolicyInstance>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_for_template(
        &self,
        _template: &TemplateId,
    ) -> Result<Vec<crate::policies::domain::PolicyInstance>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn mark_expired(&self, _today: NaiveDate) -> Result<usize, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}
