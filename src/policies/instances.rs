use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use super::audit::{AuditAction, AuditEntityType, AuditEntry, AuditError, AuditRecorder};
use super::domain::{
    ClientId, ClientPolicyStats, DisplayStatus, InstanceDraft, InstanceId, InstancePatch,
    PolicyInstance, PolicyStatus, TemplateId,
};
use super::expiry::{
    days_until_expiry, display_status, expiry_warning_text, ExpirySummary, ExpiryWarning,
    SweepOutcome,
};
use super::repository::{ClientDirectory, InstanceStore, RepositoryError, TemplateStore};
use super::templates::PolicyServiceError;
use super::validation::{resolve_expiry, ValidationEngine};

/// Read model returned for a single instance: stored fields annotated with
/// the recomputed display status and countdown text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceView {
    #[serde(flatten)]
    pub instance: PolicyInstance,
    pub policy_number: String,
    pub display_status: DisplayStatus,
    pub days_remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_warning: Option<String>,
}

/// Service owning the client/template association and policy terms.
pub struct PolicyInstanceService<S, C, A> {
    store: Arc<S>,
    clients: Arc<C>,
    audit: Arc<A>,
    engine: ValidationEngine,
}

impl<S, C, A> PolicyInstanceService<S, C, A>
where
    S: TemplateStore + InstanceStore + 'static,
    C: ClientDirectory + 'static,
    A: AuditRecorder + 'static,
{
    pub fn new(store: Arc<S>, clients: Arc<C>, audit: Arc<A>, engine: ValidationEngine) -> Self {
        Self {
            store,
            clients,
            audit,
            engine,
        }
    }

    pub fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    /// Attach a template to a client. The referenced template and client
    /// must exist; status defaults to active unless the draft overrides it.
    pub fn create(
        &self,
        actor: &str,
        client_id: ClientId,
        template_id: TemplateId,
        draft: &InstanceDraft,
        today: NaiveDate,
    ) -> Result<InstanceView, PolicyServiceError> {
        let validation = self.engine.validate_association(&client_id, draft, today);
        if !validation.is_valid() {
            return Err(PolicyServiceError::validation(validation.report));
        }
        let expiry_date = validation
            .expiry_date
            .ok_or_else(|| RepositoryError::Unavailable("expiry resolution failed".to_string()))?;

        let template = TemplateStore::fetch(self.store.as_ref(), &template_id)?
            .ok_or(RepositoryError::NotFound)?;
        if !self.clients.exists(&client_id) {
            return Err(RepositoryError::NotFound.into());
        }

        let instance = PolicyInstance {
            id: InstanceId::generate(),
            template_id,
            client_id: client_id.clone(),
            premium_amount: draft.premium_amount,
            commission_amount: draft.commission_amount,
            start_date: draft.start_date,
            expiry_date,
            status: draft.status.unwrap_or(PolicyStatus::Active),
        };

        let stored = InstanceStore::insert(self.store.as_ref(), instance)?;
        self.record(
            actor,
            AuditAction::Created,
            &stored,
            format!(
                "policy {} attached to client {}",
                template.policy_number, client_id.0
            ),
        )?;
        info!(policy_number = %template.policy_number, client = %client_id.0, "policy instance created");
        self.view(stored, today)
    }

    pub fn get(&self, id: InstanceId, today: NaiveDate) -> Result<InstanceView, PolicyServiceError> {
        let instance = InstanceStore::fetch(self.store.as_ref(), &id)?
            .ok_or(RepositoryError::NotFound)?;
        self.view(instance, today)
    }

    /// Partial term update. Supplied fields are merged onto the stored
    /// record and the merged result is re-validated, so changing only the
    /// premium still re-checks the commission invariant against the stored
    /// commission.
    pub fn update(
        &self,
        actor: &str,
        id: InstanceId,
        patch: &InstancePatch,
        today: NaiveDate,
    ) -> Result<InstanceView, PolicyServiceError> {
        let existing = InstanceStore::fetch(self.store.as_ref(), &id)?
            .ok_or(RepositoryError::NotFound)?;

        let start_date = patch.start_date.unwrap_or(existing.start_date);
        let expiry_date = match (patch.expiry_date, patch.duration_months) {
            (None, None) => Some(existing.expiry_date),
            (explicit, duration) => resolve_expiry(start_date, explicit, duration),
        };

        let merged = InstanceDraft {
            premium_amount: patch.premium_amount.unwrap_or(existing.premium_amount),
            commission_amount: patch.commission_amount.unwrap_or(existing.commission_amount),
            start_date,
            expiry_date,
            duration_months: None,
            status: Some(existing.status),
        };

        let validation = self.engine.validate_instance(&merged, today);
        if !validation.is_valid() {
            return Err(PolicyServiceError::validation(validation.report));
        }
        let expiry_date = validation
            .expiry_date
            .ok_or_else(|| RepositoryError::Unavailable("expiry resolution failed".to_string()))?;

        let updated = PolicyInstance {
            id,
            template_id: existing.template_id,
            client_id: existing.client_id.clone(),
            premium_amount: merged.premium_amount,
            commission_amount: merged.commission_amount,
            start_date,
            expiry_date,
            status: existing.status,
        };

        InstanceStore::update(self.store.as_ref(), updated.clone())?;
        self.record(
            actor,
            AuditAction::Updated,
            &updated,
            format!("policy terms updated for client {}", updated.client_id.0),
        )?;
        self.view(updated, today)
    }

    /// Direct status transition. Date rules are not re-run: cancelling or
    /// administratively expiring a policy is valid regardless of its term.
    pub fn update_status(
        &self,
        actor: &str,
        id: InstanceId,
        new_status: PolicyStatus,
        today: NaiveDate,
    ) -> Result<InstanceView, PolicyServiceError> {
        let mut instance = InstanceStore::fetch(self.store.as_ref(), &id)?
            .ok_or(RepositoryError::NotFound)?;
        let previous = instance.status;
        instance.status = new_status;
        InstanceStore::update(self.store.as_ref(), instance.clone())?;

        self.record(
            actor,
            AuditAction::StatusChanged,
            &instance,
            format!(
                "status changed {} -> {}",
                previous.label(),
                new_status.label()
            ),
        )?;
        self.view(instance, today)
    }

    /// Remove one instance. The template and sibling instances are
    /// untouched.
    pub fn delete(&self, actor: &str, id: InstanceId) -> Result<(), PolicyServiceError> {
        let instance = InstanceStore::fetch(self.store.as_ref(), &id)?
            .ok_or(RepositoryError::NotFound)?;
        InstanceStore::delete(self.store.as_ref(), &id)?;
        self.record(
            actor,
            AuditAction::Deleted,
            &instance,
            format!("policy instance removed for client {}", instance.client_id.0),
        )?;
        Ok(())
    }

    pub fn list_for_client(
        &self,
        client: &ClientId,
        today: NaiveDate,
    ) -> Result<Vec<InstanceView>, PolicyServiceError> {
        let instances = self.store.list_for_client(client)?;
        instances
            .into_iter()
            .map(|instance| self.view(instance, today))
            .collect()
    }

    /// Per-client aggregates over display status: an instance whose dates
    /// lapsed but whose stored flag has not been swept yet does not count
    /// as active.
    pub fn stats_for_client(
        &self,
        client: &ClientId,
        today: NaiveDate,
    ) -> Result<ClientPolicyStats, PolicyServiceError> {
        let instances = self.store.list_for_client(client)?;
        let mut stats = ClientPolicyStats::default();
        for instance in &instances {
            stats.total += 1;
            stats.premium_total += instance.premium_amount;
            stats.commission_total += instance.commission_amount;
            let shown = display_status(instance.status, instance.expiry_date, today);
            if matches!(shown, DisplayStatus::Active | DisplayStatus::ExpiringSoon) {
                stats.active += 1;
            }
        }
        Ok(stats)
    }

    /// Instances currently shown as expiring soon or expired, with the
    /// countdown text callers render inline.
    pub fn expiry_warnings(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<ExpiryWarning>, PolicyServiceError> {
        let instances = InstanceStore::list(self.store.as_ref())?;
        let mut warnings = Vec::new();
        for instance in instances {
            let shown = display_status(instance.status, instance.expiry_date, today);
            let message = match expiry_warning_text(instance.status, instance.expiry_date, today) {
                Some(message) => message,
                None => continue,
            };
            let template = TemplateStore::fetch(self.store.as_ref(), &instance.template_id)?
                .ok_or(RepositoryError::NotFound)?;
            warnings.push(ExpiryWarning {
                instance_id: instance.id,
                template_id: instance.template_id,
                client_id: instance.client_id,
                policy_number: template.policy_number,
                expiry_date: instance.expiry_date,
                days_remaining: days_until_expiry(instance.expiry_date, today),
                display_status: shown,
                message,
            });
        }
        warnings.sort_by_key(|warning| (warning.expiry_date, warning.instance_id));
        Ok(warnings)
    }

    pub fn expiry_summary(&self, today: NaiveDate) -> Result<ExpirySummary, PolicyServiceError> {
        let instances = InstanceStore::list(self.store.as_ref())?;
        Ok(ExpirySummary::for_instances(&instances, today))
    }

    /// Persist `Expired` onto lapsed instances whose stored flag still says
    /// active. The underlying write is conditional, so re-running (or
    /// running from several schedulers) changes nothing the second time.
    pub fn sweep(&self, actor: &str, today: NaiveDate) -> Result<SweepOutcome, PolicyServiceError> {
        let updated = self.store.mark_expired(today)?;
        if updated > 0 {
            self.audit.record(AuditEntry {
                actor_id: actor.to_string(),
                action: AuditAction::StatusChanged,
                entity_type: AuditEntityType::Instance,
                entity_id: "expiry-sweep".to_string(),
                client_id: None,
                description: format!("expiry sweep marked {updated} instance(s) expired"),
                recorded_at: Utc::now(),
            })?;
        }
        info!(updated, "expiry sweep finished");
        Ok(SweepOutcome { updated })
    }

    fn view(
        &self,
        instance: PolicyInstance,
        today: NaiveDate,
    ) -> Result<InstanceView, PolicyServiceError> {
        let template = TemplateStore::fetch(self.store.as_ref(), &instance.template_id)?
            .ok_or(RepositoryError::NotFound)?;
        let shown = display_status(instance.status, instance.expiry_date, today);
        let warning = expiry_warning_text(instance.status, instance.expiry_date, today);
        let days_remaining = days_until_expiry(instance.expiry_date, today);
        Ok(InstanceView {
            instance,
            policy_number: template.policy_number,
            display_status: shown,
            days_remaining,
            expiry_warning: warning,
        })
    }

    fn record(
        &self,
        actor: &str,
        action: AuditAction,
        instance: &PolicyInstance,
        description: String,
    ) -> Result<(), AuditError> {
        self.audit.record(AuditEntry {
            actor_id: actor.to_string(),
            action,
            entity_type: AuditEntityType::Instance,
            entity_id: instance.id.0.to_string(),
            client_id: Some(instance.client_id.clone()),
            description,
            recorded_at: Utc::now(),
        })
    }
}
