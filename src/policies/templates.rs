use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::audit::{AuditAction, AuditEntityType, AuditEntry, AuditError, AuditRecorder};
use super::domain::{DisplayStatus, PolicyTemplate, PolicyType, TemplateDraft, TemplateId};
use super::expiry::display_status;
use super::repository::{InstanceStore, RepositoryError, TemplateStore};
use super::validation::{ValidationEngine, ValidationReport};

/// Error raised by the template and instance services.
#[derive(Debug, thiserror::Error)]
pub enum PolicyServiceError {
    #[error("validation failed")]
    Validation(ValidationReport),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl PolicyServiceError {
    pub fn validation(report: ValidationReport) -> Self {
        Self::Validation(report)
    }
}

/// Sort key for template listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSort {
    #[default]
    PolicyNumber,
    Provider,
    Created,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filter, sort, and pagination options for the template listing. The same
/// substring match backs the search box and the uniqueness pre-check.
#[derive(Debug, Clone)]
pub struct TemplateQuery {
    pub search: Option<String>,
    pub policy_types: Vec<PolicyType>,
    pub providers: Vec<String>,
    pub has_instances: Option<bool>,
    pub sort: TemplateSort,
    pub order: SortOrder,
    pub page: usize,
    pub per_page: usize,
    pub include_stats: bool,
}

impl Default for TemplateQuery {
    fn default() -> Self {
        Self {
            search: None,
            policy_types: Vec::new(),
            providers: Vec::new(),
            has_instances: None,
            sort: TemplateSort::default(),
            order: SortOrder::default(),
            page: 1,
            per_page: 25,
            include_stats: false,
        }
    }
}

/// Per-template aggregates over dependent instances, display-status based.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateStats {
    pub instance_count: usize,
    pub active_count: usize,
    pub premium_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateView {
    #[serde(flatten)]
    pub template: PolicyTemplate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TemplateStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplatePage {
    pub items: Vec<TemplateView>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

/// Result of a cascade delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeOutcome {
    pub template_id: TemplateId,
    pub removed_instances: usize,
}

/// Service owning template lifecycle and policy-number uniqueness.
pub struct PolicyTemplateService<S, A> {
    store: Arc<S>,
    audit: Arc<A>,
    engine: ValidationEngine,
}

impl<S, A> PolicyTemplateService<S, A>
where
    S: TemplateStore + InstanceStore + 'static,
    A: AuditRecorder + 'static,
{
    pub fn new(store: Arc<S>, audit: Arc<A>, engine: ValidationEngine) -> Self {
        Self {
            store,
            audit,
            engine,
        }
    }

    pub fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    /// Register a new policy number. The pre-check is an optimization; the
    /// store's unique constraint is the guard that decides races.
    pub fn create(
        &self,
        actor: &str,
        draft: &TemplateDraft,
        today: NaiveDate,
    ) -> Result<PolicyTemplate, PolicyServiceError> {
        let report = self.engine.validate_template(draft);
        if !report.is_valid() {
            return Err(PolicyServiceError::validation(report));
        }

        if !self.engine.config().allow_duplicates
            && self
                .store
                .find_by_number(&draft.policy_number)?
                .is_some()
        {
            return Err(RepositoryError::Conflict.into());
        }

        let template = PolicyTemplate {
            id: TemplateId::generate(),
            policy_number: draft.policy_number.trim().to_string(),
            policy_type: draft.policy_type,
            provider: draft.provider.trim().to_string(),
            description: normalize_description(draft.description.as_deref()),
            created_on: today,
        };

        let stored = TemplateStore::insert(self.store.as_ref(), template)?;
        self.record(
            actor,
            AuditAction::Created,
            &stored.id,
            format!(
                "template {} ({}) created for provider {}",
                stored.policy_number,
                stored.policy_type.label(),
                stored.provider
            ),
        )?;
        info!(policy_number = %stored.policy_number, "policy template created");
        Ok(stored)
    }

    /// Replace a template's metadata. A changed policy number is re-checked
    /// for uniqueness excluding the record's own prior value.
    pub fn update(
        &self,
        actor: &str,
        id: TemplateId,
        draft: &TemplateDraft,
    ) -> Result<PolicyTemplate, PolicyServiceError> {
        let report = self.engine.validate_template(draft);
        if !report.is_valid() {
            return Err(PolicyServiceError::validation(report));
        }

        let existing = TemplateStore::fetch(self.store.as_ref(), &id)?
            .ok_or(RepositoryError::NotFound)?;

        if !self.engine.config().allow_duplicates {
            if let Some(other) = self.store.find_by_number(&draft.policy_number)? {
                if other.id != id {
                    return Err(RepositoryError::Conflict.into());
                }
            }
        }

        let updated = PolicyTemplate {
            id,
            policy_number: draft.policy_number.trim().to_string(),
            policy_type: draft.policy_type,
            provider: draft.provider.trim().to_string(),
            description: normalize_description(draft.description.as_deref()),
            created_on: existing.created_on,
        };

        TemplateStore::update(self.store.as_ref(), updated.clone())?;
        self.record(
            actor,
            AuditAction::Updated,
            &id,
            format!("template {} updated", updated.policy_number),
        )?;
        Ok(updated)
    }

    /// Hard delete with cascade. The store removes the template and every
    /// dependent instance in one atomic unit.
    pub fn delete(&self, actor: &str, id: TemplateId) -> Result<CascadeOutcome, PolicyServiceError> {
        let template = TemplateStore::fetch(self.store.as_ref(), &id)?
            .ok_or(RepositoryError::NotFound)?;
        let removed = self.store.delete_cascade(&id)?;

        self.record(
            actor,
            AuditAction::Deleted,
            &id,
            format!(
                "template {} deleted, cascading {} instance(s)",
                template.policy_number,
                removed.len()
            ),
        )?;
        info!(
            policy_number = %template.policy_number,
            cascaded = removed.len(),
            "policy template deleted"
        );
        Ok(CascadeOutcome {
            template_id: id,
            removed_instances: removed.len(),
        })
    }

    pub fn get(&self, id: TemplateId) -> Result<PolicyTemplate, PolicyServiceError> {
        TemplateStore::fetch(self.store.as_ref(), &id)?
            .ok_or(RepositoryError::NotFound)
            .map_err(Into::into)
    }

    /// Case-insensitive substring match over policy number and provider.
    /// Backs both the UI search box and the uniqueness pre-check.
    pub fn search(&self, query: &str) -> Result<Vec<PolicyTemplate>, PolicyServiceError> {
        let needle = query.trim().to_lowercase();
        let templates = TemplateStore::list(self.store.as_ref())?;
        Ok(templates
            .into_iter()
            .filter(|template| {
                needle.is_empty()
                    || template.policy_number.to_lowercase().contains(&needle)
                    || template.provider.to_lowercase().contains(&needle)
            })
            .collect())
    }

    pub fn list(
        &self,
        query: &TemplateQuery,
        today: NaiveDate,
    ) -> Result<TemplatePage, PolicyServiceError> {
        let mut templates = match &query.search {
            Some(needle) => self.search(needle)?,
            None => TemplateStore::list(self.store.as_ref())?,
        };

        if !query.policy_types.is_empty() {
            templates.retain(|template| query.policy_types.contains(&template.policy_type));
        }
        if !query.providers.is_empty() {
            let providers: Vec<String> = query
                .providers
                .iter()
                .map(|provider| provider.to_lowercase())
                .collect();
            templates.retain(|template| providers.contains(&template.provider.to_lowercase()));
        }
        if let Some(wants_instances) = query.has_instances {
            let mut filtered = Vec::with_capacity(templates.len());
            for template in templates {
                let occupied = !self.store.list_for_template(&template.id)?.is_empty();
                if occupied == wants_instances {
                    filtered.push(template);
                }
            }
            templates = filtered;
        }

        match query.sort {
            TemplateSort::PolicyNumber => {
                templates.sort_by(|a, b| a.policy_number.cmp(&b.policy_number))
            }
            TemplateSort::Provider => templates.sort_by(|a, b| a.provider.cmp(&b.provider)),
            TemplateSort::Created => templates.sort_by(|a, b| a.created_on.cmp(&b.created_on)),
        }
        if query.order == SortOrder::Desc {
            templates.reverse();
        }

        let total = templates.len();
        let per_page = query.per_page.max(1);
        let page = query.page.max(1);
        let offset = (page - 1).saturating_mul(per_page);

        let mut items = Vec::new();
        for template in templates.into_iter().skip(offset).take(per_page) {
            let stats = if query.include_stats {
                Some(self.stats_for(&template.id, today)?)
            } else {
                None
            };
            items.push(TemplateView { template, stats });
        }

        Ok(TemplatePage {
            items,
            page,
            per_page,
            total,
        })
    }

    fn stats_for(
        &self,
        id: &TemplateId,
        today: NaiveDate,
    ) -> Result<TemplateStats, PolicyServiceError> {
        let instances = self.store.list_for_template(id)?;
        let mut stats = TemplateStats::default();
        for instance in &instances {
            stats.instance_count += 1;
            stats.premium_total += instance.premium_amount;
            let shown = display_status(instance.status, instance.expiry_date, today);
            if matches!(shown, DisplayStatus::Active | DisplayStatus::ExpiringSoon) {
                stats.active_count += 1;
            }
        }
        Ok(stats)
    }

    fn record(
        &self,
        actor: &str,
        action: AuditAction,
        id: &TemplateId,
        description: String,
    ) -> Result<(), AuditError> {
        self.audit.record(AuditEntry {
            actor_id: actor.to_string(),
            action,
            entity_type: AuditEntityType::Template,
            entity_id: id.0.to_string(),
            client_id: None,
            description,
            recorded_at: Utc::now(),
        })
    }
}

fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}
