use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use super::domain::{
    ClientId, InstanceId, LegacyPolicy, PolicyInstance, PolicyStatus, PolicyTemplate, TemplateId,
};

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Storage contract for templates. Policy-number uniqueness is a constraint
/// of the store itself, not of callers: concurrent inserts of the same
/// number must leave exactly one winner.
pub trait TemplateStore: Send + Sync {
    fn insert(&self, template: PolicyTemplate) -> Result<PolicyTemplate, RepositoryError>;
    fn update(&self, template: PolicyTemplate) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &TemplateId) -> Result<Option<PolicyTemplate>, RepositoryError>;
    /// Case-insensitive exact lookup by policy number.
    fn find_by_number(&self, policy_number: &str)
        -> Result<Option<PolicyTemplate>, RepositoryError>;
    fn list(&self) -> Result<Vec<PolicyTemplate>, RepositoryError>;
    /// Delete the template and every dependent instance as one atomic unit,
    /// returning the ids of the removed instances.
    fn delete_cascade(&self, id: &TemplateId) -> Result<Vec<InstanceId>, RepositoryError>;
}

/// Storage contract for instances.
pub trait InstanceStore: Send + Sync {
    fn insert(&self, instance: PolicyInstance) -> Result<PolicyInstance, RepositoryError>;
    fn update(&self, instance: PolicyInstance) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &InstanceId) -> Result<Option<PolicyInstance>, RepositoryError>;
    fn delete(&self, id: &InstanceId) -> Result<(), RepositoryError>;
    fn list(&self) -> Result<Vec<PolicyInstance>, RepositoryError>;
    fn list_for_client(&self, client: &ClientId) -> Result<Vec<PolicyInstance>, RepositoryError>;
    fn list_for_template(
        &self,
        template: &TemplateId,
    ) -> Result<Vec<PolicyInstance>, RepositoryError>;
    /// Conditional write backing the sweep: set expired where the stored
    /// status is still active and the date has lapsed. Idempotent.
    fn mark_expired(&self, today: NaiveDate) -> Result<usize, RepositoryError>;
}

/// Storage contract for the legacy single-table shape, keyed by client and
/// policy number with no sharing across clients.
pub trait LegacyStore: Send + Sync {
    fn upsert(&self, record: LegacyPolicy) -> Result<(), RepositoryError>;
    fn fetch(
        &self,
        client: &ClientId,
        policy_number: &str,
    ) -> Result<Option<LegacyPolicy>, RepositoryError>;
    /// All rows ordered by (client, policy number) so batch migration has a
    /// stable high-water mark.
    fn list(&self) -> Result<Vec<LegacyPolicy>, RepositoryError>;
    fn delete(&self, client: &ClientId, policy_number: &str) -> Result<(), RepositoryError>;
}

/// Seam to the CRM's client module. Only existence is ever asked of it.
pub trait ClientDirectory: Send + Sync {
    fn exists(&self, client: &ClientId) -> bool;
}

/// Directory that accepts any non-blank identifier. Used by the server
/// binary where client records live in an external system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenClientDirectory;

impl ClientDirectory for OpenClientDirectory {
    fn exists(&self, client: &ClientId) -> bool {
        !client.0.trim().is_empty()
    }
}

/// Directory backed by an explicit allow-list, for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryClientDirectory {
    known: Mutex<BTreeSet<String>>,
}

impl MemoryClientDirectory {
    pub fn with_clients<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let known = ids.into_iter().map(Into::into).collect();
        Self {
            known: Mutex::new(known),
        }
    }

    pub fn register(&self, id: impl Into<String>) {
        if let Ok(mut known) = self.known.lock() {
            known.insert(id.into());
        }
    }
}

impl ClientDirectory for MemoryClientDirectory {
    fn exists(&self, client: &ClientId) -> bool {
        self.known
            .lock()
            .map(|known| known.contains(&client.0))
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct PolicyTables {
    templates: HashMap<TemplateId, PolicyTemplate>,
    // Lowercased policy number -> owning template. This index is the unique
    // constraint; insert/update go through it under the same lock.
    number_index: HashMap<String, TemplateId>,
    instances: HashMap<InstanceId, PolicyInstance>,
}

/// In-memory store holding both tables behind one lock so cascade deletes
/// and the uniqueness constraint behave like a single-database transaction.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    tables: Mutex<PolicyTables>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, PolicyTables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("policy store mutex poisoned".to_string()))
    }
}

fn number_key(policy_number: &str) -> String {
    policy_number.trim().to_lowercase()
}

impl TemplateStore for MemoryPolicyStore {
    fn insert(&self, template: PolicyTemplate) -> Result<PolicyTemplate, RepositoryError> {
        let mut tables = self.lock()?;
        let key = number_key(&template.policy_number);
        if tables.number_index.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        tables.number_index.insert(key, template.id);
        tables.templates.insert(template.id, template.clone());
        Ok(template)
    }

    fn update(&self, template: PolicyTemplate) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        let previous = tables
            .templates
            .get(&template.id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;

        let old_key = number_key(&previous.policy_number);
        let new_key = number_key(&template.policy_number);
        if old_key != new_key {
            if tables.number_index.contains_key(&new_key) {
                return Err(RepositoryError::Conflict);
            }
            tables.number_index.remove(&old_key);
            tables.number_index.insert(new_key, template.id);
        }

        tables.templates.insert(template.id, template);
        Ok(())
    }

    fn fetch(&self, id: &TemplateId) -> Result<Option<PolicyTemplate>, RepositoryError> {
        let tables = self.lock()?;
        Ok(tables.templates.get(id).cloned())
    }

    fn find_by_number(
        &self,
        policy_number: &str,
    ) -> Result<Option<PolicyTemplate>, RepositoryError> {
        let tables = self.lock()?;
        let id = tables.number_index.get(&number_key(policy_number));
        Ok(id.and_then(|id| tables.templates.get(id)).cloned())
    }

    fn list(&self) -> Result<Vec<PolicyTemplate>, RepositoryError> {
        let tables = self.lock()?;
        let mut templates: Vec<_> = tables.templates.values().cloned().collect();
        templates.sort_by(|a, b| a.policy_number.cmp(&b.policy_number));
        Ok(templates)
    }

    fn delete_cascade(&self, id: &TemplateId) -> Result<Vec<InstanceId>, RepositoryError> {
        let mut tables = self.lock()?;
        let template = tables.templates.remove(id).ok_or(RepositoryError::NotFound)?;
        tables.number_index.remove(&number_key(&template.policy_number));

        let dependent: Vec<InstanceId> = tables
            .instances
            .values()
            .filter(|instance| instance.template_id == *id)
            .map(|instance| instance.id)
            .collect();
        for instance_id in &dependent {
            tables.instances.remove(instance_id);
        }
        Ok(dependent)
    }
}

impl InstanceStore for MemoryPolicyStore {
    fn insert(&self, instance: PolicyInstance) -> Result<PolicyInstance, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.instances.contains_key(&instance.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    fn update(&self, instance: PolicyInstance) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        if !tables.instances.contains_key(&instance.id) {
            return Err(RepositoryError::NotFound);
        }
        tables.instances.insert(instance.id, instance);
        Ok(())
    }

    fn fetch(&self, id: &InstanceId) -> Result<Option<PolicyInstance>, RepositoryError> {
        let tables = self.lock()?;
        Ok(tables.instances.get(id).cloned())
    }

    fn delete(&self, id: &InstanceId) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        tables
            .instances
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn list(&self) -> Result<Vec<PolicyInstance>, RepositoryError> {
        let tables = self.lock()?;
        let mut instances: Vec<_> = tables.instances.values().cloned().collect();
        instances.sort_by_key(|instance| instance.id);
        Ok(instances)
    }

    fn list_for_client(&self, client: &ClientId) -> Result<Vec<PolicyInstance>, RepositoryError> {
        let tables = self.lock()?;
        let mut instances: Vec<_> = tables
            .instances
            .values()
            .filter(|instance| instance.client_id == *client)
            .cloned()
            .collect();
        instances.sort_by_key(|instance| instance.id);
        Ok(instances)
    }

    fn list_for_template(
        &self,
        template: &TemplateId,
    ) -> Result<Vec<PolicyInstance>, RepositoryError> {
        let tables = self.lock()?;
        let mut instances: Vec<_> = tables
            .instances
            .values()
            .filter(|instance| instance.template_id == *template)
            .cloned()
            .collect();
        instances.sort_by_key(|instance| instance.id);
        Ok(instances)
    }

    fn mark_expired(&self, today: NaiveDate) -> Result<usize, RepositoryError> {
        let mut tables = self.lock()?;
        let mut updated = 0;
        for instance in tables.instances.values_mut() {
            if instance.status == PolicyStatus::Active && instance.expiry_date <= today {
                instance.status = PolicyStatus::Expired;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

/// In-memory legacy table keyed by (client, lowercased policy number).
#[derive(Debug, Default)]
pub struct MemoryLegacyStore {
    rows: Mutex<BTreeMap<(ClientId, String), LegacyPolicy>>,
}

impl MemoryLegacyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<(ClientId, String), LegacyPolicy>>, RepositoryError> {
        self.rows
            .lock()
            .map_err(|_| RepositoryError::Unavailable("legacy store mutex poisoned".to_string()))
    }
}

impl LegacyStore for MemoryLegacyStore {
    fn upsert(&self, record: LegacyPolicy) -> Result<(), RepositoryError> {
        let mut rows = self.lock()?;
        rows.insert(record.watermark(), record);
        Ok(())
    }

    fn fetch(
        &self,
        client: &ClientId,
        policy_number: &str,
    ) -> Result<Option<LegacyPolicy>, RepositoryError> {
        let rows = self.lock()?;
        Ok(rows
            .get(&(client.clone(), number_key(policy_number)))
            .cloned())
    }

    fn list(&self) -> Result<Vec<LegacyPolicy>, RepositoryError> {
        let rows = self.lock()?;
        Ok(rows.values().cloned().collect())
    }

    fn delete(&self, client: &ClientId, policy_number: &str) -> Result<(), RepositoryError> {
        let mut rows = self.lock()?;
        rows.remove(&(client.clone(), number_key(policy_number)))
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}
