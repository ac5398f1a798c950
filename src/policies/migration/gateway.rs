use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use super::phase::PhaseConfig;
use crate::policies::domain::{
    ClientId, InstanceId, LegacyPolicy, PolicyInstance, PolicyTemplate, TemplateId,
};
use crate::policies::repository::{InstanceStore, LegacyStore, RepositoryError, TemplateStore};

/// Tagged view over the two coexisting data shapes. Callers receive
/// whichever shape served the read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PolicyRecord {
    Legacy {
        record: LegacyPolicy,
    },
    Templated {
        template: PolicyTemplate,
        instance: PolicyInstance,
    },
}

/// Read/write contract shared by all phase strategies. Payloads travel in
/// the combined-row shape; each strategy decides which store(s) see them.
pub trait PolicyGateway: Send + Sync {
    fn fetch(
        &self,
        client: &ClientId,
        policy_number: &str,
    ) -> Result<Option<PolicyRecord>, RepositoryError>;

    fn write(
        &self,
        record: &LegacyPolicy,
        today: NaiveDate,
    ) -> Result<PolicyRecord, RepositoryError>;
}

/// Select the strategy for the configured knobs once at startup. The knobs,
/// not the phase name, decide the behavior so overrides compose.
pub fn select_gateway<S, L>(
    config: &PhaseConfig,
    store: Arc<S>,
    legacy: Arc<L>,
) -> Box<dyn PolicyGateway>
where
    S: TemplateStore + InstanceStore + 'static,
    L: LegacyStore + 'static,
{
    match (
        config.use_template_system,
        config.allow_fallback,
        config.migrate_on_read,
    ) {
        (false, _, _) => Box::new(LegacyOnlyGateway { legacy }),
        (true, false, _) => Box::new(TemplateOnlyGateway { store }),
        (true, true, false) => Box::new(DualWriteGateway { store, legacy }),
        (true, true, true) => Box::new(MigrateOnReadGateway { store, legacy }),
    }
}

/// Preparation: the template system is dark; everything hits the legacy
/// table.
pub struct LegacyOnlyGateway<L> {
    legacy: Arc<L>,
}

impl<L: LegacyStore> PolicyGateway for LegacyOnlyGateway<L> {
    fn fetch(
        &self,
        client: &ClientId,
        policy_number: &str,
    ) -> Result<Option<PolicyRecord>, RepositoryError> {
        let record = self.legacy.fetch(client, policy_number)?;
        Ok(record.map(|record| PolicyRecord::Legacy { record }))
    }

    fn write(
        &self,
        record: &LegacyPolicy,
        _today: NaiveDate,
    ) -> Result<PolicyRecord, RepositoryError> {
        self.legacy.upsert(record.clone())?;
        Ok(PolicyRecord::Legacy {
            record: record.clone(),
        })
    }
}

/// Complete: the legacy table is retired; reads that miss stay missed.
pub struct TemplateOnlyGateway<S> {
    store: Arc<S>,
}

impl<S: TemplateStore + InstanceStore> PolicyGateway for TemplateOnlyGateway<S> {
    fn fetch(
        &self,
        client: &ClientId,
        policy_number: &str,
    ) -> Result<Option<PolicyRecord>, RepositoryError> {
        fetch_templated(self.store.as_ref(), client, policy_number)
    }

    fn write(
        &self,
        record: &LegacyPolicy,
        today: NaiveDate,
    ) -> Result<PolicyRecord, RepositoryError> {
        write_templated(self.store.as_ref(), record, today)
    }
}

/// Migration: template reads with legacy fallback; writes land in both
/// shapes so bulk copy and live traffic converge.
pub struct DualWriteGateway<S, L> {
    store: Arc<S>,
    legacy: Arc<L>,
}

impl<S, L> PolicyGateway for DualWriteGateway<S, L>
where
    S: TemplateStore + InstanceStore,
    L: LegacyStore,
{
    fn fetch(
        &self,
        client: &ClientId,
        policy_number: &str,
    ) -> Result<Option<PolicyRecord>, RepositoryError> {
        if let Some(record) = fetch_templated(self.store.as_ref(), client, policy_number)? {
            return Ok(Some(record));
        }
        let record = self.legacy.fetch(client, policy_number)?;
        Ok(record.map(|record| PolicyRecord::Legacy { record }))
    }

    fn write(
        &self,
        record: &LegacyPolicy,
        today: NaiveDate,
    ) -> Result<PolicyRecord, RepositoryError> {
        let written = write_templated(self.store.as_ref(), record, today)?;
        self.legacy.upsert(record.clone())?;
        Ok(written)
    }
}

/// Transition: like fallback, but a legacy hit is lazily copied into the
/// template shape. The copy happens after the read result is assembled and
/// its failure is logged, never surfaced to the reader.
pub struct MigrateOnReadGateway<S, L> {
    store: Arc<S>,
    legacy: Arc<L>,
}

impl<S, L> PolicyGateway for MigrateOnReadGateway<S, L>
where
    S: TemplateStore + InstanceStore,
    L: LegacyStore,
{
    fn fetch(
        &self,
        client: &ClientId,
        policy_number: &str,
    ) -> Result<Option<PolicyRecord>, RepositoryError> {
        if let Some(record) = fetch_templated(self.store.as_ref(), client, policy_number)? {
            return Ok(Some(record));
        }

        let Some(record) = self.legacy.fetch(client, policy_number)? else {
            return Ok(None);
        };
        let result = PolicyRecord::Legacy {
            record: record.clone(),
        };

        // Best-effort write-through; the read result above is already final.
        // The copied template keeps the legacy start date as its origin.
        if let Err(error) = write_templated(self.store.as_ref(), &record, record.start_date) {
            warn!(
                client = %client.0,
                policy_number,
                %error,
                "migrate-on-read write-through failed"
            );
        }

        Ok(Some(result))
    }

    fn write(
        &self,
        record: &LegacyPolicy,
        today: NaiveDate,
    ) -> Result<PolicyRecord, RepositoryError> {
        write_templated(self.store.as_ref(), record, today)
    }
}

fn fetch_templated<S>(
    store: &S,
    client: &ClientId,
    policy_number: &str,
) -> Result<Option<PolicyRecord>, RepositoryError>
where
    S: TemplateStore + InstanceStore,
{
    let Some(template) = store.find_by_number(policy_number)? else {
        return Ok(None);
    };
    let instance = store
        .list_for_template(&template.id)?
        .into_iter()
        .find(|instance| instance.client_id == *client);
    Ok(instance.map(|instance| PolicyRecord::Templated { template, instance }))
}

/// Find-or-create the template for the record's policy number, then upsert
/// the client's instance under it.
pub(crate) fn write_templated<S>(
    store: &S,
    record: &LegacyPolicy,
    today: NaiveDate,
) -> Result<PolicyRecord, RepositoryError>
where
    S: TemplateStore + InstanceStore,
{
    let template = match store.find_by_number(&record.policy_number)? {
        Some(template) => template,
        None => {
            let template = PolicyTemplate {
                id: TemplateId::generate(),
                policy_number: record.policy_number.trim().to_string(),
                policy_type: record.policy_type,
                provider: record.provider.trim().to_string(),
                description: record.description.clone(),
                created_on: today,
            };
            match TemplateStore::insert(store, template) {
                Ok(template) => template,
                // Lost the race to a concurrent writer; use the winner.
                Err(RepositoryError::Conflict) => store
                    .find_by_number(&record.policy_number)?
                    .ok_or(RepositoryError::NotFound)?,
                Err(error) => return Err(error),
            }
        }
    };

    let existing = store
        .list_for_template(&template.id)?
        .into_iter()
        .find(|instance| instance.client_id == record.client_id);

    let instance = match existing {
        Some(mut instance) => {
            instance.premium_amount = record.premium_amount;
            instance.commission_amount = record.commission_amount;
            instance.start_date = record.start_date;
            instance.expiry_date = record.expiry_date;
            instance.status = record.status;
            InstanceStore::update(store, instance.clone())?;
            instance
        }
        None => {
            let instance = PolicyInstance {
                id: InstanceId::generate(),
                template_id: template.id,
                client_id: record.client_id.clone(),
                premium_amount: record.premium_amount,
                commission_amount: record.commission_amount,
                start_date: record.start_date,
                expiry_date: record.expiry_date,
                status: record.status,
            };
            InstanceStore::insert(store, instance)?
        }
    };

    Ok(PolicyRecord::Templated { template, instance })
}
