//! Append-only audit trail. Every successful mutation on a template,
//! instance, or migration batch emits exactly one entry; failed operations
//! emit nothing. The engine never rewrites or deletes entries.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::ClientId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
    StatusChanged,
    MigrationBatch,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Deleted => "deleted",
            AuditAction::StatusChanged => "status_changed",
            AuditAction::MigrationBatch => "migration_batch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntityType {
    Template,
    Instance,
    LegacyPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor_id: String,
    pub action: AuditAction,
    pub entity_type: AuditEntityType,
    pub entity_id: String,
    pub client_id: Option<ClientId>,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log unavailable: {0}")]
    Unavailable(String),
}

/// Outbound seam observed by the stores' mutation paths.
pub trait AuditRecorder: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Pure projections over the log, for the audit read endpoints.
pub trait AuditReader: Send + Sync {
    fn client_entries(&self, client: &ClientId) -> Vec<AuditEntry>;
    fn range_entries(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<AuditEntry>;
    fn client_stats(&self, client: &ClientId) -> AuditStats;
}

/// Per-client projection of the log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditStats {
    pub total: usize,
    pub by_action: BTreeMap<String, usize>,
}

/// In-memory append-only log with read projections.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn entries_for_client(&self, client: &ClientId) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.client_id.as_ref() == Some(client))
            .collect()
    }

    pub fn entries_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.recorded_at >= from && entry.recorded_at <= to)
            .collect()
    }

    pub fn stats_for_client(&self, client: &ClientId) -> AuditStats {
        let mut stats = AuditStats::default();
        for entry in self.entries_for_client(client) {
            stats.total += 1;
            *stats
                .by_action
                .entry(entry.action.label().to_string())
                .or_insert(0) += 1;
        }
        stats
    }
}

impl AuditReader for MemoryAuditLog {
    fn client_entries(&self, client: &ClientId) -> Vec<AuditEntry> {
        self.entries_for_client(client)
    }

    fn range_entries(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<AuditEntry> {
        self.entries_between(from, to)
    }

    fn client_stats(&self, client: &ClientId) -> AuditStats {
        self.stats_for_client(client)
    }
}

impl AuditRecorder for MemoryAuditLog {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Unavailable("audit log mutex poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}
